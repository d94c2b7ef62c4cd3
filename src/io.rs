use crate::error::{Error, Result};
use core::mem;

#[derive(Clone, Copy)]
pub(crate) enum Endian {
    Big,
    Little,
}

pub(crate) trait BinaryReadable: Sized {
    fn from_be_source(source: &mut Source<'_>) -> Result<Self>;
    fn from_le_source(source: &mut Source<'_>) -> Result<Self>;

    fn from_source(source: &mut Source<'_>, endian: Endian) -> Result<Self> {
        match endian {
            Endian::Big => Self::from_be_source(source),
            Endian::Little => Self::from_le_source(source),
        }
    }
}

macro_rules! make_binary_readable {
    ($t:ty) => {
        impl BinaryReadable for $t {
            fn from_be_source(source: &mut Source<'_>) -> Result<Self> {
                let bytes = source.read_array::<{ mem::size_of::<$t>() }>()?;
                Ok(Self::from_be_bytes(bytes))
            }

            fn from_le_source(source: &mut Source<'_>) -> Result<Self> {
                let bytes = source.read_array::<{ mem::size_of::<$t>() }>()?;
                Ok(Self::from_le_bytes(bytes))
            }
        }
    };
}

make_binary_readable!(u8);
make_binary_readable!(u16);
make_binary_readable!(u32);
make_binary_readable!(u64);

make_binary_readable!(i8);
make_binary_readable!(i16);
make_binary_readable!(i32);
make_binary_readable!(i64);

macro_rules! make_binary_readable_tuple {
    ($($idx:tt $t:ident),+) => {
        impl<$($t,)+> BinaryReadable for ($($t,)+)
        where
            $($t: BinaryReadable,)+
        {
            fn from_be_source(source: &mut Source<'_>) -> Result<Self> {
                Ok(($(
                    $t::from_be_source(source)?,
                )+))
            }

            fn from_le_source(source: &mut Source<'_>) -> Result<Self> {
                Ok(($(
                    $t::from_le_source(source)?,
                )+))
            }
        }
    };
}

make_binary_readable_tuple!(0 T0, 1 T1);
make_binary_readable_tuple!(0 T0, 1 T1, 2 T2);
make_binary_readable_tuple!(0 T0, 1 T1, 2 T2, 3 T3);
make_binary_readable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4);
make_binary_readable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5);

/// An in-memory cursor over the index blob.
///
/// Overruns are corrupt-index conditions rather than I/O errors, since the
/// whole blob is resident before parsing begins.
pub(crate) struct Source<'bytes> {
    bytes: &'bytes [u8],
    pos: usize,
}

impl<'bytes> Source<'bytes> {
    pub(crate) fn new(bytes: &'bytes [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn read<T>(&mut self, endian: Endian) -> Result<T>
    where
        T: BinaryReadable,
    {
        T::from_source(self, endian)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'bytes [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(Error::CorruptIndex("unexpected end of index data"))?;
        let result = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(result)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut result = [0u8; N];
        result.copy_from_slice(self.read_bytes(N)?);
        Ok(result)
    }

    pub(crate) fn seek_absolute(&mut self, pos: usize) -> Result<()> {
        if pos > self.bytes.len() {
            return Err(Error::CorruptIndex(
                "offset points past the end of the index",
            ));
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn save_restore_position<F, T>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        let position = self.pos;
        let result = f(self);
        self.pos = position;
        result
    }
}
