//! The index (`.bhd`) half of a split archive.
//!
//! An index is a bucketed table of file descriptors keyed by path hash. It
//! carries no file names; pairing hashes back to paths is the job of an
//! external [`NameDictionary`](crate::NameDictionary). Shipped indexes are
//! usually RSA-encrypted as a whole, which [`Index::read`] detects and
//! reverses when given a [`DecryptionKey`](crate::DecryptionKey).
//!
//! ```rust
//! use dvdbnd::{prelude::*, Borrowed, Format, Index, ReadOptions};
//!
//! fn example(bytes: &[u8]) -> Option<()> {
//!     let options = ReadOptions::builder().format(Format::DarkSouls3).build();
//!     let index = Index::read(Borrowed(bytes), &options).ok()?;
//!     let file = index.lookup_hash(0x1234_5678)?;
//!     println!("{} bytes at {}", file.file_size(), file.data_offset);
//!     Some(())
//! }
//! ```

use crate::{
    crypto::{self, DecryptionKey},
    error::{Error, Result},
    hashing::HashKind,
    io::{Endian, Source},
};
use bstr::{BStr, BString, ByteSlice};
use tracing::debug;

mod constants {
    pub(crate) const MAGIC: [u8; 4] = *b"BHD5";
    pub(crate) const SUPPORTED_VERSION: i32 = 1;

    pub(crate) const DESCRIPTOR_WIDTH_NARROW: usize = 0x10;
    pub(crate) const DESCRIPTOR_WIDTH_WIDE: usize = 0x28;
    pub(crate) const BUCKET_ENTRY_WIDTH: usize = 0x8;
    pub(crate) const RANGE_WIDTH: usize = 0x10;
}

/// The index generation, named after the game that introduced it.
///
/// `DarkSouls3` also covers Sekiro; `EldenRing` also covers Armored Core 6.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Format {
    DarkSouls,
    DarkSouls2,
    DarkSouls3,
    #[default]
    EldenRing,
}

impl Format {
    /// Width of the path hashes this generation embeds.
    #[must_use]
    pub fn hash_kind(self) -> HashKind {
        match self {
            Self::EldenRing => HashKind::Bits64,
            _ => HashKind::Bits32,
        }
    }

    pub(crate) fn is_salted(self) -> bool {
        !matches!(self, Self::DarkSouls)
    }

    pub(crate) fn has_range_descriptors(self) -> bool {
        matches!(self, Self::DarkSouls3 | Self::EldenRing)
    }

    pub(crate) fn descriptor_width(self) -> usize {
        if self.has_range_descriptors() {
            constants::DESCRIPTOR_WIDTH_WIDE
        } else {
            constants::DESCRIPTOR_WIDTH_NARROW
        }
    }
}

/// A half-open span of payload bytes covered by an integrity or crypto
/// descriptor. Spans with a negative endpoint are inert placeholders.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteRange {
    pub start: i64,
    pub end: i64,
}

impl ByteRange {
    /// Resolves the range against a buffer of `len` bytes, discarding inert
    /// and empty ranges and clamping the rest.
    #[must_use]
    pub fn clamped(&self, len: usize) -> Option<(usize, usize)> {
        if self.start < 0 || self.end < 0 {
            return None;
        }
        let start = usize::try_from(self.start).ok()?.min(len);
        let end = usize::try_from(self.end).ok()?.min(len);
        (start < end).then_some((start, end))
    }
}

/// A SHA-256 digest over the listed payload ranges, as stored on disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IntegrityDescriptor {
    pub digest: [u8; 32],
    pub ranges: Vec<ByteRange>,
}

/// An AES-128 key applying to the listed payload ranges. Large files are
/// commonly only encrypted across a header-sized prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CryptoDescriptor {
    pub key: [u8; 16],
    pub ranges: Vec<ByteRange>,
}

/// One file entry of the index.
///
/// `hash` is the path hash of the entry's canonical name and is NOT
/// guaranteed unique; two descriptors may collide. `padded_size` covers the
/// alignment padding stored in the data file, `unpadded_size` the real
/// payload length where the generation records it.
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    pub hash: u64,
    pub data_offset: u64,
    pub padded_size: u32,
    pub unpadded_size: Option<u64>,
    pub integrity: Option<IntegrityDescriptor>,
    pub crypto: Option<CryptoDescriptor>,
}

impl FileDescriptor {
    /// The payload length a read of this descriptor yields.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.unpadded_size.unwrap_or(u64::from(self.padded_size))
    }
}

/// An ordered group of descriptors. Buckets are opaque groupings fixed at
/// archive build time; nothing orders descriptors by hash within one.
#[derive(Clone, Debug, Default)]
pub struct Bucket {
    pub(crate) descriptors: Vec<FileDescriptor>,
}

impl Bucket {
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, FileDescriptor> {
        self.descriptors.iter()
    }
}

impl<'bucket> IntoIterator for &'bucket Bucket {
    type Item = &'bucket FileDescriptor;
    type IntoIter = core::slice::Iter<'bucket, FileDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

/// Returns whether the given index bytes look encrypted: anything that does
/// not open with the plaintext magic signature, including empty or truncated
/// input.
///
/// This is a heuristic, not a cryptographic signal. Malformed plaintext is
/// indistinguishable from cipher text and reported as possibly encrypted.
#[must_use]
pub fn detect_encrypted(bytes: &[u8]) -> bool {
    bytes.len() < constants::MAGIC.len() || bytes[..constants::MAGIC.len()] != constants::MAGIC
}

/// See also [`ReadOptions`].
#[derive(Default)]
#[repr(transparent)]
pub struct ReadOptionsBuilder(ReadOptions);

impl ReadOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn build(self) -> ReadOptions {
        self.0
    }

    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.0.format = format;
        self
    }

    /// Asserts whether the caller expects the index to be encrypted. A wrong
    /// assertion in either direction fails the read.
    #[must_use]
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.0.encrypted = encrypted;
        self
    }

    #[must_use]
    pub fn key(mut self, key: DecryptionKey) -> Self {
        self.0.key = Some(key);
        self
    }
}

/// Configuration for reading an index.
#[derive(Default)]
pub struct ReadOptions {
    format: Format,
    encrypted: bool,
    key: Option<DecryptionKey>,
}

impl ReadOptions {
    #[must_use]
    pub fn builder() -> ReadOptionsBuilder {
        ReadOptionsBuilder::new()
    }

    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    #[must_use]
    pub fn encrypted(&self) -> bool {
        self.encrypted
    }
}

/// A parsed index: the bucketed descriptor table of one split archive.
#[derive(Clone, Debug)]
pub struct Index {
    format: Format,
    big_endian: bool,
    salt: Option<BString>,
    encrypted: bool,
    buckets: Vec<Bucket>,
}

impl Index {
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    #[must_use]
    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    #[must_use]
    pub fn salt(&self) -> Option<&BStr> {
        self.salt.as_ref().map(|salt| salt.as_bstr())
    }

    /// Whether the source bytes were encrypted before parsing.
    #[must_use]
    pub fn was_encrypted(&self) -> bool {
        self.encrypted
    }

    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }

    /// Enumerates every descriptor in bucket-then-entry order. The iterator
    /// is finite and restartable; call again for a fresh pass.
    #[must_use]
    pub fn descriptors(&self) -> Descriptors<'_> {
        const EMPTY: &[FileDescriptor] = &[];
        Descriptors {
            buckets: self.buckets.iter(),
            current: EMPTY.iter(),
        }
    }

    /// Finds the first descriptor with the given hash.
    ///
    /// Scans every bucket rather than selecting one by hash: the reader stays
    /// correct for archives whose build-time bucket function is unknown, and
    /// hash uniqueness is not guaranteed anyway.
    #[must_use]
    pub fn lookup_hash(&self, hash: u64) -> Option<&FileDescriptor> {
        self.descriptors().find(|descriptor| descriptor.hash == hash)
    }

    fn do_read(bytes: &[u8], options: &ReadOptions) -> Result<Self> {
        if detect_encrypted(bytes) {
            if !options.encrypted {
                return Err(Error::EncryptionMismatch { detected: true });
            }
            let key = options.key.as_ref().ok_or(Error::MissingKey)?;
            debug!("index appears encrypted, decrypting {} bytes", bytes.len());
            let plain = crypto::decrypt_index(key, bytes);
            if detect_encrypted(&plain) {
                return Err(Error::CorruptIndex("signature missing after decryption"));
            }
            Self::parse(&plain, options.format, true)
        } else {
            if options.encrypted {
                return Err(Error::EncryptionMismatch { detected: false });
            }
            Self::parse(bytes, options.format, false)
        }
    }

    fn parse(bytes: &[u8], format: Format, encrypted: bool) -> Result<Self> {
        let mut source = Source::new(bytes);

        let magic = source.read_array::<4>()?;
        if magic != constants::MAGIC {
            return Err(Error::InvalidMagic(magic));
        }
        let endianness: i8 = source.read(Endian::Little)?;
        let big_endian = match endianness {
            0 => true,
            -1 => false,
            _ => return Err(Error::CorruptIndex("unrecognized endianness flag")),
        };
        let endian = if big_endian { Endian::Big } else { Endian::Little };

        let flag: u8 = source.read(endian)?;
        if flag > 1 {
            return Err(Error::CorruptIndex("unrecognized header flag"));
        }
        if source.read_array::<2>()? != [0, 0] {
            return Err(Error::CorruptIndex("reserved header bytes are not zero"));
        }

        let (version, _file_size, bucket_count, table_offset): (i32, i32, i32, i32) =
            source.read(endian)?;
        if version != constants::SUPPORTED_VERSION {
            return Err(Error::CorruptIndex("unsupported index version"));
        }
        let bucket_count = usize::try_from(bucket_count)
            .map_err(|_| Error::CorruptIndex("negative bucket count"))?;
        let table_offset = usize::try_from(table_offset)
            .map_err(|_| Error::CorruptIndex("negative bucket table offset"))?;

        let salt = if format.is_salted() {
            let len: i32 = source.read(endian)?;
            let len =
                usize::try_from(len).map_err(|_| Error::CorruptIndex("negative salt length"))?;
            Some(BString::from(source.read_bytes(len)?))
        } else {
            None
        };

        // validate the table span before trusting the count with an allocation
        if bucket_count
            .checked_mul(constants::BUCKET_ENTRY_WIDTH)
            .and_then(|len| table_offset.checked_add(len))
            .map_or(true, |end| end > source.len())
        {
            return Err(Error::CorruptIndex("bucket table exceeds the index"));
        }

        source.seek_absolute(table_offset)?;
        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            let (count, offset): (i32, i32) = source.read(endian)?;
            let count = usize::try_from(count)
                .map_err(|_| Error::CorruptIndex("negative descriptor count"))?;
            let offset = usize::try_from(offset)
                .map_err(|_| Error::CorruptIndex("negative descriptor offset"))?;
            if count
                .checked_mul(format.descriptor_width())
                .and_then(|len| offset.checked_add(len))
                .map_or(true, |end| end > source.len())
            {
                return Err(Error::CorruptIndex("descriptor array exceeds the index"));
            }

            let descriptors = source.save_restore_position(|source| -> Result<Vec<FileDescriptor>> {
                source.seek_absolute(offset)?;
                let mut descriptors = Vec::with_capacity(count);
                for _ in 0..count {
                    descriptors.push(Self::read_descriptor(source, format, endian)?);
                }
                Ok(descriptors)
            })?;
            buckets.push(Bucket { descriptors });
        }

        Ok(Self {
            format,
            big_endian,
            salt,
            encrypted,
            buckets,
        })
    }

    fn read_descriptor(
        source: &mut Source<'_>,
        format: Format,
        endian: Endian,
    ) -> Result<FileDescriptor> {
        let (hash, padded_size, unpadded_size, data_offset, integrity_offset, crypto_offset) =
            match format {
                Format::DarkSouls | Format::DarkSouls2 => {
                    let (hash, padded, offset): (u32, i32, i64) = source.read(endian)?;
                    (u64::from(hash), padded, -1, offset, 0, 0)
                }
                Format::DarkSouls3 => {
                    let (hash, padded, offset, integrity, crypto, unpadded): (
                        u32,
                        i32,
                        i64,
                        i64,
                        i64,
                        i64,
                    ) = source.read(endian)?;
                    (u64::from(hash), padded, unpadded, offset, integrity, crypto)
                }
                Format::EldenRing => {
                    let (hash, padded, unpadded, offset, integrity, crypto): (
                        u64,
                        i32,
                        i32,
                        i64,
                        i64,
                        i64,
                    ) = source.read(endian)?;
                    (hash, padded, i64::from(unpadded), offset, integrity, crypto)
                }
            };

        let padded_size =
            u32::try_from(padded_size).map_err(|_| Error::CorruptIndex("negative padded size"))?;
        let data_offset =
            u64::try_from(data_offset).map_err(|_| Error::CorruptIndex("negative data offset"))?;
        let unpadded_size = u64::try_from(unpadded_size).ok();

        let integrity = match usize::try_from(integrity_offset) {
            Err(_) => return Err(Error::CorruptIndex("negative integrity descriptor offset")),
            Ok(0) => None,
            Ok(offset) => Some(source.save_restore_position(
                |source| -> Result<IntegrityDescriptor> {
                    source.seek_absolute(offset)?;
                    let digest = source.read_array::<32>()?;
                    let ranges = Self::read_ranges(source, endian)?;
                    Ok(IntegrityDescriptor { digest, ranges })
                },
            )?),
        };

        let crypto = match usize::try_from(crypto_offset) {
            Err(_) => return Err(Error::CorruptIndex("negative crypto descriptor offset")),
            Ok(0) => None,
            Ok(offset) => Some(source.save_restore_position(
                |source| -> Result<CryptoDescriptor> {
                    source.seek_absolute(offset)?;
                    let key = source.read_array::<16>()?;
                    let ranges = Self::read_ranges(source, endian)?;
                    Ok(CryptoDescriptor { key, ranges })
                },
            )?),
        };

        Ok(FileDescriptor {
            hash,
            data_offset,
            padded_size,
            unpadded_size,
            integrity,
            crypto,
        })
    }

    fn read_ranges(source: &mut Source<'_>, endian: Endian) -> Result<Vec<ByteRange>> {
        let count: i32 = source.read(endian)?;
        let count =
            usize::try_from(count).map_err(|_| Error::CorruptIndex("negative range count"))?;
        if count
            .checked_mul(constants::RANGE_WIDTH)
            .map_or(true, |len| len > source.len())
        {
            return Err(Error::CorruptIndex("range list exceeds the index"));
        }
        let mut ranges = Vec::with_capacity(count);
        for _ in 0..count {
            let (start, end): (i64, i64) = source.read(endian)?;
            ranges.push(ByteRange { start, end });
        }
        Ok(ranges)
    }
}

/// See [`Index::descriptors`].
pub struct Descriptors<'index> {
    buckets: core::slice::Iter<'index, Bucket>,
    current: core::slice::Iter<'index, FileDescriptor>,
}

impl<'index> Iterator for Descriptors<'index> {
    type Item = &'index FileDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(descriptor) = self.current.next() {
                return Some(descriptor);
            }
            self.current = self.buckets.next()?.descriptors.iter();
        }
    }
}

impl crate::Sealed for Index {}

impl<'bytes> crate::ReaderWithOptions<crate::Borrowed<'bytes>> for Index {
    type Error = Error;
    type Item = Index;
    type Options = ReadOptions;

    fn read(source: crate::Borrowed<'bytes>, options: &Self::Options) -> Result<Self::Item> {
        Self::do_read(source.0, options)
    }
}

impl crate::ReaderWithOptions<&std::fs::File> for Index {
    type Error = Error;
    type Item = Index;
    type Options = ReadOptions;

    fn read(source: &std::fs::File, options: &Self::Options) -> Result<Self::Item> {
        let mut source = source;
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut source, &mut bytes)?;
        Self::do_read(&bytes, options)
    }
}

impl crate::ReaderWithOptions<&std::path::Path> for Index {
    type Error = Error;
    type Item = Index;
    type Options = ReadOptions;

    fn read(source: &std::path::Path, options: &Self::Options) -> Result<Self::Item> {
        let bytes = std::fs::read(source)?;
        Self::do_read(&bytes, options)
    }
}
