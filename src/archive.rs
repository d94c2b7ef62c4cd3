//! The container over one split archive pair: a parsed [`Index`] plus the
//! open data (`.bdt`) file it describes.
//!
//! ```rust
//! use dvdbnd::{Archive, Format, ReadOptions};
//!
//! fn example() -> Option<()> {
//!     let options = ReadOptions::builder().format(Format::DarkSouls3).build();
//!     let archive = Archive::open("data1.bhd", "data1.bdt", &options).ok()?;
//!     let file = archive.lookup_hash(0x1234_5678)?;
//!     let data = archive.read(file).ok()?;
//!     println!("{} bytes", data.len());
//!     Some(())
//! }
//! ```

use crate::{
    containers::Bytes,
    crypto,
    error::{Error, Result},
    index::{Descriptors, FileDescriptor, Index, ReadOptions},
    ReaderWithOptions as _,
};
use memmap2::Mmap;
use parking_lot::Mutex;
use std::{
    fs,
    io::{Read, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};
use tracing::{debug, warn};

/// Outcome of the per-range integrity check on a buffered read.
///
/// A mismatch is reported, not fatal: the caller decides whether corrupt
/// bytes are still usable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Integrity {
    /// The descriptor carries no integrity metadata.
    Unchecked,
    Verified,
    Mismatch,
}

/// The result of a buffered read: the payload with padding stripped, plus
/// the integrity verdict.
pub struct FileData {
    bytes: Vec<u8>,
    integrity: Integrity,
}

impl FileData {
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn integrity(&self) -> Integrity {
        self.integrity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for FileData {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}

/// One index paired with one open data file.
///
/// The container owns the data-file handle exclusively; buffered reads
/// serialize their seek+read sections behind a lock. The memory mapping is
/// reference-counted and shared read-only with every view handed out by
/// [`Archive::mapped`].
pub struct Archive {
    index: Index,
    data: Mutex<fs::File>,
    mapping: Arc<Mmap>,
}

impl Archive {
    /// Opens an archive pair from its index and data paths.
    ///
    /// Configuration errors (encryption assertion mismatch, missing key) and
    /// corrupt indexes abort construction entirely; no partially-usable
    /// container is ever returned.
    pub fn open<P, Q>(index_path: P, data_path: Q, options: &ReadOptions) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let index = Index::read(index_path.as_ref(), options)?;
        Self::from_index(index, data_path)
    }

    /// Pairs an already-parsed index with a data file.
    pub fn from_index<P>(index: Index, data_path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let data = fs::File::open(data_path.as_ref())?;
        let mapping = Arc::new(unsafe { Mmap::map(&data)? });
        debug!(
            "opened data file {:?} ({} bytes, {} indexed files)",
            data_path.as_ref(),
            mapping.len(),
            index.file_count()
        );
        Ok(Self {
            index,
            data: Mutex::new(data),
            mapping,
        })
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn was_encrypted(&self) -> bool {
        self.index.was_encrypted()
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.index.bucket_count()
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.index.file_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// See [`Index::lookup_hash`].
    #[must_use]
    pub fn lookup_hash(&self, hash: u64) -> Option<&FileDescriptor> {
        self.index.lookup_hash(hash)
    }

    /// See [`Index::descriptors`].
    #[must_use]
    pub fn descriptors(&self) -> Descriptors<'_> {
        self.index.descriptors()
    }

    /// Reads a descriptor's payload through the data-file handle: decrypts
    /// the listed ranges, verifies the listed integrity ranges, and strips
    /// the alignment padding.
    pub fn read(&self, descriptor: &FileDescriptor) -> Result<FileData> {
        self.read_with(descriptor, false)
    }

    /// Same as [`Archive::read`], but fans range decryption out across the
    /// worker pool. Results are identical; the caller never observes partial
    /// or out-of-order bytes.
    pub fn read_threaded(&self, descriptor: &FileDescriptor) -> Result<FileData> {
        self.read_with(descriptor, true)
    }

    /// Convenience lookup-then-read. `None` means the hash is absent.
    pub fn read_hash(&self, hash: u64) -> Option<Result<FileData>> {
        self.lookup_hash(hash).map(|file| self.read(file))
    }

    fn read_with(&self, descriptor: &FileDescriptor, threaded: bool) -> Result<FileData> {
        let padded = u64::from(descriptor.padded_size);
        let size = self.mapping.len() as u64;
        if descriptor
            .data_offset
            .checked_add(padded)
            .map_or(true, |end| end > size)
        {
            return Err(Error::OutOfBounds {
                offset: descriptor.data_offset,
                len: padded,
                size,
            });
        }

        let mut buffer = vec![0u8; usize::try_from(descriptor.padded_size)?];
        {
            let mut data = self.data.lock();
            data.seek(SeekFrom::Start(descriptor.data_offset))?;
            data.read_exact(&mut buffer)?;
        }

        // digests cover the stored bytes, so verify before decrypting
        let integrity = match &descriptor.integrity {
            Some(integrity) => {
                if crypto::verify_ranges(&buffer, integrity) {
                    Integrity::Verified
                } else {
                    warn!("integrity mismatch for file hash {:#x}", descriptor.hash);
                    Integrity::Mismatch
                }
            }
            None => Integrity::Unchecked,
        };

        if let Some(ranges) = &descriptor.crypto {
            if threaded {
                crypto::decrypt_ranges_parallel(&mut buffer, ranges);
            } else {
                crypto::decrypt_ranges(&mut buffer, ranges);
            }
        }

        buffer.truncate(usize::try_from(descriptor.file_size())?);
        Ok(FileData {
            bytes: buffer,
            integrity,
        })
    }

    /// Resolves a zero-copy view of the payload inside the shared mapping.
    ///
    /// The view covers the unpadded payload only and skips decryption and
    /// verification; it is for consumers that handle those concerns
    /// themselves. The view holds its own reference on the mapping and
    /// outlives the container if needed.
    pub fn mapped(&self, descriptor: &FileDescriptor) -> Result<Bytes> {
        let len = descriptor.file_size();
        let size = self.mapping.len() as u64;
        if descriptor
            .data_offset
            .checked_add(len)
            .map_or(true, |end| end > size)
        {
            return Err(Error::OutOfBounds {
                offset: descriptor.data_offset,
                len,
                size,
            });
        }
        Ok(Bytes::from_mapped(
            usize::try_from(descriptor.data_offset)?,
            usize::try_from(len)?,
            Arc::clone(&self.mapping),
        ))
    }

    /// Releases the data-file handle and this container's claim on the
    /// mapping. Outstanding mapped views keep the mapping alive until they
    /// are dropped. Consuming the container makes use-after-dispose a
    /// compile-time error.
    pub fn close(self) {}
}
