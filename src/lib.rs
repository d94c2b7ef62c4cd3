//! A read-only reader for FromSoftware's split dvdbnd archives: a `.bhd` index file
//! describing hash-bucketed file entries, paired with a `.bdt` data file holding the
//! payload bytes. See [`Archive`] for the container and [`ArchiveFileSystem`] for the
//! path-based view reconstructed on top of it.

#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(
    unknown_lints,
    clippy::enum_glob_use,
    clippy::missing_errors_doc,
    clippy::struct_field_names
)]

mod archive;
mod containers;
mod crypto;
mod dict;
mod error;
mod hashing;
mod index;
mod io;
mod vfs;

#[cfg(test)]
pub(crate) mod test_support;

pub use archive::{Archive, FileData, Integrity};
pub use containers::Bytes;
pub use crypto::DecryptionKey;
pub use dict::{NameDictionary, PathDictionary};
pub use error::{Error, Result};
pub use hashing::{canonicalize, hash_path, HashKind};
pub use index::{
    detect_encrypted, Bucket, ByteRange, CryptoDescriptor, Descriptors, FileDescriptor, Format,
    Index, IntegrityDescriptor, ReadOptions, ReadOptionsBuilder,
};
pub use vfs::{
    ArchiveFileSystem, EmptyFileSystem, VirtualDirectory, VirtualFile, VirtualFileSystem,
};

/// Makes a shallow copy of the input.
///
/// The input buffer only needs to live for the duration of the read.
pub struct Borrowed<'borrow>(pub &'borrow [u8]);

mod private {
    pub trait Sealed {}
}

use private::Sealed;

/// A trait that enables reading from various sources, with configuration options.
pub trait ReaderWithOptions<T>: Sealed {
    type Error;
    type Item;
    type Options;

    /// Reads an instance of `Self::Item` from the given source, using the given options.
    fn read(source: T, options: &Self::Options) -> core::result::Result<Self::Item, Self::Error>;
}

pub use bstr::{BStr, BString, ByteSlice, B};

/// Convenience using statements for traits that are needed to work with the library.
pub mod prelude {
    pub use crate::{ReaderWithOptions as _, VirtualFileSystem as _};
}
