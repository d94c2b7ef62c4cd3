use core::num::TryFromIntError;
use std::io;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The index's plaintext signature probe disagreed with the caller's
    /// configuration. The probe is a heuristic, so a malformed plaintext index
    /// is reported the same way as an encrypted one.
    #[error("index encryption probe (detected encrypted: {detected}) disagrees with the read options; is the archive valid?")]
    EncryptionMismatch { detected: bool },

    /// The index is encrypted and no decryption key was supplied.
    #[error("index was determined to be encrypted but no decryption key was given")]
    MissingKey,

    /// The supplied key material could not be parsed as an RSA public key.
    #[error("invalid decryption key: {0}")]
    InvalidKey(String),

    #[error("invalid magic read from index header: {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// The index bytes are structurally malformed. No partial index is
    /// returned.
    #[error("corrupt index: {0}")]
    CorruptIndex(&'static str),

    /// A descriptor's data range does not fit inside the data file.
    #[error("descriptor range at offset {offset} ({len} bytes) exceeds the data file ({size} bytes)")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    /// A mutating operation was invoked on a read-only file system.
    #[error("file system is read-only")]
    ReadOnly,

    #[error("an operation on an integer would have truncated and corrupted data")]
    IntegralTruncation,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::IntegralTruncation
    }
}

pub type Result<T> = core::result::Result<T, Error>;
