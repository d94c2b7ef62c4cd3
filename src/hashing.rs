use bstr::{BStr, BString, ByteSlice};

/// Width of the path hash embedded in an archive index.
///
/// Older indexes store 32-bit hashes built with prime 37; the Elden Ring
/// generation stores 64-bit hashes built with prime 0x85. Narrow hashes are
/// zero-extended so callers always work with `u64`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HashKind {
    Bits32,
    Bits64,
}

/// Produces the canonical form of a path: surrounding whitespace trimmed,
/// backslashes folded to forward slashes, ASCII lower-cased, and exactly one
/// leading slash.
///
/// Canonicalization is idempotent; two paths with equal canonical forms are
/// the same path everywhere in this crate (tree lookup and hashing alike).
#[must_use]
pub fn canonicalize<P>(path: &P) -> BString
where
    P: AsRef<[u8]> + ?Sized,
{
    let trimmed = path.as_ref().trim();
    let mut result = BString::from(Vec::with_capacity(trimmed.len() + 1));
    if !matches!(trimmed.first(), Some(b'/' | b'\\')) {
        result.push(b'/');
    }
    for &byte in trimmed {
        result.push(match byte {
            b'\\' => b'/',
            _ => byte.to_ascii_lowercase(),
        });
    }
    result
}

/// Splits a canonical path into its non-empty segments.
pub(crate) fn segments(canonical: &BStr) -> impl Iterator<Item = &BStr> {
    canonical
        .split_str("/")
        .filter(|segment| !segment.is_empty())
        .map(ByteSlice::as_bstr)
}

/// Produces a hash using the given path.
///
/// The path is canonicalized first, so any spelling of the same path hashes
/// identically. This must match the hash embedded in the archive's index for
/// dictionary-driven lookup to work.
#[must_use]
pub fn hash_path<P>(path: &P, kind: HashKind) -> u64
where
    P: AsRef<[u8]> + ?Sized,
{
    let canonical = canonicalize(path);
    match kind {
        HashKind::Bits32 => u64::from(
            canonical
                .iter()
                .fold(0u32, |hash, &byte| {
                    hash.wrapping_mul(37).wrapping_add(u32::from(byte))
                }),
        ),
        HashKind::Bits64 => canonical.iter().fold(0u64, |hash, &byte| {
            hash.wrapping_mul(0x85).wrapping_add(u64::from(byte))
        }),
    }
}
