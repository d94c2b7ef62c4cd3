use crate::hashing::{self, HashKind};
use bstr::{BStr, BString};
use std::collections::HashMap;

/// The name-dictionary contract: the bidirectional mapping between path
/// hashes and canonical paths that an index alone cannot provide.
///
/// `compute_hash` must be deterministic and match the hashes embedded in the
/// archive being described. `path_of` is reverse lookup and may be
/// incomplete; descriptors without an entry surface as orphans in the
/// virtual file system.
pub trait NameDictionary {
    /// Hashes an already-canonicalized path.
    fn compute_hash(&self, canonical_path: &BStr) -> u64;

    /// Looks a canonical path up by hash, if this dictionary knows one.
    fn path_of(&self, hash: u64) -> Option<BString>;
}

/// An in-memory [`NameDictionary`] over the crate's path hash.
///
/// How dictionaries are stored on disk is a caller concern; this collects
/// whatever paths the caller has and serves the contract from a hash map.
pub struct PathDictionary {
    kind: HashKind,
    paths: HashMap<u64, BString>,
}

impl PathDictionary {
    #[must_use]
    pub fn new(kind: HashKind) -> Self {
        Self {
            kind,
            paths: HashMap::new(),
        }
    }

    /// Canonicalizes and registers a path, returning its hash. A later
    /// insert with the same hash replaces the earlier path.
    pub fn insert<P>(&mut self, path: &P) -> u64
    where
        P: AsRef<[u8]> + ?Sized,
    {
        let canonical = hashing::canonicalize(path);
        let hash = hashing::hash_path(&canonical, self.kind);
        self.paths.insert(hash, canonical);
        hash
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl NameDictionary for PathDictionary {
    fn compute_hash(&self, canonical_path: &BStr) -> u64 {
        hashing::hash_path(canonical_path, self.kind)
    }

    fn path_of(&self, hash: u64) -> Option<BString> {
        self.paths.get(&hash).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::{NameDictionary, PathDictionary};
    use crate::hashing::{canonicalize, HashKind};
    use bstr::{BStr, ByteSlice};

    #[allow(non_snake_case)]
    fn B<S: AsRef<[u8]> + ?Sized>(bytes: &S) -> &BStr {
        BStr::new(bytes)
    }

    #[test]
    fn insert_canonicalizes() {
        let mut dictionary = PathDictionary::new(HashKind::Bits64);
        let hash = dictionary.insert("MAP\\M10.MSB");
        assert_eq!(dictionary.len(), 1);
        assert_eq!(dictionary.path_of(hash).unwrap(), "/map/m10.msb");
        assert_eq!(dictionary.path_of(hash ^ 1), None);
    }

    #[test]
    fn compute_hash_matches_insert() {
        let mut dictionary = PathDictionary::new(HashKind::Bits32);
        let hash = dictionary.insert("/a/b.bin");
        let canonical = canonicalize("/A/B.BIN");
        assert_eq!(dictionary.compute_hash(canonical.as_bstr()), hash);
    }

    #[test]
    fn empty_dictionary_still_hashes() {
        let dictionary = PathDictionary::new(HashKind::Bits64);
        assert!(dictionary.is_empty());
        assert_ne!(dictionary.compute_hash(B("/a/b.bin")), 0);
    }
}
