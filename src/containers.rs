use memmap2::Mmap;
use std::sync::Arc;

enum Inner {
    Owned(Vec<u8>),
    Mapped {
        pos: usize,
        len: usize,
        mapping: Arc<Mmap>,
    },
}

/// A byte buffer that either owns its data or aliases a window of a shared
/// memory mapping.
///
/// Mapped instances hold a reference count on the mapping, so a view stays
/// valid even after the [`Archive`](crate::Archive) that produced it is
/// dropped. The mapping itself is released once the last view is gone.
pub struct Bytes {
    inner: Inner,
}

impl Bytes {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.inner {
            Inner::Owned(x) => x,
            Inner::Mapped { pos, len, mapping } => &mapping[*pos..*pos + *len],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.inner {
            Inner::Owned(x) => x.len(),
            Inner::Mapped { len, .. } => *len,
        }
    }

    /// Detaches the bytes from any backing mapping, copying them if needed.
    /// This releases the view's claim on the mapping.
    #[must_use]
    pub fn into_owned(self) -> Self {
        match self.inner {
            Inner::Owned(x) => Self {
                inner: Inner::Owned(x),
            },
            Inner::Mapped { pos, len, mapping } => Self {
                inner: Inner::Owned(mapping[pos..pos + len].to_owned()),
            },
        }
    }

    /// Copies the viewed bytes into a plain vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_owned()
    }

    /// Caller must have validated that `[pos, pos + len)` lies inside the
    /// mapping.
    pub(crate) fn from_mapped(pos: usize, len: usize, mapping: Arc<Mmap>) -> Self {
        Self {
            inner: Inner::Mapped { pos, len, mapping },
        }
    }
}

impl Default for Bytes {
    fn default() -> Self {
        Self {
            inner: Inner::Owned(Vec::new()),
        }
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(value: Vec<u8>) -> Self {
        Self {
            inner: Inner::Owned(value),
        }
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::Bytes;

    #[test]
    fn default_state() {
        let bytes = Bytes::default();
        assert!(bytes.is_empty());
        assert_eq!(bytes.len(), 0);
    }

    #[test]
    fn owned_round_trip() {
        let owned = Bytes::from(vec![0xDE, 0xAD]);
        assert_eq!(owned.as_bytes(), [0xDE, 0xAD]);
        assert_eq!(owned.to_vec(), vec![0xDE, 0xAD]);
        assert_eq!(owned.into_owned().len(), 2);
    }
}
