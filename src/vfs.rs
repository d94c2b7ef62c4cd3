//! A hierarchical, path-based view over a flat hash-indexed archive.
//!
//! The directory tree is reconstructed once, at construction, by resolving
//! every descriptor's hash through a [`NameDictionary`]. Descriptors the
//! dictionary cannot name become orphans: enumerable, but absent from the
//! tree. The tree is never mutated afterwards, so lookups are lock-free from
//! any number of threads; if the backing archive changes, build a new view.

use crate::{
    archive::{Archive, FileData},
    containers::Bytes,
    dict::NameDictionary,
    error::{Error, Result},
    hashing,
    index::FileDescriptor,
};
use bstr::{BStr, BString, ByteSlice};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

/// A file node: one descriptor, plus its canonical leaf name when the
/// dictionary knew one. Orphans have no name and are only reachable through
/// flat enumeration.
pub struct VirtualFile {
    name: Option<BString>,
    descriptor: FileDescriptor,
}

impl VirtualFile {
    #[must_use]
    pub fn name(&self) -> Option<&BStr> {
        self.name.as_ref().map(|name| name.as_bstr())
    }

    #[must_use]
    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn is_orphan(&self) -> bool {
        self.name.is_none()
    }
}

/// A directory node owning its children, keyed case-insensitively.
#[derive(Default)]
pub struct VirtualDirectory {
    name: BString,
    directories: HashMap<BString, VirtualDirectory>,
    files: HashMap<BString, Arc<VirtualFile>>,
}

fn lookup_key(name: &BStr) -> BString {
    BString::from(name.to_lowercase())
}

impl VirtualDirectory {
    fn new(name: &BStr) -> Self {
        Self {
            name: BString::from(name),
            directories: HashMap::new(),
            files: HashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_bstr()
    }

    #[must_use]
    pub fn file_exists(&self, name: &BStr) -> bool {
        self.files.contains_key(&lookup_key(name))
    }

    #[must_use]
    pub fn try_get_file(&self, name: &BStr) -> Option<Arc<VirtualFile>> {
        self.files.get(&lookup_key(name)).map(Arc::clone)
    }

    #[must_use]
    pub fn directory_exists(&self, name: &BStr) -> bool {
        self.directories.contains_key(&lookup_key(name))
    }

    #[must_use]
    pub fn try_get_directory(&self, name: &BStr) -> Option<&VirtualDirectory> {
        self.directories.get(&lookup_key(name))
    }

    pub fn directories(&self) -> impl Iterator<Item = (&BStr, &VirtualDirectory)> {
        self.directories
            .iter()
            .map(|(name, directory)| (name.as_bstr(), directory))
    }

    pub fn files(&self) -> impl Iterator<Item = (&BStr, &Arc<VirtualFile>)> {
        self.files.iter().map(|(name, file)| (name.as_bstr(), file))
    }

    pub fn directory_names(&self) -> impl Iterator<Item = &BStr> {
        self.directories.keys().map(|name| name.as_bstr())
    }

    pub fn file_names(&self) -> impl Iterator<Item = &BStr> {
        self.files.keys().map(|name| name.as_bstr())
    }
}

/// The capability surface shared by file-system backends. Paths are
/// canonicalized before lookup, so any spelling of a path resolves the same
/// way.
///
/// Read-only backends reject every mutating operation with
/// [`Error::ReadOnly`] rather than panicking.
pub trait VirtualFileSystem {
    fn is_read_only(&self) -> bool;

    fn root(&self) -> &VirtualDirectory;

    /// Finds a file by path. `None` is an ordinary miss, never an error.
    fn resolve(&self, path: &BStr) -> Option<Arc<VirtualFile>>;

    fn directory_exists(&self, path: &BStr) -> bool;

    /// Enumerates every file, orphans included.
    fn files(&self) -> Box<dyn Iterator<Item = Arc<VirtualFile>> + '_>;

    fn file_exists(&self, path: &BStr) -> bool {
        self.resolve(path).is_some()
    }

    fn create_file(&mut self, path: &BStr) -> Result<Arc<VirtualFile>>;

    fn delete_file(&mut self, path: &BStr) -> Result<()>;

    fn move_file(&mut self, from: &BStr, to: &BStr) -> Result<()>;
}

/// A read-only [`VirtualFileSystem`] backed by one [`Archive`] and one
/// [`NameDictionary`].
pub struct ArchiveFileSystem {
    name: String,
    archive: Archive,
    dictionary: Box<dyn NameDictionary + Send + Sync>,
    cache: HashMap<BString, Arc<VirtualFile>>,
    list: Vec<Arc<VirtualFile>>,
    named: Vec<(BString, FileDescriptor)>,
    root: VirtualDirectory,
}

impl ArchiveFileSystem {
    /// Builds the directory tree in one pass over the archive's descriptors,
    /// in bucket-then-entry order. That order has no meaning beyond
    /// determinism: when two dictionary entries claim the same canonical
    /// path, the first insertion wins and later ones stay enumerable but
    /// fall out of the tree.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        archive: Archive,
        dictionary: Box<dyn NameDictionary + Send + Sync>,
    ) -> Self {
        let mut cache = HashMap::new();
        let mut list = Vec::with_capacity(archive.file_count());
        let mut named = Vec::new();
        let mut root = VirtualDirectory::default();

        for descriptor in archive.descriptors() {
            let Some(path) = dictionary.path_of(descriptor.hash) else {
                // expected for undocumented hashes
                debug!("no dictionary entry for file hash {:#x}", descriptor.hash);
                list.push(Arc::new(VirtualFile {
                    name: None,
                    descriptor: descriptor.clone(),
                }));
                continue;
            };

            let canonical = hashing::canonicalize(&path);
            named.push((canonical.clone(), descriptor.clone()));

            let segments: Vec<&BStr> = hashing::segments(canonical.as_bstr()).collect();
            let Some((leaf, parents)) = segments.split_last() else {
                warn!(
                    "dictionary entry for hash {:#x} canonicalizes to an empty path",
                    descriptor.hash
                );
                list.push(Arc::new(VirtualFile {
                    name: None,
                    descriptor: descriptor.clone(),
                }));
                continue;
            };

            let file = Arc::new(VirtualFile {
                name: Some(BString::from(*leaf)),
                descriptor: descriptor.clone(),
            });
            if cache.contains_key(canonical.as_bstr()) {
                warn!("duplicate file for name \"{canonical}\"");
            } else {
                cache.insert(canonical.clone(), Arc::clone(&file));
                let mut current = &mut root;
                for parent in parents {
                    current = current
                        .directories
                        .entry(BString::from(*parent))
                        .or_insert_with(|| VirtualDirectory::new(parent));
                }
                current.files.insert(BString::from(*leaf), Arc::clone(&file));
            }
            list.push(file);
        }

        Self {
            name: name.into(),
            archive,
            dictionary,
            cache,
            list,
            named,
            root,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Every `(canonical path, descriptor)` pair the dictionary could name,
    /// duplicates included.
    pub fn named(&self) -> impl Iterator<Item = (&BStr, &FileDescriptor)> {
        self.named
            .iter()
            .map(|(path, descriptor)| (path.as_bstr(), descriptor))
    }

    /// Reads a file's payload through the backing archive, fanning range
    /// decryption out across the worker pool.
    pub fn read(&self, file: &VirtualFile) -> Result<FileData> {
        self.archive.read_threaded(&file.descriptor)
    }

    /// Resolves a zero-copy view of the file inside the shared mapping.
    pub fn mapped(&self, file: &VirtualFile) -> Result<Bytes> {
        self.archive.mapped(&file.descriptor)
    }
}

impl VirtualFileSystem for ArchiveFileSystem {
    fn is_read_only(&self) -> bool {
        true
    }

    fn root(&self) -> &VirtualDirectory {
        &self.root
    }

    fn resolve(&self, path: &BStr) -> Option<Arc<VirtualFile>> {
        let canonical = hashing::canonicalize(path);
        if let Some(file) = self.cache.get(canonical.as_bstr()) {
            return Some(Arc::clone(file));
        }

        // The file wasn't cached, so the dictionary and the archive may
        // disagree. As a fallback, do the hash lookup manually over the flat
        // list; this recovers files a stale dictionary cannot name.
        let hash = self.dictionary.compute_hash(canonical.as_bstr());
        let mut matches = self
            .list
            .iter()
            .filter(|file| file.descriptor.hash == hash);
        let first = matches.next()?;
        if matches.next().is_some() {
            warn!("found more than one file for path \"{canonical}\", hash {hash:#x}");
        }
        warn!("file for path \"{canonical}\" was not in the lookup cache, recovered by hash {hash:#x}");
        Some(Arc::clone(first))
    }

    fn directory_exists(&self, path: &BStr) -> bool {
        let canonical = hashing::canonicalize(path);
        let mut current = &self.root;
        for segment in hashing::segments(canonical.as_bstr()) {
            match current.directories.get(segment) {
                Some(directory) => current = directory,
                None => return false,
            }
        }
        true
    }

    fn files(&self) -> Box<dyn Iterator<Item = Arc<VirtualFile>> + '_> {
        Box::new(self.list.iter().map(Arc::clone))
    }

    fn create_file(&mut self, _path: &BStr) -> Result<Arc<VirtualFile>> {
        Err(Error::ReadOnly)
    }

    fn delete_file(&mut self, _path: &BStr) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn move_file(&mut self, _from: &BStr, _to: &BStr) -> Result<()> {
        Err(Error::ReadOnly)
    }
}

/// A backend with nothing in it. Useful as a placeholder where a workspace
/// has no archive mounted.
#[derive(Default)]
pub struct EmptyFileSystem {
    root: VirtualDirectory,
}

impl VirtualFileSystem for EmptyFileSystem {
    fn is_read_only(&self) -> bool {
        true
    }

    fn root(&self) -> &VirtualDirectory {
        &self.root
    }

    fn resolve(&self, _path: &BStr) -> Option<Arc<VirtualFile>> {
        None
    }

    fn directory_exists(&self, path: &BStr) -> bool {
        let canonical = hashing::canonicalize(path);
        hashing::segments(canonical.as_bstr()).count() == 0
    }

    fn files(&self) -> Box<dyn Iterator<Item = Arc<VirtualFile>> + '_> {
        Box::new(core::iter::empty())
    }

    fn create_file(&mut self, _path: &BStr) -> Result<Arc<VirtualFile>> {
        Err(Error::ReadOnly)
    }

    fn delete_file(&mut self, _path: &BStr) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn move_file(&mut self, _from: &BStr, _to: &BStr) -> Result<()> {
        Err(Error::ReadOnly)
    }
}
