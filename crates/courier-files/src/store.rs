//! Content store: identity hashing, directory expansion, and chunk I/O.
//!
//! The store hides the local filesystem from the protocol engines. It
//! resolves announce paths into [`FileDescriptor`]s (hashing file contents
//! into stable identities, consulting the persistent cache first), serves
//! positional chunk reads for the sending side, and reassembles received
//! chunks with positional appends on the receiving side.

use crate::cache::IdentityCache;
use crate::descriptor::{FileDescriptor, FileId};
use sha1::{Digest, Sha1};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Read buffer size for the streaming hash pass.
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Filesystem gateway shared by every protocol engine.
///
/// All methods take `&self`; the only interior state is the identity cache,
/// guarded by its own lock.
#[derive(Default)]
pub struct ContentStore {
    cache: Mutex<IdentityCache>,
}

impl ContentStore {
    /// Create a store with caching disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the identity cache at a backing file, or disable it with `None`.
    ///
    /// Switching paths flushes the current contents to the old file and
    /// replaces them with whatever the new file holds. Disabling discards
    /// the in-memory state without flushing.
    pub fn set_cache_path(&self, path: Option<PathBuf>) {
        self.cache.lock().expect("cache lock poisoned").set_backing(path);
    }

    /// Drop cache entries whose file vanished or changed since they were
    /// recorded, then rewrite the blob.
    pub fn clean_cache(&self) {
        self.cache.lock().expect("cache lock poisoned").clean();
    }

    /// Resolve announce paths into descriptors.
    ///
    /// Files are hashed directly; directories are expanded breadth-first and
    /// every readable file inside becomes one descriptor sharing the
    /// directory as its shared path. Paths that do not exist, cannot be read,
    /// or fail to hash are reported back instead of aborting the walk.
    pub fn resolve(&self, paths: &[PathBuf], owner: &str) -> (Vec<FileDescriptor>, Vec<PathBuf>) {
        let mut descriptors = Vec::new();
        let mut failed = Vec::new();

        for path in paths {
            let Ok(meta) = fs::metadata(path) else {
                failed.push(path.clone());
                continue;
            };

            if meta.is_file() {
                let shared = path.parent().unwrap_or(Path::new("")).to_path_buf();
                match self.describe(path, &shared, owner) {
                    Some(fd) => descriptors.push(fd),
                    None => failed.push(path.clone()),
                }
            } else {
                self.expand_directory(path, owner, &mut descriptors, &mut failed);
            }
        }

        (descriptors, failed)
    }

    /// Breadth-first walk collecting a descriptor per readable file.
    fn expand_directory(
        &self,
        root: &Path,
        owner: &str,
        descriptors: &mut Vec<FileDescriptor>,
        failed: &mut Vec<PathBuf>,
    ) {
        let mut queue = VecDeque::from([root.to_path_buf()]);

        while let Some(dir) = queue.pop_front() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!("cannot read directory {}: {err}", dir.display());
                    failed.push(dir);
                    continue;
                }
            };

            for entry in entries {
                let Ok(entry) = entry else { continue };
                let child = entry.path();
                match entry.file_type() {
                    Ok(ft) if ft.is_dir() => queue.push_back(child),
                    Ok(ft) if ft.is_file() => match self.describe(&child, root, owner) {
                        Some(fd) => descriptors.push(fd),
                        None => failed.push(child),
                    },
                    // symlinks and specials are skipped, unreadable entries reported
                    Ok(_) => {}
                    Err(_) => failed.push(child),
                }
            }
        }
    }

    /// Build one descriptor, consulting the cache before hashing.
    fn describe(&self, path: &Path, shared_root: &Path, owner: &str) -> Option<FileDescriptor> {
        let meta = fs::metadata(path).ok()?;
        let modified = meta.modified().ok()?;

        let cached = self
            .cache
            .lock()
            .expect("cache lock poisoned")
            .lookup(path, modified);

        let file_id = match cached {
            Some(id) => id,
            None => {
                let id = match hash_file(path) {
                    Ok(id) => id,
                    Err(err) => {
                        tracing::warn!("failed to hash {}: {err}", path.display());
                        return None;
                    }
                };
                self.cache
                    .lock()
                    .expect("cache lock poisoned")
                    .record(path.to_path_buf(), id, modified);
                id
            }
        };

        let parent = path.parent().unwrap_or(Path::new(""));
        let relative_path = parent
            .strip_prefix(shared_root)
            .map(|rel| rel.to_string_lossy().into_owned())
            .unwrap_or_default();

        Some(FileDescriptor {
            owner: owner.to_string(),
            shared_path: shared_root.to_string_lossy().into_owned(),
            relative_path,
            filename: path.file_name()?.to_string_lossy().into_owned(),
            file_id,
            size: meta.len(),
        })
    }

    /// Positional read of up to `length` bytes starting at `offset`.
    ///
    /// The returned buffer is truncated at end of file, so the final chunk of
    /// a transfer comes back shorter than requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the read fails.
    pub fn read_chunk(&self, path: &Path, offset: u64, length: usize) -> io::Result<Vec<u8>> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            let read = file.read(&mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Positional write of a received chunk, creating missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the parents cannot be created, the file cannot be
    /// opened for writing, or the write fails.
    pub fn append_chunk(&self, path: &Path, offset: u64, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().write(true).create(true).open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    /// Delete a file, refusing targets without write permission.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, read-only, or removal fails.
    pub fn delete(&self, path: &Path) -> io::Result<()> {
        let meta = fs::metadata(path)?;
        if meta.permissions().readonly() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "target is read-only",
            ));
        }
        tracing::debug!("removing {}", path.display());
        fs::remove_file(path)
    }

    /// Whether `path` is an existing directory transfers can be saved into.
    #[must_use]
    pub fn is_writable_dir(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok_and(|meta| meta.is_dir() && !meta.permissions().readonly())
    }
}

/// Streaming SHA-1 over the full byte stream, bounded memory.
fn hash_file(path: &Path) -> io::Result<FileId> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(FileId(hasher.finalize().into()))
}
