//! Peer visibility bookkeeping.
//!
//! Four relations track who may see what:
//! - **local announced**: files this peer broadcast, keyed by identity
//! - **local offered**: files granted ad hoc (offers, directed requests)
//! - **remote announced**: each peer's current broadcast snapshot,
//!   replaced wholesale on every inbound announcement
//! - **remote offered**: ad-hoc grants received from peers, appended per
//!   directed offer response and never replaced
//!
//! The replace/append asymmetry is deliberate: a broadcast is a snapshot of
//! "what this peer currently shares" while directed offers form a growing
//! grant list.
//!
//! Each relation sits behind its own map; every public method is atomic
//! with respect to its own relation and no method takes two relations'
//! locks, so cross-relation reads are point-in-time only.

use courier_files::{FileDescriptor, FileId};
use dashmap::DashMap;
use std::collections::HashSet;
use std::path::Path;

/// Thread-safe store of the four visibility relations.
#[derive(Default)]
pub struct PeerVisibilityStore {
    local_announced: DashMap<FileId, FileDescriptor>,
    local_offered: DashMap<FileId, FileDescriptor>,
    remote_announced: DashMap<String, Vec<FileDescriptor>>,
    remote_offered: DashMap<String, Vec<FileDescriptor>>,
}

impl PeerVisibilityStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge freshly resolved descriptors into the announced set.
    ///
    /// Keyed by identity: re-announcing a file replaces its prior entry.
    pub fn add_local_announced(&self, files: &[FileDescriptor]) {
        for fd in files {
            self.local_announced.insert(fd.file_id, fd.clone());
        }
    }

    /// Remove announced entries matching the given paths.
    ///
    /// Returns the subset of input paths that matched nothing.
    pub fn remove_local_announced_by_paths(&self, paths: &[std::path::PathBuf]) -> Vec<std::path::PathBuf> {
        let mut remaining: Vec<_> = paths.to_vec();

        let current: Vec<(FileId, std::path::PathBuf)> = self
            .local_announced
            .iter()
            .map(|entry| (*entry.key(), entry.value().absolute_path()))
            .collect();

        for (id, path) in current {
            if let Some(pos) = remaining.iter().position(|p| *p == path) {
                self.local_announced.remove(&id);
                remaining.remove(pos);
            }
        }

        remaining
    }

    /// Register a file granted outside the broadcast announcement flow.
    pub fn add_local_offered(&self, fd: FileDescriptor) {
        self.local_offered.insert(fd.file_id, fd);
    }

    /// Replace a peer's entire announced snapshot.
    pub fn replace_remote_announced(&self, peer: &str, files: Vec<FileDescriptor>) {
        self.remote_announced.insert(peer.to_string(), files);
    }

    /// Append one descriptor to a peer's offered grant list.
    pub fn add_remote_offered(&self, peer: &str, fd: FileDescriptor) {
        self.remote_offered.entry(peer.to_string()).or_default().push(fd);
    }

    /// Snapshot of the local announced set.
    #[must_use]
    pub fn local_announced(&self) -> Vec<FileDescriptor> {
        self.local_announced.iter().map(|e| e.value().clone()).collect()
    }

    /// Snapshot of the local offered set.
    #[must_use]
    pub fn local_offered(&self) -> Vec<FileDescriptor> {
        self.local_offered.iter().map(|e| e.value().clone()).collect()
    }

    /// Deduplicated union of everything remote peers made visible to us.
    ///
    /// Dedup is by descriptor value equality, not reference: the same file
    /// announced by two peers stays distinct because the owner differs.
    #[must_use]
    pub fn remote_files(&self) -> Vec<FileDescriptor> {
        let mut seen: HashSet<FileDescriptor> = HashSet::new();
        for entry in self.remote_announced.iter() {
            seen.extend(entry.value().iter().cloned());
        }
        for entry in self.remote_offered.iter() {
            seen.extend(entry.value().iter().cloned());
        }
        seen.into_iter().collect()
    }

    /// Identity of the remote file at `path` owned by `peer`, if visible.
    #[must_use]
    pub fn file_id_for(&self, peer: &str, path: &Path) -> Option<FileId> {
        self.remote_files()
            .into_iter()
            .find(|fd| fd.owner == peer && fd.absolute_path() == path)
            .map(|fd| fd.file_id)
    }

    /// Local descriptor for an identity, announced entries first.
    #[must_use]
    pub fn local_descriptor(&self, file_id: &FileId) -> Option<FileDescriptor> {
        self.local_announced
            .get(file_id)
            .or_else(|| self.local_offered.get(file_id))
            .map(|e| e.value().clone())
    }

    /// Local descriptor whose reconstructed path matches, announced first.
    #[must_use]
    pub fn local_descriptor_by_path(&self, path: &Path) -> Option<FileDescriptor> {
        self.local_announced
            .iter()
            .chain(self.local_offered.iter())
            .find(|e| e.value().absolute_path() == path)
            .map(|e| e.value().clone())
    }

    /// Descriptor a specific peer made visible for `file_id`, if any.
    #[must_use]
    pub fn known_remote_descriptor(&self, file_id: &FileId, peer: &str) -> Option<FileDescriptor> {
        if let Some(files) = self.remote_announced.get(peer) {
            if let Some(fd) = files.iter().find(|fd| fd.file_id == *file_id) {
                return Some(fd.clone());
            }
        }
        self.remote_offered
            .get(peer)
            .and_then(|files| files.iter().find(|fd| fd.file_id == *file_id).cloned())
    }

    /// Whether the identity is in the announced set.
    #[must_use]
    pub fn is_announced(&self, file_id: &FileId) -> bool {
        self.local_announced.contains_key(file_id)
    }

    /// Whether the identity is in the offered set.
    #[must_use]
    pub fn is_offered(&self, file_id: &FileId) -> bool {
        self.local_offered.contains_key(file_id)
    }

    /// Rewrite the owner of every local descriptor after a session change.
    ///
    /// In-flight local records stay intact; remote relations are left as-is
    /// (stale entries age out when the peer re-announces).
    pub fn reset_owner(&self, owner: Option<&str>) {
        let owner = owner.unwrap_or_default();
        for mut entry in self.local_announced.iter_mut() {
            entry.value_mut().owner = owner.to_string();
        }
        for mut entry in self.local_offered.iter_mut() {
            entry.value_mut().owner = owner.to_string();
        }
    }
}
