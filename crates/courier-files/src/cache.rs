//! Persistent path-to-identity cache.
//!
//! Hashing a large file is the slow path of every announcement, so resolved
//! identities are remembered per absolute path together with the file's
//! modification time. An entry is honored only while the live file's mtime
//! still matches; anything else falls through to a full rehash.
//!
//! The whole map is persisted as a single JSON blob rewritten in full after
//! every mutation. Announcements are rare next to transfer traffic, so the
//! simplicity wins over incremental writes.

use crate::descriptor::FileId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Clone, Serialize, Deserialize)]
struct CacheEntry {
    file_id: FileId,
    modified: SystemTime,
}

/// In-memory identity cache with an optional backing file.
///
/// Caching is disabled until a backing path is supplied. Disabling again
/// discards the in-memory state without flushing.
#[derive(Default)]
pub(crate) struct IdentityCache {
    backing: Option<PathBuf>,
    entries: Option<HashMap<PathBuf, CacheEntry>>,
}

impl IdentityCache {
    /// Point the cache at a new backing file, or disable it with `None`.
    ///
    /// Switching between two paths flushes the current contents to the old
    /// file before loading whatever the new file holds.
    pub(crate) fn set_backing(&mut self, path: Option<PathBuf>) {
        match path {
            Some(new_path) => {
                if self.backing.as_deref() != Some(new_path.as_path()) {
                    self.flush();
                    self.entries = Some(load_entries(&new_path));
                    self.backing = Some(new_path);
                }
            }
            None => {
                self.backing = None;
                self.entries = None;
            }
        }
    }

    /// Look up a cached identity, honored only on a matching mtime.
    pub(crate) fn lookup(&self, path: &Path, modified: SystemTime) -> Option<FileId> {
        let entry = self.entries.as_ref()?.get(path)?;
        (entry.modified == modified).then_some(entry.file_id)
    }

    /// Record a freshly computed identity and flush the blob.
    pub(crate) fn record(&mut self, path: PathBuf, file_id: FileId, modified: SystemTime) {
        if let Some(entries) = self.entries.as_mut() {
            entries.insert(path, CacheEntry { file_id, modified });
            self.flush();
        }
    }

    /// Drop entries whose file vanished or was modified, then flush.
    pub(crate) fn clean(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.retain(|path, entry| {
                fs::metadata(path)
                    .and_then(|m| m.modified())
                    .is_ok_and(|modified| modified == entry.modified)
            });
            self.flush();
        }
    }

    fn flush(&self) {
        let (Some(backing), Some(entries)) = (&self.backing, &self.entries) else {
            return;
        };
        let result = fs::File::create(backing)
            .map_err(serde_json::Error::io)
            .and_then(|file| serde_json::to_writer(file, entries));
        if let Err(err) = result {
            tracing::warn!("failed to persist identity cache to {}: {err}", backing.display());
        }
    }
}

fn load_entries(path: &Path) -> HashMap<PathBuf, CacheEntry> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            tracing::warn!("ignoring unreadable identity cache {}: {err}", path.display());
            HashMap::new()
        }),
        Err(_) => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(byte: u8) -> FileId {
        FileId([byte; 20])
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = IdentityCache::default();
        assert!(cache.lookup(Path::new("/tmp/x"), SystemTime::now()).is_none());
    }

    #[test]
    fn record_then_lookup_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut cache = IdentityCache::default();
        cache.set_backing(Some(dir.path().join("cache.json")));

        let when = SystemTime::now();
        cache.record(PathBuf::from("/data/a"), id(1), when);

        assert_eq!(cache.lookup(Path::new("/data/a"), when), Some(id(1)));
    }

    #[test]
    fn stale_mtime_misses() {
        let dir = TempDir::new().unwrap();
        let mut cache = IdentityCache::default();
        cache.set_backing(Some(dir.path().join("cache.json")));

        let when = SystemTime::UNIX_EPOCH;
        cache.record(PathBuf::from("/data/a"), id(1), when);

        assert!(cache.lookup(Path::new("/data/a"), SystemTime::now()).is_none());
    }

    #[test]
    fn blob_survives_reload_from_same_path() {
        let dir = TempDir::new().unwrap();
        let backing = dir.path().join("cache.json");
        let when = SystemTime::UNIX_EPOCH;

        let mut cache = IdentityCache::default();
        cache.set_backing(Some(backing.clone()));
        cache.record(PathBuf::from("/data/a"), id(9), when);
        drop(cache);

        let mut reloaded = IdentityCache::default();
        reloaded.set_backing(Some(backing));
        assert_eq!(reloaded.lookup(Path::new("/data/a"), when), Some(id(9)));
    }

    #[test]
    fn disabling_discards_without_flushing() {
        let dir = TempDir::new().unwrap();
        let backing = dir.path().join("cache.json");
        let when = SystemTime::UNIX_EPOCH;

        let mut cache = IdentityCache::default();
        cache.set_backing(Some(backing.clone()));
        cache.record(PathBuf::from("/data/a"), id(1), when);

        // Mutate in memory only, then disable: the extra entry must not land
        // in the blob.
        cache.entries.as_mut().unwrap().insert(
            PathBuf::from("/data/b"),
            CacheEntry { file_id: id(2), modified: when },
        );
        cache.set_backing(None);

        let mut reloaded = IdentityCache::default();
        reloaded.set_backing(Some(backing));
        assert_eq!(reloaded.lookup(Path::new("/data/a"), when), Some(id(1)));
        assert!(reloaded.lookup(Path::new("/data/b"), when).is_none());
    }

    #[test]
    fn clean_drops_missing_files() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("live.bin");
        fs::write(&live, b"content").unwrap();
        let modified = fs::metadata(&live).unwrap().modified().unwrap();

        let mut cache = IdentityCache::default();
        cache.set_backing(Some(dir.path().join("cache.json")));
        cache.record(live.clone(), id(1), modified);
        cache.record(dir.path().join("gone.bin"), id(2), modified);

        cache.clean();

        assert_eq!(cache.lookup(&live, modified), Some(id(1)));
        assert!(cache.lookup(&dir.path().join("gone.bin"), modified).is_none());
    }
}
