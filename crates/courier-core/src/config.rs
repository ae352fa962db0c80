//! Shared engine configuration and session identity.
//!
//! One `SharingConfig` is constructed per node and handed to every engine
//! by reference; there is no global state. Flag reads are lock-free.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Default maximum chunk size in bytes for inbound data requests.
pub const DEFAULT_MAX_CHUNK_SIZE: u32 = 1024;

/// Default offer wait window in milliseconds, substituted for negative
/// timeouts.
pub const DEFAULT_OFFER_TIMEOUT_MS: u64 = 5000;

/// Peer-visible configuration plus the local session identity.
pub struct SharingConfig {
    show_relative_path: AtomicBool,
    show_shared_path: AtomicBool,
    max_chunk_size: AtomicU32,
    default_save_dir: RwLock<PathBuf>,
    local_peer: RwLock<Option<String>>,
}

impl SharingConfig {
    /// Config with default visibility (relative path shown, shared path
    /// hidden), default chunk size, and the system temp dir as save target.
    #[must_use]
    pub fn new(local_peer: Option<String>) -> Self {
        Self {
            show_relative_path: AtomicBool::new(true),
            show_shared_path: AtomicBool::new(false),
            max_chunk_size: AtomicU32::new(DEFAULT_MAX_CHUNK_SIZE),
            default_save_dir: RwLock::new(std::env::temp_dir()),
            local_peer: RwLock::new(local_peer),
        }
    }

    /// Whether announced descriptors expose their relative path.
    #[must_use]
    pub fn show_relative_path(&self) -> bool {
        self.show_relative_path.load(Ordering::Relaxed)
    }

    /// Toggle relative-path visibility.
    pub fn set_show_relative_path(&self, show: bool) {
        self.show_relative_path.store(show, Ordering::Relaxed);
    }

    /// Whether announced descriptors expose their shared root.
    #[must_use]
    pub fn show_shared_path(&self) -> bool {
        self.show_shared_path.load(Ordering::Relaxed)
    }

    /// Toggle shared-path visibility.
    pub fn set_show_shared_path(&self, show: bool) {
        self.show_shared_path.store(show, Ordering::Relaxed);
    }

    /// Largest chunk advertised in outbound data requests.
    #[must_use]
    pub fn max_chunk_size(&self) -> u32 {
        self.max_chunk_size.load(Ordering::Relaxed)
    }

    /// Set the maximum chunk size; must be greater than zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] for zero.
    pub fn set_max_chunk_size(&self, size: u32) -> Result<()> {
        if size == 0 {
            return Err(Error::Invalid("max chunk size must be > 0"));
        }
        self.max_chunk_size.store(size, Ordering::Relaxed);
        Ok(())
    }

    /// Directory transfers are saved into when the caller names none.
    #[must_use]
    pub fn default_save_dir(&self) -> PathBuf {
        self.default_save_dir.read().expect("save dir lock poisoned").clone()
    }

    /// Change the default save directory, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadFilePath`] if the directory cannot be created.
    pub fn set_default_save_dir(&self, dir: PathBuf) -> Result<()> {
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir)
                .map_err(|_| Error::BadFilePath(dir.to_string_lossy().into_owned()))?;
        }
        *self.default_save_dir.write().expect("save dir lock poisoned") = dir;
        Ok(())
    }

    /// Local peer identity bound to the active session, if any.
    #[must_use]
    pub fn local_peer(&self) -> Option<String> {
        self.local_peer.read().expect("local peer lock poisoned").clone()
    }

    /// Rebind the local peer identity when the session changes.
    pub fn set_local_peer(&self, peer: Option<String>) {
        *self.local_peer.write().expect("local peer lock poisoned") = peer;
    }
}
