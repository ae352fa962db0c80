//! Receiving side of chunked transfers.
//!
//! The receiver issues data requests carrying its own maximum chunk size,
//! appends arriving chunks positionally, and distinguishes pause (partial
//! file and status kept, resumable) from cancel (both discarded). Chunks
//! whose offset lies behind the byte counter are duplicates from the wire
//! and are dropped, not treated as errors.

use crate::action::Action;
use crate::config::SharingConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result, StatusCode};
use crate::listener::FileCompletedListener;
use crate::progress::ProgressDescriptor;
use crate::visibility::PeerVisibilityStore;
use courier_files::{ContentStore, FileDescriptor, FileId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

/// Receive-side record of one transfer being reassembled.
struct ReceiveStatus {
    peer: String,
    length: u64,
    bytes_received: u64,
    save_name: String,
    save_dir: PathBuf,
}

impl ReceiveStatus {
    fn save_path(&self) -> PathBuf {
        self.save_dir.join(&self.save_name)
    }
}

/// Engine requesting files and reassembling their chunks.
pub struct TransferReceiver {
    dispatcher: Arc<Dispatcher>,
    content: Arc<ContentStore>,
    visibility: Arc<PeerVisibilityStore>,
    config: Arc<SharingConfig>,
    receiving: Mutex<HashMap<FileId, ReceiveStatus>>,
    completed_listener: RwLock<Option<Arc<dyn FileCompletedListener>>>,
}

impl TransferReceiver {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        content: Arc<ContentStore>,
        visibility: Arc<PeerVisibilityStore>,
        config: Arc<SharingConfig>,
    ) -> Self {
        Self {
            dispatcher,
            content,
            visibility,
            config,
            receiving: Mutex::new(HashMap::new()),
            completed_listener: RwLock::new(None),
        }
    }

    /// Request a file from its owner, waiting for the owner's status.
    ///
    /// # Errors
    ///
    /// [`Error::BadFilePath`] for an unusable save directory; transport
    /// errors for a refused request.
    pub async fn request(
        &self,
        file: &FileDescriptor,
        save_name: String,
        save_dir: Option<PathBuf>,
    ) -> Result<()> {
        let action = self.prepare_request(file, save_name, save_dir)?;
        self.dispatcher.call_now(&action).await.into_result()
    }

    /// Request a file through the dispatcher queue, fire-and-forget.
    ///
    /// Used by the offer handshake, where the answer travels out of band.
    ///
    /// # Errors
    ///
    /// [`Error::BadFilePath`] for an unusable save directory.
    pub fn request_queued(
        &self,
        file: &FileDescriptor,
        save_name: String,
        save_dir: Option<PathBuf>,
    ) -> Result<()> {
        let action = self.prepare_request(file, save_name, save_dir)?;
        self.dispatcher.enqueue(action);
        Ok(())
    }

    /// Request a file by identity from a specific peer's visible set.
    ///
    /// # Errors
    ///
    /// [`Error::BadFileId`] when the peer never announced or offered the
    /// identity, plus everything [`Self::request`] can return.
    pub async fn request_by_id(
        &self,
        peer: &str,
        file_id: &FileId,
        save_name: String,
        save_dir: Option<PathBuf>,
    ) -> Result<()> {
        let Some(fd) = self.visibility.known_remote_descriptor(file_id, peer) else {
            return Err(Error::BadFileId(*file_id));
        };
        self.request(&fd, save_name, save_dir).await
    }

    /// Inbound chunk: append and advance, or drop duplicates.
    pub fn handle_chunk(&self, file_id: &FileId, start_byte: u64, chunk: &[u8]) {
        let mut completed: Option<String> = None;
        {
            let mut receiving = self.receiving.lock().expect("receiving lock poisoned");
            let Some(status) = receiving.get_mut(file_id) else {
                tracing::trace!("chunk for unknown transfer {} dropped", file_id.short());
                return;
            };

            if start_byte < status.bytes_received {
                tracing::debug!(
                    "duplicate chunk at {start_byte} for {} dropped",
                    file_id.short()
                );
                return;
            }

            let path = status.save_path();
            if let Err(err) = self.content.append_chunk(&path, start_byte, chunk) {
                tracing::error!("cannot append to {}: {err}", path.display());
                return;
            }

            status.bytes_received += chunk.len() as u64;
            if status.bytes_received >= status.length {
                tracing::debug!("transfer {} completed", file_id.short());
                completed = Some(status.save_name.clone());
                receiving.remove(file_id);
            }
        }

        if let Some(filename) = completed {
            self.fire_completed(&filename, StatusCode::Ok);
        }
    }

    /// Pause an inbound transfer: stop the sender, keep the partial file
    /// and the status so the transfer can be resumed later.
    ///
    /// # Errors
    ///
    /// [`Error::FileNotBeingTransferred`] when no transfer matches.
    pub fn pause(&self, file_id: &FileId) -> Result<()> {
        let receiving = self.receiving.lock().expect("receiving lock poisoned");
        let Some(status) = receiving.get(file_id) else {
            return Err(Error::FileNotBeingTransferred(*file_id));
        };
        self.dispatcher.enqueue(Action::StopTransfer {
            peer: status.peer.clone(),
            file_id: *file_id,
        });
        Ok(())
    }

    /// Cancel an inbound transfer: stop the sender, drop the status, and
    /// delete the partial file. The distinguishing behavior versus pause.
    ///
    /// # Errors
    ///
    /// [`Error::FileNotBeingTransferred`] when no transfer matches.
    pub fn cancel(&self, file_id: &FileId) -> Result<()> {
        let status = {
            let mut receiving = self.receiving.lock().expect("receiving lock poisoned");
            receiving
                .remove(file_id)
                .ok_or(Error::FileNotBeingTransferred(*file_id))?
        };

        self.dispatcher.enqueue(Action::StopTransfer {
            peer: status.peer.clone(),
            file_id: *file_id,
        });

        let path = status.save_path();
        if path.exists() {
            if let Err(err) = self.content.delete(&path) {
                tracing::warn!("cannot delete partial file {}: {err}", path.display());
            }
        }
        Ok(())
    }

    /// Inbound sender-initiated cancellation.
    ///
    /// The partial file and the status are retained so the transfer can be
    /// resumed against another source; only the listener is told.
    pub fn handle_cancelled(&self, file_id: &FileId, peer: &str) {
        tracing::debug!("{peer} cancelled transfer {}", file_id.short());
        let filename = self
            .receiving
            .lock()
            .expect("receiving lock poisoned")
            .get(file_id)
            .map(|s| s.save_name.clone());
        if let Some(filename) = filename {
            self.fire_completed(&filename, StatusCode::Cancelled);
        }
    }

    /// Snapshot of every inbound transfer in flight.
    #[must_use]
    pub fn progress_list(&self) -> Vec<ProgressDescriptor> {
        self.receiving
            .lock()
            .expect("receiving lock poisoned")
            .iter()
            .map(|(file_id, s)| ProgressDescriptor {
                file_id: *file_id,
                file_size: s.length,
                bytes_transferred: s.bytes_received,
            })
            .collect()
    }

    /// Register the completion listener.
    pub fn set_completed_listener(&self, listener: Option<Arc<dyn FileCompletedListener>>) {
        *self.completed_listener.write().expect("listener lock poisoned") = listener;
    }

    /// Drop all receive-side records when the session changes.
    pub fn reset_state(&self) {
        self.receiving.lock().expect("receiving lock poisoned").clear();
    }

    fn prepare_request(
        &self,
        file: &FileDescriptor,
        save_name: String,
        save_dir: Option<PathBuf>,
    ) -> Result<Action> {
        let root = save_dir.unwrap_or_else(|| self.config.default_save_dir());
        if !self.content.is_writable_dir(&root) {
            return Err(Error::BadFilePath(root.to_string_lossy().into_owned()));
        }

        let mut receiving = self.receiving.lock().expect("receiving lock poisoned");
        let status = receiving.entry(file.file_id).or_insert_with(|| {
            let mut save_dir = root;
            if !file.relative_path.is_empty() {
                save_dir.push(&file.relative_path);
            }
            ReceiveStatus {
                peer: file.owner.clone(),
                length: file.size,
                bytes_received: 0,
                save_name,
                save_dir,
            }
        });

        Ok(Action::RequestData {
            peer: file.owner.clone(),
            file_id: file.file_id,
            start_byte: status.bytes_received,
            length: file.size,
            max_chunk: self.config.max_chunk_size(),
        })
    }

    fn fire_completed(&self, filename: &str, status: StatusCode) {
        if let Some(listener) = self.completed_listener.read().expect("listener lock poisoned").clone()
        {
            listener.file_completed(filename, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        receiver: Arc<TransferReceiver>,
        transport: Arc<RecordingTransport>,
        config: Arc<SharingConfig>,
        dir: TempDir,
        _consumer: tokio::task::JoinHandle<()>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = Arc::new(Dispatcher::new(Some(transport.clone())));
        let consumer = dispatcher.spawn();
        let config = Arc::new(SharingConfig::new(Some("me".into())));
        let dir = TempDir::new().unwrap();
        config.set_default_save_dir(dir.path().to_path_buf()).unwrap();
        let receiver = Arc::new(TransferReceiver::new(
            dispatcher,
            Arc::new(ContentStore::new()),
            Arc::new(PeerVisibilityStore::new()),
            config.clone(),
        ));
        Fixture { receiver, transport, config, dir, _consumer: consumer }
    }

    fn remote_fd(id: u8, size: u64) -> FileDescriptor {
        FileDescriptor {
            owner: "peer-b".into(),
            shared_path: String::new(),
            relative_path: String::new(),
            filename: "incoming.bin".into(),
            file_id: FileId([id; 20]),
            size,
        }
    }

    #[tokio::test]
    async fn request_carries_configured_max_chunk() {
        let fx = fixture();
        fx.config.set_max_chunk_size(512).unwrap();

        fx.receiver
            .request(&remote_fd(1, 100), "incoming.bin".into(), None)
            .await
            .unwrap();

        let calls = fx.transport.calls();
        assert_eq!(calls.len(), 1);
        let Action::RequestData { start_byte, length, max_chunk, peer, .. } = &calls[0] else {
            panic!("expected data request");
        };
        assert_eq!(*start_byte, 0);
        assert_eq!(*length, 100);
        assert_eq!(*max_chunk, 512);
        assert_eq!(peer, "peer-b");
    }

    #[tokio::test]
    async fn invalid_save_dir_is_rejected() {
        let fx = fixture();
        let result = fx
            .receiver
            .request(
                &remote_fd(1, 10),
                "x.bin".into(),
                Some(PathBuf::from("/definitely/not/a/dir")),
            )
            .await;
        assert!(matches!(result, Err(Error::BadFilePath(_))));
    }

    #[tokio::test]
    async fn chunks_reassemble_and_fire_completion() {
        let fx = fixture();

        struct Recorder(std::sync::Mutex<Vec<(String, StatusCode)>>);
        impl FileCompletedListener for Recorder {
            fn file_completed(&self, filename: &str, status: StatusCode) {
                self.0.lock().unwrap().push((filename.into(), status));
            }
        }
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        fx.receiver.set_completed_listener(Some(recorder.clone()));

        let fd = remote_fd(1, 10);
        fx.receiver.request(&fd, "incoming.bin".into(), None).await.unwrap();

        fx.receiver.handle_chunk(&fd.file_id, 0, b"01234");
        fx.receiver.handle_chunk(&fd.file_id, 5, b"56789");

        let saved = fx.dir.path().join("incoming.bin");
        assert_eq!(fs::read(&saved).unwrap(), b"0123456789");
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[("incoming.bin".to_string(), StatusCode::Ok)]
        );
        assert!(fx.receiver.progress_list().is_empty());
    }

    #[tokio::test]
    async fn duplicate_chunk_advances_counter_once() {
        let fx = fixture();
        let fd = remote_fd(2, 10);
        fx.receiver.request(&fd, "dup.bin".into(), None).await.unwrap();

        fx.receiver.handle_chunk(&fd.file_id, 0, b"01234");
        fx.receiver.handle_chunk(&fd.file_id, 0, b"01234");

        let progress = fx.receiver.progress_list();
        assert_eq!(progress[0].bytes_transferred, 5);
    }

    #[tokio::test]
    async fn resumed_request_starts_at_received_count() {
        let fx = fixture();
        let fd = remote_fd(3, 10);
        fx.receiver.request(&fd, "resume.bin".into(), None).await.unwrap();
        fx.receiver.handle_chunk(&fd.file_id, 0, b"0123");

        fx.receiver.request(&fd, "resume.bin".into(), None).await.unwrap();
        let calls = fx.transport.calls();
        let Action::RequestData { start_byte, .. } = &calls[1] else {
            panic!("expected data request");
        };
        assert_eq!(*start_byte, 4);
    }

    #[tokio::test]
    async fn pause_keeps_partial_file_cancel_deletes_it() {
        let fx = fixture();
        let fd = remote_fd(4, 10);
        fx.receiver.request(&fd, "partial.bin".into(), None).await.unwrap();
        fx.receiver.handle_chunk(&fd.file_id, 0, b"0123");

        let saved = fx.dir.path().join("partial.bin");

        fx.receiver.pause(&fd.file_id).unwrap();
        assert!(saved.exists());
        assert_eq!(fx.receiver.progress_list().len(), 1);

        fx.receiver.cancel(&fd.file_id).unwrap();
        assert!(!saved.exists());
        assert!(fx.receiver.progress_list().is_empty());

        assert_eq!(
            fx.receiver.pause(&fd.file_id),
            Err(Error::FileNotBeingTransferred(fd.file_id))
        );
    }

    #[tokio::test]
    async fn sender_cancel_retains_partial_file() {
        let fx = fixture();

        struct Recorder(std::sync::Mutex<Vec<StatusCode>>);
        impl FileCompletedListener for Recorder {
            fn file_completed(&self, _: &str, status: StatusCode) {
                self.0.lock().unwrap().push(status);
            }
        }
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        fx.receiver.set_completed_listener(Some(recorder.clone()));

        let fd = remote_fd(5, 10);
        fx.receiver.request(&fd, "kept.bin".into(), None).await.unwrap();
        fx.receiver.handle_chunk(&fd.file_id, 0, b"0123");

        fx.receiver.handle_cancelled(&fd.file_id, "peer-b");

        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[StatusCode::Cancelled]);
        assert!(fx.dir.path().join("kept.bin").exists());
        // resumable: the status survives
        assert_eq!(fx.receiver.progress_list().len(), 1);
    }

    #[tokio::test]
    async fn request_by_id_needs_a_visible_descriptor() {
        let fx = fixture();
        let missing = FileId([9; 20]);
        let result = fx
            .receiver
            .request_by_id("peer-b", &missing, "x.bin".into(), None)
            .await;
        assert_eq!(result, Err(Error::BadFileId(missing)));
    }

    #[tokio::test]
    async fn relative_path_lands_under_save_dir() {
        let fx = fixture();
        let mut fd = remote_fd(6, 4);
        fd.relative_path = "nested".into();
        fx.receiver.request(&fd, "deep.bin".into(), None).await.unwrap();

        fx.receiver.handle_chunk(&fd.file_id, 0, b"abcd");
        assert!(fx.dir.path().join("nested").join("deep.bin").exists());
    }
}
