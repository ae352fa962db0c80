//! Sending side of chunked transfers.
//!
//! A granted data request queues exactly one chunk; the dispatcher's
//! chunk-sent callback queues the next one after the previous left the
//! queue. That keeps at most one chunk per transfer ahead of the drain, so
//! a receiver-initiated stop takes effect after the chunk already in
//! flight.

use crate::action::Action;
use crate::dispatcher::{ChunkSentHook, Dispatcher};
use crate::error::{Error, Result, StatusCode};
use crate::listener::RequestReceivedListener;
use crate::progress::ProgressDescriptor;
use crate::visibility::PeerVisibilityStore;
use courier_files::{ContentStore, FileId};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

/// Send-side record of one transfer being fed chunk by chunk.
struct SendStatus {
    file_id: FileId,
    start_byte: u64,
    length: u64,
    peer: String,
    bytes_sent: u64,
    chunk_length: u64,
}

/// Engine feeding granted file requests chunk by chunk.
pub struct TransferSender {
    dispatcher: Arc<Dispatcher>,
    content: Arc<ContentStore>,
    visibility: Arc<PeerVisibilityStore>,
    sending: Mutex<Vec<SendStatus>>,
    request_listener: RwLock<Option<Arc<dyn RequestReceivedListener>>>,
}

impl TransferSender {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        content: Arc<ContentStore>,
        visibility: Arc<PeerVisibilityStore>,
    ) -> Self {
        Self {
            dispatcher,
            content,
            visibility,
            sending: Mutex::new(Vec::new()),
            request_listener: RwLock::new(None),
        }
    }

    /// Inbound data request for an announced or offered file.
    ///
    /// Queues the first chunk and, if more remains, registers a status so
    /// the chunk-sent callback keeps feeding until the file is drained.
    pub fn handle_data_request(
        &self,
        file_id: FileId,
        start_byte: u64,
        length: u64,
        peer: &str,
        max_chunk: u32,
    ) -> StatusCode {
        let Some(fd) = self.visibility.local_descriptor(&file_id) else {
            tracing::debug!("data request for unknown identity {}", file_id.short());
            return StatusCode::BadFileId;
        };

        let path = fd.absolute_path();
        let max_chunk = u64::from(max_chunk);
        let first_len = length.min(max_chunk);

        match self.read_and_queue(&path, &file_id, peer, start_byte, first_len) {
            Ok(()) => {}
            Err(status) => return status,
        }

        if length > max_chunk {
            self.sending.lock().expect("sending lock poisoned").push(SendStatus {
                file_id,
                start_byte,
                length,
                peer: peer.to_string(),
                bytes_sent: max_chunk,
                chunk_length: max_chunk,
            });
        }

        if let Some(listener) = self.request_listener.read().expect("listener lock poisoned").clone() {
            listener.file_request_received(&fd.filename);
        }

        tracing::debug!(
            "sending {} to {peer} ({length} bytes from {start_byte}, chunks of {max_chunk})",
            file_id.short()
        );
        StatusCode::Ok
    }

    /// Cancel an outbound transfer and notify the receiver.
    ///
    /// # Errors
    ///
    /// [`Error::FileNotBeingTransferred`] when no transfer matches.
    pub fn cancel(&self, file_id: &FileId) -> Result<()> {
        match self.remove_status(file_id) {
            Some(peer) => {
                self.dispatcher
                    .enqueue(Action::TransferCancelled { peer, file_id: *file_id });
                Ok(())
            }
            None => Err(Error::FileNotBeingTransferred(*file_id)),
        }
    }

    /// Inbound receiver-initiated stop: drop the status without answering.
    /// The requester already knows it asked.
    pub fn handle_stop(&self, file_id: &FileId, peer: &str) {
        tracing::debug!("{peer} stopped transfer {}", file_id.short());
        self.remove_status(file_id);
    }

    /// Snapshot of every outbound transfer in flight.
    #[must_use]
    pub fn progress_list(&self) -> Vec<ProgressDescriptor> {
        self.sending
            .lock()
            .expect("sending lock poisoned")
            .iter()
            .map(|s| ProgressDescriptor {
                file_id: s.file_id,
                file_size: s.length,
                bytes_transferred: s.bytes_sent,
            })
            .collect()
    }

    /// Register the listener notified of granted requests.
    pub fn set_request_listener(&self, listener: Option<Arc<dyn RequestReceivedListener>>) {
        *self.request_listener.write().expect("listener lock poisoned") = listener;
    }

    /// Drop all send-side records when the session changes.
    pub fn reset_state(&self) {
        self.sending.lock().expect("sending lock poisoned").clear();
    }

    fn remove_status(&self, file_id: &FileId) -> Option<String> {
        let mut sending = self.sending.lock().expect("sending lock poisoned");
        let index = sending.iter().position(|s| s.file_id == *file_id)?;
        Some(sending.remove(index).peer)
    }

    fn read_and_queue(
        &self,
        path: &Path,
        file_id: &FileId,
        peer: &str,
        offset: u64,
        length: u64,
    ) -> std::result::Result<(), StatusCode> {
        let chunk = self.content.read_chunk(path, offset, length as usize).map_err(|err| {
            tracing::error!("cannot read {} at {offset}: {err}", path.display());
            StatusCode::BadFilePath
        })?;
        self.dispatcher.enqueue(Action::DataChunk {
            peer: peer.to_string(),
            file_id: *file_id,
            start_byte: offset,
            chunk,
        });
        Ok(())
    }
}

impl ChunkSentHook for TransferSender {
    /// A chunk left the queue: feed the next one for the oldest transfer.
    fn chunk_sent(&self) {
        let mut sending = self.sending.lock().expect("sending lock poisoned");
        let Some(status) = sending.first_mut() else {
            return;
        };

        let Some(fd) = self.visibility.local_descriptor(&status.file_id) else {
            tracing::warn!("descriptor for {} vanished mid-transfer", status.file_id.short());
            sending.remove(0);
            return;
        };
        let path = fd.absolute_path();

        let remaining = status.length - status.bytes_sent;
        let offset = status.start_byte + status.bytes_sent;
        let (len, finished) = if remaining <= status.chunk_length {
            (remaining, true)
        } else {
            (status.chunk_length, false)
        };

        let file_id = status.file_id;
        let peer = status.peer.clone();
        if finished {
            sending.remove(0);
        } else {
            status.bytes_sent += len;
        }
        drop(sending);

        if let Err(_status) = self.read_and_queue(&path, &file_id, &peer, offset, len) {
            // the receiver is still waiting; tell it the transfer died
            self.remove_status(&file_id);
            self.dispatcher.enqueue(Action::TransferCancelled { peer, file_id });
        }
    }
}
