//! Explicit single-file offer negotiation.
//!
//! Offering is a synchronous method call followed by an optional wait: the
//! peer first answers accepted or rejected, and on acceptance the offerer
//! waits until the matching data request arrives or the timeout elapses.
//! At most one local offer is outstanding at a time; the rendezvous between
//! the waiting offer and the inbound request is a oneshot channel, so
//! spurious wakeups cannot produce a false success.

use crate::config::{DEFAULT_OFFER_TIMEOUT_MS, SharingConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result, StatusCode};
use crate::listener::OfferReceivedListener;
use crate::receive::TransferReceiver;
use crate::send::TransferSender;
use crate::action::Action;
use crate::visibility::PeerVisibilityStore;
use courier_files::{ContentStore, FileDescriptor, FileId};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;

struct PendingOffer {
    file_id: FileId,
    rendezvous: oneshot::Sender<()>,
}

/// Engine driving the offer/accept/reject/timeout handshake.
pub struct OfferNegotiator {
    dispatcher: Arc<Dispatcher>,
    content: Arc<ContentStore>,
    visibility: Arc<PeerVisibilityStore>,
    config: Arc<SharingConfig>,
    sender: Arc<TransferSender>,
    receiver: Arc<TransferReceiver>,
    pending: Mutex<Option<PendingOffer>>,
    offer_listener: RwLock<Option<Arc<dyn OfferReceivedListener>>>,
}

impl OfferNegotiator {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        content: Arc<ContentStore>,
        visibility: Arc<PeerVisibilityStore>,
        config: Arc<SharingConfig>,
        sender: Arc<TransferSender>,
        receiver: Arc<TransferReceiver>,
    ) -> Self {
        Self {
            dispatcher,
            content,
            visibility,
            config,
            sender,
            receiver,
            pending: Mutex::new(None),
            offer_listener: RwLock::new(None),
        }
    }

    /// Offer the file at `path` to `peer` and wait for the outcome.
    ///
    /// Timeout semantics: negative substitutes the 5000 ms default, zero
    /// treats acceptance as immediate success without waiting, positive
    /// bounds the wait for the peer's data request.
    ///
    /// # Errors
    ///
    /// [`Error::BadFilePath`] if the path resolves to nothing,
    /// [`Error::OfferRejected`] if the peer declines,
    /// [`Error::OfferTimeout`] if acceptance is not followed by a request
    /// within the window.
    pub async fn offer(&self, peer: &str, path: &Path, timeout_ms: i64) -> Result<()> {
        let fd = self.resolve_offerable(path).await?;

        let (tx, rx) = oneshot::channel();
        *self.pending.lock().expect("pending lock poisoned") =
            Some(PendingOffer { file_id: fd.file_id, rendezvous: tx });

        let action = Action::OfferFile { peer: peer.to_string(), file: fd };
        let status = self.dispatcher.call_now(&action).await;

        let result = match status {
            StatusCode::OfferAccepted => self.await_request(rx, timeout_ms).await,
            StatusCode::OfferRejected => Err(Error::OfferRejected),
            other => other.into_result(),
        };

        // every exit path clears the pending slot
        *self.pending.lock().expect("pending lock poisoned") = None;
        result
    }

    async fn await_request(&self, rx: oneshot::Receiver<()>, timeout_ms: i64) -> Result<()> {
        let timeout_ms = if timeout_ms < 0 {
            DEFAULT_OFFER_TIMEOUT_MS
        } else {
            timeout_ms as u64
        };
        if timeout_ms == 0 {
            return Ok(());
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(())) => Ok(()),
            // channel dropped or window elapsed: the request never came
            Ok(Err(_)) | Err(_) => Err(Error::OfferTimeout),
        }
    }

    /// Whether a local offer for `file_id` is awaiting its data request.
    #[must_use]
    pub fn is_offer_pending(&self, file_id: &FileId) -> bool {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .as_ref()
            .is_some_and(|p| p.file_id == *file_id)
    }

    /// Inbound data request, possibly the one a pending offer waits for.
    ///
    /// Releases the waiting `offer` call when the identity matches, then
    /// hands the request to the transfer sender either way.
    pub fn handle_data_request(
        &self,
        file_id: FileId,
        start_byte: u64,
        length: u64,
        peer: &str,
        max_chunk: u32,
    ) -> StatusCode {
        let matched = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            match pending.as_ref() {
                Some(p) if p.file_id == file_id => pending.take(),
                _ => None,
            }
        };
        if let Some(p) = matched {
            let _ = p.rendezvous.send(());
        }

        self.sender.handle_data_request(file_id, start_byte, length, peer, max_chunk)
    }

    /// Inbound offer from a peer.
    ///
    /// Without an accept/deny listener every offer is rejected. On
    /// acceptance the receiver immediately requests the file through the
    /// dispatcher queue.
    pub fn handle_offer(&self, file: FileDescriptor, peer: &str) -> StatusCode {
        let Some(listener) = self.offer_listener.read().expect("listener lock poisoned").clone()
        else {
            tracing::debug!("rejecting offer from {peer}: no offer listener registered");
            return StatusCode::OfferRejected;
        };

        if !listener.accept_offered_file(&file, peer) {
            return StatusCode::OfferRejected;
        }

        let save_name = file.filename.clone();
        if let Err(err) = self.receiver.request_queued(&file, save_name, None) {
            tracing::warn!("accepted offer from {peer} but cannot request it: {err}");
        }
        StatusCode::OfferAccepted
    }

    /// Register the accept/deny listener for inbound offers.
    pub fn set_offer_listener(&self, listener: Option<Arc<dyn OfferReceivedListener>>) {
        *self.offer_listener.write().expect("listener lock poisoned") = listener;
    }

    /// Find or create a descriptor for the offered path.
    ///
    /// Announced and offered entries are reused; anything else is hashed on
    /// demand and registered as offered.
    async fn resolve_offerable(&self, path: &Path) -> Result<FileDescriptor> {
        if let Some(fd) = self.visibility.local_descriptor_by_path(path) {
            return Ok(fd);
        }

        let owner = self.config.local_peer().unwrap_or_default();
        let content = Arc::clone(&self.content);
        let to_resolve = vec![path.to_path_buf()];
        let resolved =
            tokio::task::spawn_blocking(move || content.resolve(&to_resolve, &owner)).await;

        let bad_path = || Error::BadFilePath(path.to_string_lossy().into_owned());
        let (descriptors, failed) = resolved.map_err(|_| bad_path())?;
        if !failed.is_empty() {
            return Err(bad_path());
        }
        let fd = descriptors.into_iter().next().ok_or_else(bad_path)?;
        self.visibility.add_local_offered(fd.clone());
        Ok(fd)
    }
}
