//! Node facade: construction, wiring, and the public API surface.
//!
//! `CourierNode` owns every engine and store, wires the dispatcher hooks,
//! and forwards both the host-facing API and the transport's inbound events
//! to the owning engine. All construction is explicit: there is no global
//! state, and several nodes can coexist in one process, each bound to its
//! own session.

use crate::announce::AnnouncementEngine;
use crate::config::SharingConfig;
use crate::directed::DirectedOfferEngine;
use crate::dispatcher::{ChunkSentHook, DescriptorHook, Dispatcher};
use crate::error::{Result, StatusCode};
use crate::listener::{
    AnnouncementListener, AnnouncementSentListener, FileCompletedListener, OfferReceivedListener,
    RequestReceivedListener, UnannouncedRequestPolicy,
};
use crate::offer::OfferNegotiator;
use crate::progress::ProgressDescriptor;
use crate::receive::TransferReceiver;
use crate::send::TransferSender;
use crate::transport::Transport;
use crate::visibility::PeerVisibilityStore;
use courier_files::{ContentStore, FileDescriptor, FileId};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// One file sharing node bound to at most one session at a time.
pub struct CourierNode {
    config: Arc<SharingConfig>,
    content: Arc<ContentStore>,
    visibility: Arc<PeerVisibilityStore>,
    dispatcher: Arc<Dispatcher>,
    announcer: Arc<AnnouncementEngine>,
    directed: Arc<DirectedOfferEngine>,
    negotiator: Arc<OfferNegotiator>,
    sender: Arc<TransferSender>,
    receiver: Arc<TransferReceiver>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl CourierNode {
    /// Build a node, wire its engines, and start the dispatcher consumer.
    ///
    /// `transport` may be `None`: the node works offline (announce paths,
    /// configure, inspect state) and reports [`StatusCode::NoConnection`]
    /// for anything that needs the wire, until
    /// [`reset_state`](Self::reset_state) supplies a session.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(transport: Option<Arc<dyn Transport>>, local_peer: Option<String>) -> Arc<Self> {
        let config = Arc::new(SharingConfig::new(local_peer));
        let content = Arc::new(ContentStore::new());
        let visibility = Arc::new(PeerVisibilityStore::new());
        let dispatcher = Arc::new(Dispatcher::new(transport));

        let announcer = Arc::new(AnnouncementEngine::new(
            dispatcher.clone(),
            content.clone(),
            visibility.clone(),
            config.clone(),
        ));
        let directed = Arc::new(DirectedOfferEngine::new(
            dispatcher.clone(),
            content.clone(),
            visibility.clone(),
            config.clone(),
        ));
        let sender = Arc::new(TransferSender::new(
            dispatcher.clone(),
            content.clone(),
            visibility.clone(),
        ));
        let receiver = Arc::new(TransferReceiver::new(
            dispatcher.clone(),
            content.clone(),
            visibility.clone(),
            config.clone(),
        ));
        let negotiator = Arc::new(OfferNegotiator::new(
            dispatcher.clone(),
            content.clone(),
            visibility.clone(),
            config.clone(),
            sender.clone(),
            receiver.clone(),
        ));

        let chunk_hook: Arc<dyn ChunkSentHook> = sender.clone();
        dispatcher.set_chunk_sent_hook(Arc::downgrade(&chunk_hook));
        let descriptor_hook: Arc<dyn DescriptorHook> = directed.clone();
        dispatcher.set_descriptor_hook(Arc::downgrade(&descriptor_hook));
        let consumer = dispatcher.spawn();

        Arc::new(Self {
            config,
            content,
            visibility,
            dispatcher,
            announcer,
            directed,
            negotiator,
            sender,
            receiver,
            consumer: Mutex::new(Some(consumer)),
        })
    }

    // ---- discovery ---------------------------------------------------

    /// Advertise files or directory trees to the session.
    ///
    /// Returns immediately; the handle yields the paths that failed to
    /// resolve.
    pub fn announce(self: &Arc<Self>, paths: Vec<PathBuf>) -> JoinHandle<Vec<PathBuf>> {
        self.announcer.announce(paths)
    }

    /// Stop advertising the given paths; returns the unmatched ones.
    pub fn stop_announce(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        self.announcer.withdraw(paths)
    }

    /// Ask a peer to re-broadcast its announced set.
    ///
    /// # Errors
    ///
    /// See [`AnnouncementEngine::request_announcement`].
    pub fn request_announcement(&self, peer: &str) -> Result<()> {
        self.announcer.request_announcement(peer)
    }

    /// Ask a peer for a file by path that it never announced.
    ///
    /// # Errors
    ///
    /// See [`DirectedOfferEngine::request_by_path`].
    pub async fn request_by_path(&self, peer: &str, path: &str) -> Result<()> {
        self.directed.request_by_path(peer, path).await
    }

    /// Files currently announced by this node.
    #[must_use]
    pub fn announced_local_files(&self) -> Vec<FileDescriptor> {
        self.visibility.local_announced()
    }

    /// Files this node granted outside broadcast announcements.
    #[must_use]
    pub fn offered_local_files(&self) -> Vec<FileDescriptor> {
        self.visibility.local_offered()
    }

    /// Everything remote peers made visible to us, deduplicated.
    #[must_use]
    pub fn available_remote_files(&self) -> Vec<FileDescriptor> {
        self.visibility.remote_files()
    }

    /// Identity of the remote file at `path` owned by `peer`, if visible.
    #[must_use]
    pub fn file_id_for(&self, peer: &str, path: &Path) -> Option<FileId> {
        self.visibility.file_id_for(peer, path)
    }

    // ---- offers and transfers ----------------------------------------

    /// Offer a single file to a peer and wait for the outcome.
    ///
    /// # Errors
    ///
    /// See [`OfferNegotiator::offer`].
    pub async fn offer_file(&self, peer: &str, path: &Path, timeout_ms: i64) -> Result<()> {
        self.negotiator.offer(peer, path, timeout_ms).await
    }

    /// Request a file by identity from a peer that made it visible.
    ///
    /// # Errors
    ///
    /// See [`TransferReceiver::request_by_id`].
    pub async fn request_file(
        &self,
        peer: &str,
        file_id: &FileId,
        save_name: String,
        save_dir: Option<PathBuf>,
    ) -> Result<()> {
        self.receiver.request_by_id(peer, file_id, save_name, save_dir).await
    }

    /// Pause an inbound transfer, keeping the partial file for resumption.
    ///
    /// # Errors
    ///
    /// See [`TransferReceiver::pause`].
    pub fn pause_transfer(&self, file_id: &FileId) -> Result<()> {
        self.receiver.pause(file_id)
    }

    /// Cancel an inbound transfer and delete the partial file.
    ///
    /// # Errors
    ///
    /// See [`TransferReceiver::cancel`].
    pub fn cancel_receiving(&self, file_id: &FileId) -> Result<()> {
        self.receiver.cancel(file_id)
    }

    /// Cancel an outbound transfer and notify the receiver.
    ///
    /// # Errors
    ///
    /// See [`TransferSender::cancel`].
    pub fn cancel_sending(&self, file_id: &FileId) -> Result<()> {
        self.sender.cancel(file_id)
    }

    /// Progress of outbound transfers.
    #[must_use]
    pub fn sending_progress(&self) -> Vec<ProgressDescriptor> {
        self.sender.progress_list()
    }

    /// Progress of inbound transfers.
    #[must_use]
    pub fn receiving_progress(&self) -> Vec<ProgressDescriptor> {
        self.receiver.progress_list()
    }

    // ---- configuration -----------------------------------------------

    /// Toggle whether announcements expose relative paths.
    pub fn set_show_relative_path(&self, show: bool) {
        self.config.set_show_relative_path(show);
    }

    /// Toggle whether announcements expose the shared root.
    pub fn set_show_shared_path(&self, show: bool) {
        self.config.set_show_shared_path(show);
    }

    /// Set the maximum chunk size for data requests; must be positive.
    ///
    /// # Errors
    ///
    /// See [`SharingConfig::set_max_chunk_size`].
    pub fn set_max_chunk_size(&self, size: u32) -> Result<()> {
        self.config.set_max_chunk_size(size)
    }

    /// Change the default save directory, creating it if missing.
    ///
    /// # Errors
    ///
    /// See [`SharingConfig::set_default_save_dir`].
    pub fn set_default_save_dir(&self, dir: PathBuf) -> Result<()> {
        self.config.set_default_save_dir(dir)
    }

    /// Point the identity cache at a backing file, or disable with `None`.
    pub fn set_cache_path(&self, path: Option<PathBuf>) {
        self.content.set_cache_path(path);
    }

    /// Prune stale identity cache entries.
    pub fn clean_cache(&self) {
        self.content.clean_cache();
    }

    /// Shared configuration handle.
    #[must_use]
    pub fn config(&self) -> &SharingConfig {
        &self.config
    }

    // ---- listeners ----------------------------------------------------

    /// Register the announcement listener on both discovery engines.
    pub fn set_announcement_listener(&self, listener: Option<Arc<dyn AnnouncementListener>>) {
        self.announcer.set_announcement_listener(listener.clone());
        self.directed.set_announcement_listener(listener);
    }

    /// Register the announcement-sent listener.
    pub fn set_announcement_sent_listener(
        &self,
        listener: Option<Arc<dyn AnnouncementSentListener>>,
    ) {
        self.announcer.set_sent_listener(listener);
    }

    /// Register the accept/deny listener for inbound offers.
    pub fn set_offer_listener(&self, listener: Option<Arc<dyn OfferReceivedListener>>) {
        self.negotiator.set_offer_listener(listener);
    }

    /// Register the accept/deny policy for unannounced path requests.
    pub fn set_unannounced_request_policy(
        &self,
        policy: Option<Arc<dyn UnannouncedRequestPolicy>>,
    ) {
        self.directed.set_policy(policy);
    }

    /// Register the transfer completion listener.
    pub fn set_completed_listener(&self, listener: Option<Arc<dyn FileCompletedListener>>) {
        self.receiver.set_completed_listener(listener);
    }

    /// Register the listener notified of granted file requests.
    pub fn set_request_received_listener(
        &self,
        listener: Option<Arc<dyn RequestReceivedListener>>,
    ) {
        self.sender.set_request_listener(listener);
    }

    // ---- session lifecycle -------------------------------------------

    /// Rebind the node to a different session, or to none.
    ///
    /// Swaps the transport, rewrites the owner of local descriptors,
    /// clears both transfer tables, and, when a live session with
    /// announced files exists, re-broadcasts the announced set to the new
    /// peer group.
    pub fn reset_state(&self, transport: Option<Arc<dyn Transport>>, local_peer: Option<String>) {
        let connected = transport.is_some();
        self.dispatcher.set_transport(transport);
        self.config.set_local_peer(local_peer.clone());
        self.visibility.reset_owner(local_peer.as_deref());
        self.sender.reset_state();
        self.receiver.reset_state();

        if connected && !self.visibility.local_announced().is_empty() {
            self.announcer.send_announcement(None, false);
        }
    }

    /// Drain the queue, stop the consumer, and wait for it to finish.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown();
        let handle = self.consumer.lock().expect("consumer lock poisoned").take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!("dispatcher consumer ended abnormally: {err}");
            }
        }
    }

    // ---- inbound events from the transport ---------------------------

    /// Inbound announcement signal.
    pub fn on_announce(&self, files: Vec<FileDescriptor>, peer: &str, is_offer_response: bool) {
        if is_offer_response {
            self.directed.handle_offer_response(files, peer);
        } else {
            self.announcer.handle_announced(files, peer);
        }
    }

    /// Inbound announcement request signal.
    pub fn on_announcement_requested(&self, peer: &str) {
        self.announcer.handle_announcement_request(peer);
    }

    /// Inbound data request method call; the return value is the answer.
    pub fn on_data_requested(
        &self,
        file_id: FileId,
        start_byte: u64,
        length: u64,
        peer: &str,
        max_chunk: u32,
    ) -> StatusCode {
        self.negotiator.handle_data_request(file_id, start_byte, length, peer, max_chunk)
    }

    /// Inbound file chunk signal.
    pub fn on_chunk(&self, file_id: &FileId, start_byte: u64, chunk: &[u8]) {
        self.receiver.handle_chunk(file_id, start_byte, chunk);
    }

    /// Inbound receiver-initiated stop signal.
    pub fn on_stop_transfer(&self, file_id: &FileId, peer: &str) {
        self.sender.handle_stop(file_id, peer);
    }

    /// Inbound sender-initiated cancellation signal.
    pub fn on_transfer_cancelled(&self, file_id: &FileId, peer: &str) {
        self.receiver.handle_cancelled(file_id, peer);
    }

    /// Inbound single-file offer method call; the return value is the answer.
    pub fn on_offer_received(&self, file: FileDescriptor, peer: &str) -> StatusCode {
        self.negotiator.handle_offer(file, peer)
    }

    /// Inbound unannounced-path request method call; the return value is the
    /// answer.
    pub fn on_path_requested(&self, path: &str, peer: &str) -> StatusCode {
        self.directed.handle_path_request(path, peer)
    }
}
