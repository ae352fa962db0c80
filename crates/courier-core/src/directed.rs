//! Directed discovery: requesting files by path that were never announced.
//!
//! The requester side is a synchronous call: the transport's status is the
//! peer's answer. The responder side answers immediately when the path is
//! already visible (announced or offered); otherwise it consults the
//! pluggable accept/deny policy, and on a grant defers the identity hash to
//! the dispatcher so the request/response path stays fast.

use crate::action::Action;
use crate::config::SharingConfig;
use crate::dispatcher::{DescriptorHook, Dispatcher};
use crate::error::{Result, StatusCode};
use crate::listener::{AnnouncementListener, UnannouncedRequestPolicy};
use crate::visibility::PeerVisibilityStore;
use courier_files::{ContentStore, FileDescriptor};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Engine for point-to-point path requests and their directed answers.
pub struct DirectedOfferEngine {
    dispatcher: Arc<Dispatcher>,
    content: Arc<ContentStore>,
    visibility: Arc<PeerVisibilityStore>,
    config: Arc<SharingConfig>,
    policy: RwLock<Option<Arc<dyn UnannouncedRequestPolicy>>>,
    announcement_listener: RwLock<Option<Arc<dyn AnnouncementListener>>>,
}

impl DirectedOfferEngine {
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
            policy: RwLock::new(None),
            announcement_listener: RwLock::new(None),
        }
    }

    /// Ask `peer` for the file at `path` on its side.
    ///
    /// The grant arrives later as a directed announcement; this call only
    /// reports whether the peer accepted the request.
    ///
    /// # Errors
    ///
    /// [`crate::Error::RequestDenied`] when the peer refuses,
    /// [`crate::Error::NoConnection`] without a session.
    pub async fn request_by_path(&self, peer: &str, path: &str) -> Result<()> {
        let action = Action::RequestOffer { peer: peer.to_string(), path: path.to_string() };
        self.dispatcher.call_now(&action).await.into_result()
    }

    /// Inbound path request from a peer.
    ///
    /// Known paths are answered with an immediate single-descriptor directed
    /// announcement. Unknown paths go through the policy; a grant queues the
    /// deferred identity generation, absence of a policy denies.
    pub fn handle_path_request(&self, path: &str, peer: &str) -> StatusCode {
        if let Some(fd) = self.visibility.local_descriptor_by_path(Path::new(path)) {
            self.send_directed_announcement(&fd, peer);
            return StatusCode::Ok;
        }

        let policy = self.policy.read().expect("policy lock poisoned").clone();
        match policy {
            Some(policy) if policy.allow_unannounced_request(path) => {
                self.dispatcher.enqueue(Action::FileIdResponse {
                    peer: peer.to_string(),
                    path: path.to_string(),
                });
                StatusCode::Ok
            }
            Some(_) => StatusCode::RequestDenied,
            None => {
                tracing::debug!("denying path request from {peer}: no policy registered");
                StatusCode::RequestDenied
            }
        }
    }

    /// Inbound directed announcement answering one of our path requests.
    pub fn handle_offer_response(&self, files: Vec<FileDescriptor>, peer: &str) {
        let Some(fd) = files.first() else {
            tracing::warn!("empty offer response from {peer}");
            return;
        };
        self.visibility.add_remote_offered(peer, fd.clone());

        if let Some(listener) = self.announcement_listener.read().expect("listener lock poisoned").clone()
        {
            listener.announcement_received(&files, peer, true);
        }
    }

    fn send_directed_announcement(&self, fd: &FileDescriptor, peer: &str) {
        let redacted =
            fd.redacted(self.config.show_relative_path(), self.config.show_shared_path());
        self.dispatcher.enqueue(Action::Announce {
            peer: Some(peer.to_string()),
            files: vec![redacted],
            is_offer_response: true,
        });
    }

    /// Register the accept/deny policy for unannounced path requests.
    pub fn set_policy(&self, policy: Option<Arc<dyn UnannouncedRequestPolicy>>) {
        *self.policy.write().expect("policy lock poisoned") = policy;
    }

    /// Register the listener notified of directed announcements.
    pub fn set_announcement_listener(&self, listener: Option<Arc<dyn AnnouncementListener>>) {
        *self.announcement_listener.write().expect("listener lock poisoned") = listener;
    }
}

impl DescriptorHook for DirectedOfferEngine {
    /// Deferred identity generation for a granted path request.
    ///
    /// Runs on the dispatcher consumer: hashes the file, registers it as
    /// offered, and queues the directed announcement.
    fn generate_descriptor(&self, path: &str, peer: &str) {
        let owner = self.config.local_peer().unwrap_or_default();
        let (descriptors, failed) = self.content.resolve(&[PathBuf::from(path)], &owner);

        let Some(fd) = descriptors.into_iter().next() else {
            tracing::warn!("granted path {path} failed to resolve ({} failures)", failed.len());
            return;
        };

        self.visibility.add_local_offered(fd.clone());
        self.send_directed_announcement(&fd, peer);
    }
}
