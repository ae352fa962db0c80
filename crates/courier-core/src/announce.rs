//! Broadcast discovery: advertising and withdrawing the shared file set.
//!
//! Announcing resolves paths into descriptors off the calling task (the
//! hash pass over a large directory is the slow path), stores them as the
//! local announced set, and broadcasts the whole set. Withdrawing removes
//! matches and re-broadcasts what remains, so peers always hold a current
//! snapshot rather than a diff.

use crate::config::SharingConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::listener::{AnnouncementListener, AnnouncementSentListener};
use crate::action::Action;
use crate::visibility::PeerVisibilityStore;
use courier_files::{ContentStore, FileDescriptor};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;

/// Engine for broadcast announcements and announcement requests.
pub struct AnnouncementEngine {
    dispatcher: Arc<Dispatcher>,
    content: Arc<ContentStore>,
    visibility: Arc<PeerVisibilityStore>,
    config: Arc<SharingConfig>,
    announcement_listener: RwLock<Option<Arc<dyn AnnouncementListener>>>,
    sent_listener: RwLock<Option<Arc<dyn AnnouncementSentListener>>>,
}

impl AnnouncementEngine {
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
            announcement_listener: RwLock::new(None),
            sent_listener: RwLock::new(None),
        }
    }

    /// Advertise files to the session.
    ///
    /// Returns immediately; resolution and hashing run on a blocking worker
    /// and the broadcast is queued when they finish. The returned handle
    /// yields the paths that failed to resolve, which are also delivered to
    /// the announcement-sent listener if one is registered.
    pub fn announce(self: &Arc<Self>, paths: Vec<PathBuf>) -> JoinHandle<Vec<PathBuf>> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let owner = this.config.local_peer().unwrap_or_default();
            let content = Arc::clone(&this.content);
            let to_resolve = paths.clone();

            let resolved =
                tokio::task::spawn_blocking(move || content.resolve(&to_resolve, &owner)).await;
            let (descriptors, failed) = match resolved {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!("announce resolution task failed: {err}");
                    (Vec::new(), paths)
                }
            };

            this.visibility.add_local_announced(&descriptors);
            this.send_announcement(None, false);

            if let Some(listener) = this.sent_listener.read().expect("listener lock poisoned").clone() {
                listener.announcement_sent(&failed);
            }
            failed
        })
    }

    /// Stop advertising the given paths and re-broadcast the remaining set.
    ///
    /// Returns the paths that matched no announced file.
    pub fn withdraw(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let unmatched = self.visibility.remove_local_announced_by_paths(paths);
        self.send_announcement(None, false);
        unmatched
    }

    /// Ask `peer` to re-broadcast its announced set.
    ///
    /// # Errors
    ///
    /// [`Error::NoConnection`] without a session identity;
    /// [`Error::NoAnnouncementListener`] if no listener is registered to
    /// observe the answer.
    pub fn request_announcement(&self, peer: &str) -> Result<()> {
        if self.config.local_peer().is_none() {
            return Err(Error::NoConnection);
        }
        if self.announcement_listener.read().expect("listener lock poisoned").is_none() {
            return Err(Error::NoAnnouncementListener);
        }
        self.dispatcher.enqueue(Action::RequestAnnounce { peer: peer.to_string() });
        Ok(())
    }

    /// Inbound announcement: replace the sender's snapshot and notify.
    pub fn handle_announced(&self, files: Vec<FileDescriptor>, peer: &str) {
        tracing::debug!("announcement from {peer} with {} files", files.len());
        self.visibility.replace_remote_announced(peer, files.clone());

        if let Some(listener) = self.announcement_listener.read().expect("listener lock poisoned").clone() {
            listener.announcement_received(&files, peer, false);
        }
    }

    /// Inbound announcement request: answer with our current set.
    pub fn handle_announcement_request(&self, peer: &str) {
        tracing::debug!("announcement requested by {peer}");
        self.send_announcement(Some(peer.to_string()), false);
    }

    /// Queue an announcement of the current announced set.
    ///
    /// Redaction is applied to copies; the stored descriptors keep their
    /// full paths.
    pub(crate) fn send_announcement(&self, peer: Option<String>, is_offer_response: bool) {
        let files: Vec<FileDescriptor> = self
            .visibility
            .local_announced()
            .iter()
            .map(|fd| {
                fd.redacted(self.config.show_relative_path(), self.config.show_shared_path())
            })
            .collect();

        self.dispatcher.enqueue(Action::Announce { peer, files, is_offer_response });
    }

    /// Register the inbound-announcement listener.
    pub fn set_announcement_listener(&self, listener: Option<Arc<dyn AnnouncementListener>>) {
        *self.announcement_listener.write().expect("listener lock poisoned") = listener;
    }

    /// Register the announcement-sent listener.
    pub fn set_sent_listener(&self, listener: Option<Arc<dyn AnnouncementSentListener>>) {
        *self.sent_listener.write().expect("listener lock poisoned") = listener;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingTransport, wait_until};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        engine: Arc<AnnouncementEngine>,
        transport: Arc<RecordingTransport>,
        visibility: Arc<PeerVisibilityStore>,
        _consumer: tokio::task::JoinHandle<()>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = Arc::new(Dispatcher::new(Some(transport.clone())));
        let consumer = dispatcher.spawn();
        let visibility = Arc::new(PeerVisibilityStore::new());
        let engine = Arc::new(AnnouncementEngine::new(
            dispatcher,
            Arc::new(ContentStore::new()),
            visibility.clone(),
            Arc::new(SharingConfig::new(Some("me".into()))),
        ));
        Fixture { engine, transport, visibility, _consumer: consumer }
    }

    fn announce_actions(transport: &RecordingTransport) -> Vec<Action> {
        transport
            .sent()
            .into_iter()
            .filter(|a| matches!(a, Action::Announce { .. }))
            .collect()
    }

    #[tokio::test]
    async fn announce_stores_and_broadcasts_with_default_redaction() {
        let fx = fixture();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"payload").unwrap();

        let failed = fx.engine.announce(vec![path.clone()]).await.unwrap();
        assert!(failed.is_empty());

        // stored descriptor keeps the full path
        let stored = fx.visibility.local_announced();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].absolute_path(), path);

        wait_until(|| !announce_actions(&fx.transport).is_empty()).await;
        let Action::Announce { peer, files, is_offer_response } =
            announce_actions(&fx.transport).remove(0)
        else {
            unreachable!()
        };
        assert_eq!(peer, None);
        assert!(!is_offer_response);
        // shared path hidden by default, relative path shown
        assert_eq!(files[0].shared_path, "");
        assert_eq!(files[0].filename, "a.bin");
    }

    #[tokio::test]
    async fn announce_reports_unresolvable_paths() {
        let fx = fixture();
        let missing = PathBuf::from("/nope/missing.bin");

        let failed = fx.engine.announce(vec![missing.clone()]).await.unwrap();
        assert_eq!(failed, vec![missing]);
        assert!(fx.visibility.local_announced().is_empty());
    }

    #[tokio::test]
    async fn withdraw_rebroadcasts_remaining_set() {
        let fx = fixture();
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        fs::write(&a, b"one").unwrap();
        fs::write(&b, b"two").unwrap();

        fx.engine.announce(vec![a.clone(), b.clone()]).await.unwrap();

        let failed = fx.engine.withdraw(&[a, PathBuf::from("/never/shared.bin")]);
        assert_eq!(failed, vec![PathBuf::from("/never/shared.bin")]);

        let remaining = fx.visibility.local_announced();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].filename, "b.bin");

        wait_until(|| announce_actions(&fx.transport).len() == 2).await;
        let Action::Announce { files, .. } = announce_actions(&fx.transport).remove(1) else {
            unreachable!()
        };
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn request_announcement_needs_listener() {
        let fx = fixture();
        assert_eq!(
            fx.engine.request_announcement("peer-b"),
            Err(Error::NoAnnouncementListener)
        );

        struct Noop;
        impl AnnouncementListener for Noop {
            fn announcement_received(&self, _: &[FileDescriptor], _: &str, _: bool) {}
        }
        fx.engine.set_announcement_listener(Some(Arc::new(Noop)));
        fx.engine.request_announcement("peer-b").unwrap();

        wait_until(|| {
            fx.transport
                .sent()
                .iter()
                .any(|a| matches!(a, Action::RequestAnnounce { peer } if peer == "peer-b"))
        })
        .await;
    }

    #[tokio::test]
    async fn request_announcement_needs_session() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = Arc::new(Dispatcher::new(Some(transport)));
        let engine = AnnouncementEngine::new(
            dispatcher,
            Arc::new(ContentStore::new()),
            Arc::new(PeerVisibilityStore::new()),
            Arc::new(SharingConfig::new(None)),
        );
        assert_eq!(engine.request_announcement("peer-b"), Err(Error::NoConnection));
    }

    #[tokio::test]
    async fn inbound_request_answers_the_requester_directly() {
        let fx = fixture();
        fx.engine.handle_announcement_request("peer-b");

        wait_until(|| !announce_actions(&fx.transport).is_empty()).await;
        let Action::Announce { peer, .. } = announce_actions(&fx.transport).remove(0) else {
            unreachable!()
        };
        assert_eq!(peer.as_deref(), Some("peer-b"));
    }

    #[tokio::test]
    async fn inbound_announcement_replaces_and_notifies() {
        let fx = fixture();

        struct Recorder(std::sync::Mutex<Vec<(usize, bool)>>);
        impl AnnouncementListener for Recorder {
            fn announcement_received(&self, files: &[FileDescriptor], _: &str, offer: bool) {
                self.0.lock().unwrap().push((files.len(), offer));
            }
        }
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        fx.engine.set_announcement_listener(Some(recorder.clone()));

        let fd = FileDescriptor {
            owner: "peer-b".into(),
            shared_path: String::new(),
            relative_path: String::new(),
            filename: "x.bin".into(),
            file_id: courier_files::FileId([3; 20]),
            size: 1,
        };
        fx.engine.handle_announced(vec![fd], "peer-b");

        assert_eq!(fx.visibility.remote_files().len(), 1);
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[(1, false)]);
    }
}
