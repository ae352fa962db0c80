//! Shared fixtures for Courier integration tests.
//!
//! The loopback transport wires two in-process nodes directly: every
//! outbound action on one node is delivered inline to the other node's
//! inbound surface, tagged with the sender's peer name. Method calls return
//! the remote handler's status, signals report local success, the same
//! contract a real session transport provides, minus the wire.

use async_trait::async_trait;
use courier_core::{Action, CourierNode, StatusCode, Transport};
use std::sync::{Arc, Mutex, OnceLock};

pub use courier_core::testing::wait_until;

/// Transport delivering one node's traffic straight into another node.
pub struct LoopbackTransport {
    sender_name: String,
    remote: OnceLock<Arc<CourierNode>>,
}

impl LoopbackTransport {
    /// Transport whose traffic will be attributed to `sender_name`.
    pub fn new(sender_name: &str) -> Arc<Self> {
        Arc::new(Self { sender_name: sender_name.to_string(), remote: OnceLock::new() })
    }

    /// Bind the receiving node. Call once, before any traffic flows.
    pub fn connect(&self, remote: Arc<CourierNode>) {
        let _ = self.remote.set(remote);
    }

    fn deliver(&self, action: &Action) -> StatusCode {
        let Some(remote) = self.remote.get() else {
            return StatusCode::NoConnection;
        };
        let from = self.sender_name.as_str();

        match action {
            Action::Announce { files, is_offer_response, .. } => {
                remote.on_announce(files.clone(), from, *is_offer_response);
                StatusCode::Ok
            }
            Action::RequestAnnounce { .. } => {
                remote.on_announcement_requested(from);
                StatusCode::Ok
            }
            Action::RequestOffer { path, .. } => remote.on_path_requested(path, from),
            Action::RequestData { file_id, start_byte, length, max_chunk, .. } => {
                remote.on_data_requested(*file_id, *start_byte, *length, from, *max_chunk)
            }
            Action::DataChunk { file_id, start_byte, chunk, .. } => {
                remote.on_chunk(file_id, *start_byte, chunk);
                StatusCode::Ok
            }
            Action::OfferFile { file, .. } => remote.on_offer_received(file.clone(), from),
            Action::StopTransfer { file_id, .. } => {
                remote.on_stop_transfer(file_id, from);
                StatusCode::Ok
            }
            Action::TransferCancelled { file_id, .. } => {
                remote.on_transfer_cancelled(file_id, from);
                StatusCode::Ok
            }
            // internal queue markers never cross the wire
            Action::FileIdResponse { .. } | Action::Shutdown => StatusCode::Invalid,
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, action: &Action) -> StatusCode {
        self.deliver(action)
    }

    async fn call(&self, action: &Action) -> StatusCode {
        self.deliver(action)
    }
}

/// Two nodes wired back to back.
pub struct Pair {
    pub alice: Arc<CourierNode>,
    pub bob: Arc<CourierNode>,
}

/// Build a connected alice/bob pair.
pub fn pair() -> Pair {
    let alice_wire = LoopbackTransport::new("alice");
    let bob_wire = LoopbackTransport::new("bob");

    let alice = CourierNode::new(Some(alice_wire.clone()), Some("alice".into()));
    let bob = CourierNode::new(Some(bob_wire.clone()), Some("bob".into()));

    alice_wire.connect(bob.clone());
    bob_wire.connect(alice.clone());

    Pair { alice, bob }
}

/// Completion listener recording (filename, status) pairs.
pub struct CompletionLog(Mutex<Vec<(String, StatusCode)>>);

impl CompletionLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Vec::new())))
    }

    pub fn entries(&self) -> Vec<(String, StatusCode)> {
        self.0.lock().unwrap().clone()
    }
}

impl courier_core::listener::FileCompletedListener for CompletionLog {
    fn file_completed(&self, filename: &str, status: StatusCode) {
        self.0.lock().unwrap().push((filename.to_string(), status));
    }
}

/// Announcement listener counting deliveries per origin.
pub struct AnnouncementLog(Mutex<Vec<(String, usize, bool)>>);

impl AnnouncementLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Vec::new())))
    }

    pub fn entries(&self) -> Vec<(String, usize, bool)> {
        self.0.lock().unwrap().clone()
    }
}

impl courier_core::listener::AnnouncementListener for AnnouncementLog {
    fn announcement_received(
        &self,
        files: &[courier_core::FileDescriptor],
        peer: &str,
        is_offer_response: bool,
    ) {
        self.0.lock().unwrap().push((peer.to_string(), files.len(), is_offer_response));
    }
}
