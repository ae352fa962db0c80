//! Outbound protocol intents.
//!
//! Every outbound wire interaction is expressed as an [`Action`]: a typed,
//! peer-targeted intent created by one engine and consumed exactly once by
//! the [`Dispatcher`](crate::dispatcher::Dispatcher) queue or its bypass
//! path. Broadcast signals carry no peer; everything else is directed.

use courier_files::{FileDescriptor, FileId};
use serde::{Deserialize, Serialize};

/// A single outbound protocol intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Action {
    /// Advertise the current announced set, broadcast or directed.
    ///
    /// `is_offer_response` marks single-descriptor answers to directed path
    /// requests so the receiving side routes them into its offered relation
    /// instead of replacing the announced snapshot.
    Announce {
        /// Target peer, or `None` to broadcast to all session members.
        peer: Option<String>,
        /// Redacted copies of the advertised descriptors.
        files: Vec<FileDescriptor>,
        /// Whether this answers a directed path request.
        is_offer_response: bool,
    },

    /// Ask a peer to re-broadcast its announced set.
    RequestAnnounce {
        /// Target peer.
        peer: String,
    },

    /// Ask a peer for a file by path that it never announced.
    RequestOffer {
        /// Target peer.
        peer: String,
        /// Absolute path on the remote side.
        path: String,
    },

    /// Request file bytes starting at an offset.
    RequestData {
        /// Owning peer.
        peer: String,
        /// Identity of the requested file.
        file_id: FileId,
        /// First byte wanted.
        start_byte: u64,
        /// Total bytes wanted.
        length: u64,
        /// Largest chunk the requester will accept.
        max_chunk: u32,
    },

    /// One bounded slice of file bytes.
    DataChunk {
        /// Receiving peer.
        peer: String,
        /// Identity of the file the chunk belongs to.
        file_id: FileId,
        /// Offset of the first byte in this chunk.
        start_byte: u64,
        /// The bytes.
        chunk: Vec<u8>,
    },

    /// Offer a single file for explicit accept/reject negotiation.
    OfferFile {
        /// Target peer.
        peer: String,
        /// Descriptor of the offered file.
        file: FileDescriptor,
    },

    /// Receiver-initiated pause/cancel notification to the sender.
    StopTransfer {
        /// Sending peer.
        peer: String,
        /// Identity of the transfer to stop.
        file_id: FileId,
    },

    /// Sender-initiated cancellation notification to the receiver.
    TransferCancelled {
        /// Receiving peer.
        peer: String,
        /// Identity of the cancelled transfer.
        file_id: FileId,
    },

    /// Deferred identity generation for a granted unannounced-path request.
    ///
    /// Never transmitted: the dispatcher intercepts it and calls back into
    /// the directed offer engine to hash the file and answer with a directed
    /// `Announce`.
    FileIdResponse {
        /// Peer awaiting the generated descriptor.
        peer: String,
        /// Local path to hash.
        path: String,
    },

    /// Terminate the dispatcher consumer. Clean teardown only.
    Shutdown,
}

impl Action {
    /// The target peer, if this action is directed.
    #[must_use]
    pub fn peer(&self) -> Option<&str> {
        match self {
            Action::Announce { peer, .. } => peer.as_deref(),
            Action::RequestAnnounce { peer }
            | Action::RequestOffer { peer, .. }
            | Action::RequestData { peer, .. }
            | Action::DataChunk { peer, .. }
            | Action::OfferFile { peer, .. }
            | Action::StopTransfer { peer, .. }
            | Action::TransferCancelled { peer, .. }
            | Action::FileIdResponse { peer, .. } => Some(peer),
            Action::Shutdown => None,
        }
    }

    /// Short name for log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Announce { .. } => "announce",
            Action::RequestAnnounce { .. } => "request-announce",
            Action::RequestOffer { .. } => "request-offer",
            Action::RequestData { .. } => "request-data",
            Action::DataChunk { .. } => "data-chunk",
            Action::OfferFile { .. } => "offer-file",
            Action::StopTransfer { .. } => "stop-transfer",
            Action::TransferCancelled { .. } => "transfer-cancelled",
            Action::FileIdResponse { .. } => "file-id-response",
            Action::Shutdown => "shutdown",
        }
    }
}
