//! Host-pluggable listener and policy traits.
//!
//! Listeners are strategy objects injected by the host application and held
//! as optional references; an absent listener is a valid state meaning
//! deny-everything (for policies) or no-op (for notifications).

use crate::error::StatusCode;
use courier_files::FileDescriptor;
use std::path::PathBuf;

/// Observes announcements arriving from remote peers.
///
/// Registering this listener is a precondition for issuing announcement
/// requests: without it there is no way to observe the answer.
pub trait AnnouncementListener: Send + Sync {
    /// Called for every inbound announcement.
    ///
    /// `is_offer_response` distinguishes a directed single-descriptor answer
    /// to a path request from a broadcast snapshot.
    fn announcement_received(&self, files: &[FileDescriptor], peer: &str, is_offer_response: bool);
}

/// Observes completion of a local `announce` pass.
pub trait AnnouncementSentListener: Send + Sync {
    /// Called once per announce pass with the paths that failed to resolve.
    fn announcement_sent(&self, failed_paths: &[PathBuf]);
}

/// Accept/deny policy for inbound single-file offers.
pub trait OfferReceivedListener: Send + Sync {
    /// Return `true` to accept the offered file and begin receiving it.
    fn accept_offered_file(&self, file: &FileDescriptor, peer: &str) -> bool;
}

/// Accept/deny policy for directed requests naming unannounced paths.
pub trait UnannouncedRequestPolicy: Send + Sync {
    /// Return `true` to share the file at `path` with the requesting peer.
    fn allow_unannounced_request(&self, path: &str) -> bool;
}

/// Observes the end of inbound transfers.
pub trait FileCompletedListener: Send + Sync {
    /// Called with [`StatusCode::Ok`] on completion or
    /// [`StatusCode::Cancelled`] when the sender cancelled.
    fn file_completed(&self, filename: &str, status: StatusCode);
}

/// Observes granted file requests on the sending side.
pub trait RequestReceivedListener: Send + Sync {
    /// Called with the filename each time a data request is granted.
    fn file_request_received(&self, filename: &str);
}
