//! Error taxonomy and wire-level status codes.

use courier_files::FileId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code crossing the transport boundary.
///
/// Synchronous request/response operations return the remote side's code
/// directly; queued signals report only local transmission problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// Operation succeeded.
    Ok,
    /// Identity not found in any visible file set.
    BadFileId,
    /// Refused by the remote peer's policy.
    RequestDenied,
    /// Nonexistent or unwritable path.
    BadFilePath,
    /// Offer wait window elapsed without a matching request.
    OfferTimeout,
    /// Remote peer declined the offer.
    OfferRejected,
    /// Remote peer accepted the offer.
    OfferAccepted,
    /// Announcement request requires a registered announcement listener.
    NoAnnouncementListener,
    /// Transfer ended by cancellation, not completion.
    Cancelled,
    /// Pause/cancel named an identity with no transfer in flight.
    FileNotBeingTransferred,
    /// Malformed or unsupported request.
    Invalid,
    /// No active transport session.
    NoConnection,
}

impl StatusCode {
    /// Convert a wire status into a `Result`, mapping non-`Ok` codes onto the
    /// error taxonomy.
    ///
    /// # Errors
    ///
    /// Returns the corresponding [`Error`] for every code other than `Ok`
    /// and `OfferAccepted`.
    pub fn into_result(self) -> Result<()> {
        match self {
            StatusCode::Ok | StatusCode::OfferAccepted => Ok(()),
            StatusCode::RequestDenied => Err(Error::RequestDenied),
            StatusCode::BadFilePath => Err(Error::BadFilePath(String::new())),
            StatusCode::OfferTimeout => Err(Error::OfferTimeout),
            StatusCode::OfferRejected => Err(Error::OfferRejected),
            StatusCode::NoAnnouncementListener => Err(Error::NoAnnouncementListener),
            StatusCode::Cancelled => Err(Error::Cancelled),
            StatusCode::NoConnection => Err(Error::NoConnection),
            other => Err(Error::Transport(other)),
        }
    }
}

/// Errors surfaced by the public engine API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Identity not found in any visible file set.
    #[error("no visible file with identity {0}")]
    BadFileId(FileId),

    /// Refused by policy (local or remote).
    #[error("request denied")]
    RequestDenied,

    /// Nonexistent or unwritable path.
    #[error("bad file path: {0}")]
    BadFilePath(String),

    /// Offer wait window elapsed without the peer requesting the file.
    #[error("offer timed out")]
    OfferTimeout,

    /// Remote peer declined the offer.
    #[error("offer rejected by peer")]
    OfferRejected,

    /// Announcement requests need a listener to observe the answer.
    #[error("no announcement listener registered")]
    NoAnnouncementListener,

    /// Transfer ended by cancellation, not completion.
    #[error("transfer cancelled")]
    Cancelled,

    /// Pause/cancel named an identity with no transfer in flight.
    #[error("no transfer in progress for {0}")]
    FileNotBeingTransferred(FileId),

    /// No active transport session.
    #[error("no transport connection")]
    NoConnection,

    /// Rejected configuration value.
    #[error("invalid value: {0}")]
    Invalid(&'static str),

    /// Transport reported a status with no local mapping.
    #[error("transport status {0:?}")]
    Transport(StatusCode),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_and_accepted_convert_to_ok() {
        assert!(StatusCode::Ok.into_result().is_ok());
        assert!(StatusCode::OfferAccepted.into_result().is_ok());
    }

    #[test]
    fn error_codes_map_onto_taxonomy() {
        assert_eq!(StatusCode::OfferRejected.into_result(), Err(Error::OfferRejected));
        assert_eq!(StatusCode::NoConnection.into_result(), Err(Error::NoConnection));
        assert_eq!(
            StatusCode::BadFileId.into_result(),
            Err(Error::Transport(StatusCode::BadFileId))
        );
    }
}
