//! Transfer progress snapshots.

use courier_files::FileId;

/// Point-in-time view of one in-flight transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressDescriptor {
    /// Identity of the file being transferred.
    pub file_id: FileId,
    /// Total bytes the transfer will move.
    pub file_size: u64,
    /// Bytes moved so far.
    pub bytes_transferred: u64,
}
