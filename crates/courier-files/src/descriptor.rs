//! File identity and descriptor types.
//!
//! A [`FileId`] names a file's bytes: it is the SHA-1 digest of the full
//! content stream and nothing else, so identical content always yields an
//! identical identity regardless of where the file lives. A
//! [`FileDescriptor`] pairs that identity with the ownership and path
//! metadata a peer needs to request the file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Content-derived identity of a file: a 160-bit digest over the byte stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub [u8; 20]);

impl FileId {
    /// Digest length in bytes.
    pub const LEN: usize = 20;

    /// Borrow the raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Build an identity from a byte slice, rejecting wrong lengths.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Short hex prefix used in log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.short())
    }
}

/// Metadata describing one shared file.
///
/// Two descriptors are equal iff every field is equal by value. Hashing is
/// dominated by the content identity so descriptor sets behave like sets of
/// file identities with path disambiguation on collision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Peer identity of the file's owner within the session.
    pub owner: String,
    /// Root path under which the file was advertised.
    pub shared_path: String,
    /// Subdirectory under the shared root; empty for files shared directly.
    pub relative_path: String,
    /// Base name of the file.
    pub filename: String,
    /// Content identity of the file bytes.
    pub file_id: FileId,
    /// File size in bytes.
    pub size: u64,
}

impl FileDescriptor {
    /// Reconstruct the absolute path this descriptor was built from.
    ///
    /// Only meaningful on the owning side, or when the announcing peer chose
    /// to expose its shared path.
    #[must_use]
    pub fn absolute_path(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.shared_path);
        if !self.relative_path.is_empty() {
            path.push(&self.relative_path);
        }
        path.push(&self.filename);
        path
    }

    /// Copy of this descriptor with path fields blanked per visibility flags.
    #[must_use]
    pub fn redacted(&self, show_relative_path: bool, show_shared_path: bool) -> Self {
        let mut copy = self.clone();
        if !show_relative_path {
            copy.relative_path = String::new();
        }
        if !show_shared_path {
            copy.shared_path = String::new();
        }
        copy
    }
}

impl Hash for FileDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> FileDescriptor {
        FileDescriptor {
            owner: "peer-a".into(),
            shared_path: "/data/shared".into(),
            relative_path: "sub".into(),
            filename: "report.txt".into(),
            file_id: FileId([7u8; 20]),
            size: 42,
        }
    }

    #[test]
    fn absolute_path_joins_all_components() {
        let fd = descriptor();
        assert_eq!(fd.absolute_path(), PathBuf::from("/data/shared/sub/report.txt"));
    }

    #[test]
    fn absolute_path_skips_empty_relative() {
        let mut fd = descriptor();
        fd.relative_path.clear();
        assert_eq!(fd.absolute_path(), PathBuf::from("/data/shared/report.txt"));
    }

    #[test]
    fn redaction_blanks_paths_without_touching_original() {
        let fd = descriptor();
        let hidden = fd.redacted(false, false);
        assert_eq!(hidden.relative_path, "");
        assert_eq!(hidden.shared_path, "");
        assert_eq!(hidden.file_id, fd.file_id);
        // original untouched
        assert_eq!(fd.relative_path, "sub");
        assert_eq!(fd.shared_path, "/data/shared");
    }

    #[test]
    fn equality_covers_all_fields() {
        let a = descriptor();
        let mut b = descriptor();
        assert_eq!(a, b);
        b.size = 43;
        assert_ne!(a, b);
    }

    #[test]
    fn file_id_from_bytes_rejects_wrong_length() {
        assert!(FileId::from_bytes(&[1u8; 19]).is_none());
        assert!(FileId::from_bytes(&[1u8; 20]).is_some());
    }

    #[test]
    fn file_id_display_is_full_hex() {
        let id = FileId([0xAB; 20]);
        assert_eq!(id.to_string().len(), 40);
        assert!(id.to_string().starts_with("abab"));
    }
}
