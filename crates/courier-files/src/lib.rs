//! # Courier Files
//!
//! Content store for the Courier file sharing engine.
//!
//! This crate provides:
//! - Stable content identities (streaming SHA-1 over file bytes)
//! - Announce-path resolution with breadth-first directory expansion
//! - A persistent path-to-identity cache keyed on modification time
//! - Positional chunk reads and writes for transfer engines

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cache;
pub mod descriptor;
pub mod store;

pub use descriptor::{FileDescriptor, FileId};
pub use store::ContentStore;
