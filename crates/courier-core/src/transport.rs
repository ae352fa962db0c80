//! Transport boundary.
//!
//! The engine never establishes sessions or names peers itself; the host
//! supplies an implementation of [`Transport`] bound to an existing session
//! and delivers inbound events through the facade's `on_*` methods. When the
//! session changes, the host swaps the transport via
//! [`CourierNode::reset_state`](crate::node::CourierNode::reset_state).

use crate::action::Action;
use crate::error::StatusCode;
use async_trait::async_trait;

/// Session-bound outbound channel to the peer group.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fire-and-forget signal, ordering-preserving per destination.
    ///
    /// The returned status reports local transmission problems only; no
    /// remote answer is awaited.
    async fn send(&self, action: &Action) -> StatusCode;

    /// Synchronous request/response call returning the remote side's status.
    async fn call(&self, action: &Action) -> StatusCode;
}
