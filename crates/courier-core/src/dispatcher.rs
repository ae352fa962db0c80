//! Ordered action dispatch.
//!
//! A single consumer task drains a FIFO queue and forwards each action to
//! the transport in arrival order. That per-sender ordering is the one
//! guarantee the rest of the protocol relies on; nothing else about
//! delivery is promised.
//!
//! Two queue entries are special-cased. A transmitted [`Action::DataChunk`]
//! triggers the chunk-sent hook so the sender can queue the next chunk;
//! flow control keeps at most one chunk per transfer ahead of the drain. An
//! [`Action::FileIdResponse`] is intercepted before transmission and routed
//! to the directed offer engine instead, deferring the identity hash off
//! the request/response path. [`Action::Shutdown`] ends the consumer.

use crate::action::Action;
use crate::error::StatusCode;
use crate::transport::Transport;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Callback into the sending engine after a chunk left the queue.
pub(crate) trait ChunkSentHook: Send + Sync {
    fn chunk_sent(&self);
}

/// Callback into the directed offer engine for deferred identity generation.
pub(crate) trait DescriptorHook: Send + Sync {
    fn generate_descriptor(&self, path: &str, peer: &str);
}

/// Serializes all outbound traffic through the transport.
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Action>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Action>>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    chunk_sent_hook: OnceLock<Weak<dyn ChunkSentHook>>,
    descriptor_hook: OnceLock<Weak<dyn DescriptorHook>>,
}

impl Dispatcher {
    /// Dispatcher bound to a transport, or to none (every transmission
    /// reports [`StatusCode::NoConnection`] until one is set).
    #[must_use]
    pub fn new(transport: Option<Arc<dyn Transport>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            transport: RwLock::new(transport),
            chunk_sent_hook: OnceLock::new(),
            descriptor_hook: OnceLock::new(),
        }
    }

    pub(crate) fn set_chunk_sent_hook(&self, hook: Weak<dyn ChunkSentHook>) {
        let _ = self.chunk_sent_hook.set(hook);
    }

    pub(crate) fn set_descriptor_hook(&self, hook: Weak<dyn DescriptorHook>) {
        let _ = self.descriptor_hook.set(hook);
    }

    /// Start the consumer task. Call once, after the hooks are wired.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let rx = self.rx.lock().expect("queue lock poisoned").take();
        let Some(rx) = rx else {
            tracing::warn!("dispatcher consumer already running");
            return tokio::spawn(async {});
        };
        let this = Arc::clone(self);
        tokio::spawn(this.run(rx))
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Action>) {
        while let Some(action) = rx.recv().await {
            match &action {
                Action::Shutdown => break,
                Action::FileIdResponse { peer, path } => {
                    if let Some(hook) = self.descriptor_hook.get().and_then(Weak::upgrade) {
                        hook.generate_descriptor(path, peer);
                    }
                }
                _ => {
                    let is_chunk = matches!(action, Action::DataChunk { .. });
                    let status = self.transmit(&action).await;
                    if status != StatusCode::Ok {
                        tracing::warn!("transmit of {} returned {status:?}", action.kind());
                    }
                    if is_chunk {
                        if let Some(hook) = self.chunk_sent_hook.get().and_then(Weak::upgrade) {
                            hook.chunk_sent();
                        }
                    }
                }
            }
        }
        tracing::debug!("dispatcher consumer stopped");
    }

    /// Queue an action for ordered transmission. Never blocks the caller.
    pub fn enqueue(&self, action: Action) {
        tracing::trace!("queueing {} for {:?}", action.kind(), action.peer());
        if self.tx.send(action).is_err() {
            tracing::warn!("action dropped: dispatcher consumer has stopped");
        }
    }

    /// Bypass the queue for an inherently synchronous request/response call
    /// and return the transport's status directly.
    ///
    /// Callers use this only for operations with no outstanding queued
    /// dependency, so it cannot reorder against the queue in a way peers
    /// would observe.
    pub async fn call_now(&self, action: &Action) -> StatusCode {
        let transport = self.transport.read().expect("transport lock poisoned").clone();
        match transport {
            Some(transport) => transport.call(action).await,
            None => StatusCode::NoConnection,
        }
    }

    /// Replace the session transport; `None` disconnects.
    pub fn set_transport(&self, transport: Option<Arc<dyn Transport>>) {
        *self.transport.write().expect("transport lock poisoned") = transport;
    }

    /// Queue the shutdown marker; the consumer exits after draining what is
    /// ahead of it.
    pub fn shutdown(&self) {
        self.enqueue(Action::Shutdown);
    }

    async fn transmit(&self, action: &Action) -> StatusCode {
        let transport = self.transport.read().expect("transport lock poisoned").clone();
        match transport {
            Some(transport) => transport.send(action).await,
            None => StatusCode::NoConnection,
        }
    }
}
