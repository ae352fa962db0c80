//! Test doubles shared by unit and integration tests.

use crate::action::Action;
use crate::error::StatusCode;
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Transport that records every action instead of transmitting it.
///
/// `send` always reports [`StatusCode::Ok`]; the status returned by `call`
/// is configurable so tests can simulate peer answers.
pub struct RecordingTransport {
    sent: Mutex<Vec<Action>>,
    calls: Mutex<Vec<Action>>,
    call_status: Mutex<StatusCode>,
}

impl RecordingTransport {
    /// Recorder whose `call` answers [`StatusCode::Ok`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            call_status: Mutex::new(StatusCode::Ok),
        }
    }

    /// Configure the status future `call`s answer with.
    pub fn set_call_status(&self, status: StatusCode) {
        *self.call_status.lock().unwrap() = status;
    }

    /// Actions that went through `send`, in transmission order.
    #[must_use]
    pub fn sent(&self) -> Vec<Action> {
        self.sent.lock().unwrap().clone()
    }

    /// Actions that went through `call`, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<Action> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, action: &Action) -> StatusCode {
        self.sent.lock().unwrap().push(action.clone());
        StatusCode::Ok
    }

    async fn call(&self, action: &Action) -> StatusCode {
        self.calls.lock().unwrap().push(action.clone());
        *self.call_status.lock().unwrap()
    }
}

/// Poll `condition` until it holds, panicking after two seconds.
///
/// # Panics
///
/// Panics if the condition does not hold within the window.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
