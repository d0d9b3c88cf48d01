//! Realtime transport trait — fire-and-forget event broadcast.
//!
//! The dispatcher pushes an event after executing a mutating action so open
//! clients can refresh. Delivery is best-effort: the core never blocks a
//! turn on transport errors, it logs and moves on.

use async_trait::async_trait;

use crate::key::SessionKey;

/// A pushed domain event.
#[derive(Debug, Clone)]
pub struct BroadcastEvent {
    /// Event name, e.g. "task.created", "tasks.bulk_deleted".
    pub name: String,
    /// Arbitrary event payload.
    pub payload: serde_json::Value,
}

impl BroadcastEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// The realtime push collaborator.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Broadcast an event to every client attached to the session's
    /// user/workspace. Errors are the implementation's problem; callers
    /// ignore the result beyond logging.
    async fn broadcast(&self, key: &SessionKey, event: BroadcastEvent);
}

/// A transport that drops every event. Useful for tests and headless runs.
pub struct NoopTransport;

#[async_trait]
impl RealtimeTransport for NoopTransport {
    async fn broadcast(&self, _key: &SessionKey, _event: BroadcastEvent) {}
}
