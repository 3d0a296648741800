//! Framework-agnostic event broadcasting.
//!
//! Subscribers (UI layers, session-state trackers, tests) attach to a
//! single broadcast channel and filter by topic. Events and errors travel
//! on distinct per-session topics so a structured failure is never mixed
//! into the text stream.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::SessionId;

/// Default channel capacity. Slow subscribers past this lag and miss
/// events rather than blocking producers.
const DEFAULT_CAPACITY: usize = 1024;

/// Topic helpers for the per-session channels.
pub mod topic {
    use super::SessionId;

    /// Canonical events for one session.
    pub fn event(session_id: &SessionId) -> String {
        format!("agent:event:{}", session_id)
    }

    /// Classified errors for one session - a separate channel from events.
    pub fn error(session_id: &SessionId) -> String {
        format!("agent:error:{}", session_id)
    }

    /// Raw stderr lines for one session.
    pub fn stderr(session_id: &SessionId) -> String {
        format!("agent:stderr:{}", session_id)
    }

    /// Process exit notification for one session.
    pub fn close(session_id: &SessionId) -> String {
        format!("agent:close:{}", session_id)
    }
}

/// A broadcast event: topic plus JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl BroadcastEvent {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// Fan-out bus for session events.
///
/// Backed by a tokio broadcast channel so any number of consumers can
/// receive the same events concurrently, each in emission order.
pub struct EventBus {
    sender: broadcast::Sender<BroadcastEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit a payload on a topic. Returns how many subscribers saw it;
    /// zero subscribers drops the event silently.
    pub fn emit<T: Serialize>(&self, topic: &str, payload: &T) -> usize {
        let json_payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Failed to serialize event payload: {}", e);
                return 0;
            }
        };
        self.sender
            .send(BroadcastEvent::new(topic, json_payload))
            .unwrap_or(0)
    }

    /// Subscribe to all future events on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
