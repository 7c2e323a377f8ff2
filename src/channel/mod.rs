//! Channel Adapter — the realtime transport as the session controller sees it.
//!
//! Two faces over one connection:
//! - an append-only transcript log of `Message`s, ordered by `order`
//! - named binary sub-channels ("topics") carrying UTF-8 JSON
//!
//! The transport is injected as a `RealtimeChannel` trait object. The
//! controller never owns or reaches for a global client.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// One transcript entry. Produced by the transport, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    /// True when the local participant (the user) sent it.
    pub sender_is_local: bool,
    pub text: String,
    /// Monotonic position in the log.
    pub order: u64,
}

impl Message {
    /// Whether the text carries anything beyond whitespace.
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Something the transport wants the controller to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The transcript log grew. Read it with `RealtimeChannel::messages`.
    LogAppended,
    /// A binary payload arrived on a named topic.
    Data { topic: String, payload: Vec<u8> },
    /// Connectivity changed.
    Connection(bool),
}

/// Errors from publishing on the transport.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("publish on '{topic}' rejected: {reason}")]
    Rejected { topic: String, reason: String },
}

/// The realtime transport capability handed to a session.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Snapshot of the transcript log, oldest first.
    fn messages(&self) -> Vec<Message>;

    /// Messages with `order` greater than `after`, oldest first. `None`
    /// returns the whole log.
    fn messages_since(&self, after: Option<u64>) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| Some(m.order) > after)
            .collect()
    }

    /// Register for events emitted from now on.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChannelEvent>;

    /// Publish a payload on a named topic.
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        reliable: bool,
    ) -> Result<(), ChannelError>;

    /// Current connectivity.
    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_not_content() {
        let msg = Message {
            id: "m1".into(),
            sender_is_local: true,
            text: "  \n\t ".into(),
            order: 0,
        };
        assert!(!msg.has_content());
    }

    #[test]
    fn text_is_content() {
        let msg = Message {
            id: "m1".into(),
            sender_is_local: true,
            text: " build a calculator ".into(),
            order: 0,
        };
        assert!(msg.has_content());
    }

    #[test]
    fn rejected_error_names_topic() {
        let err = ChannelError::Rejected {
            topic: "editor_context".into(),
            reason: "not connected".into(),
        };
        assert!(err.to_string().contains("editor_context"));
        assert!(err.to_string().contains("not connected"));
    }
}
