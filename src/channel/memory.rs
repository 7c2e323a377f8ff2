//! In-process loopback transport.
//!
//! Holds the transcript log and fans events out to every live subscriber.
//! The log outlives any one session, so remounting a controller onto the
//! same `MemoryChannel` sees the history that was already there.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChannelError, ChannelEvent, Message, RealtimeChannel};

/// A payload the controller published.
#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub reliable: bool,
}

impl Published {
    /// Decode the payload as JSON (`Null` if it is not JSON).
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Default)]
struct Inner {
    log: Vec<Message>,
    next_order: u64,
    subscribers: Vec<mpsc::UnboundedSender<ChannelEvent>>,
    published: Vec<Published>,
    disconnected: bool,
    reject_reason: Option<String>,
}

impl Inner {
    fn emit(&mut self, event: ChannelEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Loopback `RealtimeChannel` with a scriptable remote side.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    inner: Mutex<Inner>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a message from the local user. Returns its generated id.
    pub fn push_local(&self, text: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.push_message(&id, true, text);
        id
    }

    /// Append a message from the remote agent. Returns its generated id.
    pub fn push_remote(&self, text: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.push_message(&id, false, text);
        id
    }

    /// Append a message with a caller-chosen id.
    pub fn push_message(&self, id: &str, sender_is_local: bool, text: &str) {
        let mut inner = self.lock();
        let order = inner.next_order;
        inner.next_order += 1;
        inner.log.push(Message {
            id: id.to_string(),
            sender_is_local,
            text: text.to_string(),
            order,
        });
        inner.emit(ChannelEvent::LogAppended);
    }

    /// Deliver a payload on a topic, as if the agent had published it.
    pub fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        let mut inner = self.lock();
        inner.emit(ChannelEvent::Data {
            topic: topic.to_string(),
            payload: payload.into(),
        });
    }

    /// Flip connectivity and notify subscribers.
    pub fn set_connected(&self, connected: bool) {
        let mut inner = self.lock();
        inner.disconnected = !connected;
        inner.emit(ChannelEvent::Connection(connected));
    }

    /// Make every subsequent publish fail with `reason` (`None` restores).
    pub fn reject_publishes(&self, reason: Option<&str>) {
        self.lock().reject_reason = reason.map(str::to_string);
    }

    /// Everything published so far, oldest first.
    pub fn published(&self) -> Vec<Published> {
        self.lock().published.clone()
    }

    /// Publishes on one topic, oldest first.
    pub fn published_on(&self, topic: &str) -> Vec<Published> {
        self.lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }
}

#[async_trait]
impl RealtimeChannel for MemoryChannel {
    fn messages(&self) -> Vec<Message> {
        self.lock().log.clone()
    }

    fn messages_since(&self, after: Option<u64>) -> Vec<Message> {
        let inner = self.lock();
        let start = inner.log.partition_point(|m| Some(m.order) <= after);
        inner.log[start..].to_vec()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        reliable: bool,
    ) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        if inner.disconnected {
            return Err(ChannelError::Closed);
        }
        if let Some(reason) = inner.reject_reason.clone() {
            return Err(ChannelError::Rejected {
                topic: topic.to_string(),
                reason,
            });
        }
        inner.published.push(Published {
            topic: topic.to_string(),
            payload,
            reliable,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.lock().disconnected
    }
}
