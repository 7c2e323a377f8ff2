//! Pending-reply tracker: is the session waiting on the agent?
//!
//! Two states: `Idle` and `Awaiting`. A new local utterance with real text
//! arms `Awaiting`; the cycle closes on whichever comes first, a structured
//! result (`close_with_result`) or a newer remote transcript message
//! (`observe`).
//!
//! The log is read through a cursor (highest `order` already scanned) plus
//! the ids of the newest local and remote messages seen. Both only move
//! forward, so rescanning the same log any number of times is a no-op.

use crate::channel::Message;

/// Where the tracker is in its cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplyState {
    #[default]
    Idle,
    Awaiting {
        /// The local message that armed this cycle.
        message_id: String,
        order: u64,
    },
}

/// A state change produced by scanning the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `Idle`/`Awaiting` → `Awaiting` on a new local utterance.
    Armed { message_id: String },
    /// `Awaiting` → `Idle` on a conversational reply with no result.
    ClosedByText { message_id: String },
}

/// Tracks whether a reply to the latest utterance is outstanding.
#[derive(Debug, Clone, Default)]
pub struct PendingReplyTracker {
    state: ReplyState,
    last_local_id: Option<String>,
    last_remote_id: Option<String>,
    cursor: Option<u64>,
}

impl PendingReplyTracker {
    /// Attach to a log that may already hold history. Everything present
    /// now counts as seen; only later messages can cause transitions.
    pub fn attach(log: &[Message]) -> Self {
        Self {
            state: ReplyState::Idle,
            last_local_id: newest(log, true).map(|m| m.id.clone()),
            last_remote_id: newest(log, false).map(|m| m.id.clone()),
            cursor: log.last().map(|m| m.order),
        }
    }

    /// Scan whatever the log gained since the last call.
    ///
    /// Within one scan the newest local message is handled before the
    /// newest remote one. A remote message older than the armed utterance
    /// answers an earlier turn, so it does not close this one; the cycle
    /// still closes on a structured result or on the next newer reply.
    ///
    /// `log` may be the whole log or any suffix that covers everything
    /// past the cursor.
    pub fn observe(&mut self, log: &[Message]) -> Vec<Transition> {
        let cursor = self.cursor;
        let start = log.partition_point(|m| Some(m.order) <= cursor);
        let fresh = &log[start..];
        let Some(last) = fresh.last() else {
            return Vec::new();
        };
        self.cursor = Some(last.order);

        let mut transitions = Vec::new();

        if let Some(local) = newest(fresh, true) {
            if self.last_local_id.as_deref() != Some(local.id.as_str()) {
                self.last_local_id = Some(local.id.clone());
                if local.has_content() {
                    self.state = ReplyState::Awaiting {
                        message_id: local.id.clone(),
                        order: local.order,
                    };
                    transitions.push(Transition::Armed {
                        message_id: local.id.clone(),
                    });
                }
            }
        }

        if let Some(remote) = newest(fresh, false) {
            if self.last_remote_id.as_deref() != Some(remote.id.as_str()) {
                self.last_remote_id = Some(remote.id.clone());
                if let ReplyState::Awaiting { order, .. } = self.state {
                    if remote.order > order {
                        self.state = ReplyState::Idle;
                        transitions.push(Transition::ClosedByText {
                            message_id: remote.id.clone(),
                        });
                    }
                }
            }
        }

        transitions
    }

    /// Close the cycle because a structured result was applied.
    /// Returns whether a cycle was open.
    pub fn close_with_result(&mut self) -> bool {
        let was_awaiting = self.is_awaiting();
        self.state = ReplyState::Idle;
        was_awaiting
    }

    /// Highest `order` scanned so far.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, ReplyState::Awaiting { .. })
    }

    pub fn last_local_id(&self) -> Option<&str> {
        self.last_local_id.as_deref()
    }

    pub fn last_remote_id(&self) -> Option<&str> {
        self.last_remote_id.as_deref()
    }
}

fn newest(log: &[Message], local: bool) -> Option<&Message> {
    log.iter().rev().find(|m| m.sender_is_local == local)
}
