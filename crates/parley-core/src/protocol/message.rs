//! The in-memory, unencrypted message.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A message as held in memory, before encryption.
///
/// Two messages are equal when their serialized forms are equal, i.e. when
/// the five wire fields match; the transient `sent` flag never takes part
/// in equality or ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlainMessage {
    /// Message body. Must satisfy the content grammar before serialization.
    pub content: String,
    /// True iff `content` originally started with `/`.
    ///
    /// The codec only carries the flag; interpreting command semantics is
    /// the dispatcher's job.
    pub is_command: bool,
    /// UUID of the conversation this message belongs to.
    pub conversation_id: String,
    /// UUID of the sender.
    pub sender_id: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Whether this message has been delivered. Not part of the wire format.
    #[serde(skip)]
    pub sent: bool,
}

impl PlainMessage {
    /// Create a message stamped with the current time.
    ///
    /// The message is classified as a command iff the first content
    /// character is `/`.
    pub fn new(
        content: impl Into<String>,
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let is_command = content.starts_with('/');
        Self {
            content,
            is_command,
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            timestamp: chrono::Utc::now().timestamp(),
            sent: false,
        }
    }

    /// Create a message from explicit parts, including the command flag.
    pub fn from_parts(
        content: impl Into<String>,
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        is_command: bool,
        timestamp: i64,
    ) -> Self {
        Self {
            content: content.into(),
            is_command,
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            timestamp,
            sent: false,
        }
    }

    /// Mark this message as delivered.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }
}

impl PartialEq for PlainMessage {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.sender_id == other.sender_id
            && self.conversation_id == other.conversation_id
            && self.is_command == other.is_command
            && self.content == other.content
    }
}

impl Eq for PlainMessage {}

/// Total order by `(timestamp, sender_id)` ascending, with the remaining
/// wire fields as tie-breakers so the order is consistent with equality.
/// Required when merging persisted and in-flight message histories.
impl Ord for PlainMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.sender_id.cmp(&other.sender_id))
            .then_with(|| self.conversation_id.cmp(&other.conversation_id))
            .then_with(|| self.is_command.cmp(&other.is_command))
            .then_with(|| self.content.cmp(&other.content))
    }
}

impl PartialOrd for PlainMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PlainMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sender: String = self.sender_id.chars().take(8).collect();
        write!(f, "[{}] {}", sender, self.content)
    }
}
