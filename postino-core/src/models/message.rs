use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Whether a message was addressed to a single user or broadcast to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Direct,
    Group,
}

impl ChannelKind {
    /// Column encoding used by the message store (0 = direct, 1 = group).
    pub fn as_i64(self) -> i64 {
        match self {
            ChannelKind::Direct => 0,
            ChannelKind::Group => 1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(ChannelKind::Direct),
            1 => Some(ChannelKind::Group),
            _ => None,
        }
    }
}

/// Message as persisted by the server. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub sender_id: String,
    /// Recipient user id for direct messages, group id for group messages.
    pub target_id: String,
    pub channel_kind: ChannelKind,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Message {
    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            message_id: self.message_id.clone(),
            timestamp: self.timestamp,
            channel_kind: self.channel_kind,
            sender_id: self.sender_id.clone(),
            text: self.text.clone(),
        }
    }
}

/// What a recipient gets back from a read, both from the cache and the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub message_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub channel_kind: ChannelKind,
    pub sender_id: String,
    pub text: String,
}

/// A message before it reaches the store. Id and timestamp are filled in at
/// persist time when left empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub message_id: Option<String>,
    pub sender_id: String,
    pub target_id: String,
    pub channel_kind: ChannelKind,
    pub text: String,
    pub timestamp: Option<OffsetDateTime>,
}

impl NewMessage {
    pub fn direct(sender_id: &str, recipient_id: &str, text: &str) -> Self {
        Self::new(ChannelKind::Direct, sender_id, recipient_id, text)
    }

    pub fn group(sender_id: &str, group_id: &str, text: &str) -> Self {
        Self::new(ChannelKind::Group, sender_id, group_id, text)
    }

    fn new(channel_kind: ChannelKind, sender_id: &str, target_id: &str, text: &str) -> Self {
        Self {
            message_id: None,
            sender_id: sender_id.to_string(),
            target_id: target_id.to_string(),
            channel_kind,
            text: text.to_string(),
            timestamp: None,
        }
    }

    pub fn with_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
