use async_trait::async_trait;
use postino_core::{
    new_id, now_timestamp,
    utils::{from_unix_micros, to_unix_micros, truncate_to_micros},
    ChannelKind, Message, MessageSummary, NewMessage,
};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use time::OffsetDateTime;

use crate::error::ServiceError;

/// Durable message store, the only source of truth for messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Writes one immutable message, filling in id and timestamp when the
    /// draft has none. An existing id is never overwritten.
    async fn persist(&self, draft: NewMessage) -> Result<Message, ServiceError>;

    /// Every message addressed to `recipient_id`, directly or through a group
    /// they belong to, with `timestamp >= min_timestamp`. Newest first.
    /// Group messages the recipient sent are not included, matching the
    /// fan-out, which never pushes a group message to its sender.
    async fn query_messages_since(
        &self,
        recipient_id: &str,
        min_timestamp: OffsetDateTime,
    ) -> Result<Vec<MessageSummary>, ServiceError>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const INSERT_MESSAGE: &str = "INSERT INTO messages (message_id, sender_id, channel_kind, target_id, body, sent_at) \
     VALUES (?, ?, ?, ?, ?, ?)";

// Canale diretto UNION canale di gruppo (tramite le membership del destinatario).
// I messaggi di gruppo inviati dal destinatario stesso sono esclusi, come nel fan-out.
const MESSAGES_SINCE: &str = r#"
    SELECT message_id, sender_id, channel_kind, body, sent_at
      FROM messages
     WHERE channel_kind = 0 AND target_id = ? AND sent_at >= ?
    UNION ALL
    SELECT m.message_id, m.sender_id, m.channel_kind, m.body, m.sent_at
      FROM messages m
      JOIN group_members g ON g.group_id = m.target_id
     WHERE m.channel_kind = 1 AND g.user_id = ? AND m.sender_id <> ? AND m.sent_at >= ?
    ORDER BY sent_at DESC, message_id DESC
"#;

fn summary_from_row(row: &SqliteRow) -> Result<MessageSummary, ServiceError> {
    let message_id: String = row.try_get("message_id")?;
    let kind: i64 = row.try_get("channel_kind")?;
    let channel_kind = ChannelKind::from_i64(kind)
        .ok_or_else(|| ServiceError::CorruptRow(format!("{message_id}: channel_kind {kind}")))?;
    let micros: i64 = row.try_get("sent_at")?;
    let timestamp = from_unix_micros(micros)
        .map_err(|e| ServiceError::CorruptRow(format!("{message_id}: sent_at {micros}: {e}")))?;
    Ok(MessageSummary {
        message_id,
        timestamp,
        channel_kind,
        sender_id: row.try_get("sender_id")?,
        text: row.try_get("body")?,
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn persist(&self, draft: NewMessage) -> Result<Message, ServiceError> {
        let message = Message {
            message_id: draft.message_id.unwrap_or_else(new_id),
            sender_id: draft.sender_id,
            target_id: draft.target_id,
            channel_kind: draft.channel_kind,
            text: draft.text,
            timestamp: draft
                .timestamp
                .map(truncate_to_micros)
                .unwrap_or_else(now_timestamp),
        };

        sqlx::query(INSERT_MESSAGE)
            .bind(&message.message_id)
            .bind(&message.sender_id)
            .bind(message.channel_kind.as_i64())
            .bind(&message.target_id)
            .bind(&message.text)
            .bind(to_unix_micros(message.timestamp)) // timestamp salvato in microsecondi
            .execute(&self.pool)
            .await
            // un id già presente diventa DuplicateMessage, il resto resta errore di db
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return ServiceError::DuplicateMessage(message.message_id.clone());
                    }
                }
                ServiceError::Database(e)
            })?;

        tracing::debug!(
            message_id = %message.message_id,
            kind = ?message.channel_kind,
            target = %message.target_id,
            "message persisted"
        );
        Ok(message)
    }

    async fn query_messages_since(
        &self,
        recipient_id: &str,
        min_timestamp: OffsetDateTime,
    ) -> Result<Vec<MessageSummary>, ServiceError> {
        let min = to_unix_micros(min_timestamp);
        let rows = sqlx::query(MESSAGES_SINCE)
            .bind(recipient_id)
            .bind(min)
            .bind(recipient_id)
            .bind(recipient_id)
            .bind(min)
            .fetch_all(&self.pool) // tutte le righe, già ordinate dalla query
            .await?;
        rows.iter().map(summary_from_row).collect()
    }
}
