use postino_core::{validation::validate_id, MessageSummary, ReadSource};
use std::sync::Arc;
use time::OffsetDateTime;

use crate::cache::{newer_than, window_covers, RecencyCache};
use crate::error::ServiceError;
use crate::store::MessageStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub source: ReadSource,
    pub messages: Vec<MessageSummary>,
}

// Risponde dalla cache quando la finestra arriva abbastanza indietro,
// altrimenti dallo store.
pub struct ReadCoordinator {
    store: Arc<dyn MessageStore>,
    cache: Arc<dyn RecencyCache>,
}

impl ReadCoordinator {
    pub fn new(store: Arc<dyn MessageStore>, cache: Arc<dyn RecencyCache>) -> Self {
        Self { store, cache }
    }

    pub async fn read(
        &self,
        recipient_id: &str,
        min_timestamp: OffsetDateTime,
    ) -> Result<ReadOutcome, ServiceError> {
        validate_id("user_id", recipient_id)?;

        // one load serves both the coverage check and the answer
        match self.cache.read(recipient_id).await {
            Ok(window) if window_covers(&window, min_timestamp) => {
                let messages = newer_than(window, min_timestamp);
                tracing::debug!(recipient = %recipient_id, count = messages.len(), "cache hit");
                return Ok(ReadOutcome {
                    source: ReadSource::Cache,
                    messages,
                });
            }
            Ok(window) => {
                tracing::debug!(recipient = %recipient_id, cached = window.len(), "cache miss");
            }
            Err(error) => {
                tracing::warn!(recipient = %recipient_id, %error, "cache read failed, using store");
            }
        }

        let messages = self
            .store
            .query_messages_since(recipient_id, min_timestamp)
            .await?;
        Ok(ReadOutcome {
            source: ReadSource::Store,
            messages,
        })
    }
}
