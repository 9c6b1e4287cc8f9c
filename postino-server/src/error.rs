use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use postino_core::ValidationError;
use serde_json::json;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::cache::CacheError;

/// The four outcomes a caller has to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AccessDenied,
    Persistence,
    Cache,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{recipient_id} has blocked {sender_id}")]
    AccessDenied {
        sender_id: String,
        recipient_id: String,
    },

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("message id {0} already exists")]
    DuplicateMessage(String),

    #[error("unreadable row: {0}")]
    CorruptRow(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The durable write succeeded, some recency cache pushes did not.
    #[error("message {message_id} stored but {failed} cache push(es) failed: {source}")]
    FanoutDegraded {
        message_id: String,
        timestamp: OffsetDateTime,
        failed: usize,
        #[source]
        source: CacheError,
    },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::AccessDenied { .. } => ErrorKind::AccessDenied,
            ServiceError::Database(_)
            | ServiceError::DuplicateMessage(_)
            | ServiceError::CorruptRow(_) => ErrorKind::Persistence,
            ServiceError::Cache(_) | ServiceError::FanoutDegraded { .. } => ErrorKind::Cache,
        }
    }

    /// Persistence and cache failures may succeed when tried again; validation
    /// and access failures never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Persistence | ErrorKind::Cache)
    }

    fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::AccessDenied { .. } => "access_denied",
            ServiceError::DuplicateMessage(_) => "duplicate_message",
            ServiceError::Database(_) | ServiceError::CorruptRow(_) => "persistence_error",
            ServiceError::Cache(_) => "cache_error",
            ServiceError::FanoutDegraded { .. } => "cache_degraded",
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
            ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Cache => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let mut body = postino_core::Error::new(self.code(), self.to_string());
        if let ServiceError::FanoutDegraded {
            message_id,
            timestamp,
            failed,
            ..
        } = &self
        {
            body = body.with_details(json!({
                "messageId": message_id,
                "timestamp": timestamp.format(&Rfc3339).ok(),
                "failedPushes": failed,
            }));
        }
        (status, Json(body)).into_response()
    }
}
