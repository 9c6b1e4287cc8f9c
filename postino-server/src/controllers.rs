use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Query},
    http::StatusCode,
    Json,
};
use postino_core::{
    parse_timestamp,
    validation::{validate_block, validate_create_group, validate_register, validate_update_group},
    ActionResponse, BlockRequest, CreateGroupRequest, CreateGroupResponse, ReadMessagesQuery,
    ReadMessagesResponse, RegisterRequest, RegisterResponse, SendDirectRequest, SendGroupRequest,
    SendResponse, UpdateGroupRequest, ValidationError,
};
use std::sync::Arc;

use crate::{error::ServiceError, AppState};

type Handled<T> = Result<T, ServiceError>;

// Missing or mistyped fields become a typed validation error instead of
// axum's plain-text rejection.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ValidationError::Malformed(e.body_text()).into())
}

/// POST /api/users
pub async fn register(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Handled<(StatusCode, Json<RegisterResponse>)> {
    let req = body(payload)?;
    // username vuoto o troppo lungo -> 400
    validate_register(&req, &state.limits)?;
    let user = state.directory.register_user(req.username.trim()).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user })))
}

/// POST /api/groups
pub async fn create_group(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Handled<(StatusCode, Json<CreateGroupResponse>)> {
    let req = body(payload)?;
    validate_create_group(&req, &state.limits)?;
    let group = state.directory.create_group(req.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(CreateGroupResponse { group })))
}

/// POST /api/groups/members
pub async fn update_group(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<UpdateGroupRequest>, JsonRejection>,
) -> Handled<Json<ActionResponse>> {
    let req = body(payload)?;
    validate_update_group(&req)?;
    state
        .directory
        .set_membership(&req.group_id, &req.user_id, req.to_be_added)
        .await?;
    let action = if req.to_be_added {
        "user has been added"
    } else {
        "user has been removed"
    };
    Ok(Json(ActionResponse {
        action: action.to_string(),
    }))
}

/// POST /api/blocks
pub async fn block(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<BlockRequest>, JsonRejection>,
) -> Handled<Json<ActionResponse>> {
    let req = body(payload)?;
    validate_block(&req)?;
    state
        .directory
        .set_block(&req.blocking_user_id, &req.blocked_user_id, req.to_block)
        .await?;
    let action = if req.to_block {
        "user has been blocked"
    } else {
        "user has been unblocked"
    };
    Ok(Json(ActionResponse {
        action: action.to_string(),
    }))
}

/// POST /api/messages/direct
pub async fn send_direct(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<SendDirectRequest>, JsonRejection>,
) -> Handled<(StatusCode, Json<SendResponse>)> {
    let req = body(payload)?;
    let message = state.dispatcher.send_direct(&req).await?;
    Ok((
        StatusCode::CREATED,
        Json(SendResponse {
            message_id: message.message_id,
            timestamp: message.timestamp,
        }),
    ))
}

/// POST /api/messages/group
pub async fn send_group(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<SendGroupRequest>, JsonRejection>,
) -> Handled<(StatusCode, Json<SendResponse>)> {
    let req = body(payload)?;
    let message = state.dispatcher.send_group(&req).await?;
    Ok((
        StatusCode::CREATED,
        Json(SendResponse {
            message_id: message.message_id,
            timestamp: message.timestamp,
        }),
    ))
}

/// GET /api/messages?userId=..&minTimestamp=..
pub async fn read_messages(
    Extension(state): Extension<Arc<AppState>>,
    query: Result<Query<ReadMessagesQuery>, QueryRejection>,
) -> Handled<Json<ReadMessagesResponse>> {
    // parametri mancanti nella query string -> errore di validazione
    let Query(q) = query.map_err(|e| ServiceError::from(ValidationError::Malformed(e.body_text())))?;
    let min_timestamp = parse_timestamp(&q.min_timestamp)?; // accetta RFC 3339 o "YYYY-MM-DD HH:MM:SS"
    let outcome = state.reader.read(&q.user_id, min_timestamp).await?;
    Ok(Json(ReadMessagesResponse {
        source: outcome.source,
        messages: outcome.messages,
    }))
}
