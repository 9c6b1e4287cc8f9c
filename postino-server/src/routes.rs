use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;

use crate::controllers;
use crate::{health, AppState};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/health",
            get(|Extension(state): Extension<Arc<AppState>>| async move { health(&state).await }),
        )
        .route("/api/users", post(controllers::register))
        .route("/api/groups", post(controllers::create_group))
        .route("/api/groups/members", post(controllers::update_group))
        .route("/api/blocks", post(controllers::block))
        .route("/api/messages/direct", post(controllers::send_direct))
        .route("/api/messages/group", post(controllers::send_group))
        .route("/api/messages", get(controllers::read_messages))
        .layer(Extension(state))
}
