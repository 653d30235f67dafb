//! Chat handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::middleware::session::SessionHandle;
use crate::AppState;
use lingochat_common::{
    chat::ChatReply,
    errors::{AppError, Result},
};

/// Chat request
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[serde(default)]
    #[validate(length(max = 8000))]
    pub message: String,
}

/// Run one chat turn
pub async fn chat(
    State(state): State<AppState>,
    Extension(handle): Extension<SessionHandle>,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>> {
    let Json(request) = body.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("message".to_string()),
    })?;

    let mut slot = handle.lock().await;
    let session = slot.as_mut().ok_or_else(|| AppError::Internal {
        message: "No active session".to_string(),
    })?;

    let reply = state
        .chat
        .handle_turn(session, &request.message, Utc::now())
        .await?;

    Ok(Json(reply))
}
