//! Conversation reset and logout handlers

use axum::{extract::State, Extension, Json};
use chrono::Utc;

use super::OkResponse;
use crate::middleware::session::SessionHandle;
use crate::AppState;
use lingochat_common::{auth::Identity, errors::Result, metrics};

/// Drop the conversation turns; the session and its clock keep running
pub async fn clear(
    identity: Identity,
    Extension(handle): Extension<SessionHandle>,
) -> Result<Json<OkResponse>> {
    if let Some(session) = handle.lock().await.as_mut() {
        session.clear_conversation();
    }

    tracing::info!(uid = %identity.uid, "Conversation cleared");
    Ok(Json(OkResponse::ok()))
}

/// Flush usage and end the session
pub async fn logout(
    State(state): State<AppState>,
    identity: Identity,
    Extension(handle): Extension<SessionHandle>,
) -> Result<Json<OkResponse>> {
    let mut slot = handle.lock().await;

    if let Some(mut session) = slot.take() {
        state.usage.flush_best_effort(&mut session, Utc::now()).await;
        metrics::record_session_closed("logout");
    }

    tracing::info!(uid = %identity.uid, "Logged out");
    Ok(Json(OkResponse::ok()))
}
