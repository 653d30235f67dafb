//! Admin usage report

use axum::{extract::State, Json};

use crate::AppState;
use lingochat_common::{
    auth::Identity,
    errors::{AppError, Result},
    usage::AdminReport,
};

/// Per-user profile and usage table, restricted to the admin allow-list
pub async fn admin_data(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<AdminReport>> {
    if !state.config.auth.is_admin(&identity.email) {
        tracing::warn!(uid = %identity.uid, email = %identity.email, "Admin access denied");
        return Err(AppError::Forbidden {
            message: "Admin access required".to_string(),
        });
    }

    let report = AdminReport::load(state.store.as_ref()).await?;

    tracing::info!(
        uid = %identity.uid,
        total_users = report.total_users,
        "Admin report served"
    );
    Ok(Json(report))
}
