//! API and page handlers

pub mod admin;
pub mod chat;
pub mod health;
pub mod pages;
pub mod session;

use axum::http::Uri;
use lingochat_common::errors::AppError;
use serde::Serialize;

/// Body of endpoints that only acknowledge
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Fallback for unknown paths under `/api`
pub async fn api_not_found(uri: Uri) -> AppError {
    AppError::NotFound {
        path: uri.path().to_string(),
    }
}
