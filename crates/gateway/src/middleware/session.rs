//! Session lifecycle middleware
//!
//! Runs in front of every page and API route. Per request it:
//! 1. takes the per-session lease for the cookie's session id,
//! 2. discards state idle for longer than the timeout,
//! 3. on API routes, verifies the bearer token, refreshes the profile and
//!    attaches the identity and session to the request,
//! 4. persists whatever the handler left behind and sets the cookie;
//!    a failed save fails the request.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use lingochat_common::{
    auth,
    errors::{AppError, Result},
    metrics, profile,
    session::{lifecycle, new_session_id, Session, SessionLease, TimeoutCheck},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::AppState;

/// Mutable session slot shared between the middleware and the handler.
/// A handler that ends the session leaves `None` behind.
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Option<Session>>>);

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(Some(session))))
    }

    /// Lock the slot for the rest of the handler
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Option<Session>> {
        self.0.lock().await
    }

    async fn take(&self) -> Option<Session> {
        self.0.lock().await.take()
    }
}

/// Session id from the request's `Cookie` header
pub fn session_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

fn set_cookie(name: &str, value: &str, secure: bool, max_age: Option<u64>) -> Option<HeaderValue> {
    let mut cookie = format!("{}={}; HttpOnly; SameSite=Lax; Path=/", name, value);
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

fn issue_cookie(state: &AppState, id: &str) -> Option<HeaderValue> {
    let session = &state.config.session;
    set_cookie(&session.cookie_name, id, session.cookie_secure, None)
}

fn expire_cookie(state: &AppState) -> Option<HeaderValue> {
    let session = &state.config.session;
    set_cookie(&session.cookie_name, "", session.cookie_secure, Some(0))
}

fn with_cookie(mut response: Response, cookie: Option<HeaderValue>) -> Response {
    if let Some(cookie) = cookie {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

/// Lease plus the still-live prior state for the cookie's session id
struct Prior {
    id: Option<String>,
    _lease: Option<SessionLease>,
    session: Option<Session>,
    expired: bool,
}

/// Acquire the lease and run the timeout check
async fn load_prior(state: &AppState, headers: &HeaderMap, now: DateTime<Utc>) -> Result<Prior> {
    let Some(id) = session_cookie(headers, &state.config.session.cookie_name).map(str::to_string)
    else {
        return Ok(Prior {
            id: None,
            _lease: None,
            session: None,
            expired: false,
        });
    };

    let lease = state.locks.acquire(&id).await;
    let stored = state.sessions.load(&id).await?;

    let (session, expired) =
        match lifecycle::check_timeout(stored, now, state.config.idle_timeout()) {
            TimeoutCheck::Absent => (None, false),
            TimeoutCheck::Live(session) => (Some(session), false),
            TimeoutCheck::Expired { idle_secs } => {
                state.sessions.remove(&id).await?;
                metrics::record_session_expired();
                info!(session_id = %id, idle_secs, "Session expired after inactivity");
                (None, true)
            }
        };

    Ok(Prior {
        id: Some(id),
        _lease: Some(lease),
        session,
        expired,
    })
}

/// Timeout check for HTML pages. Expired state is cleared; nothing is rejected.
pub async fn page_session_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let prior = load_prior(&state, request.headers(), Utc::now()).await?;
    let expired = prior.expired;
    drop(prior);

    let response = next.run(request).await;
    Ok(if expired {
        with_cookie(response, expire_cookie(&state))
    } else {
        response
    })
}

/// Full lifecycle for `/api/*` routes
pub async fn api_session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let now = Utc::now();
    let prior = load_prior(&state, request.headers(), now).await?;

    if prior.expired {
        return Ok(with_cookie(
            AppError::SessionExpired.into_response(),
            expire_cookie(&state),
        ));
    }

    let identity = auth::authenticate(state.verifier.as_ref(), request.headers()).await?;

    if let Err(e) = profile::touch_profile(state.store.as_ref(), &identity, now).await {
        warn!(uid = %identity.uid, error = %e, "Profile update failed");
    }

    let activation = lifecycle::activate(prior.session, &identity.uid, now);

    if let Some(mut displaced) = activation.displaced {
        state.usage.flush_best_effort(&mut displaced, now).await;
        metrics::record_session_closed("identity_switch");
        info!(
            previous_uid = %displaced.uid(),
            uid = %identity.uid,
            "Session closed on identity switch"
        );
    }

    let (session_id, created) = match (prior.id.clone(), activation.created) {
        (Some(id), false) => (id, false),
        (previous, _) => {
            // Drop state left under the old id; a new session gets a new id
            if let Some(previous) = previous {
                state.sessions.remove(&previous).await?;
            }
            let id = new_session_id();
            metrics::record_session_created();
            info!(uid = %identity.uid, session_id = %id, "Session started");
            (id, true)
        }
    };

    let handle = SessionHandle::new(activation.session);
    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(handle.clone());

    let response = next.run(request).await;

    let cookie = match handle.take().await {
        Some(session) => {
            // Unsaved turns and flush cursor are lost; fail the request
            if let Err(e) = state.sessions.save(&session_id, &session).await {
                error!(session_id = %session_id, error = %e, "Failed to save session");
                return Err(e);
            }
            created.then(|| issue_cookie(&state, &session_id)).flatten()
        }
        None => {
            if let Err(e) = state.sessions.remove(&session_id).await {
                error!(session_id = %session_id, error = %e, "Failed to remove session");
            }
            expire_cookie(&state)
        }
    };

    Ok(with_cookie(response, cookie))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; lingochat_sid=abc-123; other=1"),
        );
        assert_eq!(session_cookie(&headers, "lingochat_sid"), Some("abc-123"));
        assert_eq!(session_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_empty_cookie_value_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("lingochat_sid="));
        assert_eq!(session_cookie(&headers, "lingochat_sid"), None);
    }

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = set_cookie("lingochat_sid", "abc", false, None).unwrap();
        assert_eq!(cookie, "lingochat_sid=abc; HttpOnly; SameSite=Lax; Path=/");

        let expired = set_cookie("lingochat_sid", "", true, Some(0)).unwrap();
        assert_eq!(
            expired,
            "lingochat_sid=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; Secure"
        );
    }
}
