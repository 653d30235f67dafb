//! Static HTML shells and their assets

use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
};

use crate::AppState;

const HOME: &str = include_str!("../../templates/home.html");
const CHAT: &str = include_str!("../../templates/chat.html");
const LOGIN: &str = include_str!("../../templates/login.html");
const SIGNUP: &str = include_str!("../../templates/signup.html");
const ADMIN: &str = include_str!("../../templates/admin.html");
const BASE_CSS: &str = include_str!("../../templates/base.css");
const AUTH_JS: &str = include_str!("../../templates/auth.js");

const API_KEY_SLOT: &str = "<!-- firebase-api-key -->";

/// Fill the sign-in page's API key slot; values are escaped for an attribute
fn with_api_key(page: &str, api_key: Option<&str>) -> String {
    let Some(key) = api_key else {
        return page.to_string();
    };
    let escaped = key
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    page.replace(
        API_KEY_SLOT,
        &format!(r#"<meta name="firebase-api-key" content="{}">"#, escaped),
    )
}

pub async fn home() -> Html<&'static str> {
    Html(HOME)
}

pub async fn chat() -> Html<&'static str> {
    Html(CHAT)
}

pub async fn login(State(state): State<AppState>) -> Html<String> {
    Html(with_api_key(LOGIN, state.config.auth.web_api_key.as_deref()))
}

pub async fn signup(State(state): State<AppState>) -> Html<String> {
    Html(with_api_key(SIGNUP, state.config.auth.web_api_key.as_deref()))
}

pub async fn admin() -> Html<&'static str> {
    Html(ADMIN)
}

pub async fn base_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], BASE_CSS)
}

pub async fn auth_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/javascript; charset=utf-8")], AUTH_JS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_slot_filled() {
        let page = with_api_key(LOGIN, Some("AIza\"x"));
        assert!(page.contains(r#"<meta name="firebase-api-key" content="AIza&quot;x">"#));
        assert!(!page.contains(API_KEY_SLOT));
    }

    #[test]
    fn test_api_key_slot_left_without_key() {
        assert_eq!(with_api_key(SIGNUP, None), SIGNUP);
    }
}
