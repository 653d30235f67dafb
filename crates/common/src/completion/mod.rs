//! Completion provider abstraction
//!
//! A provider receives the ordered turn history of a conversation and
//! returns the assistant's reply text. Failures surface once; callers
//! decide whether to retry.

use crate::config::{CompletionConfig, ProviderKind};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::session::{Role, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for reply generation
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate the next assistant reply for `history`.
    /// The last entry is the user turn being answered.
    async fn complete(&self, history: &[Turn]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Gemini `generateContent` client
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    system_prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Gemini names the assistant side `model`
fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn build_request<'a>(system_prompt: &'a str, history: &'a [Turn]) -> GenerateRequest<'a> {
    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part { text: system_prompt }],
        },
        contents: history
            .iter()
            .map(|turn| Content {
                role: Some(gemini_role(turn.role)),
                parts: vec![Part {
                    text: &turn.content,
                }],
            })
            .collect(),
    }
}

fn reply_text(response: GenerateResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AppError::Provider {
            message: "Completion returned no text".to_string(),
        });
    }
    Ok(text)
}

impl GeminiProvider {
    /// Create a new Gemini provider
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "completion.api_key (GEMINI_API_KEY) is not set".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            system_prompt: config.system_prompt.clone(),
        })
    }

    async fn make_request(&self, history: &[Turn]) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let request = build_request(&self.system_prompt, history);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Provider {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: GenerateResponse = response.json().await.map_err(|e| AppError::Provider {
            message: format!("Failed to parse response: {}", e),
        })?;

        reply_text(result)
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, history: &[Turn]) -> Result<String> {
        let start = Instant::now();
        let result = self.make_request(history).await;
        metrics::record_completion(start.elapsed(), &self.model, result.is_ok());

        if let Err(e) = &result {
            tracing::warn!(
                model = %self.model,
                turns = history.len(),
                error = %e,
                "Completion failed"
            );
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock provider for testing and offline development
pub struct MockProvider {
    fail: bool,
}

impl MockProvider {
    /// Provider that echoes the last user message
    pub fn new() -> Self {
        Self { fail: false }
    }

    /// Provider whose every call fails
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, history: &[Turn]) -> Result<String> {
        if self.fail {
            return Err(AppError::Provider {
                message: "mock provider failure".to_string(),
            });
        }

        let last = history
            .last()
            .filter(|turn| turn.role == Role::User)
            .ok_or_else(|| AppError::Provider {
                message: "history must end with a user turn".to_string(),
            })?;

        Ok(format!("echo ({} turns): {}", history.len(), last.content))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Build the provider selected in configuration
pub fn create_provider(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider {
        ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::new(config)?)),
        ProviderKind::Mock => Ok(Arc::new(MockProvider::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<Turn> {
        vec![
            Turn::user("namaste", "hi"),
            Turn::assistant("Namaste! Kaise ho?", "hi"),
            Turn::user("main theek hoon", "hi"),
        ]
    }

    #[test]
    fn test_request_shape() {
        let turns = history();
        let request = build_request("be brief", &turns);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["system_instruction"]["parts"][0]["text"], "be brief");
        assert!(json["system_instruction"].get("role").is_none());

        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "main theek hoon");
    }

    #[test]
    fn test_reply_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello"},{"text":" there"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), "Hello there");
    }

    #[test]
    fn test_empty_candidates_is_provider_error() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        let err = reply_text(response).unwrap_err();
        assert!(matches!(err, AppError::Provider { .. }));

        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(reply_text(blocked).is_err());
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let config = CompletionConfig {
            api_key: None,
            ..CompletionConfig::default()
        };
        assert!(matches!(
            GeminiProvider::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let provider = MockProvider::new();
        let reply = provider.complete(&history()).await.unwrap();
        assert_eq!(reply, "echo (3 turns): main theek hoon");

        let err = MockProvider::failing().complete(&history()).await.unwrap_err();
        assert!(matches!(err, AppError::Provider { .. }));
    }
}
