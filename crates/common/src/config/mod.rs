//! Configuration management for LingoChat services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Legacy deployment variables (GEMINI_API_KEY, GEMINI_MODEL,
//!   GOOGLE_APPLICATION_CREDENTIALS, PORT)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// System instruction sent with every completion request by default
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful multilingual conversational AI assistant.\n\n\
Rules:\n\
1. Detect the user's language.\n\
2. Always reply in the SAME language used by the user.\n\
3. Be clear, concise and friendly.\n\
4. If user mixes languages, reply in the dominant language.\n";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Redis configuration (session backend)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Database configuration (document store backend)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Completion provider configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

/// Where browser session state is kept
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Inactivity window after which a session expires
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Name of the cookie carrying the session id
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Add the `Secure` attribute to the session cookie
    #[serde(default)]
    pub cookie_secure: bool,

    /// Session state backend
    #[serde(default = "default_session_backend")]
    pub backend: SessionBackend,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Seconds kept beyond the idle timeout before Redis drops a session
    #[serde(default = "default_ttl_slack")]
    pub ttl_slack_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Postgres URL; the in-memory document store is used when absent
    pub url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_db_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// Completion backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Gemini,
    Mock,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// Provider: gemini, mock
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    /// API key for the provider
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    /// System instruction
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// Identity verifier selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerifierKind {
    /// Firebase ID tokens (RS256, Google-published keys)
    Firebase,
    /// HS256 tokens signed with a shared secret
    SharedSecret,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Token verifier
    #[serde(default = "default_verifier")]
    pub verifier: VerifierKind,

    /// Firebase project id (token audience)
    pub project_id: Option<String>,

    /// Service account JSON; its `project_id` is used when `project_id` is unset
    pub credentials_file: Option<String>,

    /// Secret for the shared-secret verifier
    pub shared_secret: Option<String>,

    /// E-mail addresses allowed on the admin surface
    #[serde(default)]
    pub admin_emails: Vec<String>,

    /// How long fetched signing keys are trusted
    #[serde(default = "default_jwks_cache")]
    pub jwks_cache_secs: u64,

    /// Public Firebase web API key handed to the login pages
    pub web_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second across the API surface
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 90 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_idle_timeout_secs() -> u64 { 300 }
fn default_cookie_name() -> String { "lingochat_sid".to_string() }
fn default_session_backend() -> SessionBackend { SessionBackend::Memory }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_key_prefix() -> String { "lingochat".to_string() }
fn default_ttl_slack() -> u64 { 60 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_db_idle_timeout() -> u64 { 300 }
fn default_provider() -> ProviderKind { ProviderKind::Gemini }
fn default_model() -> String { "gemini-2.5-flash".to_string() }
fn default_endpoint() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_completion_timeout() -> u64 { 60 }
fn default_system_prompt() -> String { DEFAULT_SYSTEM_PROMPT.to_string() }
fn default_verifier() -> VerifierKind { VerifierKind::Firebase }
fn default_jwks_cache() -> u64 { 3600 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "lingochat".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

/// Read an environment variable, trimming whitespace and treating blank as unset
fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let port = env_trimmed("PORT").and_then(|p| p.parse::<i64>().ok());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081, APP__AUTH__ADMIN_EMAILS=a@x.io,b@x.io
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_emails")
                    .try_parsing(true),
            )
            // Legacy deployment variables
            .set_override_option("completion.api_key", env_trimmed("GEMINI_API_KEY"))?
            .set_override_option("completion.model", env_trimmed("GEMINI_MODEL"))?
            .set_override_option(
                "auth.credentials_file",
                env_trimmed("GOOGLE_APPLICATION_CREDENTIALS"),
            )?
            .set_override_option("server.port", port)?
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.finalize()
    }

    /// Normalize derived values and validate the result
    fn finalize(mut self) -> Result<Self> {
        self.completion.api_key = self
            .completion
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        if self.auth.project_id.is_none() {
            if let Some(path) = self.auth.credentials_file.clone() {
                self.auth.project_id = Some(project_id_from_credentials(&path)?);
            }
        }

        self.validate()?;
        Ok(self)
    }

    /// Check that every selected backend has what it needs
    pub fn validate(&self) -> Result<()> {
        if self.completion.provider == ProviderKind::Gemini && self.completion.api_key.is_none() {
            return Err(AppError::Configuration {
                message: "completion.api_key (or GEMINI_API_KEY) is required for the gemini provider"
                    .to_string(),
            });
        }

        match self.auth.verifier {
            VerifierKind::Firebase if self.auth.project_id.is_none() => {
                return Err(AppError::Configuration {
                    message: "auth.project_id or GOOGLE_APPLICATION_CREDENTIALS is required for the firebase verifier"
                        .to_string(),
                });
            }
            VerifierKind::SharedSecret if self.auth.shared_secret.is_none() => {
                return Err(AppError::Configuration {
                    message: "auth.shared_secret is required for the shared_secret verifier"
                        .to_string(),
                });
            }
            _ => {}
        }

        if self.session.idle_timeout_secs == 0 {
            return Err(AppError::Configuration {
                message: "session.idle_timeout_secs must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the session idle timeout as a chrono Duration
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session.idle_timeout_secs as i64)
    }
}

impl AuthConfig {
    /// Whether the given e-mail is on the admin allow-list
    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.trim();
        !email.is_empty()
            && self
                .admin_emails
                .iter()
                .any(|admin| admin.trim().eq_ignore_ascii_case(email))
    }
}

/// Extract `project_id` from a Google service account JSON file
fn project_id_from_credentials(path: &str) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
        message: format!("Failed to read credentials file {}: {}", path, e),
    })?;
    let json: serde_json::Value = serde_json::from_str(&raw)?;

    let project_id = json
        .get("project_id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| AppError::Configuration {
            message: format!("Credentials file {} has no project_id", path),
        })?;

    tracing::info!(project_id = %project_id, "Loaded project id from credentials file");
    Ok(project_id)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            cookie_name: default_cookie_name(),
            cookie_secure: false,
            backend: default_session_backend(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            ttl_slack_secs: default_ttl_slack(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_db_idle_timeout(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_completion_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            verifier: default_verifier(),
            project_id: None,
            credentials_file: None,
            shared_secret: None,
            admin_emails: Vec::new(),
            jwks_cache_secs: default_jwks_cache(),
            web_api_key: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.idle_timeout_secs, 300);
        assert_eq!(config.completion.model, "gemini-2.5-flash");
        assert_eq!(config.idle_timeout(), chrono::Duration::seconds(300));
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let mut config = AppConfig::default();
        config.auth.verifier = VerifierKind::SharedSecret;
        config.auth.shared_secret = Some("secret".into());

        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));

        config.completion.api_key = Some("key".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_firebase_requires_project_id() {
        let mut config = AppConfig::default();
        config.completion.provider = ProviderKind::Mock;

        assert!(config.validate().is_err());

        config.auth.project_id = Some("demo-project".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_key_is_trimmed() {
        let mut config = AppConfig::default();
        config.completion.api_key = Some("  abc123 \n".into());
        config.auth.project_id = Some("demo-project".into());

        let config = config.finalize().unwrap();
        assert_eq!(config.completion.api_key.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_admin_allow_list_ignores_case() {
        let auth = AuthConfig {
            admin_emails: vec!["Admin@Example.com".into()],
            ..AuthConfig::default()
        };
        assert!(auth.is_admin("admin@example.com"));
        assert!(!auth.is_admin("someone@example.com"));
        assert!(!auth.is_admin(""));
    }

    #[test]
    fn test_project_id_from_credentials_file() {
        let path = std::env::temp_dir()
            .join(format!("lingochat-creds-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"type":"service_account","project_id":"chat-prod"}"#).unwrap();

        let project_id = project_id_from_credentials(path.to_str().unwrap()).unwrap();
        assert_eq!(project_id, "chat-prod");

        std::fs::remove_file(path).ok();
    }
}
