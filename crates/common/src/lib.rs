//! LingoChat Common Library
//!
//! Shared code for the LingoChat gateway including:
//! - Session state, lifecycle and per-session locking
//! - Usage accounting and the admin report
//! - Chat turn handling, language detection and completion providers
//! - Identity verification
//! - Durable storage (in-memory and Postgres)
//! - Error types, configuration and metrics

pub mod auth;
pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod errors;
pub mod language;
pub mod metrics;
pub mod profile;
pub mod session;
pub mod usage;

// Re-export commonly used types
pub use auth::{Identity, IdentityVerifier};
pub use chat::{ChatReply, ChatService};
pub use completion::CompletionProvider;
pub use config::AppConfig;
pub use db::{DocumentStore, MemoryStore, Repository};
pub use errors::{AppError, Result};
pub use session::{Session, SessionStore};
pub use usage::UsageAggregator;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
