//! Durable document storage for LingoChat
//!
//! Two collections keyed by user id:
//! - `users`: profile documents
//! - `usage`: cumulative usage counters
//!
//! Backed either by Postgres through SeaORM ([`Repository`]) or by a
//! process-local map ([`MemoryStore`]).

#[cfg(test)]
pub(crate) mod failing;
mod memory;
pub mod models;
mod repository;

pub use memory::MemoryStore;
pub use repository::Repository;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::profile::UserProfile;
use crate::usage::{UsageDelta, UsageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Key-value document store with merge semantics
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a profile by user id
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// Insert a profile, or merge it into the existing one keeping `created_at`
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile>;

    /// All profiles
    async fn list_profiles(&self) -> Result<Vec<UserProfile>>;

    /// Fetch a usage record by user id
    async fn get_usage(&self, uid: &str) -> Result<Option<UsageRecord>>;

    /// Atomically merge a delta into the user's usage record.
    /// An absent record is treated as all zeros.
    async fn merge_usage(
        &self,
        uid: &str,
        delta: &UsageDelta,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord>;

    /// All usage records
    async fn list_usage(&self) -> Result<Vec<UsageRecord>>;

    /// Check connectivity
    async fn ping(&self) -> Result<()>;
}

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    connection: DatabaseConnection,
}

impl DbPool {
    /// Connect using the configured URL and pool sizing
    pub async fn new(url: &str, config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let connection = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");
        Ok(Self { connection })
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        self.connection
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}
