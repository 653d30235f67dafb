//! Redis-backed session storage
//!
//! Sessions are stored as JSON under `{prefix}:session:{id}` with a TTL a
//! little longer than the idle timeout, so abandoned sessions disappear on
//! their own. The idle check itself is still done by the lifecycle code.

use super::{Session, SessionStore};
use crate::config::RedisConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::debug;

/// Redis session store
pub struct RedisSessionStore {
    connection: MultiplexedConnection,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisSessionStore {
    /// Connect to Redis; `idle_timeout_secs` sizes the key TTL
    pub async fn connect(config: &RedisConfig, idle_timeout_secs: u64) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| AppError::SessionStore {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::SessionStore {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            ttl_secs: idle_timeout_secs + config.ttl_slack_secs,
        })
    }

    fn key(&self, id: &str) -> String {
        session_key(&self.key_prefix, id)
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| AppError::SessionStore {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

fn session_key(prefix: &str, id: &str) -> String {
    format!("{}:session:{}", prefix, id)
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, id: &str) -> Result<Option<Session>> {
        let key = self.key(id);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn.get(&key).await.map_err(|e| AppError::SessionStore {
            message: format!("Failed to get key '{}': {}", key, e),
        })?;

        match value {
            Some(json) => {
                let session = serde_json::from_str(&json).map_err(|e| AppError::SessionStore {
                    message: format!("Failed to parse stored session: {}", e),
                })?;
                debug!(key = %key, "Session loaded");
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, id: &str, session: &Session) -> Result<()> {
        let key = self.key(id);
        let json = serde_json::to_string(session)?;
        let mut conn = self.connection.clone();

        conn.set_ex::<_, _, ()>(&key, json, self.ttl_secs)
            .await
            .map_err(|e| AppError::SessionStore {
                message: format!("Failed to set key '{}': {}", key, e),
            })?;

        debug!(key = %key, ttl_secs = self.ttl_secs, "Session saved");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let key = self.key(id);
        let mut conn = self.connection.clone();

        let deleted: i32 = conn.del(&key).await.map_err(|e| AppError::SessionStore {
            message: format!("Failed to delete key '{}': {}", key, e),
        })?;

        debug!(key = %key, deleted = deleted > 0, "Session removed");
        Ok(())
    }
}
