//! Postgres-backed document store
//!
//! Profiles are upserted through SeaORM entities. Usage merges use a single
//! `INSERT .. ON CONFLICT .. RETURNING` so concurrent flushes for the same
//! user add up instead of overwriting each other.

use super::models::*;
use super::{DbPool, DocumentStore};
use crate::errors::{AppError, Result};
use crate::profile::UserProfile;
use crate::usage::{UsageDelta, UsageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryOrder, Statement};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    uid TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    picture TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL,
    last_login_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS usage (
    uid TEXT PRIMARY KEY,
    last_session_seconds BIGINT NOT NULL DEFAULT 0,
    last_session_messages BIGINT NOT NULL DEFAULT 0,
    total_session_seconds BIGINT NOT NULL DEFAULT 0,
    total_messages BIGINT NOT NULL DEFAULT 0,
    last_updated TIMESTAMPTZ
);
"#;

const MERGE_USAGE: &str = r#"
INSERT INTO usage (
    uid, last_session_seconds, last_session_messages,
    total_session_seconds, total_messages, last_updated
)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (uid) DO UPDATE SET
    last_session_seconds = EXCLUDED.last_session_seconds,
    last_session_messages = EXCLUDED.last_session_messages,
    total_session_seconds = usage.total_session_seconds + EXCLUDED.total_session_seconds,
    total_messages = usage.total_messages + EXCLUDED.total_messages,
    last_updated = EXCLUDED.last_updated
RETURNING uid, last_session_seconds, last_session_messages,
          total_session_seconds, total_messages, last_updated
"#;

/// Repository for the `users` and `usage` collections
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    /// Create tables if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        self.conn().execute_unprepared(SCHEMA).await?;
        tracing::info!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for Repository {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        Ok(UserEntity::find_by_id(uid.to_string())
            .one(self.conn())
            .await?
            .map(Into::into))
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile> {
        let model = UserEntity::insert(UserActiveModel::from(profile))
            .on_conflict(
                OnConflict::column(UserColumn::Uid)
                    .update_columns([
                        UserColumn::Name,
                        UserColumn::Email,
                        UserColumn::Picture,
                        UserColumn::LastLoginAt,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(self.conn())
            .await?;

        Ok(model.into())
    }

    async fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        let models = UserEntity::find()
            .order_by_asc(UserColumn::Uid)
            .all(self.conn())
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn get_usage(&self, uid: &str) -> Result<Option<UsageRecord>> {
        Ok(UsageEntity::find_by_id(uid.to_string())
            .one(self.conn())
            .await?
            .map(Into::into))
    }

    async fn merge_usage(
        &self,
        uid: &str,
        delta: &UsageDelta,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            MERGE_USAGE,
            vec![
                uid.into(),
                (delta.session_seconds as i64).into(),
                (delta.session_messages as i64).into(),
                (delta.added_seconds as i64).into(),
                (delta.added_messages as i64).into(),
                DateTimeWithTimeZone::from(now).into(),
            ],
        );

        let model: UsageModel = UsageEntity::find()
            .from_raw_sql(stmt)
            .one(self.conn())
            .await?
            .ok_or_else(|| AppError::Internal {
                message: format!("Usage merge for {} returned no row", uid),
            })?;

        Ok(model.into())
    }

    async fn list_usage(&self) -> Result<Vec<UsageRecord>> {
        let models = UsageEntity::find()
            .order_by_asc(UsageColumn::Uid)
            .all(self.conn())
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}
