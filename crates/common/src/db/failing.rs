//! Document store whose writes can be switched off, for exercising
//! the log-and-continue paths

use super::{DocumentStore, MemoryStore};
use crate::errors::{AppError, Result};
use crate::profile::UserProfile;
use crate::usage::{UsageDelta, UsageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

/// Wraps a [`MemoryStore`]; while failing, profile and usage writes error
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FailingStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseConnection {
                message: "store unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.inner.get_profile(uid).await
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile> {
        self.check()?;
        self.inner.upsert_profile(profile).await
    }

    async fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        self.inner.list_profiles().await
    }

    async fn get_usage(&self, uid: &str) -> Result<Option<UsageRecord>> {
        self.inner.get_usage(uid).await
    }

    async fn merge_usage(
        &self,
        uid: &str,
        delta: &UsageDelta,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord> {
        self.check()?;
        self.inner.merge_usage(uid, delta, now).await
    }

    async fn list_usage(&self) -> Result<Vec<UsageRecord>> {
        self.inner.list_usage().await
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}
