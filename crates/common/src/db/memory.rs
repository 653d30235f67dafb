//! In-memory document store for development and tests

use super::DocumentStore;
use crate::errors::Result;
use crate::profile::UserProfile;
use crate::usage::{UsageDelta, UsageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local document store; contents are lost on restart
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserProfile>>,
    usage: RwLock<HashMap<String, UsageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.read().await.get(uid).cloned())
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile> {
        let mut users = self.users.write().await;
        let stored = users
            .entry(profile.uid.clone())
            .and_modify(|existing| existing.merge_contact(profile))
            .or_insert_with(|| profile.clone());
        Ok(stored.clone())
    }

    async fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        let mut profiles: Vec<UserProfile> = self.users.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(profiles)
    }

    async fn get_usage(&self, uid: &str) -> Result<Option<UsageRecord>> {
        Ok(self.usage.read().await.get(uid).cloned())
    }

    async fn merge_usage(
        &self,
        uid: &str,
        delta: &UsageDelta,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord> {
        let mut usage = self.usage.write().await;
        let record = usage
            .entry(uid.to_string())
            .or_insert_with(|| UsageRecord::empty(uid));
        record.apply(delta, now);
        Ok(record.clone())
    }

    async fn list_usage(&self) -> Result<Vec<UsageRecord>> {
        let mut records: Vec<UsageRecord> = self.usage.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_merge_usage_creates_then_adds() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let delta = UsageDelta {
            session_seconds: 10,
            session_messages: 2,
            added_seconds: 10,
            added_messages: 2,
        };

        let first = store.merge_usage("u1", &delta, now).await.unwrap();
        assert_eq!(first.total_messages, 2);

        let second = store.merge_usage("u1", &delta, now).await.unwrap();
        assert_eq!(second.total_messages, 4);
        assert_eq!(second.total_session_seconds, 20);
        assert_eq!(second.last_session_messages, 2);
    }

    #[tokio::test]
    async fn test_unknown_documents_are_absent() {
        let store = MemoryStore::new();
        assert!(store.get_profile("nobody").await.unwrap().is_none());
        assert!(store.get_usage("nobody").await.unwrap().is_none());
        assert_ok!(store.ping().await);
    }
}
