//! User profiles
//!
//! One profile per identity, created on first authenticated contact and
//! refreshed on every contact after that.

use crate::auth::Identity;
use crate::db::DocumentStore;
use crate::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable profile document (`users` collection)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub picture: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

impl UserProfile {
    /// Profile for an identity seen for the first time at `now`
    pub fn first_contact(identity: &Identity, now: DateTime<Utc>) -> Self {
        Self {
            uid: identity.uid.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            picture: identity.picture.clone(),
            created_at: now,
            last_login_at: now,
        }
    }

    /// Merge a later contact into an existing profile; `created_at` is kept
    pub fn merge_contact(&mut self, newer: &UserProfile) {
        self.name = newer.name.clone();
        self.email = newer.email.clone();
        self.picture = newer.picture.clone();
        self.last_login_at = newer.last_login_at;
    }
}

/// Create or refresh the profile for `identity`
pub async fn touch_profile(
    store: &dyn DocumentStore,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<UserProfile> {
    let profile = store
        .upsert_profile(&UserProfile::first_contact(identity, now))
        .await?;

    tracing::debug!(uid = %profile.uid, "Profile touched");
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn identity(name: &str) -> Identity {
        Identity {
            uid: "uid-7".into(),
            email: "ravi@example.com".into(),
            name: name.into(),
            picture: String::new(),
        }
    }

    #[tokio::test]
    async fn test_first_contact_creates_profile() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap();

        let profile = touch_profile(&store, &identity("Ravi"), now).await.unwrap();

        assert_eq!(profile.created_at, now);
        assert_eq!(profile.last_login_at, now);
        assert_eq!(store.list_profiles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_later_contact_preserves_created_at() {
        let store = MemoryStore::new();
        let first = Utc.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap();
        let later = first + Duration::days(3);

        touch_profile(&store, &identity("Ravi"), first).await.unwrap();
        let profile = touch_profile(&store, &identity("Ravi Kumar"), later).await.unwrap();

        assert_eq!(profile.created_at, first);
        assert_eq!(profile.last_login_at, later);
        assert_eq!(profile.name, "Ravi Kumar");
        assert_eq!(store.list_profiles().await.unwrap().len(), 1);
    }
}
