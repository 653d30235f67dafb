//! Admin usage table: profiles joined with usage records

use super::UsageRecord;
use crate::db::DocumentStore;
use crate::errors::Result;
use crate::profile::UserProfile;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// One row of the admin table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminUserRow {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
    pub last_session_seconds: u64,
    pub last_session_messages: u64,
    pub total_messages: u64,
    pub total_session_seconds: u64,
    pub usage_last_updated: Option<DateTime<Utc>>,
}

/// Aggregated usage across all users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminReport {
    pub users: Vec<AdminUserRow>,
    pub total_users: usize,
    pub total_messages: u64,
    pub total_time_min: u64,
}

impl AdminReport {
    /// Join profiles with usage; users without usage get zeros
    pub fn build(profiles: Vec<UserProfile>, usage: Vec<UsageRecord>) -> Self {
        let mut usage_by_uid: HashMap<String, UsageRecord> =
            usage.into_iter().map(|u| (u.uid.clone(), u)).collect();

        let mut users: Vec<AdminUserRow> = profiles
            .into_iter()
            .map(|profile| {
                let usage = usage_by_uid
                    .remove(&profile.uid)
                    .unwrap_or_else(|| UsageRecord::empty(profile.uid.clone()));

                AdminUserRow {
                    uid: profile.uid,
                    name: profile.name,
                    email: profile.email,
                    created_at: profile.created_at,
                    last_login_at: profile.last_login_at,
                    last_session_seconds: usage.last_session_seconds,
                    last_session_messages: usage.last_session_messages,
                    total_messages: usage.total_messages,
                    total_session_seconds: usage.total_session_seconds,
                    usage_last_updated: usage.last_updated,
                }
            })
            .collect();

        users.sort_by(|a, b| a.uid.cmp(&b.uid));

        let total_messages = users.iter().map(|u| u.total_messages).sum();
        let total_seconds: u64 = users.iter().map(|u| u.total_session_seconds).sum();

        Self {
            total_users: users.len(),
            total_messages,
            total_time_min: total_seconds / 60,
            users,
        }
    }

    /// Read both collections and build the report
    pub async fn load(store: &dyn DocumentStore) -> Result<Self> {
        let (profiles, usage) = futures::try_join!(store.list_profiles(), store.list_usage())?;
        Ok(Self::build(profiles, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn profile(uid: &str) -> UserProfile {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        UserProfile {
            uid: uid.into(),
            name: format!("User {}", uid),
            email: format!("{}@example.com", uid),
            picture: String::new(),
            created_at: at,
            last_login_at: at,
        }
    }

    fn usage(uid: &str, messages: u64, seconds: u64) -> UsageRecord {
        UsageRecord {
            uid: uid.into(),
            last_session_seconds: seconds,
            last_session_messages: messages,
            total_session_seconds: seconds,
            total_messages: messages,
            last_updated: None,
        }
    }

    #[test]
    fn test_report_totals() {
        let report = AdminReport::build(
            vec![profile("b"), profile("a"), profile("c")],
            vec![usage("a", 4, 125), usage("b", 6, 100)],
        );

        assert_eq!(report.total_users, 3);
        assert_eq!(report.total_messages, 10);
        assert_eq!(report.total_time_min, 3);
        assert_eq!(
            report.users.iter().map(|u| u.uid.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_user_without_usage_gets_zeros() {
        let report = AdminReport::build(vec![profile("a")], Vec::new());

        let row = &report.users[0];
        assert_eq!(row.total_messages, 0);
        assert_eq!(row.total_session_seconds, 0);
        assert!(row.usage_last_updated.is_none());
    }

    #[test]
    fn test_usage_without_profile_is_ignored() {
        let report = AdminReport::build(vec![profile("a")], vec![usage("ghost", 9, 600)]);
        assert_eq!(report.total_users, 1);
        assert_eq!(report.total_messages, 0);
    }
}
