//! Per-browser conversation state
//!
//! A [`Session`] holds the ordered turns of one conversation plus the timing
//! and counters the usage aggregator needs. Sessions live in a
//! [`SessionStore`] keyed by an opaque id carried in a cookie.

pub mod lifecycle;
pub mod locks;
pub mod redis_store;

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub use lifecycle::{Activation, TimeoutCheck};
pub use locks::{SessionLease, SessionLocks};
pub use redis_store::RedisSessionStore;

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub lang: String,
}

impl Turn {
    pub fn user(content: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            lang: lang.into(),
        }
    }

    pub fn assistant(content: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            lang: lang.into(),
        }
    }
}

/// How much of this session has already been credited to the usage record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushCursor {
    pub seconds: u64,
    pub messages: u64,
    /// Messages counted before a conversation clear but not yet credited
    #[serde(default)]
    pub carried_messages: u64,
}

/// Active conversation state for one authenticated browser session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    uid: String,
    start_ts: DateTime<Utc>,
    last_activity_ts: DateTime<Utc>,
    messages: Vec<Turn>,
    total_user_messages: u64,
    #[serde(default)]
    flushed: FlushCursor,
}

impl Session {
    /// Start a fresh session for `uid` at `now`
    pub fn start(uid: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uid: uid.into(),
            start_ts: now,
            last_activity_ts: now,
            messages: Vec::new(),
            total_user_messages: 0,
            flushed: FlushCursor::default(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn start_ts(&self) -> DateTime<Utc> {
        self.start_ts
    }

    pub fn last_activity_ts(&self) -> DateTime<Utc> {
        self.last_activity_ts
    }

    /// Turns in conversation order
    pub fn messages(&self) -> &[Turn] {
        &self.messages
    }

    /// User-authored turns in this session
    pub fn total_user_messages(&self) -> u64 {
        self.total_user_messages
    }

    pub fn flushed(&self) -> FlushCursor {
        self.flushed
    }

    /// Record activity at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_ts = now;
    }

    /// Commit one completed exchange: the user turn followed by the reply.
    /// The counter moves together with the user turn.
    pub fn record_exchange(&mut self, user: Turn, assistant: Turn) {
        debug_assert_eq!(user.role, Role::User);
        debug_assert_eq!(assistant.role, Role::Assistant);
        self.messages.push(user);
        self.messages.push(assistant);
        self.total_user_messages += 1;
    }

    /// History that would be sent with a pending user turn appended
    pub fn history_with(&self, pending: &Turn) -> Vec<Turn> {
        let mut history = Vec::with_capacity(self.messages.len() + 1);
        history.extend(self.messages.iter().cloned());
        history.push(pending.clone());
        history
    }

    /// Mid-session reset: drop turns and the message counter, keep `start_ts`.
    /// The message part of the flush cursor restarts with the counter; any
    /// messages not yet credited are carried into the next flush.
    pub fn clear_conversation(&mut self) {
        let outstanding = self.total_user_messages.saturating_sub(self.flushed.messages);
        self.messages.clear();
        self.total_user_messages = 0;
        self.flushed.messages = 0;
        self.flushed.carried_messages += outstanding;
    }

    /// Whole seconds elapsed since the session began, clamped at zero
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_ts).num_seconds().max(0) as u64
    }

    /// Advance the flush cursor after a successful usage write
    pub fn mark_flushed(&mut self, cursor: FlushCursor) {
        self.flushed = cursor;
    }
}

/// Fresh opaque session id for the session cookie
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Storage for session state keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by id
    async fn load(&self, id: &str) -> Result<Option<Session>>;

    /// Create or replace a session
    async fn save(&self, id: &str, session: &Session) -> Result<()>;

    /// Remove a session; removing an unknown id is not an error
    async fn remove(&self, id: &str) -> Result<()>;
}

/// Process-local session store
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, id: &str, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(id.to_string(), session.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = new_session_id();
        assert_eq!(a.len(), 36);
        assert_ne!(a, new_session_id());
    }

    fn user_turn_count(session: &Session) -> u64 {
        session
            .messages()
            .iter()
            .filter(|t| t.role == Role::User)
            .count() as u64
    }

    #[test]
    fn test_counter_tracks_user_turns() {
        let mut session = Session::start("u1", t0());
        for i in 0..3 {
            session.record_exchange(
                Turn::user(format!("question {}", i), "en"),
                Turn::assistant(format!("answer {}", i), "en"),
            );
            assert_eq!(session.total_user_messages(), user_turn_count(&session));
        }
        assert_eq!(session.messages().len(), 6);
        assert_eq!(session.messages()[0].role, Role::User);
        assert_eq!(session.messages()[1].role, Role::Assistant);
    }

    #[test]
    fn test_clear_conversation_keeps_start() {
        let mut session = Session::start("u1", t0());
        session.record_exchange(Turn::user("hi", "en"), Turn::assistant("hello", "en"));
        session.mark_flushed(FlushCursor {
            seconds: 10,
            messages: 1,
            carried_messages: 0,
        });
        session.touch(t0() + Duration::seconds(30));

        session.clear_conversation();

        assert_eq!(session.start_ts(), t0());
        assert!(session.messages().is_empty());
        assert_eq!(session.total_user_messages(), 0);
        assert_eq!(
            session.flushed(),
            FlushCursor {
                seconds: 10,
                messages: 0,
                carried_messages: 0,
            }
        );
        assert_eq!(session.total_user_messages(), user_turn_count(&session));
    }

    #[test]
    fn test_clear_carries_uncredited_messages() {
        let mut session = Session::start("u1", t0());
        for _ in 0..3 {
            session.record_exchange(Turn::user("hi", "en"), Turn::assistant("hello", "en"));
        }
        session.mark_flushed(FlushCursor {
            seconds: 10,
            messages: 1,
            carried_messages: 0,
        });

        session.clear_conversation();
        assert_eq!(session.flushed().carried_messages, 2);

        session.record_exchange(Turn::user("again", "en"), Turn::assistant("hi", "en"));
        session.clear_conversation();
        assert_eq!(session.flushed().carried_messages, 3);
    }

    #[test]
    fn test_history_with_pending_turn() {
        let mut session = Session::start("u1", t0());
        session.record_exchange(Turn::user("hi", "en"), Turn::assistant("hello", "en"));

        let pending = Turn::user("how are you?", "en");
        let history = session.history_with(&pending);

        assert_eq!(history.len(), 3);
        assert_eq!(history.last(), Some(&pending));
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn test_elapsed_seconds_clamps_skew() {
        let session = Session::start("u1", t0());
        assert_eq!(session.elapsed_seconds(t0() + Duration::milliseconds(125_900)), 125);
        assert_eq!(session.elapsed_seconds(t0() - Duration::seconds(5)), 0);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemorySessionStore::new();
        let session = Session::start("u1", t0());

        store.save("sid-1", &session).await.unwrap();
        assert_eq!(store.load("sid-1").await.unwrap(), Some(session));
        assert_eq!(store.len().await, 1);

        store.remove("sid-1").await.unwrap();
        assert!(store.load("sid-1").await.unwrap().is_none());
        store.remove("sid-1").await.unwrap();
    }
}
