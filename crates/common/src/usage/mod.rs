//! Usage accounting
//!
//! Rolls session time and message counts into per-user cumulative
//! counters. Each flush credits only what the session has not credited
//! yet, so flushing after every turn keeps totals current without
//! counting the same seconds or messages twice.

pub mod report;

use crate::db::DocumentStore;
use crate::errors::Result;
use crate::metrics;
use crate::session::{FlushCursor, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use report::{AdminReport, AdminUserRow};

/// Durable usage document (`usage` collection)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub uid: String,
    /// Session-to-date seconds of the most recently flushed session
    pub last_session_seconds: u64,
    /// Session-to-date user messages of the most recently flushed session
    pub last_session_messages: u64,
    pub total_session_seconds: u64,
    pub total_messages: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Metrics to merge into a usage record for one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDelta {
    pub session_seconds: u64,
    pub session_messages: u64,
    pub added_seconds: u64,
    pub added_messages: u64,
}

impl UsageDelta {
    /// Compute what `session` has not yet credited, as of `now`.
    /// Returns the delta and the cursor to store once it is written.
    pub fn for_session(session: &Session, now: DateTime<Utc>) -> (Self, FlushCursor) {
        let session_seconds = session.elapsed_seconds(now);
        let session_messages = session.total_user_messages();
        let flushed = session.flushed();

        let delta = Self {
            session_seconds,
            session_messages,
            added_seconds: session_seconds.saturating_sub(flushed.seconds),
            added_messages: session_messages.saturating_sub(flushed.messages)
                + flushed.carried_messages,
        };
        let cursor = FlushCursor {
            seconds: session_seconds.max(flushed.seconds),
            messages: session_messages.max(flushed.messages),
            carried_messages: 0,
        };

        (delta, cursor)
    }
}

impl UsageRecord {
    /// All-zero record for a user with no history
    pub fn empty(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Self::default()
        }
    }

    /// Merge-add a delta: `last_*` are replaced, totals only grow
    pub fn apply(&mut self, delta: &UsageDelta, now: DateTime<Utc>) {
        self.last_session_seconds = delta.session_seconds;
        self.last_session_messages = delta.session_messages;
        self.total_session_seconds += delta.added_seconds;
        self.total_messages += delta.added_messages;
        self.last_updated = Some(now);
    }
}

/// Writes session metrics into durable cumulative counters
#[derive(Clone)]
pub struct UsageAggregator {
    store: Arc<dyn DocumentStore>,
}

impl UsageAggregator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Flush the uncredited part of `session` for its owner.
    /// The session's cursor only advances when the write succeeds.
    pub async fn flush(&self, session: &mut Session, now: DateTime<Utc>) -> Result<UsageRecord> {
        let (delta, cursor) = UsageDelta::for_session(session, now);

        let record = self.store.merge_usage(session.uid(), &delta, now).await?;
        session.mark_flushed(cursor);

        tracing::debug!(
            uid = %record.uid,
            added_seconds = delta.added_seconds,
            added_messages = delta.added_messages,
            total_messages = record.total_messages,
            "Usage flushed"
        );
        Ok(record)
    }

    /// Flush, logging and swallowing any failure
    pub async fn flush_best_effort(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Option<UsageRecord> {
        match self.flush(session, now).await {
            Ok(record) => {
                metrics::record_usage_flush(true);
                Some(record)
            }
            Err(e) => {
                metrics::record_usage_flush(false);
                tracing::warn!(uid = %session.uid(), error = %e, "Usage flush failed");
                None
            }
        }
    }
}
