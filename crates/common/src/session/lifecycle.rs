//! Session state machine
//!
//! `ABSENT -> ACTIVE -> (EXPIRED | CLOSED)`. The timeout check runs before
//! any identity is attached to a request, so an expired session can never
//! authorize the request that discovered the expiry.

use super::Session;
use chrono::{DateTime, Duration, Utc};

/// Outcome of evaluating the inactivity timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutCheck {
    /// No prior state
    Absent,
    /// Still within the idle window
    Live(Session),
    /// Idle for longer than the window; the state must be discarded
    Expired { idle_secs: i64 },
}

/// Evaluate the idle timeout for prior session state.
/// Expiry requires strictly more than `timeout` of inactivity.
pub fn check_timeout(
    session: Option<Session>,
    now: DateTime<Utc>,
    timeout: Duration,
) -> TimeoutCheck {
    match session {
        None => TimeoutCheck::Absent,
        Some(session) => {
            let idle = now - session.last_activity_ts();
            if idle > timeout {
                TimeoutCheck::Expired {
                    idle_secs: idle.num_seconds(),
                }
            } else {
                TimeoutCheck::Live(session)
            }
        }
    }
}

/// Result of attaching an authenticated identity to session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// The active session, touched at `now`
    pub session: Session,
    /// True when the session was created by this request
    pub created: bool,
    /// A session that belonged to a different identity and was closed
    pub displaced: Option<Session>,
}

/// Move to `ACTIVE` for `uid`: create when absent, otherwise touch.
/// Prior state owned by another identity is closed and returned as displaced.
pub fn activate(prior: Option<Session>, uid: &str, now: DateTime<Utc>) -> Activation {
    match prior {
        Some(mut session) if session.uid() == uid => {
            session.touch(now);
            Activation {
                session,
                created: false,
                displaced: None,
            }
        }
        other => Activation {
            session: Session::start(uid, now),
            created: true,
            displaced: other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Turn;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()
    }

    fn timeout() -> Duration {
        Duration::seconds(300)
    }

    #[test]
    fn test_absent_stays_absent() {
        assert_eq!(check_timeout(None, t0(), timeout()), TimeoutCheck::Absent);
    }

    #[test]
    fn test_boundary_is_still_live() {
        let session = Session::start("u1", t0());
        let check = check_timeout(Some(session), t0() + Duration::seconds(300), timeout());
        assert!(matches!(check, TimeoutCheck::Live(_)));
    }

    #[test]
    fn test_idle_past_window_expires() {
        let session = Session::start("u1", t0());
        let check = check_timeout(Some(session), t0() + Duration::seconds(301), timeout());
        assert_eq!(check, TimeoutCheck::Expired { idle_secs: 301 });
    }

    #[test]
    fn test_activity_extends_window() {
        let mut session = Session::start("u1", t0());
        session.touch(t0() + Duration::seconds(250));
        let check = check_timeout(Some(session), t0() + Duration::seconds(500), timeout());
        assert!(matches!(check, TimeoutCheck::Live(_)));
    }

    #[test]
    fn test_activate_creates_fresh_session() {
        let activation = activate(None, "u1", t0());
        assert!(activation.created);
        assert!(activation.displaced.is_none());
        assert_eq!(activation.session.start_ts(), t0());
        assert_eq!(activation.session.total_user_messages(), 0);
        assert!(activation.session.messages().is_empty());
    }

    #[test]
    fn test_activate_touches_existing_session() {
        let mut session = Session::start("u1", t0());
        session.record_exchange(Turn::user("hi", "en"), Turn::assistant("hello", "en"));

        let later = t0() + Duration::seconds(42);
        let activation = activate(Some(session), "u1", later);

        assert!(!activation.created);
        assert_eq!(activation.session.start_ts(), t0());
        assert_eq!(activation.session.last_activity_ts(), later);
        assert_eq!(activation.session.total_user_messages(), 1);
    }

    #[test]
    fn test_activate_displaces_other_identity() {
        let session = Session::start("u1", t0());
        let activation = activate(Some(session), "u2", t0() + Duration::seconds(5));

        assert!(activation.created);
        assert_eq!(activation.session.uid(), "u2");
        assert_eq!(activation.displaced.map(|s| s.uid().to_string()), Some("u1".to_string()));
    }

    #[test]
    fn test_expired_then_reauthenticated_starts_over() {
        let mut session = Session::start("u1", t0());
        session.record_exchange(Turn::user("hi", "en"), Turn::assistant("hello", "en"));

        let now = t0() + Duration::seconds(900);
        let prior = match check_timeout(Some(session), now, timeout()) {
            TimeoutCheck::Live(s) => Some(s),
            TimeoutCheck::Expired { .. } | TimeoutCheck::Absent => None,
        };
        let activation = activate(prior, "u1", now);

        assert!(activation.created);
        assert_eq!(activation.session.start_ts(), now);
        assert_eq!(activation.session.total_user_messages(), 0);
    }
}
