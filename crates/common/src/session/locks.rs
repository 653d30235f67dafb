//! Per-session request serialization
//!
//! Two requests carrying the same session id would otherwise interleave
//! their read-modify-write of the session state. Each request holds a
//! [`SessionLease`] for its whole duration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-session async locks
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until no other request holds `id`, then hold it
    pub async fn acquire(self: &Arc<Self>, id: &str) -> SessionLease {
        let lock = self
            .map()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();

        let guard = lock.lock_owned().await;

        SessionLease {
            id: id.to_string(),
            guard: Some(guard),
            locks: Arc::clone(self),
        }
    }

    /// Number of ids currently tracked
    pub fn tracked(&self) -> usize {
        self.map().len()
    }
}

/// Exclusive hold on one session id; released on drop
pub struct SessionLease {
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<SessionLocks>,
}

impl SessionLease {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Forget the lock once nobody else is holding or waiting on it
        let mut map = self.locks.map();
        if let Some(lock) = map.get(&self.id) {
            if Arc::strong_count(lock) == 1 {
                map.remove(&self.id);
            }
        }
    }
}
