//! Per-key exclusive locking with a bounded wait.
//!
//! Serialization granularity is per key: ledger operations serialize per
//! user, seat holds per seat, and the background sweep on a single sweeper
//! key. Any backend guaranteeing serialized read-modify-write per key would
//! satisfy the same contract; this one keeps a map of async mutexes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::LockConfig;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    User(Uuid),
    Seat(Uuid),
    Sweep,
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::User(id) => write!(f, "user:{id}"),
            LockKey::Seat(id) => write!(f, "seat:{id}"),
            LockKey::Sweep => write!(f, "sweep"),
        }
    }
}

/// Held for the span of one read-validate-write-append critical section and
/// released on drop. Never hold one across a network call or user-visible
/// wait.
pub type KeyGuard = OwnedMutexGuard<()>;

pub struct KeyedLock {
    wait_timeout: Duration,
    locks: StdMutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl KeyedLock {
    pub fn new(config: &LockConfig) -> Self {
        Self {
            wait_timeout: config.wait_timeout,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn handle(&self, key: &LockKey) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the exclusive lock for `key`, waiting at most the configured
    /// timeout. A missed deadline is a transient error, safe to retry.
    pub async fn acquire(&self, key: LockKey) -> AppResult<KeyGuard> {
        let handle = self.handle(&key);
        timeout(self.wait_timeout, handle.lock_owned())
            .await
            .map_err(|_| AppError::LockTimeout {
                key: key.to_string(),
            })
    }

    /// Acquire several locks as one unit. Keys are sorted first so every
    /// caller takes them in the same order and no cycle can form; a timeout
    /// on any key releases everything already taken.
    pub async fn acquire_many(&self, mut keys: Vec<LockKey>) -> AppResult<Vec<KeyGuard>> {
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire(key).await?);
        }
        Ok(guards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_lock() -> KeyedLock {
        KeyedLock::new(&LockConfig {
            wait_timeout: Duration::from_millis(50),
        })
    }

    #[tokio::test]
    async fn contended_key_times_out_instead_of_deadlocking() {
        let lock = short_lock();
        let key = LockKey::User(Uuid::new_v4());

        let _held = lock.acquire(key.clone()).await.unwrap();
        let err = lock.acquire(key).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn released_guard_unblocks_the_next_caller() {
        let lock = short_lock();
        let key = LockKey::Seat(Uuid::new_v4());

        let guard = lock.acquire(key.clone()).await.unwrap();
        drop(guard);
        assert!(lock.acquire(key).await.is_ok());
    }

    #[tokio::test]
    async fn acquire_many_is_order_insensitive() {
        let lock = short_lock();
        let a = LockKey::Seat(Uuid::new_v4());
        let b = LockKey::Seat(Uuid::new_v4());

        let guards = lock.acquire_many(vec![a.clone(), b.clone()]).await.unwrap();
        assert_eq!(guards.len(), 2);
        drop(guards);

        // Reversed order takes the same two locks without deadlock.
        let guards = lock.acquire_many(vec![b, a]).await.unwrap();
        assert_eq!(guards.len(), 2);
    }
}
