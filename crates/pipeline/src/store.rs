//! Shared key-value store abstraction.
//!
//! The per-device pending batches and the per-patient escalation
//! counters are the only mutable shared state in the system. They live
//! behind [`SharedStore`], a small set of atomic list and counter
//! operations, so that the pipeline never holds process-local mutable
//! maps: any backend offering atomic read-and-clear and
//! increment-with-expiry (a Redis-class store) can implement the trait
//! for multi-instance deployments.
//!
//! [`MemoryStore`] is the bundled implementation used by single-node
//! deployments and by tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Errors surfaced by a [`SharedStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("Shared store unavailable: {0}")]
    Unavailable(String),

    /// The key exists but holds a different value kind.
    #[error("Wrong value kind for key '{0}'")]
    WrongKind(String),
}

/// Atomic operations over shared lists and expiring counters.
///
/// All operations are atomic with respect to each other for the same
/// key; callers never need an external lock.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Append one value to the tail of the list at `key`.
    async fn push_back(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Prepend `values` (in order) to the head of the list at `key`.
    ///
    /// Used to merge a failed working copy back ahead of readings that
    /// arrived mid-drain.
    async fn push_front(&self, key: &str, values: Vec<String>) -> Result<(), StoreError>;

    /// Atomically read and clear the list at `key`.
    ///
    /// Returns the drained values in append order; an absent key yields
    /// an empty vector.
    async fn take_all(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// All keys starting with `prefix` that currently hold a non-empty list.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically increment the counter at `key` and return the new value.
    ///
    /// A counter that does not exist (or whose expiry has elapsed)
    /// starts from zero and gets `ttl` as its expiry; the expiry is
    /// *not* refreshed on subsequent increments, so the counter always
    /// dies `ttl` after it left zero.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Remove `key` entirely. Unknown keys are a no-op.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

enum Entry {
    List(Vec<String>),
    Counter { value: i64, expires_at: Instant },
}

/// In-process [`SharedStore`] backed by a mutex-guarded map.
///
/// Suitable for single-instance deployments and tests; counter expiry
/// is evaluated lazily on access.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn push_back(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(Vec::new()))
        {
            Entry::List(list) => {
                list.push(value);
                Ok(())
            }
            Entry::Counter { .. } => Err(StoreError::WrongKind(key.to_string())),
        }
    }

    async fn push_front(&self, key: &str, values: Vec<String>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(Vec::new()))
        {
            Entry::List(list) => {
                list.splice(0..0, values);
                Ok(())
            }
            Entry::Counter { .. } => Err(StoreError::WrongKind(key.to_string())),
        }
    }

    async fn take_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.remove(key) {
            None => Ok(Vec::new()),
            Some(Entry::List(list)) => Ok(list),
            Some(entry @ Entry::Counter { .. }) => {
                entries.insert(key.to_string(), entry);
                Err(StoreError::WrongKind(key.to_string()))
            }
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter_map(|(key, entry)| match entry {
                Entry::List(list) if !list.is_empty() && key.starts_with(prefix) => {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get_mut(key) {
            Some(Entry::Counter { value, expires_at }) if *expires_at > now => {
                *value += 1;
                Ok(*value)
            }
            Some(Entry::List(_)) => Err(StoreError::WrongKind(key.to_string())),
            // Absent or expired: restart from zero with a fresh window.
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry::Counter {
                        value: 1,
                        expires_at: now + ttl,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
