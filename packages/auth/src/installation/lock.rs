// ABOUTME: Keyed mutual exclusion for per-location credential rotation
// ABOUTME: Real async mutex per key for production, no-op variant for single-threaded callers

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Idle slots are pruned once the map grows past this size
const PRUNE_THRESHOLD: usize = 256;

/// Held for the duration of a critical section; releases on drop
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyGuard {
    _guard: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard {
    pub fn unlocked() -> Self {
        Self { _guard: None }
    }
}

#[async_trait]
pub trait KeyedLock: Send + Sync {
    /// Wait until no other holder of `key` remains, then hold it
    async fn lock(&self, key: &str) -> KeyGuard;
}

/// One async mutex per key. Different keys never contend.
#[derive(Default)]
pub struct LocationLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LocationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        if slots.len() > PRUNE_THRESHOLD {
            // A slot held or awaited by anyone has more than one reference
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }

        slots.entry(key.to_string()).or_default().clone()
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl KeyedLock for LocationLocks {
    async fn lock(&self, key: &str) -> KeyGuard {
        let slot = self.slot(key);
        KeyGuard {
            _guard: Some(slot.lock_owned().await),
        }
    }
}

/// Never blocks
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLock;

#[async_trait]
impl KeyedLock for NoopLock {
    async fn lock(&self, _key: &str) -> KeyGuard {
        KeyGuard::unlocked()
    }
}
