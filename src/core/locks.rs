//! Per-player serialization of record access.
//!
//! Same shape as a per-database write lock: one mutex per key, created on
//! first use. Passes for different players never wait on each other.

use crate::core::error::BridgeError;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct PlayerLocks {
    entries: Mutex<FxHashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PlayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, uuid: Uuid) -> Result<Arc<Mutex<()>>, BridgeError> {
        let mut entries = self.entries.lock().map_err(|_| {
            BridgeError::ValidationError("PlayerLocks entries lock poisoned".to_string())
        })?;
        Ok(Arc::clone(entries.entry(uuid).or_default()))
    }

    /// Runs `f` while holding the lock for `uuid`. A pass that panicked
    /// while holding the lock leaves it poisoned; later passes for that
    /// player fail until the entry is pruned.
    pub fn with_player<F, R>(&self, uuid: Uuid, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce() -> Result<R, BridgeError>,
    {
        let entry = self.entry(uuid)?;
        let _guard = entry.lock().map_err(|_| {
            BridgeError::ValidationError(format!("Player lock for {} poisoned", uuid))
        })?;
        f()
    }

    /// Drops locks nobody is holding or waiting on.
    pub fn prune(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
