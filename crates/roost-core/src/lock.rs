//! Advisory daemon locking.
//!
//! Locks serialize concurrent change requests that target overlapping
//! daemon sets within one process. They are cooperative markers, not a
//! distributed lock; running several orchestrator processes against the
//! same fleet needs an external single-writer arrangement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Result, RoostError};

#[derive(Debug, Default)]
struct LockTable {
    /// Daemon id to owning guard key.
    held: HashMap<i64, u64>,
    next_key: u64,
}

/// Process-wide registry of daemon locks. Clones share the table.
#[derive(Debug, Clone, Default)]
pub struct DaemonLocks {
    inner: Arc<Mutex<LockTable>>,
}

impl DaemonLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire all of `daemon_ids` atomically. Fails without taking
    /// anything if any of them is already held by another guard.
    pub fn lock(&self, daemon_ids: &[i64]) -> Result<LockGuard> {
        let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = daemon_ids
            .iter()
            .copied()
            .find(|id| table.held.contains_key(id))
        {
            return Err(RoostError::DaemonLocked(id));
        }
        table.next_key += 1;
        let key = table.next_key;
        for id in daemon_ids {
            table.held.insert(*id, key);
        }
        Ok(LockGuard {
            table: Arc::clone(&self.inner),
            key,
            daemon_ids: daemon_ids.to_vec(),
        })
    }

    pub fn is_locked(&self, daemon_id: i64) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .held
            .contains_key(&daemon_id)
    }

    pub fn locked_ids(&self) -> Vec<i64> {
        let table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<i64> = table.held.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Holds a set of daemon locks; dropping it releases them. Every exit
/// path of a change request releases its locks this way.
#[derive(Debug)]
pub struct LockGuard {
    table: Arc<Mutex<LockTable>>,
    key: u64,
    daemon_ids: Vec<i64>,
}

impl LockGuard {
    pub fn daemon_ids(&self) -> &[i64] {
        &self.daemon_ids
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.daemon_ids {
            // Only remove entries this guard owns, in case the map was
            // repopulated between conflicting requests.
            if table.held.get(id) == Some(&self.key) {
                table.held.remove(id);
            }
        }
    }
}
