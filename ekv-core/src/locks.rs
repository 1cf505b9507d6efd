//! Per-key reader/writer locks.
//!
//! Locks are created lazily on first use and never removed. The table itself
//! is guarded by a coarse lock that is only held while looking up or
//! inserting an entry, never while a key lock is held or I/O is in flight.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};

/// Lock guarding one storage identifier.
pub type KeyLock = Arc<RwLock<()>>;

/// Owned shared guard on a key.
pub type KeyReadGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// Owned exclusive guard on a key.
pub type KeyWriteGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// Map from storage identifier to its lock.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: RwLock<HashMap<String, KeyLock>>,
}

impl LockTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates the lock for `id`.
    pub fn get(&self, id: &str) -> KeyLock {
        if let Some(lock) = self.locks.read().get(id) {
            return Arc::clone(lock);
        }

        let mut locks = self.locks.write();
        // Another thread may have inserted it between the two locks.
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    /// Blocks until `id` can be read.
    pub fn read(&self, id: &str) -> KeyReadGuard {
        self.get(id).read_arc()
    }

    /// Blocks until `id` can be written.
    pub fn write(&self, id: &str) -> KeyWriteGuard {
        self.get(id).write_arc()
    }

    /// Number of locks created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    /// Whether no lock has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
