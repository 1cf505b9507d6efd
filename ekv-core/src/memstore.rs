//! In-memory reference store.
//!
//! No encryption and no durability. It shares the lock table and the
//! transaction engine with [`crate::Filestore`], which makes it useful for
//! testing transaction logic and for environments without storage.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{EkvError, EkvResult};
use crate::interface::KeyValue;
use crate::locks::LockTable;
use crate::transaction::{self, Backend, TransactionScope};

/// Unencrypted in-memory [`KeyValue`] store.
#[derive(Debug, Default)]
pub struct Memstore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    locks: LockTable,
}

impl Memstore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backend for Memstore {
    fn storage_id(&self, key: &str) -> String {
        key.to_string()
    }

    fn locks(&self) -> &LockTable {
        &self.locks
    }

    fn load(&self, id: &str) -> EkvResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn persist(&self, id: &str, data: &[u8]) -> EkvResult<()> {
        self.entries.write().insert(id.to_string(), data.to_vec());
        Ok(())
    }

    fn erase(&self, id: &str) -> EkvResult<()> {
        self.entries.write().remove(id);
        Ok(())
    }
}

impl KeyValue for Memstore {
    fn set_bytes(&self, key: &str, data: &[u8]) -> EkvResult<()> {
        let _guard = self.locks.write(key);
        self.persist(key, data)
    }

    fn get_bytes(&self, key: &str) -> EkvResult<Vec<u8>> {
        let _guard = self.locks.read(key);
        self.load(key)?.ok_or_else(|| EkvError::not_found(key))
    }

    fn delete(&self, key: &str) -> EkvResult<()> {
        let _guard = self.locks.write(key);
        self.erase(key)
    }

    fn transaction<R, F>(&self, keys: &[&str], op: F) -> EkvResult<R>
    where
        F: FnOnce(&mut TransactionScope<'_>) -> EkvResult<R>,
    {
        transaction::run(self, keys, op)
    }
}
