//! Transaction scope: owns the operables and the key locks.

use std::collections::HashMap;

use super::operable::Operable;
use super::Backend;
use crate::error::EkvResult;
use crate::locks::KeyWriteGuard;

/// The set of keys a transaction has locked, with one [`Operable`] each.
///
/// The scope owns every operable and every lock guard; dropping it releases
/// all locks. Operables are addressed by key and never outlive the scope.
pub struct TransactionScope<'a> {
    backend: &'a dyn Backend,
    operables: Vec<Operable<'a>>,
    index: HashMap<String, usize>,
    guards: Vec<KeyWriteGuard>,
    closed: bool,
}

impl std::fmt::Debug for TransactionScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("operables", &self.operables)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<'a> TransactionScope<'a> {
    pub(crate) fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            operables: Vec::new(),
            index: HashMap::new(),
            guards: Vec::new(),
            closed: false,
        }
    }

    /// Locks and stages additional keys, in order.
    ///
    /// Keys already in the scope are skipped. Every key is locked before its
    /// snapshot is loaded and before it becomes visible.
    ///
    /// # Errors
    ///
    /// Returns the load error of the first key that cannot be read. Keys
    /// locked before it stay in the scope.
    ///
    /// # Panics
    ///
    /// Panics if the scope has already been flushed.
    #[track_caller]
    pub fn extend<I, S>(&mut self, keys: I) -> EkvResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        assert!(!self.closed, "extend on a transaction scope after flush");

        for key in keys {
            let key = key.as_ref();
            if self.index.contains_key(key) {
                continue;
            }
            let id = self.backend.storage_id(key);
            self.guards.push(self.backend.locks().write(&id));
            let operable = Operable::load(self.backend, key, id)?;
            self.index.insert(key.to_string(), self.operables.len());
            self.operables.push(operable);
        }
        Ok(())
    }

    /// The operable for `key`, if the key is in the scope.
    #[must_use]
    pub fn operable(&self, key: &str) -> Option<&Operable<'a>> {
        self.index.get(key).map(|&i| &self.operables[i])
    }

    /// Mutable access to the operable for `key`.
    pub fn operable_mut(&mut self, key: &str) -> Option<&mut Operable<'a>> {
        self.index.get(key).map(|&i| &mut self.operables[i])
    }

    /// Keys in the order they were locked.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.operables.iter().map(Operable::name)
    }

    /// Operables in the order they were locked.
    pub fn iter(&self) -> impl Iterator<Item = &Operable<'a>> {
        self.operables.iter()
    }

    /// Mutable operables in the order they were locked.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Operable<'a>> {
        self.operables.iter_mut()
    }

    /// Number of keys in the scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operables.len()
    }

    /// Whether the scope holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operables.is_empty()
    }

    /// Whether the scope has been flushed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flushes every operable that is still open, in lock order, then
    /// releases all locks.
    ///
    /// Stops at the first failure; remaining operables are discarded.
    pub(crate) fn flush(&mut self) -> EkvResult<()> {
        let mut result = Ok(());
        for operable in &mut self.operables {
            if operable.is_closed() {
                continue;
            }
            if result.is_ok() {
                result = operable.flush();
            } else {
                operable.discard();
            }
        }
        self.close();
        result
    }

    fn close(&mut self) {
        self.closed = true;
        self.guards.clear();
    }
}
