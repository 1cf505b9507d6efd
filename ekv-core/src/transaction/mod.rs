//! Multi-key transactions.
//!
//! A transaction locks its keys (write locks, in caller order), loads a
//! snapshot of each into an [`Operable`], runs the caller's operation against
//! the [`TransactionScope`], and flushes staged changes only if the operation
//! succeeds. Locks are held until the scope is dropped.
//!
//! Transactions are atomic with respect to other transactions sharing a key.
//! They are not crash-atomic across keys: a crash mid-flush may leave some
//! keys updated and others not.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{EkvError, EkvResult};
use crate::locks::LockTable;

mod operable;
mod scope;

pub use operable::{Operable, PendingOp};
pub use scope::TransactionScope;

/// Storage operations a store provides to the transaction engine.
///
/// None of these take key locks; callers hold them.
pub(crate) trait Backend: Sync {
    /// Storage identifier used for locking and persistence.
    fn storage_id(&self, key: &str) -> String;

    /// The store's lock table.
    fn locks(&self) -> &LockTable;

    /// Loads the current value, `None` when absent.
    fn load(&self, id: &str) -> EkvResult<Option<Vec<u8>>>;

    /// Persists a value.
    fn persist(&self, id: &str, data: &[u8]) -> EkvResult<()>;

    /// Removes a value.
    fn erase(&self, id: &str) -> EkvResult<()>;
}

/// Snapshot entry exchanged with [`crate::KeyValue::mutual_transaction`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value {
    /// Stored bytes; empty when the key does not exist.
    pub data: Vec<u8>,
    /// Whether the key exists. Returning `false` deletes the key.
    pub exists: bool,
}

impl Value {
    /// An existing value.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            exists: true,
        }
    }

    /// A deletion marker.
    #[must_use]
    pub const fn deleted() -> Self {
        Self {
            data: Vec::new(),
            exists: false,
        }
    }
}

/// Runs `op` inside a fresh scope over `keys` and flushes on success.
pub(crate) fn run<R, F>(backend: &dyn Backend, keys: &[&str], op: F) -> EkvResult<R>
where
    F: FnOnce(&mut TransactionScope<'_>) -> EkvResult<R>,
{
    let mut scope = TransactionScope::new(backend);
    scope.extend(keys.iter().copied())?;
    let output = op(&mut scope)?;
    scope.flush()?;
    Ok(output)
}

/// Body of the single-key read-modify-write.
pub(crate) fn apply_single<F>(scope: &mut TransactionScope<'_>, key: &str, op: F) -> EkvResult<()>
where
    F: FnOnce(&[u8], bool) -> EkvResult<Option<Vec<u8>>>,
{
    let Some(operable) = scope.operable_mut(key) else {
        return Err(EkvError::KeyNotInTransaction {
            key: key.to_string(),
        });
    };

    let (old, existed) = operable.get();
    let update = op(old, existed)?;
    let unchanged = existed && update.as_deref() == Some(old);
    match update {
        Some(_) if unchanged => {}
        Some(new) => operable.set(new),
        None => operable.delete(),
    }
    Ok(())
}

/// Body of the whole-batch read-modify-write.
pub(crate) fn apply_mutual<F>(
    scope: &mut TransactionScope<'_>,
    keys: &[&str],
    op: F,
) -> EkvResult<()>
where
    F: FnOnce(&HashMap<String, Value>) -> EkvResult<HashMap<String, Value>>,
{
    let snapshot: HashMap<String, Value> = scope
        .iter()
        .map(|operable| {
            let (data, exists) = operable.get();
            (
                operable.key().to_string(),
                Value {
                    data: data.to_vec(),
                    exists,
                },
            )
        })
        .collect();

    let mut updates = op(&snapshot)?;
    if let Some(stray) = updates.keys().find(|k| !snapshot.contains_key(*k)) {
        return Err(EkvError::KeyNotInTransaction { key: stray.clone() });
    }

    // Stage in caller order so writes hit storage in that order.
    let mut deletions = Vec::new();
    for key in keys {
        let (Some(value), Some(old)) = (updates.remove(*key), snapshot.get(*key)) else {
            continue;
        };
        let Some(operable) = scope.operable_mut(key) else {
            continue;
        };
        if value.exists {
            if !old.exists || old.data != value.data {
                operable.set(value.data);
                operable.flush()?;
            }
        } else if old.exists {
            operable.delete();
            deletions.push((*key).to_string());
        }
    }

    let mut failures = Vec::new();
    for key in deletions {
        let Some(operable) = scope.operable_mut(&key) else {
            continue;
        };
        debug_assert_eq!(operable.pending(), PendingOp::Delete);
        if let Err(err) = operable.flush() {
            failures.push((key, err));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        warn!(failed = failures.len(), "deletions failed in batch transaction");
        Err(EkvError::MultipleFailures(failures))
    }
}
