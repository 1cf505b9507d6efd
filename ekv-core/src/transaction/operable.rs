//! Per-key staging handle.

use super::Backend;
use crate::error::EkvResult;

/// Operation staged on an [`Operable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    /// Nothing to persist.
    Read,
    /// Persist the staged bytes.
    Write,
    /// Remove the key.
    Delete,
}

/// Staging handle for one key inside a transaction.
///
/// The snapshot is loaded when the key joins the scope, under the key's write
/// lock. Changes are only staged; they reach storage when the handle is
/// flushed, either explicitly or when the transaction completes.
///
/// # Panics
///
/// Every method except [`Operable::is_closed`] panics once the handle has
/// been flushed. A flushed handle belongs to a finished transaction and
/// using it is a bug in the caller.
pub struct Operable<'a> {
    backend: &'a dyn Backend,
    key: String,
    id: String,
    data: Vec<u8>,
    present: bool,
    existed: bool,
    pending: PendingOp,
    closed: bool,
}

impl std::fmt::Debug for Operable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operable")
            .field("key", &self.key)
            .field("existed", &self.existed)
            .field("pending", &self.pending)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<'a> Operable<'a> {
    /// Loads the snapshot for `key`. The caller must hold the key's lock.
    pub(crate) fn load(backend: &'a dyn Backend, key: &str, id: String) -> EkvResult<Self> {
        let snapshot = backend.load(&id).map_err(|e| e.for_key(key))?;
        let existed = snapshot.is_some();
        Ok(Self {
            backend,
            key: key.to_string(),
            id,
            data: snapshot.unwrap_or_default(),
            present: existed,
            existed,
            pending: PendingOp::Read,
            closed: false,
        })
    }

    #[track_caller]
    fn assert_open(&self, operation: &str) {
        assert!(
            !self.closed,
            "{operation} on operable for key {:?} after its transaction was flushed",
            self.key
        );
    }

    /// The logical key.
    #[must_use]
    #[track_caller]
    pub fn key(&self) -> &str {
        self.assert_open("key");
        &self.key
    }

    /// Whether the key exists in the staged view.
    #[must_use]
    #[track_caller]
    pub fn exists(&self) -> bool {
        self.assert_open("exists");
        self.present
    }

    /// Current staged bytes and whether the key exists.
    ///
    /// Bytes are empty when the key does not exist.
    #[must_use]
    #[track_caller]
    pub fn get(&self) -> (&[u8], bool) {
        self.assert_open("get");
        (&self.data, self.present)
    }

    /// Stages a write of `data`.
    #[track_caller]
    pub fn set(&mut self, data: impl Into<Vec<u8>>) {
        self.assert_open("set");
        self.data = data.into();
        self.present = true;
        self.pending = PendingOp::Write;
    }

    /// Stages a deletion.
    #[track_caller]
    pub fn delete(&mut self) {
        self.assert_open("delete");
        self.data.clear();
        self.present = false;
        self.pending = PendingOp::Delete;
    }

    /// Persists the staged operation and closes the handle.
    ///
    /// The handle is closed even if persisting fails.
    ///
    /// # Errors
    ///
    /// Returns the storage error for this key.
    #[track_caller]
    pub fn flush(&mut self) -> EkvResult<()> {
        self.assert_open("flush");
        self.closed = true;

        let result = match self.pending {
            PendingOp::Read => Ok(()),
            PendingOp::Write => self.backend.persist(&self.id, &self.data),
            PendingOp::Delete if self.existed => self.backend.erase(&self.id),
            PendingOp::Delete => Ok(()),
        };
        result.map_err(|e| e.for_key(&self.key))
    }

    /// Whether the handle has been flushed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Key name without the open check.
    pub(crate) fn name(&self) -> &str {
        &self.key
    }

    pub(crate) const fn pending(&self) -> PendingOp {
        self.pending
    }

    /// Closes without persisting.
    pub(crate) fn discard(&mut self) {
        self.closed = true;
    }
}
