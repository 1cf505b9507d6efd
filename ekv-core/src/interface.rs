//! Caller-facing key-value surface shared by every store.

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{BoxedError, EkvError, EkvResult};
use crate::transaction::{self, TransactionScope, Value};

/// Types that can encode themselves for storage.
pub trait Marshaler {
    /// Returns the bytes to store.
    fn marshal(&self) -> Vec<u8>;
}

/// Types that can load themselves from stored bytes.
pub trait Unmarshaler {
    /// Replaces `self` with the decoded `data`.
    ///
    /// # Errors
    ///
    /// Returns any decoding error; it is surfaced as [`EkvError::Unmarshal`].
    fn unmarshal(&mut self, data: &[u8]) -> Result<(), BoxedError>;
}

/// Key-value store operations.
///
/// Single-key operations take the key's lock for the duration of their I/O.
/// Transactions hold the write locks of every key in their scope until they
/// finish, so calling single-key operations on a key from inside a
/// transaction that holds it deadlocks.
pub trait KeyValue: Send + Sync {
    /// Stores raw bytes under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encrypted or persisted.
    fn set_bytes(&self, key: &str, data: &[u8]) -> EkvResult<()>;

    /// Loads the raw bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a not-found error (see [`EkvError::is_not_found`]) if the key
    /// has never been written or was deleted.
    fn get_bytes(&self, key: &str) -> EkvResult<Vec<u8>>;

    /// Deletes `key`. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if existing data cannot be removed.
    fn delete(&self, key: &str) -> EkvResult<()>;

    /// Runs `op` with every key in `keys` locked and staged in a scope.
    ///
    /// Keys are locked in the given order. Callers running overlapping
    /// transactions must use a consistent order across call sites or they may
    /// deadlock. When `op` succeeds every staged change is flushed; when it
    /// fails nothing is written.
    ///
    /// # Errors
    ///
    /// Returns the error from loading a key, from `op`, or from flushing.
    fn transaction<R, F>(&self, keys: &[&str], op: F) -> EkvResult<R>
    where
        Self: Sized,
        F: FnOnce(&mut TransactionScope<'_>) -> EkvResult<R>;

    /// Stores an object through its [`Marshaler`] encoding.
    ///
    /// # Errors
    ///
    /// See [`KeyValue::set_bytes`].
    fn set(&self, key: &str, object: &dyn Marshaler) -> EkvResult<()> {
        self.set_bytes(key, &object.marshal())
    }

    /// Loads `key` into an object through its [`Unmarshaler`].
    ///
    /// # Errors
    ///
    /// See [`KeyValue::get_bytes`]; decoder failures become
    /// [`EkvError::Unmarshal`].
    fn get(&self, key: &str, object: &mut dyn Unmarshaler) -> EkvResult<()> {
        let data = self.get_bytes(key)?;
        object
            .unmarshal(&data)
            .map_err(|source| EkvError::Unmarshal {
                key: key.to_string(),
                source,
            })
    }

    /// Stores any serializable value as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EkvError::Serialization`] if encoding fails, otherwise see
    /// [`KeyValue::set_bytes`].
    fn set_interface<T>(&self, key: &str, value: &T) -> EkvResult<()>
    where
        Self: Sized,
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_vec(value).map_err(|source| EkvError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.set_bytes(key, &data)
    }

    /// Loads a JSON value stored with [`KeyValue::set_interface`].
    ///
    /// # Errors
    ///
    /// Returns [`EkvError::Serialization`] if decoding fails, otherwise see
    /// [`KeyValue::get_bytes`].
    fn get_interface<T>(&self, key: &str) -> EkvResult<T>
    where
        Self: Sized,
        T: DeserializeOwned,
    {
        let data = self.get_bytes(key)?;
        serde_json::from_slice(&data).map_err(|source| EkvError::Serialization {
            key: key.to_string(),
            source,
        })
    }

    /// Read-modify-write of a single key.
    ///
    /// `op` receives the current bytes (empty when absent) and whether the key
    /// existed. Returning `Some(bytes)` stores them unless they equal the
    /// existing value; returning `None` deletes the key.
    ///
    /// # Errors
    ///
    /// See [`KeyValue::transaction`].
    fn transaction_key<F>(&self, key: &str, op: F) -> EkvResult<()>
    where
        Self: Sized,
        F: FnOnce(&[u8], bool) -> EkvResult<Option<Vec<u8>>>,
    {
        self.transaction(&[key], |scope| transaction::apply_single(scope, key, op))
    }

    /// Whole-batch read-modify-write of several keys.
    ///
    /// `op` receives a snapshot of every key and returns the values to
    /// change; keys it leaves out are untouched. Changed values are written in
    /// the order of `keys`, stopping at the first failed write. Deletions are
    /// then all attempted and their failures reported together as
    /// [`EkvError::MultipleFailures`]. Nothing already written is rolled
    /// back.
    ///
    /// # Errors
    ///
    /// Returns [`EkvError::KeyNotInTransaction`] before touching anything if
    /// `op` returns a key outside `keys`; otherwise see
    /// [`KeyValue::transaction`].
    fn mutual_transaction<F>(&self, keys: &[&str], op: F) -> EkvResult<()>
    where
        Self: Sized,
        F: FnOnce(&HashMap<String, Value>) -> EkvResult<HashMap<String, Value>>,
    {
        self.transaction(keys, |scope| transaction::apply_mutual(scope, keys, op))
    }
}
