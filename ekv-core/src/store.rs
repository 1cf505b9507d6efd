//! Encrypted, durable store with one record per key.
//!
//! Each logical key maps to `<base>/<encoded H(H(password) || H(key))>` and
//! its value is stored as an XChaCha20-Poly1305 ciphertext in a dual-slot
//! record (see [`crate::record`]). Opening a store verifies the password
//! against an encrypted bootstrap record, `<base>/.ekv`.

use std::path::Path;
use std::sync::Arc;

use ekv_portable::{PosixStorage, Storage};
use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::config::FilestoreConfig;
use crate::crypto::{self, Csprng, StoreKey};
use crate::error::{EkvError, EkvResult};
use crate::interface::KeyValue;
use crate::locks::LockTable;
use crate::record::RecordCodec;
use crate::transaction::{self, Backend, TransactionScope};

/// Name of the bootstrap record inside the base directory.
pub const BOOTSTRAP_NAME: &str = ".ekv";

/// Plaintext of the bootstrap record.
pub const BOOTSTRAP_CONTENTS: &[u8] = b"version:1";

/// Encrypted key-value store over a [`Storage`] capability.
pub struct Filestore {
    base_dir: String,
    key: StoreKey,
    config: FilestoreConfig,
    codec: RecordCodec,
    locks: LockTable,
    csprng: Mutex<Box<dyn Csprng>>,
}

impl std::fmt::Debug for Filestore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filestore")
            .field("base_dir", &self.base_dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Filestore {
    /// Opens (or creates) a store in a directory on the local file system.
    ///
    /// # Errors
    ///
    /// See [`Filestore::open_with_csprng`].
    pub fn open(base_dir: impl AsRef<Path>, password: &SecretString) -> EkvResult<Self> {
        let base_dir = base_dir.as_ref().to_string_lossy().into_owned();
        Self::open_with(
            Arc::new(PosixStorage::new()),
            &base_dir,
            password,
            FilestoreConfig::default(),
        )
    }

    /// Opens a store on any storage capability, using the OS random source.
    ///
    /// # Errors
    ///
    /// See [`Filestore::open_with_csprng`].
    pub fn open_with(
        storage: Arc<dyn Storage>,
        base_dir: &str,
        password: &SecretString,
        config: FilestoreConfig,
    ) -> EkvResult<Self> {
        Self::open_with_csprng(storage, base_dir, password, config, Box::new(OsRng))
    }

    /// Opens a store with an explicit random source for nonces and secure
    /// deletion.
    ///
    /// The base directory is created if needed. If a bootstrap record exists
    /// it must decrypt under `password`; it is then rewritten, which also
    /// proves the directory is writable.
    ///
    /// # Errors
    ///
    /// - [`EkvError::AuthenticationFailed`] if the store was created with a
    ///   different password.
    /// - [`EkvError::Io`] or a record error if the directory or bootstrap
    ///   record cannot be read or written.
    pub fn open_with_csprng(
        storage: Arc<dyn Storage>,
        base_dir: &str,
        password: &SecretString,
        config: FilestoreConfig,
        csprng: Box<dyn Csprng>,
    ) -> EkvResult<Self> {
        let base_dir = match base_dir.trim_end_matches('/') {
            "" if base_dir.starts_with('/') => "/".to_string(),
            "" => ".".to_string(),
            trimmed => trimmed.to_string(),
        };
        storage
            .mkdir_all(&base_dir)
            .map_err(|e| EkvError::io(format!("creating {base_dir}"), e))?;

        let store = Self {
            codec: RecordCodec::new(storage, config.verify_writes),
            key: StoreKey::derive(password.expose_secret()),
            base_dir,
            config,
            locks: LockTable::new(),
            csprng: Mutex::new(csprng),
        };
        store.bootstrap()?;

        info!(base_dir = %store.base_dir, "opened store");
        Ok(store)
    }

    fn bootstrap(&self) -> EkvResult<()> {
        let path = self.path_of(BOOTSTRAP_NAME);

        match self.codec.read(&path) {
            Ok(ciphertext) => {
                let contents = crypto::decrypt(&ciphertext, &self.key)?;
                if contents != BOOTSTRAP_CONTENTS {
                    return Err(EkvError::AuthenticationFailed {
                        context: "unexpected bootstrap contents".to_string(),
                    });
                }
            }
            Err(err) if err.is_not_found() => {
                debug!(base_dir = %self.base_dir, "no bootstrap record, initializing");
            }
            Err(err) => return Err(err),
        }

        let ciphertext = self.seal(BOOTSTRAP_CONTENTS)?;
        self.codec.write(&path, &ciphertext)
    }

    fn path_of(&self, name: &str) -> String {
        if self.base_dir.ends_with('/') {
            format!("{}{name}", self.base_dir)
        } else {
            format!("{}/{name}", self.base_dir)
        }
    }

    fn seal(&self, payload: &[u8]) -> EkvResult<Vec<u8>> {
        let mut csprng = self.csprng.lock();
        crypto::encrypt(payload, &self.key, &mut **csprng)
    }

    /// Replaces the random source used for nonces and secure deletion.
    pub fn set_csprng(&self, csprng: Box<dyn Csprng>) {
        *self.csprng.lock() = csprng;
    }

    /// The directory holding the store's records.
    #[must_use]
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub const fn config(&self) -> &FilestoreConfig {
        &self.config
    }

    /// Storage path of the record for a logical key.
    #[must_use]
    pub fn record_path(&self, key: &str) -> String {
        self.storage_id(key)
    }
}

impl Backend for Filestore {
    fn storage_id(&self, key: &str) -> String {
        let encoded = crypto::obfuscate_key_name(key, &self.key, self.config.key_encoding);
        self.path_of(&encoded)
    }

    fn locks(&self) -> &LockTable {
        &self.locks
    }

    fn load(&self, id: &str) -> EkvResult<Option<Vec<u8>>> {
        match self.codec.read(id) {
            Ok(ciphertext) => crypto::decrypt(&ciphertext, &self.key).map(Some),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn persist(&self, id: &str, data: &[u8]) -> EkvResult<()> {
        let ciphertext = self.seal(data)?;
        self.codec.write(id, &ciphertext)
    }

    fn erase(&self, id: &str) -> EkvResult<()> {
        // The random source is locked per draw, never across slot I/O.
        self.codec.delete(id, |noise| self.csprng.lock().try_fill_bytes(noise))
    }
}

impl KeyValue for Filestore {
    fn set_bytes(&self, key: &str, data: &[u8]) -> EkvResult<()> {
        let id = self.storage_id(key);
        let _guard = self.locks.write(&id);
        self.persist(&id, data).map_err(|e| e.for_key(key))
    }

    fn get_bytes(&self, key: &str) -> EkvResult<Vec<u8>> {
        let id = self.storage_id(key);
        let _guard = self.locks.read(&id);
        self.load(&id)
            .and_then(|value| value.ok_or_else(|| EkvError::not_found(id.as_str())))
            .map_err(|e| e.for_key(key))
    }

    fn delete(&self, key: &str) -> EkvResult<()> {
        let id = self.storage_id(key);
        let _guard = self.locks.write(&id);
        self.erase(&id).map_err(|e| e.for_key(key))
    }

    fn transaction<R, F>(&self, keys: &[&str], op: F) -> EkvResult<R>
    where
        F: FnOnce(&mut TransactionScope<'_>) -> EkvResult<R>,
    {
        transaction::run(self, keys, op)
    }
}
