//! Encrypted, crash-safe key-value store.
//!
//! Every logical key is persisted as its own record, independently of all
//! other keys:
//!
//! - **Names are hidden.** The storage identifier of a key is a hash of the
//!   key under the store password (see [`crypto`]).
//! - **Contents are authenticated.** Values are sealed with
//!   XChaCha20-Poly1305 under a key derived from the password.
//! - **Writes are crash-safe.** Each record alternates between two slot
//!   files tagged with a cyclic generation counter and a checksum, so a torn
//!   write always leaves the previous value readable (see [`record`]).
//! - **Concurrency is per key.** Reads share and writes exclude on a
//!   per-key reader/writer lock; multi-key transactions hold the write locks
//!   of all their keys (see [`transaction`]).
//!
//! Storage is injected through [`ekv_portable::Storage`], so the same store
//! runs on a POSIX directory or on top of any flat key-value backend.
//!
//! ```no_run
//! use ekv_core::{Filestore, KeyValue};
//! use secrecy::SecretString;
//!
//! # fn main() -> ekv_core::EkvResult<()> {
//! let password = SecretString::from("correct horse".to_string());
//! let store = Filestore::open("/tmp/ekv-demo", &password)?;
//!
//! store.set_bytes("greeting", b"hello")?;
//! assert_eq!(store.get_bytes("greeting")?, b"hello");
//!
//! store.transaction_key("counter", |old, _existed| {
//!     let next = old.first().copied().unwrap_or(0) + 1;
//!     Ok(Some(vec![next]))
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
mod interface;
pub mod locks;
mod memstore;
pub mod record;
mod store;
pub mod transaction;

pub use config::FilestoreConfig;
pub use crypto::{Csprng, KeyEncoding, StoreKey};
pub use error::{exists, BoxedError, EkvError, EkvResult};
pub use interface::{KeyValue, Marshaler, Unmarshaler};
pub use memstore::Memstore;
pub use store::{Filestore, BOOTSTRAP_CONTENTS, BOOTSTRAP_NAME};
pub use transaction::{Operable, TransactionScope, Value};
