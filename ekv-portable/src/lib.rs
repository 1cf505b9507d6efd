//! Storage capability consumed by the ekv store engine.
//!
//! The store engine never touches the file system directly. It is handed a
//! [`Storage`] implementation and works exclusively through it, which lets the
//! same engine run on top of:
//!
//! * **POSIX file systems** via [`PosixStorage`] (`std::fs`, with directory
//!   `fsync` on unix).
//! * **Any key-value backend** via [`KeyValueStorage`], which simulates files
//!   on top of a [`GenericKeyValue`] (one blob per file name). This is how
//!   browser `localStorage`, mobile preference stores and similar flat
//!   namespaces are plugged in.
//!
//! [`MemoryKeyValue`] is a thread-safe in-memory [`GenericKeyValue`] used by
//! tests and by callers that want a throwaway store.

mod kv;
mod memory;
mod posix;
mod traits;

pub use kv::{GenericKeyValue, KeyValueStorage};
pub use memory::MemoryKeyValue;
pub use posix::PosixStorage;
pub use traits::{File, FileInfo, Storage};
