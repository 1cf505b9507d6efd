//! In-memory key-value backend.
//!
//! Nothing is persisted: dropping the backend drops every value.

use std::collections::HashMap;
use std::io;
use std::sync::RwLock;

use crate::kv::GenericKeyValue;

fn poisoned() -> io::Error {
    io::Error::other("memory key-value lock poisoned")
}

/// Thread-safe [`GenericKeyValue`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryKeyValue {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValue {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn len(&self) -> io::Result<usize> {
        Ok(self.entries.read().map_err(|_| poisoned())?.len())
    }

    /// Whether no entries are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl GenericKeyValue for MemoryKeyValue {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> io::Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> io::Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let kv = MemoryKeyValue::new();
        assert!(kv.is_empty().unwrap());

        kv.set("b", b"2").unwrap();
        kv.set("a", b"1").unwrap();
        assert_eq!(kv.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        kv.delete("a").unwrap();
        kv.delete("a").unwrap();
        assert_eq!(kv.get("a").unwrap(), None);
        assert_eq!(kv.len().unwrap(), 1);
    }
}
