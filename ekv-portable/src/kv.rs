//! File simulation on top of a flat key-value backend.
//!
//! Each file is a single value stored under its full name. Writes are
//! appends (read, extend, store) and mark the open handle dirty so that the
//! next read or seek reloads the value. Directories only exist as empty
//! marker entries created by [`Storage::mkdir_all`].

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::traits::{File, FileInfo, Storage};

/// Minimal key-value capability a backend must provide.
///
/// Implementations must be safe to call from several threads at once.
pub trait GenericKeyValue: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn set(&self, key: &str, value: &[u8]) -> io::Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn delete(&self, key: &str) -> io::Result<()>;

    /// Lists every key currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn keys(&self) -> io::Result<Vec<String>>;
}

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{name}: no such file"))
}

/// [`Storage`] adapter over any [`GenericKeyValue`].
#[derive(Clone)]
pub struct KeyValueStorage {
    backend: Arc<dyn GenericKeyValue>,
}

impl KeyValueStorage {
    /// Wraps a key-value backend.
    #[must_use]
    pub fn new(backend: Arc<dyn GenericKeyValue>) -> Self {
        Self { backend }
    }

    fn load(&self, name: &str) -> io::Result<Vec<u8>> {
        self.backend.get(name)?.ok_or_else(|| not_found(name))
    }
}

impl std::fmt::Debug for KeyValueStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStorage").finish_non_exhaustive()
    }
}

impl Storage for KeyValueStorage {
    fn open(&self, name: &str) -> io::Result<Box<dyn File>> {
        let contents = self.load(name)?;
        Ok(Box::new(KvFile::new(name, Arc::clone(&self.backend), contents)))
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn File>> {
        self.backend.set(name, &[])?;
        Ok(Box::new(KvFile::new(
            name,
            Arc::clone(&self.backend),
            Vec::new(),
        )))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        if self.backend.get(name)?.is_none() {
            return Err(not_found(name));
        }
        self.backend.delete(name)
    }

    fn remove_all(&self, path: &str) -> io::Result<()> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        for key in self.backend.keys()? {
            if key == path || key.starts_with(&prefix) {
                self.backend.delete(&key)?;
            }
        }
        Ok(())
    }

    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        if self.backend.get(path)?.is_none() {
            self.backend.set(path, &[])?;
        }
        Ok(())
    }

    fn stat(&self, name: &str) -> io::Result<FileInfo> {
        let contents = self.load(name)?;
        Ok(FileInfo::new(name, contents.len() as u64, false))
    }

    fn sync_parent(&self, _name: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Handle to a value simulated as a file.
struct KvFile {
    name: String,
    backend: Arc<dyn GenericKeyValue>,
    contents: Cursor<Vec<u8>>,
    dirty: bool,
}

impl KvFile {
    fn new(name: &str, backend: Arc<dyn GenericKeyValue>, contents: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            backend,
            contents: Cursor::new(contents),
            dirty: false,
        }
    }

    /// Reloads the value after a write, keeping the cursor position.
    fn refresh(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let value = self
            .backend
            .get(&self.name)?
            .ok_or_else(|| not_found(&self.name))?;
        let position = self.contents.position();
        self.contents = Cursor::new(value);
        self.contents.set_position(position);
        self.dirty = false;
        tracing::trace!(name = %self.name, "reloaded dirty key-value file");
        Ok(())
    }
}

impl Read for KvFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.refresh()?;
        self.contents.read(buf)
    }
}

impl Write for KvFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.dirty = true;
        let mut value = self
            .backend
            .get(&self.name)?
            .ok_or_else(|| not_found(&self.name))?;
        value.extend_from_slice(buf);
        self.backend.set(&self.name, &value)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for KvFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.refresh()?;
        self.contents.seek(pos)
    }
}

impl File for KvFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.refresh()?;
        let data = self.contents.get_ref();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}
