//! File and storage traits.

use std::io::{self, Read, Seek, Write};

/// An open file handle.
///
/// Handles are closed by dropping them. Implementations must be usable from a
/// thread other than the one that opened them.
pub trait File: Read + Write + Seek + Send {
    /// Returns the name the file was opened with.
    fn name(&self) -> &str;

    /// Reads into `buf` starting at `offset` without moving the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Flushes file contents to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the data could not be made durable.
    fn sync(&mut self) -> io::Result<()>;
}

/// Metadata describing a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    size: u64,
    is_dir: bool,
}

impl FileInfo {
    /// Creates file metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            size,
            is_dir,
        }
    }

    /// Name the metadata was requested for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.is_dir
    }
}

/// File-like storage capability.
///
/// Names are `/`-separated strings. Missing files must be reported with
/// [`io::ErrorKind::NotFound`] so callers can tell absence from failure.
///
/// # Durability
///
/// After [`File::sync`] followed by [`Storage::sync_parent`] returns, the file
/// contents and its directory entry must survive a crash.
pub trait Storage: Send + Sync {
    /// Opens an existing file for reading.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotFound`] if the file does not exist.
    fn open(&self, name: &str) -> io::Result<Box<dyn File>>;

    /// Creates a file, truncating it if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    fn create(&self, name: &str) -> io::Result<Box<dyn File>>;

    /// Removes a single file.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotFound`] if the file does not exist.
    fn remove(&self, name: &str) -> io::Result<()>;

    /// Removes `path` and everything below it. Missing paths are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing entry cannot be removed.
    fn remove_all(&self, path: &str) -> io::Result<()>;

    /// Creates a directory and all missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    fn mkdir_all(&self, path: &str) -> io::Result<()>;

    /// Returns metadata for a file.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotFound`] if the file does not exist.
    fn stat(&self, name: &str) -> io::Result<FileInfo>;

    /// Makes the directory entry of `name` durable.
    ///
    /// Backends without directories may treat this as a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory could not be synced.
    fn sync_parent(&self, name: &str) -> io::Result<()>;
}
