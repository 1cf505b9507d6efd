//! `std::fs` backed storage.
//!
//! Writes are made durable with `fsync` on the file followed by an `fsync`
//! on the parent directory, so that a freshly created slot survives a crash.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::traits::{File, FileInfo, Storage};

/// Storage on the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixStorage;

impl PosixStorage {
    /// Creates a new POSIX storage handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Open file on the local file system.
#[derive(Debug)]
pub struct PosixFile {
    name: String,
    file: fs::File,
}

impl Read for PosixFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for PosixFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for PosixFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl File for PosixFile {
    fn name(&self) -> &str {
        &self.name
    }

    #[cfg(unix)]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(&self.file, buf, offset)
    }

    #[cfg(not(unix))]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let position = self.file.stream_position()?;
        self.file.seek(SeekFrom::Start(offset))?;
        let read = self.file.read(buf);
        self.file.seek(SeekFrom::Start(position))?;
        read
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

impl Storage for PosixStorage {
    fn open(&self, name: &str) -> io::Result<Box<dyn File>> {
        let file = fs::File::open(name)?;
        Ok(Box::new(PosixFile {
            name: name.to_string(),
            file,
        }))
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(name)?;
        Ok(Box::new(PosixFile {
            name: name.to_string(),
            file,
        }))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(name)
    }

    fn remove_all(&self, path: &str) -> io::Result<()> {
        let result = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(err) => Err(err),
        };
        match result {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    #[cfg(unix)]
    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        use std::os::unix::fs::DirBuilderExt;

        fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
    }

    #[cfg(not(unix))]
    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn stat(&self, name: &str) -> io::Result<FileInfo> {
        let meta = fs::metadata(name)?;
        Ok(FileInfo::new(name, meta.len(), meta.is_dir()))
    }

    #[cfg(unix)]
    fn sync_parent(&self, name: &str) -> io::Result<()> {
        use std::path::Path;

        let parent = match Path::new(name).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::File::open(parent)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_parent(&self, _name: &str) -> io::Result<()> {
        // Directory handles cannot be synced here; rely on the file sync.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn test_create_write_open_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new();
        let name = path_in(&dir, "blob");

        let mut file = storage.create(&name).unwrap();
        file.write_all(b"hello world").unwrap();
        file.sync().unwrap();
        drop(file);
        storage.sync_parent(&name).unwrap();

        let mut file = storage.open(&name).unwrap();
        assert_eq!(file.name(), name);
        let mut buf = [0u8; 5];
        assert_eq!(file.read_at(&mut buf, 6).unwrap(), 5);
        assert_eq!(&buf, b"world");

        // read_at must not move the cursor
        let mut all = Vec::new();
        file.read_to_end(&mut all).unwrap();
        assert_eq!(all, b"hello world");

        assert_eq!(storage.stat(&name).unwrap().size(), 11);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new();
        let name = path_in(&dir, "missing");

        let err = storage.open(&name).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        let err = storage.stat(&name).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        storage.remove_all(&name).unwrap();
    }

    #[test]
    fn test_mkdir_all_and_remove_all() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new();
        let nested = path_in(&dir, "a/b/c");

        storage.mkdir_all(&nested).unwrap();
        assert!(storage.stat(&nested).unwrap().is_dir());

        let file = format!("{nested}/x");
        storage.create(&file).unwrap();
        storage.remove_all(&path_in(&dir, "a")).unwrap();
        assert!(storage.stat(&nested).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_mkdir_all_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new();
        let nested = path_in(&dir, "private");
        storage.mkdir_all(&nested).unwrap();

        let mode = fs::metadata(&nested).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }
}
