//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Once};
use std::time::Duration;

use ekv_core::record::{encode_slot, CHECKSUM_SIZE, HEADER_SIZE};
use ekv_core::{EkvResult, Filestore, FilestoreConfig};
use ekv_portable::{
    File, FileInfo, GenericKeyValue, KeyValueStorage, MemoryKeyValue, PosixStorage, Storage,
};
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn secret(password: &str) -> SecretString {
    SecretString::from(password.to_string())
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn open_on(storage: Arc<dyn Storage>, base: &str, password: &str) -> EkvResult<Filestore> {
    init_tracing();
    Filestore::open_with_csprng(
        storage,
        base,
        &secret(password),
        FilestoreConfig::default(),
        Box::new(StdRng::from_entropy()),
    )
}

pub fn kv_storage(backend: &Arc<MemoryKeyValue>) -> Arc<dyn Storage> {
    Arc::new(KeyValueStorage::new(
        Arc::clone(backend) as Arc<dyn GenericKeyValue>
    ))
}

pub fn posix_storage() -> Arc<dyn Storage> {
    Arc::new(PosixStorage::new())
}

/// Storage wrapper that can simulate crashes during writes, stalled writes,
/// corrupted reads and failing or blocking removals.
pub struct FaultyStorage {
    inner: Arc<dyn Storage>,
    torn_writes: AtomicBool,
    zero_writes: AtomicBool,
    tampered_reopens: AtomicBool,
    failing_removes: AtomicBool,
    held_remove: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl FaultyStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            torn_writes: AtomicBool::new(false),
            zero_writes: AtomicBool::new(false),
            tampered_reopens: AtomicBool::new(false),
            failing_removes: AtomicBool::new(false),
            held_remove: Mutex::new(None),
        })
    }

    /// Files created while enabled report zero bytes accepted on every write.
    pub fn set_zero_writes(&self, enabled: bool) {
        self.zero_writes.store(enabled, Ordering::SeqCst);
    }

    /// While enabled, reopened slots hold a well-formed record whose payload
    /// differs from the stored one in its first byte.
    pub fn set_tampered_reopens(&self, enabled: bool) {
        self.tampered_reopens.store(enabled, Ordering::SeqCst);
    }

    /// Makes the next `remove` block until the returned gate is released.
    pub fn hold_next_remove(&self) -> RemoveGate {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.held_remove.lock() = Some((entered_tx, release_rx));
        RemoveGate {
            entered: entered_rx,
            release: release_tx,
        }
    }

    /// Files created while enabled accept half of each write, then fail.
    pub fn set_torn_writes(&self, enabled: bool) {
        self.torn_writes.store(enabled, Ordering::SeqCst);
    }

    pub fn set_failing_removes(&self, enabled: bool) {
        self.failing_removes.store(enabled, Ordering::SeqCst);
    }
}

impl Storage for FaultyStorage {
    fn open(&self, name: &str) -> io::Result<Box<dyn File>> {
        let mut file = self.inner.open(name)?;
        if !self.tampered_reopens.load(Ordering::SeqCst) {
            return Ok(file);
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        if bytes.len() > HEADER_SIZE + CHECKSUM_SIZE {
            let mut payload = bytes[HEADER_SIZE..bytes.len() - CHECKSUM_SIZE].to_vec();
            payload[0] ^= 0xff;
            bytes = encode_slot(bytes[0], &payload).map_err(io::Error::other)?;
        }
        Ok(Box::new(MemoryFile {
            name: name.to_string(),
            data: Cursor::new(bytes),
        }))
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn File>> {
        let file = self.inner.create(name)?;
        if self.torn_writes.load(Ordering::SeqCst) {
            Ok(Box::new(TornFile { inner: file }))
        } else if self.zero_writes.load(Ordering::SeqCst) {
            Ok(Box::new(StalledFile { inner: file }))
        } else {
            Ok(file)
        }
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        if self.failing_removes.load(Ordering::SeqCst) {
            return Err(io::Error::other(format!("simulated removal failure: {name}")));
        }
        let held = self.held_remove.lock().take();
        if let Some((entered, release)) = held {
            let _ = entered.send(());
            let _ = release.recv();
        }
        self.inner.remove(name)
    }

    fn remove_all(&self, path: &str) -> io::Result<()> {
        self.inner.remove_all(path)
    }

    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        self.inner.mkdir_all(path)
    }

    fn stat(&self, name: &str) -> io::Result<FileInfo> {
        self.inner.stat(name)
    }

    fn sync_parent(&self, name: &str) -> io::Result<()> {
        self.inner.sync_parent(name)
    }
}

struct TornFile {
    inner: Box<dyn File>,
}

impl Read for TornFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TornFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write_all(&buf[..buf.len() / 2])?;
        Err(io::Error::other("simulated crash mid-write"))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for TornFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl File for TornFile {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.inner.read_at(buf, offset)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.inner.sync()
    }
}

/// Stalls a removal started after [`FaultyStorage::hold_next_remove`].
pub struct RemoveGate {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl RemoveGate {
    /// Waits until the held removal has started.
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered.recv_timeout(timeout).is_ok()
    }

    /// Lets the held removal continue.
    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

/// Created file whose writes never make progress.
struct StalledFile {
    inner: Box<dyn File>,
}

impl Read for StalledFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for StalledFile {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for StalledFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl File for StalledFile {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.inner.read_at(buf, offset)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.inner.sync()
    }
}

/// Read-only snapshot handed out for tampered reopens.
struct MemoryFile {
    name: String,
    data: Cursor<Vec<u8>>,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("snapshot is read-only"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.data.seek(pos)
    }
}

impl File for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.data.get_ref();
        let start = usize::try_from(offset).map_or(data.len(), |o| o.min(data.len()));
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}
