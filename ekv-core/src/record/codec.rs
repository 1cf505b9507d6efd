//! Reading, writing and securely deleting dual-slot records.
//!
//! # Write protocol
//!
//! 1. Find the newest slot whose contents validate (falling back to the
//!    older slot).
//! 2. Write to the *other* slot with the next generation tag, so the last
//!    valid copy is never touched.
//! 3. `fsync` the slot, then its directory.
//! 4. Optionally read the slot back and compare.
//!
//! A crash at any point leaves at least one slot holding either the old or
//! the new payload, and checksum validation rejects the torn one.

use std::io::{self, Read, SeekFrom};
use std::sync::Arc;

use ekv_portable::{File, Storage};
use tracing::{debug, warn};

use super::format::{
    checksum, encode_slot, slot_paths, CHECKSUM_SIZE, GENERATION_SIZE, LENGTH_OFFSET, LENGTH_SIZE,
};
use super::generation::{compare_generations, Generation, Newer};
use crate::error::{EkvError, EkvResult};

/// A slot that was opened and carries an in-range generation tag.
pub struct OpenSlot {
    name: String,
    tag: u8,
    file: Box<dyn File>,
}

impl OpenSlot {
    /// Slot file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw generation tag.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        self.tag
    }

    /// Reads and validates the record stored in this slot.
    ///
    /// # Errors
    ///
    /// See [`read_record`].
    pub fn read_record(&mut self) -> EkvResult<Vec<u8>> {
        read_record(self.file.as_mut())
    }
}

impl std::fmt::Debug for OpenSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSlot")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Slots of a record ordered newest first.
#[derive(Debug)]
pub struct SlotOrder {
    /// The newer slot, or the only readable one.
    pub newest: OpenSlot,
    /// The older slot, if both tags could be read and ordered.
    pub oldest: Option<OpenSlot>,
}

/// Reads one record from a slot file.
///
/// The generation tag is skipped; the length, payload and checksum are read
/// in order and validated.
///
/// # Errors
///
/// - [`EkvError::ShortRead`] if the slot ends early.
/// - [`EkvError::InvalidSize`] if the stored length is zero.
/// - [`EkvError::ChecksumMismatch`] if the payload does not match its checksum.
/// - [`EkvError::Io`] if the storage fails.
pub fn read_record(file: &mut dyn File) -> EkvResult<Vec<u8>> {
    let name = file.name().to_string();
    file.seek(SeekFrom::Start(LENGTH_OFFSET))
        .map_err(|e| EkvError::io(format!("seeking in {name}"), e))?;

    let length = read_field(file, LENGTH_SIZE, &name, "size")?;
    let mut length_bytes = [0u8; LENGTH_SIZE];
    length_bytes.copy_from_slice(&length);
    let size = u32::from_le_bytes(length_bytes) as usize;
    if size == 0 {
        return Err(EkvError::InvalidSize { size });
    }

    let payload = read_field(file, size, &name, "contents")?;
    let stored = read_field(file, CHECKSUM_SIZE, &name, "checksum")?;
    if checksum(&payload)[..] != stored[..] {
        return Err(EkvError::ChecksumMismatch { name });
    }

    Ok(payload)
}

/// Reads exactly `len` bytes without trusting `len` for the allocation.
fn read_field(file: &mut dyn File, len: usize, name: &str, what: &str) -> EkvResult<Vec<u8>> {
    let mut buf = Vec::new();
    Read::take(&mut *file, len as u64)
        .read_to_end(&mut buf)
        .map_err(|e| EkvError::io(format!("reading {what} of {name}"), e))?;
    if buf.len() != len {
        return Err(EkvError::ShortRead {
            name: name.to_string(),
            got: buf.len(),
            expected: len,
        });
    }
    Ok(buf)
}

/// Durable record codec over a storage capability.
#[derive(Clone)]
pub struct RecordCodec {
    storage: Arc<dyn Storage>,
    verify_writes: bool,
}

impl std::fmt::Debug for RecordCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCodec")
            .field("verify_writes", &self.verify_writes)
            .finish_non_exhaustive()
    }
}

impl RecordCodec {
    /// Creates a codec writing through `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, verify_writes: bool) -> Self {
        Self {
            storage,
            verify_writes,
        }
    }

    /// The underlying storage capability.
    #[must_use]
    pub const fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn open_slot(&self, name: &str) -> io::Result<OpenSlot> {
        let mut file = self.storage.open(name)?;
        let mut tag = [u8::MAX; GENERATION_SIZE];
        if file.read_at(&mut tag, 0)? != GENERATION_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{name}: generation tag missing"),
            ));
        }
        if Generation::new(tag[0]).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{name}: generation tag {} out of range", tag[0]),
            ));
        }
        Ok(OpenSlot {
            name: name.to_string(),
            tag: tag[0],
            file,
        })
    }

    /// Opens both slots of `path` and orders them by generation.
    ///
    /// A slot that is missing, truncated before its tag or tagged outside
    /// {0, 1, 2} counts as absent. If only one slot remains, it is returned as
    /// the newest with no oldest.
    ///
    /// # Errors
    ///
    /// - [`EkvError::NotFound`] if neither slot exists.
    /// - [`EkvError::Io`] if neither slot can be read.
    /// - [`EkvError::InvalidGeneration`] if both tags were read but cannot be
    ///   ordered.
    pub fn select_newest(&self, path: &str) -> EkvResult<SlotOrder> {
        let (first, second) = slot_paths(path);

        match (self.open_slot(&first), self.open_slot(&second)) {
            (Err(e1), Err(e2)) => {
                let missing = |e: &io::Error| e.kind() == io::ErrorKind::NotFound;
                match (missing(&e1), missing(&e2)) {
                    (true, true) => Err(EkvError::not_found(path)),
                    // The reported source is never a "not found".
                    (true, false) => Err(EkvError::io(
                        format!("finding newest slot ({first}: {e1})"),
                        e2,
                    )),
                    (false, _) => Err(EkvError::io(
                        format!("finding newest slot ({second}: {e2})"),
                        e1,
                    )),
                }
            }
            (Err(err), Ok(slot)) | (Ok(slot), Err(err)) => {
                if err.kind() != io::ErrorKind::NotFound {
                    debug!(slot = %slot.name, error = %err, "other slot unreadable");
                }
                Ok(SlotOrder {
                    newest: slot,
                    oldest: None,
                })
            }
            (Ok(a), Ok(b)) => match compare_generations(a.tag, b.tag) {
                Newer::First => Ok(SlotOrder {
                    newest: a,
                    oldest: Some(b),
                }),
                Newer::Second => Ok(SlotOrder {
                    newest: b,
                    oldest: Some(a),
                }),
                Newer::Invalid => Err(EkvError::InvalidGeneration {
                    first: a.tag,
                    second: b.tag,
                }),
            },
        }
    }

    /// Returns the payload of the newest valid slot of `path`.
    ///
    /// # Errors
    ///
    /// Returns the selection error from [`Self::select_newest`], or the
    /// newest slot's record error when no slot validates.
    pub fn read(&self, path: &str) -> EkvResult<Vec<u8>> {
        let SlotOrder { mut newest, oldest } = self.select_newest(path)?;

        let newest_err = match newest.read_record() {
            Ok(payload) => return Ok(payload),
            Err(err) => err,
        };

        if let Some(mut oldest) = oldest {
            match oldest.read_record() {
                Ok(payload) => {
                    warn!(
                        slot = %newest.name,
                        error = %newest_err,
                        "newest slot invalid, using older slot"
                    );
                    return Ok(payload);
                }
                Err(err) => {
                    debug!(slot = %oldest.name, error = %err, "older slot invalid as well");
                }
            }
        }

        Err(newest_err)
    }

    /// Name and tag of the newest slot whose record validates.
    fn last_valid_slot(&self, path: &str) -> Option<(String, u8)> {
        let SlotOrder { newest, oldest } = self.select_newest(path).ok()?;
        std::iter::once(newest)
            .chain(oldest)
            .find_map(|mut slot| match slot.read_record() {
                Ok(_) => Some((slot.name, slot.tag)),
                Err(_) => None,
            })
    }

    /// Writes `payload` as the new newest record of `path`.
    ///
    /// # Errors
    ///
    /// - [`EkvError::InvalidSize`] if `payload` is empty; nothing is touched.
    /// - [`EkvError::ShortWrite`] or [`EkvError::Io`] if the slot could not be
    ///   written and synced.
    /// - [`EkvError::VerificationFailed`] if verification is enabled and the
    ///   read-back differs.
    pub fn write(&self, path: &str, payload: &[u8]) -> EkvResult<()> {
        if payload.is_empty() {
            return Err(EkvError::InvalidSize { size: 0 });
        }

        let (first, second) = slot_paths(path);
        let (target, generation) = match self.last_valid_slot(path) {
            Some((name, tag)) => {
                let target = if name == second { first } else { second };
                let generation = Generation::new(tag).map_or(Generation::INITIAL, Generation::next);
                (target, generation)
            }
            // Nothing validates: overwrite slot `.1`, tagged newer than
            // whatever slot `.2` still claims.
            None => {
                let generation = self
                    .open_slot(&second)
                    .ok()
                    .and_then(|slot| Generation::new(slot.tag))
                    .map_or(Generation::INITIAL, Generation::next);
                (first, generation)
            }
        };

        let slot = encode_slot(generation.value(), payload)?;
        self.write_slot(&target, &slot)?;

        if self.verify_writes {
            self.verify(&target, payload)?;
        }

        debug!(slot = %target, generation = generation.value(), "record written");
        Ok(())
    }

    fn write_slot(&self, name: &str, bytes: &[u8]) -> EkvResult<()> {
        let mut file = self
            .storage
            .create(name)
            .map_err(|e| EkvError::io(format!("creating {name}"), e))?;
        write_fully(file.as_mut(), bytes)?;
        file.sync()
            .map_err(|e| EkvError::io(format!("syncing {name}"), e))?;
        drop(file);
        self.storage
            .sync_parent(name)
            .map_err(|e| EkvError::io(format!("syncing directory of {name}"), e))
    }

    fn verify(&self, name: &str, expected: &[u8]) -> EkvResult<()> {
        let mut file = self
            .storage
            .open(name)
            .map_err(|e| EkvError::io(format!("reopening {name}"), e))?;
        let stored = read_record(file.as_mut())?;
        if stored != expected {
            return Err(EkvError::VerificationFailed {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Overwrites both slots of `path` with random bytes and removes them.
    ///
    /// `fill_noise` fills a buffer with random bytes. It is called once per
    /// existing slot, before any I/O on that slot, so callers can keep a
    /// shared random source locked only for the duration of the call.
    /// Missing slots are skipped, so deleting an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EkvError::Io`] on the first slot that cannot be shredded or
    /// removed, or if `fill_noise` fails.
    pub fn delete<F>(&self, path: &str, mut fill_noise: F) -> EkvResult<()>
    where
        F: FnMut(&mut [u8]) -> Result<(), rand::Error>,
    {
        let (first, second) = slot_paths(path);
        for name in [&first, &second] {
            self.shred(name, &mut fill_noise)?;
        }
        self.storage
            .sync_parent(path)
            .map_err(|e| EkvError::io(format!("syncing directory of {path}"), e))
    }

    fn shred<F>(&self, name: &str, fill_noise: &mut F) -> EkvResult<()>
    where
        F: FnMut(&mut [u8]) -> Result<(), rand::Error>,
    {
        let info = match self.storage.stat(name) {
            Ok(info) => info,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(EkvError::io(format!("inspecting {name}"), e)),
        };

        let size = usize::try_from(info.size()).map_err(|_| EkvError::InvalidSize {
            size: usize::MAX,
        })?;
        let mut noise = vec![0u8; size];
        fill_noise(&mut noise)
            .map_err(|e| EkvError::io("drawing overwrite bytes", io::Error::other(e)))?;

        let mut file = self
            .storage
            .create(name)
            .map_err(|e| EkvError::io(format!("opening {name} for overwrite"), e))?;
        write_fully(file.as_mut(), &noise)?;
        file.sync()
            .map_err(|e| EkvError::io(format!("syncing {name}"), e))?;
        drop(file);

        self.storage
            .remove(name)
            .map_err(|e| EkvError::io(format!("removing {name}"), e))
    }
}

fn write_fully(file: &mut dyn File, bytes: &[u8]) -> EkvResult<()> {
    let mut written = 0;
    while written < bytes.len() {
        match file.write(&bytes[written..]) {
            Ok(0) => {
                return Err(EkvError::ShortWrite {
                    name: file.name().to_string(),
                    got: written,
                    expected: bytes.len(),
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                return Err(EkvError::io(format!("writing {}", file.name()), e));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ekv_portable::{GenericKeyValue, KeyValueStorage, MemoryKeyValue};
    use rand::{rngs::StdRng, RngCore, SeedableRng};

    fn codec() -> (Arc<MemoryKeyValue>, RecordCodec) {
        let backend = Arc::new(MemoryKeyValue::new());
        let storage = KeyValueStorage::new(Arc::clone(&backend) as Arc<dyn GenericKeyValue>);
        (backend, RecordCodec::new(Arc::new(storage), true))
    }

    fn tag_of(backend: &MemoryKeyValue, name: &str) -> Option<u8> {
        backend.get(name).unwrap().map(|bytes| bytes[0])
    }

    #[test]
    fn test_slots_rotate_with_generations() {
        let (backend, codec) = codec();

        codec.write("rec", b"one").unwrap();
        assert_eq!(tag_of(&backend, "rec.1"), Some(1));
        assert_eq!(tag_of(&backend, "rec.2"), None);

        codec.write("rec", b"two").unwrap();
        assert_eq!(tag_of(&backend, "rec.2"), Some(2));

        codec.write("rec", b"three").unwrap();
        assert_eq!(tag_of(&backend, "rec.1"), Some(0));

        codec.write("rec", b"four").unwrap();
        assert_eq!(tag_of(&backend, "rec.2"), Some(1));

        assert_eq!(codec.read("rec").unwrap(), b"four");
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let (_, codec) = codec();
        let err = codec.read("absent").unwrap_err();
        assert!(matches!(err, EkvError::NotFound { .. }));
    }

    #[test]
    fn test_empty_write_rejected_without_io() {
        let (backend, codec) = codec();
        codec.write("rec", b"value").unwrap();
        let before = backend.keys().unwrap();
        let slot = backend.get("rec.1").unwrap();

        let err = codec.write("rec", &[]).unwrap_err();
        assert!(matches!(err, EkvError::InvalidSize { size: 0 }));
        assert_eq!(backend.keys().unwrap(), before);
        assert_eq!(backend.get("rec.1").unwrap(), slot);
        assert_eq!(codec.read("rec").unwrap(), b"value");
    }

    #[test]
    fn test_corrupt_newest_falls_back_to_oldest() {
        let (backend, codec) = codec();
        codec.write("rec", b"old").unwrap();
        codec.write("rec", b"new").unwrap();

        let mut slot = backend.get("rec.2").unwrap().unwrap();
        slot[6] ^= 0xFF;
        backend.set("rec.2", &slot).unwrap();

        assert_eq!(codec.read("rec").unwrap(), b"old");

        // The next write must not overwrite the surviving slot.
        codec.write("rec", b"newer").unwrap();
        assert_eq!(tag_of(&backend, "rec.2"), Some(2));
        assert_eq!(codec.read("rec").unwrap(), b"newer");
    }

    #[test]
    fn test_truncated_newest_falls_back_to_oldest() {
        let (backend, codec) = codec();
        codec.write("rec", b"stable").unwrap();
        codec.write("rec", b"torn").unwrap();

        let slot = backend.get("rec.2").unwrap().unwrap();
        backend.set("rec.2", &slot[..7]).unwrap();

        assert_eq!(codec.read("rec").unwrap(), b"stable");
    }

    #[test]
    fn test_only_slot_corrupt_surfaces_record_error() {
        let (backend, codec) = codec();
        codec.write("rec", b"payload").unwrap();

        let mut slot = backend.get("rec.1").unwrap().unwrap();
        let last = slot.len() - 1;
        slot[last] ^= 0x01;
        backend.set("rec.1", &slot).unwrap();

        let err = codec.read("rec").unwrap_err();
        assert!(matches!(err, EkvError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_equal_tags_are_invalid() {
        let (backend, codec) = codec();
        backend
            .set("rec.1", &encode_slot(1, b"a").unwrap())
            .unwrap();
        backend
            .set("rec.2", &encode_slot(1, b"b").unwrap())
            .unwrap();

        let err = codec.read("rec").unwrap_err();
        assert!(matches!(
            err,
            EkvError::InvalidGeneration {
                first: 1,
                second: 1
            }
        ));
    }

    #[test]
    fn test_zero_length_slot_rejected() {
        let (backend, codec) = codec();
        let mut slot = vec![1u8];
        slot.extend_from_slice(&0u32.to_le_bytes());
        slot.extend_from_slice(&checksum(&[]));
        backend.set("rec.1", &slot).unwrap();

        assert!(matches!(
            codec.read("rec").unwrap_err(),
            EkvError::InvalidSize { size: 0 }
        ));
    }

    #[test]
    fn test_huge_length_is_short_read() {
        let (backend, codec) = codec();
        let mut slot = vec![1u8];
        slot.extend_from_slice(&u32::MAX.to_le_bytes());
        slot.extend_from_slice(b"tiny");
        backend.set("rec.1", &slot).unwrap();

        assert!(matches!(
            codec.read("rec").unwrap_err(),
            EkvError::ShortRead { got: 4, .. }
        ));
    }

    #[test]
    fn test_delete_removes_both_slots() {
        let (backend, codec) = codec();
        let mut rng = StdRng::seed_from_u64(9);
        codec.write("rec", b"one").unwrap();
        codec.write("rec", b"two").unwrap();

        codec.delete("rec", |buf| rng.try_fill_bytes(buf)).unwrap();
        assert!(backend.get("rec.1").unwrap().is_none());
        assert!(backend.get("rec.2").unwrap().is_none());
        assert!(codec.read("rec").unwrap_err().is_not_found());

        // Deleting again is fine.
        codec.delete("rec", |buf| rng.try_fill_bytes(buf)).unwrap();
    }

    fn set_tag(backend: &MemoryKeyValue, name: &str, tag: u8) {
        let mut slot = backend.get(name).unwrap().unwrap();
        slot[0] = tag;
        backend.set(name, &slot).unwrap();
    }

    #[test]
    fn test_out_of_range_tag_yields_to_valid_sibling() {
        let (backend, codec) = codec();
        codec.write("rec", b"one").unwrap();
        codec.write("rec", b"two").unwrap();
        set_tag(&backend, "rec.1", 7);

        assert_eq!(codec.read("rec").unwrap(), b"two");

        // The damaged slot is the write target and the new value wins.
        codec.write("rec", b"three").unwrap();
        assert_eq!(tag_of(&backend, "rec.1"), Some(0));
        assert_eq!(tag_of(&backend, "rec.2"), Some(2));
        assert_eq!(codec.read("rec").unwrap(), b"three");
    }

    #[test]
    fn test_out_of_range_only_slot_is_replaced() {
        let (backend, codec) = codec();
        codec.write("rec", b"one").unwrap();
        set_tag(&backend, "rec.1", 7);

        let err = codec.read("rec").unwrap_err();
        assert!(!err.is_not_found());

        codec.write("rec", b"two").unwrap();
        assert_eq!(tag_of(&backend, "rec.1"), Some(1));
        assert_eq!(codec.read("rec").unwrap(), b"two");

        codec.write("rec", b"three").unwrap();
        assert_eq!(tag_of(&backend, "rec.2"), Some(2));
        assert_eq!(codec.read("rec").unwrap(), b"three");
    }

    #[test]
    fn test_rewrite_outranks_tagged_but_corrupt_sibling() {
        let (backend, codec) = codec();
        let mut slot = encode_slot(1, b"broken").unwrap();
        let last = slot.len() - 1;
        slot[last] ^= 0x01;
        backend.set("rec.2", &slot).unwrap();

        codec.write("rec", b"fresh").unwrap();
        assert_eq!(tag_of(&backend, "rec.1"), Some(2));
        assert_eq!(codec.read("rec").unwrap(), b"fresh");
    }
}
