//! Slot layout constants and encoding.
//!
//! Every logical record is stored in two slot files, `<path>.1` and
//! `<path>.2`. Each slot has the layout:
//!
//! ```text
//! Offset   Size  Field
//! ------   ----  -----
//! 0        1     generation tag (0, 1 or 2)
//! 1        4     payload length N (u32 LE, N > 0)
//! 5        N     payload
//! 5+N      32    SHA-256(payload)
//! ```

// Layout comments describe binary structure, not Rust identifiers
#![allow(clippy::doc_markdown)]

use sha2::{Digest, Sha256};

use crate::crypto::HASH_SIZE;
use crate::error::{EkvError, EkvResult};

/// Size of the generation tag.
pub const GENERATION_SIZE: usize = 1;

/// Size of the little-endian payload length.
pub const LENGTH_SIZE: usize = 4;

/// Offset of the payload length.
pub const LENGTH_OFFSET: u64 = GENERATION_SIZE as u64;

/// Bytes preceding the payload.
pub const HEADER_SIZE: usize = GENERATION_SIZE + LENGTH_SIZE;

/// Size of the trailing checksum.
pub const CHECKSUM_SIZE: usize = HASH_SIZE;

/// Suffix of the first slot.
pub const FIRST_SLOT_SUFFIX: &str = ".1";

/// Suffix of the second slot.
pub const SECOND_SLOT_SUFFIX: &str = ".2";

/// Returns the names of both slots of a record.
#[must_use]
pub fn slot_paths(path: &str) -> (String, String) {
    (
        format!("{path}{FIRST_SLOT_SUFFIX}"),
        format!("{path}{SECOND_SLOT_SUFFIX}"),
    )
}

/// Checksum over a payload.
#[must_use]
pub fn checksum(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    Sha256::digest(payload).into()
}

/// Encodes a complete slot.
///
/// # Errors
///
/// Returns [`EkvError::InvalidSize`] if the payload is empty or longer than
/// `u32::MAX` bytes.
pub fn encode_slot(generation: u8, payload: &[u8]) -> EkvResult<Vec<u8>> {
    let length = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len > 0)
        .ok_or(EkvError::InvalidSize {
            size: payload.len(),
        })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
    buf.push(generation);
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum(payload));
    Ok(buf)
}
