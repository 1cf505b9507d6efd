//! Durable dual-slot record codec.
//!
//! Payloads are written alternately to two slot files tagged with a cyclic
//! generation counter and protected by a checksum, so that a torn write can
//! always be detected and the previous payload recovered.

mod codec;
mod format;
mod generation;

pub use codec::{read_record, OpenSlot, RecordCodec, SlotOrder};
pub use format::{
    checksum, encode_slot, slot_paths, CHECKSUM_SIZE, FIRST_SLOT_SUFFIX, GENERATION_SIZE,
    HEADER_SIZE, LENGTH_SIZE, SECOND_SLOT_SUFFIX,
};
pub use generation::{compare_generations, Generation, Newer};
