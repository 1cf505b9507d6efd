//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::crypto::KeyEncoding;

/// Options for opening a [`crate::Filestore`].
///
/// Deserializable so it can live in an application config file; missing
/// fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilestoreConfig {
    /// Encoding of obfuscated storage identifiers.
    pub key_encoding: KeyEncoding,
    /// Read every written slot back and compare it with the payload.
    pub verify_writes: bool,
}

impl Default for FilestoreConfig {
    fn default() -> Self {
        Self {
            key_encoding: KeyEncoding::Hex,
            verify_writes: true,
        }
    }
}

impl FilestoreConfig {
    /// Sets the identifier encoding.
    #[must_use]
    pub const fn with_key_encoding(mut self, key_encoding: KeyEncoding) -> Self {
        self.key_encoding = key_encoding;
        self
    }

    /// Enables or disables read-back verification of writes.
    #[must_use]
    pub const fn with_verify_writes(mut self, verify_writes: bool) -> Self {
        self.verify_writes = verify_writes;
        self
    }
}
