//! Error types for the ekv store.
//!
//! Every fallible operation returns [`EkvResult`]. Store-level entry points
//! wrap failures in [`EkvError::Key`] so the caller learns which logical key
//! failed; use [`EkvError::root`] to look through that context.

use std::io;

use thiserror::Error;

/// Result type for store operations.
pub type EkvResult<T> = Result<T, EkvError>;

/// Boxed error produced by caller-supplied decoders.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the store, the record codec and the transaction engine.
#[derive(Debug, Error)]
pub enum EkvError {
    /// Neither record slot exists for the requested object.
    #[error("object not found: {name}")]
    NotFound {
        /// Storage name (or logical key for in-memory stores).
        name: String,
    },

    /// A slot ended before the expected number of bytes could be read.
    #[error("short read from {name}: got {got} of {expected} bytes")]
    ShortRead {
        /// Slot file name.
        name: String,
        /// Bytes actually read.
        got: usize,
        /// Bytes required.
        expected: usize,
    },

    /// The storage accepted fewer bytes than were written.
    #[error("short write to {name}: wrote {got} of {expected} bytes")]
    ShortWrite {
        /// Slot file name.
        name: String,
        /// Bytes actually written.
        got: usize,
        /// Bytes submitted.
        expected: usize,
    },

    /// Stored checksum does not match the payload.
    #[error("checksum mismatch in {name}")]
    ChecksumMismatch {
        /// Slot file name.
        name: String,
    },

    /// Payload length is zero or does not fit the record format.
    #[error("invalid contents size: {size}")]
    InvalidSize {
        /// Offending length.
        size: usize,
    },

    /// The generation tags of the two slots cannot be ordered.
    #[error("invalid generation tags: {first} and {second}")]
    InvalidGeneration {
        /// Tag of slot `.1`.
        first: u8,
        /// Tag of slot `.2`.
        second: u8,
    },

    /// Decryption failed: wrong password, tampering or truncated ciphertext.
    #[error("authentication failed: {context}")]
    AuthenticationFailed {
        /// What was being decrypted.
        context: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {context}")]
    EncryptionFailed {
        /// What was being encrypted.
        context: String,
    },

    /// Read-back after a write did not return the written payload.
    #[error("write verification failed for {name}")]
    VerificationFailed {
        /// Slot file name.
        name: String,
    },

    /// An I/O operation on the storage capability failed.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Operation being performed.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// JSON encoding or decoding of a value failed.
    #[error("serialization error for {key}: {source}")]
    Serialization {
        /// Logical key.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A caller-supplied decoder rejected stored bytes.
    #[error("failed to unmarshal {key}: {source}")]
    Unmarshal {
        /// Logical key.
        key: String,
        /// Decoder error.
        #[source]
        source: BoxedError,
    },

    /// A transaction operation chose to abort; nothing was flushed.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason given by the operation.
        reason: String,
    },

    /// A batch operation returned a key that its transaction never locked.
    #[error("key {key:?} is not part of the transaction")]
    KeyNotInTransaction {
        /// Offending logical key.
        key: String,
    },

    /// Failure attached to the logical key it happened for.
    #[error("key {key:?}: {source}")]
    Key {
        /// Logical key.
        key: String,
        /// Underlying failure.
        #[source]
        source: Box<EkvError>,
    },

    /// Several independent operations failed; each is listed with its key.
    #[error("{} operation(s) failed: {}", .0.len(), summarize(.0))]
    MultipleFailures(Vec<(String, EkvError)>),
}

fn summarize(failures: &[(String, EkvError)]) -> String {
    failures
        .iter()
        .map(|(key, err)| format!("{key:?}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl EkvError {
    /// Creates an I/O error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an abort error for use inside transaction operations.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Attaches the logical key to an error.
    #[must_use]
    pub fn for_key(self, key: &str) -> Self {
        match self {
            // Already attributed, or caller-raised.
            err @ (Self::Key { .. } | Self::Aborted { .. }) => err,
            err => Self::Key {
                key: key.to_string(),
                source: Box::new(err),
            },
        }
    }

    /// Returns the innermost error, looking through key context.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Key { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the error means "the object does not exist".
    ///
    /// I/O errors of kind [`io::ErrorKind::NotFound`] count as well.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Reports whether a lookup result refers to an existing object.
///
/// Returns `true` on success and for every error except "not found"; an
/// unreadable or corrupted object still exists.
#[must_use]
pub fn exists<T>(result: &EkvResult<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(err) => !err.is_not_found(),
    }
}
