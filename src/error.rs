//! Error types for hive parsing operations.
//!
//! Failures fall into a handful of kinds: the file could not be read, the
//! base block is not a usable hive, a structure met during traversal is
//! corrupt, a cell carries an unexpected signature, or a lookup found
//! nothing. Lookup failures are ordinary outcomes and can be told apart with
//! [`RegistryError::is_not_found`].

use std::io;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while reading a hive.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error occurred while opening or mapping the hive file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The base block is not a valid hive header.
    #[error("Invalid hive header: {reason}")]
    InvalidHeader {
        /// What was wrong with the header.
        reason: String,
    },

    /// An offset, length or structural invariant was violated.
    #[error("Corrupt hive at cell offset {offset:#x}: {reason}")]
    CorruptHive {
        /// Cell offset (relative to the first hbin) where the problem was found.
        offset: u32,
        /// Description of the violation.
        reason: String,
    },

    /// A cell did not carry the signature the caller expected.
    #[error("Type mismatch at cell offset {offset:#x}: expected {expected}, found {found:?}")]
    TypeMismatch {
        /// Cell offset (relative to the first hbin).
        offset: u32,
        /// Expected signature(s), e.g. `"nk"` or `"lf|lh|li|ri"`.
        expected: &'static str,
        /// Signature bytes actually found, escaped for display.
        found: String,
    },

    /// A key path could not be resolved.
    #[error("Key not found: '{path}'")]
    KeyNotFound {
        /// The path being resolved, up to and including the missing segment.
        path: String,
    },

    /// A named value does not exist under the key.
    #[error("Value not found: '{name}'")]
    ValueNotFound {
        /// The value name that was looked up.
        name: String,
    },
}

impl RegistryError {
    /// Creates an invalid header error.
    pub fn invalid_header(reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            reason: reason.into(),
        }
    }

    /// Creates a corruption error with the offending cell offset.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use reg_hive::error::RegistryError;
    /// let err = RegistryError::corrupt(0x20, "cell length is zero");
    /// assert!(err.is_corruption());
    /// ```
    pub fn corrupt(offset: u32, reason: impl Into<String>) -> Self {
        Self::CorruptHive {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a corruption error for a read that ran past the end of a buffer.
    pub fn truncated(offset: u32, expected: usize, actual: usize) -> Self {
        Self::corrupt(
            offset,
            format!("truncated data: expected {} bytes, got {}", expected, actual),
        )
    }

    /// Creates a signature mismatch error.
    pub fn type_mismatch(offset: u32, expected: &'static str, found: &[u8]) -> Self {
        Self::TypeMismatch {
            offset,
            expected,
            found: found.escape_ascii().to_string(),
        }
    }

    /// Creates a key-not-found error for the given path.
    pub fn key_not_found(path: impl Into<String>) -> Self {
        Self::KeyNotFound { path: path.into() }
    }

    /// Creates a value-not-found error for the given name.
    ///
    /// ```rust
    /// # use reg_hive::error::RegistryError;
    /// let err = RegistryError::value_not_found("DisplayName");
    /// assert!(err.is_not_found());
    /// ```
    pub fn value_not_found(name: impl Into<String>) -> Self {
        Self::ValueNotFound { name: name.into() }
    }

    /// Returns true for `KeyNotFound` and `ValueNotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. } | Self::ValueNotFound { .. })
    }

    /// Returns true for `CorruptHive` and `TypeMismatch`.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptHive { .. } | Self::TypeMismatch { .. })
    }
}
