//! Error types for table operations.

use thiserror::Error;

/// Result type alias for table operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors returned by [`Table`](crate::Table) mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// A row with the same primary key is already present.
    #[error("Duplicate key in {table}: {key}")]
    DuplicateKey {
        /// The table name.
        table: String,
        /// Debug rendering of the key.
        key: String,
    },

    /// No row with the given primary key exists.
    #[error("Key not found in {table}: {key}")]
    KeyNotFound {
        /// The table name.
        table: String,
        /// Debug rendering of the key.
        key: String,
    },
}

impl DbError {
    /// Creates a duplicate key error.
    pub fn duplicate_key(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates a key not found error.
    pub fn key_not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::KeyNotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Returns true if this error reports an already present key.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DbError::DuplicateKey { .. })
    }
}
