//! Error types for the storage engine.

use crate::types::PageId;
use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A contract violation detected internally: a page past end-of-file, a
    /// cached page missing when it was expected to exist, a node payload
    /// that fails to deserialize, an underfull node with no sibling to
    /// rebalance against. Indicates corruption or a caller bug; the store
    /// makes no attempt to recover from it.
    #[error("structural assertion failed: {0}")]
    Corruption(String),

    /// The database header's magic string or checksum does not match,
    /// detected once up front by `open` before any tree operation runs.
    #[error("invalid database file: {0}")]
    InvalidHeader(String),

    /// Key exceeds the configured maximum size.
    #[error("key too large: {size} bytes (max: {max})")]
    KeyTooLarge { size: usize, max: usize },

    /// Value exceeds the configured maximum size.
    #[error("value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// Caller misuse: an operation requiring an open database was invoked
    /// before `open`, or a configuration value is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StorageError {
    /// Build a [`StorageError::Corruption`] naming the page that failed an assertion.
    pub fn corruption_at(page_id: PageId, msg: impl std::fmt::Display) -> Self {
        Self::Corruption(format!("page {page_id}: {msg}"))
    }

    /// Build a [`StorageError::Corruption`] with no specific page attached.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Build a [`StorageError::InvalidHeader`].
    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Self::InvalidHeader(msg.into())
    }

    /// Build a [`StorageError::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
