//! Error types for the store.

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Page id is zero or beyond the highest allocated page
    #[error("invalid page id: {0}")]
    InvalidPageId(u64),

    /// Requested page size is too small to hold a node
    #[error("invalid page size: {0} bytes")]
    InvalidPageSize(usize),

    /// Value cannot fit in a single page together with the node header
    #[error("value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// Page body failed to decode
    #[error("corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: u64, reason: String },

    /// Metadata header failed to decode
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),

    /// A post-mutation check failed; indicates a bug, not bad input
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl StoreError {
    /// Create a corrupt-page error with a message
    pub fn corrupt_page(page_id: u64, reason: impl Into<String>) -> Self {
        Self::CorruptPage {
            page_id,
            reason: reason.into(),
        }
    }

    /// Create a corrupt-metadata error
    pub fn corrupt_metadata(msg: impl Into<String>) -> Self {
        Self::CorruptMetadata(msg.into())
    }

    /// Create an invariant-violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
