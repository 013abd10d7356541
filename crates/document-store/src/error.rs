use thiserror::Error;

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write would violate a unique index.
    #[error("Duplicate key for unique index {index}")]
    DuplicateKey { index: String },

    /// The document is not shaped the way the store requires
    /// (not an object, missing or malformed `id`).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The store did not answer in time.
    #[error("Document store operation timed out")]
    Timeout,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if retrying the same call may succeed.
    ///
    /// Only connection-level failures qualify; constraint violations and
    /// malformed documents never do.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout => true,
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// Returns the violated index name if this is a duplicate-key error.
    pub fn duplicate_index(&self) -> Option<&str> {
        match self {
            StoreError::DuplicateKey { index } => Some(index),
            _ => None,
        }
    }
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
