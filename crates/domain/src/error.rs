//! Commerce error types.

use common::ProductId;
use document_store::StoreError;
use thiserror::Error;

/// Errors that can occur during commerce operations.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// No authenticated user was supplied.
    #[error("Authentication required")]
    Unauthenticated,

    /// The entity does not exist or is not visible to the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The entity exists but belongs to someone else.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Checkout was attempted on an absent or empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The user already reviewed this product.
    #[error("Product {product} has already been reviewed by this user")]
    AlreadyReviewed { product: ProductId },

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A concurrent write won, or a storage constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The document store failed.
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl CommerceError {
    /// Shorthand for [`CommerceError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CommerceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short, stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CommerceError::Unauthenticated => "unauthenticated",
            CommerceError::NotFound { .. } => "not_found",
            CommerceError::Forbidden(_) => "forbidden",
            CommerceError::EmptyCart => "empty_cart",
            CommerceError::AlreadyReviewed { .. } => "already_reviewed",
            CommerceError::Validation(_) => "validation",
            CommerceError::Conflict(_) => "conflict",
            CommerceError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl From<StoreError> for CommerceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey { index } => {
                CommerceError::Conflict(format!("write rejected by unique index {index}"))
            }
            other => CommerceError::StoreUnavailable(other),
        }
    }
}

impl From<serde_json::Error> for CommerceError {
    fn from(err: serde_json::Error) -> Self {
        CommerceError::StoreUnavailable(StoreError::Serialization(err))
    }
}

/// Result type for commerce operations.
pub type Result<T> = std::result::Result<T, CommerceError>;
