//! Shared identifier types for the storefront commerce layer.

pub mod types;

pub use types::{DocumentId, ProductId, UserId};
