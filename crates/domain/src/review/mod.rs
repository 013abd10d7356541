//! Product reviews and their aggregation.

mod distribution;
mod service;

use chrono::{DateTime, Utc};
use common::{DocumentId, ProductId, UserId};
use document_store::Document;
use serde::{Deserialize, Serialize};

pub use distribution::{MAX_RATING, RatingDistribution, bucket, validate_rating};
pub use service::ReviewService;

/// Page size used when none (or a non-positive one) is requested.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A stored review. A user reviews a product at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: DocumentId,
    pub user: UserId,
    pub product: ProductId,
    pub rating: f64,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Review {
    const COLLECTION: &'static str = "reviews";

    fn id(&self) -> DocumentId {
        self.id
    }
}

/// The author of a review as shown to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reviewer {
    pub id: UserId,
    /// None when the user has no profile.
    pub username: Option<String>,
}

/// A review with its author resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: DocumentId,
    pub user: Reviewer,
    pub product: ProductId,
    pub rating: f64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewView {
    pub fn new(review: Review, username: Option<String>) -> Self {
        Self {
            id: review.id,
            user: Reviewer {
                id: review.user,
                username,
            },
            product: review.product,
            rating: review.rating,
            comment: review.comment,
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }
}

/// Whether a user has already reviewed a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCheck {
    pub has_reviewed: bool,
    pub review: Option<Review>,
}

/// One-based page selection for review listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Falls back to page 1 and [`DEFAULT_PAGE_SIZE`] for missing or
    /// non-positive values.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let positive = |value: Option<i64>| value.filter(|v| *v >= 1).map(|v| v as u64);
        Self {
            page: positive(page).unwrap_or(1),
            limit: positive(limit).unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Number of pages needed for `total` items.
    pub fn pages_for(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A page of a product's reviews plus aggregate figures over all of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub reviews: Vec<ReviewView>,
    pub total: u64,
    pub page: u64,
    pub pages: u64,
    /// Mean rating, 0 when there are no reviews.
    pub avg_rating: f64,
    pub rating_distribution: RatingDistribution,
}
