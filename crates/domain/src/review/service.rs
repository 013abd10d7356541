//! Review service and per-product aggregation.

use chrono::Utc;
use common::{DocumentId, ProductId, UserId};
use document_store::{
    Document, DocumentStore, DocumentStoreExt, Filter, FindOptions, Patch, Sort, UpdateOptions,
};
use serde_json::json;

use super::{
    PageRequest, RatingDistribution, Review, ReviewCheck, ReviewStats, ReviewView,
    validate_rating,
};
use crate::error::{CommerceError, Result};
use crate::product::Product;
use crate::retry::ReadRetry;
use crate::user::usernames;

/// Service for writing reviews and computing per-product rating stats.
#[derive(Clone)]
pub struct ReviewService<S: DocumentStore> {
    store: S,
    retry: ReadRetry,
}

impl<S: DocumentStore> ReviewService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: ReadRetry::default(),
        }
    }

    pub fn with_read_retry(mut self, retry: ReadRetry) -> Self {
        self.retry = retry;
        self
    }

    async fn view(&self, review: Review) -> Result<ReviewView> {
        let mut names = usernames(&self.store, &self.retry, vec![review.user]).await?;
        let username = names.remove(&review.user);
        Ok(ReviewView::new(review, username))
    }

    async fn find_review(&self, filter: &Filter) -> Result<Option<Review>> {
        let review = self
            .retry
            .run("find_review", || self.store.find_document::<Review>(filter))
            .await?;
        Ok(review)
    }

    /// Loads a review the user is allowed to change.
    async fn owned_review(&self, user: UserId, id: DocumentId) -> Result<Review> {
        let review = self
            .find_review(&Filter::by_id(id))
            .await?
            .ok_or_else(|| CommerceError::not_found("review", id))?;
        if review.user != user {
            return Err(CommerceError::Forbidden(format!(
                "review {id} belongs to another user"
            )));
        }
        Ok(review)
    }

    #[tracing::instrument(skip(self, comment))]
    pub async fn create(
        &self,
        user: UserId,
        product: ProductId,
        rating: f64,
        comment: String,
    ) -> Result<ReviewView> {
        validate_rating(rating)?;

        let product_filter = Filter::by_id(product.into());
        let product_exists = self
            .retry
            .run("product_exists", || {
                self.store.exists(Product::COLLECTION, &product_filter)
            })
            .await?;
        if !product_exists {
            return Err(CommerceError::not_found("product", product));
        }

        let pair = Filter::new().eq("user", user).eq("product", product);
        if self.find_review(&pair).await?.is_some() {
            return Err(CommerceError::AlreadyReviewed { product });
        }

        let now = Utc::now();
        let review = Review {
            id: DocumentId::new(),
            user,
            product,
            rating,
            comment,
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert_document(&review)
            .await
            .map_err(|err| match err.duplicate_index() {
                Some(_) => CommerceError::AlreadyReviewed { product },
                None => err.into(),
            })?;

        metrics::counter!("reviews_created_total").increment(1);
        tracing::info!(review_id = %review.id, %product, rating, "Review created");
        self.view(review).await
    }

    #[tracing::instrument(skip(self, comment))]
    pub async fn update(
        &self,
        user: UserId,
        id: DocumentId,
        rating: f64,
        comment: String,
    ) -> Result<ReviewView> {
        validate_rating(rating)?;
        self.owned_review(user, id).await?;

        let patch = Patch::new()
            .set("rating", rating)
            .set("comment", comment)
            .set("updatedAt", json!(Utc::now()));
        let review = self
            .store
            .update_document::<Review>(&Filter::by_id(id), &patch, UpdateOptions::new())
            .await?
            .ok_or_else(|| CommerceError::not_found("review", id))?;

        self.view(review).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, user: UserId, id: DocumentId) -> Result<()> {
        self.owned_review(user, id).await?;
        self.store
            .delete_one(Review::COLLECTION, &Filter::by_id(id).eq("user", user))
            .await?;
        Ok(())
    }

    /// Reports whether the user has reviewed the product.
    #[tracing::instrument(skip(self))]
    pub async fn check(&self, user: UserId, product: ProductId) -> Result<ReviewCheck> {
        let review = self
            .find_review(&Filter::new().eq("user", user).eq("product", product))
            .await?;
        Ok(ReviewCheck {
            has_reviewed: review.is_some(),
            review,
        })
    }

    /// A page of the product's reviews, newest first, plus the mean rating
    /// and star distribution over all of its reviews.
    #[tracing::instrument(skip(self))]
    pub async fn stats_for_product(
        &self,
        product: ProductId,
        page: PageRequest,
    ) -> Result<ReviewStats> {
        let filter = Filter::new().eq("product", product);

        let total = self
            .retry
            .run("count_reviews", || {
                self.store.count(Review::COLLECTION, &filter)
            })
            .await?;

        let options = FindOptions::new()
            .sort(Sort::newest_first())
            .skip(usize::try_from(page.skip()).unwrap_or(usize::MAX))
            .limit(usize::try_from(page.limit).unwrap_or(usize::MAX));
        let reviews = self
            .retry
            .run("page_reviews", || {
                self.store
                    .find_documents::<Review>(&filter, options.clone())
            })
            .await?;

        let summary = self
            .retry
            .run("aggregate_ratings", || {
                self.store.aggregate(Review::COLLECTION, &filter, "rating")
            })
            .await?;

        let authors: Vec<UserId> = reviews.iter().map(|r| r.user).collect();
        let names = usernames(&self.store, &self.retry, authors).await?;
        let reviews = reviews
            .into_iter()
            .map(|review| {
                let username = names.get(&review.user).cloned();
                ReviewView::new(review, username)
            })
            .collect();

        let (avg_rating, rating_distribution) = match summary {
            Some(summary) => (
                summary.average,
                RatingDistribution::from_ratings(summary.values),
            ),
            None => (0.0, RatingDistribution::default()),
        };

        Ok(ReviewStats {
            reviews,
            total,
            page: page.page,
            pages: page.pages_for(total),
            avg_rating,
            rating_distribution,
        })
    }
}

#[cfg(test)]
mod tests {
    use document_store::InMemoryDocumentStore;

    use super::*;
    use crate::money::Money;
    use crate::product::{CatalogService, NewProduct};
    use crate::user::UserProfile;

    async fn setup() -> (ReviewService<InMemoryDocumentStore>, InMemoryDocumentStore, ProductId) {
        let store = InMemoryDocumentStore::new();
        crate::ensure_indexes(&store).await.unwrap();
        let product = CatalogService::new(store.clone())
            .create_product(NewProduct::new("Lamp", Money::from_cents(2500)))
            .await
            .unwrap()
            .id;
        (ReviewService::new(store.clone()), store, product)
    }

    #[tokio::test]
    async fn test_stats_for_known_ratings() {
        let (reviews, _, product) = setup().await;
        for rating in [0.5, 3.5, 5.0, 5.0] {
            reviews
                .create(UserId::new(), product, rating, String::new())
                .await
                .unwrap();
        }

        let stats = reviews
            .stats_for_product(product, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pages, 1);
        assert!((stats.avg_rating - 3.5).abs() < 1e-9);
        assert_eq!(
            [1, 2, 3, 4, 5].map(|s| stats.rating_distribution.count(s)),
            [1, 0, 1, 0, 2]
        );
    }

    #[tokio::test]
    async fn test_stats_without_reviews() {
        let (reviews, _, product) = setup().await;
        let stats = reviews
            .stats_for_product(product, PageRequest::default())
            .await
            .unwrap();

        assert_eq!(stats.total, 0);
        assert_eq!(stats.pages, 0);
        assert_eq!(stats.avg_rating, 0.0);
        assert_eq!(stats.rating_distribution.total(), 0);
        assert!(stats.reviews.is_empty());
    }

    #[tokio::test]
    async fn test_stats_pages_newest_first() {
        let (reviews, _, product) = setup().await;
        let mut created = Vec::new();
        for i in 0..5 {
            let view = reviews
                .create(UserId::new(), product, 4.0, format!("review {i}"))
                .await
                .unwrap();
            created.push(view.id);
        }

        let stats = reviews
            .stats_for_product(product, PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.page, 2);
        let ids: Vec<_> = stats.reviews.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![created[2], created[1]]);
    }

    #[tokio::test]
    async fn test_duplicate_review_is_rejected_and_original_kept() {
        let (reviews, _, product) = setup().await;
        let user = UserId::new();
        let original = reviews
            .create(user, product, 4.0, "good".to_string())
            .await
            .unwrap();

        let second = reviews.create(user, product, 1.0, "bad".to_string()).await;
        assert!(matches!(second, Err(CommerceError::AlreadyReviewed { .. })));

        let check = reviews.check(user, product).await.unwrap();
        assert!(check.has_reviewed);
        let kept = check.review.unwrap();
        assert_eq!(kept.id, original.id);
        assert_eq!(kept.rating, 4.0);
        assert_eq!(kept.comment, "good");
    }

    #[tokio::test]
    async fn test_create_validates_rating_and_product() {
        let (reviews, _, product) = setup().await;
        let user = UserId::new();

        assert!(matches!(
            reviews.create(user, product, 5.5, String::new()).await,
            Err(CommerceError::Validation(_))
        ));
        assert!(matches!(
            reviews.create(user, ProductId::new(), 3.0, String::new()).await,
            Err(CommerceError::NotFound { entity: "product", .. })
        ));
        assert!(!reviews.check(user, product).await.unwrap().has_reviewed);
    }

    #[tokio::test]
    async fn test_update_and_remove_require_ownership() {
        let (reviews, _, product) = setup().await;
        let author = UserId::new();
        let review = reviews
            .create(author, product, 3.0, "ok".to_string())
            .await
            .unwrap();

        assert!(matches!(
            reviews.update(UserId::new(), review.id, 1.0, String::new()).await,
            Err(CommerceError::Forbidden(_))
        ));
        assert!(matches!(
            reviews.remove(UserId::new(), review.id).await,
            Err(CommerceError::Forbidden(_))
        ));
        assert!(matches!(
            reviews.update(author, DocumentId::new(), 1.0, String::new()).await,
            Err(CommerceError::NotFound { .. })
        ));

        let updated = reviews
            .update(author, review.id, 4.5, "better".to_string())
            .await
            .unwrap();
        assert_eq!(updated.rating, 4.5);
        assert_eq!(updated.comment, "better");

        reviews.remove(author, review.id).await.unwrap();
        assert!(matches!(
            reviews.remove(author, review.id).await,
            Err(CommerceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reviewer_username_is_resolved() {
        let (reviews, store, product) = setup().await;
        let user = UserId::new();
        store
            .insert_document(&UserProfile::new(user, "alice"))
            .await
            .unwrap();

        let view = reviews
            .create(user, product, 5.0, String::new())
            .await
            .unwrap();
        assert_eq!(view.user.username.as_deref(), Some("alice"));

        let anonymous = reviews
            .create(UserId::new(), product, 2.0, String::new())
            .await
            .unwrap();
        assert!(anonymous.user.username.is_none());
    }
}
