//! Commerce consistency layer for the storefront.
//!
//! This crate provides the services that keep storefront state consistent
//! on top of a [`DocumentStore`]:
//! - Cart service with compare-and-swap writes
//! - Checkout service that captures prices into immutable orders
//! - Address service enforcing a single default address per user
//! - Review service with rating aggregation
//! - Administrative areas for address pickers

pub mod address;
pub mod area;
pub mod cart;
pub mod error;
pub mod money;
pub mod order;
pub mod product;
pub mod retry;
pub mod review;
pub mod user;

use document_store::{Document, DocumentStore, Filter, UniqueIndex};

pub use address::{Address, AddressFields, AddressService};
pub use area::{Area, AreaService, NewArea, core_areas};
pub use cart::{
    Cart, CartLine, CartService, MAX_LINE_QUANTITY, PopulatedCart, PopulatedCartLine,
};
pub use error::{CommerceError, Result};
pub use money::Money;
pub use order::{CheckoutService, Order, OrderLine, OrderStatus, PopulatedOrder, PopulatedOrderLine};
pub use product::{CatalogService, MAX_PRICE_CENTS, NewProduct, Product};
pub use retry::ReadRetry;
pub use review::{
    PageRequest, RatingDistribution, Review, ReviewCheck, ReviewService, ReviewStats, ReviewView,
    Reviewer,
};
pub use user::UserProfile;

/// At most one cart per user.
pub const CARTS_ONE_PER_USER: &str = "carts_one_per_user";
/// At most one default address per user.
pub const ADDRESSES_ONE_DEFAULT: &str = "addresses_one_default";
/// At most one review per (user, product).
pub const REVIEWS_USER_PRODUCT: &str = "reviews_user_product";
/// At most one order per (user, idempotency key).
pub const ORDERS_IDEMPOTENCY_KEY: &str = "orders_idempotency_key";
/// Area codes are unique.
pub const AREAS_CODE: &str = "areas_code";

/// Declares the unique indexes the services rely on. Idempotent.
pub async fn ensure_indexes<S: DocumentStore>(store: &S) -> Result<()> {
    store
        .ensure_unique_index(
            Cart::COLLECTION,
            UniqueIndex::new(CARTS_ONE_PER_USER, ["user"]),
        )
        .await?;
    store
        .ensure_unique_index(
            Address::COLLECTION,
            UniqueIndex::new(ADDRESSES_ONE_DEFAULT, ["user"])
                .partial(Filter::new().eq("isDefault", true)),
        )
        .await?;
    store
        .ensure_unique_index(
            Review::COLLECTION,
            UniqueIndex::new(REVIEWS_USER_PRODUCT, ["user", "product"]),
        )
        .await?;
    store
        .ensure_unique_index(
            Order::COLLECTION,
            UniqueIndex::new(ORDERS_IDEMPOTENCY_KEY, ["user", "idempotencyKey"]),
        )
        .await?;
    store
        .ensure_unique_index(Area::COLLECTION, UniqueIndex::new(AREAS_CODE, ["code"]))
        .await?;

    tracing::debug!("Commerce indexes ensured");
    Ok(())
}
