//! Cart service.

use chrono::Utc;
use common::{ProductId, UserId};
use document_store::{
    Document, DocumentStore, DocumentStoreExt, Filter, Patch, UpdateOptions,
};
use serde_json::json;

use super::{Cart, MAX_LINE_QUANTITY, PopulatedCart, PopulatedCartLine, quantity_too_large};
use crate::error::{CommerceError, Result};
use crate::product::{Product, products_by_id};
use crate::retry::ReadRetry;

/// Compare-and-swap attempts before a cart write gives up with `Conflict`.
pub const DEFAULT_MAX_ATTEMPTS: usize = 8;

/// Service for reading and mutating carts.
///
/// Every write is a compare-and-swap on the cart's `revision`, so
/// concurrent writers for the same user never overwrite each other's lines.
#[derive(Clone)]
pub struct CartService<S: DocumentStore> {
    store: S,
    retry: ReadRetry,
    max_attempts: usize,
}

impl<S: DocumentStore> CartService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: ReadRetry::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_read_retry(mut self, retry: ReadRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn user_filter(user: UserId) -> Filter {
        Filter::new().eq("user", user)
    }

    /// Returns the user's cart with products resolved, or an empty cart.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user: UserId) -> Result<PopulatedCart> {
        match self.load_cart(user).await? {
            Some(cart) => self.populate(cart).await,
            None => Ok(PopulatedCart::empty(user)),
        }
    }

    /// Adds `quantity` of a product, creating the cart if needed.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i64,
    ) -> Result<PopulatedCart> {
        if quantity < 1 {
            return Err(CommerceError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|quantity| *quantity <= MAX_LINE_QUANTITY)
            .ok_or_else(quantity_too_large)?;

        let product_filter = Filter::by_id(product.into());
        let exists = self
            .retry
            .run("product_exists", || {
                self.store.exists(Product::COLLECTION, &product_filter)
            })
            .await?;
        if !exists {
            return Err(CommerceError::not_found("product", product));
        }

        let cart = self
            .mutate(user, "add", true, |cart| {
                cart.add(product, quantity)?;
                Ok(true)
            })
            .await?;
        self.populated_or_empty(user, cart).await
    }

    /// Overwrites a line's quantity; zero or less removes the line.
    ///
    /// A missing cart or line leaves everything untouched. Quantities above
    /// [`MAX_LINE_QUANTITY`] are rejected.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i64,
    ) -> Result<PopulatedCart> {
        let quantity = match quantity {
            ..=0 => 0,
            positive => u32::try_from(positive).map_err(|_| quantity_too_large())?,
        };
        let cart = self
            .mutate(user, "set_quantity", false, |cart| {
                cart.set_quantity(product, quantity)
            })
            .await?;
        self.populated_or_empty(user, cart).await
    }

    /// Removes a line. Removing an absent line is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user: UserId, product: ProductId) -> Result<PopulatedCart> {
        let cart = self
            .mutate(user, "remove", false, |cart| Ok(cart.remove(&[product])))
            .await?;
        self.populated_or_empty(user, cart).await
    }

    /// Deletes the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user: UserId) -> Result<()> {
        let deleted = self
            .store
            .delete_many(Cart::COLLECTION, &Self::user_filter(user))
            .await?;
        metrics::counter!("cart_mutations_total", "operation" => "clear").increment(1);
        tracing::debug!(%user, deleted, "Cart cleared");
        Ok(())
    }

    /// Drops the lines for the given products, leaving the rest of the cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_products(
        &self,
        user: UserId,
        products: &[ProductId],
    ) -> Result<Option<Cart>> {
        self.mutate(user, "remove_products", false, |cart| Ok(cart.remove(products)))
            .await
    }

    /// Loads the stored cart without resolving products.
    pub async fn load_cart(&self, user: UserId) -> Result<Option<Cart>> {
        let filter = Self::user_filter(user);
        let cart = self
            .retry
            .run("load_cart", || self.store.find_document::<Cart>(&filter))
            .await?;
        Ok(cart)
    }

    /// Resolves every line's product; vanished products show as None.
    pub async fn populate(&self, cart: Cart) -> Result<PopulatedCart> {
        let mut products =
            products_by_id(&self.store, &self.retry, cart.product_ids()).await?;

        let items = cart
            .items
            .into_iter()
            .map(|line| PopulatedCartLine {
                product: products.remove(&line.product),
                product_id: line.product,
                quantity: line.quantity,
            })
            .collect();

        Ok(PopulatedCart {
            id: Some(cart.id),
            user: cart.user,
            items,
            updated_at: cart.updated_at,
        })
    }

    async fn populated_or_empty(&self, user: UserId, cart: Option<Cart>) -> Result<PopulatedCart> {
        match cart {
            Some(cart) => self.populate(cart).await,
            None => Ok(PopulatedCart::empty(user)),
        }
    }

    /// Creates the user's cart unless one exists. Safe to race.
    async fn create_if_missing(&self, user: UserId) -> Result<Cart> {
        let now = json!(Utc::now());
        let patch = Patch::new()
            .set_on_insert("items", json!([]))
            .set_on_insert("revision", 0)
            .set_on_insert("createdAt", now.clone())
            .set_on_insert("updatedAt", now);

        self.store
            .update_document::<Cart>(&Self::user_filter(user), &patch, UpdateOptions::upsert())
            .await?
            .ok_or_else(|| CommerceError::Conflict(format!("cart for user {user} vanished")))
    }

    /// Applies `change` to the current cart and swaps it in if the revision
    /// is still the one that was read.
    ///
    /// `change` returns false when it left the cart untouched; nothing is
    /// written then, and an error from `change` is returned as is. Without
    /// `create`, a missing cart yields `Ok(None)`.
    async fn mutate<F>(
        &self,
        user: UserId,
        operation: &'static str,
        create: bool,
        mut change: F,
    ) -> Result<Option<Cart>>
    where
        F: FnMut(&mut Cart) -> Result<bool>,
    {
        for attempt in 1..=self.max_attempts {
            let current = match self.load_cart(user).await? {
                Some(cart) => cart,
                None if create => self.create_if_missing(user).await?,
                None => return Ok(None),
            };

            let mut next = current.clone();
            if !change(&mut next)? {
                return Ok(Some(current));
            }

            let filter = Self::user_filter(user).eq("revision", current.revision);
            let patch = Patch::new()
                .set("items", serde_json::to_value(&next.items)?)
                .set("revision", current.revision + 1)
                .set("updatedAt", json!(Utc::now()));

            match self
                .store
                .update_document::<Cart>(&filter, &patch, UpdateOptions::new())
                .await?
            {
                Some(updated) => {
                    metrics::counter!("cart_mutations_total", "operation" => operation)
                        .increment(1);
                    return Ok(Some(updated));
                }
                None => {
                    tracing::debug!(%user, attempt, operation, "Cart revision moved, retrying");
                }
            }
        }

        tracing::warn!(%user, operation, attempts = self.max_attempts, "Cart write kept losing races");
        Err(CommerceError::Conflict(format!(
            "cart for user {user} changed concurrently"
        )))
    }
}
