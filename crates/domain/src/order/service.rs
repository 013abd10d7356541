//! Checkout service: turns a cart into an order.

use std::collections::HashMap;
use std::time::Instant;

use common::{DocumentId, ProductId, UserId};
use document_store::{
    Document, DocumentStore, DocumentStoreExt, Filter, FindOptions, Sort,
};

use super::{Order, OrderLine, PopulatedOrder, PopulatedOrderLine};
use crate::cart::{Cart, CartService};
use crate::error::{CommerceError, Result};
use crate::product::{Product, products_by_id};
use crate::retry::ReadRetry;

/// Service for checkout and order history.
///
/// Checkout inserts the order first and removes the cart second. The two
/// writes are not atomic; an idempotency key makes a retried checkout
/// return the order that already committed instead of creating another.
#[derive(Clone)]
pub struct CheckoutService<S: DocumentStore + Clone> {
    store: S,
    carts: CartService<S>,
    retry: ReadRetry,
}

impl<S: DocumentStore + Clone> CheckoutService<S> {
    pub fn new(store: S) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            store,
            retry: ReadRetry::default(),
        }
    }

    pub fn with_read_retry(mut self, retry: ReadRetry) -> Self {
        self.retry = retry;
        self.carts = self.carts.with_read_retry(retry);
        self
    }

    /// Converts the user's cart into a pending order and removes the cart.
    ///
    /// Never retried internally.
    #[tracing::instrument(skip(self, idempotency_key))]
    pub async fn checkout(
        &self,
        user: UserId,
        idempotency_key: Option<String>,
    ) -> Result<PopulatedOrder> {
        let started = Instant::now();
        let result = self.place_order(user, idempotency_key).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(order_id = %order.id, total = %order.total, "Checkout completed");
            }
            Err(err) => {
                metrics::counter!("checkout_failed_total", "reason" => err.kind()).increment(1);
                tracing::warn!(error = %err, "Checkout failed");
            }
        }
        result
    }

    async fn place_order(
        &self,
        user: UserId,
        idempotency_key: Option<String>,
    ) -> Result<PopulatedOrder> {
        let key = idempotency_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        if let Some(key) = &key
            && let Some(existing) = self.find_by_key(user, key).await?
        {
            tracing::info!(order_id = %existing.id, "Checkout replayed for idempotency key");
            self.settle_replayed(user, &existing).await?;
            return self.populate(existing).await;
        }

        let cart = match self.carts.load_cart(user).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(CommerceError::EmptyCart),
        };

        let mut products = products_by_id(&self.store, &self.retry, cart.product_ids()).await?;
        let lines = cart
            .items
            .iter()
            .map(|line| {
                let product = products
                    .get(&line.product)
                    .ok_or_else(|| CommerceError::not_found("product", line.product))?;
                Ok(OrderLine::new(line.product, line.quantity, product.price))
            })
            .collect::<Result<Vec<_>>>()?;

        let order = Order::new(user, lines, key.clone())?;
        if let Err(err) = self.store.insert_document(&order).await {
            // A concurrent checkout with the same key won the unique index.
            if let Some(key) = &key
                && err.duplicate_index().is_some()
                && let Some(winner) = self.find_by_key(user, key).await?
            {
                return self.populate(winner).await;
            }
            return Err(err.into());
        }

        if let Err(err) = self.settle_cart(user, &cart).await {
            tracing::warn!(order_id = %order.id, error = %err, "Order placed but cart not removed");
            return Err(err);
        }

        Ok(Self::populate_with(order, &mut products))
    }

    /// Removes the purchased cart. If the cart moved on since it was read,
    /// only the purchased lines are dropped.
    async fn settle_cart(&self, user: UserId, cart: &Cart) -> Result<()> {
        let unchanged = Filter::new()
            .eq("user", user)
            .eq("revision", cart.revision);
        let deleted = self.store.delete_many(Cart::COLLECTION, &unchanged).await?;

        if deleted == 0 {
            self.carts.remove_products(user, &cart.product_ids()).await?;
            tracing::debug!(%user, "Cart changed during checkout, removed purchased lines");
        }
        Ok(())
    }

    /// Finishes a replayed checkout whose first attempt may have stopped
    /// before removing the cart. A cart written after the order was placed
    /// is a new cart and stays as it is.
    async fn settle_replayed(&self, user: UserId, order: &Order) -> Result<()> {
        let Some(cart) = self.carts.load_cart(user).await? else {
            return Ok(());
        };
        if cart.updated_at > order.created_at {
            tracing::debug!(%user, order_id = %order.id, "Cart is newer than replayed order, kept");
            return Ok(());
        }
        self.carts.remove_products(user, &order.product_ids()).await?;
        Ok(())
    }

    async fn find_by_key(&self, user: UserId, key: &str) -> Result<Option<Order>> {
        let filter = Filter::new().eq("user", user).eq("idempotencyKey", key);
        let order = self
            .retry
            .run("find_order_by_key", || self.store.find_document::<Order>(&filter))
            .await?;
        Ok(order)
    }

    /// Lists the user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, user: UserId) -> Result<Vec<PopulatedOrder>> {
        let filter = Filter::new().eq("user", user);
        let orders = self
            .retry
            .run("list_orders", || {
                self.store.find_documents::<Order>(
                    &filter,
                    FindOptions::new().sort(Sort::newest_first()),
                )
            })
            .await?;

        let product_ids: Vec<ProductId> = orders.iter().flat_map(Order::product_ids).collect();
        let products = products_by_id(&self.store, &self.retry, product_ids).await?;

        Ok(orders
            .into_iter()
            .map(|order| Self::populate_from(order, &products))
            .collect())
    }

    /// Fetches one of the user's orders.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, user: UserId, id: DocumentId) -> Result<PopulatedOrder> {
        let filter = Filter::by_id(id).eq("user", user);
        let order = self
            .retry
            .run("get_order", || self.store.find_document::<Order>(&filter))
            .await?
            .ok_or_else(|| CommerceError::not_found("order", id))?;
        self.populate(order).await
    }

    async fn populate(&self, order: Order) -> Result<PopulatedOrder> {
        let mut products = products_by_id(&self.store, &self.retry, order.product_ids()).await?;
        Ok(Self::populate_with(order, &mut products))
    }

    fn populate_with(order: Order, products: &mut HashMap<ProductId, Product>) -> PopulatedOrder {
        let items = order
            .items
            .into_iter()
            .map(|line| PopulatedOrderLine {
                product: products.remove(&line.product),
                product_id: line.product,
                quantity: line.quantity,
                price: line.price,
            })
            .collect();
        PopulatedOrder {
            id: order.id,
            user: order.user,
            items,
            total: order.total,
            status: order.status,
            created_at: order.created_at,
            idempotency_key: order.idempotency_key,
        }
    }

    fn populate_from(order: Order, products: &HashMap<ProductId, Product>) -> PopulatedOrder {
        let mut subset: HashMap<ProductId, Product> = order
            .items
            .iter()
            .filter_map(|l| products.get(&l.product).map(|p| (l.product, p.clone())))
            .collect();
        Self::populate_with(order, &mut subset)
    }
}
