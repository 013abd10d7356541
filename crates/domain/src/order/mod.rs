//! Orders and checkout.
//!
//! An order is an immutable record of a checkout: each line carries the
//! unit price observed at that moment, and the total is computed once.

mod service;
mod state;

use chrono::{DateTime, Utc};
use common::{DocumentId, ProductId, UserId};
use document_store::Document;
use serde::{Deserialize, Serialize};

use crate::error::{CommerceError, Result};
use crate::money::Money;
use crate::product::Product;

pub use service::CheckoutService;
pub use state::OrderStatus;

/// A purchased product with the price captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product: ProductId,
    pub quantity: u32,
    /// Unit price at checkout.
    pub price: Money,
}

impl OrderLine {
    pub fn new(product: ProductId, quantity: u32, price: Money) -> Self {
        Self {
            product,
            quantity,
            price,
        }
    }

    /// Returns the total price for this line (quantity * price).
    pub fn subtotal(&self) -> Result<Money> {
        self.price.checked_multiply(self.quantity).ok_or_else(|| {
            CommerceError::Validation(format!("subtotal for product {} overflows", self.product))
        })
    }
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: DocumentId,
    pub user: UserId,
    pub items: Vec<OrderLine>,
    pub total: Money,
    #[serde(default)]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";

    fn id(&self) -> DocumentId {
        self.id
    }
}

impl Order {
    /// Creates a pending order, computing the total from the lines.
    ///
    /// Fails with `Validation` when the total does not fit in an `i64` of cents.
    pub fn new(
        user: UserId,
        items: Vec<OrderLine>,
        idempotency_key: Option<String>,
    ) -> Result<Self> {
        let total = items.iter().try_fold(Money::zero(), |total, line| {
            total
                .checked_add(line.subtotal()?)
                .ok_or_else(|| CommerceError::Validation("order total overflows".to_string()))
        })?;
        Ok(Self {
            id: DocumentId::new(),
            user,
            items,
            total,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            idempotency_key,
        })
    }

    pub fn product_ids(&self) -> Vec<ProductId> {
        self.items.iter().map(|line| line.product).collect()
    }
}

/// An order line with its product resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedOrderLine {
    /// The product as it is now, or None when it no longer exists.
    pub product: Option<Product>,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// An order as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedOrder {
    pub id: DocumentId,
    pub user: UserId,
    pub items: Vec<PopulatedOrderLine>,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}
