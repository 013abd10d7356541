//! Shopping carts.
//!
//! A user has at most one cart. Carts store product references only; prices
//! are resolved when the cart is read.

mod service;

use chrono::{DateTime, Utc};
use common::{DocumentId, ProductId, UserId};
use document_store::Document;
use serde::{Deserialize, Serialize};

use crate::error::{CommerceError, Result};
use crate::product::Product;

pub use service::{CartService, DEFAULT_MAX_ATTEMPTS};

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

fn quantity_too_large() -> CommerceError {
    CommerceError::Validation(format!(
        "quantity must not exceed {MAX_LINE_QUANTITY}"
    ))
}

/// A product reference and quantity inside a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: ProductId,
    pub quantity: u32,
}

/// A stored cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: DocumentId,
    pub user: UserId,
    #[serde(default)]
    pub items: Vec<CartLine>,
    /// Bumped on every write; writers compare-and-swap on it.
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Cart {
    const COLLECTION: &'static str = "carts";

    fn id(&self) -> DocumentId {
        self.id
    }
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn line(&self, product: ProductId) -> Option<&CartLine> {
        self.items.iter().find(|line| line.product == product)
    }

    pub fn product_ids(&self) -> Vec<ProductId> {
        self.items.iter().map(|line| line.product).collect()
    }

    /// Adds `quantity` of `product`, merging into an existing line.
    ///
    /// Rejects a merged quantity above [`MAX_LINE_QUANTITY`] and leaves the
    /// cart unchanged.
    pub fn add(&mut self, product: ProductId, quantity: u32) -> Result<()> {
        match self.items.iter_mut().find(|line| line.product == product) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .filter(|merged| *merged <= MAX_LINE_QUANTITY)
                    .ok_or_else(quantity_too_large)?;
            }
            None if quantity > MAX_LINE_QUANTITY => return Err(quantity_too_large()),
            None => self.items.push(CartLine { product, quantity }),
        }
        Ok(())
    }

    /// Overwrites the quantity of an existing line; zero removes it.
    ///
    /// Returns false when the cart holds no such line.
    pub fn set_quantity(&mut self, product: ProductId, quantity: u32) -> Result<bool> {
        if quantity > MAX_LINE_QUANTITY {
            return Err(quantity_too_large());
        }
        let Some(position) = self.items.iter().position(|line| line.product == product) else {
            return Ok(false);
        };
        if quantity == 0 {
            self.items.remove(position);
        } else {
            self.items[position].quantity = quantity;
        }
        Ok(true)
    }

    /// Removes the lines for every listed product. Returns true if any was removed.
    pub fn remove(&mut self, products: &[ProductId]) -> bool {
        let before = self.items.len();
        self.items.retain(|line| !products.contains(&line.product));
        self.items.len() != before
    }
}

/// A cart line with its product resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedCartLine {
    /// The product, or None when it no longer exists.
    pub product: Option<Product>,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A cart as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedCart {
    /// None for the synthetic empty cart.
    pub id: Option<DocumentId>,
    pub user: UserId,
    pub items: Vec<PopulatedCartLine>,
    pub updated_at: DateTime<Utc>,
}

impl PopulatedCart {
    /// The cart of a user who has none.
    pub fn empty(user: UserId) -> Self {
        Self {
            id: None,
            user,
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn line(&self, product: ProductId) -> Option<&PopulatedCartLine> {
        self.items.iter().find(|line| line.product_id == product)
    }
}
