//! Product catalog.
//!
//! Products are read-only from the point of view of carts and checkout;
//! the catalog service only exists so there is something to resolve.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{DocumentId, ProductId};
use document_store::{
    Document, DocumentStore, DocumentStoreExt, Filter, FindOptions, Sort,
};
use serde::{Deserialize, Serialize};

use crate::error::{CommerceError, Result};
use crate::money::Money;
use crate::retry::ReadRetry;

/// Stock assigned to products created without one.
pub const DEFAULT_STOCK: i64 = 100;

/// Highest accepted unit price, in cents.
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

fn default_stock() -> i64 {
    DEFAULT_STOCK
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_stock")]
    pub stock: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Document for Product {
    const COLLECTION: &'static str = "products";

    fn id(&self) -> DocumentId {
        self.id.into()
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Price in cents.
    pub price: i64,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            name: name.into(),
            price: price.cents(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CommerceError::Validation("name is required".to_string()));
        }
        if self.price < 0 {
            return Err(CommerceError::Validation(
                "price must not be negative".to_string(),
            ));
        }
        if self.price > MAX_PRICE_CENTS {
            return Err(CommerceError::Validation(format!(
                "price must not exceed {MAX_PRICE_CENTS} cents"
            )));
        }
        if self.stock.is_some_and(|stock| stock < 0) {
            return Err(CommerceError::Validation(
                "stock must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads the given products, keyed by id. Missing ids are simply absent.
pub(crate) async fn products_by_id<S: DocumentStore>(
    store: &S,
    retry: &ReadRetry,
    mut ids: Vec<ProductId>,
) -> Result<HashMap<ProductId, Product>> {
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let filter = Filter::new().any_of("id", ids);
    let products = retry
        .run("products_by_id", || {
            store.find_documents::<Product>(&filter, FindOptions::new())
        })
        .await?;

    Ok(products.into_iter().map(|p| (p.id, p)).collect())
}

/// Service for browsing and seeding the catalog.
#[derive(Clone)]
pub struct CatalogService<S: DocumentStore> {
    store: S,
    retry: ReadRetry,
}

impl<S: DocumentStore> CatalogService<S> {
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

    /// Lists every product, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let all = Filter::new();
        let products = self
            .retry
            .run("list_products", || {
                self.store.find_documents::<Product>(
                    &all,
                    FindOptions::new().sort(Sort::oldest_first()),
                )
            })
            .await?;
        Ok(products)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.retry
            .run("get_product", || {
                self.store.get_document::<Product>(id.into())
            })
            .await?
            .ok_or_else(|| CommerceError::not_found("product", id))
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        input.validate()?;

        let product = Product {
            id: ProductId::new(),
            name: input.name.trim().to_string(),
            description: input.description,
            price: Money::from_cents(input.price),
            image: input.image,
            stock: input.stock.unwrap_or(DEFAULT_STOCK),
            tags: input.tags,
            created_at: Utc::now(),
        };
        self.store.insert_document(&product).await?;

        tracing::info!(product_id = %product.id, price = %product.price, "Product created");
        Ok(product)
    }
}
