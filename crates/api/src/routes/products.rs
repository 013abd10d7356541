//! Catalog endpoints. Reading is public; creating a product needs a caller.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use document_store::DocumentStore;
use domain::{NewProduct, Product};

use crate::{AppState, AuthUser};
use crate::error::{ApiError, parse_id};

/// GET /products — every product, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.catalog.list_products().await?))
}

/// GET /products/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id: ProductId = parse_id("product", &id)?;
    Ok(Json(state.catalog.get_product(id).await?))
}

/// POST /products
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(input) = payload?;
    let product = state.catalog.create_product(input).await?;
    tracing::debug!(%user, product_id = %product.id, "Product created through API");
    Ok((StatusCode::CREATED, Json(product)))
}
