//! Cart endpoints. Every route acts on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::ProductId;
use document_store::DocumentStore;
use domain::{CommerceError, PopulatedCart};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, parse_id};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: String,
    /// Defaults to one.
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub product_id: String,
    pub quantity: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub msg: &'static str,
}

/// GET /cart — the caller's cart, empty if none exists.
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<PopulatedCart>, ApiError> {
    Ok(Json(state.carts.get_cart(user).await?))
}

/// POST /cart/add — adds to the line for the product, creating it if needed.
#[tracing::instrument(skip(state, payload))]
pub async fn add<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<Json<PopulatedCart>, ApiError> {
    let Json(req) = payload?;
    let product: ProductId = parse_id("product", &req.product_id)?;
    let cart = state
        .carts
        .add_item(user, product, req.quantity.unwrap_or(1))
        .await?;
    Ok(Json(cart))
}

/// PUT /cart/update — overwrites a line's quantity; zero removes the line.
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> Result<Json<PopulatedCart>, ApiError> {
    let Json(req) = payload?;
    let product: ProductId = parse_id("product", &req.product_id)?;
    let quantity = req
        .quantity
        .ok_or_else(|| CommerceError::Validation("quantity is required".to_string()))?;
    Ok(Json(state.carts.set_quantity(user, product, quantity).await?))
}

/// DELETE /cart/remove/:product_id
#[tracing::instrument(skip(state))]
pub async fn remove<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(product_id): Path<String>,
) -> Result<Json<PopulatedCart>, ApiError> {
    let product: ProductId = parse_id("product", &product_id)?;
    Ok(Json(state.carts.remove_item(user, product).await?))
}

/// DELETE /cart/clear
#[tracing::instrument(skip(state))]
pub async fn clear<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ClearedResponse>, ApiError> {
    state.carts.clear(user).await?;
    Ok(Json(ClearedResponse {
        msg: "Cart cleared",
    }))
}
