//! Checkout and order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::DocumentId;
use document_store::DocumentStore;
use domain::PopulatedOrder;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, parse_id};

/// Header carrying the client-chosen checkout idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|key| Some(key.to_string()))
            .map_err(|_| ApiError::BadRequest("Idempotency-Key must be visible ASCII".to_string())),
    }
}

/// POST /orders/checkout — turns the caller's cart into a pending order.
#[tracing::instrument(skip(state, headers))]
pub async fn checkout<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<PopulatedOrder>), ApiError> {
    let key = idempotency_key(&headers)?;
    let order = state.checkout.checkout(user, key).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders — the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<PopulatedOrder>>, ApiError> {
    Ok(Json(state.checkout.list_orders(user).await?))
}

/// GET /orders/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PopulatedOrder>, ApiError> {
    let id: DocumentId = parse_id("order", &id)?;
    Ok(Json(state.checkout.get_order(user, id).await?))
}
