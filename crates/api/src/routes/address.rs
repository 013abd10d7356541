//! Shipping address endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::DocumentId;
use document_store::DocumentStore;
use domain::{Address, AddressFields};
use serde::Serialize;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, parse_id};

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub msg: &'static str,
}

/// GET /address — default first, then newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Address>>, ApiError> {
    Ok(Json(state.addresses.list(user).await?))
}

/// POST /address
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<AddressFields>, JsonRejection>,
) -> Result<(StatusCode, Json<Address>), ApiError> {
    let Json(fields) = payload?;
    let address = state.addresses.create(user, fields).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// PUT /address/:id
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<AddressFields>, JsonRejection>,
) -> Result<Json<Address>, ApiError> {
    let id: DocumentId = parse_id("address", &id)?;
    let Json(fields) = payload?;
    Ok(Json(state.addresses.update(user, id, fields).await?))
}

/// DELETE /address/:id
#[tracing::instrument(skip(state))]
pub async fn remove<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id: DocumentId = parse_id("address", &id)?;
    state.addresses.remove(user, id).await?;
    Ok(Json(DeletedResponse {
        msg: "Address deleted",
    }))
}

/// PATCH /address/:id/default
#[tracing::instrument(skip(state))]
pub async fn set_default<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Address>, ApiError> {
    let id: DocumentId = parse_id("address", &id)?;
    Ok(Json(state.addresses.set_default(user, id).await?))
}
