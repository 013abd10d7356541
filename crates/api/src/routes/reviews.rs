//! Review endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{DocumentId, ProductId};
use document_store::DocumentStore;
use domain::{CommerceError, PageRequest, ReviewCheck, ReviewStats, ReviewView};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, parse_id};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub product_id: String,
    pub rating: Option<f64>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<f64>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: &'static str,
}

fn required_rating(rating: Option<f64>) -> Result<f64, ApiError> {
    rating.ok_or_else(|| CommerceError::Validation("rating is required".to_string()).into())
}

/// Reads `page` and `limit` leniently: anything unparseable falls back to
/// the default.
fn page_request(query: &HashMap<String, String>) -> PageRequest {
    let number = |key: &str| query.get(key).and_then(|raw| raw.trim().parse::<i64>().ok());
    PageRequest::new(number("page"), number("limit"))
}

/// GET /reviews/product/:id?page&limit — public review stats for a product.
#[tracing::instrument(skip(state))]
pub async fn product_stats<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ReviewStats>, ApiError> {
    let product: ProductId = parse_id("product", &id)?;
    let stats = state
        .reviews
        .stats_for_product(product, page_request(&query))
        .await?;
    Ok(Json(stats))
}

/// GET /reviews/check/:id — has the caller reviewed this product?
#[tracing::instrument(skip(state))]
pub async fn check<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ReviewCheck>, ApiError> {
    let product: ProductId = parse_id("product", &id)?;
    Ok(Json(state.reviews.check(user, product).await?))
}

/// POST /reviews
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateReviewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReviewView>), ApiError> {
    let Json(req) = payload?;
    let product: ProductId = parse_id("product", &req.product_id)?;
    let rating = required_rating(req.rating)?;
    let review = state
        .reviews
        .create(user, product, rating, req.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// PUT /reviews/:id
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateReviewRequest>, JsonRejection>,
) -> Result<Json<ReviewView>, ApiError> {
    let id: DocumentId = parse_id("review", &id)?;
    let Json(req) = payload?;
    let rating = required_rating(req.rating)?;
    Ok(Json(state.reviews.update(user, id, rating, req.comment).await?))
}

/// DELETE /reviews/:id
#[tracing::instrument(skip(state))]
pub async fn remove<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id: DocumentId = parse_id("review", &id)?;
    state.reviews.remove(user, id).await?;
    Ok(Json(DeletedResponse {
        message: "Review deleted",
    }))
}
