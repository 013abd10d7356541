//! Administrative area lookups for address forms. Public.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use document_store::DocumentStore;
use domain::Area;

use crate::AppState;
use crate::error::ApiError;

/// GET /areas/provinces — every province, by code.
#[tracing::instrument(skip(state))]
pub async fn provinces<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Area>>, ApiError> {
    Ok(Json(state.areas.provinces().await?))
}

/// GET /areas/children/:parent_code — direct children, by code.
#[tracing::instrument(skip(state))]
pub async fn children<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(parent_code): Path<String>,
) -> Result<Json<Vec<Area>>, ApiError> {
    Ok(Json(state.areas.children(&parent_code).await?))
}

/// GET /areas/tree — provinces and cities as one flat list, by code.
#[tracing::instrument(skip(state))]
pub async fn tree<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Area>>, ApiError> {
    Ok(Json(state.areas.tree().await?))
}
