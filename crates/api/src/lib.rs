//! HTTP API server with observability for the storefront commerce layer.
//!
//! Provides REST endpoints for products, carts, checkout, addresses,
//! administrative areas and reviews, with bearer-token identity, structured logging (tracing) and
//! Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{delete, get, patch, post, put};
use document_store::DocumentStore;
use domain::{
    AddressService, AreaService, CartService, CatalogService, CheckoutService, ReadRetry,
    ReviewService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use auth::{AuthUser, IdentityResolver, StaticTokenResolver};

/// Shared application state accessible from all handlers.
pub struct AppState<S: DocumentStore + Clone> {
    pub catalog: CatalogService<S>,
    pub carts: CartService<S>,
    pub checkout: CheckoutService<S>,
    pub addresses: AddressService<S>,
    pub areas: AreaService<S>,
    pub reviews: ReviewService<S>,
    pub identity: Arc<dyn IdentityResolver>,
}

/// Builds the services over `store` and declares the indexes they rely on.
pub async fn create_state<S: DocumentStore + Clone + 'static>(
    store: S,
    identity: Arc<dyn IdentityResolver>,
    retry: ReadRetry,
) -> Result<Arc<AppState<S>>, domain::CommerceError> {
    domain::ensure_indexes(&store).await?;

    Ok(Arc::new(AppState {
        catalog: CatalogService::new(store.clone()).with_read_retry(retry),
        carts: CartService::new(store.clone()).with_read_retry(retry),
        checkout: CheckoutService::new(store.clone()).with_read_retry(retry),
        addresses: AddressService::new(store.clone()).with_read_retry(retry),
        areas: AreaService::new(store.clone()).with_read_retry(retry),
        reviews: ReviewService::new(store).with_read_retry(retry),
        identity,
    }))
}

/// CORS layer for `origin`; `*` allows any origin.
pub fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.trim() {
        "*" => layer.allow_origin(Any),
        origin => match HeaderValue::from_str(origin) {
            Ok(value) => layer.allow_origin(AllowOrigin::exact(value)),
            Err(_) => {
                tracing::warn!(%origin, "Invalid CORS origin, allowing any");
                layer.allow_origin(Any)
            }
        },
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: DocumentStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
    cors: CorsLayer,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/products",
            get(routes::products::list::<S>).post(routes::products::create::<S>),
        )
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart/add", post(routes::cart::add::<S>))
        .route("/cart/update", put(routes::cart::update::<S>))
        .route("/cart/remove/{product_id}", delete(routes::cart::remove::<S>))
        .route("/cart/clear", delete(routes::cart::clear::<S>))
        .route("/orders/checkout", post(routes::orders::checkout::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/address",
            get(routes::address::list::<S>).post(routes::address::create::<S>),
        )
        .route(
            "/address/{id}",
            put(routes::address::update::<S>).delete(routes::address::remove::<S>),
        )
        .route("/address/{id}/default", patch(routes::address::set_default::<S>))
        .route("/areas/provinces", get(routes::areas::provinces::<S>))
        .route("/areas/children/{parent_code}", get(routes::areas::children::<S>))
        .route("/areas/tree", get(routes::areas::tree::<S>))
        .route("/reviews", post(routes::reviews::create::<S>))
        .route(
            "/reviews/{id}",
            put(routes::reviews::update::<S>).delete(routes::reviews::remove::<S>),
        )
        .route("/reviews/product/{id}", get(routes::reviews::product_stats::<S>))
        .route("/reviews/check/{id}", get(routes::reviews::check::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
