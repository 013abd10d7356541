//! Bearer-token identity resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
use document_store::DocumentStore;
use domain::CommerceError;

use crate::AppState;
use crate::error::ApiError;

/// Maps an opaque bearer token to the user it belongs to.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Returns the user for `token`, or None when the token is unknown.
    async fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Resolves tokens from a fixed table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenResolver {
    pub fn new(tokens: impl IntoIterator<Item = (String, UserId)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, user: UserId) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The authenticated caller. Handlers that take this reject anonymous
/// requests with 401 before touching any service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl<S> FromRequestParts<Arc<AppState<S>>> for AuthUser
where
    S: DocumentStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token);

        let user = match token {
            Some(token) => state.identity.resolve(token).await,
            None => None,
        };

        match user {
            Some(user) => Ok(AuthUser(user)),
            None => {
                metrics::counter!("auth_rejections_total").increment(1);
                tracing::debug!(path = %parts.uri.path(), "Rejected unauthenticated request");
                Err(CommerceError::Unauthenticated.into())
            }
        }
    }
}
