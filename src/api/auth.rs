//! Caller identity.
//!
//! Handlers take a [`CurrentUser`] argument; the extractor asks the
//! configured [`IdentityResolver`] and rejects the request with 401 when it
//! cannot name a caller.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use super::error::ApiError;
use super::routes::AppState;
use crate::error::DatabaseError;
use crate::store::Database;
use crate::tracker::UserIdentity;

/// Resolves the authenticated caller of a request.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` when the request carries no usable identity.
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<UserIdentity>, DatabaseError>;

    /// Message returned with the 401 response.
    fn missing_message(&self) -> String;
}

/// Trusts an email address in a request header and creates the user on
/// first sight.
pub struct HeaderIdentityResolver {
    header: String,
    db: Arc<dyn Database>,
}

impl HeaderIdentityResolver {
    pub fn new(header: impl Into<String>, db: Arc<dyn Database>) -> Self {
        Self {
            header: header.into(),
            db,
        }
    }
}

#[async_trait]
impl IdentityResolver for HeaderIdentityResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<UserIdentity>, DatabaseError> {
        let email = headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        match email {
            Some(email) => self.db.ensure_user(email).await.map(Some),
            None => Ok(None),
        }
    }

    fn missing_message(&self) -> String {
        format!("Missing {}", self.header)
    }
}

/// The caller of the current request.
pub struct CurrentUser(pub UserIdentity);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match state.identity.resolve(&parts.headers).await? {
            Some(user) => Ok(Self(user)),
            None => Err(ApiError::Unauthorized(state.identity.missing_message())),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::store::LibSqlBackend;

    async fn resolver() -> HeaderIdentityResolver {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        HeaderIdentityResolver::new("x-user-email", db)
    }

    #[tokio::test]
    async fn resolves_and_reuses_users() {
        let resolver = resolver().await;
        let mut headers = HeaderMap::new();
        headers.insert("x-user-email", HeaderValue::from_static(" me@example.com "));

        let first = resolver.resolve(&headers).await.unwrap().unwrap();
        let second = resolver.resolve(&headers).await.unwrap().unwrap();
        assert_eq!(first.email, "me@example.com");
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn missing_or_blank_header_is_anonymous() {
        let resolver = resolver().await;
        assert!(resolver.resolve(&HeaderMap::new()).await.unwrap().is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-user-email", HeaderValue::from_static("   "));
        assert!(resolver.resolve(&headers).await.unwrap().is_none());
        assert_eq!(resolver.missing_message(), "Missing x-user-email");
    }
}
