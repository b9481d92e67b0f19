//! # Request Gate
//!
//! Guards the state routes. Handlers that take an [`AuthUser`] never run for
//! a request without a valid bearer token, and since extractors resolve
//! before the body is read, a rejected request never reaches the store.
use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};

use crate::{auth::IdentityService, error::AppError, state::AppState, token::Claims};

/// Verified identity of the caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn user_id(&self) -> i64 {
        self.0.user_id
    }
}

/// Credential part of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub fn authorize(headers: &HeaderMap, identity: &IdentityService) -> Result<Claims, AppError> {
    let token = bearer_token(headers).ok_or(AppError::MissingToken)?;

    identity.validate_token(token)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authorize(&parts.headers, &state.identity).map(AuthUser)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::HeaderValue;

    use super::*;
    use crate::{password::PasswordHasher, store::MemoryStore, token::TokenCodec};

    fn identity() -> (IdentityService, TokenCodec) {
        let tokens = TokenCodec::new(b"gate-secret", Duration::from_secs(60));
        let identity = IdentityService::new(
            Arc::new(MemoryStore::new()),
            PasswordHasher::new(4),
            tokens.clone(),
        );

        (identity, tokens)
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer   abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_missing_token() {
        let (identity, _) = identity();

        assert!(matches!(
            authorize(&HeaderMap::new(), &identity),
            Err(AppError::MissingToken)
        ));
        assert!(matches!(
            authorize(&headers("Bearer"), &identity),
            Err(AppError::MissingToken)
        ));
    }

    #[test]
    fn test_invalid_token() {
        let (identity, _) = identity();
        let foreign = TokenCodec::new(b"other-secret", Duration::from_secs(60))
            .issue(1, "alice")
            .unwrap();

        assert!(matches!(
            authorize(&headers("Bearer garbage"), &identity),
            Err(AppError::InvalidToken(_))
        ));
        assert!(matches!(
            authorize(&headers(&format!("Bearer {foreign}")), &identity),
            Err(AppError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_valid_token() {
        let (identity, tokens) = identity();
        let token = tokens.issue(5, "alice").unwrap();

        let claims = authorize(&headers(&format!("Bearer {token}")), &identity).unwrap();

        assert_eq!(claims.user_id, 5);
        assert_eq!(claims.username, "alice");
    }
}
