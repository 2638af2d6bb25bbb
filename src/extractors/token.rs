//! Extract the caller's bearer token from the `Authorization` header.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

const BEARER_PREFIX: &str = "Bearer ";

/// Optional bearer token. A missing header or another scheme yields `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BearerToken(pub Option<String>);

impl BearerToken {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| {
                let s = s.trim();
                s.get(..BEARER_PREFIX.len())
                    .filter(|p| p.eq_ignore_ascii_case(BEARER_PREFIX))
                    .map(|_| s[BEARER_PREFIX.len()..].trim().to_string())
            })
            .filter(|s| !s.is_empty());
        Ok(BearerToken(value))
    }
}
