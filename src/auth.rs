//! Token verification collaborator.
//!
//! The engine only needs "is this token valid, and what claims does it carry". Anything
//! that can answer that (JWT validation, an introspection endpoint, a fixed table) plugs in
//! through [`Authorizer`].

use crate::error::AuthError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Claims carried by a verified token.
pub type Claims = Map<String, Value>;

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Verify `token` and return its claims.
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// Fixed table of tokens to claims. A numeric `exp` claim (unix seconds) is enforced.
#[derive(Clone, Debug, Default)]
pub struct StaticTokenAuthorizer {
    tokens: HashMap<String, Claims>,
}

impl StaticTokenAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, claims: Claims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }

    /// Build from a JSON object of `{ "<token>": { ...claims } }`.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let tokens: HashMap<String, Claims> = serde_json::from_str(raw)?;
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.tokens.get(token).ok_or(AuthError::Rejected)?;
        if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
            if exp <= Utc::now().timestamp() {
                return Err(AuthError::Expired);
            }
        }
        Ok(claims.clone())
    }
}
