//! Scope binder: pins every read and write of a request to the caller's token claim.

use crate::auth::Authorizer;
use crate::config::BindWithToken;
use crate::error::{AppError, AuthError, UserError};
use crate::store::{lookup, Filter, Record};
use serde_json::{json, Value};

/// `(record field, required value)` derived from a verified token. Fixed for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Scope {
    pub record_key: String,
    pub value: Value,
}

impl Scope {
    /// AND the scope into `filter`. An existing constraint on the same field is kept and combined.
    pub fn apply(&self, mut filter: Filter) -> Filter {
        if !filter.contains_key(&self.record_key) {
            filter.insert(self.record_key.clone(), self.value.clone());
            return filter;
        }
        let mut clause = Filter::new();
        clause.insert(self.record_key.clone(), self.value.clone());
        let mut combined = Filter::new();
        combined.insert("$and".into(), json!([Value::Object(filter), Value::Object(clause)]));
        combined
    }

    /// Write the scope value onto a record (create, and re-pin after update).
    pub fn assign(&self, record: &mut Record) {
        record.insert(self.record_key.clone(), self.value.clone());
    }
}

/// Apply an optional scope to a predicate.
pub fn scoped(filter: Filter, scope: Option<&Scope>) -> Filter {
    match scope {
        Some(s) => s.apply(filter),
        None => filter,
    }
}

/// Resolve the request scope. No keys configured: no scope and no token check.
pub async fn bind_with_token(
    config: &BindWithToken,
    token: Option<&str>,
    authorizer: &dyn Authorizer,
) -> Result<Option<Scope>, AppError> {
    let (token_key, record_key) = match (&config.token_key, &config.record_key) {
        (None, None) => return Ok(None),
        (Some(t), Some(r)) => (t, r),
        _ => return Err(UserError::IncompleteScopeConfig.into()),
    };
    let token = token.ok_or(UserError::InvalidToken)?;
    let claims = match authorizer.verify(token).await {
        Ok(claims) => claims,
        Err(AuthError::Unavailable(e)) => return Err(AppError::Auth(AuthError::Unavailable(e))),
        Err(e) => {
            tracing::debug!(error = %e, "token refused for scoped route");
            return Err(UserError::InvalidToken.into());
        }
    };
    let value = match lookup(&claims, token_key) {
        None | Some(Value::Null) => return Err(UserError::MissingTokenField.into()),
        Some(Value::String(s)) if s.is_empty() => return Err(UserError::MissingTokenField.into()),
        Some(v) => v.clone(),
    };
    tracing::debug!(record_key = %record_key, "request scoped by token");
    Ok(Some(Scope {
        record_key: record_key.clone(),
        value,
    }))
}
