//! Selector resolution: `ids` / `filters` input to a single store predicate.

use crate::error::UserError;
use crate::store::{Filter, ID_FIELD};
use serde_json::{json, Value};
use uuid::Uuid;

/// Which records a request targets. `ids` and `filters` are never both active.
#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    /// Normalized identifiers, in request order.
    ByIds(Vec<String>),
    ByFilter(Filter),
    None,
}

fn present(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Split a comma-delimited identifier list, rejecting any segment that is not a valid key.
pub fn parse_ids(raw: &str) -> Result<Vec<String>, UserError> {
    raw.split(',')
        .map(|id| {
            Uuid::parse_str(id.trim())
                .map(|u| u.to_string())
                .map_err(|_| UserError::InvalidIdentifier)
        })
        .collect()
}

pub fn parse_filters(raw: &str) -> Result<Filter, UserError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(filter)) => Ok(filter),
        _ => Err(UserError::UnparsableFilter),
    }
}

impl Selector {
    pub fn resolve(ids: Option<&str>, filters: Option<&str>) -> Result<Selector, UserError> {
        match (present(ids), present(filters)) {
            (Some(_), Some(_)) => Err(UserError::ConflictingSelector),
            (Some(ids), None) => Ok(Selector::ByIds(parse_ids(ids)?)),
            (None, Some(filters)) => Ok(Selector::ByFilter(parse_filters(filters)?)),
            (None, None) => Ok(Selector::None),
        }
    }

    /// One identifier resolves to an equality predicate; the result is a single record.
    pub fn is_single_id(&self) -> bool {
        matches!(self, Selector::ByIds(ids) if ids.len() == 1)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Selector::None)
    }

    /// Base predicate. `None` matches everything.
    pub fn predicate(&self) -> Filter {
        match self {
            Selector::ByIds(ids) if ids.len() == 1 => id_predicate(&ids[0]),
            Selector::ByIds(ids) => ids_predicate(ids),
            Selector::ByFilter(filter) => filter.clone(),
            Selector::None => Filter::new(),
        }
    }
}

pub fn id_predicate(id: &str) -> Filter {
    let mut f = Filter::new();
    f.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    f
}

pub fn ids_predicate(ids: &[String]) -> Filter {
    let mut f = Filter::new();
    f.insert(ID_FIELD.to_string(), json!({ "$in": ids }));
    f
}
