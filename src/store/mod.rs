//! Store collaborator: collection traits, shared query types, and the two backends.
//!
//! The engine only talks to [`Store`] and [`Collection`]. Filters are JSON predicate trees
//! passed through verbatim; each backend decides how to evaluate them.

mod matcher;
mod memory;
mod postgres;

pub use matcher::{compare_values, lookup, matches, value_eq};
pub use memory::{InMemoryCollection, InMemoryStore, SaveHook};
pub use postgres::{PgCollection, PgStore};

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier field present on every record.
pub const ID_FIELD: &str = "_id";

/// One stored document: field name to value, always carrying [`ID_FIELD`].
pub type Record = Map<String, Value>;

/// Predicate tree in the store's filter dialect (`$in`, `$or`, ...).
pub type Filter = Map<String, Value>;

/// Returns the record's identifier as a string, if present.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// Put `_id` first, assigning a fresh one when absent. A non-UUID key is a cast failure.
pub(crate) fn with_identifier(mut values: Record) -> Result<Record, StoreError> {
    let id = match values.remove(ID_FIELD) {
        None | Some(Value::Null) => Uuid::new_v4(),
        Some(Value::String(s)) => Uuid::parse_str(&s).map_err(|_| StoreError::Cast(s.clone()))?,
        Some(other) => return Err(StoreError::Cast(other.to_string())),
    };
    let mut record = Record::new();
    record.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    record.extend(values);
    Ok(record)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Ordered list of sort keys; earlier keys take precedence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortSpec(pub Vec<(String, SortDirection)>);

impl SortSpec {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sort records in place. Stable, so equal keys keep insertion order.
    pub fn sort_records(&self, records: &mut [Record]) {
        if self.0.is_empty() {
            return;
        }
        records.sort_by(|a, b| {
            for (field, dir) in &self.0 {
                let ord = compare_values(lookup(a, field), lookup(b, field));
                let ord = match dir {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

/// Field selection: inclusion list, exclusion list, or both (exclusions win).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Projection {
    /// Parse a comma- or space-delimited field list. `-field` excludes. Empty list yields None.
    pub fn parse(list: &str) -> Option<Projection> {
        let mut projection = Projection::default();
        for token in list.split(|c: char| c == ',' || c.is_whitespace()) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if let Some(field) = token.strip_prefix('-') {
                projection.exclude.push(field.to_string());
            } else {
                let field = token.strip_prefix('+').unwrap_or(token);
                projection.include.push(field.to_string());
            }
        }
        if projection.include.is_empty() && projection.exclude.is_empty() {
            None
        } else {
            Some(projection)
        }
    }

    /// Id-only projection used when resolving matches before a delete.
    pub fn id_only() -> Projection {
        Projection {
            include: vec![ID_FIELD.to_string()],
            exclude: Vec::new(),
        }
    }

    /// Returns a copy of `record` narrowed to the selected fields. `_id` is kept unless excluded.
    pub fn apply(&self, record: &Record) -> Record {
        record
            .iter()
            .filter(|(k, _)| {
                if self.exclude.iter().any(|e| e == *k) {
                    return false;
                }
                self.include.is_empty() || k.as_str() == ID_FIELD || self.include.iter().any(|i| i == *k)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub projection: Option<Projection>,
}

impl FindOptions {
    pub fn projected(projection: Projection) -> Self {
        FindOptions {
            projection: Some(projection),
            ..Default::default()
        }
    }
}

/// Field-level write applied to every record matched by `update_many`.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateOp {
    /// Set the field to null.
    Nullify { field: String },
    /// Remove every listed value from an array field.
    PullAll { field: String, values: Vec<Value> },
}

/// One named record set. Implementations serialize their own per-document writes.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Name of the collection referenced by `field`, if the field is a relation.
    fn relation(&self, field: &str) -> Option<String>;

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError>;

    async fn find_one(&self, filter: &Filter, options: &FindOptions) -> Result<Option<Record>, StoreError>;

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Record>, StoreError>;

    /// Insert a record. Assigns `_id` when absent. Store-side hooks run before the write.
    async fn create(&self, values: Record) -> Result<Record, StoreError>;

    /// Persist a full record by `_id`. Store-side hooks run before the write.
    async fn save(&self, record: Record) -> Result<Record, StoreError>;

    async fn delete_one(&self, filter: &Filter) -> Result<u64, StoreError>;

    async fn delete_many(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Returns the number of matched records.
    async fn update_many(&self, filter: &Filter, op: &UpdateOp) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    fn collection(&self, name: &str) -> Option<Arc<dyn Collection>>;

    fn require(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError> {
        self.collection(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn projection_parse_splits_on_commas_and_spaces() {
        let p = Projection::parse("prop1a, prop1b -prop1c").unwrap();
        assert_eq!(p.include, vec!["prop1a", "prop1b"]);
        assert_eq!(p.exclude, vec!["prop1c"]);
        assert!(Projection::parse(" , ").is_none());
    }

    #[test]
    fn inclusion_keeps_id() {
        let r = rec(json!({"_id": "a", "x": 1, "y": 2}));
        let p = Projection::parse("x").unwrap();
        assert_eq!(Value::Object(p.apply(&r)), json!({"_id": "a", "x": 1}));
    }

    #[test]
    fn exclusion_can_drop_id() {
        let r = rec(json!({"_id": "a", "x": 1, "y": 2}));
        let p = Projection::parse("-_id,-y").unwrap();
        assert_eq!(Value::Object(p.apply(&r)), json!({"x": 1}));
    }

    #[test]
    fn sort_spec_orders_by_keys_in_turn() {
        let mut records = vec![
            rec(json!({"_id": "1", "a": 2, "b": "x"})),
            rec(json!({"_id": "2", "a": 1, "b": "z"})),
            rec(json!({"_id": "3", "a": 2, "b": "a"})),
        ];
        SortSpec(vec![("a".into(), SortDirection::Desc), ("b".into(), SortDirection::Asc)])
            .sort_records(&mut records);
        let ids: Vec<_> = records.iter().map(|r| record_id(r).unwrap()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }
}
