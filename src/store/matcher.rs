//! In-process evaluation of filter trees against records.

use crate::error::StoreError;
use crate::store::{Filter, Record};
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;

/// Resolve a dotted path (`a.b.c`) inside a record.
pub fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = record.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Equality with numeric normalisation (1 == 1.0).
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

/// Total order used for sorting: absent and null first, then by type, then by value.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None | Some(Value::Null)) => Ordering::Greater,
        (Some(a), Some(b)) => compare_present(a, b),
    }
}

/// Cross-type order, same as jsonb: null < string < number < boolean < array < object.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_present(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => {
            let (x, y) = (n.as_f64().unwrap_or(0.0), m.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(s), Value::String(t)) => s.cmp(t),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Same-kind comparison for `$gt`/`$lt` style operators. Mixed kinds never compare.
fn comparable(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) | (Value::Bool(_), Value::Bool(_)) => {
            Some(compare_present(a, b))
        }
        _ => None,
    }
}

/// True when `record` satisfies every clause of `filter`.
pub fn matches(record: &Record, filter: &Filter) -> Result<bool, StoreError> {
    for (key, cond) in filter {
        if !matches_clause(record, key, cond)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(op: &str, cond: &'a Value) -> Result<Vec<&'a Filter>, StoreError> {
    let items = cond
        .as_array()
        .ok_or_else(|| StoreError::InvalidFilter(format!("{} expects an array", op)))?;
    items
        .iter()
        .map(|v| {
            v.as_object()
                .ok_or_else(|| StoreError::InvalidFilter(format!("{} expects an array of objects", op)))
        })
        .collect()
}

fn matches_clause(record: &Record, key: &str, cond: &Value) -> Result<bool, StoreError> {
    match key {
        "$and" => {
            for f in sub_filters(key, cond)? {
                if !matches(record, f)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "$or" => {
            for f in sub_filters(key, cond)? {
                if matches(record, f)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "$nor" => {
            for f in sub_filters(key, cond)? {
                if matches(record, f)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        k if k.starts_with('$') => Err(StoreError::InvalidFilter(format!("unknown top-level operator {}", k))),
        field => {
            let value = lookup(record, field);
            match cond {
                Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => matches_operators(value, ops),
                _ => Ok(field_eq(value, cond)),
            }
        }
    }
}

/// Equality against a possibly array-valued field: arrays match when they contain the target.
fn field_eq(value: Option<&Value>, target: &Value) -> bool {
    match value {
        None => target.is_null(),
        Some(Value::Array(items)) => value_eq(&Value::Array(items.clone()), target) || items.iter().any(|i| value_eq(i, target)),
        Some(v) => value_eq(v, target),
    }
}

fn any_element(value: Option<&Value>, pred: impl Fn(&Value) -> bool) -> bool {
    match value {
        Some(Value::Array(items)) => items.iter().any(&pred),
        Some(v) => pred(v),
        None => false,
    }
}

fn matches_operators(value: Option<&Value>, ops: &serde_json::Map<String, Value>) -> Result<bool, StoreError> {
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => field_eq(value, arg),
            "$ne" => !field_eq(value, arg),
            "$gt" | "$gte" | "$lt" | "$lte" => any_element(value, |v| match comparable(v, arg) {
                Some(ord) => match op.as_str() {
                    "$gt" => ord == Ordering::Greater,
                    "$gte" => ord != Ordering::Less,
                    "$lt" => ord == Ordering::Less,
                    _ => ord != Ordering::Greater,
                },
                None => false,
            }),
            "$in" => {
                let set = arg
                    .as_array()
                    .ok_or_else(|| StoreError::InvalidFilter("$in expects an array".into()))?;
                set.iter().any(|t| field_eq(value, t))
            }
            "$nin" => {
                let set = arg
                    .as_array()
                    .ok_or_else(|| StoreError::InvalidFilter("$nin expects an array".into()))?;
                !set.iter().any(|t| field_eq(value, t))
            }
            "$exists" => {
                let want = arg.as_bool().unwrap_or(true);
                value.is_some() == want
            }
            "$regex" => {
                let pattern = arg
                    .as_str()
                    .ok_or_else(|| StoreError::InvalidFilter("$regex expects a string".into()))?;
                let case_insensitive = ops
                    .get("$options")
                    .and_then(Value::as_str)
                    .map(|o| o.contains('i'))
                    .unwrap_or(false);
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(case_insensitive)
                    .build()
                    .map_err(|e| StoreError::InvalidFilter(format!("$regex: {}", e)))?;
                any_element(value, |v| v.as_str().map(|s| re.is_match(s)).unwrap_or(false))
            }
            "$options" => true,
            other => return Err(StoreError::InvalidFilter(format!("unknown operator {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn filter(v: Value) -> Filter {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn implicit_equality_and_array_containment() {
        let r = rec(json!({"_id": "a", "name": "x", "tags": ["red", "blue"]}));
        assert!(matches(&r, &filter(json!({"name": "x"}))).unwrap());
        assert!(matches(&r, &filter(json!({"tags": "blue"}))).unwrap());
        assert!(!matches(&r, &filter(json!({"tags": "green"}))).unwrap());
    }

    #[test]
    fn in_and_or() {
        let r = rec(json!({"_id": "a", "n": 3}));
        assert!(matches(&r, &filter(json!({"_id": {"$in": ["b", "a"]}}))).unwrap());
        assert!(matches(&r, &filter(json!({"$or": [{"n": 1}, {"n": 3.0}]}))).unwrap());
        assert!(!matches(&r, &filter(json!({"$and": [{"n": 3}, {"_id": "b"}]}))).unwrap());
    }

    #[test]
    fn exists_and_null_equality() {
        let r = rec(json!({"_id": "a", "ref": null}));
        assert!(matches(&r, &filter(json!({"ref": {"$exists": true}}))).unwrap());
        assert!(matches(&r, &filter(json!({"other": {"$exists": false}}))).unwrap());
        assert!(matches(&r, &filter(json!({"other": null}))).unwrap());
    }

    #[test]
    fn comparisons_only_within_kind() {
        let r = rec(json!({"n": 5, "s": "m"}));
        assert!(matches(&r, &filter(json!({"n": {"$gt": 4, "$lte": 5}}))).unwrap());
        assert!(!matches(&r, &filter(json!({"n": {"$gt": "4"}}))).unwrap());
        assert!(matches(&r, &filter(json!({"s": {"$lt": "z"}}))).unwrap());
    }

    #[test]
    fn regex_with_options() {
        let r = rec(json!({"s": "Hello"}));
        assert!(matches(&r, &filter(json!({"s": {"$regex": "^hel", "$options": "i"}}))).unwrap());
        assert!(!matches(&r, &filter(json!({"s": {"$regex": "^hel"}}))).unwrap());
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let r = rec(json!({"s": "x"}));
        assert!(matches(&r, &filter(json!({"s": {"$near": 1}}))).is_err());
        assert!(matches(&r, &filter(json!({"$where": "1"}))).is_err());
    }

    #[test]
    fn nested_lookup() {
        let r = rec(json!({"a": {"b": {"c": 1}}}));
        assert_eq!(lookup(&r, "a.b.c"), Some(&json!(1)));
        assert!(matches(&r, &filter(json!({"a.b.c": 1}))).unwrap());
    }
}
