//! Relation expansion: replace reference ids with the referenced records.

use crate::error::AppError;
use crate::service::parse::{PopulatePath, PopulateSpec};
use crate::service::selector::ids_predicate;
use crate::store::{record_id, Collection, FindOptions, Record, Store, ID_FIELD};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Identifier held by a reference value: a plain id string or an already expanded record.
fn reference_id(v: &Value) -> Option<String> {
    let raw = match v {
        Value::String(s) => s.as_str(),
        Value::Object(o) => o.get(ID_FIELD)?.as_str()?,
        _ => return None,
    };
    Uuid::parse_str(raw).ok().map(|u| u.to_string())
}

fn field_mut<'a>(record: &'a mut Record, path: &str) -> Option<&'a mut Value> {
    let mut parts = path.split('.');
    let mut current = record.get_mut(parts.next()?)?;
    for part in parts {
        current = current.as_object_mut()?.get_mut(part)?;
    }
    Some(current)
}

/// Expand `spec` on every record, sequentially, path by path.
pub async fn populate(
    store: &dyn Store,
    collection: &dyn Collection,
    records: &mut [Record],
    spec: &PopulateSpec,
) -> Result<(), AppError> {
    if records.is_empty() || spec.is_empty() {
        return Ok(());
    }
    for record in records.iter_mut() {
        for path in &spec.0 {
            expand(store, collection, record, path).await?;
        }
    }
    Ok(())
}

async fn expand(
    store: &dyn Store,
    collection: &dyn Collection,
    record: &mut Record,
    path: &PopulatePath,
) -> Result<(), AppError> {
    let Some(target_name) = collection.relation(&path.path) else {
        tracing::debug!(collection = %collection.name(), path = %path.path, "populate path is not a relation");
        return Ok(());
    };
    let Some(slot) = field_mut(record, &path.path) else {
        return Ok(());
    };
    let target = store.require(&target_name)?;
    let options = match &path.select {
        Some(p) => FindOptions::projected(p.clone()),
        None => FindOptions::default(),
    };

    let is_list = slot.is_array();
    let ids: Vec<String> = match &*slot {
        Value::Array(items) => items.iter().filter_map(reference_id).collect(),
        Value::Null => return Ok(()),
        single => match reference_id(single) {
            Some(id) => vec![id],
            None => return Ok(()),
        },
    };

    let found = if ids.is_empty() {
        Vec::new()
    } else {
        target.find(&ids_predicate(&ids), &options).await?
    };
    let mut by_id: HashMap<String, Record> = HashMap::with_capacity(found.len());
    for r in found {
        if let Some(id) = record_id(&r).map(str::to_string) {
            by_id.insert(id, r);
        }
    }

    *slot = if is_list {
        Value::Array(
            ids.iter()
                .filter_map(|id| by_id.get(id).cloned())
                .map(Value::Object)
                .collect(),
        )
    } else {
        ids.first()
            .and_then(|id| by_id.remove(id))
            .map(Value::Object)
            .unwrap_or(Value::Null)
    };
    Ok(())
}
