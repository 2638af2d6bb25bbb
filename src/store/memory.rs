//! In-memory document store for tests and the demo server.

use crate::error::StoreError;
use crate::store::{
    matches, record_id, value_eq, with_identifier, Collection, Filter, FindOptions, Record, Store, UpdateOp, ID_FIELD,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Hook run on every create and save, before the record is written.
pub type SaveHook = Arc<dyn Fn(&mut Record) + Send + Sync>;

/// One collection held as an insertion-ordered vector of records.
pub struct InMemoryCollection {
    name: String,
    records: RwLock<Vec<Record>>,
    relations: HashMap<String, String>,
    save_hook: Option<SaveHook>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(Vec::new()),
            relations: HashMap::new(),
            save_hook: None,
        }
    }

    /// Declare `field` as a reference to records of `target`.
    pub fn with_relation(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(field.into(), target.into());
        self
    }

    pub fn with_save_hook(mut self, hook: impl Fn(&mut Record) + Send + Sync + 'static) -> Self {
        self.save_hook = Some(Arc::new(hook));
        self
    }

    /// Copy of every stored record in insertion order.
    pub fn snapshot(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.read()?.clone())
    }

    pub fn len(&self) -> usize {
        self.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Record>>, StoreError> {
        self.records
            .read()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Record>>, StoreError> {
        self.records
            .write()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire write lock: {}", e)))
    }

    fn run_hook(&self, record: &mut Record) {
        if let Some(hook) = &self.save_hook {
            hook(record);
        }
    }

    fn select(&self, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        check_id_casts(filter)?;
        let records = self.read()?;
        let mut out = Vec::new();
        for r in records.iter() {
            if matches(r, filter)? {
                out.push(r.clone());
            }
        }
        Ok(out)
    }
}

/// Reject `_id` operands that are not valid keys, the way a typed store would on cast.
fn check_id_casts(filter: &Filter) -> Result<(), StoreError> {
    for (key, cond) in filter {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                if let Some(items) = cond.as_array() {
                    for f in items.iter().filter_map(Value::as_object) {
                        check_id_casts(f)?;
                    }
                }
            }
            ID_FIELD => check_id_operand(cond)?,
            _ => {}
        }
    }
    Ok(())
}

fn check_id_operand(cond: &Value) -> Result<(), StoreError> {
    match cond {
        Value::String(s) => Uuid::parse_str(s)
            .map(|_| ())
            .map_err(|_| StoreError::Cast(s.clone())),
        Value::Array(items) => items.iter().try_for_each(check_id_operand),
        Value::Object(ops) => {
            for (op, arg) in ops {
                if matches!(op.as_str(), "$eq" | "$ne" | "$in" | "$nin") {
                    check_id_operand(arg)?;
                }
            }
            Ok(())
        }
        Value::Null => Ok(()),
        other => Err(StoreError::Cast(other.to_string())),
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn relation(&self, field: &str) -> Option<String> {
        self.relations.get(field).cloned()
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self.select(filter)?.len() as u64)
    }

    async fn find_one(&self, filter: &Filter, options: &FindOptions) -> Result<Option<Record>, StoreError> {
        let mut options = options.clone();
        options.limit = Some(1);
        Ok(self.find(filter, &options).await?.into_iter().next())
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Record>, StoreError> {
        let mut found = self.select(filter)?;
        if let Some(sort) = &options.sort {
            sort.sort_records(&mut found);
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let page = found.into_iter().skip(skip).take(limit);
        Ok(match &options.projection {
            Some(p) => page.map(|r| p.apply(&r)).collect(),
            None => page.collect(),
        })
    }

    async fn create(&self, values: Record) -> Result<Record, StoreError> {
        let mut record = with_identifier(values)?;
        self.run_hook(&mut record);
        let mut records = self.write()?;
        let id = record_id(&record).unwrap_or_default().to_string();
        if records.iter().any(|r| record_id(r) == Some(id.as_str())) {
            return Err(StoreError::DuplicateKey(id));
        }
        records.push(record.clone());
        tracing::debug!(collection = %self.name, id = %id, "memory create");
        Ok(record)
    }

    async fn save(&self, mut record: Record) -> Result<Record, StoreError> {
        let id = record_id(&record)
            .map(str::to_string)
            .ok_or_else(|| StoreError::RecordNotFound("<missing _id>".into()))?;
        self.run_hook(&mut record);
        let mut records = self.write()?;
        let slot = records
            .iter_mut()
            .find(|r| record_id(r) == Some(id.as_str()))
            .ok_or_else(|| StoreError::RecordNotFound(id.clone()))?;
        *slot = record.clone();
        tracing::debug!(collection = %self.name, id = %id, "memory save");
        Ok(record)
    }

    async fn delete_one(&self, filter: &Filter) -> Result<u64, StoreError> {
        check_id_casts(filter)?;
        let mut records = self.write()?;
        let mut position = None;
        for (i, r) in records.iter().enumerate() {
            if matches(r, filter)? {
                position = Some(i);
                break;
            }
        }
        Ok(match position {
            Some(i) => {
                records.remove(i);
                1
            }
            None => 0,
        })
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64, StoreError> {
        check_id_casts(filter)?;
        let mut records = self.write()?;
        let mut hits = Vec::with_capacity(records.len());
        for r in records.iter() {
            hits.push(matches(r, filter)?);
        }
        let before = records.len();
        let mut hit = hits.into_iter();
        records.retain(|_| !hit.next().unwrap_or(false));
        let deleted = (before - records.len()) as u64;
        tracing::debug!(collection = %self.name, deleted, "memory delete_many");
        Ok(deleted)
    }

    async fn update_many(&self, filter: &Filter, op: &UpdateOp) -> Result<u64, StoreError> {
        check_id_casts(filter)?;
        let mut records = self.write()?;
        let mut matched = 0;
        for r in records.iter_mut() {
            if !matches(r, filter)? {
                continue;
            }
            matched += 1;
            match op {
                UpdateOp::Nullify { field } => {
                    r.insert(field.clone(), Value::Null);
                }
                UpdateOp::PullAll { field, values } => {
                    if let Some(Value::Array(items)) = r.get_mut(field) {
                        items.retain(|item| !values.iter().any(|v| value_eq(item, v)));
                    }
                }
            }
        }
        tracing::debug!(collection = %self.name, matched, op = ?op, "memory update_many");
        Ok(matched)
    }
}

/// Named collections registered up front.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Arc<InMemoryCollection>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection and return a handle to it. Replaces any collection of the same name.
    pub fn register(&self, collection: InMemoryCollection) -> Arc<InMemoryCollection> {
        let handle = Arc::new(collection);
        match self.collections.write() {
            Ok(mut map) => {
                map.insert(handle.name.clone(), handle.clone());
            }
            Err(e) => tracing::error!(error = %e, "collection registry lock poisoned"),
        }
        handle
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn collection(&self, name: &str) -> Option<Arc<dyn Collection>> {
        let map = self.collections.read().ok()?;
        map.get(name).map(|c| c.clone() as Arc<dyn Collection>)
    }
}
