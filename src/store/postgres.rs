//! PostgreSQL document store: one JSONB table per collection.

use crate::error::StoreError;
use crate::sql::{self, QueryBuf, Table};
use crate::store::{
    record_id, with_identifier, Collection, Filter, FindOptions, Record, SaveHook, Store, UpdateOp, ID_FIELD,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;

/// SQLSTATE for a failed text-to-type cast (e.g. `'abc'::uuid`).
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
const UNIQUE_VIOLATION: &str = "23505";

fn map_db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some(INVALID_TEXT_REPRESENTATION) => return StoreError::Cast(db.message().to_string()),
            Some(UNIQUE_VIOLATION) => return StoreError::DuplicateKey(db.message().to_string()),
            _ => {}
        }
    }
    StoreError::Db(e)
}

fn row_to_record(row: &PgRow) -> Result<Record, StoreError> {
    let id: uuid::Uuid = row.try_get(ID_FIELD)?;
    let doc: Value = row.try_get("doc")?;
    let mut record = Record::new();
    record.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    if let Value::Object(fields) = doc {
        record.extend(fields.into_iter().filter(|(k, _)| k != ID_FIELD));
    }
    Ok(record)
}

/// Document body as stored: everything but `_id`, which has its own column.
fn doc_of(record: &Record) -> Record {
    record
        .iter()
        .filter(|(k, _)| k.as_str() != ID_FIELD)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub struct PgCollection {
    pool: PgPool,
    table: Table,
    relations: HashMap<String, String>,
    save_hook: Option<SaveHook>,
}

impl PgCollection {
    /// Declare `field` as a reference to records of `target`.
    pub fn with_relation(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(field.into(), target.into());
        self
    }

    pub fn with_save_hook(mut self, hook: impl Fn(&mut Record) + Send + Sync + 'static) -> Self {
        self.save_hook = Some(Arc::new(hook));
        self
    }

    async fn fetch(&self, q: &QueryBuf) -> Result<Vec<Record>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_db_err)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let done = query.execute(&self.pool).await.map_err(map_db_err)?;
        Ok(done.rows_affected())
    }

    fn run_hook(&self, record: &mut Record) {
        if let Some(hook) = &self.save_hook {
            hook(record);
        }
    }
}

#[async_trait]
impl Collection for PgCollection {
    fn name(&self) -> &str {
        &self.table.name
    }

    fn relation(&self, field: &str) -> Option<String> {
        self.relations.get(field).cloned()
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        let q = sql::count(&self.table, filter)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let n = query.fetch_one(&self.pool).await.map_err(map_db_err)?;
        Ok(n.max(0) as u64)
    }

    async fn find_one(&self, filter: &Filter, options: &FindOptions) -> Result<Option<Record>, StoreError> {
        let mut options = options.clone();
        options.limit = Some(1);
        Ok(self.find(filter, &options).await?.into_iter().next())
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Record>, StoreError> {
        let q = sql::select(&self.table, filter, options)?;
        let records = self.fetch(&q).await?;
        Ok(match &options.projection {
            Some(p) => records.iter().map(|r| p.apply(r)).collect(),
            None => records,
        })
    }

    async fn create(&self, values: Record) -> Result<Record, StoreError> {
        let mut record = with_identifier(values)?;
        self.run_hook(&mut record);
        let id = record_id(&record).unwrap_or_default().to_string();
        let q = sql::insert(&self.table, &id, &doc_of(&record));
        self.execute(&q).await?;
        Ok(record)
    }

    async fn save(&self, mut record: Record) -> Result<Record, StoreError> {
        let id = record_id(&record)
            .map(str::to_string)
            .ok_or_else(|| StoreError::RecordNotFound("<missing _id>".into()))?;
        self.run_hook(&mut record);
        let q = sql::replace(&self.table, &id, &doc_of(&record));
        if self.execute(&q).await? == 0 {
            return Err(StoreError::RecordNotFound(id));
        }
        Ok(record)
    }

    async fn delete_one(&self, filter: &Filter) -> Result<u64, StoreError> {
        let q = sql::delete(&self.table, filter, true)?;
        self.execute(&q).await
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64, StoreError> {
        let q = sql::delete(&self.table, filter, false)?;
        self.execute(&q).await
    }

    async fn update_many(&self, filter: &Filter, op: &UpdateOp) -> Result<u64, StoreError> {
        let q = sql::update_many(&self.table, filter, op)?;
        self.execute(&q).await
    }
}

/// Collections backed by tables in one schema of one pool.
pub struct PgStore {
    pool: PgPool,
    schema: String,
    collections: HashMap<String, Arc<PgCollection>>,
}

impl PgStore {
    pub async fn connect(database_url: &str, schema: impl Into<String>) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self::new(pool, schema);
        sqlx::query(&sql::create_schema(&store.schema))
            .execute(&store.pool)
            .await?;
        Ok(store)
    }

    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
            collections: HashMap::new(),
        }
    }

    /// Prepare a collection's table (created if missing). Call [`PgStore::register`] to expose it.
    pub async fn collection_builder(&self, name: &str) -> Result<PgCollection, StoreError> {
        let table = Table::new(self.schema.clone(), name);
        let ddl = sql::create_table(&table);
        tracing::debug!(sql = %ddl, "ensure collection table");
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(PgCollection {
            pool: self.pool.clone(),
            table,
            relations: HashMap::new(),
            save_hook: None,
        })
    }

    pub fn register(&mut self, collection: PgCollection) -> Arc<PgCollection> {
        let handle = Arc::new(collection);
        self.collections.insert(handle.table.name.clone(), handle.clone());
        handle
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    fn collection(&self, name: &str) -> Option<Arc<dyn Collection>> {
        self.collections
            .get(name)
            .map(|c| c.clone() as Arc<dyn Collection>)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
