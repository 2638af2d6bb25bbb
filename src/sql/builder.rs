//! Builds parameterized statements against document tables.
//!
//! Each collection is one table: `"_id" UUID PRIMARY KEY, doc JSONB, created_at, updated_at`.
//! Identifiers come from configuration only; values are always parameters.

use crate::error::StoreError;
use crate::sql::PgBindValue;
use crate::store::{Filter, FindOptions, Record, SortDirection, UpdateOp, ID_FIELD};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Schema-qualified document table.
#[derive(Clone, Debug)]
pub struct Table {
    pub schema: String,
    pub name: String,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Table {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", quoted(&self.schema), quoted(&self.name))
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// `doc #> '{a,b}'` for a dotted path, with the path bound as a parameter.
    fn field_expr(&mut self, path: &str) -> String {
        let n = self.push_param(PgBindValue::text(path));
        format!("(doc #> string_to_array(${}, '.'))", n)
    }
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema))
}

pub fn create_table(table: &Table) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         \"_id\" UUID PRIMARY KEY, \
         doc JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
         created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
         updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
        table.qualified()
    )
}

/// Compile a filter tree to a boolean SQL expression, pushing its values onto `q`.
pub fn compile_filter(filter: &Filter, q: &mut QueryBuf) -> Result<String, StoreError> {
    let mut parts = Vec::new();
    for (key, cond) in filter {
        parts.push(compile_clause(key, cond, q)?);
    }
    Ok(join_parts(parts, " AND ", "TRUE"))
}

fn join_parts(parts: Vec<String>, sep: &str, empty: &str) -> String {
    match parts.len() {
        0 => empty.to_string(),
        1 => parts.into_iter().next().unwrap_or_default(),
        _ => format!("({})", parts.join(sep)),
    }
}

fn sub_filters<'a>(op: &str, cond: &'a Value) -> Result<Vec<&'a Map<String, Value>>, StoreError> {
    cond.as_array()
        .ok_or_else(|| StoreError::InvalidFilter(format!("{} expects an array", op)))?
        .iter()
        .map(|v| {
            v.as_object()
                .ok_or_else(|| StoreError::InvalidFilter(format!("{} expects an array of objects", op)))
        })
        .collect()
}

fn compile_clause(key: &str, cond: &Value, q: &mut QueryBuf) -> Result<String, StoreError> {
    match key {
        "$and" | "$or" | "$nor" => {
            let mut parts = Vec::new();
            for f in sub_filters(key, cond)? {
                parts.push(compile_filter(f, q)?);
            }
            Ok(match key {
                "$and" => join_parts(parts, " AND ", "TRUE"),
                "$or" => join_parts(parts, " OR ", "FALSE"),
                _ => format!("NOT {}", join_parts(parts, " OR ", "FALSE")),
            })
        }
        k if k.starts_with('$') => Err(StoreError::InvalidFilter(format!("unknown top-level operator {}", k))),
        ID_FIELD => compile_id(cond, q),
        field => {
            let expr = q.field_expr(field);
            match cond {
                Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => compile_operators(&expr, ops, q),
                _ => Ok(field_eq(&expr, cond, q)),
            }
        }
    }
}

fn uuid_param(v: &Value, q: &mut QueryBuf) -> Result<String, StoreError> {
    match v {
        Value::String(s) => Ok(format!("${}::uuid", q.push_param(PgBindValue::text(s.as_str())))),
        other => Err(StoreError::Cast(other.to_string())),
    }
}

fn id_in(items: &Value, q: &mut QueryBuf) -> Result<String, StoreError> {
    let items = items
        .as_array()
        .ok_or_else(|| StoreError::InvalidFilter("$in expects an array".into()))?;
    if items.is_empty() {
        return Ok("FALSE".into());
    }
    let mut placeholders = Vec::with_capacity(items.len());
    for v in items {
        placeholders.push(uuid_param(v, q)?);
    }
    Ok(format!("\"_id\" IN ({})", placeholders.join(", ")))
}

/// `_id` lives in its own UUID column; invalid keys fail the cast server-side.
fn compile_id(cond: &Value, q: &mut QueryBuf) -> Result<String, StoreError> {
    let ops = match cond {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => ops,
        Value::Null => return Ok("FALSE".into()),
        v => return Ok(format!("\"_id\" = {}", uuid_param(v, q)?)),
    };
    let mut parts = Vec::new();
    for (op, arg) in ops {
        parts.push(match op.as_str() {
            "$eq" => format!("\"_id\" = {}", uuid_param(arg, q)?),
            "$ne" => format!("\"_id\" <> {}", uuid_param(arg, q)?),
            "$in" => id_in(arg, q)?,
            "$nin" => format!("NOT {}", id_in(arg, q)?),
            "$exists" => (if arg.as_bool().unwrap_or(true) { "TRUE" } else { "FALSE" }).to_string(),
            other => return Err(StoreError::InvalidFilter(format!("operator {} not supported on _id", other))),
        });
    }
    Ok(join_parts(parts, " AND ", "TRUE"))
}

/// Equality that also matches array fields containing the value. Never NULL.
fn field_eq(expr: &str, v: &Value, q: &mut QueryBuf) -> String {
    if v.is_null() {
        return format!("({} IS NULL OR {} = 'null'::jsonb)", expr, expr);
    }
    let n = q.push_param(PgBindValue::Json(v.clone()));
    format!(
        "COALESCE({e} = ${n}::jsonb OR (jsonb_typeof({e}) = 'array' AND {e} @> jsonb_build_array(${n}::jsonb)), FALSE)",
        e = expr,
        n = n
    )
}

fn field_in(expr: &str, arg: &Value, op: &str, q: &mut QueryBuf) -> Result<String, StoreError> {
    let items = arg
        .as_array()
        .ok_or_else(|| StoreError::InvalidFilter(format!("{} expects an array", op)))?;
    let parts = items.iter().map(|v| field_eq(expr, v, q)).collect();
    Ok(join_parts(parts, " OR ", "FALSE"))
}

fn compile_operators(expr: &str, ops: &Map<String, Value>, q: &mut QueryBuf) -> Result<String, StoreError> {
    let mut parts = Vec::new();
    for (op, arg) in ops {
        let part = match op.as_str() {
            "$eq" => field_eq(expr, arg, q),
            "$ne" => format!("NOT {}", field_eq(expr, arg, q)),
            "$gt" | "$gte" | "$lt" | "$lte" => {
                let sym = match op.as_str() {
                    "$gt" => ">",
                    "$gte" => ">=",
                    "$lt" => "<",
                    _ => "<=",
                };
                let n = q.push_param(PgBindValue::Json(arg.clone()));
                format!(
                    "COALESCE(jsonb_typeof({e}) = jsonb_typeof(${n}::jsonb) AND {e} {s} ${n}::jsonb, FALSE)",
                    e = expr,
                    n = n,
                    s = sym
                )
            }
            "$in" => field_in(expr, arg, op, q)?,
            "$nin" => format!("NOT {}", field_in(expr, arg, op, q)?),
            "$exists" => {
                if arg.as_bool().unwrap_or(true) {
                    format!("{} IS NOT NULL", expr)
                } else {
                    format!("{} IS NULL", expr)
                }
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
                let n = q.push_param(PgBindValue::text(pattern));
                format!(
                    "COALESCE(jsonb_typeof({e}) = 'string' AND ({e} #>> '{{}}') {op} ${n}, FALSE)",
                    e = expr,
                    op = if case_insensitive { "~*" } else { "~" },
                    n = n
                )
            }
            "$options" => continue,
            other => return Err(StoreError::InvalidFilter(format!("unknown operator {}", other))),
        };
        parts.push(part);
    }
    Ok(join_parts(parts, " AND ", "TRUE"))
}

fn order_clause(options: &FindOptions, q: &mut QueryBuf) -> String {
    let mut keys = Vec::new();
    if let Some(sort) = &options.sort {
        for (field, dir) in &sort.0 {
            let expr = if field == ID_FIELD { quoted(ID_FIELD) } else { q.field_expr(field) };
            keys.push(match dir {
                SortDirection::Asc => format!("{} ASC NULLS FIRST", expr),
                SortDirection::Desc => format!("{} DESC NULLS LAST", expr),
            });
        }
    }
    keys.push("created_at".into());
    keys.push(quoted(ID_FIELD));
    format!(" ORDER BY {}", keys.join(", "))
}

/// SELECT "_id", doc with filter, sort, LIMIT and OFFSET. Projection is applied by the caller.
pub fn select(table: &Table, filter: &Filter, options: &FindOptions) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let cond = compile_filter(filter, &mut q)?;
    let order = order_clause(options, &mut q);
    let limit = options.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset = options.skip.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT \"_id\", doc FROM {} WHERE {}{}{}{}",
        table.qualified(),
        cond,
        order,
        limit,
        offset
    );
    Ok(q)
}

pub fn count(table: &Table, filter: &Filter) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let cond = compile_filter(filter, &mut q)?;
    q.sql = format!("SELECT COUNT(*) FROM {} WHERE {}", table.qualified(), cond);
    Ok(q)
}

/// INSERT one document. `doc` must not carry `_id`.
pub fn insert(table: &Table, id: &str, doc: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_n = q.push_param(PgBindValue::text(id));
    let doc_n = q.push_param(PgBindValue::Json(Value::Object(doc.clone())));
    q.sql = format!(
        "INSERT INTO {} (\"_id\", doc) VALUES (${}::uuid, ${}::jsonb)",
        table.qualified(),
        id_n,
        doc_n
    );
    q
}

/// Replace the document of one record.
pub fn replace(table: &Table, id: &str, doc: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let doc_n = q.push_param(PgBindValue::Json(Value::Object(doc.clone())));
    let id_n = q.push_param(PgBindValue::text(id));
    q.sql = format!(
        "UPDATE {} SET doc = ${}::jsonb, updated_at = NOW() WHERE \"_id\" = ${}::uuid",
        table.qualified(),
        doc_n,
        id_n
    );
    q
}

/// DELETE matching rows; `first_only` limits it to the first row in natural order.
pub fn delete(table: &Table, filter: &Filter, first_only: bool) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let cond = compile_filter(filter, &mut q)?;
    let t = table.qualified();
    q.sql = if first_only {
        format!(
            "DELETE FROM {t} WHERE \"_id\" IN (SELECT \"_id\" FROM {t} WHERE {c} ORDER BY created_at, \"_id\" LIMIT 1)",
            t = t,
            c = cond
        )
    } else {
        format!("DELETE FROM {} WHERE {}", t, cond)
    };
    Ok(q)
}

/// UPDATE every matching row with a field-level op. Affected rows equal matched rows.
pub fn update_many(table: &Table, filter: &Filter, op: &UpdateOp) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let set = match op {
        UpdateOp::Nullify { field } => {
            let p = q.push_param(PgBindValue::text(field.as_str()));
            format!("jsonb_set(doc, string_to_array(${p}, '.'), 'null'::jsonb, true)", p = p)
        }
        UpdateOp::PullAll { field, values } => {
            let p = q.push_param(PgBindValue::text(field.as_str()));
            let v = q.push_param(PgBindValue::Json(Value::Array(values.clone())));
            format!(
                "CASE WHEN jsonb_typeof(doc #> string_to_array(${p}, '.')) = 'array' \
                 THEN jsonb_set(doc, string_to_array(${p}, '.'), COALESCE(\
                 (SELECT jsonb_agg(e.value ORDER BY e.ord) \
                 FROM jsonb_array_elements(doc #> string_to_array(${p}, '.')) WITH ORDINALITY AS e(value, ord) \
                 WHERE NOT (${v}::jsonb @> jsonb_build_array(e.value))), '[]'::jsonb)) \
                 ELSE doc END",
                p = p,
                v = v
            )
        }
    };
    let cond = compile_filter(filter, &mut q)?;
    q.sql = format!(
        "UPDATE {} SET doc = {}, updated_at = NOW() WHERE {}",
        table.qualified(),
        set,
        cond
    );
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortSpec;
    use serde_json::json;

    fn filter(v: Value) -> Filter {
        v.as_object().cloned().unwrap()
    }

    fn table() -> Table {
        Table::new("public", "Test1")
    }

    #[test]
    fn empty_filter_is_true() {
        let q = count(&table(), &Filter::new()).unwrap();
        assert_eq!(q.sql, "SELECT COUNT(*) FROM \"public\".\"Test1\" WHERE TRUE");
        assert!(q.params.is_empty());
    }

    #[test]
    fn id_equality_and_in_use_uuid_casts() {
        let mut q = QueryBuf::new();
        let sql = compile_filter(&filter(json!({"_id": {"$in": ["a", "b"]}})), &mut q).unwrap();
        assert_eq!(sql, "\"_id\" IN ($1::uuid, $2::uuid)");
        assert_eq!(q.params, vec![PgBindValue::text("a"), PgBindValue::text("b")]);

        let mut q = QueryBuf::new();
        let sql = compile_filter(&filter(json!({"_id": "a"})), &mut q).unwrap();
        assert_eq!(sql, "\"_id\" = $1::uuid");
    }

    #[test]
    fn non_string_id_is_a_cast_error() {
        let mut q = QueryBuf::new();
        let err = compile_filter(&filter(json!({"_id": 5})), &mut q).unwrap_err();
        assert!(matches!(err, StoreError::Cast(_)));
    }

    #[test]
    fn field_equality_covers_array_containment() {
        let mut q = QueryBuf::new();
        let sql = compile_filter(&filter(json!({"tags": "red"})), &mut q).unwrap();
        assert_eq!(
            sql,
            "COALESCE((doc #> string_to_array($1, '.')) = $2::jsonb OR \
             (jsonb_typeof((doc #> string_to_array($1, '.'))) = 'array' AND \
             (doc #> string_to_array($1, '.')) @> jsonb_build_array($2::jsonb)), FALSE)"
        );
        assert_eq!(q.params[1], PgBindValue::Json(json!("red")));
    }

    #[test]
    fn nested_logical_operators() {
        let mut q = QueryBuf::new();
        let sql = compile_filter(
            &filter(json!({"$and": [{"owner": {"$exists": true}}, {"$or": []}]})),
            &mut q,
        )
        .unwrap();
        assert_eq!(sql, "((doc #> string_to_array($1, '.')) IS NOT NULL AND FALSE)");
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let mut q = QueryBuf::new();
        assert!(compile_filter(&filter(json!({"x": {"$near": 1}})), &mut q).is_err());
    }

    #[test]
    fn select_orders_and_pages() {
        let options = FindOptions {
            sort: Some(SortSpec(vec![("n".into(), SortDirection::Desc)])),
            limit: Some(10),
            skip: Some(20),
            projection: None,
        };
        let q = select(&table(), &Filter::new(), &options).unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"_id\", doc FROM \"public\".\"Test1\" WHERE TRUE ORDER BY \
             (doc #> string_to_array($1, '.')) DESC NULLS LAST, created_at, \"_id\" LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn delete_one_limits_to_first_row() {
        let q = delete(&table(), &filter(json!({"_id": "a"})), true).unwrap();
        assert!(q.sql.starts_with("DELETE FROM \"public\".\"Test1\" WHERE \"_id\" IN (SELECT"));
        assert!(q.sql.ends_with("LIMIT 1)"));
    }

    #[test]
    fn nullify_binds_field_before_filter() {
        let q = update_many(&table(), &filter(json!({"ref": {"$in": ["x"]}})), &UpdateOp::Nullify { field: "ref".into() }).unwrap();
        assert!(q.sql.starts_with("UPDATE \"public\".\"Test1\" SET doc = jsonb_set(doc, string_to_array($1, '.'), 'null'::jsonb, true)"));
        assert_eq!(q.params[0], PgBindValue::text("ref"));
        assert_eq!(q.params[1], PgBindValue::text("ref"));
        assert_eq!(q.params[2], PgBindValue::Json(json!("x")));
    }
}
