//! Update: four addressing shapes, classified before any store call.

use crate::error::{AppError, UserError};
use crate::service::selector::{id_predicate, ids_predicate};
use crate::service::{parse_sort, Context, RequestInput, Selection, Selector};
use crate::store::{Filter, FindOptions, Record, SortSpec, ID_FIELD};
use serde_json::Value;
use uuid::Uuid;

const BODY_ID_FIELDS: [&str; 2] = [ID_FIELD, "id"];

/// How an update request addresses its records.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateRequest {
    /// Object body carrying its own identifier. Takes precedence over `ids`/`filters`.
    BodyIdentified { id: String, body: Record },
    /// Array body; each element names its own record.
    PerElement(Vec<(String, Record)>),
    ByIds { ids: Vec<String>, body: Record },
    ByFilter { filter: Filter, body: Record },
}

impl UpdateRequest {
    fn is_single(&self) -> bool {
        match self {
            UpdateRequest::BodyIdentified { .. } => true,
            UpdateRequest::ByIds { ids, .. } => ids.len() == 1,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateOutcome {
    pub selection: Selection,
    pub updated_count: u64,
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(o) => o.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Identifier carried by a body object under `_id` or `id`.
fn body_id(body: &Record) -> Result<Option<String>, UserError> {
    let Some(raw) = BODY_ID_FIELDS.iter().find_map(|k| body.get(*k).filter(|v| !v.is_null())) else {
        return Ok(None);
    };
    raw.as_str()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map(|u| Some(u.to_string()))
        .ok_or(UserError::InvalidIdentifier)
}

/// Decide the addressing shape. Pure; nothing is read or written.
pub fn classify(body: Value, ids: Option<&str>, filters: Option<&str>) -> Result<UpdateRequest, UserError> {
    if is_empty_body(&body) {
        return Err(UserError::EmptyBody);
    }
    let selector = Selector::resolve(ids, filters)?;
    match body {
        Value::Object(body) => {
            if let Some(id) = body_id(&body)? {
                return Ok(UpdateRequest::BodyIdentified { id, body });
            }
            match selector {
                Selector::ByIds(ids) => Ok(UpdateRequest::ByIds { ids, body }),
                Selector::ByFilter(filter) => Ok(UpdateRequest::ByFilter { filter, body }),
                Selector::None => Err(UserError::MissingRecordIdentifier),
            }
        }
        Value::Array(items) => {
            if !selector.is_none() {
                return Err(UserError::ArrayBodyWithSelector);
            }
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                let Value::Object(element) = item else {
                    return Err(UserError::InvalidBody);
                };
                let id = body_id(&element)?.ok_or(UserError::MissingElementIdentifier)?;
                elements.push((id, element));
            }
            Ok(UpdateRequest::PerElement(elements))
        }
        _ => Err(UserError::InvalidBody),
    }
}

pub async fn update(ctx: &Context<'_>, body: Value, input: &RequestInput) -> Result<UpdateOutcome, AppError> {
    let request = classify(body, input.ids.as_deref(), input.filters.as_deref())?;
    let sort = match input.sort.as_deref() {
        Some(raw) => parse_sort(raw)?,
        None => None,
    };
    let single = request.is_single();

    let mut updated = Vec::new();
    match request {
        UpdateRequest::BodyIdentified { id, body } => {
            updated.extend(update_by_id(ctx, &id, &body).await?);
        }
        UpdateRequest::ByIds { ids, body } if ids.len() == 1 => {
            updated.extend(update_by_id(ctx, &ids[0], &body).await?);
        }
        UpdateRequest::PerElement(elements) => {
            ctx.guard.check(elements.len() as u64)?;
            for (id, body) in &elements {
                updated.extend(update_by_id(ctx, id, body).await?);
            }
            if let Some(sort) = &sort {
                sort.sort_records(&mut updated);
            }
        }
        UpdateRequest::ByIds { ids, body } => {
            ctx.guard.check(ids.len() as u64)?;
            let predicate = ctx.scoped(ids_predicate(&ids));
            updated = update_matching(ctx, &predicate, &body, sort).await?;
        }
        UpdateRequest::ByFilter { filter, body } => {
            let predicate = ctx.scoped(filter);
            ctx.guard.check(ctx.collection.count(&predicate).await?)?;
            updated = update_matching(ctx, &predicate, &body, sort).await?;
        }
    }

    let updated_count = updated.len() as u64;
    let mut selection = if single {
        Selection::One(updated.pop())
    } else {
        Selection::Many(updated)
    };
    ctx.populate(selection.as_mut_slice(), input.populate.as_deref()).await?;
    tracing::debug!(collection = %ctx.collection.name(), updated_count, "update completed");
    Ok(UpdateOutcome {
        selection,
        updated_count,
    })
}

fn merge(ctx: &Context<'_>, record: &mut Record, body: &Record) {
    for (k, v) in body {
        if BODY_ID_FIELDS.contains(&k.as_str()) {
            continue;
        }
        record.insert(k.clone(), v.clone());
    }
    if let Some(scope) = &ctx.scope {
        scope.assign(record);
    }
}

async fn update_by_id(ctx: &Context<'_>, id: &str, body: &Record) -> Result<Option<Record>, AppError> {
    let predicate = ctx.scoped(id_predicate(id));
    let Some(mut record) = ctx.collection.find_one(&predicate, &FindOptions::default()).await? else {
        return Ok(None);
    };
    merge(ctx, &mut record, body);
    Ok(Some(ctx.collection.save(record).await?))
}

async fn update_matching(
    ctx: &Context<'_>,
    predicate: &Filter,
    body: &Record,
    sort: Option<SortSpec>,
) -> Result<Vec<Record>, AppError> {
    let options = FindOptions {
        sort,
        ..Default::default()
    };
    let records = ctx.collection.find(predicate, &options).await?;
    let mut saved = Vec::with_capacity(records.len());
    for mut record in records {
        merge(ctx, &mut record, body);
        saved.push(ctx.collection.save(record).await?);
    }
    Ok(saved)
}
