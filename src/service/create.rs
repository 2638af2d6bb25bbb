//! Create: one object or an ordered batch.

use crate::error::{AppError, UserError};
use crate::service::{Context, RequestInput, Selection};
use crate::store::Record;
use serde_json::Value;

pub async fn create(ctx: &Context<'_>, body: Value, input: &RequestInput) -> Result<Selection, AppError> {
    match body {
        Value::Null => Err(UserError::EmptyBody.into()),
        Value::Object(values) => {
            let record = create_one(ctx, values, input).await?;
            Ok(Selection::One(Some(record)))
        }
        Value::Array(items) => {
            ctx.guard.check(items.len() as u64)?;
            let mut batch = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(values) => batch.push(values),
                    _ => return Err(UserError::InvalidBody.into()),
                }
            }
            let mut records = Vec::with_capacity(batch.len());
            for values in batch {
                records.push(create_one(ctx, values, input).await?);
            }
            tracing::debug!(collection = %ctx.collection.name(), count = records.len(), "batch created");
            Ok(Selection::Many(records))
        }
        _ => Err(UserError::InvalidBody.into()),
    }
}

async fn create_one(ctx: &Context<'_>, mut values: Record, input: &RequestInput) -> Result<Record, AppError> {
    if let Some(scope) = &ctx.scope {
        scope.assign(&mut values);
    }
    let record = ctx.collection.create(values).await?;
    let mut one = [record];
    ctx.populate(&mut one, input.populate.as_deref()).await?;
    let [record] = one;
    Ok(record)
}
