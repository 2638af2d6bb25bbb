//! Delete by ids or filter, followed by reference cleanup in dependent collections.

use crate::config::RemoveRef;
use crate::error::{AppError, UserError};
use crate::service::selector::ids_predicate;
use crate::service::{Context, RequestInput, Selector};
use crate::store::{lookup, record_id, Filter, FindOptions, Projection, UpdateOp};
use serde_json::{json, Value};

/// Delete the selected records. Returns the number removed from the primary collection.
pub async fn delete(ctx: &Context<'_>, input: &RequestInput, remove_refs: &[RemoveRef]) -> Result<u64, AppError> {
    let selector = input.selector()?;
    let id_only = FindOptions::projected(Projection::id_only());

    let (deleted_count, deleted_ids) = match selector {
        Selector::None => return Err(UserError::MissingSelector.into()),
        Selector::ByIds(ids) => {
            ctx.guard.check(ids.len() as u64)?;
            let single = ids.len() == 1;
            let predicate = ctx.scoped(ids_predicate(&ids));
            let matched = matched_ids(ctx, &predicate, &id_only).await?;
            let n = if single {
                ctx.collection.delete_one(&predicate).await?
            } else {
                ctx.collection.delete_many(&predicate).await?
            };
            (n, matched)
        }
        Selector::ByFilter(filter) => {
            let matched = matched_ids(ctx, &ctx.scoped(filter), &id_only).await?;
            ctx.guard.check(matched.len() as u64)?;
            let n = if matched.is_empty() {
                0
            } else {
                ctx.collection.delete_many(&ctx.scoped(ids_predicate(&matched))).await?
            };
            (n, matched)
        }
    };

    tracing::debug!(collection = %ctx.collection.name(), deleted_count, "delete completed");
    if deleted_count > 0 {
        for reference in remove_refs {
            remove_references(ctx, reference, &deleted_ids).await?;
        }
    }
    Ok(deleted_count)
}

async fn matched_ids(ctx: &Context<'_>, predicate: &Filter, options: &FindOptions) -> Result<Vec<String>, AppError> {
    let found = ctx.collection.find(predicate, options).await?;
    Ok(found.iter().filter_map(record_id).map(str::to_string).collect())
}

/// Strip `ids` from `reference.field` in `reference.model_name`: pulled from arrays, nulled otherwise.
/// The field's shape is read from the first record that has it.
async fn remove_references(ctx: &Context<'_>, reference: &RemoveRef, ids: &[String]) -> Result<(), AppError> {
    let target = ctx.store.require(&reference.model_name)?;
    let mut present = Filter::new();
    present.insert(reference.field.clone(), json!({ "$exists": true }));
    let present = ctx.scoped(present);

    let Some(probe) = target.find_one(&present, &FindOptions::default()).await? else {
        tracing::warn!(
            collection = %reference.model_name,
            field = %reference.field,
            "no record holds the reference field; cleanup skipped"
        );
        return Ok(());
    };

    let ids: Vec<Value> = ids.iter().cloned().map(Value::String).collect();
    let touched = if matches!(lookup(&probe, &reference.field), Some(Value::Array(_))) {
        let op = UpdateOp::PullAll {
            field: reference.field.clone(),
            values: ids,
        };
        target.update_many(&present, &op).await?
    } else {
        let mut holding = Filter::new();
        holding.insert(reference.field.clone(), json!({ "$in": ids }));
        let op = UpdateOp::Nullify {
            field: reference.field.clone(),
        };
        target.update_many(&ctx.scoped(holding), &op).await?
    };
    tracing::debug!(collection = %reference.model_name, field = %reference.field, touched, "references removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Scope;
    use crate::store::{Collection, InMemoryCollection, InMemoryStore, Record};
    use std::sync::Arc;

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    struct Fixture {
        store: InMemoryStore,
        primary: Arc<dyn Collection>,
        holders: Arc<dyn Collection>,
        ids: Vec<String>,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let primary = store.register(InMemoryCollection::new("Test1"));
        let holders = store.register(InMemoryCollection::new("Test2"));
        let mut ids = Vec::new();
        for (i, owner) in ["u1", "u1", "u1", "u2"].iter().enumerate() {
            let r = primary.create(rec(json!({"prop1": i, "owner": owner}))).await.unwrap();
            ids.push(record_id(&r).unwrap().to_string());
        }
        holders
            .create(rec(json!({"many": [ids[0], ids[1], ids[2]], "one": ids[0]})))
            .await
            .unwrap();
        let primary: Arc<dyn Collection> = primary;
        let holders: Arc<dyn Collection> = holders;
        Fixture { store, primary, holders, ids }
    }

    fn refs() -> Vec<RemoveRef> {
        vec![
            RemoveRef { model_name: "Test2".into(), field: "many".into() },
            RemoveRef { model_name: "Test2".into(), field: "one".into() },
        ]
    }

    #[tokio::test]
    async fn deleting_ids_cleans_array_and_single_references() {
        let f = fixture().await;
        let ctx = Context::new(&f.store, f.primary.clone(), None, None);
        let input = RequestInput { ids: Some(format!("{},{}", f.ids[0], f.ids[1])), ..Default::default() };
        assert_eq!(delete(&ctx, &input, &refs()).await.unwrap(), 2);

        let holder = f.holders.find_one(&Filter::new(), &FindOptions::default()).await.unwrap().unwrap();
        assert_eq!(holder["many"], json!([f.ids[2]]));
        assert_eq!(holder["one"], Value::Null);
    }

    #[tokio::test]
    async fn filter_delete_removes_all_matches() {
        let f = fixture().await;
        let ctx = Context::new(&f.store, f.primary.clone(), None, None);
        let input = RequestInput { filters: Some(r#"{"owner": "u1"}"#.into()), ..Default::default() };
        assert_eq!(delete(&ctx, &input, &[]).await.unwrap(), 3);
        assert_eq!(f.primary.count(&Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn over_max_deletes_nothing() {
        let f = fixture().await;
        let ctx = Context::new(&f.store, f.primary.clone(), Some(2), None);
        let input = RequestInput { filters: Some("{}".into()), ..Default::default() };
        let err = delete(&ctx, &input, &refs()).await.unwrap_err();
        assert!(matches!(err, AppError::User(UserError::MaxExceeded { max: 2 })));
        assert_eq!(f.primary.count(&Filter::new()).await.unwrap(), 4);

        let input = RequestInput { ids: Some(f.ids[..3].join(",")), ..Default::default() };
        assert!(delete(&ctx, &input, &refs()).await.is_err());
        assert_eq!(f.primary.count(&Filter::new()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn scope_protects_other_owners() {
        let f = fixture().await;
        let scope = Scope { record_key: "owner".into(), value: json!("u1") };
        let ctx = Context::new(&f.store, f.primary.clone(), None, Some(scope));
        let input = RequestInput { ids: Some(f.ids[3].clone()), ..Default::default() };
        assert_eq!(delete(&ctx, &input, &[]).await.unwrap(), 0);
        assert_eq!(f.primary.count(&Filter::new()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn missing_selector_is_refused() {
        let f = fixture().await;
        let ctx = Context::new(&f.store, f.primary.clone(), None, None);
        let err = delete(&ctx, &RequestInput::default(), &[]).await.unwrap_err();
        assert!(matches!(err, AppError::User(UserError::MissingSelector)));
    }
}
