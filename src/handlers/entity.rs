//! Persistence handlers: create, find, update, delete.
//! `ids` arrive as an optional path segment, every other input as a query parameter.

use crate::config::ResolvedOperation;
use crate::error::{AppError, AuthError};
use crate::extractors::BearerToken;
use crate::response::{success_one, success_one_ok};
use crate::service::{self, bind_with_token, Context, RequestInput};
use crate::state::EndpointState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub filters: Option<String>,
    pub sort: Option<String>,
    pub per_page: Option<String>,
    pub page: Option<String>,
    pub select: Option<String>,
    pub populate: Option<String>,
}

fn parse_count(name: &str, raw: Option<&str>) -> Result<Option<u64>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("\"{}\" must be a non-negative integer", name))),
    }
}

impl QueryParams {
    pub fn into_input(self, ids: Option<String>) -> Result<RequestInput, AppError> {
        Ok(RequestInput {
            ids,
            per_page: parse_count("perPage", self.per_page.as_deref())?,
            page: parse_count("page", self.page.as_deref())?,
            filters: self.filters,
            sort: self.sort,
            select: self.select,
            populate: self.populate,
        })
    }
}

/// An empty body is `null`; anything else must be JSON.
fn parse_body(body: &Bytes) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("body is not valid JSON: {}", e)))
}

/// Authenticate (when the route is secure), bind the scope and open the collection.
async fn context<'a>(
    state: &'a EndpointState,
    op: &ResolvedOperation,
    token: &BearerToken,
) -> Result<Context<'a>, AppError> {
    let authorizer = state.app.authorizer.as_ref();
    if op.is_secure {
        let token = token.as_deref().ok_or(AppError::Unauthorized)?;
        authorizer.verify(token).await.map_err(|e| match e {
            AuthError::Unavailable(_) => AppError::Auth(e),
            _ => AppError::Unauthorized,
        })?;
    }
    let scope = bind_with_token(&op.bind_with_token, token.as_deref(), authorizer).await?;
    let collection = state.app.store.require(&state.endpoint.model_name)?;
    Ok(Context::new(state.app.store.as_ref(), collection, op.max, scope))
}

pub async fn create(
    State(state): State<EndpointState>,
    token: BearerToken,
    Query(params): Query<QueryParams>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let input = params.into_input(None)?;
    let body = parse_body(&body)?;
    let ctx = context(&state, &state.endpoint.create, &token).await?;
    let selection = service::create(&ctx, body, &input).await?;
    let mut data = Map::new();
    selection.write_into(&mut data);
    Ok(success_one(data))
}

pub async fn find(
    State(state): State<EndpointState>,
    token: BearerToken,
    ids: Option<Path<String>>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, AppError> {
    let input = params.into_input(ids.map(|Path(ids)| ids))?;
    let ctx = context(&state, &state.endpoint.find, &token).await?;
    let out = service::find(&ctx, &input).await?;
    let mut data = Map::new();
    out.selection.write_into(&mut data);
    data.insert("totalRecords".into(), out.total_records.into());
    data.insert("totalPages".into(), out.total_pages.map(Value::from).unwrap_or(Value::Null));
    if let Some(per_page) = out.per_page {
        data.insert("page".into(), out.page.unwrap_or(1).into());
        data.insert("perPage".into(), per_page.into());
    }
    Ok(success_one_ok(data))
}

pub async fn update(
    State(state): State<EndpointState>,
    token: BearerToken,
    ids: Option<Path<String>>,
    Query(params): Query<QueryParams>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let input = params.into_input(ids.map(|Path(ids)| ids))?;
    let body = parse_body(&body)?;
    let ctx = context(&state, &state.endpoint.update, &token).await?;
    let out = service::update(&ctx, body, &input).await?;
    let mut data = Map::new();
    out.selection.write_into(&mut data);
    data.insert("updatedCount".into(), out.updated_count.into());
    Ok(success_one_ok(data))
}

pub async fn delete(
    State(state): State<EndpointState>,
    token: BearerToken,
    ids: Option<Path<String>>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, AppError> {
    let input = params.into_input(ids.map(|Path(ids)| ids))?;
    let ctx = context(&state, &state.endpoint.delete, &token).await?;
    let deleted_count = service::delete(&ctx, &input, &state.endpoint.remove_refs).await?;
    let mut data = Map::new();
    data.insert("deletedCount".into(), deleted_count.into());
    Ok(success_one_ok(data))
}
