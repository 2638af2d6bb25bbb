//! Find: selector, scope and paging to a record or a page of records.

use crate::error::{AppError, UserError};
use crate::service::{parse_sort, Context, RequestInput, Selection};
use crate::store::{FindOptions, Projection};

#[derive(Clone, Debug, PartialEq)]
pub struct FindOutcome {
    pub selection: Selection,
    pub total_records: u64,
    /// Present when the caller paged.
    pub total_pages: Option<u64>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Largest LIMIT/OFFSET the store accepts (PostgreSQL `bigint`).
const MAX_WINDOW: u64 = i64::MAX as u64;

/// Offset of `page` (1-based). Saturates past the end, where no record can exist.
fn page_offset(page: Option<u64>, per_page: u64) -> u64 {
    (page.unwrap_or(1) - 1)
        .checked_mul(per_page)
        .map_or(MAX_WINDOW, |n| n.min(MAX_WINDOW))
}

pub async fn find(ctx: &Context<'_>, input: &RequestInput) -> Result<FindOutcome, AppError> {
    let selector = input.selector()?;
    let per_page = input.per_page.filter(|&n| n > 0);
    let page = input.page.filter(|&n| n > 0);

    if let Some(per_page) = per_page {
        if let Some(max) = ctx.guard.max().filter(|&max| per_page > max as u64) {
            return Err(UserError::MaxExceededPerPage { max }.into());
        }
    }
    if page.is_some() && per_page.is_none() {
        return Err(UserError::MissingPerPage.into());
    }
    let sort = match input.sort.as_deref() {
        Some(raw) => parse_sort(raw)?,
        None => None,
    };

    let predicate = ctx.scoped(selector.predicate());
    let total_records = ctx.collection.count(&predicate).await?;
    if per_page.is_none() {
        ctx.guard.check_page(total_records)?;
    }

    let options = FindOptions {
        sort,
        limit: per_page.map(|n| n.min(MAX_WINDOW)),
        skip: per_page.map(|n| page_offset(page, n)),
        projection: input.select.as_deref().and_then(Projection::parse),
    };

    let mut selection = if selector.is_single_id() {
        Selection::One(ctx.collection.find_one(&predicate, &options).await?)
    } else {
        Selection::Many(ctx.collection.find(&predicate, &options).await?)
    };
    ctx.populate(selection.as_mut_slice(), input.populate.as_deref()).await?;

    tracing::debug!(
        collection = %ctx.collection.name(),
        total_records,
        returned = selection.len(),
        "find completed"
    );
    Ok(FindOutcome {
        selection,
        total_records,
        total_pages: per_page.map(|n| total_records.div_ceil(n)),
        page: per_page.map(|_| page.unwrap_or(1)),
        per_page,
    })
}
