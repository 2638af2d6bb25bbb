//! Record-selection and scoped-mutation engine.
//!
//! Each operation resolves a [`selector::Selector`], layers the request [`scope::Scope`] on
//! top, checks the [`guard::CountGuard`], runs the store calls sequentially and finally
//! expands relations.

pub mod create;
pub mod delete;
pub mod find;
pub mod guard;
pub mod parse;
pub mod populate;
pub mod scope;
pub mod selector;
pub mod update;

pub use create::create;
pub use delete::delete;
pub use find::{find, FindOutcome};
pub use guard::CountGuard;
pub use parse::{parse_sort, PopulatePath, PopulateSpec};
pub use scope::{bind_with_token, Scope};
pub use selector::Selector;
pub use update::{classify, update, UpdateOutcome, UpdateRequest};

use crate::error::AppError;
use crate::store::{Collection, Filter, Record, Store};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Everything one operation needs besides the caller's input.
pub struct Context<'a> {
    pub store: &'a dyn Store,
    pub collection: Arc<dyn Collection>,
    pub guard: CountGuard,
    pub scope: Option<Scope>,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a dyn Store, collection: Arc<dyn Collection>, max: Option<usize>, scope: Option<Scope>) -> Self {
        Self {
            store,
            collection,
            guard: CountGuard::new(max),
            scope,
        }
    }

    pub fn scoped(&self, filter: Filter) -> Filter {
        scope::scoped(filter, self.scope.as_ref())
    }

    /// Expand `raw` populate input on `records`. Absent or blank input is a no-op.
    pub async fn populate(&self, records: &mut [Record], raw: Option<&str>) -> Result<(), AppError> {
        match raw.and_then(PopulateSpec::parse) {
            Some(spec) => populate::populate(self.store, self.collection.as_ref(), records, &spec).await,
            None => Ok(()),
        }
    }
}

/// Caller input shared by all operations. `ids` come from the path, the rest from the query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestInput {
    pub ids: Option<String>,
    pub filters: Option<String>,
    pub sort: Option<String>,
    pub per_page: Option<u64>,
    pub page: Option<u64>,
    pub select: Option<String>,
    pub populate: Option<String>,
}

impl RequestInput {
    pub fn selector(&self) -> Result<Selector, AppError> {
        Ok(Selector::resolve(self.ids.as_deref(), self.filters.as_deref())?)
    }
}

/// A single-record (`record`) or list (`records`) result.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Selection {
    pub fn as_mut_slice(&mut self) -> &mut [Record] {
        match self {
            Selection::One(Some(r)) => std::slice::from_mut(r),
            Selection::One(None) => &mut [],
            Selection::Many(v) => v.as_mut_slice(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Selection::One(r) => usize::from(r.is_some()),
            Selection::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add `record` or `records` to a response body.
    pub fn write_into(self, out: &mut Map<String, Value>) {
        match self {
            Selection::One(r) => {
                out.insert("record".into(), r.map(Value::Object).unwrap_or(Value::Null));
            }
            Selection::Many(v) => {
                out.insert("records".into(), Value::Array(v.into_iter().map(Value::Object).collect()));
            }
        }
    }
}
