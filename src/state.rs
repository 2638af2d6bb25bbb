//! Shared application state for all routes.

use crate::auth::Authorizer;
use crate::config::ResolvedEndpoint;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self { store, authorizer }
    }
}

/// State of one endpoint's routes: the shared handles plus its resolved configuration.
#[derive(Clone)]
pub struct EndpointState {
    pub app: AppState,
    pub endpoint: Arc<ResolvedEndpoint>,
}
