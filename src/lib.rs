//! Persistence endpoints: configuration-driven create/find/update/delete over document
//! collections, with token-bound scoping, count limits, relation expansion and reference
//! cleanup.

pub mod auth;
pub mod case;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use auth::{Authorizer, Claims, StaticTokenAuthorizer};
pub use config::{load_from_path, load_from_str, resolve, EndpointConfig, ResolvedEndpoint, Settings};
pub use error::{AppError, AuthError, ConfigError, StoreError, UserError};
pub use routes::{common_routes, persistence_routes};
pub use state::AppState;
pub use store::{Collection, InMemoryCollection, InMemoryStore, PgCollection, PgStore, Record, Store};

use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Health and persistence routes for `endpoints`, with a request body limit.
pub fn build_router(state: AppState, endpoints: Vec<ResolvedEndpoint>, body_limit_bytes: usize) -> Router {
    common_routes(state.clone())
        .merge(persistence_routes(state, endpoints))
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(body_limit_bytes)))
}
