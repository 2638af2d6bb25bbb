//! Persistence routes built from resolved endpoints. Each endpoint gets its own state so
//! handlers never look the configuration up per request.

use crate::config::ResolvedEndpoint;
use crate::handlers::entity::{create, delete as delete_handler, find, update};
use crate::state::{AppState, EndpointState};
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

/// `POST {base}/create`, `GET {base}/find[/:ids]`, `PATCH {base}/update[/:ids]`,
/// `DELETE {base}/delete[/:ids]` for every endpoint.
pub fn persistence_routes(state: AppState, endpoints: Vec<ResolvedEndpoint>) -> Router {
    let mut router = Router::new();
    for endpoint in endpoints {
        let base = endpoint.base_path.clone();
        tracing::info!(model = %endpoint.model_name, base_path = %base, "registering persistence endpoints");
        let endpoint_state = EndpointState {
            app: state.clone(),
            endpoint: Arc::new(endpoint),
        };
        let routes = Router::new()
            .route(&format!("{}/create", base), post(create))
            .route(&format!("{}/find", base), get(find))
            .route(&format!("{}/find/:ids", base), get(find))
            .route(&format!("{}/update", base), patch(update))
            .route(&format!("{}/update/:ids", base), patch(update))
            .route(&format!("{}/delete", base), delete(delete_handler))
            .route(&format!("{}/delete/:ids", base), delete(delete_handler))
            .with_state(endpoint_state);
        router = router.merge(routes);
    }
    router
}
