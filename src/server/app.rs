use axum::Router;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::api::api_routes;

use super::AppState;

/// Upper bound for submitted notification bodies
const MAX_BODY_BYTES: usize = 256 * 1024;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(api_routes(state.clone()))
        // Add middleware
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        // Add state
        .with_state(state)
}
