use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::health::health;
use super::metrics::prometheus_metrics;
use super::notifications::{get_notification, submit_notification};

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & Metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        // Notification endpoints
        .nest(
            "/api/v1",
            Router::new()
                .route("/notifications", post(submit_notification))
                .route("/notifications/{id}", get(get_notification))
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
