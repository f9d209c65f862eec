//! Router and shared state.

use crate::middleware;
use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use ratline_access::Identity;
use ratline_traffic::{RateLimitStatus, TrafficControl};

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Request budgets, shared across all requests.
    pub traffic: TrafficControl,
}

impl AppState {
    #[must_use]
    pub fn new(traffic: TrafficControl) -> Self {
        Self { traffic }
    }
}

/// Builds the router with the budget middleware applied to every route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rate-limit", get(rate_limit_status))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .with_state(state)
}

/// Reports the caller's remaining budget without counting another request.
#[tracing::instrument(skip_all)]
async fn rate_limit_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Json<RateLimitStatus> {
    Json(state.traffic.check(&identity, false))
}
