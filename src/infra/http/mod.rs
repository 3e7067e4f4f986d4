//! HTTP surface: router assembly, middleware stack, error mapping.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod state;

pub use rate_limit::ApiRateLimiter;
pub use state::AppState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::idempotency::{capture_responses, idempotency_guard};

/// Build the service router.
///
/// Layer order, outermost first: request context → response logging →
/// response capture → bearer auth → rate limit → idempotency guard →
/// handler. The capture middleware wraps every route; auth and the guard
/// only wrap the report routes, so the health probe stays open.
pub fn build_router(state: AppState) -> Router {
    let reports = Router::new()
        .route("/api/v1/reports/stock", get(handlers::stock_report))
        .route("/api/v1/reports/movements", post(handlers::movements_report))
        .route("/api/v1/reports/orders", post(handlers::orders_report))
        .layer(axum_middleware::from_fn_with_state(
            state.idempotency.clone(),
            idempotency_guard,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .route("/healthz", get(handlers::health))
        .merge(reports)
        .layer(axum_middleware::from_fn_with_state(
            state.idempotency.clone(),
            capture_responses,
        ))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}
