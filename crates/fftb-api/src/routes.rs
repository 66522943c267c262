//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    add_order, allocate_input_storage_claim, allocate_output_storage_claim, allocate_segment,
    cancel_order, create_authority, create_session, find_free_segment, get_input_storage_claim,
    get_order, get_output_storage_claim, get_segment, health, list_orders, list_segments,
    notify_segment, queued_segments_count, ready, segment_action,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, IpRateLimiter};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let auth_limiter = IpRateLimiter::new(state.config.auth_rate_limit_rps);

    // Unauthenticated, so rate-limited
    let auth_routes = Router::new()
        .route("/authorities", post(create_authority))
        .route("/sessions", post(create_session))
        .layer(middleware::from_fn_with_state(auth_limiter, rate_limit_middleware));

    let segment_routes = Router::new()
        .route("/segments", post(allocate_segment).get(list_segments))
        .route("/segments/free", post(find_free_segment))
        .route("/segments/queued_count", get(queued_segments_count))
        .route("/segments/:id", get(get_segment))
        .route(
            "/segments/:id/input_storage_claim",
            post(allocate_input_storage_claim).get(get_input_storage_claim),
        )
        .route(
            "/segments/:id/output_storage_claim",
            post(allocate_output_storage_claim).get(get_output_storage_claim),
        )
        .route("/segments/:id/actions/:action", post(segment_action))
        .route("/segments/:id/notify", post(notify_segment));

    let order_routes = Router::new()
        .route("/orders", post(add_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/actions/cancel", post(cancel_order));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(auth_routes)
        .merge(segment_routes)
        .merge(order_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
