pub mod admin;
pub mod extract;
pub mod health;
pub mod public;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{auth, cors::exam_client_cors, rate_limit};
use crate::AppState;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct RouterLimits {
    pub public_rps: u32,
    pub admin_rps: u32,
}

pub fn router(state: AppState, limits: RouterLimits) -> Router {
    let base_routes = Router::new().route("/health", get(health::health));

    let public_api = Router::new()
        .route(
            "/api/public/exams/:exam_id/attempts",
            post(public::start_attempt),
        )
        .route("/api/public/attempts/:attempt_id", get(public::get_state))
        .route(
            "/api/public/attempts/:attempt_id/answers",
            put(public::save_answers),
        )
        .route(
            "/api/public/attempts/:attempt_id/submit",
            post(public::submit_attempt),
        )
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::RateLimiter::new(limits.public_rps, state.client_ips.clone()),
            rate_limit::rps_middleware,
        ));

    let admin_api = Router::new()
        .route("/api/admin/attempts", get(admin::list_attempts))
        .route("/api/admin/attempts/:attempt_id", get(admin::get_attempt))
        .route(
            "/api/admin/exams/:exam_id/activity",
            get(admin::exam_activity),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_bearer_auth,
        ))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::RateLimiter::new(limits.admin_rps, state.client_ips.clone()),
            rate_limit::rps_middleware,
        ));

    base_routes
        .merge(public_api)
        .merge(admin_api)
        .with_state(state)
        .layer(exam_client_cors())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
