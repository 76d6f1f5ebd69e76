use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// The exam client is served from other origins; no cookies are used.
pub fn exam_client_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(Any)
}
