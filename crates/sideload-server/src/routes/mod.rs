//! HTTP route handlers.

pub mod health;
pub mod sign;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    middleware as axum_mw,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::middleware::assign_identity;
use crate::state::AppState;

/// Creates the public API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/version", get(health::version))
}

/// Creates the full application router with the default upload limit.
pub fn router(state: AppState) -> Router {
    router_with_limit(state, sign::MAX_UPLOAD_BYTES)
}

/// Creates the full application router with a custom request body limit.
pub fn router_with_limit(state: AppState, body_limit: usize) -> Router {
    let dirs = &state.config.work_dirs;
    let signed = ServeDir::new(dirs.signed());
    let manifests = ServeDir::new(dirs.manifests());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route(
            "/sign",
            post(sign::sign).layer(DefaultBodyLimit::max(body_limit)),
        )
        .nest("/api", api_router())
        .nest_service("/signed", signed)
        .nest_service("/plist", manifests)
        .layer(axum_mw::from_fn(assign_identity))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
