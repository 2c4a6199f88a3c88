//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the websocket endpoint and the small monitoring API under one Axum
//! router. When `STATIC_DIR` is configured, the canvas client is served from
//! it for every path the API does not claim.

pub mod stats;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/api/stats", get(stats::stats))
        .route("/api/rooms", get(stats::list_rooms))
        .route("/healthz", get(healthz));

    if let Some(dir) = &state.config.static_dir {
        router = router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
