//! HTTP routing: the telephony WebSocket endpoint plus a minimal
//! health surface.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Wires every route to its handler and attaches the shared state.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/twilio", get(ws_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
