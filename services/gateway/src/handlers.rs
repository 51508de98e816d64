//! Axum handlers for the small HTTP surface next to the WebSocket endpoint.

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// Liveness probe; also reports how many skills are registered.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "skills": state.skills.names().len(),
    }))
}

/// Human-facing index for anyone poking the port with a browser.
pub async fn index() -> &'static str {
    "Switchboard gateway is running. Point the telephony stream at /twilio."
}
