//! Read-only status snapshot over plain HTTP.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

/// Snapshot of the registry and room index. Tolerates transient
/// inconsistency: a client may appear in `clients` before any room.
async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "totalClients": state.registry.len(),
        "clients": state.registry.ids(),
        "rooms": state.rooms.snapshot(),
    }))
}
