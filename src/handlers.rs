use axum::{
    extract::Path,
    response::{Html, Json},
};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::pages;
use crate::session::generate_session_id;

/// Field names match what the landing page script reads.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub session_id: String,
    pub message: String,
}

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET / - static landing page
pub async fn landing() -> Html<&'static str> {
    Html(pages::landing_page())
}

/// GET /api/generate - mint a session id
pub async fn generate_session() -> Json<GenerateResponse> {
    let session_id = generate_session_id();
    debug!("minted session id {session_id}");
    Json(GenerateResponse {
        success: true,
        message: format!("Session created. Go to /session/{session_id}"),
        session_id,
    })
}

/// GET /session/:id - per-session page embedding the relay client
pub async fn session_page(Path(session_id): Path<String>) -> Html<String> {
    Html(pages::session_page(&session_id))
}
