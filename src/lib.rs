pub mod cli;
pub mod config;
pub mod connector;
pub mod handlers;
pub mod pages;
pub mod protocol;
pub mod qr;
pub mod registry;
pub mod relay;
pub mod session;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the router: plain HTTP routes plus the stateful relay route.
pub fn build_router(relay_state: relay::RelayState) -> Router {
    let http_routes = Router::new()
        .route("/", get(handlers::landing))
        .route("/health", get(handlers::health_check))
        .route("/api/generate", get(handlers::generate_session))
        .route("/session/:id", get(handlers::session_page));

    let ws_routes = Router::new()
        .route("/ws/:session_id", get(relay::websocket_handler))
        .with_state(relay_state);

    Router::new()
        .merge(http_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
