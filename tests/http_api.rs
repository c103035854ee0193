use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use wa_session_gen::build_router;
use wa_session_gen::config::{Config, ConnectorKind};
use wa_session_gen::connector::scripted::ScriptedConnector;
use wa_session_gen::registry::SessionRegistry;
use wa_session_gen::relay::RelayState;

fn test_app(temp_root: std::path::PathBuf) -> Router {
    let config = Config {
        port: 0,
        temp_root: temp_root.clone(),
        cleanup_delay: Duration::from_millis(50),
        creds_settle: Duration::ZERO,
        connector: ConnectorKind::Scripted,
    };
    let registry = SessionRegistry::new(temp_root);
    let state = RelayState::new(&config, registry, Arc::new(ScriptedConnector::default()));
    build_router(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path().join("temp"));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn generate_mints_prefixed_unique_ids() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path().join("temp"));

    let first = app
        .clone()
        .oneshot(Request::get("/api/generate").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["success"], true);
    let first_id = first["sessionId"].as_str().unwrap().to_string();
    assert!(first_id.starts_with("sess_"));
    assert!(first["message"]
        .as_str()
        .unwrap()
        .contains(&format!("/session/{first_id}")));

    let second = app
        .oneshot(Request::get("/api/generate").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let second_id = body_json(second).await["sessionId"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(first_id, second_id);
}

#[tokio::test]
async fn session_page_embeds_the_requested_id() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path().join("temp"));

    let response = app
        .oneshot(
            Request::get("/session/sess_12345_abcdef123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("sess_12345_abcdef123"));
    assert!(html.contains("/ws/"));
}

#[tokio::test]
async fn landing_page_points_at_generate_endpoint() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path().join("temp"));

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("/api/generate"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(root.path().join("temp"));

    let response = app
        .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
