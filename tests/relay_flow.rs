use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::sync::mpsc;
use tokio::time::timeout;

use wa_session_gen::config::{Config, ConnectorKind};
use wa_session_gen::connector::scripted::ScriptedConnector;
use wa_session_gen::connector::{
    CloseReason, ConnectorError, PairingConnector, PairingEvent, PairingHandle,
};
use wa_session_gen::protocol::ServerMessage;
use wa_session_gen::registry::SessionRegistry;
use wa_session_gen::relay::{self, RelayState};

/// Replays a fixed event sequence without touching the filesystem.
struct PlaybackConnector {
    script: Vec<PairingEvent>,
}

#[async_trait]
impl PairingConnector for PlaybackConnector {
    async fn connect(&self, _auth_dir: &Path) -> Result<PairingHandle, ConnectorError> {
        let (tx, rx) = mpsc::channel(16);
        let script = self.script.clone();
        let task = tokio::spawn(async move {
            for event in script {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(PairingHandle::new(rx, task))
    }
}

fn relay_state(temp_root: PathBuf, connector: Arc<dyn PairingConnector>) -> RelayState {
    let config = Config {
        port: 0,
        temp_root: temp_root.clone(),
        cleanup_delay: Duration::from_millis(50),
        creds_settle: Duration::ZERO,
        connector: ConnectorKind::Scripted,
    };
    RelayState::new(&config, SessionRegistry::new(temp_root), connector)
}

async fn next_msg(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for relay message")
        .expect("relay channel closed early")
}

#[tokio::test]
async fn scripted_pairing_delivers_qr_then_connected_payload() {
    let root = tempfile::tempdir().unwrap();
    let state = relay_state(
        root.path().join("temp"),
        Arc::new(ScriptedConnector {
            step: Duration::from_millis(1),
            fail_auth: false,
        }),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    relay::start_session(&state, "sess_flow", &tx).await;
    assert!(state.registry.contains("sess_flow"));

    match next_msg(&mut rx).await {
        ServerMessage::Qr { image } => {
            assert!(image.starts_with("data:image/svg+xml;base64,"));
        }
        other => panic!("expected qr first, got {other:?}"),
    }

    match next_msg(&mut rx).await {
        ServerMessage::Status { message } => {
            assert_eq!(message, "Scan the QR code with WhatsApp");
        }
        other => panic!("expected scan status, got {other:?}"),
    }

    match next_msg(&mut rx).await {
        ServerMessage::Status { message } => {
            assert_eq!(message, "Connected! Reading session...");
        }
        other => panic!("expected connected status, got {other:?}"),
    }

    match next_msg(&mut rx).await {
        ServerMessage::Connected { payload } => {
            assert_eq!(payload.session_id, "sess_flow");
            // The base64 form must decode back to the exact session string.
            let decoded = STANDARD.decode(&payload.base64_string).unwrap();
            assert_eq!(decoded, payload.session_string.as_bytes());
            let creds: serde_json::Value =
                serde_json::from_str(&payload.session_string).unwrap();
            assert_eq!(creds["registrationId"], 42);
            assert!(payload.user_info.is_some());
        }
        other => panic!("expected connected payload, got {other:?}"),
    }

    // Retention window elapses and the session is reclaimed.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!state.registry.contains("sess_flow"));
    assert!(!root.path().join("temp").join("sess_flow").exists());
}

#[tokio::test]
async fn auth_failure_cleans_up_without_retry_status() {
    let root = tempfile::tempdir().unwrap();
    let state = relay_state(
        root.path().join("temp"),
        Arc::new(ScriptedConnector {
            step: Duration::from_millis(1),
            fail_auth: true,
        }),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    relay::start_session(&state, "sess_auth", &tx).await;

    assert!(matches!(next_msg(&mut rx).await, ServerMessage::Qr { .. }));
    assert!(matches!(
        next_msg(&mut rx).await,
        ServerMessage::Status { .. }
    ));

    // The auth-failure close is silent toward the browser.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert!(!state.registry.contains("sess_auth"));
    assert!(!root.path().join("temp").join("sess_auth").exists());
}

#[tokio::test]
async fn ordinary_close_reports_retry_status() {
    let root = tempfile::tempdir().unwrap();
    let state = relay_state(
        root.path().join("temp"),
        Arc::new(PlaybackConnector {
            script: vec![
                PairingEvent::StatusChanged {
                    message: "Connecting...".to_string(),
                },
                PairingEvent::Closed {
                    reason: CloseReason::Other("socket reset".to_string()),
                },
            ],
        }),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    relay::start_session(&state, "sess_close", &tx).await;

    match next_msg(&mut rx).await {
        ServerMessage::Status { message } => assert_eq!(message, "Connecting..."),
        other => panic!("expected status, got {other:?}"),
    }
    match next_msg(&mut rx).await {
        ServerMessage::Status { message } => {
            assert_eq!(message, "Connection closed. Try again.");
        }
        other => panic!("expected retry status, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!state.registry.contains("sess_close"));
}

#[tokio::test]
async fn connected_without_creds_file_reports_missing_session() {
    let root = tempfile::tempdir().unwrap();
    let state = relay_state(
        root.path().join("temp"),
        Arc::new(PlaybackConnector {
            script: vec![PairingEvent::Connected { user: None }],
        }),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    relay::start_session(&state, "sess_nocreds", &tx).await;

    match next_msg(&mut rx).await {
        ServerMessage::Status { message } => {
            assert_eq!(message, "Connected! Reading session...");
        }
        other => panic!("expected connected status, got {other:?}"),
    }
    match next_msg(&mut rx).await {
        ServerMessage::Status { message } => {
            assert_eq!(message, "Session file not found");
        }
        other => panic!("expected missing-session status, got {other:?}"),
    }
}
