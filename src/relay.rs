use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connector::{CloseReason, PairingConnector, PairingEvent};
use crate::protocol::{ClientMessage, ConnectedPayload, ServerMessage};
use crate::registry::SessionRegistry;
use crate::{qr, session};

/// Shared state for the relay routes.
#[derive(Clone)]
pub struct RelayState {
    pub registry: SessionRegistry,
    pub connector: Arc<dyn PairingConnector>,
    pub cleanup_delay: Duration,
    pub creds_settle: Duration,
}

impl RelayState {
    pub fn new(
        config: &Config,
        registry: SessionRegistry,
        connector: Arc<dyn PairingConnector>,
    ) -> Self {
        Self {
            registry,
            connector,
            cleanup_delay: config.cleanup_delay,
            creds_settle: config.creds_settle,
        }
    }
}

/// WebSocket upgrade handler for `GET /ws/:session_id`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<RelayState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

/// Relay loop for one browser tab. The tab sends `join` once; after that it
/// only listens. Closing the tab does not cancel the underlying pairing
/// attempt; the retention timer is the only reclamation for that case.
async fn handle_socket(socket: WebSocket, session_id: String, state: RelayState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Forward relay events from the channel to the WebSocket.
    let forward_session = session_id.clone();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
        debug!("relay sender task ended for session {forward_session}");
    });

    debug!("websocket connected: session={session_id}");
    let mut joined = false;

    while let Some(msg_result) = receiver.next().await {
        let msg = match msg_result {
            Ok(m) => m,
            Err(e) => {
                error!("websocket error on session {session_id}: {e}");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Join {
                    session_id: requested,
                }) => {
                    if requested != session_id {
                        let _ = tx.send(ServerMessage::Error {
                            message: format!("join for {requested} on room {session_id}"),
                        });
                        continue;
                    }
                    if joined {
                        debug!("duplicate join for session {session_id} ignored");
                        continue;
                    }
                    joined = true;
                    start_session(&state, &session_id, &tx).await;
                }
                Err(e) => {
                    warn!("unparseable client message on session {session_id}: {e}");
                    let _ = tx.send(ServerMessage::Error {
                        message: format!("invalid message format: {e}"),
                    });
                }
            },
            Message::Close(_) => {
                debug!("close frame from session {session_id}");
                break;
            }
            // Ping/Pong handled by axum; binary not part of the protocol.
            _ => {}
        }
    }

    debug!("websocket disconnected: session={session_id}");
}

/// Create the session entry and start the pairing attempt, pumping connector
/// events to the browser in arrival order.
pub async fn start_session(
    state: &RelayState,
    session_id: &str,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    let temp_dir = match state.registry.create(session_id).await {
        Ok(dir) => dir,
        Err(err) => {
            error!("failed to create session dir for {session_id}: {err:#}");
            let _ = tx.send(ServerMessage::Error {
                message: format!("failed to initialize session: {err}"),
            });
            return;
        }
    };

    let handle = match state.connector.connect(&temp_dir).await {
        Ok(handle) => handle,
        Err(err) => {
            error!("connector failed for session {session_id}: {err}");
            let _ = tx.send(ServerMessage::Error {
                message: format!("failed to initialize: {err}"),
            });
            state.registry.cleanup(session_id).await;
            return;
        }
    };

    let (mut events, client_task) = handle.into_parts();
    state.registry.attach_task(session_id, client_task);
    info!("pairing started for session {session_id}");

    let state = state.clone();
    let session_id = session_id.to_string();
    let tx = tx.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PairingEvent::Qr { code } => match qr::payload_to_data_url(&code) {
                    Ok(image) => {
                        let _ = tx.send(ServerMessage::Qr { image });
                        let _ = tx.send(ServerMessage::Status {
                            message: "Scan the QR code with WhatsApp".to_string(),
                        });
                    }
                    Err(err) => {
                        error!("QR render failed for session {session_id}: {err:#}");
                        let _ = tx.send(ServerMessage::Status {
                            message: "Error generating QR code".to_string(),
                        });
                    }
                },
                PairingEvent::StatusChanged { message } => {
                    let _ = tx.send(ServerMessage::Status { message });
                }
                PairingEvent::Connected { user } => {
                    let _ = tx.send(ServerMessage::Status {
                        message: "Connected! Reading session...".to_string(),
                    });

                    // Give the client a moment to flush its auth state.
                    tokio::time::sleep(state.creds_settle).await;

                    let creds_path = state.registry.temp_root().join(&session_id).join("creds.json");
                    match tokio::fs::read_to_string(&creds_path).await {
                        Ok(raw) => match session::encode_credentials(&raw) {
                            Ok((session_string, base64_string)) => {
                                let _ = tx.send(ServerMessage::Connected {
                                    payload: ConnectedPayload {
                                        session_id: session_id.clone(),
                                        session_string,
                                        base64_string,
                                        user_info: user,
                                    },
                                });
                                state
                                    .registry
                                    .schedule_cleanup(session_id.clone(), state.cleanup_delay);
                            }
                            Err(err) => {
                                let _ = tx.send(ServerMessage::Error {
                                    message: format!("failed to read session: {err}"),
                                });
                            }
                        },
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                            let _ = tx.send(ServerMessage::Status {
                                message: "Session file not found".to_string(),
                            });
                        }
                        Err(err) => {
                            let _ = tx.send(ServerMessage::Error {
                                message: format!("failed to read session: {err}"),
                            });
                        }
                    }
                }
                PairingEvent::Closed { reason } => {
                    // Auth failures and ordinary closes converge on cleanup;
                    // only the status message differs.
                    if reason != CloseReason::AuthFailure {
                        let _ = tx.send(ServerMessage::Status {
                            message: "Connection closed. Try again.".to_string(),
                        });
                    }
                    state.registry.cleanup(&session_id).await;
                    break;
                }
            }
        }
        debug!("event pump ended for session {session_id}");
    });
}
