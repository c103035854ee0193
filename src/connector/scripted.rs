//! Deterministic connector for local development and tests: plays back a
//! fixed event script and writes a placeholder `creds.json`, with no network
//! involved.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use super::{CloseReason, ConnectorError, PairingConnector, PairingEvent, PairingHandle};
use crate::protocol::UserInfo;

#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    /// Delay between scripted events.
    pub step: Duration,
    /// Emit `Closed` with an auth-failure reason instead of connecting.
    pub fail_auth: bool,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(50),
            fail_auth: false,
        }
    }
}

const SCRIPTED_QR: &str = "2@scripted-payload,not-a-real-pairing-code";

fn placeholder_creds(auth_dir: &Path) -> serde_json::Value {
    serde_json::json!({
        "noiseKey": { "private": "c2NyaXB0ZWQ=", "public": "c2NyaXB0ZWQ=" },
        "registrationId": 42,
        "me": { "id": "15550000000@s.whatsapp.net", "name": "Scripted" },
        "authDir": auth_dir.display().to_string(),
    })
}

#[async_trait]
impl PairingConnector for ScriptedConnector {
    async fn connect(&self, auth_dir: &Path) -> Result<PairingHandle, ConnectorError> {
        let (tx, rx) = mpsc::channel(16);
        let auth_dir = auth_dir.to_path_buf();
        let step = self.step;
        let fail_auth = self.fail_auth;

        let task = tokio::spawn(async move {
            let _ = tx
                .send(PairingEvent::Qr {
                    code: SCRIPTED_QR.to_string(),
                })
                .await;
            tokio::time::sleep(step).await;

            if fail_auth {
                let _ = tx
                    .send(PairingEvent::Closed {
                        reason: CloseReason::AuthFailure,
                    })
                    .await;
                return;
            }

            let creds = placeholder_creds(&auth_dir);
            if let Err(err) =
                tokio::fs::write(auth_dir.join("creds.json"), creds.to_string()).await
            {
                warn!("scripted connector failed to write creds.json: {err}");
                let _ = tx
                    .send(PairingEvent::Closed {
                        reason: CloseReason::Other(err.to_string()),
                    })
                    .await;
                return;
            }

            let _ = tx
                .send(PairingEvent::Connected {
                    user: Some(UserInfo {
                        id: "15550000000@s.whatsapp.net".to_string(),
                        name: Some("Scripted".to_string()),
                    }),
                })
                .await;
        });

        Ok(PairingHandle::new(rx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_qr_then_connected_and_writes_creds() {
        let dir = tempfile::tempdir().unwrap();
        let connector = ScriptedConnector {
            step: Duration::from_millis(1),
            fail_auth: false,
        };
        let handle = connector.connect(dir.path()).await.unwrap();
        let (mut events, _task) = handle.into_parts();

        match events.recv().await.unwrap() {
            PairingEvent::Qr { code } => assert!(code.starts_with("2@")),
            other => panic!("expected qr first, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            PairingEvent::Connected { user } => {
                assert!(user.is_some());
            }
            other => panic!("expected connected, got {other:?}"),
        }
        assert!(dir.path().join("creds.json").exists());
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn auth_failure_script_closes_without_creds() {
        let dir = tempfile::tempdir().unwrap();
        let connector = ScriptedConnector {
            step: Duration::from_millis(1),
            fail_auth: true,
        };
        let handle = connector.connect(dir.path()).await.unwrap();
        let (mut events, _task) = handle.into_parts();

        assert!(matches!(
            events.recv().await.unwrap(),
            PairingEvent::Qr { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            PairingEvent::Closed {
                reason: CloseReason::AuthFailure
            }
        ));
        assert!(!dir.path().join("creds.json").exists());
    }
}
