//! Real WhatsApp Web connector built on the wa-rs crate family. The library
//! owns the socket, the Signal-protocol pairing, and credential persistence;
//! this module only adapts its event stream to [`PairingEvent`] and points
//! its auth state at the session's temp directory.

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use wa_rs::bot::Bot;
use wa_rs::store::{Device, DeviceStore};
use wa_rs_core::types::events::Event;
use wa_rs_tokio_transport::TokioWebSocketTransportFactory;
use wa_rs_ureq_http::UreqHttpClient;

use super::auth_state::FileAuthStore;
use super::{CloseReason, ConnectorError, PairingConnector, PairingEvent, PairingHandle};

pub struct WhatsAppConnector;

impl WhatsAppConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WhatsAppConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PairingConnector for WhatsAppConnector {
    async fn connect(&self, auth_dir: &Path) -> Result<PairingHandle, ConnectorError> {
        let (tx, rx) = mpsc::channel(32);

        let backend = Arc::new(
            FileAuthStore::new(auth_dir).map_err(|e| ConnectorError::Other(anyhow!(e)))?,
        );

        // Fresh temp dir means a fresh device; pairing creates it. A rejoin
        // of the same session reuses whatever state is already on disk.
        let mut device = Device::new(backend.clone());
        if backend
            .exists()
            .await
            .map_err(|e| ConnectorError::Other(anyhow!("auth state check failed: {e}")))?
        {
            info!("existing auth state found under {}", auth_dir.display());
            if let Some(core_device) = backend
                .load()
                .await
                .map_err(|e| ConnectorError::Other(anyhow!("auth state load failed: {e}")))?
            {
                device.load_from_serializable(core_device);
            }
        }

        let transport_factory = TokioWebSocketTransportFactory::new();
        let http_client = UreqHttpClient::new();

        let event_tx = tx.clone();
        let bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(transport_factory)
            .with_http_client(http_client)
            .on_event(move |event, _client| {
                let tx = event_tx.clone();
                async move {
                    match event {
                        Event::PairingQrCode { code, .. } => {
                            debug!("pairing QR payload received");
                            let _ = tx.send(PairingEvent::Qr { code }).await;
                        }
                        Event::PairingCode { code, .. } => {
                            let _ = tx
                                .send(PairingEvent::StatusChanged {
                                    message: format!(
                                        "Enter code {code} in WhatsApp > Linked Devices"
                                    ),
                                })
                                .await;
                        }
                        Event::Connected(_) => {
                            info!("WhatsApp Web connected");
                            // Credentials land in creds.json through the
                            // store backend; the relay reads them from there.
                            let _ = tx.send(PairingEvent::Connected { user: None }).await;
                        }
                        Event::LoggedOut(_) => {
                            warn!("WhatsApp Web logged out during pairing");
                            let _ = tx
                                .send(PairingEvent::Closed {
                                    reason: CloseReason::AuthFailure,
                                })
                                .await;
                        }
                        Event::StreamError(stream_error) => {
                            let _ = tx
                                .send(PairingEvent::Closed {
                                    reason: CloseReason::Other(format!("{stream_error:?}")),
                                })
                                .await;
                        }
                        _ => {}
                    }
                }
            });

        let mut bot = bot
            .build()
            .await
            .map_err(|e| ConnectorError::Other(anyhow!("failed to build client: {e}")))?;

        let bot_handle = bot
            .run()
            .await
            .map_err(|e| ConnectorError::Other(anyhow!("failed to start client: {e}")))?;

        // Keep the bot alive alongside its run task; dropping it tears the
        // connection down when the registry aborts this task.
        let task = tokio::spawn(async move {
            let _bot = bot;
            if let Err(err) = bot_handle.await {
                debug!("client task ended: {err}");
            }
        });

        let _ = tx
            .send(PairingEvent::StatusChanged {
                message: "Connecting to WhatsApp...".to_string(),
            })
            .await;

        Ok(PairingHandle::new(rx, task))
    }
}
