//! Seam between the web front-end and the external messaging client.
//!
//! The client library owns the network connection, cryptographic pairing,
//! and credential persistence; everything it raises during a pairing attempt
//! is funneled through [`PairingEvent`] so the relay never touches
//! library-specific types.

#[cfg(feature = "whatsapp-web")]
pub mod auth_state;
pub mod scripted;
#[cfg(feature = "whatsapp-web")]
pub mod whatsapp;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ConnectorKind;
use crate::protocol::UserInfo;

/// Why the underlying connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The account rejected the pairing (logged out / 401-equivalent).
    AuthFailure,
    Other(String),
}

/// Events raised by the external client during a pairing attempt, delivered
/// in the order the library raises them.
#[derive(Debug, Clone)]
pub enum PairingEvent {
    /// A fresh login QR payload to show the user.
    Qr { code: String },
    StatusChanged { message: String },
    /// Pairing succeeded; credentials have been written under the auth dir.
    Connected { user: Option<UserInfo> },
    Closed { reason: CloseReason },
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("connector unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A live pairing attempt: the event stream plus the task driving the client.
pub struct PairingHandle {
    pub events: mpsc::Receiver<PairingEvent>,
    task: JoinHandle<()>,
}

impl PairingHandle {
    pub fn new(events: mpsc::Receiver<PairingEvent>, task: JoinHandle<()>) -> Self {
        Self { events, task }
    }

    /// Detach the driving task so the registry can own its lifetime.
    pub fn into_parts(self) -> (mpsc::Receiver<PairingEvent>, JoinHandle<()>) {
        (self.events, self.task)
    }
}

#[async_trait]
pub trait PairingConnector: Send + Sync {
    /// Start a pairing attempt, persisting the client's auth state (including
    /// `creds.json`) under `auth_dir`.
    async fn connect(&self, auth_dir: &Path) -> Result<PairingHandle, ConnectorError>;
}

/// Build the connector selected by configuration.
pub fn make_connector(kind: ConnectorKind) -> anyhow::Result<Arc<dyn PairingConnector>> {
    match kind {
        ConnectorKind::Scripted => Ok(Arc::new(scripted::ScriptedConnector::default())),
        #[cfg(feature = "whatsapp-web")]
        ConnectorKind::WhatsApp => Ok(Arc::new(whatsapp::WhatsAppConnector::new())),
        #[cfg(not(feature = "whatsapp-web"))]
        ConnectorKind::WhatsApp => anyhow::bail!(
            "this build does not include the WhatsApp connector; \
             rebuild with --features whatsapp-web or set CONNECTOR=scripted"
        ),
    }
}
