use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Which pairing connector the server spawns for joined sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    /// Real WhatsApp Web connector (requires the `whatsapp-web` feature).
    WhatsApp,
    /// Deterministic scripted connector for local development and tests.
    Scripted,
}

impl ConnectorKind {
    /// Map the `CONNECTOR` value; unset and `whatsapp` select the real
    /// connector, anything else falls back to it with a warning so a typo
    /// like `Scripted` is visible in the logs.
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("scripted") => ConnectorKind::Scripted,
            Some("whatsapp") | None => ConnectorKind::WhatsApp,
            Some(other) => {
                warn!("unrecognized CONNECTOR value {other:?}; using whatsapp");
                ConnectorKind::WhatsApp
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Root under which each session gets its own temp directory.
    pub temp_root: PathBuf,
    /// How long generated credential material is retained after a
    /// successful pairing before the session is destroyed.
    pub cleanup_delay: Duration,
    /// Grace period after connection-open before reading creds.json,
    /// so the connector has flushed its auth state to disk.
    pub creds_settle: Duration,
    pub connector: ConnectorKind,
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: parse_or(env::var("PORT").ok(), 3000),
            temp_root: env::var("TEMP_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("temp-sessions")),
            cleanup_delay: Duration::from_secs(parse_or(
                env::var("CLEANUP_DELAY_SECS").ok(),
                300,
            )),
            creds_settle: Duration::from_millis(parse_or(env::var("CREDS_SETTLE_MS").ok(), 2000)),
            connector: ConnectorKind::parse(env::var("CONNECTOR").ok().as_deref()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            temp_root: PathBuf::from("temp-sessions"),
            cleanup_delay: Duration::from_secs(300),
            creds_settle: Duration::from_millis(2000),
            connector: ConnectorKind::WhatsApp,
        }
    }
}
