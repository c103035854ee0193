use serde::{Deserialize, Serialize};

/// Messages sent from the browser to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the session room named by the id; the server starts the pairing
    /// flow for that session on first join.
    Join { session_id: String },
}

/// Messages sent from the relay to the browser, scoped to one session room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Login QR code as a data-URL-encoded image string.
    Qr { image: String },
    /// Human-readable status text.
    Status { message: String },
    /// Pairing succeeded; credential material for the browser to copy.
    Connected { payload: ConnectedPayload },
    /// Human-readable error text.
    Error { message: String },
}

/// Field names match what the session page script reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub session_id: String,
    /// The credential blob re-serialized to compact JSON text.
    pub session_string: String,
    /// Base64 of `session_string`; decodes back to it exactly.
    pub base64_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}

/// Whatever identity the external library reports for the paired account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
