use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a new session ID: `sess_` + unix millis + 9 random base36 chars.
/// Uniqueness is probabilistic, not guaranteed.
pub fn generate_session_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("sess_{}{}", millis, suffix)
}

/// Re-serialize a credential blob compactly and base64-encode it for display.
///
/// Returns `(session_string, base64_string)` where decoding the latter yields
/// the former byte-for-byte.
pub fn encode_credentials(raw: &str) -> anyhow::Result<(String, String)> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let session_string = serde_json::to_string(&value)?;
    let base64_string = STANDARD.encode(session_string.as_bytes());
    Ok((session_string, base64_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_and_well_formed() {
        let id1 = generate_session_id();
        let id2 = generate_session_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("sess_"));
        // millis (13 digits for any contemporary clock) + 9 suffix chars
        assert_eq!(id1.len(), "sess_".len() + 13 + 9);
        assert!(id1["sess_".len()..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn encode_credentials_round_trips() {
        let raw = r#"{ "noiseKey": "abc",
            "me": { "id": "123@s.whatsapp.net" } }"#;
        let (session_string, base64_string) = encode_credentials(raw).unwrap();
        let decoded = STANDARD.decode(&base64_string).unwrap();
        assert_eq!(decoded, session_string.as_bytes());
        // Compact re-serialization, still the same document.
        let a: serde_json::Value = serde_json::from_str(raw).unwrap();
        let b: serde_json::Value = serde_json::from_str(&session_string).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn encode_credentials_rejects_invalid_json() {
        assert!(encode_credentials("not json").is_err());
    }
}
