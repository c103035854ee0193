use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use qrcode::render::svg;
use qrcode::QrCode;

/// Render a pairing payload into a data URL the session page can drop
/// straight into an `<img>` tag.
pub fn payload_to_data_url(payload: &str) -> Result<String> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(anyhow!("QR payload is empty"));
    }

    let code = QrCode::new(payload.as_bytes())
        .map_err(|err| anyhow!("failed to encode QR payload: {err}"))?;

    let image = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build();

    Ok(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(image.as_bytes())
    ))
}
