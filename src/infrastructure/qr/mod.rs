//! Pairing artifact rendering
//!
//! Pairing challenges arrive either as raw code strings or, from gateways
//! that render server-side, as finished `data:` URIs. Raw strings are
//! rendered to an SVG QR image and wrapped as a base64 data URI so the
//! control panel can drop them straight into an `<img>` tag.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;

use crate::application::errors::BotError;

/// Render a pairing challenge payload as a scannable data URI.
pub fn to_data_uri(payload: &str) -> Result<String, BotError> {
    if payload.starts_with("data:") {
        return Ok(payload.to_string());
    }

    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| BotError::Parse(format!("QR encoding failed: {}", e)))?;

    let image = code
        .render()
        .min_dimensions(256, 256)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}
