pub mod batch;
pub mod config;
pub mod error;
pub mod geometry;
pub mod opacity;
pub mod output;
pub mod preview;
pub mod scale;
pub mod source;
pub mod watermark;

pub use config::{CompositionConfig, Padding, PaddingUnit, Position};
pub use error::WatermarkError;
pub use watermark::{RenderOutcome, WatermarkAsset, Watermarker};

use std::io::Cursor;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

/// Watermarks an encoded image in memory and returns it as PNG.
///
/// `config_json` is a JSON `CompositionConfig`; missing fields take their
/// defaults. An empty string means all defaults.
#[wasm_bindgen]
pub fn preview_watermark(
    image_bytes: &[u8],
    logo_bytes: &[u8],
    config_json: &str,
) -> Result<Vec<u8>, JsValue> {
    let config: CompositionConfig = if config_json.trim().is_empty() {
        CompositionConfig::default()
    } else {
        serde_json::from_str(config_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid configuration: {}", e)))?
    };

    let asset = WatermarkAsset::from_bytes(logo_bytes)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let engine = Watermarker::with_asset(Arc::new(asset), false);

    let preview = engine
        .preview_bytes(image_bytes, &config)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let mut png = Vec::new();
    preview
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| JsValue::from_str(&format!("Error encoding preview: {}", e)))?;
    Ok(png)
}

#[wasm_bindgen]
pub fn validate_position(position: &str) -> Result<String, JsValue> {
    position
        .parse::<Position>()
        .map(|p| p.to_string())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
