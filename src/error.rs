//! Error taxonomy for the watermarking engine.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WatermarkError {
    /// Watermark file is missing or not a decodable image. Fatal to the engine.
    #[error("cannot load watermark {}: {message}", .path.display())]
    AssetLoad { path: PathBuf, message: String },

    /// Bad position, padding unit, opacity, or output location.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Target image is missing or undecodable. Scoped to a single image.
    #[error("cannot read image {}: {message}", .path.display())]
    InputImage { path: PathBuf, message: String },

    /// The composited image could not be encoded or written.
    #[error("cannot save {}: {message}", .path.display())]
    Save { path: PathBuf, message: String },
}

impl WatermarkError {
    pub fn config(message: impl Into<String>) -> Self {
        WatermarkError::Configuration(message.into())
    }

    pub fn asset_load(path: &Path, message: impl ToString) -> Self {
        WatermarkError::AssetLoad {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn input_image(path: &Path, message: impl ToString) -> Self {
        WatermarkError::InputImage {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn save(path: &Path, message: impl ToString) -> Self {
        WatermarkError::Save {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    /// True when a batch can skip the offending image and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WatermarkError::InputImage { .. } | WatermarkError::Save { .. }
        )
    }
}
