//! Writing composited images and deciding where they go.

use crate::error::WatermarkError;
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, ImageResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Characters not allowed in a rename prefix/suffix.
const FORBIDDEN_FIX_CHARS: &[char] = &['<', '|', '>', '*', ':', '?', '"', '/', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Lossless,
    Jpeg(u8),
}

impl Quality {
    fn jpeg_quality(self) -> u8 {
        match self {
            Quality::Lossless => 100,
            Quality::Jpeg(q) => q,
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Jpeg(90)
    }
}

pub fn parse_quality(s: &str) -> Result<Quality, WatermarkError> {
    if s == "lossless" {
        Ok(Quality::Lossless)
    } else {
        let q: u8 = s.parse().map_err(|_| {
            WatermarkError::config("quality must be 'lossless' or a number 1-100")
        })?;
        if !(1..=100).contains(&q) {
            return Err(WatermarkError::config("quality must be between 1 and 100"));
        }
        Ok(Quality::Jpeg(q))
    }
}

/// Encodes `image` in the format named by `path`'s extension, attaching
/// `icc_profile` when the encoder supports it.
pub fn save_image(
    image: &DynamicImage,
    path: &Path,
    icc_profile: Option<&[u8]>,
    quality: Quality,
) -> Result<(), WatermarkError> {
    let format = ImageFormat::from_path(path).map_err(|e| WatermarkError::save(path, e))?;
    if !matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tiff
    ) {
        return Err(WatermarkError::save(
            path,
            format!("unsupported output format {:?}", format),
        ));
    }

    let file = File::create(path).map_err(|e| WatermarkError::save(path, e))?;
    let mut writer = BufWriter::new(file);
    let icc = icc_profile.map(<[u8]>::to_vec);

    let result = match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut writer, quality.jpeg_quality());
            encode(encoder, &DynamicImage::ImageRgb8(image.to_rgb8()), icc)
        }
        ImageFormat::Png => encode(PngEncoder::new(&mut writer), image, icc),
        ImageFormat::Bmp => encode(BmpEncoder::new(&mut writer), image, icc),
        _ => encode(TiffEncoder::new(&mut writer), image, icc),
    };

    let result = result
        .map_err(|e| WatermarkError::save(path, e))
        .and_then(|()| writer.flush().map_err(|e| WatermarkError::save(path, e)));
    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result
}

fn encode<E: ImageEncoder>(
    mut encoder: E,
    image: &DynamicImage,
    icc: Option<Vec<u8>>,
) -> ImageResult<()> {
    if let Some(icc) = icc {
        if let Err(e) = encoder.set_icc_profile(icc) {
            debug!("dropping color profile: {}", e);
        }
    }
    image.write_with_encoder(encoder)
}

/// Validates a user-supplied output directory.
///
/// The path must be non-empty and absolute. A missing directory is created
/// only when `create_missing` is set.
pub fn resolve_output_dir(raw: &str, create_missing: bool) -> Result<PathBuf, WatermarkError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(WatermarkError::config("missing output location"));
    }
    let dir = PathBuf::from(raw);
    if !dir.is_absolute() {
        return Err(WatermarkError::config(format!(
            "output location {} is not an absolute path",
            dir.display()
        )));
    }
    if dir.is_dir() {
        return Ok(dir);
    }
    if dir.exists() {
        return Err(WatermarkError::config(format!(
            "output location {} is not a directory",
            dir.display()
        )));
    }
    if !create_missing {
        return Err(WatermarkError::config(format!(
            "output location {} doesn't exist",
            dir.display()
        )));
    }
    std::fs::create_dir_all(&dir).map_err(|e| {
        WatermarkError::config(format!("cannot create {}: {}", dir.display(), e))
    })?;
    Ok(dir)
}

/// How output files are named relative to their input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Rename {
    #[default]
    Keep,
    /// `<fix>_<name>`
    Prefix(String),
    /// `<stem>_<fix>.<ext>`
    Suffix(String),
}

impl Rename {
    pub fn prefix(fix: &str) -> Result<Self, WatermarkError> {
        validate_fix(fix)?;
        Ok(Rename::Prefix(fix.to_string()))
    }

    pub fn suffix(fix: &str) -> Result<Self, WatermarkError> {
        validate_fix(fix)?;
        Ok(Rename::Suffix(fix.to_string()))
    }

    pub fn apply(&self, file_name: &str) -> String {
        match self {
            Rename::Keep => file_name.to_string(),
            Rename::Prefix(fix) => format!("{}_{}", fix, file_name),
            Rename::Suffix(fix) => match file_name.rsplit_once('.') {
                Some((stem, ext)) => format!("{}_{}.{}", stem, fix, ext),
                None => format!("{}_{}", file_name, fix),
            },
        }
    }

    /// Destination for `input` inside `dir`.
    pub fn output_path(&self, input: &Path, dir: &Path) -> Result<PathBuf, WatermarkError> {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WatermarkError::input_image(input, "path has no file name"))?;
        Ok(dir.join(self.apply(name)))
    }
}

fn validate_fix(fix: &str) -> Result<(), WatermarkError> {
    if fix.contains(FORBIDDEN_FIX_CHARS) {
        return Err(WatermarkError::config(format!(
            "file name fix {:?} contains a forbidden character",
            fix
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_parse_quality() {
        assert_eq!(parse_quality("lossless").unwrap(), Quality::Lossless);
        assert_eq!(parse_quality("85").unwrap(), Quality::Jpeg(85));
        assert!(parse_quality("0").is_err());
        assert!(parse_quality("101").is_err());
        assert!(parse_quality("high").is_err());
    }

    #[test]
    fn test_rename() {
        assert_eq!(Rename::Keep.apply("a.jpg"), "a.jpg");
        assert_eq!(Rename::prefix("wm").unwrap().apply("a.jpg"), "wm_a.jpg");
        assert_eq!(Rename::suffix("wm").unwrap().apply("a.b.jpg"), "a.b_wm.jpg");
        assert_eq!(Rename::suffix("wm").unwrap().apply("README"), "README_wm");
        assert!(Rename::prefix("a/b").is_err());
        assert!(Rename::suffix("what?").is_err());
    }

    #[test]
    fn test_output_path() {
        let path = Rename::Keep
            .output_path(Path::new("/in/photo.png"), Path::new("/out"))
            .unwrap();
        assert_eq!(path, PathBuf::from("/out/photo.png"));
    }

    #[test]
    fn test_resolve_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let existing = tmp.path().to_str().unwrap();
        assert_eq!(resolve_output_dir(existing, false).unwrap(), tmp.path());

        assert!(resolve_output_dir("  ", false).is_err());
        assert!(resolve_output_dir("relative/dir", true).is_err());

        let missing = tmp.path().join("new").join("deeper");
        let missing_str = missing.to_str().unwrap();
        assert!(resolve_output_dir(missing_str, false).is_err());
        assert_eq!(resolve_output_dir(missing_str, true).unwrap(), missing);
        assert!(missing.is_dir());
    }

    #[test]
    fn test_save_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 255])));

        for ext in ["png", "jpg", "bmp", "tiff"] {
            let path = tmp.path().join(format!("out.{}", ext));
            save_image(&img, &path, None, Quality::default()).unwrap();
            let back = image::open(&path).unwrap();
            assert_eq!((back.width(), back.height()), (8, 8), "{}", ext);
        }
    }

    #[test]
    fn test_save_unknown_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        let err = save_image(&img, &tmp.path().join("out.xyz"), None, Quality::Lossless)
            .unwrap_err();
        assert!(matches!(err, WatermarkError::Save { .. }));
        assert!(!tmp.path().join("out.xyz").exists());
    }
}
