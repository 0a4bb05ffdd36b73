//! Alpha-channel scaling for the watermark render.

use image::RgbaImage;

/// Pixels at or below this alpha are already invisible and are left alone.
pub const TRANSPARENT_THRESHOLD: u8 = 5;

/// Returns a copy of `image` with every visible pixel's alpha multiplied by
/// `factor`.
///
/// # Panics
/// If `factor` is outside `[0.0, 1.0]`. Callers validate opacity first.
pub fn change_opacity(image: &RgbaImage, factor: f32) -> RgbaImage {
    assert!(
        (0.0..=1.0).contains(&factor),
        "opacity must be between 0 and 1, got {}",
        factor
    );

    let mut result = image.clone();
    if factor == 1.0 {
        return result;
    }
    for pixel in result.pixels_mut() {
        if pixel[3] > TRANSPARENT_THRESHOLD {
            pixel[3] = (pixel[3] as f32 * factor) as u8;
        }
    }
    result
}
