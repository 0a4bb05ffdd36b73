//! Watermark sizing relative to the target image.

const LANDSCAPE_FACTOR: f64 = 0.15;
const PORTRAIT_FACTOR: f64 = 0.30;
const SQUARE_FACTOR: f64 = 0.20;
const MIN_SCALE: f64 = 0.5;
const MAX_SCALE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    pub fn of(width: u32, height: u32) -> Self {
        use std::cmp::Ordering::*;
        match width.cmp(&height) {
            Greater => Orientation::Landscape,
            Less => Orientation::Portrait,
            Equal => Orientation::Square,
        }
    }

    /// Share of the target width the watermark takes at baseline.
    pub fn width_factor(self) -> f64 {
        match self {
            Orientation::Landscape => LANDSCAPE_FACTOR,
            Orientation::Portrait => PORTRAIT_FACTOR,
            Orientation::Square => SQUARE_FACTOR,
        }
    }
}

/// Baseline watermark width for a target image, kept within
/// [0.5, 3.0] times the watermark's intrinsic width.
pub fn baseline_width(target_w: u32, target_h: u32, watermark_w: u32) -> u32 {
    let factor = Orientation::of(target_w, target_h).width_factor();
    let min = watermark_w as f64 * MIN_SCALE;
    let max = watermark_w as f64 * MAX_SCALE;
    (target_w as f64 * factor).clamp(min, max) as u32
}

/// Rendered watermark size for a target image.
///
/// `aspect` is the watermark's intrinsic width / height. The X and Y
/// multipliers are applied independently, so unequal values stretch the mark.
pub fn calc_size(
    target: (u32, u32),
    watermark_w: u32,
    aspect: f64,
    scale_x: f32,
    scale_y: f32,
) -> (u32, u32) {
    let base_w = baseline_width(target.0, target.1, watermark_w);
    let base_h = base_w as f64 / aspect;
    apply_multipliers(base_w as f64, base_h, scale_x, scale_y)
}

/// Size when auto-scaling is off: the intrinsic size times the multipliers.
pub fn intrinsic_size(watermark: (u32, u32), scale_x: f32, scale_y: f32) -> (u32, u32) {
    apply_multipliers(watermark.0 as f64, watermark.1 as f64, scale_x, scale_y)
}

fn apply_multipliers(w: f64, h: f64, scale_x: f32, scale_y: f32) -> (u32, u32) {
    let w = (w * scale_x as f64) as u32;
    let h = (h * scale_y as f64) as u32;
    (w.max(1), h.max(1))
}
