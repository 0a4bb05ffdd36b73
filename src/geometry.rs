//! Placement of the watermark's top-left corner.

use crate::config::{Horizontal, Padding, Position, Vertical};

/// Top-left offset that puts the watermark's near edges `pad_x`/`pad_y`
/// away from the anchored image edges.
///
/// The result may be negative when the watermark is larger than the space
/// left by the padding; pasting clips it.
pub fn watermark_position(
    image: (u32, u32),
    watermark: (u32, u32),
    position: Position,
    pad_x: Padding,
    pad_y: Padding,
) -> (i64, i64) {
    let (image_w, image_h) = (image.0 as i64, image.1 as i64);
    let (wm_w, wm_h) = (watermark.0 as i64, watermark.1 as i64);
    let pad_x = pad_x.resolve(image.0);
    let pad_y = pad_y.resolve(image.1);

    let x = match position.horizontal {
        Horizontal::East => image_w - wm_w - pad_x,
        Horizontal::West => pad_x,
    };
    let y = match position.vertical {
        Vertical::South => image_h - wm_h - pad_y,
        Vertical::North => pad_y,
    };
    (x, y)
}
