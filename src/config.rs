//! Composition settings: where the watermark goes and how it looks.
//!
//! Position and padding are parsed from the short symbols used on the command
//! line and in JSON (`"SE"`, `"20px"`, `"10%"`). Anything that does not decode
//! is a configuration error; there is no fallback placement.

use crate::error::WatermarkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vertical {
    North,
    South,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizontal {
    East,
    West,
}

/// Corner anchor: first symbol is N/S, second is E/W.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Position {
    pub vertical: Vertical,
    pub horizontal: Horizontal,
}

impl Position {
    pub const NORTH_WEST: Position = Position::new(Vertical::North, Horizontal::West);
    pub const NORTH_EAST: Position = Position::new(Vertical::North, Horizontal::East);
    pub const SOUTH_WEST: Position = Position::new(Vertical::South, Horizontal::West);
    pub const SOUTH_EAST: Position = Position::new(Vertical::South, Horizontal::East);

    pub const fn new(vertical: Vertical, horizontal: Horizontal) -> Self {
        Self {
            vertical,
            horizontal,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::SOUTH_EAST
    }
}

impl FromStr for Position {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let symbol = s.trim().to_ascii_uppercase();
        let mut chars = symbol.chars();
        let (v, h) = match (chars.next(), chars.next(), chars.next()) {
            (Some(v), Some(h), None) => (v, h),
            _ => {
                return Err(WatermarkError::config(format!(
                    "position must be two characters, got {:?}",
                    s
                )))
            }
        };

        let vertical = match v {
            'N' => Vertical::North,
            'S' => Vertical::South,
            _ => {
                return Err(WatermarkError::config(format!(
                    "first char of position must be N or S, got {:?}",
                    s
                )))
            }
        };
        let horizontal = match h {
            'E' => Horizontal::East,
            'W' => Horizontal::West,
            _ => {
                return Err(WatermarkError::config(format!(
                    "second char of position must be E or W, got {:?}",
                    s
                )))
            }
        };

        Ok(Position::new(vertical, horizontal))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self.vertical {
            Vertical::North => 'N',
            Vertical::South => 'S',
        };
        let h = match self.horizontal {
            Horizontal::East => 'E',
            Horizontal::West => 'W',
        };
        write!(f, "{}{}", v, h)
    }
}

impl TryFrom<String> for Position {
    type Error = WatermarkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Position> for String {
    fn from(value: Position) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingUnit {
    Pixels,
    /// Percent of the target image's dimension on the same axis.
    Percent,
}

impl FromStr for PaddingUnit {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "px" => Ok(PaddingUnit::Pixels),
            "%" => Ok(PaddingUnit::Percent),
            other => Err(WatermarkError::config(format!(
                "padding unit must be px or %, got {:?}",
                other
            ))),
        }
    }
}

/// Distance between the watermark's near edge and the image edge on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Padding {
    pub amount: u32,
    pub unit: PaddingUnit,
}

impl Padding {
    pub const fn px(amount: u32) -> Self {
        Self {
            amount,
            unit: PaddingUnit::Pixels,
        }
    }

    pub const fn percent(amount: u32) -> Self {
        Self {
            amount,
            unit: PaddingUnit::Percent,
        }
    }

    /// Padding in pixels against an image dimension of `extent` pixels.
    pub fn resolve(&self, extent: u32) -> i64 {
        match self.unit {
            PaddingUnit::Pixels => self.amount as i64,
            PaddingUnit::Percent => (extent as f64 * (self.amount as f64 / 100.0)) as i64,
        }
    }
}

impl FromStr for Padding {
    type Err = WatermarkError;

    /// Accepts `"20px"`, `"10%"`, or `"20 px"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| WatermarkError::config(format!("padding {:?} has no unit", s)))?;
        let (amount, unit) = s.split_at(split);
        let amount: u32 = amount
            .parse()
            .map_err(|_| WatermarkError::config(format!("padding {:?} has no amount", s)))?;
        let unit = unit.trim().parse()?;
        Ok(Padding { amount, unit })
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            PaddingUnit::Pixels => write!(f, "{}px", self.amount),
            PaddingUnit::Percent => write!(f, "{}%", self.amount),
        }
    }
}

impl TryFrom<String> for Padding {
    type Error = WatermarkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Padding> for String {
    fn from(value: Padding) -> Self {
        value.to_string()
    }
}

/// Accepted range for the X/Y size multipliers.
pub const SCALE_RANGE: RangeInclusive<f32> = 0.1..=3.0;

/// One compositing request.
///
/// `scale_x` and `scale_y` are independent; keeping them equal for a
/// "keep aspect ratio" mode is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    pub position: Position,
    pub pad_x: Padding,
    pub pad_y: Padding,
    pub opacity: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Size the watermark from the target image; when off, start from the
    /// watermark's own size.
    pub auto_scale: bool,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            position: Position::SOUTH_EAST,
            pad_x: Padding::px(20),
            pad_y: Padding::px(5),
            opacity: 0.5,
            scale_x: 1.0,
            scale_y: 1.0,
            auto_scale: true,
        }
    }
}

impl CompositionConfig {
    pub fn validate(&self) -> Result<(), WatermarkError> {
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(WatermarkError::config(format!(
                "opacity must be between 0 and 1, got {}",
                self.opacity
            )));
        }
        for (name, value) in [("scale_x", self.scale_x), ("scale_y", self.scale_y)] {
            if !value.is_finite() || !SCALE_RANGE.contains(&value) {
                return Err(WatermarkError::config(format!(
                    "{} must be between {} and {}, got {}",
                    name,
                    SCALE_RANGE.start(),
                    SCALE_RANGE.end(),
                    value
                )));
            }
        }
        Ok(())
    }
}
