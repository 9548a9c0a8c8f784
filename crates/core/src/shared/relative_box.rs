use serde::{Deserialize, Serialize};

/// Decimal places kept when a box is stored in a face record.
pub const BOX_PRECISION: i32 = 4;

/// Face bounding box in frame-relative coordinates.
///
/// Every component is a fraction of the frame's width or height, so
/// `height = 0.25` means the face spans a quarter of the frame vertically.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RelativeBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Converts a pixel-space `(x1, y1, x2, y2)` box, clamping it to the frame.
    pub fn from_pixels(bbox: (f64, f64, f64, f64), frame_w: u32, frame_h: u32) -> Self {
        let fw = frame_w.max(1) as f64;
        let fh = frame_h.max(1) as f64;
        let (x1, y1, x2, y2) = bbox;

        let x1 = x1.clamp(0.0, fw);
        let y1 = y1.clamp(0.0, fh);
        let x2 = x2.clamp(0.0, fw);
        let y2 = y2.clamp(0.0, fh);

        Self {
            x: x1 / fw,
            y: y1 / fh,
            width: (x2 - x1).max(0.0) / fw,
            height: (y2 - y1).max(0.0) / fh,
        }
    }

    /// Face height as an integer percentage of frame height.
    pub fn size_percent(&self) -> u32 {
        to_percent(self.height)
    }

    /// Copy with every component rounded to [`BOX_PRECISION`] decimals.
    pub fn rounded(&self) -> Self {
        Self {
            x: round_to(self.x, BOX_PRECISION),
            y: round_to(self.y, BOX_PRECISION),
            width: round_to(self.width, BOX_PRECISION),
            height: round_to(self.height, BOX_PRECISION),
        }
    }
}

/// Rounds a `[0, 1]` fraction to the nearest whole percent.
///
/// Negative and NaN inputs map to 0.
pub fn to_percent(fraction: f64) -> u32 {
    let pct = (fraction * 100.0).round();
    if pct.is_nan() || pct <= 0.0 {
        0
    } else {
        pct as u32
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
