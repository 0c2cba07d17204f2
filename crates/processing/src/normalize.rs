//! Normalization of wide-range samples to 8-bit grayscale.
//!
//! Both transforms are pure and never fail: out-of-range values clip,
//! invalid values (negative, NaN) become black.

use contracts::Frame;
use image::{GrayImage, Luma};

/// Depth mapped to full white (mm)
pub const DEPTH_RANGE_MM: f32 = 4500.0;

#[inline]
fn scale(value: f32, max: f32) -> u8 {
    if value > 0.0 {
        (value * 255.0 / max).round().min(255.0) as u8
    } else {
        0
    }
}

fn map_samples(frame: &Frame, max: f32) -> GrayImage {
    GrayImage::from_fn(frame.width, frame.height, |x, y| {
        let i = (y * frame.width + x) as usize;
        Luma([scale(frame.sample(i), max)])
    })
}

/// Fixed-range depth scaling: `mm * 255 / 4500`, clipped to 255
pub fn normalize_depth(frame: &Frame) -> GrayImage {
    map_samples(frame, DEPTH_RANGE_MM)
}

/// Dynamic-range infrared scaling: the buffer maximum maps to 255.
///
/// An all-zero buffer yields an all-black image.
pub fn normalize_infrared(frame: &Frame) -> GrayImage {
    let max = frame
        .samples()
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);

    if max <= 0.0 {
        return GrayImage::new(frame.width, frame.height);
    }
    map_samples(frame, max)
}
