//! Display preparation
//!
//! Converts frames to 3-channel 8-bit RGB, resizes them to a common size
//! and lays prepared panels out as a 2x2 mosaic:
//!
//! ```text
//! +-------+-------+
//! | color | depth |
//! +-------+-------+
//! |  ir   | black |
//! +-------+-------+
//! ```

use bytes::Bytes;
use contracts::{Channel, DisplayImage, Frame, FrameFormat, PresentationFrame};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};

/// Target panel size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelSize {
    pub width: u32,
    pub height: u32,
}

impl Default for PanelSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// 4-channel color frame to RGB; scalar or malformed frames give black
pub fn color_to_rgb(frame: &Frame) -> RgbImage {
    if !frame.is_well_formed() || frame.format.is_scalar() {
        return RgbImage::new(frame.width, frame.height);
    }
    let swap = frame.format == FrameFormat::Bgrx;
    RgbImage::from_fn(frame.width, frame.height, |x, y| {
        let [a, b, c, _] = frame.pixel((y * frame.width + x) as usize);
        if swap {
            Rgb([c, b, a])
        } else {
            Rgb([a, b, c])
        }
    })
}

/// Gray to RGB by channel replication
pub fn gray_to_rgb(image: GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(image).to_rgb8()
}

/// Resize to the panel size; returns the input when it already fits
pub fn fit(image: RgbImage, size: PanelSize) -> RgbImage {
    if image.dimensions() == (size.width, size.height) {
        return image;
    }
    imageops::resize(&image, size.width, size.height, FilterType::Triangle)
}

/// Wrap a prepared image for the sinks
pub fn to_display_image(channel: Channel, image: RgbImage) -> DisplayImage {
    let (width, height) = image.dimensions();
    DisplayImage {
        channel,
        width,
        height,
        data: Bytes::from(image.into_raw()),
    }
}

/// Convert and resize one plane in a single step
pub fn prepare_panel(channel: Channel, image: RgbImage, size: PanelSize) -> DisplayImage {
    to_display_image(channel, fit(image, size))
}

fn to_rgb_image(panel: &DisplayImage) -> Option<RgbImage> {
    RgbImage::from_raw(panel.width, panel.height, panel.data.to_vec())
}

/// Compose the 2x2 mosaic of a presentation frame.
///
/// Missing or malformed panels stay black; the mosaic size follows the
/// first panel (or `fallback` when there is none).
pub fn compose_mosaic(frame: &PresentationFrame, fallback: PanelSize) -> RgbImage {
    let (width, height) = frame
        .panel_size()
        .unwrap_or((fallback.width, fallback.height));
    let size = PanelSize { width, height };
    let mut canvas = RgbImage::new(width * 2, height * 2);

    let layout = [
        (Channel::Color, 0, 0),
        (Channel::Depth, width, 0),
        (Channel::Infrared, 0, height),
    ];
    for (channel, x, y) in layout {
        let Some(panel) = frame.panel(channel).and_then(to_rgb_image) else {
            continue;
        };
        let panel = fit(panel, size);
        imageops::replace(&mut canvas, &panel, i64::from(x), i64::from(y));
    }
    canvas
}
