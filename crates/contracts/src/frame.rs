//! Frame - raw plane delivered by the hardware layer
//!
//! Color frames are 4-channel 8-bit, depth frames carry millimetres and
//! infrared frames raw intensity, both as `f32` or `u16` samples.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::Channel;

/// Color sensor resolution
pub const COLOR_WIDTH: u32 = 1920;
pub const COLOR_HEIGHT: u32 = 1080;

/// Depth / infrared sensor resolution
pub const DEPTH_WIDTH: u32 = 512;
pub const DEPTH_HEIGHT: u32 = 424;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// 8-bit blue, green, red, padding
    Bgrx,
    /// 8-bit red, green, blue, padding
    Rgbx,
    /// native-endian `f32` per pixel
    Float,
    /// native-endian `u16` per pixel
    Gray16,
}

impl FrameFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgrx | FrameFormat::Rgbx | FrameFormat::Float => 4,
            FrameFormat::Gray16 => 2,
        }
    }

    /// True for single-sample numeric formats
    pub const fn is_scalar(self) -> bool {
        matches!(self, FrameFormat::Float | FrameFormat::Gray16)
    }
}

/// One captured plane
#[derive(Debug, Clone)]
pub struct Frame {
    pub channel: Channel,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    /// Per-channel sequence number assigned by the hardware layer
    pub sequence: u32,
    /// Capture time in microseconds, device clock
    pub timestamp_us: u64,
    pub data: BytesMut,
}

impl Frame {
    pub fn new(
        channel: Channel,
        width: u32,
        height: u32,
        format: FrameFormat,
        data: BytesMut,
    ) -> Self {
        Self {
            channel,
            width,
            height,
            format,
            sequence: 0,
            timestamp_us: 0,
            data,
        }
    }

    /// Frame with every byte set to zero
    pub fn zeroed(channel: Channel, width: u32, height: u32, format: FrameFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self::new(channel, width, height, format, BytesMut::zeroed(len))
    }

    /// `Float` frame from samples
    pub fn from_f32(channel: Channel, width: u32, height: u32, samples: &[f32]) -> Self {
        let data = BytesMut::from(bytemuck::cast_slice::<f32, u8>(samples));
        Self::new(channel, width, height, FrameFormat::Float, data)
    }

    /// `Gray16` frame from samples
    pub fn from_u16(channel: Channel, width: u32, height: u32, samples: &[u16]) -> Self {
        let data = BytesMut::from(bytemuck::cast_slice::<u16, u8>(samples));
        Self::new(channel, width, height, FrameFormat::Gray16, data)
    }

    pub fn with_sequence(mut self, sequence: u32, timestamp_us: u64) -> Self {
        self.sequence = sequence;
        self.timestamp_us = timestamp_us;
        self
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn expected_len(&self) -> usize {
        self.pixel_count() * self.format.bytes_per_pixel()
    }

    /// Non-empty and the buffer length matches the declared shape
    pub fn is_well_formed(&self) -> bool {
        self.pixel_count() > 0 && self.data.len() == self.expected_len()
    }

    /// Scalar sample at pixel `i`; color formats and out-of-range reads yield 0
    #[inline]
    pub fn sample(&self, i: usize) -> f32 {
        let bpp = self.format.bytes_per_pixel();
        let Some(bytes) = self.data.get(i * bpp..(i + 1) * bpp) else {
            return 0.0;
        };
        match self.format {
            FrameFormat::Float => bytemuck::pod_read_unaligned::<f32>(bytes),
            FrameFormat::Gray16 => f32::from(bytemuck::pod_read_unaligned::<u16>(bytes)),
            FrameFormat::Bgrx | FrameFormat::Rgbx => 0.0,
        }
    }

    /// Scalar samples in row-major order
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.pixel_count()).map(move |i| self.sample(i))
    }

    /// Write a scalar sample; ignored for color formats
    #[inline]
    pub fn set_sample(&mut self, i: usize, value: f32) {
        let bpp = self.format.bytes_per_pixel();
        let format = self.format;
        let Some(bytes) = self.data.get_mut(i * bpp..(i + 1) * bpp) else {
            return;
        };
        match format {
            FrameFormat::Float => bytes.copy_from_slice(bytemuck::bytes_of(&value)),
            FrameFormat::Gray16 => {
                let v = value.clamp(0.0, f32::from(u16::MAX)) as u16;
                bytes.copy_from_slice(bytemuck::bytes_of(&v));
            }
            FrameFormat::Bgrx | FrameFormat::Rgbx => {}
        }
    }

    /// 4-byte pixel at `i` for color formats
    #[inline]
    pub fn pixel(&self, i: usize) -> [u8; 4] {
        match self.data.get(i * 4..i * 4 + 4) {
            Some(p) if !self.format.is_scalar() => [p[0], p[1], p[2], p[3]],
            _ => [0; 4],
        }
    }
}

/// Output of the registration engine
///
/// Both planes have the depth sensor's shape and correspond pixel for pixel.
#[derive(Debug, Clone)]
pub struct RegisteredFramePair {
    /// Depth in millimetres with lens distortion removed (`Float`)
    pub undistorted: Frame,
    /// Color re-projected onto the depth grid (`Bgrx`)
    pub registered_color: Frame,
}

impl RegisteredFramePair {
    /// Zero-filled pair of depth shape
    pub fn zeroed() -> Self {
        Self {
            undistorted: Frame::zeroed(Channel::Depth, DEPTH_WIDTH, DEPTH_HEIGHT, FrameFormat::Float),
            registered_color: Frame::zeroed(
                Channel::Color,
                DEPTH_WIDTH,
                DEPTH_HEIGHT,
                FrameFormat::Bgrx,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_samples() {
        let frame = Frame::from_f32(Channel::Depth, 2, 2, &[0.0, 500.0, 1000.0, 4500.0]);
        assert!(frame.is_well_formed());
        assert_eq!(frame.samples().collect::<Vec<_>>(), vec![0.0, 500.0, 1000.0, 4500.0]);
    }

    #[test]
    fn test_gray16_samples_and_write() {
        let mut frame = Frame::from_u16(Channel::Infrared, 3, 1, &[1, 2, 3]);
        frame.set_sample(1, 70000.0);
        assert_eq!(frame.sample(1), 65535.0);
        assert_eq!(frame.sample(9), 0.0);
    }

    #[test]
    fn test_malformed_frame() {
        let mut frame = Frame::zeroed(Channel::Color, 4, 4, FrameFormat::Bgrx);
        assert!(frame.is_well_formed());
        frame.data.truncate(10);
        assert!(!frame.is_well_formed());
        assert!(!Frame::zeroed(Channel::Depth, 0, 0, FrameFormat::Float).is_well_formed());
    }
}
