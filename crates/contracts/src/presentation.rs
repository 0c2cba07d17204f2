//! PresentationFrame - Processing output
//!
//! Display-ready images handed to the presentation sinks.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Channel, DeviceIndex};

/// 3-channel 8-bit image (RGB, row-major)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayImage {
    /// Source plane
    pub channel: Channel,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl DisplayImage {
    /// Black image of the given size
    pub fn black(channel: Channel, width: u32, height: u32) -> Self {
        Self {
            channel,
            width,
            height,
            data: Bytes::from(vec![0u8; width as usize * height as usize * 3]),
        }
    }

    /// True when the buffer matches `width * height * 3`
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * 3
    }
}

/// One synchronized capture prepared for display
///
/// Carries up to three same-sized images, one per captured channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationFrame {
    /// Producing device
    pub device_index: DeviceIndex,

    /// Producing device serial
    pub serial: String,

    /// Per-device frame counter (monotonically increasing)
    pub sequence: u64,

    /// Share of valid depth pixels that received a color sample;
    /// `None` when registration did not run
    pub registered_ratio: Option<f32>,

    /// Prepared images in channel order
    pub panels: Vec<DisplayImage>,
}

impl PresentationFrame {
    /// Image for a channel, if captured
    pub fn panel(&self, channel: Channel) -> Option<&DisplayImage> {
        self.panels.iter().find(|p| p.channel == channel)
    }

    /// Common panel size; `None` when there are no panels
    pub fn panel_size(&self) -> Option<(u32, u32)> {
        self.panels.first().map(|p| (p.width, p.height))
    }
}
