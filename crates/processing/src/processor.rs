//! Per-device frame processor
//!
//! Registration, normalization and display preparation of one capture.
//! One processor per device: the registration tables carry that device's
//! calibration.

use std::time::{Duration, Instant};

use contracts::{
    Channel, ColorCameraParams, DeviceIndex, DisplayImage, Frame, IrCameraParams,
    PresentationFrame,
};
use image::RgbImage;
use tracing::{instrument, trace};

use crate::display::{color_to_rgb, gray_to_rgb, prepare_panel, PanelSize};
use crate::normalize::{normalize_depth, normalize_infrared};
use crate::registration::Registration;

/// Borrowed planes of one capture
#[derive(Debug, Default, Clone, Copy)]
pub struct CapturePlanes<'a> {
    pub color: Option<&'a Frame>,
    pub depth: Option<&'a Frame>,
    pub infrared: Option<&'a Frame>,
}

/// Output of [`FrameProcessor::process`]
#[derive(Debug, Clone)]
pub struct ProcessedCapture {
    pub frame: PresentationFrame,
    /// Time spent in registration, when it ran
    pub registration_time: Option<Duration>,
}

pub struct FrameProcessor {
    device_index: DeviceIndex,
    serial: String,
    registration: Option<Registration>,
    panel_size: PanelSize,
}

impl FrameProcessor {
    /// Processor without registration
    pub fn new(device_index: DeviceIndex, serial: impl Into<String>, panel_size: PanelSize) -> Self {
        Self {
            device_index,
            serial: serial.into(),
            registration: None,
            panel_size,
        }
    }

    /// Enable registration with the device calibration
    pub fn with_registration(
        mut self,
        ir: IrCameraParams,
        color: ColorCameraParams,
        filter_occlusions: bool,
    ) -> Self {
        self.registration =
            Some(Registration::new(ir, color).with_occlusion_filter(filter_occlusions));
        self
    }

    pub fn device_index(&self) -> DeviceIndex {
        self.device_index
    }

    pub fn registration(&self) -> Option<&Registration> {
        self.registration.as_ref()
    }

    /// Prepare one capture for the sinks.
    ///
    /// Registration runs only when both color and depth are present; the
    /// depth panel then shows the undistorted plane. Panels follow channel
    /// order and are all `panel_size`.
    #[instrument(
        name = "frame_processor_process",
        skip(self, planes),
        fields(device_index = self.device_index)
    )]
    pub fn process(&self, sequence: u64, planes: CapturePlanes<'_>) -> ProcessedCapture {
        let (registered, registration_time) =
            match (&self.registration, planes.color, planes.depth) {
                (Some(registration), Some(color), Some(depth)) => {
                    let started = Instant::now();
                    let pair = registration.apply(color, depth);
                    (Some(pair), Some(started.elapsed()))
                }
                _ => (None, None),
            };
        let registered_ratio = registered
            .as_ref()
            .map(|pair| registered_ratio(&pair.undistorted, &pair.registered_color));

        let mut panels: Vec<DisplayImage> = Vec::with_capacity(3);
        if let Some(color) = planes.color {
            panels.push(self.panel(Channel::Color, color_to_rgb(color)));
        }
        if let Some(depth) = planes.depth {
            let depth = registered.as_ref().map_or(depth, |pair| &pair.undistorted);
            panels.push(self.panel(Channel::Depth, gray_to_rgb(normalize_depth(depth))));
        }
        if let Some(infrared) = planes.infrared {
            panels.push(self.panel(Channel::Infrared, gray_to_rgb(normalize_infrared(infrared))));
        }

        trace!(panels = panels.len(), ?registered_ratio, "capture prepared");

        ProcessedCapture {
            frame: PresentationFrame {
                device_index: self.device_index,
                serial: self.serial.clone(),
                sequence,
                registered_ratio,
                panels,
            },
            registration_time,
        }
    }

    fn panel(&self, channel: Channel, image: RgbImage) -> DisplayImage {
        prepare_panel(channel, image, self.panel_size)
    }
}

/// Share of positive depth pixels with a non-black registered color
fn registered_ratio(undistorted: &Frame, registered: &Frame) -> f32 {
    let (valid, colored) = (0..undistorted.pixel_count())
        .filter(|&i| undistorted.sample(i) > 0.0)
        .fold((0usize, 0usize), |(valid, colored), i| {
            let [b, g, r, _] = registered.pixel(i);
            (valid + 1, colored + usize::from(b | g | r != 0))
        });
    if valid == 0 {
        0.0
    } else {
        colored as f32 / valid as f32
    }
}
