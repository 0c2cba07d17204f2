//! Camera calibration reported by the hardware layer
//!
//! Defaults are the factory values of a typical time-of-flight sensor pair,
//! used when a device does not report its own.

use serde::{Deserialize, Serialize};

/// Depth/infrared camera intrinsics and lens distortion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrCameraParams {
    /// Focal length x (pixel)
    pub fx: f32,
    /// Focal length y (pixel)
    pub fy: f32,
    /// Principal point x (pixel)
    pub cx: f32,
    /// Principal point y (pixel)
    pub cy: f32,
    /// Radial distortion coefficients
    pub k1: f32,
    pub k2: f32,
    pub k3: f32,
    /// Tangential distortion coefficients
    pub p1: f32,
    pub p2: f32,
}

impl Default for IrCameraParams {
    fn default() -> Self {
        Self {
            fx: 365.456,
            fy: 365.456,
            cx: 254.878,
            cy: 205.395,
            k1: 0.0905474,
            k2: -0.26819,
            k3: 0.0950862,
            p1: 0.0,
            p2: 0.0,
        }
    }
}

/// Color camera intrinsics plus the depth-to-color mapping polynomial
///
/// `mx_*` / `my_*` are the coefficients of a cubic polynomial in the
/// normalized depth coordinates; `xAyB` multiplies `x^A * y^B`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorCameraParams {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,

    /// Stereo baseline terms
    pub shift_d: f32,
    pub shift_m: f32,

    pub mx_x3y0: f32,
    pub mx_x0y3: f32,
    pub mx_x2y1: f32,
    pub mx_x1y2: f32,
    pub mx_x2y0: f32,
    pub mx_x0y2: f32,
    pub mx_x1y1: f32,
    pub mx_x1y0: f32,
    pub mx_x0y1: f32,
    pub mx_x0y0: f32,

    pub my_x3y0: f32,
    pub my_x0y3: f32,
    pub my_x2y1: f32,
    pub my_x1y2: f32,
    pub my_x2y0: f32,
    pub my_x0y2: f32,
    pub my_x1y1: f32,
    pub my_x1y0: f32,
    pub my_x0y1: f32,
    pub my_x0y0: f32,
}

impl Default for ColorCameraParams {
    fn default() -> Self {
        Self {
            fx: 1081.37,
            fy: 1081.37,
            cx: 959.5,
            cy: 539.5,
            shift_d: 863.0,
            shift_m: 52.0,
            mx_x3y0: 0.0,
            mx_x0y3: 0.0,
            mx_x2y1: 0.0,
            mx_x1y2: 0.0,
            mx_x2y0: 0.0,
            mx_x0y2: 0.0,
            mx_x1y1: 0.0,
            mx_x1y0: 0.651,
            mx_x0y1: 0.0,
            mx_x0y0: 0.0,
            my_x3y0: 0.0,
            my_x0y3: 0.0,
            my_x2y1: 0.0,
            my_x1y2: 0.0,
            my_x2y0: 0.0,
            my_x0y2: 0.0,
            my_x1y1: 0.0,
            my_x1y0: 0.0,
            my_x0y1: 0.651,
            my_x0y0: 0.0,
        }
    }
}
