//! Depth / color registration
//!
//! Maps every depth pixel into the color camera using the per-device
//! calibration: lens distortion of the depth camera is removed, then a
//! cubic polynomial plus a depth dependent stereo shift gives the color
//! pixel. Lookup tables are built once per device.

use contracts::{
    ColorCameraParams, Frame, FrameFormat, IrCameraParams, RegisteredFramePair, COLOR_HEIGHT,
    COLOR_WIDTH, DEPTH_HEIGHT, DEPTH_WIDTH,
};
use tracing::debug;

/// Depth coordinate quantization of the mapping polynomial
const DEPTH_Q: f32 = 0.01;
/// Color coordinate quantization of the mapping polynomial
const COLOR_Q: f32 = 0.002199;
/// Relative depth difference above which a color sample counts as occluded
const FILTER_TOLERANCE: f32 = 0.01;

const DEPTH_SIZE: usize = (DEPTH_WIDTH * DEPTH_HEIGHT) as usize;
const COLOR_W: i32 = COLOR_WIDTH as i32;
const COLOR_H: i32 = COLOR_HEIGHT as i32;

/// Registration engine for one device.
///
/// Immutable after construction; `apply` can run concurrently on disjoint
/// frames. Build a new one whenever the active device changes.
#[derive(Debug, Clone)]
pub struct Registration {
    ir: IrCameraParams,
    color: ColorCameraParams,
    filter_occlusions: bool,
    /// Depth pixel -> source pixel in the distorted image, `None` outside
    distort_map: Vec<Option<u32>>,
    /// Depth pixel -> color x before the depth dependent shift
    map_x: Vec<f32>,
    /// Depth pixel -> color row
    map_yi: Vec<i32>,
}

impl Registration {
    /// Build the lookup tables; occlusion filtering is on
    pub fn new(ir: IrCameraParams, color: ColorCameraParams) -> Self {
        let mut registration = Self {
            ir,
            color,
            filter_occlusions: true,
            distort_map: Vec::with_capacity(DEPTH_SIZE),
            map_x: Vec::with_capacity(DEPTH_SIZE),
            map_yi: Vec::with_capacity(DEPTH_SIZE),
        };

        for y in 0..DEPTH_HEIGHT {
            for x in 0..DEPTH_WIDTH {
                let (dx, dy) = registration.distort(x as f32, y as f32);
                let ix = (dx + 0.5).floor();
                let iy = (dy + 0.5).floor();
                let inside =
                    ix >= 0.0 && iy >= 0.0 && ix < DEPTH_WIDTH as f32 && iy < DEPTH_HEIGHT as f32;
                registration
                    .distort_map
                    .push(inside.then(|| iy as u32 * DEPTH_WIDTH + ix as u32));

                let (rx, ry) = registration.depth_to_color(x as f32, y as f32);
                registration.map_x.push(rx);
                registration.map_yi.push((ry + 0.5).floor() as i32);
            }
        }

        debug!(
            mapped = registration.distort_map.iter().flatten().count(),
            "registration tables built"
        );
        registration
    }

    /// Enable or disable occlusion filtering
    pub fn with_occlusion_filter(mut self, enabled: bool) -> Self {
        self.filter_occlusions = enabled;
        self
    }

    pub fn ir_params(&self) -> &IrCameraParams {
        &self.ir
    }

    pub fn color_params(&self) -> &ColorCameraParams {
        &self.color
    }

    /// Apply depth lens distortion to an undistorted pixel position
    fn distort(&self, x: f32, y: f32) -> (f32, f32) {
        let ir = &self.ir;
        let dx = (x - ir.cx) / ir.fx;
        let dy = (y - ir.cy) / ir.fy;
        let dx2 = dx * dx;
        let dy2 = dy * dy;
        let r2 = dx2 + dy2;
        let dxdy2 = 2.0 * dx * dy;
        let kr = 1.0 + ((ir.k3 * r2 + ir.k2) * r2 + ir.k1) * r2;
        (
            ir.fx * (dx * kr + ir.p2 * (r2 + 2.0 * dx2) + ir.p1 * dxdy2) + ir.cx,
            ir.fy * (dy * kr + ir.p1 * (r2 + 2.0 * dy2) + ir.p2 * dxdy2) + ir.cy,
        )
    }

    /// Depth pixel to color coordinates, without the depth dependent shift
    fn depth_to_color(&self, x: f32, y: f32) -> (f32, f32) {
        let c = &self.color;
        let mx = (x - self.ir.cx) * DEPTH_Q;
        let my = (y - self.ir.cy) * DEPTH_Q;

        let wx = mx * mx * mx * c.mx_x3y0
            + my * my * my * c.mx_x0y3
            + mx * mx * my * c.mx_x2y1
            + my * my * mx * c.mx_x1y2
            + mx * mx * c.mx_x2y0
            + my * my * c.mx_x0y2
            + mx * my * c.mx_x1y1
            + mx * c.mx_x1y0
            + my * c.mx_x0y1
            + c.mx_x0y0;

        let wy = mx * mx * mx * c.my_x3y0
            + my * my * my * c.my_x0y3
            + mx * mx * my * c.my_x2y1
            + my * my * mx * c.my_x1y2
            + mx * mx * c.my_x2y0
            + my * my * c.my_x0y2
            + mx * my * c.my_x1y1
            + mx * c.my_x1y0
            + my * c.my_x0y1
            + c.my_x0y0;

        (
            wx / (c.fx * COLOR_Q) - c.shift_m / c.shift_d,
            wy / COLOR_Q + c.cy,
        )
    }

    fn depth_ok(depth: &Frame) -> bool {
        depth.is_well_formed()
            && depth.format.is_scalar()
            && depth.width == DEPTH_WIDTH
            && depth.height == DEPTH_HEIGHT
    }

    fn color_ok(color: &Frame) -> bool {
        color.is_well_formed()
            && !color.format.is_scalar()
            && color.width == COLOR_WIDTH
            && color.height == COLOR_HEIGHT
    }

    fn undistort_samples(&self, depth: &Frame) -> Vec<f32> {
        self.distort_map
            .iter()
            .map(|src| src.map_or(0.0, |src| depth.sample(src as usize)))
            .collect()
    }

    /// Color pixel hit by a depth pixel at distance `z`
    #[inline]
    fn color_pixel(&self, i: usize, z: f32) -> Option<(i32, i32)> {
        let cx = ((self.map_x[i] + self.color.shift_m / z) * self.color.fx + self.color.cx + 0.5)
            .floor() as i32;
        let cy = self.map_yi[i];
        (cx >= 0 && cx < COLOR_W && cy >= 0 && cy < COLOR_H).then_some((cx, cy))
    }

    /// Remove lens distortion only.
    ///
    /// A malformed depth frame yields a zero-filled depth plane.
    pub fn undistort_depth(&self, depth: &Frame) -> Frame {
        let samples = if Self::depth_ok(depth) {
            self.undistort_samples(depth)
        } else {
            vec![0.0; DEPTH_SIZE]
        };
        Frame::from_f32(depth.channel, DEPTH_WIDTH, DEPTH_HEIGHT, &samples)
            .with_sequence(depth.sequence, depth.timestamp_us)
    }

    /// Undistort depth and re-project color onto the depth grid.
    ///
    /// Never fails: a malformed depth frame yields zero-filled outputs, a
    /// malformed color frame a zero-filled registered color plane.
    pub fn apply(&self, color: &Frame, depth: &Frame) -> RegisteredFramePair {
        if !Self::depth_ok(depth) {
            return RegisteredFramePair::zeroed();
        }

        let undistorted = self.undistort_samples(depth);
        let color_format = if Self::color_ok(color) {
            color.format
        } else {
            FrameFormat::Bgrx
        };
        let mut registered = vec![0u8; DEPTH_SIZE * 4];

        if Self::color_ok(color) {
            let targets: Vec<Option<(i32, i32)>> = undistorted
                .iter()
                .enumerate()
                .map(|(i, &z)| if z > 0.0 { self.color_pixel(i, z) } else { None })
                .collect();

            let filter = self
                .filter_occlusions
                .then(|| OcclusionMap::build(&targets, &undistorted));

            for (i, target) in targets.iter().enumerate() {
                let Some((cx, cy)) = *target else {
                    continue;
                };
                if let Some(filter) = &filter {
                    if filter.is_occluded(cx, cy, undistorted[i]) {
                        continue;
                    }
                }
                let c_off = (cy * COLOR_W + cx) as usize * 4;
                registered[i * 4..i * 4 + 4].copy_from_slice(&color.data[c_off..c_off + 4]);
            }
        }

        RegisteredFramePair {
            undistorted: Frame::from_f32(depth.channel, DEPTH_WIDTH, DEPTH_HEIGHT, &undistorted)
                .with_sequence(depth.sequence, depth.timestamp_us),
            registered_color: Frame::new(
                color.channel,
                DEPTH_WIDTH,
                DEPTH_HEIGHT,
                color_format,
                registered.as_slice().into(),
            )
            .with_sequence(color.sequence, color.timestamp_us),
        }
    }

    /// 3-D point (metres) of an undistorted depth pixel; NaN where depth is invalid
    pub fn point_xyz(&self, undistorted: &Frame, row: u32, col: u32) -> [f32; 3] {
        if row >= undistorted.height || col >= undistorted.width {
            return [f32::NAN; 3];
        }
        let z = undistorted.sample((row * undistorted.width + col) as usize) / 1000.0;
        if z.is_nan() || z <= 0.001 {
            return [f32::NAN; 3];
        }
        [
            (col as f32 + 0.5 - self.ir.cx) / self.ir.fx * z,
            (row as f32 + 0.5 - self.ir.cy) / self.ir.fy * z,
            z,
        ]
    }

    /// 3-D point plus its registered color pixel (4 bytes, frame order)
    pub fn point_xyzrgb(
        &self,
        undistorted: &Frame,
        registered: &Frame,
        row: u32,
        col: u32,
    ) -> ([f32; 3], [u8; 4]) {
        let xyz = self.point_xyz(undistorted, row, col);
        let rgb = if row < registered.height && col < registered.width {
            registered.pixel((row * registered.width + col) as usize)
        } else {
            [0; 4]
        };
        (xyz, rgb)
    }
}

/// Nearest depth seen per color pixel neighbourhood
///
/// One padding row above and below the color image so that the ±1 row
/// window never leaves the map.
struct OcclusionMap {
    min_z: Vec<f32>,
}

impl OcclusionMap {
    const ROWS: i32 = COLOR_H + 2;

    fn build(targets: &[Option<(i32, i32)>], depth: &[f32]) -> Self {
        let mut min_z = vec![f32::MAX; (COLOR_W * Self::ROWS) as usize];
        for (target, &z) in targets.iter().zip(depth) {
            let Some((cx, cy)) = *target else {
                continue;
            };
            for row in cy..=cy + 2 {
                for col in (cx - 2).max(0)..=(cx + 2).min(COLOR_W - 1) {
                    let slot = &mut min_z[(row * COLOR_W + col) as usize];
                    *slot = slot.min(z);
                }
            }
        }
        Self { min_z }
    }

    fn is_occluded(&self, cx: i32, cy: i32, z: f32) -> bool {
        let nearest = self.min_z[((cy + 1) * COLOR_W + cx) as usize];
        (z - nearest) / z > FILTER_TOLERANCE
    }
}
