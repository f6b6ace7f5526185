// SPDX-License-Identifier: GPL-3.0-only

//! Kinect v1 depth camera intrinsics
//!
//! Default physical source camera when none is configured.
//! Reference resolution: 640x480 (medium resolution depth mode)

use super::intrinsics::{CameraIntrinsicData, CameraType, PinholeIntrinsics};
use crate::errors::ConfigurationError;

/// Focal length X (pixels) at 640x480 base resolution
pub const FX: f64 = 594.21;
/// Focal length Y (pixels) at 640x480 base resolution
pub const FY: f64 = 591.04;
/// Principal point X (pixels) at 640x480 base resolution
pub const CX: f64 = 339.5;
/// Principal point Y (pixels) at 640x480 base resolution
pub const CY: f64 = 242.7;

/// Base width for intrinsics calculation
pub const BASE_WIDTH: u32 = 640;
/// Base height for intrinsics calculation
pub const BASE_HEIGHT: u32 = 480;

/// Sensor near limit in world units (0.4 m)
pub const NEAR_PLANE: f32 = 40.0;

/// Pinhole parameters scaled to the given resolution
pub fn pinhole(width: u32, height: u32) -> PinholeIntrinsics {
    let scale_x = width as f64 / BASE_WIDTH as f64;
    let scale_y = height as f64 / BASE_HEIGHT as f64;
    PinholeIntrinsics::new(FX * scale_x, FY * scale_y, CX * scale_x, CY * scale_y)
}

impl CameraIntrinsicData {
    /// Kinect depth camera at the given resolution
    pub fn kinect(width: u32, height: u32) -> Result<Self, ConfigurationError> {
        Self::from_pinhole(
            pinhole(width, height),
            width,
            height,
            NEAR_PLANE,
            CameraType::Physical,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinect_fov() {
        let cam = CameraIntrinsicData::kinect(640, 480).unwrap();
        // ~57 x 44 degrees
        assert!((cam.horizontal_fov.to_degrees() - 56.6).abs() < 1.0);
        assert!((cam.vertical_fov.to_degrees() - 44.2).abs() < 1.0);
        assert_eq!(cam.camera_type, CameraType::Physical);
    }

    #[test]
    fn test_kinect_scales_with_resolution() {
        let low = CameraIntrinsicData::kinect(320, 240).unwrap();
        let base = CameraIntrinsicData::kinect(640, 480).unwrap();
        assert!((low.horizontal_fov - base.horizontal_fov).abs() < 1e-5);
        let p = pinhole(320, 240);
        assert!((p.fx - FX / 2.0).abs() < 1e-9);
    }
}
