// SPDX-License-Identifier: GPL-3.0-only

//! Camera projection snapshot
//!
//! View space is +X right, +Y up, +Z forward. Depth values throughout the
//! crate are view-space Z. Perspective matrices use reversed Z with an
//! infinite far plane, so device Z is `near / z`.

use crate::errors::ConfigurationError;
use nalgebra::{Matrix3, Matrix4, Vector2, Vector3, Vector4};
use serde::{Deserialize, Serialize};

const EPSILON: f32 = 1e-6;

/// What kind of camera produced an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraType {
    /// Rendered camera in the scene
    Virtual,
    /// Real sensor with a known near/far convention
    Physical,
    #[default]
    Unknown,
}

impl CameraType {
    pub fn display_name(&self) -> &'static str {
        match self {
            CameraType::Virtual => "virtual",
            CameraType::Physical => "physical",
            CameraType::Unknown => "unknown",
        }
    }
}

/// Pixel-space pinhole parameters in the vision convention (+Y down).
///
/// Used by the pose solver and reprojection error helpers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl PinholeIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Camera matrix K
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Project a camera-space point to pixels, `None` behind the camera
    pub fn project(&self, p: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        Some(Vector2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }
}

/// Result of projecting a view-space point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected {
    /// Texture coordinate, (0,0) top-left
    pub uv: Vector2<f32>,
    /// Post-divide Z
    pub device_z: f32,
}

impl Projected {
    /// Whether the projection lands inside the image
    pub fn in_bounds(&self) -> bool {
        (0.0..=1.0).contains(&self.uv.x) && (0.0..=1.0).contains(&self.uv.y)
    }
}

/// Immutable per-frame projection snapshot of one camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsicData {
    pub view_to_ndc: Matrix4<f32>,
    pub ndc_to_view: Matrix4<f32>,
    /// Radians
    pub horizontal_fov: f32,
    /// Radians
    pub vertical_fov: f32,
    pub camera_type: CameraType,
}

impl CameraIntrinsicData {
    /// Build from an arbitrary projection matrix.
    ///
    /// Fails when the matrix is singular or yields a field of view outside (0, π).
    pub fn from_projection(
        view_to_ndc: Matrix4<f32>,
        camera_type: CameraType,
    ) -> Result<Self, ConfigurationError> {
        let ndc_to_view = view_to_ndc.try_inverse().ok_or_else(|| {
            ConfigurationError::InvalidIntrinsics("projection matrix is singular".to_string())
        })?;

        let sx = view_to_ndc[(0, 0)];
        let sy = view_to_ndc[(1, 1)];
        let intrinsics = Self {
            view_to_ndc,
            ndc_to_view,
            horizontal_fov: 2.0 * (1.0 / sx).atan(),
            vertical_fov: 2.0 * (1.0 / sy).atan(),
            camera_type,
        };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Symmetric perspective from a horizontal field of view.
    ///
    /// `aspect_ratio` is width / height.
    pub fn perspective(
        horizontal_fov: f32,
        aspect_ratio: f32,
        near: f32,
        camera_type: CameraType,
    ) -> Result<Self, ConfigurationError> {
        if !(horizontal_fov > 0.0 && horizontal_fov < std::f32::consts::PI) {
            return Err(ConfigurationError::InvalidIntrinsics(format!(
                "horizontal fov {} outside (0, pi)",
                horizontal_fov
            )));
        }
        if !(aspect_ratio > 0.0) || !(near > 0.0) {
            return Err(ConfigurationError::InvalidIntrinsics(format!(
                "aspect ratio {} and near plane {} must be positive",
                aspect_ratio, near
            )));
        }

        let sx = 1.0 / (horizontal_fov * 0.5).tan();
        let sy = sx * aspect_ratio;
        Self::from_projection(reversed_z_projection(sx, sy, 0.0, 0.0, near), camera_type)
    }

    /// Perspective from pixel focal lengths and principal point
    pub fn from_pinhole(
        pinhole: PinholeIntrinsics,
        width: u32,
        height: u32,
        near: f32,
        camera_type: CameraType,
    ) -> Result<Self, ConfigurationError> {
        if width == 0 || height == 0 || !(pinhole.fx > 0.0) || !(pinhole.fy > 0.0) {
            return Err(ConfigurationError::InvalidIntrinsics(format!(
                "pinhole {:?} at {}x{} is degenerate",
                pinhole, width, height
            )));
        }
        if !(near > 0.0) {
            return Err(ConfigurationError::InvalidIntrinsics(format!(
                "near plane {} must be positive",
                near
            )));
        }

        let w = width as f32;
        let h = height as f32;
        let sx = 2.0 * pinhole.fx as f32 / w;
        let sy = 2.0 * pinhole.fy as f32 / h;
        let ox = 2.0 * pinhole.cx as f32 / w - 1.0;
        let oy = 1.0 - 2.0 * pinhole.cy as f32 / h;
        Self::from_projection(reversed_z_projection(sx, sy, ox, oy, near), camera_type)
    }

    /// Check the snapshot invariants
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let fov_range = 0.0..std::f32::consts::PI;
        if !fov_range.contains(&self.horizontal_fov) || self.horizontal_fov <= 0.0 {
            return Err(ConfigurationError::InvalidIntrinsics(format!(
                "horizontal fov {} outside (0, pi)",
                self.horizontal_fov
            )));
        }
        if !fov_range.contains(&self.vertical_fov) || self.vertical_fov <= 0.0 {
            return Err(ConfigurationError::InvalidIntrinsics(format!(
                "vertical fov {} outside (0, pi)",
                self.vertical_fov
            )));
        }

        let identity = self.view_to_ndc * self.ndc_to_view;
        if !identity.iter().all(|v| v.is_finite())
            || (identity - Matrix4::identity()).abs().max() > 1e-3
        {
            return Err(ConfigurationError::InvalidIntrinsics(
                "ndc_to_view is not the inverse of view_to_ndc".to_string(),
            ));
        }
        Ok(())
    }

    /// Pixel-space pinhole parameters for an image of this size
    pub fn pinhole(&self, width: u32, height: u32) -> PinholeIntrinsics {
        let w = width as f64;
        let h = height as f64;
        let sx = self.view_to_ndc[(0, 0)] as f64;
        let sy = self.view_to_ndc[(1, 1)] as f64;
        let ox = self.view_to_ndc[(0, 2)] as f64;
        let oy = self.view_to_ndc[(1, 2)] as f64;
        PinholeIntrinsics {
            fx: sx * w * 0.5,
            fy: sy * h * 0.5,
            cx: (ox + 1.0) * w * 0.5,
            cy: (1.0 - oy) * h * 0.5,
        }
    }

    /// Angular footprint of one pixel along X, as `tan(hfov/2) / width`
    pub fn pixel_footprint_x(&self, width: u32) -> f32 {
        (self.horizontal_fov * 0.5).tan() / width.max(1) as f32
    }

    /// Angular footprint of one pixel along Y, as `tan(vfov/2) / height`
    pub fn pixel_footprint_y(&self, height: u32) -> f32 {
        (self.vertical_fov * 0.5).tan() / height.max(1) as f32
    }

    /// View-space point seen at `uv` with view-space depth `depth`
    pub fn deproject(&self, uv: Vector2<f32>, depth: f32) -> Option<Vector3<f32>> {
        let ndc = uv_to_ndc(uv);
        let h = self.ndc_to_view * Vector4::new(ndc.x, ndc.y, 0.5, 1.0);
        if h.w.abs() < EPSILON {
            return None;
        }
        let ray = h.xyz() / h.w;
        if ray.z <= EPSILON {
            return None;
        }
        Some(ray * (depth / ray.z))
    }

    /// Project a view-space point, `None` when it is behind the camera
    pub fn project(&self, point: &Vector3<f32>) -> Option<Projected> {
        let clip = self.view_to_ndc * point.push(1.0);
        if clip.w <= EPSILON {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        Some(Projected {
            uv: ndc_to_uv(Vector2::new(ndc.x, ndc.y)),
            device_z: ndc.z,
        })
    }
}

/// Reversed-Z, infinite far plane perspective
pub fn reversed_z_projection(sx: f32, sy: f32, ox: f32, oy: f32, near: f32) -> Matrix4<f32> {
    Matrix4::new(
        sx, 0.0, ox, 0.0, //
        0.0, sy, oy, 0.0, //
        0.0, 0.0, 0.0, near, //
        0.0, 0.0, 1.0, 0.0,
    )
}

/// Texture coordinate to normalized device coordinate (Y flipped)
#[inline]
pub fn uv_to_ndc(uv: Vector2<f32>) -> Vector2<f32> {
    Vector2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0)
}

#[inline]
pub fn ndc_to_uv(ndc: Vector2<f32>) -> Vector2<f32> {
    Vector2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
}

/// Center of pixel (x, y) as a texture coordinate
#[inline]
pub fn pixel_center_uv(x: u32, y: u32, width: u32, height: u32) -> Vector2<f32> {
    Vector2::new(
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_perspective_fov_round_trip() {
        let cam = CameraIntrinsicData::perspective(FRAC_PI_2, 16.0 / 9.0, 10.0, CameraType::Virtual)
            .unwrap();
        assert!((cam.horizontal_fov - FRAC_PI_2).abs() < 1e-5);
        let expected_v = 2.0 * ((FRAC_PI_2 * 0.5).tan() / (16.0 / 9.0)).atan();
        assert!((cam.vertical_fov - expected_v).abs() < 1e-5);
        assert!(cam.validate().is_ok());
    }

    #[test]
    fn test_deproject_project_round_trip() {
        let cam =
            CameraIntrinsicData::perspective(1.2, 4.0 / 3.0, 10.0, CameraType::Physical).unwrap();
        let uv = Vector2::new(0.3, 0.8);
        let p = cam.deproject(uv, 150.0).unwrap();
        assert!((p.z - 150.0).abs() < 1e-3);
        // v > 0.5 is below the optical axis
        assert!(p.y < 0.0);

        let projected = cam.project(&p).unwrap();
        assert!((projected.uv - uv).norm() < 1e-5);
        assert!((projected.device_z - 10.0 / 150.0).abs() < 1e-5);
    }

    #[test]
    fn test_project_behind_camera() {
        let cam = CameraIntrinsicData::perspective(1.0, 1.0, 1.0, CameraType::Virtual).unwrap();
        assert!(cam.project(&Vector3::new(0.0, 0.0, -5.0)).is_none());
    }

    #[test]
    fn test_pinhole_round_trip() {
        let pinhole = PinholeIntrinsics::new(594.21, 591.04, 339.5, 242.7);
        let cam =
            CameraIntrinsicData::from_pinhole(pinhole, 640, 480, 40.0, CameraType::Physical)
                .unwrap();
        let back = cam.pinhole(640, 480);
        assert!((back.fx - pinhole.fx).abs() < 1e-2);
        assert!((back.fy - pinhole.fy).abs() < 1e-2);
        assert!((back.cx - pinhole.cx).abs() < 1e-2);
        assert!((back.cy - pinhole.cy).abs() < 1e-2);

        // Principal point deprojects onto the optical axis
        let uv = Vector2::new(339.5 / 640.0, 242.7 / 480.0);
        let p = cam.deproject(uv, 100.0).unwrap();
        assert!(p.x.abs() < 1e-3 && p.y.abs() < 1e-3);
    }

    #[test]
    fn test_singular_projection_rejected() {
        let result = CameraIntrinsicData::from_projection(Matrix4::zeros(), CameraType::Virtual);
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidIntrinsics(_))
        ));
    }

    #[test]
    fn test_invalid_fov_rejected() {
        assert!(CameraIntrinsicData::perspective(0.0, 1.0, 1.0, CameraType::Virtual).is_err());
        assert!(
            CameraIntrinsicData::perspective(std::f32::consts::PI, 1.0, 1.0, CameraType::Virtual)
                .is_err()
        );
    }
}
