// SPDX-License-Identifier: GPL-3.0-only

//! Vision backend seams used by checkerboard calibration
//!
//! Corner detection is external: a [`CornerDetector`] is plugged into the
//! calibrator, or corners found by another tool are fed in through
//! [`PrecomputedCorners`]. Pose solving goes through [`PoseSolver`]; the
//! crate ships a homography-based solver for planar boards.

use crate::camera::{CameraIntrinsicData, PinholeIntrinsics};
use crate::errors::AppResult;
use image::GrayImage;
use nalgebra::{Isometry3, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Radial/tangential distortion coefficients (k1, k2, p1, p2, k3)
pub type Distortion = [f64; 5];

/// One camera's view of the checkerboard
#[derive(Debug, Clone)]
pub struct CalibrationTarget {
    /// Lookup key, e.g. the camera source name
    pub name: String,
    pub image: Option<GrayImage>,
    pub intrinsics: Option<CameraIntrinsicData>,
}

impl CalibrationTarget {
    pub fn new(
        name: impl Into<String>,
        image: Option<GrayImage>,
        intrinsics: Option<CameraIntrinsicData>,
    ) -> Self {
        Self {
            name: name.into(),
            image,
            intrinsics,
        }
    }

    /// Image and intrinsics, when both are present and the image is not empty
    pub fn resolve(&self) -> Option<(&GrayImage, &CameraIntrinsicData)> {
        match (&self.image, &self.intrinsics) {
            (Some(image), Some(intrinsics)) if image.width() > 0 && image.height() > 0 => {
                Some((image, intrinsics))
            }
            _ => None,
        }
    }
}

/// Finds inner checkerboard corners in pixel coordinates, row-major
pub trait CornerDetector: Send + Sync {
    fn find_checkerboard_corners(
        &self,
        target: &CalibrationTarget,
        image: &GrayImage,
        dimensions: [u32; 2],
    ) -> Option<Vec<Vector2<f64>>>;
}

/// Board-to-camera pose from 3D/2D correspondences
pub trait PoseSolver: Send + Sync {
    fn solve_pnp(
        &self,
        object_points: &[Vector3<f64>],
        image_points: &[Vector2<f64>],
        pinhole: &PinholeIntrinsics,
        distortion: &Distortion,
    ) -> Option<Isometry3<f64>>;
}

/// Corner lists keyed by target name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedCorners {
    corners: HashMap<String, Vec<[f64; 2]>>,
}

impl PrecomputedCorners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: impl Into<String>, corners: Vec<Vector2<f64>>) {
        self.corners
            .insert(target.into(), corners.iter().map(|c| [c.x, c.y]).collect());
    }

    pub fn with(mut self, target: impl Into<String>, corners: Vec<Vector2<f64>>) -> Self {
        self.insert(target, corners);
        self
    }

    pub fn len(&self) -> usize {
        self.corners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    /// Load a JSON list of `[x, y]` pixel corners for one target
    pub fn load_target(&mut self, target: impl Into<String>, path: &Path) -> AppResult<usize> {
        let contents = std::fs::read_to_string(path)?;
        let corners: Vec<[f64; 2]> = serde_json::from_str(&contents)?;
        let count = corners.len();
        self.corners.insert(target.into(), corners);
        Ok(count)
    }
}

impl CornerDetector for PrecomputedCorners {
    fn find_checkerboard_corners(
        &self,
        target: &CalibrationTarget,
        _image: &GrayImage,
        _dimensions: [u32; 2],
    ) -> Option<Vec<Vector2<f64>>> {
        self.corners
            .get(&target.name)
            .filter(|corners| !corners.is_empty())
            .map(|corners| corners.iter().map(|c| Vector2::new(c[0], c[1])).collect())
    }
}

/// Object-space inner corners, row-major, on the board's Z = 0 plane
pub fn checkerboard_object_points(dimensions: [u32; 2], square_size: f32) -> Vec<Vector3<f64>> {
    let size = square_size as f64;
    (0..dimensions[1])
        .flat_map(|y| (0..dimensions[0]).map(move |x| Vector3::new(x as f64 * size, y as f64 * size, 0.0)))
        .collect()
}

/// Project a distorted point through the pinhole model
pub fn project_point(
    point: &Vector3<f64>,
    pinhole: &PinholeIntrinsics,
    distortion: &Distortion,
) -> Option<Vector2<f64>> {
    if point.z <= f64::EPSILON {
        return None;
    }
    let x = point.x / point.z;
    let y = point.y / point.z;
    let [k1, k2, p1, p2, k3] = *distortion;
    let r2 = x * x + y * y;
    let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
    let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
    let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
    Some(Vector2::new(
        pinhole.fx * xd + pinhole.cx,
        pinhole.fy * yd + pinhole.cy,
    ))
}

/// RMS pixel distance between observed corners and the posed board's projection.
///
/// Points that project behind the camera count as infinite error.
pub fn reprojection_error(
    object_points: &[Vector3<f64>],
    image_points: &[Vector2<f64>],
    pinhole: &PinholeIntrinsics,
    distortion: &Distortion,
    pose: &Isometry3<f64>,
) -> f64 {
    if object_points.is_empty() || object_points.len() != image_points.len() {
        return f64::INFINITY;
    }
    let mut sum = 0.0;
    for (object, observed) in object_points.iter().zip(image_points) {
        let camera = pose * Point3::from(*object);
        match project_point(&camera.coords, pinhole, distortion) {
            Some(projected) => sum += (projected - observed).norm_squared(),
            None => return f64::INFINITY,
        }
    }
    (sum / object_points.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn test_object_points_row_major() {
        let points = checkerboard_object_points([3, 2], 2.5);
        assert_eq!(points.len(), 6);
        assert_eq!(points[1], Vector3::new(2.5, 0.0, 0.0));
        assert_eq!(points[3], Vector3::new(0.0, 2.5, 0.0));
        assert!(points.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn test_reprojection_error_zero_for_exact_corners() {
        let pinhole = PinholeIntrinsics::new(500.0, 500.0, 320.0, 240.0);
        let pose = Isometry3::from_parts(
            Translation3::new(-5.0, -3.0, 60.0),
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.05),
        );
        let object = checkerboard_object_points([5, 4], 2.0);
        let image: Vec<_> = object
            .iter()
            .map(|p| pinhole.project(&(pose * Point3::from(*p)).coords).unwrap())
            .collect();
        let error = reprojection_error(&object, &image, &pinhole, &[0.0; 5], &pose);
        assert!(error < 1e-9);

        let shifted: Vec<_> = image.iter().map(|p| p + Vector2::new(3.0, 4.0)).collect();
        let error = reprojection_error(&object, &shifted, &pinhole, &[0.0; 5], &pose);
        assert!((error - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_reprojection_error_mismatch_is_infinite() {
        let pinhole = PinholeIntrinsics::new(500.0, 500.0, 320.0, 240.0);
        let object = checkerboard_object_points([2, 2], 1.0);
        let error = reprojection_error(
            &object,
            &[Vector2::zeros()],
            &pinhole,
            &[0.0; 5],
            &Isometry3::identity(),
        );
        assert!(error.is_infinite());
    }

    #[test]
    fn test_precomputed_corners_by_name() {
        let corners = PrecomputedCorners::new().with("kinect", vec![Vector2::new(1.0, 2.0)]);
        let image = GrayImage::new(4, 4);
        let kinect = CalibrationTarget::new("kinect", Some(image.clone()), None);
        let other = CalibrationTarget::new("virtual", Some(image.clone()), None);
        assert_eq!(
            corners.find_checkerboard_corners(&kinect, &image, [1, 1]),
            Some(vec![Vector2::new(1.0, 2.0)])
        );
        assert_eq!(corners.find_checkerboard_corners(&other, &image, [1, 1]), None);
    }

    #[test]
    fn test_target_requires_image_and_intrinsics() {
        let intrinsics = CameraIntrinsicData::kinect(4, 4).unwrap();
        assert!(CalibrationTarget::new("a", None, Some(intrinsics)).resolve().is_none());
        assert!(CalibrationTarget::new("a", Some(GrayImage::new(4, 4)), None).resolve().is_none());
        assert!(
            CalibrationTarget::new("a", Some(GrayImage::new(0, 0)), Some(intrinsics))
                .resolve()
                .is_none()
        );
        assert!(
            CalibrationTarget::new("a", Some(GrayImage::new(4, 4)), Some(intrinsics))
                .resolve()
                .is_some()
        );
    }
}
