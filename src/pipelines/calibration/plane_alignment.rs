// SPDX-License-Identifier: GPL-3.0-only

//! Transform from a fitted calibration plane
//!
//! The physical target is a flat board placed `known_distance` in front of
//! the destination camera, square to its view axis. Aligning the fitted
//! plane with that placement gives the source-to-destination transform:
//!
//! 1. rotate the fitted normal onto (0, 0, -1)
//! 2. spin about that axis by the user-tuned tangent angle
//! 3. translate the rotated centroid onto (0, 0, known_distance)

use super::plane::Plane;
use crate::camera::ExtrinsicTransform;
use crate::constants::calibration::DEFAULT_KNOWN_DISTANCE;
use crate::errors::ConfigurationError;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneAlignment {
    /// Distance of the board from the destination camera
    pub known_distance: f32,
    /// In-plane rotation about the destination view axis, degrees
    pub tangent_alignment_angle_deg: f32,
}

impl Default for PlaneAlignment {
    fn default() -> Self {
        Self {
            known_distance: DEFAULT_KNOWN_DISTANCE,
            tangent_alignment_angle_deg: 0.0,
        }
    }
}

impl PlaneAlignment {
    pub fn new(known_distance: f32, tangent_alignment_angle_deg: f32) -> Self {
        Self {
            known_distance,
            tangent_alignment_angle_deg,
        }
    }

    /// Source-to-destination transform placing `plane` on the board position
    pub fn solve(&self, plane: &Plane) -> Result<ExtrinsicTransform, ConfigurationError> {
        if !(self.known_distance > 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "known distance {} must be positive",
                self.known_distance
            )));
        }

        let plane = plane.facing_camera();
        let normal = plane.normal.cast::<f64>();
        let target_axis = -Vector3::z_axis();
        let target_normal = target_axis.into_inner();

        let align_normal = UnitQuaternion::rotation_between(&normal, &target_normal)
            .unwrap_or_else(|| {
                // Normal points straight away from the camera
                UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f64::consts::PI)
            });
        let align_tangent = UnitQuaternion::from_axis_angle(
            &target_axis,
            (self.tangent_alignment_angle_deg as f64).to_radians(),
        );
        let rotation = align_tangent * align_normal;

        let target_origin = Vector3::new(0.0, 0.0, self.known_distance as f64);
        let translation = target_origin - rotation * plane.origin.cast::<f64>();

        info!(
            normal_x = plane.normal.x,
            normal_y = plane.normal.y,
            normal_z = plane.normal.z,
            origin_z = plane.origin.z,
            angle_deg = rotation.angle().to_degrees(),
            "Plane alignment solved"
        );

        Ok(ExtrinsicTransform::new(rotation, translation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::calibration::plane::fit_plane;

    fn board(origin: Vector3<f32>, normal: Vector3<f32>) -> Vec<Vector3<f32>> {
        let normal = normal.normalize();
        let u = normal.cross(&Vector3::x()).normalize();
        let v = normal.cross(&u);
        let mut points = Vec::new();
        for i in -4..=4 {
            for j in -3..=3 {
                points.push(origin + u * (i as f32 * 4.0) + v * (j as f32 * 4.0));
            }
        }
        points
    }

    #[test]
    fn test_tilted_plane_lands_on_board() {
        let origin = Vector3::new(10.0, -5.0, 140.0);
        let normal = Vector3::new(0.3, -0.2, -0.9);
        let points = board(origin, normal);
        let plane = fit_plane(&points).unwrap();

        let alignment = PlaneAlignment::new(100.0, 0.0);
        let transform = alignment.solve(&plane).unwrap();

        for p in &points {
            let moved = transform.transform_point(p);
            assert!((moved.z - 100.0).abs() < 1e-2, "z = {}", moved.z);
        }
        let centre = transform.transform_point(&plane.origin);
        assert!(centre.x.abs() < 1e-3 && centre.y.abs() < 1e-3);
    }

    #[test]
    fn test_facing_plane_only_translates() {
        let points = board(Vector3::new(0.0, 0.0, 80.0), Vector3::new(0.0, 0.0, -1.0));
        let plane = fit_plane(&points).unwrap();
        let transform = PlaneAlignment::default().solve(&plane).unwrap();
        assert!(transform.rotation.angle() < 1e-4);
        assert!((transform.translation.z - 20.0).abs() < 1e-3);
        let view_axis = transform.rotation * Vector3::new(0.0, 0.0, -1.0);
        assert!((view_axis.z + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tangent_angle_spins_about_view_axis() {
        let points = board(Vector3::new(0.0, 0.0, 100.0), Vector3::new(0.0, 0.0, -1.0));
        let plane = fit_plane(&points).unwrap();
        let transform = PlaneAlignment::new(100.0, 90.0).solve(&plane).unwrap();
        let moved = transform.transform_point(&Vector3::new(10.0, 0.0, 100.0));
        assert!(moved.x.abs() < 1e-3);
        assert!((moved.y.abs() - 10.0).abs() < 1e-3);
        assert!((moved.z - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_non_positive_distance_rejected() {
        let points = board(Vector3::new(0.0, 0.0, 100.0), Vector3::new(0.0, 0.0, -1.0));
        let plane = fit_plane(&points).unwrap();
        assert!(PlaneAlignment::new(0.0, 0.0).solve(&plane).is_err());
    }
}
