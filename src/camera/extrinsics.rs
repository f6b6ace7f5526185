// SPDX-License-Identifier: GPL-3.0-only

//! Rigid source-to-destination camera transform

use nalgebra::{Isometry3, Matrix4, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Maps points from source-camera space into destination-camera space:
/// `p_dst = rotation * p_src + translation`.
///
/// Produced by calibration and persisted in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtrinsicTransform {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl Default for ExtrinsicTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl ExtrinsicTransform {
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(UnitQuaternion::identity(), Vector3::zeros())
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self::new(iso.rotation, iso.translation.vector)
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }

    /// Homogeneous matrix for GPU upload
    pub fn to_matrix(&self) -> Matrix4<f32> {
        self.to_isometry().to_homogeneous().cast::<f32>()
    }

    /// Destination-to-source transform
    pub fn inverse(&self) -> Self {
        Self::from_isometry(&self.to_isometry().inverse())
    }

    pub fn transform_point(&self, p: &Vector3<f32>) -> Vector3<f32> {
        (self.rotation * p.cast::<f64>() + self.translation).cast::<f32>()
    }

    pub fn inverse_transform_point(&self, p: &Vector3<f32>) -> Vector3<f32> {
        (self.rotation.inverse() * (p.cast::<f64>() - self.translation)).cast::<f32>()
    }

    /// Rotation angle between two transforms in radians
    pub fn angle_to(&self, other: &ExtrinsicTransform) -> f64 {
        self.rotation.angle_to(&other.rotation)
    }

    pub fn translation_distance(&self, other: &ExtrinsicTransform) -> f64 {
        (self.translation - other.translation).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_round_trip() {
        let t = ExtrinsicTransform::new(
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            Vector3::new(5.0, -2.0, 1.0),
        );
        let p = Vector3::new(1.0f32, 2.0, 300.0);
        let q = t.transform_point(&p);
        let back = t.inverse_transform_point(&q);
        assert!((back - p).norm() < 1e-3);

        let via_inverse = t.inverse().transform_point(&q);
        assert!((via_inverse - p).norm() < 1e-3);
    }

    #[test]
    fn test_matrix_matches_transform() {
        let t = ExtrinsicTransform::new(
            UnitQuaternion::from_euler_angles(0.0, 0.5, 0.0),
            Vector3::new(1.0, 2.0, 3.0),
        );
        let p = Vector3::new(4.0f32, 5.0, 6.0);
        let m = t.to_matrix() * p.push(1.0);
        assert!((m.xyz() - t.transform_point(&p)).norm() < 1e-4);
    }

    #[test]
    fn test_serde_round_trip() {
        let t = ExtrinsicTransform::new(
            UnitQuaternion::from_euler_angles(0.3, 0.0, 0.0),
            Vector3::new(0.0, 10.0, 0.0),
        );
        let json = serde_json::to_string(&t).unwrap();
        let back: ExtrinsicTransform = serde_json::from_str(&json).unwrap();
        assert!(back.angle_to(&t) < 1e-9);
        assert!(back.translation_distance(&t) < 1e-9);
    }
}
