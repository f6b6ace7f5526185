// SPDX-License-Identifier: GPL-3.0-only

//! Camera sources and per-frame intrinsics resolution
//!
//! Passes never hold on to a camera. They receive plain
//! [`CameraIntrinsicData`] snapshots resolved by key once per frame.

use super::intrinsics::{CameraIntrinsicData, CameraType};
use crate::errors::MissingInputError;
use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashMap;
use tracing::debug;

/// Pose and lens of a camera as reported by the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub location: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    /// Horizontal field of view in degrees
    pub fov: f32,
    /// Width / height
    pub aspect_ratio: f32,
}

impl CameraView {
    pub fn intrinsics(
        &self,
        near: f32,
        camera_type: CameraType,
    ) -> Option<CameraIntrinsicData> {
        CameraIntrinsicData::perspective(self.fov.to_radians(), self.aspect_ratio, near, camera_type)
            .ok()
    }
}

/// Anything that can describe its projection for the current frame
pub trait CameraSource: Send + Sync {
    fn camera_type(&self) -> CameraType;

    /// Current view, if the camera is live
    fn camera_view(&self) -> Option<CameraView>;

    fn near_clip_plane(&self) -> f32 {
        10.0
    }

    /// Projection snapshot for this frame.
    ///
    /// Sensors with calibrated lenses override this.
    fn camera_intrinsics(&self) -> Option<CameraIntrinsicData> {
        self.camera_view()?
            .intrinsics(self.near_clip_plane(), self.camera_type())
    }
}

/// Camera with a fixed projection
#[derive(Debug, Clone, Copy)]
pub struct FixedCamera {
    intrinsics: CameraIntrinsicData,
}

impl FixedCamera {
    pub fn new(intrinsics: CameraIntrinsicData) -> Self {
        Self { intrinsics }
    }
}

impl CameraSource for FixedCamera {
    fn camera_type(&self) -> CameraType {
        self.intrinsics.camera_type
    }

    fn camera_view(&self) -> Option<CameraView> {
        Some(CameraView {
            location: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            fov: self.intrinsics.horizontal_fov.to_degrees(),
            aspect_ratio: (self.intrinsics.horizontal_fov * 0.5).tan()
                / (self.intrinsics.vertical_fov * 0.5).tan(),
        })
    }

    fn camera_intrinsics(&self) -> Option<CameraIntrinsicData> {
        Some(self.intrinsics)
    }
}

/// Named camera sources
#[derive(Default)]
pub struct CameraRegistry {
    sources: HashMap<String, Box<dyn CameraSource>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, source: Box<dyn CameraSource>) {
        let key = key.into();
        debug!(key = %key, "Registering camera source");
        self.sources.insert(key, source);
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.sources.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sources.contains_key(key)
    }

    /// Resolve a camera into this frame's snapshot
    pub fn resolve(&self, key: &str) -> Result<CameraIntrinsicData, MissingInputError> {
        let source = self
            .sources
            .get(key)
            .ok_or_else(|| MissingInputError::Camera(key.to_string()))?;
        source
            .camera_intrinsics()
            .ok_or_else(|| MissingInputError::Intrinsics(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OfflineCamera;

    impl CameraSource for OfflineCamera {
        fn camera_type(&self) -> CameraType {
            CameraType::Physical
        }

        fn camera_view(&self) -> Option<CameraView> {
            None
        }
    }

    #[test]
    fn test_resolve() {
        let mut registry = CameraRegistry::new();
        let kinect = CameraIntrinsicData::kinect(640, 480).unwrap();
        registry.register("depth", Box::new(FixedCamera::new(kinect)));
        registry.register("offline", Box::new(OfflineCamera));

        assert_eq!(registry.resolve("depth").unwrap(), kinect);
        assert_eq!(
            registry.resolve("missing"),
            Err(MissingInputError::Camera("missing".to_string()))
        );
        assert_eq!(
            registry.resolve("offline"),
            Err(MissingInputError::Intrinsics("offline".to_string()))
        );
    }

    #[test]
    fn test_view_intrinsics() {
        let view = CameraView {
            location: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            fov: 90.0,
            aspect_ratio: 16.0 / 9.0,
        };
        let cam = view.intrinsics(10.0, CameraType::Virtual).unwrap();
        assert!((cam.horizontal_fov.to_degrees() - 90.0).abs() < 1e-3);
        assert_eq!(cam.camera_type, CameraType::Virtual);
    }
}
