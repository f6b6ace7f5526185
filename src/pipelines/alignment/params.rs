// SPDX-License-Identifier: GPL-3.0-only

use crate::camera::{CameraIntrinsicData, CameraType, ExtrinsicTransform};
use crate::constants::alignment::{
    DEFAULT_HOLE_FILLING_BIAS, DEFAULT_UV_MAP_REFERENCE_DEPTH, MAX_HOLE_FILLING_BIAS,
};
use crate::errors::ConfigurationError;

/// Inputs of one alignment run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAlignmentParams {
    /// Camera that captured the depth image
    pub source_camera: CameraIntrinsicData,
    /// Camera whose point of view the depth is aligned to
    pub target_camera: CameraIntrinsicData,
    pub source_to_target: ExtrinsicTransform,
    /// Extra patch size on both axes, in [0, 8]
    pub hole_filling_bias: u32,
    /// Depth along each destination ray used when building the UV map
    pub uv_map_reference_depth: f32,
}

impl DepthAlignmentParams {
    pub fn new(
        source_camera: CameraIntrinsicData,
        target_camera: CameraIntrinsicData,
        source_to_target: ExtrinsicTransform,
    ) -> Self {
        Self {
            source_camera,
            target_camera,
            source_to_target,
            hole_filling_bias: DEFAULT_HOLE_FILLING_BIAS,
            uv_map_reference_depth: DEFAULT_UV_MAP_REFERENCE_DEPTH,
        }
    }

    pub fn with_hole_filling_bias(mut self, bias: u32) -> Self {
        self.hole_filling_bias = bias;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.source_camera.camera_type != CameraType::Physical {
            return Err(ConfigurationError::WrongCameraType {
                expected: CameraType::Physical.display_name(),
                actual: self.source_camera.camera_type.display_name().to_string(),
            });
        }
        self.source_camera.validate()?;
        self.target_camera.validate()?;
        if self.hole_filling_bias > MAX_HOLE_FILLING_BIAS {
            return Err(ConfigurationError::HoleFillingBiasOutOfRange(
                self.hole_filling_bias,
            ));
        }
        if !(self.uv_map_reference_depth > 0.0) || !self.uv_map_reference_depth.is_finite() {
            return Err(ConfigurationError::InvalidParameter(format!(
                "uv map reference depth {} must be positive",
                self.uv_map_reference_depth
            )));
        }
        Ok(())
    }
}
