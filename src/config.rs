// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as pretty-printed JSON under the user config directory
//! (`~/.config/depth-composite/config.json` on Linux). Missing fields fall
//! back to the defaults in [`crate::constants`], so older files keep loading.

use crate::camera::{
    CameraIntrinsicData, CameraType, ExtrinsicTransform, PinholeIntrinsics, kinect,
};
use crate::constants::{VisualizationMode, alignment, calibration, depth};
use crate::errors::{AppError, AppResult, ConfigurationError};
use crate::pipelines::alignment::DepthAlignmentParams;
use crate::pipelines::calibration::{PlaneAlignment, validate_rulers};
use crate::pipelines::composition::{Crosshair, FogSettings};
use crate::pipelines::depth_processing::DepthProcessingParams;
use chrono::{DateTime, Utc};
use nalgebra::{Vector2, Vector4};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name under the user config directory
pub const APP_DIR: &str = "depth-composite";
/// Configuration file name
pub const CONFIG_FILE: &str = "config.json";

/// How a camera's projection is described
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CameraModel {
    /// Built-in Kinect v1 depth sensor intrinsics
    Kinect,
    /// Symmetric frustum from a horizontal field of view
    Perspective {
        horizontal_fov_deg: f32,
        /// Width / height; derived from the image size when absent
        aspect_ratio: Option<f32>,
        near_plane: f32,
    },
    /// Pixel focal lengths measured at a reference resolution
    Pinhole {
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        reference_width: u32,
        reference_height: u32,
        near_plane: f32,
    },
}

/// Stored description of one camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub camera_type: CameraType,
    #[serde(flatten)]
    pub model: CameraModel,
}

impl CameraSettings {
    pub fn kinect() -> Self {
        Self {
            camera_type: CameraType::Physical,
            model: CameraModel::Kinect,
        }
    }

    /// Rendered camera with the given horizontal field of view in degrees
    pub fn virtual_perspective(horizontal_fov_deg: f32) -> Self {
        Self {
            camera_type: CameraType::Virtual,
            model: CameraModel::Perspective {
                horizontal_fov_deg,
                aspect_ratio: None,
                near_plane: crate::constants::DEFAULT_VIRTUAL_NEAR_PLANE,
            },
        }
    }

    /// Projection snapshot for an image of `width` x `height`
    pub fn intrinsics(&self, width: u32, height: u32) -> Result<CameraIntrinsicData, ConfigurationError> {
        match self.model {
            CameraModel::Kinect => CameraIntrinsicData::from_pinhole(
                kinect::pinhole(width, height),
                width,
                height,
                kinect::NEAR_PLANE,
                self.camera_type,
            ),
            CameraModel::Perspective {
                horizontal_fov_deg,
                aspect_ratio,
                near_plane,
            } => {
                let aspect = match aspect_ratio {
                    Some(aspect) => aspect,
                    None if height > 0 => width as f32 / height as f32,
                    None => {
                        return Err(ConfigurationError::InvalidIntrinsics(
                            "cannot derive aspect ratio from an empty image".to_string(),
                        ));
                    }
                };
                CameraIntrinsicData::perspective(
                    horizontal_fov_deg.to_radians(),
                    aspect,
                    near_plane,
                    self.camera_type,
                )
            }
            CameraModel::Pinhole {
                fx,
                fy,
                cx,
                cy,
                reference_width,
                reference_height,
                near_plane,
            } => {
                if reference_width == 0 || reference_height == 0 {
                    return Err(ConfigurationError::InvalidIntrinsics(
                        "pinhole reference resolution is empty".to_string(),
                    ));
                }
                let sx = width as f64 / reference_width as f64;
                let sy = height as f64 / reference_height as f64;
                CameraIntrinsicData::from_pinhole(
                    PinholeIntrinsics::new(fx * sx, fy * sy, cx * sx, cy * sy),
                    width,
                    height,
                    near_plane,
                    self.camera_type,
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthProcessingSettings {
    pub enable_jacobi: bool,
    pub num_jacobi_steps: u32,
    pub enable_far_clipping: bool,
    pub far_clip_distance: f32,
    pub enable_clipping_plane: bool,
    /// Plane (n, w) in source view space; samples with n·p < w are removed
    pub user_clipping_plane: [f32; 4],
    /// World units per 16-bit PNG step
    pub input_scale: f32,
    pub visualize_range: [f32; 2],
    pub visualization_mode: VisualizationMode,
}

impl Default for DepthProcessingSettings {
    fn default() -> Self {
        let floor = crate::pipelines::depth_processing::floor_plane(depth::DEFAULT_FLOOR_DISTANCE);
        Self {
            enable_jacobi: depth::DEFAULT_ENABLE_JACOBI,
            num_jacobi_steps: depth::DEFAULT_JACOBI_STEPS,
            enable_far_clipping: depth::DEFAULT_ENABLE_FAR_CLIPPING,
            far_clip_distance: depth::DEFAULT_FAR_CLIP_DISTANCE,
            enable_clipping_plane: depth::DEFAULT_ENABLE_CLIPPING_PLANE,
            user_clipping_plane: [floor.x, floor.y, floor.z, floor.w],
            input_scale: depth::MILLIMETRES_TO_WORLD,
            visualize_range: depth::DEFAULT_VISUALIZE_RANGE,
            visualization_mode: VisualizationMode::default(),
        }
    }
}

impl DepthProcessingSettings {
    pub fn to_params(&self, source_camera: CameraIntrinsicData) -> DepthProcessingParams {
        let [a, b, c, d] = self.user_clipping_plane;
        DepthProcessingParams {
            source_camera,
            enable_jacobi: self.enable_jacobi,
            num_jacobi_steps: self.num_jacobi_steps,
            enable_far_clipping: self.enable_far_clipping,
            far_clip_distance: self.far_clip_distance,
            enable_clipping_plane: self.enable_clipping_plane,
            user_clipping_plane: Vector4::new(a, b, c, d),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSettings {
    pub hole_filling_bias: u32,
    pub uv_map_reference_depth: f32,
    pub source_to_destination: ExtrinsicTransform,
    /// Prefer the GPU passes when the build and hardware allow it
    pub use_gpu: bool,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            hole_filling_bias: alignment::DEFAULT_HOLE_FILLING_BIAS,
            uv_map_reference_depth: alignment::DEFAULT_UV_MAP_REFERENCE_DEPTH,
            source_to_destination: ExtrinsicTransform::identity(),
            use_gpu: false,
        }
    }
}

impl AlignmentSettings {
    pub fn to_params(
        &self,
        source_camera: CameraIntrinsicData,
        target_camera: CameraIntrinsicData,
    ) -> DepthAlignmentParams {
        let mut params = DepthAlignmentParams::new(source_camera, target_camera, self.source_to_destination)
            .with_hole_filling_bias(self.hole_filling_bias);
        params.uv_map_reference_depth = self.uv_map_reference_depth;
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub calibration_point_count: u32,
    pub interest_point_spawn_min: [f32; 2],
    pub interest_point_spawn_max: [f32; 2],
    pub checkerboard_dimensions: [u32; 2],
    pub checkerboard_size: f32,
    pub known_distance: f32,
    pub tangent_alignment_angle_deg: f32,
    /// When `alignment.source_to_destination` was last written by a calibration
    pub calibrated_at: Option<DateTime<Utc>>,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            calibration_point_count: calibration::DEFAULT_POINT_COUNT,
            interest_point_spawn_min: calibration::DEFAULT_SPAWN_MIN,
            interest_point_spawn_max: calibration::DEFAULT_SPAWN_MAX,
            checkerboard_dimensions: calibration::DEFAULT_CHECKERBOARD_DIMENSIONS,
            checkerboard_size: calibration::DEFAULT_CHECKERBOARD_SIZE,
            known_distance: calibration::DEFAULT_KNOWN_DISTANCE,
            tangent_alignment_angle_deg: 0.0,
            calibrated_at: None,
        }
    }
}

impl CalibrationSettings {
    pub fn spawn_rulers(&self) -> (Vector2<f32>, Vector2<f32>) {
        (
            Vector2::from(self.interest_point_spawn_min),
            Vector2::from(self.interest_point_spawn_max),
        )
    }

    pub fn plane_alignment(&self) -> PlaneAlignment {
        PlaneAlignment::new(self.known_distance, self.tangent_alignment_angle_deg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionSettings {
    pub fog: FogSettings,
    pub crosshair: Crosshair,
    pub show_crosshair: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source_camera: CameraSettings,
    pub destination_camera: CameraSettings,
    pub depth_processing: DepthProcessingSettings,
    pub alignment: AlignmentSettings,
    pub calibration: CalibrationSettings,
    pub composition: CompositionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_camera: CameraSettings::kinect(),
            destination_camera: CameraSettings::virtual_perspective(
                crate::constants::DEFAULT_VIRTUAL_HFOV_DEG,
            ),
            depth_processing: DepthProcessingSettings::default(),
            alignment: AlignmentSettings::default(),
            calibration: CalibrationSettings::default(),
            composition: CompositionSettings::default(),
        }
    }
}

impl Config {
    /// Default config file location, `None` when the platform has no config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location, using defaults when no file exists yet
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Write to the default location
    pub fn save(&self) -> AppResult<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Config("no user config directory".to_string()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write as pretty JSON, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Check every section, reporting the first problem found
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let dp = &self.depth_processing;
        if dp.num_jacobi_steps > depth::MAX_JACOBI_STEPS {
            return Err(ConfigurationError::InvalidParameter(format!(
                "num_jacobi_steps {} exceeds {}",
                dp.num_jacobi_steps,
                depth::MAX_JACOBI_STEPS
            )));
        }
        if dp.enable_far_clipping && !(dp.far_clip_distance > 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "far_clip_distance {} must be positive",
                dp.far_clip_distance
            )));
        }
        if !(dp.input_scale > 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "input_scale {} must be positive",
                dp.input_scale
            )));
        }

        if self.alignment.hole_filling_bias > alignment::MAX_HOLE_FILLING_BIAS {
            return Err(ConfigurationError::HoleFillingBiasOutOfRange(
                self.alignment.hole_filling_bias,
            ));
        }

        let cal = &self.calibration;
        let (min, max) = cal.spawn_rulers();
        validate_rulers(min, max)?;
        if cal.checkerboard_dimensions.contains(&0) || !(cal.checkerboard_size > 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "checkerboard {:?} with square size {} is degenerate",
                cal.checkerboard_dimensions, cal.checkerboard_size
            )));
        }
        if !(cal.known_distance > 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "known_distance {} must be positive",
                cal.known_distance
            )));
        }

        if self.source_camera.camera_type != CameraType::Physical {
            return Err(ConfigurationError::WrongCameraType {
                expected: CameraType::Physical.display_name(),
                actual: self.source_camera.camera_type.display_name().to_string(),
            });
        }
        Ok(())
    }

    /// Store a new source-to-destination transform and stamp the time
    pub fn store_calibration(&mut self, transform: ExtrinsicTransform) {
        self.alignment.source_to_destination = transform;
        self.calibration.calibrated_at = Some(Utc::now());
    }
}
