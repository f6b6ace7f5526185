// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants
//!
//! Single source of truth for defaults. Distances are in world units
//! (centimetres), matching the depth images produced by the loaders in
//! [`crate::frame`].

use serde::{Deserialize, Serialize};

/// How processed depth is rendered for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VisualizationMode {
    /// Turbo colormap (blue=near, red=far)
    #[default]
    Turbo,
    /// Grayscale (bright=near, dark=far)
    Grayscale,
}

impl VisualizationMode {
    /// All modes for CLI help and iteration
    pub const ALL: [VisualizationMode; 2] = [VisualizationMode::Turbo, VisualizationMode::Grayscale];

    /// Get display name for the mode
    pub fn display_name(&self) -> &'static str {
        match self {
            VisualizationMode::Turbo => "Turbo",
            VisualizationMode::Grayscale => "Grayscale",
        }
    }
}

/// Horizontal field of view of the default destination camera, degrees
pub const DEFAULT_VIRTUAL_HFOV_DEG: f32 = 60.0;
/// Near plane of the default destination camera
pub const DEFAULT_VIRTUAL_NEAR_PLANE: f32 = 10.0;

/// Depth reconstruction defaults
pub mod depth {
    /// Relaxation is opt-in
    pub const DEFAULT_ENABLE_JACOBI: bool = false;
    /// Relaxation passes when enabled
    pub const DEFAULT_JACOBI_STEPS: u32 = 10;
    /// Upper bound accepted from configuration
    pub const MAX_JACOBI_STEPS: u32 = 256;
    /// Weight of each known neighbour in one relaxation step.
    /// Must stay at or below 1/8 so a 4-neighbour step never amplifies error.
    pub const RELAXATION_WEIGHT: f32 = 0.125;

    pub const DEFAULT_ENABLE_FAR_CLIPPING: bool = false;
    pub const DEFAULT_FAR_CLIP_DISTANCE: f32 = 200.0;

    pub const DEFAULT_ENABLE_CLIPPING_PLANE: bool = false;
    /// Distance of the default floor plane below the camera
    pub const DEFAULT_FLOOR_DISTANCE: f32 = 100.0;

    /// Scale applied to 16-bit millimetre images on import (mm -> cm)
    pub const MILLIMETRES_TO_WORLD: f32 = 0.1;

    /// Default visualization range [near, far]
    pub const DEFAULT_VISUALIZE_RANGE: [f32; 2] = [40.0, 400.0];
    /// Number of quantization bands for depth colormap visualization
    pub const COLORMAP_BANDS: f32 = 32.0;
}

/// Depth alignment defaults
pub mod alignment {
    /// Smallest patch searched around a landing cell
    pub const MIN_PATCH_SIZE: u32 = 1;
    /// Largest patch searched around a landing cell
    pub const MAX_PATCH_SIZE: u32 = 16;
    /// Maximum extra patch size requested by the caller
    pub const MAX_HOLE_FILLING_BIAS: u32 = 8;
    pub const DEFAULT_HOLE_FILLING_BIAS: u32 = 0;
    /// Depth at which destination rays are evaluated for the UV map
    pub const DEFAULT_UV_MAP_REFERENCE_DEPTH: f32 = 100.0;
    /// Sentinel stored in UV maps for cells outside the source frustum
    pub const INVALID_UV: [f32; 2] = [-1.0, -1.0];
    /// GPU workgroup edge length
    pub const WORKGROUP_SIZE: u32 = 16;
}

/// Calibration defaults
pub mod calibration {
    pub const DEFAULT_POINT_COUNT: u32 = 64;
    pub const DEFAULT_SPAWN_MIN: [f32; 2] = [0.0, 0.0];
    pub const DEFAULT_SPAWN_MAX: [f32; 2] = [1.0, 1.0];
    /// Inner corners of the default printed checkerboard
    pub const DEFAULT_CHECKERBOARD_DIMENSIONS: [u32; 2] = [8, 6];
    /// Square edge length in world units
    pub const DEFAULT_CHECKERBOARD_SIZE: f32 = 2.5;
    /// Distance of the calibration plane from the destination camera
    pub const DEFAULT_KNOWN_DISTANCE: f32 = 100.0;
    /// Lower bound on the summed reprojection error used for weighting
    pub const ERROR_EPSILON: f64 = 1e-6;
    /// Plastic number, generator of the R2 sequence
    pub const PLASTIC_NUMBER: f64 = 1.324_717_957_244_746;
}

/// Volumetric fog grid parameters
pub mod fog {
    /// Froxel edge in pixels
    pub const GRID_PIXEL_SIZE: u32 = 16;
    /// Depth slices
    pub const GRID_SIZE_Z: u32 = 64;
    /// Slice distribution exponent
    pub const DEPTH_DISTRIBUTION_SCALE: f32 = 32.0;
    /// Offset applied to the near plane before slicing
    pub const NEAR_OFFSET: f32 = 0.095 * 100.0;
    /// Largest 3D texture edge a froxel grid may use
    pub const MAX_VOLUME_DIMENSION: u32 = 2048;
    pub const DEFAULT_START_DISTANCE: f32 = 30.0;
    pub const DEFAULT_FAR_DISTANCE: f32 = 5000.0;
}
