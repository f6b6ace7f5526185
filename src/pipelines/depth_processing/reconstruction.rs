// SPDX-License-Identifier: GPL-3.0-only

//! Depth reconstruction filter
//!
//! Pre-process -> N relaxation steps (ping-pong) -> far/plane clipping.
//! Each relaxation step is one full pass that reads only the previous
//! buffer; the buffers swap roles once every lane has finished.

use crate::camera::{CameraIntrinsicData, CameraType, pixel_center_uv};
use crate::constants::depth::{
    DEFAULT_ENABLE_CLIPPING_PLANE, DEFAULT_ENABLE_FAR_CLIPPING, DEFAULT_ENABLE_JACOBI,
    DEFAULT_FAR_CLIP_DISTANCE, DEFAULT_FLOOR_DISTANCE, DEFAULT_JACOBI_STEPS, RELAXATION_WEIGHT,
};
use crate::errors::{AppResult, ConfigurationError, MissingInputError};
use crate::frame::{DepthImage, is_valid_depth};
use nalgebra::Vector4;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Parameters of one reconstruction run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthProcessingParams {
    pub source_camera: CameraIntrinsicData,
    pub enable_jacobi: bool,
    pub num_jacobi_steps: u32,
    pub enable_far_clipping: bool,
    /// View-space Z beyond which samples are discarded
    pub far_clip_distance: f32,
    pub enable_clipping_plane: bool,
    /// `(n.x, n.y, n.z, w)`; samples with `n·p - w < 0` are discarded
    pub user_clipping_plane: Vector4<f32>,
}

impl DepthProcessingParams {
    pub fn new(source_camera: CameraIntrinsicData) -> Self {
        Self {
            source_camera,
            enable_jacobi: DEFAULT_ENABLE_JACOBI,
            num_jacobi_steps: DEFAULT_JACOBI_STEPS,
            enable_far_clipping: DEFAULT_ENABLE_FAR_CLIPPING,
            far_clip_distance: DEFAULT_FAR_CLIP_DISTANCE,
            enable_clipping_plane: DEFAULT_ENABLE_CLIPPING_PLANE,
            user_clipping_plane: floor_plane(DEFAULT_FLOOR_DISTANCE),
        }
    }

    /// Number of relaxation passes that will actually run
    pub fn effective_steps(&self) -> u32 {
        if self.enable_jacobi {
            self.num_jacobi_steps
        } else {
            0
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.source_camera.camera_type != CameraType::Physical {
            return Err(ConfigurationError::WrongCameraType {
                expected: CameraType::Physical.display_name(),
                actual: self.source_camera.camera_type.display_name().to_string(),
            });
        }
        if self.enable_far_clipping && !(self.far_clip_distance > 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "far clip distance {} must be positive",
                self.far_clip_distance
            )));
        }
        if self.enable_clipping_plane && self.user_clipping_plane.xyz().norm() < 1e-6 {
            return Err(ConfigurationError::InvalidParameter(
                "clipping plane normal is zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Horizontal plane `distance` below the camera, keeping everything above it
pub fn floor_plane(distance: f32) -> Vector4<f32> {
    Vector4::new(0.0, 1.0, 0.0, -distance)
}

/// Replace non-finite, zero and negative samples with the invalid marker
pub fn preprocess(raw: &DepthImage) -> DepthImage {
    let mut out = raw.clone();
    out.data_mut().par_iter_mut().for_each(|d| {
        if !is_valid_depth(*d) {
            *d = 0.0;
        }
    });
    out
}

/// One relaxation pass from `input` into `output`.
///
/// Known samples move towards their known 4-neighbours by
/// [`RELAXATION_WEIGHT`] per neighbour. Unknown samples with at least one
/// known neighbour take the neighbour mean, so holes close one ring per pass.
pub fn jacobi_step(input: &DepthImage, output: &mut DepthImage) {
    let width = input.width() as usize;
    let height = input.height() as usize;
    if width == 0 || height == 0 {
        return;
    }
    let src = input.data();

    output
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let center = src[y * width + x];
                let mut sum = 0.0f32;
                let mut count = 0u32;

                let mut visit = |nx: usize, ny: usize| {
                    let n = src[ny * width + nx];
                    if is_valid_depth(n) {
                        sum += n;
                        count += 1;
                    }
                };
                if x > 0 {
                    visit(x - 1, y);
                }
                if x + 1 < width {
                    visit(x + 1, y);
                }
                if y > 0 {
                    visit(x, y - 1);
                }
                if y + 1 < height {
                    visit(x, y + 1);
                }

                *out = if is_valid_depth(center) {
                    center + RELAXATION_WEIGHT * (sum - count as f32 * center)
                } else if count > 0 {
                    sum / count as f32
                } else {
                    0.0
                };
            }
        });
}

/// Run `steps` relaxation passes, swapping the two buffers between passes
pub fn relax(depth: DepthImage, steps: u32) -> DepthImage {
    let mut read = depth;
    let mut write = DepthImage::new(read.width(), read.height());
    for step in 0..steps {
        jacobi_step(&read, &mut write);
        std::mem::swap(&mut read, &mut write);
        debug!(step, "Relaxation step complete");
    }
    read
}

/// Discard samples beyond the far distance or behind the user plane
pub fn clip(depth: &mut DepthImage, params: &DepthProcessingParams) {
    if !params.enable_far_clipping && !params.enable_clipping_plane {
        return;
    }
    let width = depth.width();
    let height = depth.height();
    if width == 0 {
        return;
    }
    let camera = params.source_camera;
    let plane = params.user_clipping_plane;

    depth
        .data_mut()
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, d) in row.iter_mut().enumerate() {
                if !is_valid_depth(*d) {
                    continue;
                }
                let uv = pixel_center_uv(x as u32, y as u32, width, height);
                let Some(p) = camera.deproject(uv, *d) else {
                    continue;
                };
                let beyond_far = params.enable_far_clipping && p.z > params.far_clip_distance;
                let behind_plane =
                    params.enable_clipping_plane && plane.xyz().dot(&p) - plane.w < 0.0;
                if beyond_far || behind_plane {
                    *d = 0.0;
                }
            }
        });
}

/// Reconstruct a raw depth image.
///
/// Requires a physical source camera. Errors leave `raw` untouched.
pub fn reconstruct(raw: &DepthImage, params: &DepthProcessingParams) -> AppResult<DepthImage> {
    if raw.is_empty() {
        return Err(MissingInputError::Texture("raw depth".to_string()).into());
    }
    params.validate()?;

    let steps = params.effective_steps();
    debug!(
        width = raw.width(),
        height = raw.height(),
        steps,
        far_clipping = params.enable_far_clipping,
        plane_clipping = params.enable_clipping_plane,
        "Reconstructing depth"
    );

    let working = preprocess(raw);
    let mut relaxed = relax(working, steps);
    clip(&mut relaxed, params);
    Ok(relaxed)
}

/// [`reconstruct`], logging failures and returning the input unchanged
pub fn reconstruct_or_passthrough(raw: &DepthImage, params: &DepthProcessingParams) -> DepthImage {
    match reconstruct(raw, params) {
        Ok(depth) => depth,
        Err(e) => {
            warn!(error = %e, "Depth reconstruction skipped, passing input through");
            raw.clone()
        }
    }
}
