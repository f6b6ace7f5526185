// SPDX-License-Identifier: GPL-3.0-only

//! Hole-filling patch size
//!
//! A source pixel covers `footprint_source / footprint_target` destination
//! pixels per axis. The scatter writes each source sample into a patch of
//! that size so neighbouring samples leave no gaps.

use crate::camera::CameraIntrinsicData;
use crate::constants::alignment::{MAX_PATCH_SIZE, MIN_PATCH_SIZE};
use std::ops::Range;

/// Patch edge lengths in destination pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSize {
    pub x: u32,
    pub y: u32,
}

impl PatchSize {
    pub const ONE: PatchSize = PatchSize { x: 1, y: 1 };

    /// Destination columns covered by a sample landing at pixel position `px`
    pub fn cells_x(&self, px: f32) -> Range<i32> {
        centered(self.x, px)
    }

    /// Destination rows covered by a sample landing at pixel position `py`
    pub fn cells_y(&self, py: f32) -> Range<i32> {
        centered(self.y, py)
    }
}

/// The `size` cells whose centres lie closest to `position`
fn centered(size: u32, position: f32) -> Range<i32> {
    let start = (position - size as f32 * 0.5 - 0.5).ceil() as i32;
    start..start + size as i32
}

/// Clamp one axis of the footprint ratio into a patch edge, then apply the bias
fn axis_patch(ratio: f32, bias: u32) -> u32 {
    let base = if ratio.is_finite() {
        // Tolerance keeps exact 1:1 setups at a single cell
        (ratio - 1e-4).ceil().clamp(MIN_PATCH_SIZE as f32, MAX_PATCH_SIZE as f32) as u32
    } else {
        MAX_PATCH_SIZE
    };
    base.saturating_add(bias).clamp(MIN_PATCH_SIZE, MAX_PATCH_SIZE)
}

/// Per-axis patch size for scattering a `source_dims` image into `target_dims`
///
/// The ratio compares per-pixel footprints, `tan(fov/2) / pixels`, so at equal
/// resolutions it reduces to `tan(fov_s/2) / tan(fov_t/2)`.
pub fn compute_patch_size(
    source: &CameraIntrinsicData,
    target: &CameraIntrinsicData,
    source_dims: (u32, u32),
    target_dims: (u32, u32),
    hole_filling_bias: u32,
) -> PatchSize {
    let ratio_x = source.pixel_footprint_x(source_dims.0) / target.pixel_footprint_x(target_dims.0);
    let ratio_y = source.pixel_footprint_y(source_dims.1) / target.pixel_footprint_y(target_dims.1);
    PatchSize {
        x: axis_patch(ratio_x, hole_filling_bias),
        y: axis_patch(ratio_y, hole_filling_bias),
    }
}
