// SPDX-License-Identifier: GPL-3.0-only

//! Depth alignment projector
//!
//! 1. UV map: which destination cells the source frustum can reach
//! 2. Scatter: every source sample is forward-projected with its own depth
//!    and offered to a patch of destination cells (nearest wins)
//! 3. Resolve: unpack the grid into the aligned depth image

use super::params::DepthAlignmentParams;
use super::patch::{PatchSize, compute_patch_size};
use super::scatter::DestinationGrid;
use super::uv_map::compute_uv_map;
use crate::camera::pixel_center_uv;
use crate::errors::{AppResult, ConfigurationError, MissingInputError};
use crate::frame::{DepthImage, UvMap, is_valid_depth};
use rayon::prelude::*;
use tracing::{debug, warn};

/// Output of one alignment run
#[derive(Debug, Clone)]
pub struct AlignedDepth {
    /// Destination view-space depth, 0 where no sample landed
    pub depth: DepthImage,
    /// Source UV of the winning sample per destination cell
    pub source_uv: UvMap,
    /// Geometry-only destination-to-source map used for the run
    pub uv_map: UvMap,
    pub patch: PatchSize,
}

/// Offer source pixel (x, y) to the destination grid
#[inline]
pub fn scatter_source_sample(
    grid: &DestinationGrid,
    uv_map: &UvMap,
    source: &DepthImage,
    params: &DepthAlignmentParams,
    patch: PatchSize,
    x: u32,
    y: u32,
) {
    let depth = source.get(x, y);
    if !is_valid_depth(depth) {
        return;
    }
    let uv = pixel_center_uv(x, y, source.width(), source.height());
    let Some(source_point) = params.source_camera.deproject(uv, depth) else {
        return;
    };
    let target_point = params.source_to_target.transform_point(&source_point);
    let Some(projected) = params.target_camera.project(&target_point) else {
        return;
    };
    if !projected.in_bounds() || !is_valid_depth(target_point.z) {
        return;
    }

    let dw = grid.width() as i32;
    let dh = grid.height() as i32;
    let px = projected.uv.x * dw as f32;
    let py = projected.uv.y * dh as f32;
    let index = source.index(x, y) as u32;

    for ty in patch.cells_y(py) {
        if ty < 0 || ty >= dh {
            continue;
        }
        for tx in patch.cells_x(px) {
            if tx < 0 || tx >= dw {
                continue;
            }
            if uv_map.is_mapped(tx as u32, ty as u32) {
                grid.scatter(tx as u32, ty as u32, target_point.z, index);
            }
        }
    }
}

/// Scatter a whole source image with an explicit patch size
pub fn scatter_depth(
    source: &DepthImage,
    uv_map: &UvMap,
    params: &DepthAlignmentParams,
    patch: PatchSize,
) -> DestinationGrid {
    let grid = DestinationGrid::new(uv_map.width(), uv_map.height());
    let width = source.width();
    (0..source.height()).into_par_iter().for_each(|y| {
        for x in 0..width {
            scatter_source_sample(&grid, uv_map, source, params, patch, x, y);
        }
    });
    grid
}

fn check_inputs(source: &DepthImage, dest_width: u32, dest_height: u32) -> AppResult<()> {
    if source.is_empty() {
        return Err(MissingInputError::Texture("source depth".to_string()).into());
    }
    if dest_width == 0 || dest_height == 0 {
        return Err(ConfigurationError::InvalidParameter(format!(
            "destination size {}x{} is empty",
            dest_width, dest_height
        ))
        .into());
    }
    Ok(())
}

/// Align with a precomputed UV map (for callers that cache it)
pub fn align_depth_with_uv_map(
    source: &DepthImage,
    uv_map: UvMap,
    params: &DepthAlignmentParams,
) -> AppResult<AlignedDepth> {
    check_inputs(source, uv_map.width(), uv_map.height())?;
    params.validate()?;

    let patch = compute_patch_size(
        &params.source_camera,
        &params.target_camera,
        (source.width(), source.height()),
        (uv_map.width(), uv_map.height()),
        params.hole_filling_bias,
    );

    let grid = scatter_depth(source, &uv_map, params, patch);
    let (depth, source_uv) = grid.resolve(source.width(), source.height());

    debug!(
        source_width = source.width(),
        source_height = source.height(),
        dest_width = uv_map.width(),
        dest_height = uv_map.height(),
        patch_x = patch.x,
        patch_y = patch.y,
        filled = grid.occupied_count(),
        "Depth aligned"
    );

    Ok(AlignedDepth {
        depth,
        source_uv,
        uv_map,
        patch,
    })
}

/// Align `source` into a `dest_width` x `dest_height` destination image.
///
/// The UV map is rebuilt on every call.
pub fn align_depth(
    source: &DepthImage,
    dest_width: u32,
    dest_height: u32,
    params: &DepthAlignmentParams,
) -> AppResult<AlignedDepth> {
    check_inputs(source, dest_width, dest_height)?;
    params.validate()?;
    let uv_map = compute_uv_map(dest_width, dest_height, params);
    align_depth_with_uv_map(source, uv_map, params)
}

/// [`align_depth`], logging failures and returning the input unchanged
pub fn align_depth_or_passthrough(
    source: &DepthImage,
    dest_width: u32,
    dest_height: u32,
    params: &DepthAlignmentParams,
) -> DepthImage {
    match align_depth(source, dest_width, dest_height, params) {
        Ok(aligned) => aligned.depth,
        Err(e) => {
            warn!(error = %e, "Depth alignment skipped, passing input through");
            source.clone()
        }
    }
}
