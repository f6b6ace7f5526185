// SPDX-License-Identifier: GPL-3.0-only

//! Destination-to-source UV lookup
//!
//! Geometry only: each destination ray is evaluated at a reference depth,
//! moved into source space and projected. Cells whose ray leaves the source
//! frustum hold the `[-1, -1]` sentinel.

use super::params::DepthAlignmentParams;
use crate::camera::{CameraIntrinsicData, ExtrinsicTransform, pixel_center_uv};
use crate::constants::alignment::INVALID_UV;
use crate::frame::UvMap;
use rayon::prelude::*;
use tracing::debug;

/// Source UV seen by destination pixel (x, y)
pub fn uv_map_entry(x: u32, y: u32, width: u32, height: u32, params: &DepthAlignmentParams) -> [f32; 2] {
    let uv = pixel_center_uv(x, y, width, height);
    let Some(target_point) = params
        .target_camera
        .deproject(uv, params.uv_map_reference_depth)
    else {
        return INVALID_UV;
    };
    let source_point = params.source_to_target.inverse_transform_point(&target_point);
    match params.source_camera.project(&source_point) {
        Some(projected) if projected.in_bounds() => [projected.uv.x, projected.uv.y],
        _ => INVALID_UV,
    }
}

/// Build the full UV map for a `width` x `height` destination image
pub fn compute_uv_map(width: u32, height: u32, params: &DepthAlignmentParams) -> UvMap {
    let w = width as usize;
    let data: Vec<[f32; 2]> = (0..w * height as usize)
        .into_par_iter()
        .map(|i| uv_map_entry((i % w) as u32, (i / w) as u32, width, height, params))
        .collect();

    let map = UvMap::from_vec(width, height, data).unwrap_or_else(|_| UvMap::new(width, height));
    debug!(
        width,
        height,
        mapped = map.mapped_count(),
        "UV map computed"
    );
    map
}

/// Everything a UV map depends on
#[derive(Debug, Clone, Copy, PartialEq)]
struct UvMapKey {
    width: u32,
    height: u32,
    source: CameraIntrinsicData,
    target: CameraIntrinsicData,
    transform: ExtrinsicTransform,
    reference_depth: f32,
}

impl UvMapKey {
    fn new(width: u32, height: u32, params: &DepthAlignmentParams) -> Self {
        Self {
            width,
            height,
            source: params.source_camera,
            target: params.target_camera,
            transform: params.source_to_target,
            reference_depth: params.uv_map_reference_depth,
        }
    }
}

/// Optional UV map cache, invalidated whenever intrinsics, extrinsics or
/// the destination size change.
#[derive(Debug, Default)]
pub struct UvMapCache {
    entry: Option<(UvMapKey, UvMap)>,
}

impl UvMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid_for(&self, width: u32, height: u32, params: &DepthAlignmentParams) -> bool {
        matches!(&self.entry, Some((key, _)) if *key == UvMapKey::new(width, height, params))
    }

    pub fn get_or_compute(
        &mut self,
        width: u32,
        height: u32,
        params: &DepthAlignmentParams,
    ) -> &UvMap {
        if !self.is_valid_for(width, height, params) {
            self.entry = None;
        }
        let (_, map) = self.entry.get_or_insert_with(|| {
            debug!(width, height, "UV map cache miss");
            (
                UvMapKey::new(width, height, params),
                compute_uv_map(width, height, params),
            )
        });
        map
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
