// SPDX-License-Identifier: GPL-3.0-only

//! Depth alignment: reprojects a source depth image into a destination
//! camera with nearest-wins conflict resolution and patch hole filling.

mod params;
mod patch;
mod projector;
mod scatter;
mod uv_map;

pub use params::DepthAlignmentParams;
pub use patch::{PatchSize, compute_patch_size};
pub use projector::{
    AlignedDepth, align_depth, align_depth_or_passthrough, align_depth_with_uv_map,
    scatter_depth, scatter_source_sample,
};
pub use scatter::{DestinationGrid, EMPTY_CELL, pack, unpack};
pub use uv_map::{UvMapCache, compute_uv_map, uv_map_entry};
