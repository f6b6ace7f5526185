// SPDX-License-Identifier: GPL-3.0-only

//! Consumers of the aligned depth
//!
//! These passes run on the destination view after alignment: fog lookup by
//! view depth, relighting from depth-derived normals, resampling the source
//! color through a UV map and a debug crosshair.

mod crosshair;
mod relighting;
mod texture_mapping;
mod volumetric;

pub use crosshair::{Crosshair, add_crosshair};
pub use relighting::{RelightingLight, RelightingParams, normals_from_depth, relight};
pub use texture_mapping::{UNMAPPED_COLOR, map_texture};
pub use volumetric::{
    FogSettings, FogVolume, VolumetricFogData, composite_volumetric_fog, fog_grid_size,
    fog_grid_z_params, fog_uv_max,
};
