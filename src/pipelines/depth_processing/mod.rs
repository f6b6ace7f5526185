// SPDX-License-Identifier: GPL-3.0-only

//! Depth processing: reconstruction filter and visualization

mod reconstruction;
mod visualization;

pub use reconstruction::{
    DepthProcessingParams, clip, floor_plane, jacobi_step, preprocess, reconstruct,
    reconstruct_or_passthrough, relax,
};
pub use visualization::{normalize_depth, visualize_depth};
