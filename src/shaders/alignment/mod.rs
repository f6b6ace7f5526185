// SPDX-License-Identifier: GPL-3.0-only

//! GPU depth alignment
//!
//! Same passes and results as the CPU projector. The GPU has no 64-bit
//! atomics in core WGSL, so the nearest-wins scatter is split in two: an
//! `atomicMin` on the depth bits, then an `atomicMin` on the source index
//! for samples whose depth equals the winner.

mod processor;

pub use processor::{AlignmentProcessor, get_alignment_processor};

use crate::errors::{AppError, AppResult, ConfigurationError, MissingInputError};
use crate::frame::DepthImage;
use crate::pipelines::alignment::{AlignedDepth, DepthAlignmentParams};
use tracing::warn;

/// Alignment shader source
pub const ALIGNMENT_SHADER: &str = include_str!("alignment.wgsl");

/// [`align_depth`](crate::pipelines::alignment::align_depth) on the shared
/// GPU processor
pub async fn align_depth_gpu(
    source: &DepthImage,
    dest_width: u32,
    dest_height: u32,
    params: &DepthAlignmentParams,
) -> AppResult<AlignedDepth> {
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
    params.validate()?;

    let mut processor = get_alignment_processor().await.map_err(AppError::Gpu)?;
    processor
        .align(source, dest_width, dest_height, params)
        .await
        .map_err(AppError::Gpu)
}

/// GPU alignment, falling back to the CPU projector when the GPU fails
pub async fn align_depth_prefer_gpu(
    source: &DepthImage,
    dest_width: u32,
    dest_height: u32,
    params: &DepthAlignmentParams,
) -> AppResult<AlignedDepth> {
    match align_depth_gpu(source, dest_width, dest_height, params).await {
        Err(AppError::Gpu(e)) => {
            warn!(error = %e, "GPU alignment failed, falling back to CPU");
            crate::pipelines::alignment::align_depth(source, dest_width, dest_height, params)
        }
        result => result,
    }
}
