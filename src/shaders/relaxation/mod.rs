// SPDX-License-Identifier: GPL-3.0-only

//! GPU reconstruction filter
//!
//! Pre-processing and clipping are cheap per-pixel maps and stay on the
//! CPU; the relaxation steps run on the GPU.

mod processor;

pub use processor::{RelaxationProcessor, relax_depth_gpu};

use crate::errors::{AppError, AppResult, MissingInputError};
use crate::frame::DepthImage;
use crate::pipelines::depth_processing::{DepthProcessingParams, clip, preprocess};
use tracing::debug;

/// Relaxation shader source
pub const RELAXATION_SHADER: &str = include_str!("relaxation.wgsl");

/// [`reconstruct`](crate::pipelines::depth_processing::reconstruct) with the
/// relaxation steps on the GPU
pub async fn reconstruct_gpu(raw: &DepthImage, params: &DepthProcessingParams) -> AppResult<DepthImage> {
    if raw.is_empty() {
        return Err(MissingInputError::Texture("raw depth".to_string()).into());
    }
    params.validate()?;

    let steps = params.effective_steps();
    debug!(width = raw.width(), height = raw.height(), steps, "Reconstructing depth on GPU");

    let working = preprocess(raw);
    let mut relaxed = relax_depth_gpu(&working, steps).await.map_err(AppError::Gpu)?;
    clip(&mut relaxed, params);
    Ok(relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsicData;
    use crate::pipelines::depth_processing::reconstruct;

    fn validate_shader(name: &str, source: &str) {
        let result = naga::front::wgsl::parse_str(source);
        match result {
            Ok(module) => {
                let info = naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::all(),
                )
                .validate(&module);

                if let Err(e) = info {
                    panic!("Shader '{}' validation failed: {:?}", name, e);
                }
            }
            Err(e) => {
                panic!("Shader '{}' parse failed: {:?}", name, e);
            }
        }
    }

    #[test]
    fn test_relaxation_shader_validates() {
        validate_shader("relaxation", RELAXATION_SHADER);
    }

    #[tokio::test]
    async fn test_gpu_matches_cpu_reconstruction() {
        let camera = CameraIntrinsicData::kinect(40, 30).unwrap();
        let mut params = DepthProcessingParams::new(camera);
        params.enable_jacobi = true;
        params.num_jacobi_steps = 5;

        let raw = DepthImage::from_fn(40, 30, |x, y| {
            if (x + y) % 7 == 0 { 0.0 } else { 120.0 + x as f32 - y as f32 * 0.5 }
        });

        let gpu = match reconstruct_gpu(&raw, &params).await {
            Ok(depth) => depth,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };
        let cpu = reconstruct(&raw, &params).unwrap();
        for (g, c) in gpu.data().iter().zip(cpu.data()) {
            assert!((g - c).abs() < 1e-3, "gpu {} cpu {}", g, c);
        }
    }
}
