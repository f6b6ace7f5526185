// SPDX-License-Identifier: GPL-3.0-only
//! wgpu compute implementations of the depth passes
//!
//! Each processor is a lazily created singleton owning its device, pipelines
//! and size-cached buffers. Results match the CPU passes in
//! [`crate::pipelines`], which stay the reference and the fallback.

pub mod alignment;
mod gpu_processor;
pub mod relaxation;

pub use alignment::{AlignmentProcessor, align_depth_gpu, align_depth_prefer_gpu};
pub use gpu_processor::{GridExtent, read_staging};
pub use relaxation::{RelaxationProcessor, reconstruct_gpu, relax_depth_gpu};
