// SPDX-License-Identifier: GPL-3.0-only

//! Depth Composite - compositing core for a depth camera feeding a rendered scene
//!
//! A physical depth sensor (the source camera) observes the same scene as a
//! virtual or physical destination camera. This crate reconstructs the raw
//! sensor depth, reprojects it into the destination camera's pixel grid and
//! estimates the rigid transform between the two cameras.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`camera`]: Intrinsic snapshots, extrinsic transforms and camera sources
//! - [`frame`]: Depth, UV map and color image containers
//! - [`pipelines`]: CPU passes (reconstruction, alignment, calibration, composition)
//! - [`shaders`]: wgpu compute versions of the heavy passes (`gpu` feature)
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! use depth_composite::camera::{CameraIntrinsicData, CameraType, ExtrinsicTransform};
//! use depth_composite::pipelines::alignment::{DepthAlignmentParams, align_depth};
//!
//! let source = CameraIntrinsicData::kinect(640, 480)?;
//! let target = CameraIntrinsicData::perspective(1.2, 16.0 / 9.0, 10.0, CameraType::Virtual)?;
//! let params = DepthAlignmentParams::new(source, target, ExtrinsicTransform::identity());
//! let aligned = align_depth(&depth, 1280, 720, &params)?;
//! ```

pub mod camera;
pub mod config;
pub mod constants;
pub mod errors;
pub mod frame;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod pipelines;
#[cfg(feature = "gpu")]
pub mod shaders;

// Re-export commonly used types
pub use camera::{CameraIntrinsicData, CameraType, ExtrinsicTransform};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use frame::{ColorImage, DepthImage, UvMap};
