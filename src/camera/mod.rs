// SPDX-License-Identifier: GPL-3.0-only

//! Camera models shared by every pass
//!
//! - [`CameraIntrinsicData`]: per-frame projection snapshot
//! - [`ExtrinsicTransform`]: calibrated source-to-destination transform
//! - [`CameraRegistry`]: resolves named sources into snapshots

mod extrinsics;
mod intrinsics;
pub mod kinect;
mod source;

pub use extrinsics::ExtrinsicTransform;
pub use intrinsics::{
    CameraIntrinsicData, CameraType, PinholeIntrinsics, Projected, ndc_to_uv, pixel_center_uv,
    reversed_z_projection, uv_to_ndc,
};
pub use source::{CameraRegistry, CameraSource, CameraView, FixedCamera};
