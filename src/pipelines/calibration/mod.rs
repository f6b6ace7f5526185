// SPDX-License-Identifier: GPL-3.0-only

//! Extrinsic calibration between the depth source and destination camera
//!
//! Two modes produce an [`ExtrinsicTransform`](crate::camera::ExtrinsicTransform):
//!
//! - Plane target: [`spawn_and_deproject`] points on a flat board, fit a
//!   [`Plane`] and solve a [`PlaneAlignment`]
//! - Checkerboard: feed captures to a [`ProgressiveCalibrator`], which
//!   averages per-capture estimates weighted by reprojection error

mod homography;
mod plane;
mod plane_alignment;
mod points;
mod progressive;
mod vision;

pub use homography::{
    HomographyPoseSolver, decompose_planar_homography, estimate_homography, undistort,
};
pub use plane::{Plane, fit_plane};
pub use plane_alignment::PlaneAlignment;
pub use points::{PointReadback, spawn_and_deproject, spawn_points, validate_rulers};
pub use progressive::{
    CalibrationAccumulator, CalibrationSample, CalibrationState, ProgressiveCalibrator,
};
pub use vision::{
    CalibrationTarget, CornerDetector, Distortion, PoseSolver, PrecomputedCorners,
    checkerboard_object_points, project_point, reprojection_error,
};
