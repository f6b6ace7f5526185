// SPDX-License-Identifier: GPL-3.0-only

//! Progressive checkerboard calibration
//!
//! Each capture of the board seen by both cameras gives one
//! source-to-destination estimate. Estimates are folded into a running
//! average weighted by inverse reprojection error, normalised against the
//! cumulative weight, so one sharp early sample is not drowned out by many
//! blurry ones. The accumulator only changes when a capture succeeds.

use super::homography::HomographyPoseSolver;
use super::vision::{
    CalibrationTarget, CornerDetector, Distortion, PoseSolver, checkerboard_object_points,
    reprojection_error,
};
use crate::camera::ExtrinsicTransform;
use crate::constants::calibration::ERROR_EPSILON;
use crate::errors::CalibrationError;
use image::GrayImage;
use nalgebra::{Isometry3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Slerp tolerance for nearly opposite rotations
const SLERP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CalibrationState {
    /// No accepted samples since the last restart
    #[default]
    Idle,
    /// At least one sample has been folded in
    Accumulating,
}

/// One accepted capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    /// Board pose in the source camera
    pub source_pose: Isometry3<f64>,
    /// Board pose in the destination camera
    pub destination_pose: Isometry3<f64>,
    pub source_error: f64,
    pub destination_error: f64,
}

impl CalibrationSample {
    /// Source-to-destination estimate of this capture
    pub fn source_to_destination(&self) -> ExtrinsicTransform {
        ExtrinsicTransform::new(
            self.source_pose.rotation * self.destination_pose.rotation.inverse(),
            self.source_pose.translation.vector - self.destination_pose.translation.vector,
        )
    }

    /// Confidence of this capture, inverse of the summed reprojection error
    pub fn weight(&self) -> f64 {
        1.0 / (self.source_error + self.destination_error).max(ERROR_EPSILON)
    }
}

/// Running weighted average of accepted estimates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationAccumulator {
    pub num_samples: u32,
    pub weight_sum: f64,
    pub source_error_sum: f64,
    pub destination_error_sum: f64,
    pub accumulated_rotation: UnitQuaternion<f64>,
    pub accumulated_translation: Vector3<f64>,
}

impl Default for CalibrationAccumulator {
    fn default() -> Self {
        Self {
            num_samples: 0,
            weight_sum: 0.0,
            source_error_sum: 0.0,
            destination_error_sum: 0.0,
            accumulated_rotation: UnitQuaternion::identity(),
            accumulated_translation: Vector3::zeros(),
        }
    }
}

impl CalibrationAccumulator {
    /// Fold one estimate in with `weight`, returning its normalised weight
    pub fn fold(&mut self, estimate: &ExtrinsicTransform, weight: f64, errors: (f64, f64)) -> f64 {
        self.weight_sum += weight;
        let t = weight / self.weight_sum;

        self.accumulated_rotation = self
            .accumulated_rotation
            .try_slerp(&estimate.rotation, t, SLERP_EPSILON)
            .unwrap_or(if t >= 0.5 {
                estimate.rotation
            } else {
                self.accumulated_rotation
            });
        self.accumulated_translation = self.accumulated_translation.lerp(&estimate.translation, t);

        self.num_samples += 1;
        self.source_error_sum += errors.0;
        self.destination_error_sum += errors.1;
        t
    }

    pub fn transform(&self) -> ExtrinsicTransform {
        ExtrinsicTransform::new(self.accumulated_rotation, self.accumulated_translation)
    }

    pub fn avg_source_error(&self) -> f64 {
        if self.num_samples == 0 {
            0.0
        } else {
            self.source_error_sum / self.num_samples as f64
        }
    }

    pub fn avg_destination_error(&self) -> f64 {
        if self.num_samples == 0 {
            0.0
        } else {
            self.destination_error_sum / self.num_samples as f64
        }
    }
}

/// Checkerboard calibrator for one source/destination camera pair.
///
/// Calls must be serialized by the owner; the calibrator is not shared
/// between threads while running.
pub struct ProgressiveCalibrator {
    detector: Option<Box<dyn CornerDetector>>,
    solver: Box<dyn PoseSolver>,
    distortion: Distortion,
    state: CalibrationState,
    accumulator: CalibrationAccumulator,
    current_source_error: f64,
    current_destination_error: f64,
    current_transform: ExtrinsicTransform,
    last_sample: Option<CalibrationSample>,
    backend_reported: bool,
}

impl Default for ProgressiveCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressiveCalibrator {
    /// Calibrator without a corner detector; every run reports
    /// [`CalibrationError::NoVisionBackend`] until one is attached.
    pub fn new() -> Self {
        Self {
            detector: None,
            solver: Box::new(HomographyPoseSolver),
            distortion: [0.0; 5],
            state: CalibrationState::Idle,
            accumulator: CalibrationAccumulator::default(),
            current_source_error: 0.0,
            current_destination_error: 0.0,
            current_transform: ExtrinsicTransform::identity(),
            last_sample: None,
            backend_reported: false,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn CornerDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_solver(mut self, solver: Box<dyn PoseSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = distortion;
        self
    }

    pub fn has_vision_backend(&self) -> bool {
        self.detector.is_some()
    }

    /// Drop all accumulated samples
    pub fn restart(&mut self) {
        self.state = CalibrationState::Idle;
        self.accumulator = CalibrationAccumulator::default();
        self.current_source_error = 0.0;
        self.current_destination_error = 0.0;
        self.current_transform = ExtrinsicTransform::identity();
        self.last_sample = None;
        info!("Calibration restarted");
    }

    /// Detect, solve and fold one capture of the board.
    ///
    /// On success returns the updated average transform. On failure nothing
    /// accumulated so far is touched.
    pub fn run_calibration(
        &mut self,
        source: &CalibrationTarget,
        destination: &CalibrationTarget,
        dimensions: [u32; 2],
        square_size: f32,
    ) -> Result<ExtrinsicTransform, CalibrationError> {
        let result = self.capture(source, destination, dimensions, square_size);
        match result {
            Ok(sample) => Ok(self.accept(sample)),
            Err(e) => {
                if !matches!(e, CalibrationError::NoVisionBackend) {
                    warn!(code = e.code(), error = %e, "Calibration sample rejected");
                }
                Err(e)
            }
        }
    }

    /// Everything up to the accumulation step, without side effects on the average
    fn capture(
        &mut self,
        source: &CalibrationTarget,
        destination: &CalibrationTarget,
        dimensions: [u32; 2],
        square_size: f32,
    ) -> Result<CalibrationSample, CalibrationError> {
        if dimensions[0] == 0 || dimensions[1] == 0 || !(square_size > 0.0) {
            return Err(CalibrationError::InvalidParams);
        }

        let Some(detector) = self.detector.as_deref() else {
            if !self.backend_reported {
                warn!("No corner detection backend, checkerboard calibration unavailable");
                self.backend_reported = true;
            }
            return Err(CalibrationError::NoVisionBackend);
        };

        let (Some((source_image, source_intrinsics)), Some((dest_image, dest_intrinsics))) =
            (source.resolve(), destination.resolve())
        else {
            return Err(CalibrationError::MissingSourceOrDestination);
        };

        let object_points = checkerboard_object_points(dimensions, square_size);
        let expected = object_points.len();

        let detect = |target: &CalibrationTarget,
                      image: &GrayImage|
         -> Result<Vec<Vector2<f64>>, CalibrationError> {
            detector
                .find_checkerboard_corners(target, image, dimensions)
                .filter(|corners| !corners.is_empty())
                .ok_or(CalibrationError::IdentifyCheckerboardFailure)
        };
        let source_corners = detect(source, source_image)?;
        let dest_corners = detect(destination, dest_image)?;
        for corners in [&source_corners, &dest_corners] {
            if corners.len() != expected {
                return Err(CalibrationError::PointCountMismatch {
                    expected,
                    found: corners.len(),
                });
            }
        }

        let source_pinhole = source_intrinsics.pinhole(source_image.width(), source_image.height());
        let dest_pinhole = dest_intrinsics.pinhole(dest_image.width(), dest_image.height());

        let source_pose = self
            .solver
            .solve_pnp(&object_points, &source_corners, &source_pinhole, &self.distortion)
            .ok_or(CalibrationError::SolvePoseFailure)?;
        let destination_pose = self
            .solver
            .solve_pnp(&object_points, &dest_corners, &dest_pinhole, &self.distortion)
            .ok_or(CalibrationError::SolvePoseFailure)?;

        let source_error = reprojection_error(
            &object_points,
            &source_corners,
            &source_pinhole,
            &self.distortion,
            &source_pose,
        );
        let destination_error = reprojection_error(
            &object_points,
            &dest_corners,
            &dest_pinhole,
            &self.distortion,
            &destination_pose,
        );
        if !source_error.is_finite() || !destination_error.is_finite() {
            return Err(CalibrationError::SolvePoseFailure);
        }

        Ok(CalibrationSample {
            source_pose,
            destination_pose,
            source_error,
            destination_error,
        })
    }

    fn accept(&mut self, sample: CalibrationSample) -> ExtrinsicTransform {
        let estimate = sample.source_to_destination();
        let weight = sample.weight();
        let normalized = self.accumulator.fold(
            &estimate,
            weight,
            (sample.source_error, sample.destination_error),
        );

        self.state = CalibrationState::Accumulating;
        self.current_source_error = sample.source_error;
        self.current_destination_error = sample.destination_error;
        self.current_transform = self.accumulator.transform();
        self.last_sample = Some(sample);

        debug!(
            weight,
            normalized_weight = normalized,
            source_error = sample.source_error,
            destination_error = sample.destination_error,
            "Calibration sample folded"
        );
        info!(
            samples = self.accumulator.num_samples,
            avg_source_error = self.accumulator.avg_source_error(),
            avg_destination_error = self.accumulator.avg_destination_error(),
            "Calibration updated"
        );

        self.current_transform
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn accumulator(&self) -> &CalibrationAccumulator {
        &self.accumulator
    }

    pub fn num_samples(&self) -> u32 {
        self.accumulator.num_samples
    }

    pub fn weight_sum(&self) -> f64 {
        self.accumulator.weight_sum
    }

    pub fn avg_source_error(&self) -> f64 {
        self.accumulator.avg_source_error()
    }

    pub fn avg_destination_error(&self) -> f64 {
        self.accumulator.avg_destination_error()
    }

    pub fn current_source_error(&self) -> f64 {
        self.current_source_error
    }

    pub fn current_destination_error(&self) -> f64 {
        self.current_destination_error
    }

    pub fn calibrated_transform(&self) -> ExtrinsicTransform {
        self.current_transform
    }

    pub fn last_sample(&self) -> Option<&CalibrationSample> {
        self.last_sample.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsicData;
    use crate::pipelines::calibration::vision::{PrecomputedCorners, project_point};
    use nalgebra::{Point3, Translation3};

    const DIMS: [u32; 2] = [8, 6];
    const SQUARE: f32 = 2.5;

    fn target(name: &str) -> CalibrationTarget {
        CalibrationTarget::new(
            name,
            Some(GrayImage::new(640, 480)),
            Some(CameraIntrinsicData::kinect(640, 480).unwrap()),
        )
    }

    fn corners_for(pose: &Isometry3<f64>, offset: f64) -> Vec<Vector2<f64>> {
        let pinhole = CameraIntrinsicData::kinect(640, 480).unwrap().pinhole(640, 480);
        checkerboard_object_points(DIMS, SQUARE)
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let pixel = project_point(&(pose * Point3::from(*p)).coords, &pinhole, &[0.0; 5]).unwrap();
                // Alternating jitter keeps the fit from absorbing it
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                pixel + Vector2::new(offset * sign, -offset * sign)
            })
            .collect()
    }

    fn poses() -> (Isometry3<f64>, Isometry3<f64>) {
        let source = Isometry3::from_parts(
            Translation3::new(-6.0, -4.0, 90.0),
            UnitQuaternion::from_euler_angles(0.1, -0.15, 0.05),
        );
        let destination = Isometry3::from_parts(
            Translation3::new(-10.0, -5.0, 110.0),
            UnitQuaternion::from_euler_angles(-0.05, 0.2, 0.0),
        );
        (source, destination)
    }

    fn calibrator(jitter: f64) -> ProgressiveCalibrator {
        let (source, destination) = poses();
        let corners = PrecomputedCorners::new()
            .with("source", corners_for(&source, jitter))
            .with("destination", corners_for(&destination, jitter));
        ProgressiveCalibrator::new().with_detector(Box::new(corners))
    }

    fn expected_transform() -> ExtrinsicTransform {
        let (source, destination) = poses();
        ExtrinsicTransform::new(
            source.rotation * destination.rotation.inverse(),
            source.translation.vector - destination.translation.vector,
        )
    }

    #[test]
    fn test_identical_samples_converge_immediately() {
        let mut calibrator = calibrator(0.0);
        let expected = expected_transform();
        for n in 1..=4 {
            let result = calibrator
                .run_calibration(&target("source"), &target("destination"), DIMS, SQUARE)
                .unwrap();
            assert!(result.angle_to(&expected) < 1e-6, "sample {}", n);
            assert!(result.translation_distance(&expected) < 1e-4, "sample {}", n);
            assert_eq!(calibrator.num_samples(), n);
        }
        assert_eq!(calibrator.state(), CalibrationState::Accumulating);
        assert!(calibrator.avg_source_error() < 1e-6);
        assert!(calibrator.current_destination_error() < 1e-6);
    }

    #[test]
    fn test_restart_clears_state() {
        let mut calibrator = calibrator(0.3);
        calibrator
            .run_calibration(&target("source"), &target("destination"), DIMS, SQUARE)
            .unwrap();
        assert!(calibrator.avg_source_error() > 0.0);

        calibrator.restart();
        assert_eq!(calibrator.num_samples(), 0);
        assert_eq!(calibrator.avg_source_error(), 0.0);
        assert_eq!(calibrator.avg_destination_error(), 0.0);
        assert_eq!(calibrator.weight_sum(), 0.0);
        assert_eq!(calibrator.state(), CalibrationState::Idle);
        assert_eq!(calibrator.calibrated_transform(), ExtrinsicTransform::identity());
    }

    #[test]
    fn test_invalid_params_leave_accumulator_untouched() {
        let mut calibrator = calibrator(0.2);
        calibrator
            .run_calibration(&target("source"), &target("destination"), DIMS, SQUARE)
            .unwrap();
        let before = *calibrator.accumulator();

        for (dims, size) in [([0, 5], SQUARE), ([8, 0], SQUARE), (DIMS, 0.0), (DIMS, -1.0)] {
            let err = calibrator
                .run_calibration(&target("source"), &target("destination"), dims, size)
                .unwrap_err();
            assert_eq!(err.code(), "Error_InvalidParams");
        }
        assert_eq!(*calibrator.accumulator(), before);
    }

    #[test]
    fn test_missing_target() {
        let mut calibrator = calibrator(0.0);
        let missing = CalibrationTarget::new("destination", None, None);
        let err = calibrator
            .run_calibration(&target("source"), &missing, DIMS, SQUARE)
            .unwrap_err();
        assert_eq!(err, CalibrationError::MissingSourceOrDestination);
        assert_eq!(calibrator.num_samples(), 0);
    }

    #[test]
    fn test_detection_failures() {
        let mut calibrator = calibrator(0.0);
        let err = calibrator
            .run_calibration(&target("source"), &target("unknown"), DIMS, SQUARE)
            .unwrap_err();
        assert_eq!(err, CalibrationError::IdentifyCheckerboardFailure);

        let err = calibrator
            .run_calibration(&target("source"), &target("destination"), [7, 6], SQUARE)
            .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::PointCountMismatch {
                expected: 42,
                found: 48
            }
        );
        assert_eq!(calibrator.state(), CalibrationState::Idle);
    }

    #[test]
    fn test_no_backend_is_permanent() {
        let mut calibrator = ProgressiveCalibrator::new();
        assert!(!calibrator.has_vision_backend());
        for _ in 0..2 {
            let err = calibrator
                .run_calibration(&target("source"), &target("destination"), DIMS, SQUARE)
                .unwrap_err();
            assert_eq!(err.code(), "Error_NoVisionBackend");
            assert!(err.is_permanent());
        }
    }

    struct FailingSolver;

    impl PoseSolver for FailingSolver {
        fn solve_pnp(
            &self,
            _object_points: &[Vector3<f64>],
            _image_points: &[Vector2<f64>],
            _pinhole: &crate::camera::PinholeIntrinsics,
            _distortion: &Distortion,
        ) -> Option<Isometry3<f64>> {
            None
        }
    }

    #[test]
    fn test_pose_failure() {
        let mut calibrator = calibrator(0.0).with_solver(Box::new(FailingSolver));
        let err = calibrator
            .run_calibration(&target("source"), &target("destination"), DIMS, SQUARE)
            .unwrap_err();
        assert_eq!(err, CalibrationError::SolvePoseFailure);
        assert_eq!(calibrator.weight_sum(), 0.0);
    }

    #[test]
    fn test_weighting_favours_confident_samples() {
        let mut accumulator = CalibrationAccumulator::default();
        let good = ExtrinsicTransform::new(UnitQuaternion::identity(), Vector3::new(10.0, 0.0, 0.0));
        let bad = ExtrinsicTransform::new(
            UnitQuaternion::from_euler_angles(0.0, 0.4, 0.0),
            Vector3::new(20.0, 0.0, 0.0),
        );

        assert_eq!(accumulator.fold(&good, 1.0 / 0.1, (0.05, 0.05)), 1.0);
        for _ in 0..5 {
            accumulator.fold(&bad, 1.0 / 10.0, (5.0, 5.0));
        }
        // Five weak samples together weigh 0.5 against 10
        let x = accumulator.accumulated_translation.x;
        assert!(x > 10.0 && x < 11.0, "x = {}", x);
        assert!(accumulator.accumulated_rotation.angle() < 0.03);
        assert_eq!(accumulator.num_samples, 6);
        assert!((accumulator.avg_source_error() - (0.05 + 25.0) / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_equal_weights_average() {
        let mut accumulator = CalibrationAccumulator::default();
        let a = ExtrinsicTransform::new(UnitQuaternion::identity(), Vector3::new(0.0, 0.0, 0.0));
        let b = ExtrinsicTransform::new(
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.2),
            Vector3::new(4.0, 2.0, 0.0),
        );
        accumulator.fold(&a, 1.0, (1.0, 0.0));
        assert_eq!(accumulator.fold(&b, 1.0, (1.0, 0.0)), 0.5);
        assert!((accumulator.accumulated_translation - Vector3::new(2.0, 1.0, 0.0)).norm() < 1e-12);
        assert!((accumulator.accumulated_rotation.angle() - 0.1).abs() < 1e-9);
    }
}
