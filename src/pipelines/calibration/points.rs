// SPDX-License-Identifier: GPL-3.0-only

//! Calibration point spawning and deprojection
//!
//! Points are laid out with the R2 low-discrepancy sequence (Kronecker
//! sequence over the plastic number), so the same count and rulers always
//! give the same points.

use crate::camera::CameraIntrinsicData;
use crate::constants::calibration::PLASTIC_NUMBER;
use crate::errors::{AppError, AppResult, ConfigurationError, MissingInputError};
use crate::frame::{DepthImage, is_valid_depth};
use futures::channel::oneshot;
use nalgebra::{Vector2, Vector3};
use tracing::{debug, warn};

/// Check that `min` is strictly below `max` on both axes and inside [0, 1]
pub fn validate_rulers(min: Vector2<f32>, max: Vector2<f32>) -> Result<(), ConfigurationError> {
    let in_unit = |v: Vector2<f32>| (0.0..=1.0).contains(&v.x) && (0.0..=1.0).contains(&v.y);
    if !in_unit(min) || !in_unit(max) || min.x >= max.x || min.y >= max.y {
        return Err(ConfigurationError::DegenerateRulers);
    }
    Ok(())
}

/// `index`-th R2 sample in the unit square
#[inline]
fn r2(index: u32) -> Vector2<f64> {
    let a1 = 1.0 / PLASTIC_NUMBER;
    let a2 = 1.0 / (PLASTIC_NUMBER * PLASTIC_NUMBER);
    let n = index as f64 + 1.0;
    Vector2::new((0.5 + a1 * n).fract(), (0.5 + a2 * n).fract())
}

/// Screen-space positions of `count` points between the rulers
pub fn spawn_points(count: u32, ruler_min: Vector2<f32>, ruler_max: Vector2<f32>) -> Vec<Vector2<f32>> {
    let min = ruler_min.cast::<f64>();
    let extent = ruler_max.cast::<f64>() - min;
    (0..count)
        .map(|i| {
            let p = r2(i);
            Vector2::new(min.x + p.x * extent.x, min.y + p.y * extent.y).cast::<f32>()
        })
        .collect()
}

/// Spawn points and lift them into source camera space.
///
/// Samples that land on invalid depth are dropped, so the result may hold
/// fewer than `count` points.
pub fn spawn_and_deproject(
    depth: &DepthImage,
    source: &CameraIntrinsicData,
    count: u32,
    ruler_min: Vector2<f32>,
    ruler_max: Vector2<f32>,
) -> AppResult<Vec<Vector3<f32>>> {
    validate_rulers(ruler_min, ruler_max)?;
    if depth.is_empty() {
        return Err(MissingInputError::Texture("calibration depth".to_string()).into());
    }
    source.validate()?;

    let points: Vec<Vector3<f32>> = spawn_points(count, ruler_min, ruler_max)
        .into_iter()
        .filter_map(|uv| {
            let d = depth.sample_nearest(uv);
            if !is_valid_depth(d) {
                return None;
            }
            source.deproject(uv, d)
        })
        .collect();

    debug!(requested = count, deprojected = points.len(), "Calibration points spawned");
    Ok(points)
}

/// Deprojected calibration points computed off the caller's thread.
///
/// Poll with [`is_ready`](Self::is_ready) / [`try_take`](Self::try_take)
/// from a frame loop, or await [`wait`](Self::wait).
pub struct PointReadback {
    receiver: Option<oneshot::Receiver<AppResult<Vec<Vector3<f32>>>>>,
    result: Option<AppResult<Vec<Vector3<f32>>>>,
}

impl PointReadback {
    /// Start spawning and deprojecting on the tokio blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        depth: DepthImage,
        source: CameraIntrinsicData,
        count: u32,
        ruler_min: Vector2<f32>,
        ruler_max: Vector2<f32>,
    ) -> Self {
        let (sender, receiver) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let result = spawn_and_deproject(&depth, &source, count, ruler_min, ruler_max);
            if sender.send(result).is_err() {
                debug!("Calibration point readback dropped before completion");
            }
        });
        Self {
            receiver: Some(receiver),
            result: None,
        }
    }

    /// Already-finished readback
    pub fn ready(result: AppResult<Vec<Vector3<f32>>>) -> Self {
        Self {
            receiver: None,
            result: Some(result),
        }
    }

    fn poll(&mut self) {
        let Some(receiver) = self.receiver.as_mut() else {
            return;
        };
        match receiver.try_recv() {
            Ok(Some(result)) => {
                self.result = Some(result);
                self.receiver = None;
            }
            Ok(None) => {}
            Err(_) => {
                warn!("Calibration point readback was cancelled");
                self.result = Some(Err(AppError::Other(
                    "calibration point readback cancelled".to_string(),
                )));
                self.receiver = None;
            }
        }
    }

    /// Whether the points can be taken without blocking
    pub fn is_ready(&mut self) -> bool {
        self.poll();
        self.result.is_some()
    }

    /// Take the points if they are ready
    pub fn try_take(&mut self) -> Option<AppResult<Vec<Vector3<f32>>>> {
        self.poll();
        self.result.take()
    }

    pub async fn wait(mut self) -> AppResult<Vec<Vector3<f32>>> {
        if let Some(result) = self.result.take() {
            return result;
        }
        match self.receiver.take() {
            Some(receiver) => receiver
                .await
                .map_err(|_| AppError::Other("calibration point readback cancelled".to_string()))?,
            None => Err(AppError::Other("calibration points already taken".to_string())),
        }
    }
}
