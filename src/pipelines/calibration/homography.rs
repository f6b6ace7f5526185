// SPDX-License-Identifier: GPL-3.0-only

//! Planar pose from a board homography
//!
//! Image corners are undistorted into normalized camera coordinates, a
//! Hartley-normalized DLT estimates the plane-to-image homography, and the
//! homography is split into `[r1 r2 t]` with the rotation projected back
//! onto SO(3).

use super::vision::{Distortion, PoseSolver};
use crate::camera::PinholeIntrinsics;
use nalgebra::{
    Isometry3, Matrix3, Rotation3, SMatrix, SymmetricEigen, Translation3, UnitQuaternion, Vector2,
    Vector3,
};
use tracing::debug;

/// Iterations of the fixed-point undistortion
const UNDISTORT_ITERATIONS: usize = 8;

/// Default [`PoseSolver`] for flat checkerboards
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyPoseSolver;

/// Centre on the mean and scale the mean distance to √2
fn hartley(points: &[Vector2<f64>]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n;
    let mean_distance = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if mean_distance <= f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_distance;
    Some(Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}

#[inline]
fn apply(t: &Matrix3<f64>, p: &Vector2<f64>) -> Vector2<f64> {
    let h = t * p.push(1.0);
    Vector2::new(h.x / h.z, h.y / h.z)
}

/// Homography `H` with `image ~ H * plane`, at least four correspondences
pub fn estimate_homography(plane: &[Vector2<f64>], image: &[Vector2<f64>]) -> Option<Matrix3<f64>> {
    if plane.len() < 4 || plane.len() != image.len() {
        return None;
    }
    let t_plane = hartley(plane)?;
    let t_image = hartley(image)?;

    // Accumulate AᵀA so the null vector exists for exactly four points
    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for (pw, pi) in plane.iter().zip(image) {
        let w = apply(&t_plane, pw);
        let i = apply(&t_image, pi);
        let rows = [
            [-w.x, -w.y, -1.0, 0.0, 0.0, 0.0, i.x * w.x, i.x * w.y, i.x],
            [0.0, 0.0, 0.0, -w.x, -w.y, -1.0, i.y * w.x, i.y * w.y, i.y],
        ];
        for row in rows {
            let r = SMatrix::<f64, 9, 1>::from_row_slice(&row);
            ata += r * r.transpose();
        }
    }

    let eigen = SymmetricEigen::new(ata);
    let (smallest, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = eigen.eigenvectors.column(smallest);
    let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let mut homography = t_image.try_inverse()? * normalized * t_plane;
    let scale = homography[(2, 2)];
    if scale.abs() > f64::EPSILON {
        homography /= scale;
    }
    homography.iter().all(|v| v.is_finite()).then_some(homography)
}

/// Pixel to normalized camera coordinates, removing lens distortion
pub fn undistort(pixel: &Vector2<f64>, pinhole: &PinholeIntrinsics, distortion: &Distortion) -> Vector2<f64> {
    let distorted = Vector2::new(
        (pixel.x - pinhole.cx) / pinhole.fx,
        (pixel.y - pinhole.cy) / pinhole.fy,
    );
    if distortion.iter().all(|k| *k == 0.0) {
        return distorted;
    }
    let [k1, k2, p1, p2, k3] = *distortion;
    let mut p = distorted;
    for _ in 0..UNDISTORT_ITERATIONS {
        let r2 = p.norm_squared();
        let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
        let dx = 2.0 * p1 * p.x * p.y + p2 * (r2 + 2.0 * p.x * p.x);
        let dy = p1 * (r2 + 2.0 * p.y * p.y) + 2.0 * p2 * p.x * p.y;
        p = Vector2::new((distorted.x - dx) / radial, (distorted.y - dy) / radial);
    }
    p
}

/// Split a homography in normalized camera coordinates into a board pose
pub fn decompose_planar_homography(homography: &Matrix3<f64>) -> Option<Isometry3<f64>> {
    let h1 = homography.column(0).into_owned();
    let h2 = homography.column(1).into_owned();
    let h3 = homography.column(2).into_owned();

    let norm = (h1.norm() + h2.norm()) * 0.5;
    if norm <= f64::EPSILON {
        return None;
    }
    // The board must sit in front of the camera
    let lambda = if h3.z < 0.0 { -1.0 / norm } else { 1.0 / norm };

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let approx = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = approx.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        let mut flipped = u;
        flipped.column_mut(2).neg_mut();
        rotation = flipped * v_t;
    }

    let translation: Vector3<f64> = h3 * lambda;
    if !translation.iter().all(|v| v.is_finite()) {
        return None;
    }
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    Some(Isometry3::from_parts(Translation3::from(translation), rotation))
}

impl PoseSolver for HomographyPoseSolver {
    fn solve_pnp(
        &self,
        object_points: &[Vector3<f64>],
        image_points: &[Vector2<f64>],
        pinhole: &PinholeIntrinsics,
        distortion: &Distortion,
    ) -> Option<Isometry3<f64>> {
        if object_points.len() != image_points.len() {
            return None;
        }
        if object_points.iter().any(|p| p.z.abs() > 1e-9) {
            debug!("Homography pose solver needs a planar board at Z = 0");
            return None;
        }
        if !(pinhole.fx > 0.0 && pinhole.fy > 0.0) {
            return None;
        }

        let plane: Vec<Vector2<f64>> = object_points.iter().map(|p| p.xy()).collect();
        let normalized: Vec<Vector2<f64>> = image_points
            .iter()
            .map(|p| undistort(p, pinhole, distortion))
            .collect();

        let homography = estimate_homography(&plane, &normalized)?;
        decompose_planar_homography(&homography)
    }
}
