// SPDX-License-Identifier: GPL-3.0-only

//! Plane of best fit
//!
//! Closed form, no eigen-decomposition: each coordinate axis is eliminated
//! in turn to get a candidate normal from the centred covariance, weighted
//! by the squared determinant of the remaining 2x2 block. Candidates are
//! sign-aligned before summing, so an axis the points barely span drops out
//! on its own.

use nalgebra::Vector3;

/// Plane through `origin` with unit `normal`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub origin: Vector3<f32>,
    pub normal: Vector3<f32>,
}

impl Plane {
    /// Same plane with the normal reversed
    pub fn flip(&self) -> Self {
        Self {
            origin: self.origin,
            normal: -self.normal,
        }
    }

    /// Orient the normal towards a camera looking along +Z (normal.z <= 0)
    pub fn facing_camera(&self) -> Self {
        if self.normal.z > 0.0 { self.flip() } else { *self }
    }

    pub fn signed_distance(&self, point: &Vector3<f32>) -> f32 {
        self.normal.dot(&(point - self.origin))
    }

    /// Plane equation `(n, w)` with `n·p = w` on the plane
    pub fn equation(&self) -> nalgebra::Vector4<f32> {
        self.normal.push(self.normal.dot(&self.origin))
    }
}

/// Fit a plane to `points`.
///
/// `None` for fewer than three points or when the points do not span a
/// plane (coincident or collinear).
pub fn fit_plane(points: &[Vector3<f32>]) -> Option<Plane> {
    if points.len() < 3 {
        return None;
    }

    let n = points.len() as f32;
    let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n;

    let (mut xx, mut xy, mut xz, mut yy, mut yz, mut zz) = (0.0f32, 0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        let r = p - centroid;
        xx += r.x * r.x;
        xy += r.x * r.y;
        xz += r.x * r.z;
        yy += r.y * r.y;
        yz += r.y * r.z;
        zz += r.z * r.z;
    }
    xx /= n;
    xy /= n;
    xz /= n;
    yy /= n;
    yz /= n;
    zz /= n;

    let det_x = yy * zz - yz * yz;
    let det_y = xx * zz - xz * xz;
    let det_z = xx * yy - xy * xy;
    let candidates = [
        (
            Vector3::new(det_x, xz * yz - xy * zz, xy * yz - xz * yy),
            det_x * det_x,
        ),
        (
            Vector3::new(xz * yz - xy * zz, det_y, xy * xz - yz * xx),
            det_y * det_y,
        ),
        (
            Vector3::new(xy * yz - xz * yy, xy * xz - yz * xx, det_z),
            det_z * det_z,
        ),
    ];

    let mut weighted = Vector3::<f32>::zeros();
    for (direction, weight) in candidates {
        let weight = if weighted.dot(&direction) < 0.0 { -weight } else { weight };
        weighted += direction * weight;
    }

    let length = weighted.norm();
    if !length.is_finite() || length <= f32::MIN_POSITIVE {
        return None;
    }
    Some(Plane {
        origin: centroid,
        normal: weighted / length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Grid of points on the plane through `origin` with `normal`
    fn plane_points(origin: Vector3<f32>, normal: Vector3<f32>, count: usize) -> Vec<Vector3<f32>> {
        let normal = normal.normalize();
        let helper = if normal.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
        let u = normal.cross(&helper).normalize();
        let v = normal.cross(&u);
        (0..count)
            .map(|i| {
                let a = (i % 7) as f32 * 3.0 - 9.0 + (i as f32 * 0.37).sin();
                let b = (i / 7) as f32 * 2.5 - 5.0 + (i as f32 * 0.91).cos();
                origin + u * a + v * b
            })
            .collect()
    }

    #[test]
    fn test_round_trip_known_planes() {
        let cases = [
            (Vector3::new(0.0, 0.0, 100.0), Vector3::new(0.0, 0.0, -1.0)),
            (Vector3::new(5.0, -3.0, 80.0), Vector3::new(0.2, 0.5, -0.8)),
            (Vector3::new(-20.0, 10.0, 150.0), Vector3::new(1.0, 0.0, 0.0)),
            (Vector3::new(0.0, -50.0, 60.0), Vector3::new(0.0, 1.0, 0.0)),
        ];
        for (origin, normal) in cases {
            let normal = normal.normalize();
            for count in [3usize, 4, 10, 64] {
                let points = plane_points(origin, normal, count);
                let plane = fit_plane(&points).unwrap();
                assert!(
                    plane.normal.dot(&normal).abs() > 0.999,
                    "normal {:?} vs {:?} ({} points)",
                    plane.normal,
                    normal,
                    count
                );
                let offset = normal.dot(&(plane.origin - origin));
                assert!(offset.abs() < 1e-2, "origin off plane by {}", offset);
                assert!((plane.normal.norm() - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_too_few_points() {
        assert!(fit_plane(&[]).is_none());
        assert!(fit_plane(&[Vector3::zeros(), Vector3::x()]).is_none());
    }

    #[test]
    fn test_collinear_points_rejected() {
        let points: Vec<_> = (0..10)
            .map(|i| Vector3::new(i as f32, 2.0 * i as f32, 3.0 * i as f32 + 1.0))
            .collect();
        assert!(fit_plane(&points).is_none());

        let axis_aligned: Vec<_> = (0..10).map(|i| Vector3::new(0.0, 0.0, i as f32)).collect();
        assert!(fit_plane(&axis_aligned).is_none());

        let coincident = vec![Vector3::new(1.0, 2.0, 3.0); 5];
        assert!(fit_plane(&coincident).is_none());
    }

    #[test]
    fn test_facing_camera_is_idempotent() {
        let origin = Vector3::new(0.0, 0.0, 100.0);
        for normal in [
            Vector3::new(0.1, 0.2, 0.97),
            Vector3::new(0.1, 0.2, -0.97),
            Vector3::new(0.7, 0.0, 0.7),
        ] {
            let points: Vec<_> = plane_points(origin, normal, 20);
            let plane = fit_plane(&points).unwrap();
            let oriented = plane.facing_camera();
            assert!(oriented.normal.z <= 0.0);
            assert_eq!(oriented.facing_camera(), oriented);
            assert!(oriented.flip().facing_camera().normal.z <= 0.0);
        }
    }

    #[test]
    fn test_signed_distance_and_equation() {
        let plane = Plane {
            origin: Vector3::new(0.0, 0.0, 100.0),
            normal: Vector3::new(0.0, 0.0, -1.0),
        };
        assert!((plane.signed_distance(&Vector3::new(3.0, 4.0, 90.0)) - 10.0).abs() < 1e-5);
        let eq = plane.equation();
        assert!((eq.w + 100.0).abs() < 1e-5);
    }
}
