// SPDX-License-Identifier: GPL-3.0-only

//! Relighting of the captured camera image by a virtual light
//!
//! Surface normals come from the aligned camera depth. Normals are stored in
//! a [`ColorImage`] as raw view-space unit vectors in `rgb`, with `a = 1` for
//! valid pixels and `a = 0` where no normal could be estimated.

use crate::camera::{CameraIntrinsicData, ExtrinsicTransform, pixel_center_uv};
use crate::errors::{AppResult, ConfigurationError, MissingInputError};
use crate::frame::{ColorImage, DepthImage, is_valid_depth};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Virtual light affecting the camera image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RelightingLight {
    /// World-space direction the light travels in
    Directional { direction: [f32; 3] },
    /// World-space position with a smooth falloff to zero at `radius`
    Point { position: [f32; 3], radius: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelightingParams {
    pub light: RelightingLight,
    /// Linear RGB intensity
    pub light_color: [f32; 3],
    pub light_weight: f32,
    /// Camera-to-world transform of the destination camera
    pub camera_transform: ExtrinsicTransform,
}

impl RelightingParams {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.light_weight.is_finite() || self.light_weight < 0.0 {
            return Err(ConfigurationError::InvalidParameter(format!(
                "light weight {} must be a non-negative number",
                self.light_weight
            )));
        }
        match self.light {
            RelightingLight::Directional { direction } if Vector3::from(direction).norm() <= f32::EPSILON => {
                Err(ConfigurationError::InvalidParameter(
                    "directional light has no direction".to_string(),
                ))
            }
            RelightingLight::Point { radius, .. } if !(radius > 0.0) => Err(
                ConfigurationError::InvalidParameter(format!("point light radius {} must be positive", radius)),
            ),
            _ => Ok(()),
        }
    }

    /// Unit vector towards the light and its attenuation at world point `p`
    fn incidence(&self, p: &Vector3<f32>) -> Option<(Vector3<f32>, f32)> {
        match self.light {
            RelightingLight::Directional { direction } => {
                Some((-Vector3::from(direction).normalize(), 1.0))
            }
            RelightingLight::Point { position, radius } => {
                let to_light = Vector3::from(position) - p;
                let distance = to_light.norm();
                if distance <= f32::EPSILON {
                    return None;
                }
                let falloff = (1.0 - (distance / radius).powi(2)).clamp(0.0, 1.0);
                Some((to_light / distance, falloff * falloff))
            }
        }
    }
}

/// View-space normals estimated from neighbouring depth samples.
///
/// Uses forward differences and falls back to backward differences at the
/// right and bottom borders or next to invalid samples. Normals face the
/// camera (negative Z).
pub fn normals_from_depth(depth: &DepthImage, intrinsics: &CameraIntrinsicData) -> ColorImage {
    let (width, height) = (depth.width(), depth.height());
    let point = |x: u32, y: u32| -> Option<Vector3<f32>> {
        let d = depth.get(x, y);
        if !is_valid_depth(d) {
            return None;
        }
        intrinsics.deproject(pixel_center_uv(x, y, width, height), d)
    };

    let rows: Vec<Vec<[f32; 4]>> = (0..height)
        .into_par_iter()
        .map(|y| {
            (0..width)
                .map(|x| {
                    let Some(center) = point(x, y) else {
                        return [0.0; 4];
                    };
                    let forward_x = (x + 1 < width).then(|| point(x + 1, y)).flatten().map(|p| p - center);
                    let tangent_x = forward_x.or_else(|| {
                        (x > 0).then(|| point(x - 1, y)).flatten().map(|p| center - p)
                    });
                    let forward_y = (y + 1 < height).then(|| point(x, y + 1)).flatten().map(|p| p - center);
                    let tangent_y = forward_y.or_else(|| {
                        (y > 0).then(|| point(x, y - 1)).flatten().map(|p| center - p)
                    });

                    match (tangent_x, tangent_y) {
                        (Some(tx), Some(ty)) => {
                            let n = tx.cross(&ty);
                            match n.try_normalize(f32::EPSILON) {
                                Some(n) => {
                                    let n = if n.z > 0.0 { -n } else { n };
                                    [n.x, n.y, n.z, 1.0]
                                }
                                None => [0.0; 4],
                            }
                        }
                        _ => [0.0; 4],
                    }
                })
                .collect()
        })
        .collect();

    let mut normals = ColorImage::filled(width, height, [0.0; 4]);
    for (dst, row) in normals.data_mut().chunks_mut(width as usize).zip(rows) {
        dst.copy_from_slice(&row);
    }
    normals
}

/// Add a Lambertian light contribution to `color`:
/// `rgb + rgb * light_color * weight * max(0, n·l) * attenuation`.
///
/// Pixels without valid depth or normal are left unchanged.
pub fn relight(
    color: &ColorImage,
    depth: &DepthImage,
    normals: &ColorImage,
    intrinsics: &CameraIntrinsicData,
    params: &RelightingParams,
) -> AppResult<ColorImage> {
    if color.is_empty() || depth.is_empty() || normals.is_empty() {
        return Err(MissingInputError::Texture("relighting input".to_string()).into());
    }
    let dims = (color.width(), color.height());
    if (depth.width(), depth.height()) != dims || (normals.width(), normals.height()) != dims {
        return Err(ConfigurationError::InvalidParameter(format!(
            "relighting inputs differ in size: color {}x{}, depth {}x{}, normals {}x{}",
            dims.0,
            dims.1,
            depth.width(),
            depth.height(),
            normals.width(),
            normals.height()
        ))
        .into());
    }
    params.validate()?;

    let (width, height) = dims;
    let rotation = params.camera_transform.rotation.cast::<f32>();
    let light_color = Vector3::from(params.light_color) * params.light_weight;

    let mut output = color.clone();
    output
        .data_mut()
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            for (x, pixel) in row.iter_mut().enumerate() {
                let x = x as u32;
                let d = depth.get(x, y);
                let n = normals.get(x, y);
                if !is_valid_depth(d) || n[3] <= 0.0 {
                    continue;
                }
                let Some(view_point) = intrinsics.deproject(pixel_center_uv(x, y, width, height), d) else {
                    continue;
                };
                let world_point = params.camera_transform.transform_point(&view_point);
                let world_normal = rotation * Vector3::new(n[0], n[1], n[2]);

                let Some((to_light, attenuation)) = params.incidence(&world_point) else {
                    continue;
                };
                let n_dot_l = world_normal.dot(&to_light).max(0.0);
                for c in 0..3 {
                    pixel[c] += pixel[c] * light_color[c] * n_dot_l * attenuation;
                }
            }
        });

    debug!(width, height, weight = params.light_weight, "Relighting applied");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraType;
    use nalgebra::UnitQuaternion;

    fn camera() -> CameraIntrinsicData {
        CameraIntrinsicData::perspective(1.2, 1.0, 1.0, CameraType::Physical).unwrap()
    }

    fn params(light: RelightingLight) -> RelightingParams {
        RelightingParams {
            light,
            light_color: [1.0, 1.0, 1.0],
            light_weight: 1.0,
            camera_transform: ExtrinsicTransform::identity(),
        }
    }

    #[test]
    fn test_normals_of_fronto_parallel_plane() {
        let depth = DepthImage::filled(16, 16, 100.0);
        let normals = normals_from_depth(&depth, &camera());
        for n in normals.data() {
            assert!((n[2] + 1.0).abs() < 1e-4, "{:?}", n);
            assert_eq!(n[3], 1.0);
        }
    }

    #[test]
    fn test_normals_of_tilted_plane_face_camera() {
        let cam = camera();
        // z = 100 + 0.5 * x in view space
        let depth = DepthImage::from_fn(32, 32, |x, y| {
            let ray = cam.deproject(pixel_center_uv(x, y, 32, 32), 1.0).unwrap();
            100.0 / (1.0 - 0.5 * ray.x)
        });
        let normals = normals_from_depth(&depth, &cam);
        let expected = Vector3::new(0.5, 0.0, -1.0).normalize();
        let n = normals.get(10, 10);
        assert!((Vector3::new(n[0], n[1], n[2]) - expected).norm() < 1e-2, "{:?}", n);
    }

    #[test]
    fn test_invalid_depth_has_no_normal() {
        let mut depth = DepthImage::filled(4, 4, 50.0);
        depth.set(1, 1, 0.0);
        let normals = normals_from_depth(&depth, &camera());
        assert_eq!(normals.get(1, 1), [0.0; 4]);
        assert_eq!(normals.get(2, 2)[3], 1.0);
    }

    #[test]
    fn test_directional_light_brightens_facing_surface() {
        let depth = DepthImage::filled(8, 8, 100.0);
        let normals = normals_from_depth(&depth, &camera());
        let color = ColorImage::filled(8, 8, [0.5, 0.25, 0.0, 1.0]);

        let towards_surface = params(RelightingLight::Directional {
            direction: [0.0, 0.0, 1.0],
        });
        let lit = relight(&color, &depth, &normals, &camera(), &towards_surface).unwrap();
        let p = lit.get(4, 4);
        assert!((p[0] - 1.0).abs() < 1e-3);
        assert!((p[1] - 0.5).abs() < 1e-3);
        assert_eq!(p[3], 1.0);

        let from_behind = params(RelightingLight::Directional {
            direction: [0.0, 0.0, -1.0],
        });
        let unlit = relight(&color, &depth, &normals, &camera(), &from_behind).unwrap();
        assert_eq!(unlit.get(4, 4), color.get(4, 4));
    }

    #[test]
    fn test_camera_rotation_moves_normals_to_world() {
        let depth = DepthImage::filled(8, 8, 100.0);
        let normals = normals_from_depth(&depth, &camera());
        let color = ColorImage::filled(8, 8, [0.5, 0.5, 0.5, 1.0]);

        // Camera turned to look down world -X; its surface normal points along +X
        let mut light = params(RelightingLight::Directional {
            direction: [-1.0, 0.0, 0.0],
        });
        light.camera_transform = ExtrinsicTransform::new(
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -std::f64::consts::FRAC_PI_2),
            Vector3::zeros(),
        );
        let lit = relight(&color, &depth, &normals, &camera(), &light).unwrap();
        assert!(lit.get(4, 4)[0] > 0.99);
    }

    #[test]
    fn test_point_light_falls_off() {
        let depth = DepthImage::filled(8, 8, 100.0);
        let normals = normals_from_depth(&depth, &camera());
        let color = ColorImage::filled(8, 8, [0.5, 0.5, 0.5, 1.0]);

        let near = params(RelightingLight::Point {
            position: [0.0, 0.0, 50.0],
            radius: 100.0,
        });
        let far = params(RelightingLight::Point {
            position: [0.0, 0.0, 0.0],
            radius: 100.0,
        });
        let near_lit = relight(&color, &depth, &normals, &camera(), &near).unwrap();
        let far_lit = relight(&color, &depth, &normals, &camera(), &far).unwrap();
        assert!(near_lit.get(4, 4)[0] > 0.5);
        assert!(near_lit.get(4, 4)[0] > far_lit.get(4, 4)[0]);
    }

    #[test]
    fn test_rejects_bad_params() {
        let depth = DepthImage::filled(4, 4, 100.0);
        let normals = normals_from_depth(&depth, &camera());
        let color = ColorImage::filled(4, 4, [0.5; 4]);
        let mut bad = params(RelightingLight::Directional {
            direction: [0.0, 0.0, 0.0],
        });
        assert!(relight(&color, &depth, &normals, &camera(), &bad).is_err());
        bad.light = RelightingLight::Point {
            position: [0.0; 3],
            radius: 0.0,
        };
        assert!(relight(&color, &depth, &normals, &camera(), &bad).is_err());
        let mismatched = ColorImage::filled(2, 4, [0.5; 4]);
        let good = params(RelightingLight::Directional {
            direction: [0.0, 0.0, 1.0],
        });
        assert!(relight(&mismatched, &depth, &normals, &camera(), &good).is_err());
    }
}
