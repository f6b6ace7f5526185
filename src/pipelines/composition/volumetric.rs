// SPDX-License-Identifier: GPL-3.0-only

//! Volumetric fog composition
//!
//! The fog volume is a froxel grid aligned with the destination view: X/Y
//! cover `grid_pixel_size` screen pixels each and Z slices are distributed
//! exponentially between the near plane and the fog far distance. Each slice
//! holds pre-integrated in-scattering (rgb) and transmittance (a).

use crate::constants::fog::{
    DEFAULT_FAR_DISTANCE, DEFAULT_START_DISTANCE, DEPTH_DISTRIBUTION_SCALE, GRID_PIXEL_SIZE,
    GRID_SIZE_Z, MAX_VOLUME_DIMENSION, NEAR_OFFSET,
};
use crate::errors::{AppResult, ConfigurationError, MissingInputError};
use crate::frame::{ColorImage, DepthImage, is_valid_depth};
use nalgebra::{Vector2, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Slice distribution `(B, O, S)` with `slice = log2(z * B + O) * S`.
///
/// The near plane is pushed out to the fog start distance, then offset, so
/// slices are not wasted right in front of the camera. Slice 0 lands on the
/// offset near plane and slice `grid_z - 1` on `far_plane`.
pub fn fog_grid_z_params(start_distance: f32, near_plane: f32, far_plane: f32, grid_z: u32) -> Vector3<f32> {
    let near = near_plane.max(start_distance) as f64 + NEAR_OFFSET as f64;
    let far = far_plane as f64;
    let s = DEPTH_DISTRIBUTION_SCALE as f64;

    let o = (far - near * ((grid_z.max(1) - 1) as f64 / s).exp2()) / (far - near);
    let b = (1.0 - o) / near;
    Vector3::new(b as f32, o as f32, s as f32)
}

/// Froxel grid for a view of `width` x `height` pixels.
///
/// Returns the grid and the pixel size actually used. The pixel size grows
/// when the default one would exceed the largest 3D texture edge.
pub fn fog_grid_size(width: u32, height: u32) -> ([u32; 3], u32) {
    let width = width.max(1);
    let height = height.max(1);
    let mut pixel_size = GRID_PIXEL_SIZE;
    let mut xy = [width.div_ceil(pixel_size), height.div_ceil(pixel_size)];
    if xy[0] > MAX_VOLUME_DIMENSION || xy[1] > MAX_VOLUME_DIMENSION {
        let px = (width as f32 / MAX_VOLUME_DIMENSION as f32).ceil() as u32;
        let py = (height as f32 / MAX_VOLUME_DIMENSION as f32).ceil() as u32;
        pixel_size = px.max(py);
        xy = [width.div_ceil(pixel_size), height.div_ceil(pixel_size)];
    }
    ([xy[0], xy[1], GRID_SIZE_Z], pixel_size)
}

/// Largest XY volume coordinate that still samples inside the view
pub fn fog_uv_max(width: u32, height: u32, grid: [u32; 3], pixel_size: u32) -> Vector2<f32> {
    let safe = |extent: u32| (extent.div_ceil(pixel_size) * pixel_size) as f32 - (pixel_size / 2 + 1) as f32;
    Vector2::new(
        safe(width) / (grid[0] * pixel_size) as f32,
        safe(height) / (grid[1] * pixel_size) as f32,
    )
}

/// Per-view fog inputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FogSettings {
    /// No fog closer than this
    pub start_distance: f32,
    /// Camera near clipping distance
    pub near_plane: f32,
    /// Distance covered by the last slice
    pub far_distance: f32,
    pub pre_exposure: f32,
}

impl Default for FogSettings {
    fn default() -> Self {
        Self {
            start_distance: DEFAULT_START_DISTANCE,
            near_plane: 10.0,
            far_distance: DEFAULT_FAR_DISTANCE,
            pre_exposure: 1.0,
        }
    }
}

/// Integrated fog froxels, `x` fastest then `y` then `z`
#[derive(Debug, Clone, PartialEq)]
pub struct FogVolume {
    size: [u32; 3],
    data: Vec<[f32; 4]>,
}

impl FogVolume {
    pub fn new(size: [u32; 3], data: Vec<[f32; 4]>) -> Result<Self, ConfigurationError> {
        let expected = size.iter().map(|s| *s as usize).product::<usize>();
        if data.len() != expected {
            return Err(ConfigurationError::InvalidParameter(format!(
                "{:?} fog volume needs {} froxels, got {}",
                size,
                expected,
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    /// Constant in-scattering and transmittance everywhere
    pub fn filled(size: [u32; 3], value: [f32; 4]) -> Self {
        Self {
            size,
            data: vec![value; size.iter().map(|s| *s as usize).product()],
        }
    }

    pub fn from_fn(size: [u32; 3], mut f: impl FnMut(u32, u32, u32) -> [f32; 4]) -> Self {
        let mut data = Vec::with_capacity(size.iter().map(|s| *s as usize).product());
        for z in 0..size[2] {
            for y in 0..size[1] {
                for x in 0..size[0] {
                    data.push(f(x, y, z));
                }
            }
        }
        Self { size, data }
    }

    pub fn size(&self) -> [u32; 3] {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn get(&self, x: u32, y: u32, z: u32) -> [f32; 4] {
        let [w, h, _] = self.size;
        self.data[(z as usize * h as usize + y as usize) * w as usize + x as usize]
    }

    /// Trilinear sample at a volume coordinate in [0, 1]^3, clamped at the edges
    pub fn sample(&self, uvw: Vector3<f32>) -> [f32; 4] {
        if self.is_empty() {
            return [0.0, 0.0, 0.0, 1.0];
        }
        let axis = |coord: f32, extent: u32| {
            let f = (coord * extent as f32 - 0.5).clamp(0.0, (extent - 1) as f32);
            let i0 = f.floor() as u32;
            (i0, (i0 + 1).min(extent - 1), f - i0 as f32)
        };
        let (x0, x1, tx) = axis(uvw.x, self.size[0]);
        let (y0, y1, ty) = axis(uvw.y, self.size[1]);
        let (z0, z1, tz) = axis(uvw.z, self.size[2]);

        let lerp = |a: [f32; 4], b: [f32; 4], t: f32| -> [f32; 4] {
            std::array::from_fn(|c| a[c] + (b[c] - a[c]) * t)
        };
        let plane = |z: u32| {
            let top = lerp(self.get(x0, y0, z), self.get(x1, y0, z), tx);
            let bottom = lerp(self.get(x0, y1, z), self.get(x1, y1, z), tx);
            lerp(top, bottom, ty)
        };
        lerp(plane(z0), plane(z1), tz)
    }
}

/// Everything the composite pass needs to look up fog for a destination pixel
#[derive(Debug, Clone)]
pub struct VolumetricFogData {
    pub start_distance: f32,
    pub grid_z_params: Vector3<f32>,
    pub inv_grid_size: Vector3<f32>,
    pub sv_pos_to_volume_uv: Vector2<f32>,
    pub uv_max: Vector2<f32>,
    pub one_over_pre_exposure: f32,
    pub volume: FogVolume,
}

impl VolumetricFogData {
    /// Derive the lookup parameters for a `width` x `height` view.
    ///
    /// The volume must have the froxel grid size of that view.
    pub fn new(width: u32, height: u32, settings: &FogSettings, volume: FogVolume) -> AppResult<Self> {
        if volume.is_empty() {
            return Err(MissingInputError::Texture("fog volume".to_string()).into());
        }
        if !(settings.pre_exposure > 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "pre-exposure {} must be positive",
                settings.pre_exposure
            ))
            .into());
        }
        if !(settings.far_distance > settings.near_plane.max(settings.start_distance) + NEAR_OFFSET) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "fog far distance {} does not lie beyond the start of the grid",
                settings.far_distance
            ))
            .into());
        }

        let (grid, pixel_size) = fog_grid_size(width, height);
        if volume.size() != grid {
            return Err(ConfigurationError::InvalidParameter(format!(
                "fog volume is {:?}, a {}x{} view needs {:?}",
                volume.size(),
                width,
                height,
                grid
            ))
            .into());
        }

        let grid_f = Vector3::new(grid[0] as f32, grid[1] as f32, grid[2] as f32);
        let data = Self {
            start_distance: settings.start_distance,
            grid_z_params: fog_grid_z_params(
                settings.start_distance,
                settings.near_plane,
                settings.far_distance,
                grid[2],
            ),
            inv_grid_size: grid_f.map(|v| 1.0 / v),
            sv_pos_to_volume_uv: Vector2::new(
                1.0 / (grid_f.x * pixel_size as f32),
                1.0 / (grid_f.y * pixel_size as f32),
            ),
            uv_max: fog_uv_max(width, height, grid, pixel_size),
            one_over_pre_exposure: 1.0 / settings.pre_exposure,
            volume,
        };
        debug!(
            width,
            height,
            grid_x = grid[0],
            grid_y = grid[1],
            grid_z = grid[2],
            pixel_size,
            "Volumetric fog lookup prepared"
        );
        Ok(data)
    }

    /// Volume coordinate for pixel position `sv_pos` at view depth `depth`
    pub fn volume_uv(&self, sv_pos: Vector2<f32>, depth: f32) -> Vector3<f32> {
        let p = self.grid_z_params;
        let slice = (depth * p.x + p.y).max(f32::MIN_POSITIVE).log2() * p.z * self.inv_grid_size.z;
        let uv = sv_pos.component_mul(&self.sv_pos_to_volume_uv).inf(&self.uv_max);
        Vector3::new(uv.x, uv.y, slice)
    }

    /// Fog contribution for one pixel, `None` where no fog applies
    pub fn lookup(&self, sv_pos: Vector2<f32>, depth: f32) -> Option<[f32; 4]> {
        if !is_valid_depth(depth) || depth <= self.start_distance {
            return None;
        }
        Some(self.volume.sample(self.volume_uv(sv_pos, depth)))
    }
}

/// Apply fog to `color`: `rgb * transmittance + scattering / pre_exposure`.
///
/// `depth` holds the destination-space view depth of each pixel. Alpha is kept.
pub fn composite_volumetric_fog(
    color: &ColorImage,
    depth: &DepthImage,
    fog: &VolumetricFogData,
) -> AppResult<ColorImage> {
    if color.is_empty() || depth.is_empty() {
        return Err(MissingInputError::Texture("fog composite input".to_string()).into());
    }
    if color.width() != depth.width() || color.height() != depth.height() {
        return Err(ConfigurationError::InvalidParameter(format!(
            "color {}x{} and depth {}x{} differ",
            color.width(),
            color.height(),
            depth.width(),
            depth.height()
        ))
        .into());
    }

    let width = color.width() as usize;
    let mut output = color.clone();
    output
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, pixel) in row.iter_mut().enumerate() {
                let sv_pos = Vector2::new(x as f32 + 0.5, y as f32 + 0.5);
                if let Some(f) = fog.lookup(sv_pos, depth.get(x as u32, y as u32)) {
                    for c in 0..3 {
                        pixel[c] = pixel[c] * f[3] + f[c] * fog.one_over_pre_exposure;
                    }
                }
            }
        });
    Ok(output)
}
