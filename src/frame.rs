// SPDX-License-Identifier: GPL-3.0-only

//! Host-side image containers
//!
//! Row-major, one element per pixel. A depth of `0.0` marks an invalid
//! sample everywhere in the crate.

use crate::constants::alignment::INVALID_UV;
use crate::errors::{AppResult, ConfigurationError};
use image::{ImageBuffer, Luma, Rgba, RgbaImage};
use nalgebra::Vector2;
use std::path::Path;

/// Whether a depth sample carries a measurement
#[inline]
pub fn is_valid_depth(depth: f32) -> bool {
    depth.is_finite() && depth > 0.0
}

fn check_len(width: u32, height: u32, len: usize) -> Result<(), ConfigurationError> {
    let expected = width as usize * height as usize;
    if len != expected {
        return Err(ConfigurationError::InvalidParameter(format!(
            "{}x{} image needs {} samples, got {}",
            width, height, expected, len
        )));
    }
    Ok(())
}

/// Nearest texel for a texture coordinate, clamped to the image
#[inline]
fn nearest_texel(uv: Vector2<f32>, width: u32, height: u32) -> (u32, u32) {
    let x = (uv.x * width as f32).floor().clamp(0.0, (width - 1) as f32) as u32;
    let y = (uv.y * height as f32).floor().clamp(0.0, (height - 1) as f32) as u32;
    (x, y)
}

/// Single channel view-space depth
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthImage {
    /// All samples invalid
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Result<Self, ConfigurationError> {
        check_len(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let i = self.index(x, y);
        self.data[i] = value;
    }

    /// Point-sampled depth at a texture coordinate
    pub fn sample_nearest(&self, uv: Vector2<f32>) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let (x, y) = nearest_texel(uv, self.width, self.height);
        self.get(x, y)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|d| is_valid_depth(**d)).count()
    }

    /// Import a 16-bit single channel image, multiplying every sample by `scale`
    pub fn from_luma16(image: &ImageBuffer<Luma<u16>, Vec<u16>>, scale: f32) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.pixels().map(|p| p.0[0] as f32 * scale).collect(),
        }
    }

    /// Export as 16-bit, dividing by `scale`. Invalid samples become 0.
    pub fn to_luma16(&self, scale: f32) -> ImageBuffer<Luma<u16>, Vec<u16>> {
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let d = self.get(x, y);
            if is_valid_depth(d) {
                Luma([(d / scale).round().clamp(0.0, u16::MAX as f32) as u16])
            } else {
                Luma([0])
            }
        })
    }

    pub fn load(path: &Path, scale: f32) -> AppResult<Self> {
        let image = image::open(path)?.into_luma16();
        Ok(Self::from_luma16(&image, scale))
    }

    pub fn save(&self, path: &Path, scale: f32) -> AppResult<()> {
        self.to_luma16(scale).save(path)?;
        Ok(())
    }
}

/// Per-pixel texture coordinates into another image, `[-1, -1]` when unmapped
#[derive(Debug, Clone, PartialEq)]
pub struct UvMap {
    width: u32,
    height: u32,
    data: Vec<[f32; 2]>,
}

impl UvMap {
    /// All entries unmapped
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![INVALID_UV; width as usize * height as usize],
        }
    }

    pub fn from_vec(
        width: u32,
        height: u32,
        data: Vec<[f32; 2]>,
    ) -> Result<Self, ConfigurationError> {
        check_len(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[[f32; 2]] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [f32; 2] {
        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, uv: [f32; 2]) {
        let i = y as usize * self.width as usize + x as usize;
        self.data[i] = uv;
    }

    #[inline]
    pub fn is_mapped(&self, x: u32, y: u32) -> bool {
        is_mapped_uv(self.get(x, y))
    }

    pub fn mapped_count(&self) -> usize {
        self.data.iter().filter(|uv| is_mapped_uv(**uv)).count()
    }

    /// Red = U, green = V, unmapped cells black
    pub fn to_rgba8(&self) -> RgbaImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let uv = self.get(x, y);
            if is_mapped_uv(uv) {
                Rgba([(uv[0] * 255.0) as u8, (uv[1] * 255.0) as u8, 0, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }
}

/// Whether a UV entry points inside the other image
#[inline]
pub fn is_mapped_uv(uv: [f32; 2]) -> bool {
    (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1])
}

/// Linear RGBA color in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    width: u32,
    height: u32,
    data: Vec<[f32; 4]>,
}

impl ColorImage {
    pub fn filled(width: u32, height: u32, color: [f32; 4]) -> Self {
        Self {
            width,
            height,
            data: vec![color; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [f32; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[[f32; 4]] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [f32; 4] {
        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: [f32; 4]) {
        let i = y as usize * self.width as usize + x as usize;
        self.data[i] = color;
    }

    /// Bilinear sample at a texture coordinate, clamped at the edges
    pub fn sample_bilinear(&self, uv: Vector2<f32>) -> [f32; 4] {
        if self.is_empty() {
            return [0.0; 4];
        }
        let fx = (uv.x * self.width as f32 - 0.5).clamp(0.0, (self.width - 1) as f32);
        let fy = (uv.y * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let lerp = |a: [f32; 4], b: [f32; 4], t: f32| -> [f32; 4] {
            std::array::from_fn(|c| a[c] + (b[c] - a[c]) * t)
        };
        let top = lerp(self.get(x0, y0), self.get(x1, y0), tx);
        let bottom = lerp(self.get(x0, y1), self.get(x1, y1), tx);
        lerp(top, bottom, ty)
    }

    pub fn from_rgba8(image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image
                .pixels()
                .map(|p| std::array::from_fn(|c| p.0[c] as f32 / 255.0))
                .collect(),
        }
    }

    pub fn to_rgba8(&self) -> RgbaImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let c = self.get(x, y);
            Rgba(std::array::from_fn(|i| {
                (c[i].clamp(0.0, 1.0) * 255.0).round() as u8
            }))
        })
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        Ok(Self::from_rgba8(&image::open(path)?.into_rgba8()))
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        self.to_rgba8().save(path)?;
        Ok(())
    }
}
