// SPDX-License-Identifier: GPL-3.0-only

//! Resample a source camera image into the destination view through a UV map

use crate::errors::{AppResult, MissingInputError};
use crate::frame::{ColorImage, UvMap, is_mapped_uv};
use nalgebra::Vector2;
use rayon::prelude::*;

/// Colour of destination cells the source camera does not see
pub const UNMAPPED_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// One output pixel per UV map cell, bilinearly sampled from `source_color`.
///
/// Cells holding the invalid-UV sentinel become [`UNMAPPED_COLOR`].
pub fn map_texture(source_color: &ColorImage, uv_map: &UvMap) -> AppResult<ColorImage> {
    if source_color.is_empty() {
        return Err(MissingInputError::Texture("source color".to_string()).into());
    }
    if uv_map.width() == 0 || uv_map.height() == 0 {
        return Err(MissingInputError::Texture("uv map".to_string()).into());
    }

    let width = uv_map.width() as usize;
    let mut output = ColorImage::filled(uv_map.width(), uv_map.height(), UNMAPPED_COLOR);
    output
        .data_mut()
        .par_chunks_mut(width)
        .zip(uv_map.data().par_chunks(width))
        .for_each(|(row, uvs)| {
            for (pixel, uv) in row.iter_mut().zip(uvs) {
                if is_mapped_uv(*uv) {
                    *pixel = source_color.sample_bilinear(Vector2::new(uv[0], uv[1]));
                }
            }
        });
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::alignment::INVALID_UV;

    #[test]
    fn test_identity_map_copies_pixels() {
        let source = ColorImage::from_fn(4, 3, |x, y| [x as f32, y as f32, 0.0, 1.0]);
        let mut map = UvMap::new(4, 3);
        for y in 0..3 {
            for x in 0..4 {
                map.set(x, y, [(x as f32 + 0.5) / 4.0, (y as f32 + 0.5) / 3.0]);
            }
        }
        let out = map_texture(&source, &map).unwrap();
        for y in 0..3 {
            for x in 0..4 {
                let p = out.get(x, y);
                assert!((p[0] - x as f32).abs() < 1e-5);
                assert!((p[1] - y as f32).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_unmapped_cells_are_transparent() {
        let source = ColorImage::filled(2, 2, [1.0; 4]);
        let mut map = UvMap::new(3, 1);
        map.set(1, 0, [0.5, 0.5]);
        map.set(2, 0, INVALID_UV);
        let out = map_texture(&source, &map).unwrap();
        assert_eq!(out.get(0, 0), UNMAPPED_COLOR);
        assert_eq!(out.get(1, 0), [1.0; 4]);
        assert_eq!(out.get(2, 0), UNMAPPED_COLOR);
    }

    #[test]
    fn test_interpolates_between_texels() {
        let source = ColorImage::from_fn(2, 1, |x, _| [x as f32, 0.0, 0.0, 1.0]);
        let mut map = UvMap::new(1, 1);
        map.set(0, 0, [0.5, 0.5]);
        let out = map_texture(&source, &map).unwrap();
        assert!((out.get(0, 0)[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(map_texture(&ColorImage::filled(0, 0, [0.0; 4]), &UvMap::new(2, 2)).is_err());
        assert!(map_texture(&ColorImage::filled(2, 2, [0.0; 4]), &UvMap::new(0, 0)).is_err());
    }
}
