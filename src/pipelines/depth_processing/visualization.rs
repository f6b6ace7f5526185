// SPDX-License-Identifier: GPL-3.0-only

//! Preview images of reconstructed or aligned depth
//!
//! Depth is in centimetres. The `[near, far]` window usually comes from
//! `depth_processing.visualize_range` in the config; samples outside it are
//! clamped to its ends and holes are drawn black so dropouts stand out.

use crate::constants::VisualizationMode;
use crate::constants::depth::COLORMAP_BANDS;
use crate::frame::{DepthImage, is_valid_depth};
use image::{ImageBuffer, Rgba, RgbaImage};

/// Quintic fit of the Turbo palette, `t = 0` near (blue) to `t = 1` far (red)
#[inline]
fn turbo(t: f32) -> [u8; 4] {
    let r = (0.13572138
        + t * (4.6153926 + t * (-42.66032 + t * (132.13108 + t * (-152.54825 + t * 59.28144)))))
        .clamp(0.0, 1.0);
    let g = (0.09140261
        + t * (2.19418 + t * (4.84296 + t * (-14.18503 + t * (4.27805 + t * 2.53377)))))
        .clamp(0.0, 1.0);
    let b = (0.1066733
        + t * (12.64194 + t * (-60.58204 + t * (109.99648 + t * (-82.52904 + t * 20.43388)))))
        .clamp(0.0, 1.0);
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8, 255]
}

/// Normalized position of `depth` inside `range`, or `None` for invalid samples
#[inline]
pub fn normalize_depth(depth: f32, range: [f32; 2]) -> Option<f32> {
    if !is_valid_depth(depth) {
        return None;
    }
    let span = (range[1] - range[0]).max(f32::EPSILON);
    Some(((depth - range[0]) / span).clamp(0.0, 1.0))
}

/// Render `depth` (cm, 0 = hole) over the `range` window in `mode`.
///
/// With `quantize` the ramp is cut into `COLORMAP_BANDS` steps, which makes
/// iso-depth contours of a relaxed surface easy to see.
pub fn visualize_depth(
    depth: &DepthImage,
    range: [f32; 2],
    mode: VisualizationMode,
    quantize: bool,
) -> RgbaImage {
    ImageBuffer::from_fn(depth.width(), depth.height(), |x, y| {
        let Some(mut t) = normalize_depth(depth.get(x, y), range) else {
            return Rgba([0, 0, 0, 255]);
        };
        if quantize {
            t = (t * COLORMAP_BANDS).floor() / COLORMAP_BANDS;
        }
        match mode {
            VisualizationMode::Grayscale => {
                let gray = ((1.0 - t) * 255.0) as u8;
                Rgba([gray, gray, gray, 255])
            }
            VisualizationMode::Turbo => Rgba(turbo(t)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holes_render_black() {
        let depth = DepthImage::from_vec(3, 1, vec![0.0, f32::NAN, 150.0]).unwrap();
        let rgba = visualize_depth(&depth, [40.0, 400.0], VisualizationMode::Turbo, false);
        assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(rgba.get_pixel(1, 0).0, [0, 0, 0, 255]);
        assert_ne!(rgba.get_pixel(2, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_grayscale_window_ends() {
        let depth = DepthImage::from_vec(2, 1, vec![40.0, 400.0]).unwrap();
        let rgba = visualize_depth(&depth, [40.0, 400.0], VisualizationMode::Grayscale, false);
        assert_eq!(rgba.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(rgba.get_pixel(1, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_quantized_bands_merge_close_depths() {
        // Two samples within one band share a colour once quantized
        let band = 360.0 / COLORMAP_BANDS;
        let depth = DepthImage::from_vec(2, 1, vec![40.0 + band * 0.1, 40.0 + band * 0.9]).unwrap();
        let smooth = visualize_depth(&depth, [40.0, 400.0], VisualizationMode::Grayscale, false);
        let banded = visualize_depth(&depth, [40.0, 400.0], VisualizationMode::Grayscale, true);
        assert_ne!(smooth.get_pixel(0, 0), smooth.get_pixel(1, 0));
        assert_eq!(banded.get_pixel(0, 0), banded.get_pixel(1, 0));
    }

    #[test]
    fn test_normalize_clamps_to_range() {
        assert_eq!(normalize_depth(10.0, [40.0, 400.0]), Some(0.0));
        assert_eq!(normalize_depth(1000.0, [40.0, 400.0]), Some(1.0));
        assert_eq!(normalize_depth(0.0, [40.0, 400.0]), None);
        assert_eq!(normalize_depth(220.0, [40.0, 400.0]), Some(0.5));
    }
}
