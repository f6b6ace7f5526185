// SPDX-License-Identifier: GPL-3.0-only

//! Centred crosshair overlay, used to eyeball alignment during calibration

use crate::frame::ColorImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Crosshair {
    /// Linear RGBA, alpha blends over the image
    pub color: [f32; 4],
    /// Bar thickness in pixels
    pub width: u32,
    /// Bar length in pixels, end to end
    pub length: u32,
}

impl Default for Crosshair {
    fn default() -> Self {
        Self {
            color: [1.0, 0.0, 0.0, 1.0],
            width: 2,
            length: 40,
        }
    }
}

impl Crosshair {
    /// Whether the pixel centre at `(x, y)` lies on one of the two bars
    pub fn covers(&self, x: u32, y: u32, image_width: u32, image_height: u32) -> bool {
        let dx = (x as f32 + 0.5 - image_width as f32 * 0.5).abs();
        let dy = (y as f32 + 0.5 - image_height as f32 * 0.5).abs();
        let half_width = self.width as f32 * 0.5;
        let half_length = self.length as f32 * 0.5;
        (dx <= half_length && dy <= half_width) || (dy <= half_length && dx <= half_width)
    }
}

/// Blend the crosshair into `image` in place
pub fn add_crosshair(image: &mut ColorImage, crosshair: &Crosshair) {
    if crosshair.width == 0 || crosshair.length == 0 {
        return;
    }
    let (width, height) = (image.width(), image.height());
    let alpha = crosshair.color[3].clamp(0.0, 1.0);

    // Only the bounding square of the bars can be touched
    let reach = crosshair.length.max(crosshair.width) / 2 + 1;
    let x_range = (width / 2).saturating_sub(reach)..(width / 2 + reach).min(width);
    let y_range = (height / 2).saturating_sub(reach)..(height / 2 + reach).min(height);
    for y in y_range {
        for x in x_range.clone() {
            if !crosshair.covers(x, y, width, height) {
                continue;
            }
            let mut pixel = image.get(x, y);
            for c in 0..3 {
                pixel[c] += (crosshair.color[c] - pixel[c]) * alpha;
            }
            pixel[3] = pixel[3].max(alpha);
            image.set(x, y, pixel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_red(image: &ColorImage) -> usize {
        image.data().iter().filter(|p| p[0] == 1.0).count()
    }

    #[test]
    fn test_crosshair_pixel_count() {
        let mut image = ColorImage::filled(64, 64, [0.0, 0.0, 0.0, 1.0]);
        add_crosshair(
            &mut image,
            &Crosshair {
                color: [1.0, 0.0, 0.0, 1.0],
                width: 2,
                length: 10,
            },
        );
        // Two 10x2 bars sharing a 2x2 centre
        assert_eq!(count_red(&image), 36);
        assert_eq!(image.get(31, 31)[0], 1.0);
        assert_eq!(image.get(27, 32)[0], 1.0);
        assert_eq!(image.get(26, 32)[0], 0.0);
        assert_eq!(image.get(0, 0)[0], 0.0);
    }

    #[test]
    fn test_zero_sized_crosshair_is_noop() {
        let mut image = ColorImage::filled(8, 8, [0.2; 4]);
        let before = image.clone();
        add_crosshair(
            &mut image,
            &Crosshair {
                width: 0,
                ..Crosshair::default()
            },
        );
        assert_eq!(image, before);
    }

    #[test]
    fn test_alpha_blends() {
        let mut image = ColorImage::filled(9, 9, [0.0, 0.0, 0.0, 1.0]);
        add_crosshair(
            &mut image,
            &Crosshair {
                color: [1.0, 1.0, 1.0, 0.25],
                width: 1,
                length: 3,
            },
        );
        assert!((image.get(4, 4)[0] - 0.25).abs() < 1e-6);
        assert_eq!(image.get(0, 4)[0], 0.0);
    }

    #[test]
    fn test_crosshair_larger_than_image() {
        let mut image = ColorImage::filled(4, 4, [0.0, 0.0, 0.0, 1.0]);
        add_crosshair(
            &mut image,
            &Crosshair {
                color: [1.0, 0.0, 0.0, 1.0],
                width: 2,
                length: 100,
            },
        );
        assert_eq!(count_red(&image), 12);
    }
}
