// SPDX-License-Identifier: GPL-3.0-only

//! Nearest-wins destination grid
//!
//! Each cell is one `AtomicU64` holding `depth_bits << 32 | source_index`.
//! Positive finite `f32` bit patterns sort like the values, so a single
//! `fetch_min` keeps the nearest sample and breaks ties towards the lowest
//! source index. The result does not depend on the order lanes run in.

use crate::camera::pixel_center_uv;
use crate::frame::{DepthImage, UvMap, is_valid_depth};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cell value before any sample lands
pub const EMPTY_CELL: u64 = u64::MAX;

/// Pack a positive depth and its source pixel index into one sortable word
#[inline]
pub fn pack(depth: f32, source_index: u32) -> u64 {
    ((depth.to_bits() as u64) << 32) | source_index as u64
}

/// Inverse of [`pack`], `None` for empty cells
#[inline]
pub fn unpack(cell: u64) -> Option<(f32, u32)> {
    if cell == EMPTY_CELL {
        return None;
    }
    Some((f32::from_bits((cell >> 32) as u32), cell as u32))
}

/// Destination buffer shared by all scatter lanes
pub struct DestinationGrid {
    width: u32,
    height: u32,
    cells: Vec<AtomicU64>,
}

impl DestinationGrid {
    pub fn new(width: u32, height: u32) -> Self {
        let cells = (0..width as usize * height as usize)
            .map(|_| AtomicU64::new(EMPTY_CELL))
            .collect();
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reset every cell to empty for a new frame
    pub fn clear(&mut self) {
        self.cells
            .par_iter_mut()
            .for_each(|cell| *cell.get_mut() = EMPTY_CELL);
    }

    /// Offer a sample to cell (x, y). Returns true if it is the current winner.
    ///
    /// Invalid depths and out-of-range cells are ignored.
    #[inline]
    pub fn scatter(&self, x: u32, y: u32, depth: f32, source_index: u32) -> bool {
        if x >= self.width || y >= self.height || !is_valid_depth(depth) {
            return false;
        }
        let packed = pack(depth, source_index);
        let cell = &self.cells[y as usize * self.width as usize + x as usize];
        let previous = cell.fetch_min(packed, Ordering::Relaxed);
        previous >= packed
    }

    /// Winning `(depth, source_index)` of a cell
    pub fn load(&self, x: u32, y: u32) -> Option<(f32, u32)> {
        let cell = &self.cells[y as usize * self.width as usize + x as usize];
        unpack(cell.load(Ordering::Relaxed))
    }

    pub fn occupied_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.load(Ordering::Relaxed) != EMPTY_CELL)
            .count()
    }

    /// Unpack into winning depth per cell and the winning sample's source UV.
    ///
    /// `source_width` x `source_height` is the image the indices refer to.
    pub fn resolve(&self, source_width: u32, source_height: u32) -> (DepthImage, UvMap) {
        let sw = source_width.max(1);
        let unpacked: Vec<(f32, [f32; 2])> = self
            .cells
            .par_iter()
            .map(|cell| match unpack(cell.load(Ordering::Relaxed)) {
                Some((depth, index)) => {
                    let uv = pixel_center_uv(index % sw, index / sw, sw, source_height.max(1));
                    (depth, [uv.x, uv.y])
                }
                None => (0.0, crate::constants::alignment::INVALID_UV),
            })
            .collect();

        let (depth, uv): (Vec<f32>, Vec<[f32; 2]>) = unpacked.into_iter().unzip();
        let depth = DepthImage::from_vec(self.width, self.height, depth)
            .unwrap_or_else(|_| DepthImage::new(self.width, self.height));
        let uv = UvMap::from_vec(self.width, self.height, uv)
            .unwrap_or_else(|_| UvMap::new(self.width, self.height));
        (depth, uv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_orders_by_depth_then_index() {
        assert!(pack(1.0, 900) < pack(2.0, 0));
        assert!(pack(5.0, 3) < pack(5.0, 4));
        assert!(pack(f32::MAX, u32::MAX) < EMPTY_CELL);
        assert_eq!(unpack(pack(123.25, 77)), Some((123.25, 77)));
        assert_eq!(unpack(EMPTY_CELL), None);
    }

    #[test]
    fn test_nearest_wins_in_either_order() {
        let (d1, d2) = (50.0, 80.0);

        let grid = DestinationGrid::new(4, 4);
        grid.scatter(1, 2, d2, 7);
        grid.scatter(1, 2, d1, 9);
        assert_eq!(grid.load(1, 2), Some((d1, 9)));

        let grid = DestinationGrid::new(4, 4);
        grid.scatter(1, 2, d1, 9);
        assert!(!grid.scatter(1, 2, d2, 7));
        assert_eq!(grid.load(1, 2), Some((d1, 9)));
    }

    #[test]
    fn test_equal_depth_lowest_index_wins() {
        let grid = DestinationGrid::new(1, 1);
        grid.scatter(0, 0, 10.0, 5);
        grid.scatter(0, 0, 10.0, 2);
        grid.scatter(0, 0, 10.0, 8);
        assert_eq!(grid.load(0, 0), Some((10.0, 2)));
    }

    #[test]
    fn test_concurrent_scatter() {
        let grid = DestinationGrid::new(1, 1);
        (0..10_000u32).into_par_iter().for_each(|i| {
            grid.scatter(0, 0, 100.0 + (i % 97) as f32, i);
        });
        // depth 100 comes from every multiple of 97, lowest index 0
        assert_eq!(grid.load(0, 0), Some((100.0, 0)));
    }

    #[test]
    fn test_invalid_samples_ignored() {
        let grid = DestinationGrid::new(2, 2);
        assert!(!grid.scatter(0, 0, 0.0, 1));
        assert!(!grid.scatter(0, 0, f32::NAN, 1));
        assert!(!grid.scatter(5, 0, 10.0, 1));
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test]
    fn test_resolve_and_clear() {
        let mut grid = DestinationGrid::new(2, 1);
        grid.scatter(1, 0, 42.0, 3);
        let (depth, uv) = grid.resolve(2, 2);
        assert_eq!(depth.data(), &[0.0, 42.0]);
        assert_eq!(uv.get(1, 0), [0.75, 0.75]);
        assert!(!uv.is_mapped(0, 0));

        grid.clear();
        assert_eq!(grid.occupied_count(), 0);
    }
}
