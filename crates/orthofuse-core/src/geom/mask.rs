//! Occupancy grid for union coverage of many footprints over one patch.
//!
//! Exact polygon unions are overkill for the admission gate; a cell-center
//! occupancy grid over the patch rectangle is deterministic, order-independent
//! and exact for axis-aligned tilings. Resolution is configurable; an even
//! resolution keeps cell centers off half-split seams.

use super::{Point, Polygon, Rect};

/// Boolean coverage grid over a patch rectangle.
#[derive(Debug, Clone)]
pub struct CoverageMask {
    rect: Rect,
    resolution: usize,
    cells: Vec<bool>,
}

impl CoverageMask {
    pub fn new(rect: Rect, resolution: usize) -> Self {
        let resolution = resolution.max(2);
        Self {
            rect,
            resolution,
            cells: vec![false; resolution * resolution],
        }
    }

    fn cell_center(&self, row: usize, col: usize) -> Point {
        let fx = (col as f64 + 0.5) / self.resolution as f64;
        let fy = (row as f64 + 0.5) / self.resolution as f64;
        Point::new(
            self.rect.min_x + fx * self.rect.width(),
            self.rect.min_y + fy * self.rect.height(),
        )
    }

    /// Mark every cell whose center lies inside the polygon.
    pub fn paint(&mut self, polygon: &Polygon) {
        if polygon.is_degenerate() {
            return;
        }
        for row in 0..self.resolution {
            for col in 0..self.resolution {
                let idx = row * self.resolution + col;
                if !self.cells[idx] && polygon.contains(&self.cell_center(row, col)) {
                    self.cells[idx] = true;
                }
            }
        }
    }

    /// Fraction of the patch covered by the union of painted polygons.
    pub fn coverage(&self) -> f64 {
        let covered = self.cells.iter().filter(|&&c| c).count();
        covered as f64 / self.cells.len() as f64
    }
}
