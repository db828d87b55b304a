//! Planar geometry primitives for patches and footprints

pub mod mask;
pub mod polygon;

pub use mask::CoverageMask;
pub use polygon::Polygon;

use nalgebra::Point2;

/// Planar point in the working projected CRS (meters).
pub type Point = Point2<f64>;

/// Axis-aligned rectangle in the working projected CRS.
///
/// Ground patches are rectangles by construction, so patch-side geometry
/// never needs a general polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn centroid(&self) -> Point {
        Point::new(
            0.5 * (self.min_x + self.max_x),
            0.5 * (self.min_y + self.max_y),
        )
    }

    /// Strict interior test, boundary-exclusive.
    pub fn contains(&self, p: &Point) -> bool {
        p.x > self.min_x && p.x < self.max_x && p.y > self.min_y && p.y < self.max_y
    }

    /// Corner ring in counter-clockwise order.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x, self.min_y),
            Point::new(self.max_x, self.min_y),
            Point::new(self.max_x, self.max_y),
            Point::new(self.min_x, self.max_y),
        ]
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(self.corners().to_vec())
    }
}
