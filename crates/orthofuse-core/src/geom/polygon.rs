//! Ring polygons with the few operations the matcher needs:
//! area, centroid, strict containment and clipping against a patch rectangle.

use super::{Point, Rect};

/// Closed ring of planar coordinates. The closing edge from the last vertex
/// back to the first is implicit. Rings with fewer than three vertices are
/// degenerate and report zero area; self-intersections are not repaired.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Degenerate empty polygon, used when a footprint could not be formed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn is_degenerate(&self) -> bool {
        self.vertices.len() < 3
    }

    fn signed_area(&self) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        let n = self.vertices.len();
        let mut acc = 0.0;
        for i in 0..n {
            let a = &self.vertices[i];
            let b = &self.vertices[(i + 1) % n];
            acc += a.x * b.y - b.x * a.y;
        }
        acc / 2.0
    }

    /// Enclosed area (shoelace), zero for degenerate rings.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Area-weighted centroid; falls back to the vertex mean for rings with
    /// (near) zero area.
    pub fn centroid(&self) -> Option<Point> {
        if self.vertices.is_empty() {
            return None;
        }
        let signed = self.signed_area();
        if signed.abs() < 1e-12 {
            let n = self.vertices.len() as f64;
            let (sx, sy) = self
                .vertices
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            return Some(Point::new(sx / n, sy / n));
        }
        let n = self.vertices.len();
        let (mut cx, mut cy) = (0.0, 0.0);
        for i in 0..n {
            let a = &self.vertices[i];
            let b = &self.vertices[(i + 1) % n];
            let cross = a.x * b.y - b.x * a.y;
            cx += (a.x + b.x) * cross;
            cy += (a.y + b.y) * cross;
        }
        Some(Point::new(cx / (6.0 * signed), cy / (6.0 * signed)))
    }

    /// Strict interior test, boundary-exclusive: points lying on an edge are
    /// outside. Even-odd ray casting.
    pub fn contains(&self, p: &Point) -> bool {
        if self.is_degenerate() || self.on_boundary(p, 1e-9) {
            return false;
        }
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = &self.vertices[i];
            let b = &self.vertices[j];
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = b.x + (p.y - b.y) * (a.x - b.x) / (a.y - b.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    fn on_boundary(&self, p: &Point, eps: f64) -> bool {
        let n = self.vertices.len();
        (0..n).any(|i| {
            let a = &self.vertices[i];
            let b = &self.vertices[(i + 1) % n];
            segment_distance_sq(a, b, p) < eps * eps
        })
    }

    /// Clip against an axis-aligned rectangle (Sutherland-Hodgman). The clip
    /// window is convex, so the result is exact. May return a degenerate
    /// polygon when there is no overlap.
    pub fn clip_to_rect(&self, rect: &Rect) -> Polygon {
        let mut ring = self.vertices.clone();
        for side in [
            ClipSide::Left(rect.min_x),
            ClipSide::Right(rect.max_x),
            ClipSide::Bottom(rect.min_y),
            ClipSide::Top(rect.max_y),
        ] {
            ring = clip_half_plane(&ring, side);
            if ring.len() < 3 {
                return Polygon::empty();
            }
        }
        Polygon::new(ring)
    }

    /// Area of the overlap with a patch rectangle.
    pub fn intersection_area(&self, rect: &Rect) -> f64 {
        self.clip_to_rect(rect).area()
    }
}

#[derive(Clone, Copy)]
enum ClipSide {
    Left(f64),
    Right(f64),
    Bottom(f64),
    Top(f64),
}

impl ClipSide {
    fn inside(&self, p: &Point) -> bool {
        match *self {
            ClipSide::Left(x) => p.x >= x,
            ClipSide::Right(x) => p.x <= x,
            ClipSide::Bottom(y) => p.y >= y,
            ClipSide::Top(y) => p.y <= y,
        }
    }

    fn intersect(&self, a: &Point, b: &Point) -> Point {
        match *self {
            ClipSide::Left(x) | ClipSide::Right(x) => {
                let t = (x - a.x) / (b.x - a.x);
                Point::new(x, a.y + t * (b.y - a.y))
            }
            ClipSide::Bottom(y) | ClipSide::Top(y) => {
                let t = (y - a.y) / (b.y - a.y);
                Point::new(a.x + t * (b.x - a.x), y)
            }
        }
    }
}

fn clip_half_plane(ring: &[Point], side: ClipSide) -> Vec<Point> {
    let mut out = Vec::with_capacity(ring.len() + 4);
    let n = ring.len();
    for i in 0..n {
        let cur = &ring[i];
        let prev = &ring[(i + n - 1) % n];
        let cur_in = side.inside(cur);
        let prev_in = side.inside(prev);
        if cur_in {
            if !prev_in {
                out.push(side.intersect(prev, cur));
            }
            out.push(*cur);
        } else if prev_in {
            out.push(side.intersect(prev, cur));
        }
    }
    out
}

fn segment_distance_sq(a: &Point, b: &Point, p: &Point) -> f64 {
    let ab = b - a;
    let ap = p - a;
    let len_sq = ab.norm_squared();
    let t = if len_sq > 0.0 {
        (ap.dot(&ab) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = a + ab * t;
    (p - closest).norm_squared()
}
