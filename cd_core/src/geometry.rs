//! # Plan Geometry
//!
//! Integer-millimetre primitives for the packed plan ([`Point`], [`Rect`]) and
//! floating-point metre primitives for drawings ([`Vec2`], [`Bounds`]).
//!
//! Plan coordinates: x grows east, y grows north. A [`Rect`] is half-open in
//! spirit: two rectangles that only share an edge do not overlap.

use serde::{Deserialize, Serialize};

use crate::units;

/// A plan point in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Point { x, y }
    }

    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(units::m(self.x), units::m(self.y))
    }
}

/// Axis of a straight wall or cut line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Runs east-west (constant y)
    Horizontal,
    /// Runs north-south (constant x)
    Vertical,
}

/// Axis-aligned rectangle in millimetres, anchored at its south-west corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Rect { x, y, w, h }
    }

    pub fn from_corners(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Rect {
            x: x0.min(x1),
            y: y0.min(y1),
            w: (x1 - x0).abs(),
            h: (y1 - y0).abs(),
        }
    }

    pub fn max_x(&self) -> i64 {
        self.x + self.w
    }

    pub fn max_y(&self) -> i64 {
        self.y + self.h
    }

    pub fn area_mm2(&self) -> i64 {
        self.w * self.h
    }

    pub fn area_m2(&self) -> f64 {
        units::mm2_to_m2(self.area_mm2())
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Longer side over shorter side (infinite for degenerate rects)
    pub fn aspect(&self) -> f64 {
        let long = self.w.max(self.h) as f64;
        let short = self.w.min(self.h) as f64;
        if short <= 0.0 {
            f64::INFINITY
        } else {
            long / short
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            units::m(self.x) + units::m(self.w) / 2.0,
            units::m(self.y) + units::m(self.h) / 2.0,
        )
    }

    /// Counter-clockwise vertex loop starting at the south-west corner
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.max_x(), self.y),
            Point::new(self.max_x(), self.max_y()),
            Point::new(self.x, self.max_y()),
        ]
    }

    /// True when the interiors intersect (shared edges do not count)
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.max_x() && other.x < self.max_x() && self.y < other.max_y() && other.y < self.max_y()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x && other.y >= self.y && other.max_x() <= self.max_x() && other.max_y() <= self.max_y()
    }

    /// Point containment test in doubled coordinates, so probes can sit half
    /// a millimetre off an edge without leaving integer space.
    pub fn contains_doubled(&self, px2: i64, py2: i64) -> bool {
        px2 > 2 * self.x && px2 < 2 * self.max_x() && py2 > 2 * self.y && py2 < 2 * self.max_y()
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 > x0 && y1 > y0 {
            Some(Rect::from_corners(x0, y0, x1, y1))
        } else {
            None
        }
    }

    /// Length of the edge two touching rectangles share (0 if none)
    pub fn shared_edge_len(&self, other: &Rect) -> i64 {
        let vertical_touch = self.max_x() == other.x || other.max_x() == self.x;
        let horizontal_touch = self.max_y() == other.y || other.max_y() == self.y;
        if vertical_touch {
            let overlap = self.max_y().min(other.max_y()) - self.y.max(other.y);
            if overlap > 0 {
                return overlap;
            }
        }
        if horizontal_touch {
            let overlap = self.max_x().min(other.max_x()) - self.x.max(other.x);
            if overlap > 0 {
                return overlap;
            }
        }
        0
    }

    /// Bounding box of a set of rectangles
    pub fn bounding(rects: impl IntoIterator<Item = Rect>) -> Option<Rect> {
        let mut iter = rects.into_iter();
        let first = iter.next()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.max_x(), first.max_y());
        for r in iter {
            x0 = x0.min(r.x);
            y0 = y0.min(r.y);
            x1 = x1.max(r.max_x());
            y1 = y1.max(r.max_y());
        }
        Some(Rect::from_corners(x0, y0, x1, y1))
    }
}

/// A drawing-space point in metres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Vec2::new(self.x + dx, self.y + dy)
    }

    pub fn distance_sq(self, other: Vec2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn midpoint(self, other: Vec2) -> Vec2 {
        Vec2::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Axis-aligned bounds in metres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn empty() -> Self {
        Bounds {
            min: Vec2::new(f64::INFINITY, f64::INFINITY),
            max: Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_rect(rect: &Rect) -> Self {
        Bounds {
            min: Point::new(rect.x, rect.y).to_vec2(),
            max: Point::new(rect.max_x(), rect.max_y()).to_vec2(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn include(&mut self, p: Vec2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn union(&mut self, other: &Bounds) {
        if !other.is_empty() {
            self.include(other.min);
            self.include(other.max);
        }
    }

    pub fn expanded(&self, by: f64) -> Bounds {
        Bounds {
            min: self.min.offset(-by, -by),
            max: self.max.offset(by, by),
        }
    }

    pub fn width(&self) -> f64 {
        (self.max.x - self.min.x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max.y - self.min.y).max(0.0)
    }

    pub fn center(&self) -> Vec2 {
        self.min.midpoint(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_excludes_shared_edges() {
        let a = Rect::new(0, 0, 3000, 4000);
        let b = Rect::new(3000, 0, 2000, 4000);
        assert!(!a.overlaps(&b));
        assert_eq!(a.shared_edge_len(&b), 4000);

        let c = Rect::new(2900, 100, 1000, 1000);
        assert!(a.overlaps(&c));
    }

    #[test]
    fn test_shared_edge_partial() {
        let a = Rect::new(0, 0, 4000, 3000);
        let b = Rect::new(2500, 3000, 4000, 2000);
        assert_eq!(a.shared_edge_len(&b), 1500);
        let far = Rect::new(5000, 5000, 10, 10);
        assert_eq!(a.shared_edge_len(&far), 0);
    }

    #[test]
    fn test_bounding_and_intersection() {
        let bbox = Rect::bounding([Rect::new(0, 0, 10, 10), Rect::new(20, 5, 5, 30)]).unwrap();
        assert_eq!(bbox, Rect::new(0, 0, 25, 35));
        assert_eq!(Rect::new(0, 0, 10, 10).intersection(&Rect::new(5, 5, 10, 10)), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(Rect::new(0, 0, 10, 10).intersection(&Rect::new(10, 0, 10, 10)), None);
    }

    #[test]
    fn test_doubled_containment() {
        let r = Rect::new(0, 0, 1000, 1000);
        assert!(r.contains_doubled(1000, 1));
        assert!(!r.contains_doubled(1000, -1));
    }

    #[test]
    fn test_bounds() {
        let mut b = Bounds::empty();
        assert!(b.is_empty());
        b.include(Vec2::new(1.0, 2.0));
        b.include(Vec2::new(-1.0, 5.0));
        assert_eq!(b.width(), 2.0);
        assert_eq!(b.height(), 3.0);
        assert_eq!(b.center(), Vec2::new(0.0, 3.5));
    }
}
