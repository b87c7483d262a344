// THEORY:
// A `Cell` is one segmented object: the exact set of pixels that belong to it, and
// optionally the traced outline used to draw it back onto an image.
//
// Key architectural principles:
// 1.  **Identity is the Body**: Two cells are the same cell iff they cover the same
//     pixels. The outline and centroid are derived views and take no part in
//     equality or hashing.
// 2.  **Immutable Data Container**: The centroid is computed once, at construction,
//     and nothing about a cell changes afterwards. Per-channel statistics live in
//     `ChannelCellAnalysis` and are never cached here.
// 3.  **Never Empty**: A cell without pixels cannot be constructed.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// A pixel coordinate. Points order in raster order (row first, then column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A single segmented cell.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Every pixel of the cell, unique and in raster order.
    body: BTreeSet<Point>,
    /// Boundary polygon in tracing order, if one was traced.
    outline: Option<Vec<Point>>,
    /// Arithmetic mean of the body coordinates, `(x, y)`.
    centroid: (f64, f64),
}

impl Cell {
    /// Returns `None` for an empty body.
    pub fn new(body: BTreeSet<Point>, outline: Option<Vec<Point>>) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        let n = body.len() as f64;
        let (sum_x, sum_y) = body
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
        Some(Self {
            body,
            outline,
            centroid: (sum_x / n, sum_y / n),
        })
    }

    pub fn from_points(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        Self::new(points.into_iter().collect(), None)
    }

    pub fn body(&self) -> &BTreeSet<Point> {
        &self.body
    }

    pub fn outline(&self) -> Option<&[Point]> {
        self.outline.as_deref()
    }

    pub fn centroid(&self) -> (f64, f64) {
        self.centroid
    }

    /// Number of body pixels.
    pub fn area(&self) -> usize {
        self.body.len()
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.body.contains(point)
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.body.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn square(x0: u32, y0: u32, side: u32) -> BTreeSet<Point> {
        (y0..y0 + side)
            .flat_map(|y| (x0..x0 + side).map(move |x| Point::new(x, y)))
            .collect()
    }

    #[test]
    fn centroid_is_the_mean_of_the_body() {
        let cell = Cell::new(square(2, 4, 2), None).unwrap();
        assert_eq!(cell.centroid(), (2.5, 4.5));
        assert_eq!(cell.area(), 4);
    }

    #[test]
    fn single_pixel_centroid_is_the_pixel() {
        let cell = Cell::from_points([Point::new(7, 3)]).unwrap();
        assert_eq!(cell.centroid(), (7.0, 3.0));
    }

    #[test]
    fn empty_body_is_not_a_cell() {
        assert!(Cell::new(BTreeSet::new(), None).is_none());
    }

    #[test]
    fn duplicate_points_collapse() {
        let cell = Cell::from_points([Point::new(1, 1), Point::new(1, 1), Point::new(2, 1)]).unwrap();
        assert_eq!(cell.area(), 2);
        assert_eq!(cell.centroid(), (1.5, 1.0));
    }

    #[test]
    fn equality_depends_only_on_the_body() {
        let a = Cell::new(square(0, 0, 2), None).unwrap();
        let b = Cell::new(square(0, 0, 2), Some(vec![Point::new(0, 0), Point::new(1, 1)])).unwrap();
        let c = Cell::new(square(0, 0, 2), Some(vec![Point::new(1, 0)])).unwrap();
        let other = Cell::new(square(1, 0, 2), None).unwrap();

        // Reflexive, symmetric, transitive.
        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_eq!(b, c);
        assert_eq!(a, c);
        assert_ne!(a, other);

        let set: HashSet<Cell> = [a, b, c, other].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn points_order_row_first() {
        let mut points = vec![Point::new(5, 0), Point::new(0, 1), Point::new(2, 0)];
        points.sort();
        assert_eq!(points, vec![Point::new(2, 0), Point::new(5, 0), Point::new(0, 1)]);
    }
}
