//! Planar geometry helpers
//!
//! All positions are expressed in a building-local metric frame (meters,
//! `x` grows east, `y` grows north). Map ingestion is responsible for
//! projecting geographic coordinates into this frame.

use serde::{Deserialize, Serialize};

/// A point in the local metric frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Easting in meters
    pub x: f64,
    /// Northing in meters
    pub y: f64,
}

impl Point {
    /// Create a point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Compass bearing towards `other` in degrees, `0` = north, clockwise.
    pub fn bearing_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let deg = dx.atan2(dy).to_degrees();
        if deg < 0.0 {
            deg + 360.0
        } else {
            deg
        }
    }

    /// Weighted mean of points. Returns `None` when the total weight is not positive.
    pub fn weighted_mean<I>(points: I) -> Option<Point>
    where
        I: IntoIterator<Item = (Point, f64)>,
    {
        let (mut sx, mut sy, mut sw) = (0.0, 0.0, 0.0);
        for (p, w) in points {
            sx += p.x * w;
            sy += p.y * w;
            sw += w;
        }
        (sw > 0.0).then(|| Point::new(sx / sw, sy / sw))
    }
}

/// Unsigned area of the triangle spanned by three points.
pub fn triangle_area(a: &Point, b: &Point, c: &Point) -> f64 {
    ((a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y)) / 2.0).abs()
}

/// Simple polygon given by its vertices in order (closing edge implied).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    /// Polygon vertices
    pub vertices: Vec<Point>,
}

impl Polygon {
    /// Create a polygon from vertices.
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Ray-casting containment test. Degenerate polygons contain nothing.
    pub fn contains(&self, p: &Point) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let vi = self.vertices[i];
            let vj = self.vertices[j];
            if (vi.y > p.y) != (vj.y > p.y)
                && p.x < (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bearing_cardinal_points() {
        let o = Point::new(0.0, 0.0);
        assert!((o.bearing_to(&Point::new(0.0, 5.0)) - 0.0).abs() < 1e-9);
        assert!((o.bearing_to(&Point::new(5.0, 0.0)) - 90.0).abs() < 1e-9);
        assert!((o.bearing_to(&Point::new(0.0, -5.0)) - 180.0).abs() < 1e-9);
        assert!((o.bearing_to(&Point::new(-5.0, 0.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_mean_rejects_zero_weight() {
        assert!(Point::weighted_mean(vec![(Point::new(1.0, 1.0), 0.0)]).is_none());
        let m = Point::weighted_mean(vec![
            (Point::new(0.0, 0.0), 1.0),
            (Point::new(10.0, 0.0), 3.0),
        ])
        .unwrap();
        assert!((m.x - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_contains() {
        let square = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        assert!(square.contains(&Point::new(5.0, 5.0)));
        assert!(!square.contains(&Point::new(15.0, 5.0)));
        assert!(!Polygon::default().contains(&Point::new(0.0, 0.0)));
    }

    #[test]
    fn test_triangle_area() {
        let area = triangle_area(
            &Point::new(0.0, 0.0),
            &Point::new(4.0, 0.0),
            &Point::new(0.0, 3.0),
        );
        assert!((area - 6.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_weighted_mean_stays_in_bounds(
            points in prop::collection::vec(
                ((-1000.0..1000.0f64, -1000.0..1000.0f64), 0.01..10.0f64),
                1..20,
            ),
        ) {
            let mean = Point::weighted_mean(
                points.iter().map(|((x, y), w)| (Point::new(*x, *y), *w)),
            )
            .unwrap();
            let min_x = points.iter().map(|((x, _), _)| *x).fold(f64::INFINITY, f64::min);
            let max_x = points.iter().map(|((x, _), _)| *x).fold(f64::NEG_INFINITY, f64::max);
            let min_y = points.iter().map(|((_, y), _)| *y).fold(f64::INFINITY, f64::min);
            let max_y = points.iter().map(|((_, y), _)| *y).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(mean.x >= min_x - 1e-6 && mean.x <= max_x + 1e-6);
            prop_assert!(mean.y >= min_y - 1e-6 && mean.y <= max_y + 1e-6);
        }

        #[test]
        fn prop_bearing_in_compass_range(
            a in (-100.0..100.0f64, -100.0..100.0f64),
            b in (-100.0..100.0f64, -100.0..100.0f64),
        ) {
            let bearing = Point::new(a.0, a.1).bearing_to(&Point::new(b.0, b.1));
            prop_assert!((0.0..=360.0).contains(&bearing));
        }
    }
}
