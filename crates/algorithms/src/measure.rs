//! Planar measurements on metric polylines
//!
//! Lengths, nearest-point projection with arc-length position, points and
//! tangents at a given arc length, and the angle between two directions.
//! All inputs are assumed to be in a metric reference system.

use geo::{Coord, LineString};

/// Euclidean distance between two coordinates
#[inline]
pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Length of one polyline part
pub fn line_length(ls: &LineString<f64>) -> f64 {
    ls.0.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Total length of all parts
pub fn total_length(parts: &[LineString<f64>]) -> f64 {
    parts.iter().map(line_length).sum()
}

/// Nearest position on a polyline to a query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLocation {
    /// Closest point on the line
    pub point: Coord<f64>,
    /// Perpendicular (shortest) distance from the query point
    pub distance: f64,
    /// Arc length from the start of the part to `point`
    pub arc: f64,
    /// Index of the part holding `point`
    pub part: usize,
}

/// Closest point on segment `a`-`b` and its parameter in `[0, 1]`
fn project_on_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (Coord<f64>, f64) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (a, 0.0);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    (Coord { x: a.x + t * dx, y: a.y + t * dy }, t)
}

/// Project a point onto a set of polyline parts.
///
/// Ties keep the first part and segment encountered. `None` for empty input.
pub fn locate(parts: &[LineString<f64>], p: Coord<f64>) -> Option<LineLocation> {
    let mut best: Option<LineLocation> = None;
    for (part, ls) in parts.iter().enumerate() {
        let mut arc_start = 0.0;
        for w in ls.0.windows(2) {
            let seg_len = distance(w[0], w[1]);
            let (q, t) = project_on_segment(p, w[0], w[1]);
            let d = distance(p, q);
            if best.map_or(true, |b| d < b.distance) {
                best = Some(LineLocation {
                    point: q,
                    distance: d,
                    arc: arc_start + t * seg_len,
                    part,
                });
            }
            arc_start += seg_len;
        }
    }
    best
}

/// Smallest distance from `p` to any vertex of the parts
pub fn nearest_vertex_distance(parts: &[LineString<f64>], p: Coord<f64>) -> f64 {
    parts
        .iter()
        .flat_map(|ls| ls.0.iter())
        .map(|v| distance(p, *v))
        .fold(f64::INFINITY, f64::min)
}

/// Point at arc length `arc` along one part, clamped to its ends.
pub fn point_at(ls: &LineString<f64>, arc: f64) -> Option<Coord<f64>> {
    let first = *ls.0.first()?;
    if arc <= 0.0 {
        return Some(first);
    }
    let mut walked = 0.0;
    for w in ls.0.windows(2) {
        let seg_len = distance(w[0], w[1]);
        if walked + seg_len >= arc && seg_len > 0.0 {
            let t = (arc - walked) / seg_len;
            return Some(Coord {
                x: w[0].x + t * (w[1].x - w[0].x),
                y: w[0].y + t * (w[1].y - w[0].y),
            });
        }
        walked += seg_len;
    }
    ls.0.last().copied()
}

/// Point at a fraction of the total length, walking the parts in order.
pub fn point_at_fraction(parts: &[LineString<f64>], fraction: f64) -> Option<Coord<f64>> {
    let mut remaining = total_length(parts) * fraction.clamp(0.0, 1.0);
    for ls in parts {
        let len = line_length(ls);
        if remaining <= len {
            return point_at(ls, remaining);
        }
        remaining -= len;
    }
    parts.last().and_then(|ls| ls.0.last().copied())
}

/// Unit vector of `(dx, dy)`, `None` for a zero vector
pub fn unit(dx: f64, dy: f64) -> Option<(f64, f64)> {
    let len = dx.hypot(dy);
    (len > 0.0 && len.is_finite()).then(|| (dx / len, dy / len))
}

/// Local direction of a part at arc length `arc`, by central difference
/// over `arc - delta .. arc + delta` (clamped to the part).
pub fn tangent_at(ls: &LineString<f64>, arc: f64, delta: f64) -> Option<(f64, f64)> {
    let before = point_at(ls, arc - delta)?;
    let after = point_at(ls, arc + delta)?;
    unit(after.x - before.x, after.y - before.y)
}

/// Angle between two unit directions in degrees, `0..=180`
pub fn angle_between(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dot = (a.0 * b.0 + a.1 * b.1).clamp(-1.0, 1.0);
    dot.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn l_shape() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)])
    }

    #[test]
    fn test_lengths() {
        assert!((line_length(&l_shape()) - 20.0).abs() < 1e-12);
        let parts = vec![l_shape(), LineString::from(vec![(0.0, 0.0), (3.0, 4.0)])];
        assert!((total_length(&parts) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_locate_interior() {
        let loc = locate(&[l_shape()], c(4.0, 3.0)).unwrap();
        assert_eq!(loc.point, c(4.0, 0.0));
        assert!((loc.distance - 3.0).abs() < 1e-12);
        assert!((loc.arc - 4.0).abs() < 1e-12);

        let loc = locate(&[l_shape()], c(12.0, 7.0)).unwrap();
        assert_eq!(loc.point, c(10.0, 7.0));
        assert!((loc.arc - 17.0).abs() < 1e-12);
    }

    #[test]
    fn test_locate_picks_nearest_part() {
        let parts = vec![
            LineString::from(vec![(0.0, 100.0), (10.0, 100.0)]),
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0)]),
        ];
        let loc = locate(&parts, c(5.0, 2.0)).unwrap();
        assert_eq!(loc.part, 1);
        assert!(locate(&[], c(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_point_at_and_fraction() {
        let ls = l_shape();
        assert_eq!(point_at(&ls, 15.0), Some(c(10.0, 5.0)));
        assert_eq!(point_at(&ls, -1.0), Some(c(0.0, 0.0)));
        assert_eq!(point_at(&ls, 99.0), Some(c(10.0, 10.0)));
        assert_eq!(point_at_fraction(&[ls], 0.5), Some(c(10.0, 0.0)));
    }

    #[test]
    fn test_tangent_at_corner_and_segment() {
        let ls = l_shape();
        let t = tangent_at(&ls, 5.0, 1.0).unwrap();
        assert!((t.0 - 1.0).abs() < 1e-12 && t.1.abs() < 1e-12);
        let corner = tangent_at(&ls, 10.0, 1.0).unwrap();
        assert!((angle_between(corner, (1.0, 0.0)) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_between() {
        assert!((angle_between((1.0, 0.0), (-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!(angle_between((1.0, 0.0), (1.0, 0.0)).abs() < 1e-6);
        assert!((angle_between((1.0, 0.0), (0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!(unit(0.0, 0.0).is_none());
    }

    #[test]
    fn test_nearest_vertex() {
        assert!((nearest_vertex_distance(&[l_shape()], c(4.0, 3.0)) - 5.0).abs() < 1e-12);
    }
}
