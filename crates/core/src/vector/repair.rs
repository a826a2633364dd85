//! Geometry clean-up before analysis
//!
//! Splits multi-part geometries into single parts and repairs what can be
//! repaired safely (unclosed rings, repeated vertices, ring orientation).
//! Anything still invalid afterwards, such as a self-intersecting ring, is
//! reported as an error so the caller can skip the feature.

use geo::orient::{Direction, Orient};
use geo::{Coord, Geometry, LineString, Polygon, Validation};

/// Drop consecutive duplicate and non-finite coordinates.
fn dedup_coords(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if !c.x.is_finite() || !c.y.is_finite() {
            continue;
        }
        if out.last() != Some(c) {
            out.push(*c);
        }
    }
    out
}

/// Clean a line part like `dedup_coords`, but keep one repeated vertex at
/// either end so a zero-length end segment is still visible to endpoint
/// checks. Parts with fewer than 2 distinct vertices come back shorter than 2.
fn dedup_line(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let finite: Vec<Coord<f64>> = coords
        .iter()
        .copied()
        .filter(|c| c.x.is_finite() && c.y.is_finite())
        .collect();
    let mut out = dedup_coords(&finite);
    let n = finite.len();
    if out.len() < 2 {
        return out;
    }
    if finite[0] == finite[1] {
        out.insert(0, finite[0]);
    }
    if finite[n - 1] == finite[n - 2] {
        out.push(finite[n - 1]);
    }
    out
}

/// Close and clean one ring; `None` when fewer than 4 coordinates remain.
fn repair_ring(ring: &LineString<f64>) -> Option<LineString<f64>> {
    let mut coords = dedup_coords(&ring.0);
    if coords.len() > 1 && coords.first() != coords.last() {
        coords.push(coords[0]);
    }
    (coords.len() >= 4).then(|| LineString::new(coords))
}

/// Repair a single polygon.
///
/// The exterior must survive clean-up; degenerate holes are dropped. Ring
/// orientation is normalised (exterior counter-clockwise, holes clockwise).
/// Returns the reason when the polygon is still invalid.
pub fn repair_polygon(poly: &Polygon<f64>) -> Result<Polygon<f64>, String> {
    if poly.exterior().0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err("non-finite coordinate".to_string());
    }
    let exterior = repair_ring(poly.exterior())
        .ok_or_else(|| "exterior ring has fewer than 4 distinct vertices".to_string())?;
    let interiors: Vec<_> = poly.interiors().iter().filter_map(repair_ring).collect();

    let repaired = Polygon::new(exterior, interiors).orient(Direction::Default);
    if !repaired.is_valid() {
        return Err("ring is self-intersecting or otherwise invalid".to_string());
    }
    Ok(repaired)
}

/// Split an areal geometry into repaired single-part polygons.
///
/// Fails on non-areal input or when any part cannot be repaired.
pub fn polygon_parts(geom: &Geometry<f64>) -> Result<Vec<Polygon<f64>>, String> {
    let parts: Vec<&Polygon<f64>> = match geom {
        Geometry::Polygon(p) => vec![p],
        Geometry::MultiPolygon(mp) => mp.0.iter().collect(),
        other => return Err(format!("expected a polygon, got {}", geometry_name(other))),
    };
    if parts.is_empty() {
        return Err("empty multipolygon".to_string());
    }
    parts
        .into_iter()
        .enumerate()
        .map(|(i, p)| repair_polygon(p).map_err(|e| format!("part {i}: {e}")))
        .collect()
}

/// Split a linear geometry into cleaned parts with at least 2 distinct vertices.
///
/// Interior repeated vertices are dropped, a repeated first or last vertex
/// is kept. Degenerate parts are dropped; fails when none remain or the
/// input is not linear.
pub fn line_parts(geom: &Geometry<f64>) -> Result<Vec<LineString<f64>>, String> {
    let parts: Vec<Vec<Coord<f64>>> = match geom {
        Geometry::LineString(ls) => vec![dedup_line(&ls.0)],
        Geometry::MultiLineString(mls) => mls.0.iter().map(|ls| dedup_line(&ls.0)).collect(),
        Geometry::Line(l) => vec![dedup_line(&[l.start, l.end])],
        other => return Err(format!("expected a line, got {}", geometry_name(other))),
    };
    let cleaned: Vec<LineString<f64>> = parts
        .into_iter()
        .filter(|c| c.len() >= 2)
        .map(LineString::new)
        .collect();
    if cleaned.is_empty() {
        return Err("no line part with 2 or more distinct vertices".to_string());
    }
    Ok(cleaned)
}

/// Short type name for diagnostics
pub fn geometry_name(geom: &Geometry<f64>) -> &'static str {
    match geom {
        Geometry::Point(_) => "point",
        Geometry::Line(_) => "line",
        Geometry::LineString(_) => "linestring",
        Geometry::Polygon(_) => "polygon",
        Geometry::MultiPoint(_) => "multipoint",
        Geometry::MultiLineString(_) => "multilinestring",
        Geometry::MultiPolygon(_) => "multipolygon",
        Geometry::GeometryCollection(_) => "geometrycollection",
        Geometry::Rect(_) => "rect",
        Geometry::Triangle(_) => "triangle",
    }
}
