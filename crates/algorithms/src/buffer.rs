//! Buffer operations with a typed outcome
//!
//! `geo`'s buffer returns an empty multipolygon both when erosion removes
//! a shape entirely and when something went wrong with the input. These
//! wrappers tell the two apart: `Ok(None)` is a legitimately empty result,
//! `Err` is a failed operation that the caller turns into a skip.

use geo::{Area, Buffer, LineString, MultiLineString, MultiPolygon, Polygon};

use gapsnap_core::{Error, Result};

fn failed(op: &'static str, reason: impl Into<String>) -> Error {
    Error::GeometryOperation {
        op,
        reason: reason.into(),
    }
}

fn all_finite(mp: &MultiPolygon<f64>) -> bool {
    mp.0.iter().all(|p| {
        p.exterior()
            .0
            .iter()
            .chain(p.interiors().iter().flat_map(|r| r.0.iter()))
            .all(|c| c.x.is_finite() && c.y.is_finite())
    })
}

/// Drop zero-area slivers the offsetting can leave behind
fn non_empty(mp: MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    let parts: Vec<Polygon<f64>> = mp.0.into_iter().filter(|p| p.unsigned_area() > 0.0).collect();
    (!parts.is_empty()).then(|| MultiPolygon::new(parts))
}

/// Shrink a polygon by `r` (negative buffer).
///
/// `Ok(None)` when nothing of the polygon is at least `2r` wide.
pub fn erode(poly: &Polygon<f64>, r: f64) -> Result<Option<MultiPolygon<f64>>> {
    if !r.is_finite() || r <= 0.0 {
        return Err(failed("erode", format!("radius {r} is not positive")));
    }
    let out = poly.buffer(-r);
    if !all_finite(&out) {
        return Err(failed("erode", "non-finite coordinates in result"));
    }
    Ok(non_empty(out))
}

/// Grow a shape by `r` (positive buffer).
///
/// A non-empty input always yields a non-empty result; an empty one is
/// reported as a failure.
pub fn dilate(shape: &MultiPolygon<f64>, r: f64) -> Result<MultiPolygon<f64>> {
    if !r.is_finite() || r <= 0.0 {
        return Err(failed("dilate", format!("radius {r} is not positive")));
    }
    if shape.0.is_empty() {
        return Ok(MultiPolygon::new(vec![]));
    }
    let out = shape.buffer(r);
    if !all_finite(&out) {
        return Err(failed("dilate", "non-finite coordinates in result"));
    }
    non_empty(out).ok_or_else(|| failed("dilate", "buffer of a non-empty shape is empty"))
}

/// Buffer polygon around a set of line parts.
pub fn buffer_lines(lines: &[LineString<f64>], r: f64) -> Result<MultiPolygon<f64>> {
    if !r.is_finite() || r <= 0.0 {
        return Err(failed("buffer", format!("radius {r} is not positive")));
    }
    if lines.is_empty() {
        return Err(failed("buffer", "no line parts"));
    }
    let out = MultiLineString::new(lines.to_vec()).buffer(r);
    if !all_finite(&out) {
        return Err(failed("buffer", "non-finite coordinates in result"));
    }
    non_empty(out).ok_or_else(|| failed("buffer", "line buffer is empty"))
}
