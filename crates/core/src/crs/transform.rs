//! Pure-Rust WGS84 ↔ UTM / Web-Mercator coordinate transforms.
//!
//! UTM uses the Snyder (1987) series (USGS Prof. Paper 1395, pp. 61-64) in
//! both directions. Covers EPSG 4326, 3857, 326xx (UTM North) and 327xx
//! (UTM South). No libproj, so everything runs on any target.

use geo::{Coord, Geometry, MapCoords};

use super::{CrsKind, CRS, EPSG_WEB_MERCATOR, EPSG_WGS84};
use crate::error::{Error, Result};

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Latitude band the UTM system is defined for.
pub const UTM_MIN_LAT: f64 = -80.0;
pub const UTM_MAX_LAT: f64 = 84.0;

/// Web Mercator clamps at this latitude.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A concrete projection gapsnap knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Longitude/latitude in degrees on WGS84
    Geographic,
    /// Transverse Mercator zone on WGS84
    Utm { zone: u32, north: bool },
    /// Spherical pseudo-Mercator
    WebMercator,
}

impl Projection {
    /// Map a CRS descriptor onto a known projection.
    pub fn from_crs(crs: &CRS) -> Result<Self> {
        match crs.epsg() {
            Some(EPSG_WGS84) => Ok(Projection::Geographic),
            Some(EPSG_WEB_MERCATOR) => Ok(Projection::WebMercator),
            Some(code) => match parse_utm_epsg(code) {
                Some((zone, north)) => Ok(Projection::Utm { zone, north }),
                None => Err(Error::UnsupportedCrs(crs.identifier())),
            },
            // An unnamed geographic system is read as plain lon/lat degrees
            None if crs.kind() == CrsKind::Geographic => Ok(Projection::Geographic),
            None => Err(Error::UnsupportedCrs(crs.identifier())),
        }
    }

    /// Project lon/lat degrees into this projection.
    pub fn forward(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !lon.is_finite() || !lat.is_finite() || lat.abs() > 90.0 {
            return None;
        }
        match *self {
            Projection::Geographic => Some((lon, lat)),
            Projection::Utm { zone, north } => {
                if !(UTM_MIN_LAT..=UTM_MAX_LAT).contains(&lat) {
                    return None;
                }
                Some(wgs84_to_utm(lon, lat, zone, north))
            }
            Projection::WebMercator => Some(wgs84_to_web_mercator(lon, lat)),
        }
    }

    /// Unproject into lon/lat degrees.
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let (lon, lat) = match *self {
            Projection::Geographic => (x, y),
            Projection::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
            Projection::WebMercator => web_mercator_to_wgs84(x, y),
        };
        (lon.is_finite() && lat.is_finite() && lat.abs() <= 90.0).then_some((lon, lat))
    }
}

/// Coordinate transformer between two reference systems.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformer {
    /// Source and target are the same system
    Identity,
    /// Through geographic coordinates: `from` → lon/lat → `to`
    Chain { from: Projection, to: Projection },
    /// No transform available; every call fails with this reason
    Unsupported(String),
}

impl Transformer {
    /// Build a transformer, never failing: unsupported pairs produce a
    /// transformer whose every call fails.
    pub fn new(from: &CRS, to: &CRS) -> Self {
        if from.is_equivalent(to) {
            return Transformer::Identity;
        }
        match (Projection::from_crs(from), Projection::from_crs(to)) {
            (Ok(from), Ok(to)) if from == to => Transformer::Identity,
            (Ok(from), Ok(to)) => Transformer::Chain { from, to },
            (Err(e), _) | (_, Err(e)) => Transformer::Unsupported(e.to_string()),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Transformer::Identity)
    }

    /// Transform a single coordinate.
    pub fn coord(&self, c: Coord<f64>) -> std::result::Result<Coord<f64>, String> {
        match self {
            Transformer::Identity => Ok(c),
            Transformer::Chain { from, to } => {
                let (lon, lat) = from
                    .inverse(c.x, c.y)
                    .ok_or_else(|| format!("({}, {}) outside the source projection", c.x, c.y))?;
                let (x, y) = to
                    .forward(lon, lat)
                    .ok_or_else(|| format!("({lon:.6}, {lat:.6}) outside the target projection"))?;
                Ok(Coord { x, y })
            }
            Transformer::Unsupported(reason) => Err(reason.clone()),
        }
    }

    /// Transform every coordinate of a geometry.
    pub fn geometry(&self, geom: &Geometry<f64>) -> std::result::Result<Geometry<f64>, String> {
        if self.is_identity() {
            return Ok(geom.clone());
        }
        geom.try_map_coords(|c| self.coord(c))
    }
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
///
/// - EPSG 326xx → zone xx, North hemisphere
/// - EPSG 327xx → zone xx, South hemisphere
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

/// UTM zone number for a longitude: `floor((lon + 180) / 6) + 1`.
///
/// Not clamped; longitude 180 yields 61, which [`CRS::utm`] rejects.
pub fn utm_zone(lon: f64) -> i64 {
    ((lon + 180.0) / 6.0).floor() as i64 + 1
}

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// Convert WGS84 (longitude, latitude) in degrees to UTM (easting, northing)
/// in metres for the given zone and hemisphere.
fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);

    // Meridional arc length M (Snyder eq. 3-21)
    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Easting (Snyder eq. 8-9)
    let easting = K0
        * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    // Northing (Snyder eq. 8-10)
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    let northing = if north {
        northing
    } else {
        northing + FALSE_NORTHING_SOUTH
    };

    (easting, northing)
}

/// Inverse of [`wgs84_to_utm`] via the footpoint latitude (Snyder eq. 8-18 to 8-25).
fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sq = (1.0 - E2).sqrt();
    let e1 = (1.0 - sq) / (1.0 + sq);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin1 = phi1.sin();
    let cos1 = phi1.cos();
    let tan1 = phi1.tan();
    let c1 = E_PRIME2 * cos1 * cos1;
    let t1 = tan1 * tan1;
    let denom = 1.0 - E2 * sin1 * sin1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / (denom * denom.sqrt());
    let d = x / (n1 * K0);
    let d2 = d * d;
    let d4 = d2 * d2;
    let d6 = d4 * d2;

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * E_PRIME2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d2 * d / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d4
                * d
                / 120.0)
            / cos1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from equator to latitude `lat` (radians).
/// Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e2 = E2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    A * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

fn wgs84_to_web_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    let x = A * lon.to_radians();
    let y = A * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();
    (x, y)
}

fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / A).to_degrees();
    let lat = (2.0 * (y / A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}
