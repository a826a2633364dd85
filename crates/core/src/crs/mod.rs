//! Coordinate Reference System handling
//!
//! A [`CRS`] is a lightweight descriptor: an optional EPSG code, the kind of
//! system (geographic or projected) and the linear unit name. The actual
//! coordinate math lives in [`transform`], and [`resolve`] picks the metric
//! system every distance and area computation runs in.

pub mod resolve;
pub mod transform;

pub use resolve::{resolve_metric, MetricContext, MetricOrigin};
pub use transform::{Projection, Transformer};

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG code of WGS84 geographic coordinates
pub const EPSG_WGS84: u32 = 4326;
/// EPSG code of the global pseudo-Mercator projection
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// Kind of coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CrsKind {
    Geographic,
    Projected,
    #[default]
    Unknown,
}

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CrsDescriptor")]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// Geographic or projected
    kind: CrsKind,
    /// Linear unit name ("Meter", "Foot_US", "Degree", ...)
    linear_unit: Option<String>,
    /// Human readable name
    name: Option<String>,
}

/// Serialized form; missing kind and unit are completed from the EPSG code.
#[derive(Deserialize)]
struct CrsDescriptor {
    #[serde(default)]
    epsg: Option<u32>,
    #[serde(default)]
    kind: CrsKind,
    #[serde(default)]
    linear_unit: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<CrsDescriptor> for CRS {
    fn from(d: CrsDescriptor) -> Self {
        let mut crs = match (d.epsg, d.kind) {
            (Some(code), CrsKind::Unknown) => CRS::from_epsg(code),
            _ => CRS {
                epsg: d.epsg,
                kind: d.kind,
                linear_unit: None,
                name: None,
            },
        };
        if d.linear_unit.is_some() {
            crs.linear_unit = d.linear_unit;
        }
        crs.name = d.name.or(crs.name);
        crs
    }
}

impl CRS {
    /// Create a CRS from an EPSG code
    ///
    /// Kind and unit are filled in for the codes gapsnap can transform
    /// (4326, 3857, UTM north/south); other codes stay `Unknown` until
    /// described with [`CRS::projected`] or [`CRS::geographic`].
    pub fn from_epsg(code: u32) -> Self {
        let (kind, unit) = if code == EPSG_WGS84 {
            (CrsKind::Geographic, Some("Degree"))
        } else if code == EPSG_WEB_MERCATOR || transform::parse_utm_epsg(code).is_some() {
            (CrsKind::Projected, Some("Meter"))
        } else {
            (CrsKind::Unknown, None)
        };
        Self {
            epsg: Some(code),
            kind,
            linear_unit: unit.map(str::to_string),
            name: None,
        }
    }

    /// Describe a projected CRS with an explicit linear unit
    pub fn projected(epsg: Option<u32>, linear_unit: impl Into<String>) -> Self {
        Self {
            epsg,
            kind: CrsKind::Projected,
            linear_unit: Some(linear_unit.into()),
            name: None,
        }
    }

    /// Describe a geographic CRS
    pub fn geographic(epsg: Option<u32>) -> Self {
        Self {
            epsg,
            kind: CrsKind::Geographic,
            linear_unit: Some("Degree".to_string()),
            name: None,
        }
    }

    /// Attach a display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(EPSG_WGS84)
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self::from_epsg(EPSG_WEB_MERCATOR)
    }

    /// WGS84 / UTM zone CRS, `None` when the zone is outside 1..=60
    pub fn utm(zone: u32, north: bool) -> Option<Self> {
        if !(1..=60).contains(&zone) {
            return None;
        }
        let code = if north { 32600 + zone } else { 32700 + zone };
        Some(Self::from_epsg(code).with_name(format!(
            "WGS 84 / UTM zone {}{}",
            zone,
            if north { "N" } else { "S" }
        )))
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn kind(&self) -> CrsKind {
        self.kind
    }

    /// Get the linear unit name
    pub fn linear_unit(&self) -> Option<&str> {
        self.linear_unit.as_deref()
    }

    /// Projected with a meters-family linear unit ("Meter", "metre", "Meters", ...)
    pub fn is_metric(&self) -> bool {
        self.kind == CrsKind::Projected
            && self
                .linear_unit
                .as_deref()
                .map(|u| {
                    let u = u.to_ascii_lowercase();
                    u.starts_with("meter") || u.starts_with("metre")
                })
                .unwrap_or(false)
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.name, &other.name) {
            return a == b && self.kind == other.kind;
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(name) = &self.name {
            return name.clone();
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326);
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
        assert_eq!(crs.kind(), CrsKind::Geographic);
    }

    #[test]
    fn test_crs_equivalence() {
        let a = CRS::from_epsg(4326);
        let b = CRS::wgs84();
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&CRS::web_mercator()));
    }

    #[test]
    fn test_metric_units() {
        assert!(CRS::from_epsg(32630).is_metric());
        assert!(CRS::web_mercator().is_metric());
        assert!(CRS::projected(Some(2154), "metre").is_metric());
        assert!(!CRS::projected(Some(2263), "Foot_US").is_metric());
        assert!(!CRS::wgs84().is_metric());
        // Unknown codes carry no unit and are not assumed metric
        assert!(!CRS::from_epsg(2154).is_metric());
    }

    #[test]
    fn test_utm_constructor() {
        assert_eq!(CRS::utm(18, true).and_then(|c| c.epsg()), Some(32618));
        assert_eq!(CRS::utm(32, false).and_then(|c| c.epsg()), Some(32732));
        assert!(CRS::utm(0, true).is_none());
        assert!(CRS::utm(61, false).is_none());
    }

    #[test]
    fn test_crs_json_descriptor() {
        let crs: CRS =
            serde_json::from_str(r#"{"epsg": 2263, "kind": "projected", "linear_unit": "Foot_US"}"#)
                .unwrap();
        assert_eq!(crs.kind(), CrsKind::Projected);
        assert!(!crs.is_metric());

        let utm: CRS = serde_json::from_str(r#"{"epsg": 32633}"#).unwrap();
        assert!(utm.is_metric());
    }
}
