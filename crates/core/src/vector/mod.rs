//! Vector data structures
//!
//! - [`Feature`]: stable id, source layer, geometry in the dataset CRS, attributes
//! - [`FeatureCollection`]: features sharing one CRS
//! - [`BoundingBox`]: axis-aligned envelope used by the resolver and the index
//! - [`repair`]: ring/part clean-up and validity checks before analysis

pub mod repair;

pub use repair::{line_parts, polygon_parts, repair_polygon};

use geo::{BoundingRect, Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::crs::CRS;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Loose equality used by category filters: ints match integral floats,
    /// strings compare case-insensitively.
    pub fn matches(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::String(a), AttributeValue::String(b)) => a.eq_ignore_ascii_case(b),
            (AttributeValue::Int(a), AttributeValue::Float(b))
            | (AttributeValue::Float(b), AttributeValue::Int(a)) => (*a as f64) == *b,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Float(x) => write!(f, "{x}"),
            AttributeValue::String(s) => write!(f, "{s}"),
        }
    }
}

/// Stable feature identity, unique within one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    /// Name of the layer the feature was read from
    #[serde(default)]
    pub layer: String,
    /// Geometry in the dataset CRS
    pub geometry: Geometry<f64>,
    #[serde(default)]
    pub properties: HashMap<String, AttributeValue>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(id: u64, geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            id: FeatureId(id),
            layer: String::new(),
            geometry: geometry.into(),
            properties: HashMap::new(),
        }
    }

    /// Set the source layer label
    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = layer.into();
        self
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Envelope of the geometry in the dataset CRS
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::of(&self.geometry)
    }
}

/// Collection of features sharing one reference system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub crs: CRS,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(crs: CRS) -> Self {
        Self {
            crs,
            features: Vec::new(),
        }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Envelope of all features, `None` when nothing has coordinates
    pub fn extent(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(Feature::bounding_box)
            .reduce(|a, b| a.union(&b))
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Compute the bounding box of a geometry
    pub fn of(geom: &Geometry<f64>) -> Option<Self> {
        geom.bounding_rect().map(|rect| BoundingBox {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Grow the box by `r` on every side
    pub fn expand(&self, r: f64) -> Self {
        Self::new(self.min_x - r, self.min_y - r, self.max_x + r, self.max_y + r)
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        Self::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    #[test]
    fn test_bounding_box_of_polygon() {
        let poly = BoundingBox::new(0.0, 0.0, 10.0, 10.0).to_polygon();
        let bb = BoundingBox::of(&Geometry::Polygon(poly)).unwrap();
        assert_eq!(bb, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(bb.center(), (5.0, 5.0));
    }

    #[test]
    fn test_bounding_box_expand_intersects() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(12.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.expand(2.0).intersects(&b));
        assert!(a.expand(2.0).contains_point(-1.5, 11.5));
    }

    #[test]
    fn test_collection_extent() {
        let mut fc = FeatureCollection::new(CRS::wgs84());
        assert!(fc.extent().is_none());
        fc.push(Feature::new(1, Point::new(1.0, 2.0)));
        fc.push(Feature::new(2, Point::new(-3.0, 5.0)));
        assert_eq!(fc.extent(), Some(BoundingBox::new(-3.0, 2.0, 1.0, 5.0)));
    }

    #[test]
    fn test_attribute_matching() {
        let code = AttributeValue::Int(100152);
        assert!(code.matches(&AttributeValue::Float(100152.0)));
        assert!(AttributeValue::String("ROAD_C".into())
            .matches(&AttributeValue::String("road_c".into())));
        assert!(!code.matches(&AttributeValue::Int(100156)));
    }

    #[test]
    fn test_feature_properties() {
        let mut f = Feature::new(7, Point::new(0.0, 0.0)).with_layer("roads");
        f.set_property("FCSubtype", AttributeValue::Int(100152));
        assert_eq!(f.get_property("FCSubtype"), Some(&AttributeValue::Int(100152)));
        assert_eq!(f.layer, "roads");
        assert_eq!(f.id.to_string(), "7");
    }
}
