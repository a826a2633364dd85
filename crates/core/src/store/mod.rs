//! Feature Store seam
//!
//! The engine never talks to a GIS session or a file format directly. It
//! reads features through [`FeatureStore`] and hands results to a
//! [`FeatureSink`]; layer lookup, schemas and persistence belong to the
//! implementations. [`MemoryStore`] and [`MemorySink`] are the in-process
//! implementations used by tests and by the CLI.

use geo::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature};

/// Semantic output fields, keyed by field name
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Read side of the Feature Store
pub trait FeatureStore {
    /// Reference system shared by every feature in the store
    fn crs(&self) -> &CRS;

    /// Features of the layers and subtypes selected by `filter`.
    ///
    /// Fails with [`Error::LayerNotFound`] when none of the named layers exist.
    fn list_features(&self, filter: &CategoryFilter) -> Result<Vec<Feature>>;
}

/// Write side of the Feature Store: a caller-provisioned output
pub trait FeatureSink {
    fn append(&mut self, geometry: Geometry<f64>, attributes: Attributes) -> Result<()>;
}

/// Restricts a subtype attribute to a set of accepted values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypeFilter {
    pub field: String,
    pub values: Vec<AttributeValue>,
}

/// Which layers (and optionally which subtypes) a run operates on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryFilter {
    pub layers: Vec<String>,
    #[serde(default)]
    pub subtype: Option<SubtypeFilter>,
}

impl CategoryFilter {
    pub fn layers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            layers: names.into_iter().map(Into::into).collect(),
            subtype: None,
        }
    }

    /// Keep only features whose `field` matches one of `values`
    pub fn with_subtype(mut self, field: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        self.subtype = Some(SubtypeFilter {
            field: field.into(),
            values,
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.layers.iter().all(|l| normalize_name(l).is_empty()) {
            return Err(Error::EmptyCategory);
        }
        if let Some(sub) = &self.subtype {
            if sub.values.is_empty() {
                return Err(Error::InvalidParameter {
                    name: "subtype",
                    value: sub.field.clone(),
                    reason: "no accepted values".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Exact match after normalisation
    pub fn names_layer(&self, layer: &str) -> bool {
        let layer = normalize_name(layer);
        self.layers.iter().any(|l| normalize_name(l) == layer)
    }

    /// Subtype check; features without the field are rejected
    pub fn accepts(&self, feature: &Feature) -> bool {
        match &self.subtype {
            None => true,
            Some(sub) => feature
                .get_property(&sub.field)
                .map(|v| sub.values.iter().any(|want| want.matches(v)))
                .unwrap_or(false),
        }
    }
}

/// Lower-case, runs of spaces and hyphens to `_`, drop everything else
/// that is not alphanumeric.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.trim().chars() {
        if ch == ' ' || ch == '-' || ch == '_' {
            pending_sep = true;
            continue;
        }
        if !ch.is_ascii_alphanumeric() {
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.push(ch.to_ascii_lowercase());
    }
    out
}

/// In-memory store: named layers of features in one CRS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    pub crs: CRS,
    pub layers: BTreeMap<String, Vec<Feature>>,
}

impl MemoryStore {
    pub fn new(crs: CRS) -> Self {
        Self {
            crs,
            layers: BTreeMap::new(),
        }
    }

    pub fn with_layer(mut self, name: impl Into<String>, features: Vec<Feature>) -> Self {
        self.layers.insert(name.into(), features);
        self
    }
}

impl FeatureStore for MemoryStore {
    fn crs(&self) -> &CRS {
        &self.crs
    }

    fn list_features(&self, filter: &CategoryFilter) -> Result<Vec<Feature>> {
        filter.validate()?;

        // Exact names first; a requested name that matches nothing exactly
        // falls back to the first layer containing it.
        let mut selected: Vec<&String> = Vec::new();
        for wanted in &filter.layers {
            let wanted = normalize_name(wanted);
            let hit = self
                .layers
                .keys()
                .find(|name| normalize_name(name) == wanted)
                .or_else(|| self.layers.keys().find(|name| normalize_name(name).contains(&wanted)));
            if let Some(name) = hit {
                if !selected.contains(&name) {
                    selected.push(name);
                }
            }
        }
        if selected.is_empty() {
            return Err(Error::LayerNotFound(filter.layers.join(", ")));
        }

        Ok(selected
            .into_iter()
            .flat_map(|name| {
                self.layers[name]
                    .iter()
                    .filter(|f| filter.accepts(f))
                    .map(move |f| {
                        let mut f = f.clone();
                        if f.layer.is_empty() {
                            f.layer = name.clone();
                        }
                        f
                    })
            })
            .collect())
    }
}

/// One appended output record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub geometry: Geometry<f64>,
    pub attributes: Attributes,
}

/// Sink collecting records in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySink {
    pub records: Vec<OutputRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FeatureSink for MemorySink {
    fn append(&mut self, geometry: Geometry<f64>, attributes: Attributes) -> Result<()> {
        self.records.push(OutputRecord { geometry, attributes });
        Ok(())
    }
}
