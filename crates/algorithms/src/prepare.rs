//! Feature preparation
//!
//! Reprojects every input feature into the run's metric system, splits it
//! into clean single parts and computes its metric envelope. Each feature
//! is an independent unit of work; failures become [`Skip`] records and the
//! feature takes no further part in the run.

use geo::{Geometry, LineString, MultiLineString, MultiPolygon, Polygon};
use std::collections::HashSet;
use tracing::debug;

use crate::maybe_rayon::*;
use crate::report::{RunLimits, Skip};
use gapsnap_core::crs::MetricContext;
use gapsnap_core::vector::{line_parts, polygon_parts, repair::geometry_name};
use gapsnap_core::{BoundingBox, Error, Feature, FeatureId, Result};

/// Which geometry family a check consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Areal,
    Linear,
}

/// Metric geometry split into validated single parts
#[derive(Debug, Clone)]
pub enum MetricShape {
    Areal(Vec<Polygon<f64>>),
    Linear(Vec<LineString<f64>>),
}

impl MetricShape {
    pub fn polygons(&self) -> &[Polygon<f64>] {
        match self {
            MetricShape::Areal(p) => p,
            MetricShape::Linear(_) => &[],
        }
    }

    pub fn lines(&self) -> &[LineString<f64>] {
        match self {
            MetricShape::Linear(l) => l,
            MetricShape::Areal(_) => &[],
        }
    }

    /// Parts reassembled as one geometry
    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            MetricShape::Areal(p) if p.len() == 1 => Geometry::Polygon(p[0].clone()),
            MetricShape::Areal(p) => Geometry::MultiPolygon(MultiPolygon::new(p.clone())),
            MetricShape::Linear(l) if l.len() == 1 => Geometry::LineString(l[0].clone()),
            MetricShape::Linear(l) => Geometry::MultiLineString(MultiLineString::new(l.clone())),
        }
    }
}

/// A feature ready for analysis
#[derive(Debug, Clone)]
pub struct PreparedFeature {
    pub id: FeatureId,
    pub layer: String,
    /// Geometry in the dataset CRS, untouched
    pub source: Geometry<f64>,
    pub shape: MetricShape,
    /// Envelope of the metric geometry
    pub bbox: BoundingBox,
}

/// Outcome of preparing a feature set
#[derive(Debug, Clone, Default)]
pub struct PreparedSet {
    /// Successfully prepared features, in input order
    pub features: Vec<PreparedFeature>,
    pub skipped: Vec<Skip>,
}

impl PreparedSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Input handed to a check: prepared features plus the run's limits
#[derive(Debug, Clone, Default)]
pub struct PreparedInput {
    pub features: Vec<PreparedFeature>,
    pub limits: RunLimits,
}

impl PreparedInput {
    pub fn new(features: Vec<PreparedFeature>) -> Self {
        Self {
            features,
            limits: RunLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Prepare features for a check.
///
/// Fails only when two input features share an id; per-feature problems
/// end up in [`PreparedSet::skipped`].
pub fn prepare(features: Vec<Feature>, ctx: &MetricContext, kind: GeometryKind) -> Result<PreparedSet> {
    let mut seen = HashSet::with_capacity(features.len());
    for f in &features {
        if !seen.insert(f.id) {
            return Err(Error::DuplicateFeature(f.id));
        }
    }

    let results: Vec<(FeatureId, Result<PreparedFeature>)> = features
        .into_par_iter()
        .map(|f| (f.id, prepare_feature(f, ctx, kind)))
        .collect();

    let mut set = PreparedSet::default();
    for (id, result) in results {
        match result {
            Ok(pf) => set.features.push(pf),
            Err(e) => set.skipped.push(into_skip(id, e)?),
        }
    }
    Ok(set)
}

/// Turn a per-feature error into a skip; anything else is propagated.
pub(crate) fn into_skip(id: FeatureId, e: Error) -> Result<Skip> {
    if !e.is_per_feature() {
        return Err(e);
    }
    let cause = match e {
        Error::Reprojection { reason, .. } => format!("reprojection: {reason}"),
        Error::InvalidGeometry { reason, .. } => format!("invalid geometry: {reason}"),
        other => other.to_string(),
    };
    debug!("Skipping feature {}: {}", id, cause);
    Ok(Skip::new(id, cause))
}

fn prepare_feature(feature: Feature, ctx: &MetricContext, kind: GeometryKind) -> Result<PreparedFeature> {
    let id = feature.id;
    let metric = ctx
        .to_metric()
        .geometry(&feature.geometry)
        .map_err(|reason| Error::Reprojection { id, reason })?;

    let shape = match kind {
        GeometryKind::Areal => polygon_parts(&metric).map(MetricShape::Areal),
        GeometryKind::Linear => line_parts(&metric).map(MetricShape::Linear),
    }
    .map_err(|reason| Error::InvalidGeometry { id, reason })?;

    let bbox = BoundingBox::of(&shape.to_geometry()).ok_or_else(|| Error::InvalidGeometry {
        id,
        reason: format!("empty {}", geometry_name(&metric)),
    })?;

    Ok(PreparedFeature {
        id,
        layer: feature.layer,
        source: feature.geometry,
        shape,
        bbox,
    })
}
