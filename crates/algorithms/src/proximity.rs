//! Midpoint proximity and short-feature selection
//!
//! Two lighter checks over linear features. The midpoint check keeps a
//! feature when any other feature passes within `radius + ε` of the point
//! halfway along it; the length filter keeps features shorter than a limit.

use geo::{Coord, Geometry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::index::SpatialIndex;
use crate::maybe_rayon::*;
use crate::measure::{locate, point_at_fraction, total_length};
use crate::prepare::{PreparedFeature, PreparedInput};
use crate::report::Deadline;
use gapsnap_core::error::require_positive;
use gapsnap_core::{Algorithm, Error, FeatureId, Result};

/// Parameters for the midpoint proximity check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidpointParams {
    /// Search radius around each midpoint, metres
    pub radius: f64,
    pub epsilon: f64,
}

impl Default for MidpointParams {
    fn default() -> Self {
        Self {
            radius: 200.0,
            epsilon: 0.001,
        }
    }
}

impl MidpointParams {
    pub fn validate(&self) -> Result<()> {
        require_positive("radius", self.radius)?;
        require_positive("epsilon", self.epsilon)
    }
}

/// Midpoint of one feature
#[derive(Debug, Clone)]
pub struct Midpoint {
    pub id: FeatureId,
    pub layer: String,
    /// Metric coordinates
    pub point: Coord<f64>,
    /// Closest other feature within the radius, if any
    pub nearest: Option<(FeatureId, f64)>,
}

/// A selected feature, with its source geometry
#[derive(Debug, Clone)]
pub struct SelectedFeature {
    pub id: FeatureId,
    pub layer: String,
    pub source: Geometry<f64>,
    /// Metric length
    pub length: f64,
}

/// Result of a midpoint proximity pass
#[derive(Debug, Clone, Default)]
pub struct MidpointOutcome {
    /// One per processed feature, in input order
    pub midpoints: Vec<Midpoint>,
    /// Features with a neighbour near their midpoint, ordered by id
    pub kept: Vec<SelectedFeature>,
    pub processed: usize,
}

impl MidpointOutcome {
    pub fn kept_ids(&self) -> BTreeSet<FeatureId> {
        self.kept.iter().map(|k| k.id).collect()
    }
}

/// Midpoint proximity algorithm
#[derive(Debug, Clone, Default)]
pub struct MidpointProximity;

impl Algorithm for MidpointProximity {
    type Input = PreparedInput;
    type Output = MidpointOutcome;
    type Params = MidpointParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Midpoints"
    }

    fn description(&self) -> &'static str {
        "Keep linear features whose midpoint lies near another feature"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let deadline = input.limits.start();
        midpoint_proximity(&input.features, &params, &deadline)
    }
}

fn to_selected(f: &PreparedFeature) -> SelectedFeature {
    SelectedFeature {
        id: f.id,
        layer: f.layer.clone(),
        source: f.source.clone(),
        length: total_length(f.shape.lines()),
    }
}

/// Find features whose midpoint has another feature within `radius + ε`.
pub fn midpoint_proximity(
    features: &[PreparedFeature],
    params: &MidpointParams,
    deadline: &Deadline,
) -> Result<MidpointOutcome> {
    params.validate()?;
    let reach = params.radius + params.epsilon;
    let index = SpatialIndex::from_features(features);

    let midpoints: Vec<Option<Midpoint>> = (0..features.len())
        .into_par_iter()
        .map(|i| -> Result<Option<Midpoint>> {
            let f = &features[i];
            let Some(point) = point_at_fraction(f.shape.lines(), 0.5) else {
                return Ok(None);
            };
            let mut nearest: Option<(FeatureId, f64)> = None;
            for j in index.candidates_near(point.x, point.y, reach) {
                if j == i {
                    continue;
                }
                deadline.tick()?;
                let Some(loc) = locate(features[j].shape.lines(), point) else {
                    continue;
                };
                let closer = nearest.map_or(true, |(_, d)| loc.distance < d);
                if loc.distance <= reach && closer {
                    nearest = Some((features[j].id, loc.distance));
                }
            }
            Ok(Some(Midpoint {
                id: f.id,
                layer: f.layer.clone(),
                point,
                nearest,
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut outcome = MidpointOutcome {
        midpoints: midpoints.into_iter().flatten().collect(),
        processed: features.len(),
        ..Default::default()
    };
    let hits: BTreeSet<FeatureId> = outcome
        .midpoints
        .iter()
        .filter(|m| m.nearest.is_some())
        .map(|m| m.id)
        .collect();
    outcome.kept = features
        .iter()
        .filter(|f| hits.contains(&f.id))
        .map(to_selected)
        .collect();
    outcome.kept.sort_by_key(|k| k.id);

    debug!(
        "Midpoint proximity: {} of {} features kept",
        outcome.kept.len(),
        outcome.processed
    );
    Ok(outcome)
}

/// Parameters for the short-feature filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthFilterParams {
    /// Features strictly shorter than this many metres are selected
    pub max_length: f64,
}

impl Default for LengthFilterParams {
    fn default() -> Self {
        Self { max_length: 300.0 }
    }
}

impl LengthFilterParams {
    pub fn validate(&self) -> Result<()> {
        require_positive("max_length", self.max_length)
    }
}

/// Result of the short-feature filter
#[derive(Debug, Clone, Default)]
pub struct LengthOutcome {
    pub selected: Vec<SelectedFeature>,
    pub processed: usize,
}

/// Short-feature filter algorithm
#[derive(Debug, Clone, Default)]
pub struct ShortFeatures;

impl Algorithm for ShortFeatures {
    type Input = PreparedInput;
    type Output = LengthOutcome;
    type Params = LengthFilterParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Short features"
    }

    fn description(&self) -> &'static str {
        "Select linear features shorter than a metric length"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        short_features(&input.features, &params)
    }
}

/// Select features whose metric length is below `max_length`.
pub fn short_features(features: &[PreparedFeature], params: &LengthFilterParams) -> Result<LengthOutcome> {
    params.validate()?;
    let selected = features
        .iter()
        .map(to_selected)
        .filter(|s| s.length < params.max_length)
        .collect();
    Ok(LengthOutcome {
        selected,
        processed: features.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::MetricShape;
    use gapsnap_core::BoundingBox;
    use geo::LineString;

    fn line(id: u64, coords: Vec<(f64, f64)>) -> PreparedFeature {
        let ls = LineString::from(coords);
        let geom: Geometry<f64> = ls.clone().into();
        PreparedFeature {
            id: FeatureId(id),
            layer: "RiverC".into(),
            bbox: BoundingBox::of(&geom).unwrap(),
            source: geom,
            shape: MetricShape::Linear(vec![ls]),
        }
    }

    #[test]
    fn test_midpoint_near_other_feature() {
        let features = vec![
            line(1, vec![(0.0, 0.0), (1000.0, 0.0)]),
            // Midpoint (500, 150) is 150 m from feature 1
            line(2, vec![(400.0, 150.0), (600.0, 150.0)]),
            line(3, vec![(0.0, 5000.0), (100.0, 5000.0)]),
        ];
        let out = midpoint_proximity(&features, &MidpointParams::default(), &Deadline::unbounded()).unwrap();
        assert_eq!(out.midpoints.len(), 3);
        assert_eq!(out.midpoints[1].point, Coord { x: 500.0, y: 150.0 });
        // Feature 1's midpoint (500, 0) is also 150 m from feature 2
        assert_eq!(out.kept_ids(), BTreeSet::from([FeatureId(1), FeatureId(2)]));
        let (near, d) = out.midpoints[1].nearest.unwrap();
        assert_eq!(near, FeatureId(1));
        assert!((d - 150.0).abs() < 1e-9);
        assert!(out.midpoints[2].nearest.is_none());
    }

    #[test]
    fn test_midpoint_radius_boundary() {
        let features = vec![
            line(1, vec![(0.0, 0.0), (100.0, 0.0)]),
            line(2, vec![(40.0, 200.0), (60.0, 200.0)]),
        ];
        let params = MidpointParams::default();
        let out = midpoint_proximity(&features, &params, &Deadline::unbounded()).unwrap();
        // Exactly 200 m apart: within radius + epsilon
        assert_eq!(out.kept.len(), 2);

        let tight = MidpointParams {
            radius: 199.0,
            ..Default::default()
        };
        let out = midpoint_proximity(&features, &tight, &Deadline::unbounded()).unwrap();
        assert!(out.kept.is_empty());
    }

    #[test]
    fn test_short_features() {
        let features = vec![
            line(1, vec![(0.0, 0.0), (299.9, 0.0)]),
            line(2, vec![(0.0, 10.0), (300.0, 10.0)]),
            line(3, vec![(0.0, 20.0), (100.0, 20.0), (100.0, 120.0)]),
        ];
        let out = short_features(&features, &LengthFilterParams::default()).unwrap();
        let ids: Vec<u64> = out.selected.iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!((out.selected[1].length - 200.0).abs() < 1e-9);
        assert_eq!(out.processed, 3);
    }

    #[test]
    fn test_short_features_trait() {
        let input = PreparedInput::new(vec![line(1, vec![(0.0, 0.0), (10.0, 0.0)])]);
        let out = ShortFeatures.execute_default(input).unwrap();
        assert_eq!(out.selected.len(), 1);
        assert!(LengthFilterParams { max_length: 0.0 }.validate().is_err());
    }
}
