//! Endpoint Snap/Dangle Classifier
//!
//! Every line end is tested against the other features within `T_near`:
//!
//! 1. a neighbour vertex within `ε_vertex` means the end is **connected**
//! 2. otherwise a perpendicular distance within `ε_seg` means it sits on the
//!    neighbour's interior without a vertex: **near-unconnected**
//! 3. otherwise the local directions decide: within `θ` of 0° or 180° the
//!    lines run alongside (**parallel offset**, not flagged), anything else
//!    is **near-unconnected**
//!
//! How candidates combine is a [`SnapPolicy`].

mod classify;
mod endpoint;

pub use classify::{classify_candidate, classify_endpoint};
pub use endpoint::{endpoints, Endpoint, EndpointRole};

use geo::{Coord, Geometry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::index::SpatialIndex;
use crate::maybe_rayon::*;
use crate::prepare::{PreparedFeature, PreparedInput};
use crate::report::Deadline;
use gapsnap_core::error::{require_non_negative, require_positive};
use gapsnap_core::{Algorithm, Error, FeatureId, Result};

/// How the per-candidate verdicts of one endpoint are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapPolicy {
    /// Stops at the first connecting candidate; without one, the first
    /// near-unconnected candidate in index order flags the endpoint
    #[default]
    EarlyExit,
    /// All candidates; flagged only if none connects or excuses the endpoint
    Exhaustive,
}

/// What the check emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapOutputMode {
    /// One point per flagged endpoint
    #[default]
    Points,
    /// Each feature with at least one flagged endpoint
    Lines,
}

/// Parameters for the snap classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapParams {
    /// Candidate search radius `T_near` in metres
    pub near_tolerance: f64,
    /// Snap tolerance to an existing vertex
    pub vertex_tolerance: f64,
    /// Tolerance for lying on a segment interior
    pub segment_tolerance: f64,
    /// Parallel excuse in degrees; `None` disables it
    pub parallel_angle: Option<f64>,
    pub policy: SnapPolicy,
    pub output: SnapOutputMode,
}

impl Default for SnapParams {
    fn default() -> Self {
        Self {
            near_tolerance: 50.0,
            vertex_tolerance: 0.2,
            segment_tolerance: 0.2,
            parallel_angle: Some(15.0),
            policy: SnapPolicy::EarlyExit,
            output: SnapOutputMode::Points,
        }
    }
}

impl SnapParams {
    pub fn validate(&self) -> Result<()> {
        require_positive("near_tolerance", self.near_tolerance)?;
        require_non_negative("vertex_tolerance", self.vertex_tolerance)?;
        require_non_negative("segment_tolerance", self.segment_tolerance)?;
        if let Some(theta) = self.parallel_angle {
            if !theta.is_finite() || !(0.0..=90.0).contains(&theta) {
                return Err(Error::InvalidParameter {
                    name: "parallel_angle",
                    value: theta.to_string(),
                    reason: "must be between 0 and 90 degrees".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Step used to sample the neighbour tangent around the projected point
    pub fn tangent_step(&self) -> f64 {
        (0.1 * self.near_tolerance).min(1.0)
    }
}

/// Why a near endpoint is flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NearReason {
    /// On the neighbour's segment interior, no vertex there
    OnSegment,
    /// Close to the neighbour at a crossing angle
    NonParallel,
}

impl NearReason {
    /// Reason code written to the output
    pub fn code(&self) -> &'static str {
        match self {
            NearReason::OnSegment => "on_segment_no_snap",
            NearReason::NonParallel => "non_parallel_close",
        }
    }
}

/// Outcome for one endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    Connected { neighbor: FeatureId },
    NearUnconnected { neighbor: FeatureId, reason: NearReason, distance: f64 },
    ParallelOffset { neighbor: FeatureId, angle: f64 },
    /// No other feature within the search radius
    Isolated,
}

impl Classification {
    pub fn is_flagged(&self) -> bool {
        matches!(self, Classification::NearUnconnected { .. })
    }

    pub fn neighbor(&self) -> Option<FeatureId> {
        match *self {
            Classification::Connected { neighbor }
            | Classification::NearUnconnected { neighbor, .. }
            | Classification::ParallelOffset { neighbor, .. } => Some(neighbor),
            Classification::Isolated => None,
        }
    }
}

/// A classified endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointResult {
    pub endpoint: Endpoint,
    pub classification: Classification,
}

/// A flagged endpoint, ready for output
#[derive(Debug, Clone)]
pub struct FlaggedPoint {
    pub source_id: FeatureId,
    pub layer: String,
    /// Metric coordinates of the endpoint
    pub point: Coord<f64>,
    pub reason: NearReason,
    pub neighbor: FeatureId,
}

/// A feature with at least one flagged endpoint
#[derive(Debug, Clone)]
pub struct FlaggedLine {
    pub id: FeatureId,
    pub layer: String,
    pub source: Geometry<f64>,
    /// Reason of its first flagged endpoint
    pub reason: NearReason,
}

/// Result of a snap classification pass
#[derive(Debug, Clone, Default)]
pub struct SnapOutcome {
    /// Every non-degenerate endpoint, in feature then part order
    pub endpoints: Vec<EndpointResult>,
    pub flagged_points: Vec<FlaggedPoint>,
    pub flagged_lines: Vec<FlaggedLine>,
    /// Endpoints skipped for a zero-length adjacent segment
    pub degenerate_endpoints: usize,
    pub processed: usize,
}

impl SnapOutcome {
    pub fn flagged_ids(&self) -> BTreeSet<FeatureId> {
        self.flagged_lines.iter().map(|l| l.id).collect()
    }
}

/// Snap/dangle classifier algorithm
#[derive(Debug, Clone, Default)]
pub struct SnapClassifier;

impl Algorithm for SnapClassifier {
    type Input = PreparedInput;
    type Output = SnapOutcome;
    type Params = SnapParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Snap"
    }

    fn description(&self) -> &'static str {
        "Flag line ends near another feature but not snapped to one of its vertices"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let deadline = input.limits.start();
        classify_snaps(&input.features, &params, &deadline)
    }
}

/// Classify every endpoint of every prepared linear feature.
pub fn classify_snaps(features: &[PreparedFeature], params: &SnapParams, deadline: &Deadline) -> Result<SnapOutcome> {
    params.validate()?;
    let index = SpatialIndex::from_features(features);

    let per_feature: Vec<(usize, Vec<EndpointResult>)> = (0..features.len())
        .into_par_iter()
        .map(|owner| -> Result<(usize, Vec<EndpointResult>)> {
            let eps = endpoints(&features[owner], owner);
            let degenerate = eps.iter().filter(|e| e.is_degenerate()).count();
            let mut results = Vec::with_capacity(eps.len());
            for ep in eps.into_iter().filter(|e| !e.is_degenerate()) {
                deadline.tick()?;
                let classification = classify_endpoint(&ep, features, &index, params);
                results.push(EndpointResult {
                    endpoint: ep,
                    classification,
                });
            }
            Ok((degenerate, results))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut outcome = SnapOutcome {
        processed: features.len(),
        ..Default::default()
    };
    let mut lines_seen = BTreeSet::new();
    for (degenerate, results) in per_feature {
        outcome.degenerate_endpoints += degenerate;
        for r in results {
            if let Classification::NearUnconnected { neighbor, reason, .. } = r.classification {
                let owner = &features[r.endpoint.owner];
                outcome.flagged_points.push(FlaggedPoint {
                    source_id: owner.id,
                    layer: owner.layer.clone(),
                    point: r.endpoint.point,
                    reason,
                    neighbor,
                });
                if lines_seen.insert(owner.id) {
                    outcome.flagged_lines.push(FlaggedLine {
                        id: owner.id,
                        layer: owner.layer.clone(),
                        source: owner.source.clone(),
                        reason,
                    });
                }
            }
            outcome.endpoints.push(r);
        }
    }
    outcome.flagged_lines.sort_by_key(|l| l.id);

    debug!(
        "Snap classification: {} endpoints, {} flagged on {} features, {} degenerate",
        outcome.endpoints.len(),
        outcome.flagged_points.len(),
        outcome.flagged_lines.len(),
        outcome.degenerate_endpoints
    );
    Ok(outcome)
}
