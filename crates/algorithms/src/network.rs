//! Buffer-Containment Network
//!
//! Relates linear features that run closer together than a threshold. Each
//! feature is buffered by `T + ε`; for every candidate pair the two
//! containment tests decide the relation:
//!
//! - both lines inside the other's buffer: **mutual**, both are kept
//! - exactly one inside: **one-sided**, only the contained line is kept
//! - neither: no relation
//!
//! Pairs come from the Spatial Index and are evaluated independently; the
//! kept sets are merged through ordered sets, so the result does not depend
//! on input or completion order.

use geo::{Geometry, MultiLineString, MultiPolygon, Relate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::buffer::buffer_lines;
use crate::index::SpatialIndex;
use crate::maybe_rayon::*;
use crate::prepare::{into_skip, PreparedFeature, PreparedInput};
use crate::report::{Deadline, Skip};
use gapsnap_core::error::require_positive;
use gapsnap_core::{Algorithm, Error, FeatureId, Result};

/// Parameters for the containment network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    /// Separation threshold `T` in metres
    pub threshold: f64,
    /// Added to the threshold so features exactly `T` apart still relate
    pub epsilon: f64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            threshold: 200.0,
            epsilon: 0.001,
        }
    }
}

impl NetworkParams {
    pub fn validate(&self) -> Result<()> {
        require_positive("threshold", self.threshold)?;
        require_positive("epsilon", self.epsilon)
    }

    pub fn radius(&self) -> f64 {
        self.threshold + self.epsilon
    }
}

/// Why a feature was kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Mutual,
    OneSided,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Mutual => "mutual",
            Relation::OneSided => "one_sided",
        }
    }
}

/// A feature in the positive-detection set
#[derive(Debug, Clone)]
pub struct KeptFeature {
    pub id: FeatureId,
    pub layer: String,
    pub source: Geometry<f64>,
    /// Mutual wins when a feature is kept for both reasons
    pub relation: Relation,
    /// Features it was related to, ascending
    pub partners: Vec<FeatureId>,
}

/// Result of a containment network pass
#[derive(Debug, Clone, Default)]
pub struct NetworkOutcome {
    pub mutual: BTreeSet<FeatureId>,
    pub one_sided: BTreeSet<FeatureId>,
    /// Union of both sets, ordered by id
    pub kept: Vec<KeptFeature>,
    pub processed: usize,
    pub pairs_evaluated: usize,
    pub skipped: Vec<Skip>,
}

impl NetworkOutcome {
    pub fn kept_ids(&self) -> BTreeSet<FeatureId> {
        self.mutual.union(&self.one_sided).copied().collect()
    }
}

/// Containment network algorithm
#[derive(Debug, Clone, Default)]
pub struct ContainmentNetwork;

impl Algorithm for ContainmentNetwork {
    type Input = PreparedInput;
    type Output = NetworkOutcome;
    type Params = NetworkParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Network"
    }

    fn description(&self) -> &'static str {
        "Keep linear features lying inside a neighbour's buffer of threshold plus epsilon"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let deadline = input.limits.start();
        containment_network(&input.features, &params, &deadline)
    }
}

struct Buffered<'a> {
    feature: &'a PreparedFeature,
    lines: MultiLineString<f64>,
    buffer: MultiPolygon<f64>,
}

/// Outcome of one pair `(i, j)`, `i < j`
struct PairResult {
    i: usize,
    j: usize,
    i_in_j: bool,
    j_in_i: bool,
}

fn evaluate_pair(a: &Buffered, b: &Buffered) -> (bool, bool) {
    let a_in_b = a.lines.relate(&b.buffer).is_within();
    let b_in_a = b.lines.relate(&a.buffer).is_within();
    (a_in_b, b_in_a)
}

/// Build the proximity relation over linear features.
pub fn containment_network(
    features: &[PreparedFeature],
    params: &NetworkParams,
    deadline: &Deadline,
) -> Result<NetworkOutcome> {
    params.validate()?;
    let radius = params.radius();

    // Buffers are independent per feature
    let results: Vec<(FeatureId, Result<Buffered>)> = features
        .into_par_iter()
        .map(|f| {
            let buffered = buffer_lines(f.shape.lines(), radius).map(|buffer| Buffered {
                feature: f,
                lines: MultiLineString::new(f.shape.lines().to_vec()),
                buffer,
            });
            (f.id, buffered)
        })
        .collect();

    let mut outcome = NetworkOutcome::default();
    let mut buffered = Vec::with_capacity(results.len());
    for (id, result) in results {
        match result {
            Ok(b) => buffered.push(b),
            Err(e) => outcome.skipped.push(into_skip(id, e)?),
        }
    }
    outcome.processed = buffered.len();

    let index = SpatialIndex::build(buffered.iter().map(|b| b.feature.bbox));

    let pairs: Vec<Vec<PairResult>> = (0..buffered.len())
        .into_par_iter()
        .map(|i| -> Result<Vec<PairResult>> {
            let mut found = Vec::new();
            for j in index.candidates(&buffered[i].feature.bbox, radius) {
                if j <= i {
                    continue;
                }
                deadline.tick()?;
                let (i_in_j, j_in_i) = evaluate_pair(&buffered[i], &buffered[j]);
                if i_in_j || j_in_i {
                    found.push(PairResult { i, j, i_in_j, j_in_i });
                }
            }
            Ok(found)
        })
        .collect::<Result<Vec<_>>>()?;
    outcome.pairs_evaluated = deadline.evaluations();

    let mut partners: BTreeMap<FeatureId, BTreeSet<FeatureId>> = BTreeMap::new();
    for pair in pairs.into_iter().flatten() {
        let a = buffered[pair.i].feature.id;
        let b = buffered[pair.j].feature.id;
        match (pair.i_in_j, pair.j_in_i) {
            (true, true) => {
                outcome.mutual.insert(a);
                outcome.mutual.insert(b);
                partners.entry(a).or_default().insert(b);
                partners.entry(b).or_default().insert(a);
            }
            (true, false) => {
                outcome.one_sided.insert(a);
                partners.entry(a).or_default().insert(b);
            }
            (false, true) => {
                outcome.one_sided.insert(b);
                partners.entry(b).or_default().insert(a);
            }
            (false, false) => {}
        }
    }

    let by_id: BTreeMap<FeatureId, &PreparedFeature> =
        buffered.iter().map(|b| (b.feature.id, b.feature)).collect();
    outcome.kept = partners
        .into_iter()
        .filter_map(|(id, related)| {
            let f = by_id.get(&id)?;
            let relation = if outcome.mutual.contains(&id) {
                Relation::Mutual
            } else {
                Relation::OneSided
            };
            Some(KeptFeature {
                id,
                layer: f.layer.clone(),
                source: f.source.clone(),
                relation,
                partners: related.into_iter().collect(),
            })
        })
        .collect();

    debug!(
        "Containment network: {} mutual, {} one-sided over {} pairs",
        outcome.mutual.len(),
        outcome.one_sided.len(),
        outcome.pairs_evaluated
    );
    Ok(outcome)
}
