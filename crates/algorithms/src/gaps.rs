//! Morphological Gap Extractor
//!
//! Finds the parts of a polygon narrower than a threshold `T`. With
//! `r = T / 2`, the polygon is eroded by `r` and dilated back by `r` (a
//! morphological opening); whatever the opening does not cover is
//! narrower than `T` everywhere.

use geo::{Area, BooleanOps, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::{dilate, erode};
use crate::maybe_rayon::*;
use crate::prepare::{into_skip, PreparedFeature, PreparedInput};
use crate::report::{Deadline, Skip};
use gapsnap_core::error::{require_non_negative, require_positive};
use gapsnap_core::{Algorithm, Error, FeatureId, Result};

/// Method tag carried by every gap region
pub const METHOD_OPENING: &str = "opening";

/// Parameters for gap extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapParams {
    /// Gap threshold `T` in metres; regions narrower than this are gaps
    pub threshold: f64,
    /// Minimum gap area in square metres; smaller regions are dropped
    pub min_area: f64,
}

impl Default for GapParams {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            min_area: 10.0,
        }
    }
}

impl GapParams {
    pub fn validate(&self) -> Result<()> {
        require_positive("threshold", self.threshold)?;
        require_non_negative("min_area", self.min_area)
    }

    /// Erosion/dilation radius, half the threshold
    pub fn radius(&self) -> f64 {
        self.threshold / 2.0
    }
}

/// A region of a polygon narrower than the threshold, in metric coordinates
#[derive(Debug, Clone)]
pub struct GapRegion {
    pub parent: FeatureId,
    pub layer: String,
    pub polygon: Polygon<f64>,
    pub area: f64,
    pub threshold: f64,
    pub method: &'static str,
}

/// Result of a gap extraction pass
#[derive(Debug, Clone, Default)]
pub struct GapOutcome {
    /// Regions ordered by parent id
    pub regions: Vec<GapRegion>,
    pub processed: usize,
    pub skipped: Vec<Skip>,
}

impl GapOutcome {
    /// Number of distinct features with at least one gap
    pub fn flagged_features(&self) -> usize {
        let mut parents: Vec<FeatureId> = self.regions.iter().map(|g| g.parent).collect();
        parents.dedup();
        parents.len()
    }
}

/// Gap extraction algorithm
#[derive(Debug, Clone, Default)]
pub struct GapExtractor;

impl Algorithm for GapExtractor {
    type Input = PreparedInput;
    type Output = GapOutcome;
    type Params = GapParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Gaps"
    }

    fn description(&self) -> &'static str {
        "Find polygon regions narrower than a threshold by morphological opening"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let deadline = input.limits.start();
        extract_gaps(&input.features, &params, &deadline)
    }
}

/// Morphological opening: erode by `r`, then dilate by `r`.
///
/// Empty when no part of the polygon is at least `2r` wide.
pub fn opening(poly: &Polygon<f64>, r: f64) -> Result<MultiPolygon<f64>> {
    match erode(poly, r)? {
        Some(core) => dilate(&core, r),
        None => Ok(MultiPolygon::new(vec![])),
    }
}

/// Regions of `poly` narrower than `2r`, before any area filtering.
pub fn narrow_regions(poly: &Polygon<f64>, r: f64) -> Result<Vec<Polygon<f64>>> {
    let opened = opening(poly, r)?;
    if opened.0.is_empty() {
        return Ok(vec![poly.clone()]);
    }
    Ok(poly.difference(&opened).0)
}

fn feature_gaps(feature: &PreparedFeature, params: &GapParams, deadline: &Deadline) -> Result<Vec<GapRegion>> {
    let r = params.radius();
    let mut regions = Vec::new();
    for part in feature.shape.polygons() {
        deadline.tick()?;
        for polygon in narrow_regions(part, r)? {
            let area = polygon.unsigned_area();
            if area < params.min_area {
                continue;
            }
            regions.push(GapRegion {
                parent: feature.id,
                layer: feature.layer.clone(),
                polygon,
                area,
                threshold: params.threshold,
                method: METHOD_OPENING,
            });
        }
    }
    Ok(regions)
}

/// Extract gap regions from every prepared polygon feature.
///
/// A feature whose buffer or overlay fails is skipped; the deadline aborts
/// the whole pass.
pub fn extract_gaps(features: &[PreparedFeature], params: &GapParams, deadline: &Deadline) -> Result<GapOutcome> {
    params.validate()?;

    let results: Vec<(FeatureId, Result<Vec<GapRegion>>)> = features
        .into_par_iter()
        .map(|f| (f.id, feature_gaps(f, params, deadline)))
        .collect();

    let mut outcome = GapOutcome::default();
    for (id, result) in results {
        match result {
            Ok(regions) => {
                outcome.processed += 1;
                outcome.regions.extend(regions);
            }
            Err(e) => outcome.skipped.push(into_skip(id, e)?),
        }
    }
    outcome.regions.sort_by_key(|g| g.parent);
    debug!(
        "Gap extraction: {} regions from {} features",
        outcome.regions.len(),
        outcome.processed
    );
    Ok(outcome)
}
