//! Per-candidate verdicts and how they combine

use super::{Classification, Endpoint, NearReason, SnapParams, SnapPolicy};
use crate::index::SpatialIndex;
use crate::measure::{angle_between, locate, nearest_vertex_distance, tangent_at};
use crate::prepare::PreparedFeature;

/// Verdict of one neighbour for one endpoint; `None` when the neighbour is
/// farther than the search radius.
pub fn classify_candidate(ep: &Endpoint, neighbor: &PreparedFeature, params: &SnapParams) -> Option<Classification> {
    let lines = neighbor.shape.lines();
    let loc = locate(lines, ep.point)?;
    if loc.distance > params.near_tolerance {
        return None;
    }

    if nearest_vertex_distance(lines, ep.point) <= params.vertex_tolerance {
        return Some(Classification::Connected { neighbor: neighbor.id });
    }

    if loc.distance <= params.segment_tolerance {
        return Some(Classification::NearUnconnected {
            neighbor: neighbor.id,
            reason: NearReason::OnSegment,
            distance: loc.distance,
        });
    }

    let crossing = Classification::NearUnconnected {
        neighbor: neighbor.id,
        reason: NearReason::NonParallel,
        distance: loc.distance,
    };
    let Some(theta) = params.parallel_angle else {
        return Some(crossing);
    };
    // A degenerate neighbour tangent cannot excuse anything
    let Some(tangent) = tangent_at(&lines[loc.part], loc.arc, params.tangent_step()) else {
        return Some(crossing);
    };
    let angle = angle_between(ep.direction, tangent);
    if angle <= theta || (180.0 - angle).abs() <= theta {
        Some(Classification::ParallelOffset {
            neighbor: neighbor.id,
            angle,
        })
    } else {
        Some(crossing)
    }
}

/// Combine the verdicts of every other feature near the endpoint.
///
/// A connection to any candidate always wins. Without one, early exit
/// reports the first near-unconnected candidate and only falls back to a
/// parallel excuse when there is none; exhaustive lets a parallel excuse
/// clear the endpoint. Candidates are visited in ascending index order, so
/// both policies are deterministic.
pub fn classify_endpoint(
    ep: &Endpoint,
    features: &[PreparedFeature],
    index: &SpatialIndex,
    params: &SnapParams,
) -> Classification {
    let verdicts = index
        .candidates_near(ep.point.x, ep.point.y, params.near_tolerance)
        .into_iter()
        .filter(|&j| j != ep.owner)
        .filter_map(|j| classify_candidate(ep, &features[j], params));

    let mut excused = None;
    let mut flagged = None;
    for verdict in verdicts {
        match verdict {
            Classification::Connected { .. } => return verdict,
            Classification::ParallelOffset { .. } => {
                excused.get_or_insert(verdict);
            }
            _ => {
                flagged.get_or_insert(verdict);
            }
        }
    }
    let resolved = match params.policy {
        SnapPolicy::EarlyExit => flagged.or(excused),
        SnapPolicy::Exhaustive => excused.or(flagged),
    };
    resolved.unwrap_or(Classification::Isolated)
}
