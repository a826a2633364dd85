//! Endpoint extraction

use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

use crate::measure::unit;
use crate::prepare::PreparedFeature;
use gapsnap_core::FeatureId;

/// Which end of a line part
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRole {
    Start,
    End,
}

/// A line end with the direction of its adjacent segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    pub feature: FeatureId,
    /// Position of the owning feature in the prepared slice
    pub(crate) owner: usize,
    pub part: usize,
    pub role: EndpointRole,
    /// Metric coordinates
    pub point: Coord<f64>,
    /// Unit tangent along the adjacent segment; zero when degenerate
    pub direction: (f64, f64),
}

impl Endpoint {
    pub fn is_degenerate(&self) -> bool {
        self.direction == (0.0, 0.0)
    }
}

fn part_endpoints(feature: FeatureId, owner: usize, part: usize, ls: &LineString<f64>) -> Option<[Endpoint; 2]> {
    let pts = &ls.0;
    let n = pts.len();
    if n < 2 {
        return None;
    }
    let dir = |a: Coord<f64>, b: Coord<f64>| unit(b.x - a.x, b.y - a.y).unwrap_or((0.0, 0.0));
    Some([
        Endpoint {
            feature,
            owner,
            part,
            role: EndpointRole::Start,
            point: pts[0],
            direction: dir(pts[0], pts[1]),
        },
        Endpoint {
            feature,
            owner,
            part,
            role: EndpointRole::End,
            point: pts[n - 1],
            direction: dir(pts[n - 2], pts[n - 1]),
        },
    ])
}

/// Both endpoints of every part, in part order.
///
/// The start direction points from the first vertex to the second and the
/// end direction from the second-to-last vertex to the last.
pub fn endpoints(feature: &PreparedFeature, owner: usize) -> Vec<Endpoint> {
    feature
        .shape
        .lines()
        .iter()
        .enumerate()
        .filter_map(|(part, ls)| part_endpoints(feature.id, owner, part, ls))
        .flatten()
        .collect()
}
