//! # gapsnap algorithms
//!
//! Quality checks for vector line and polygon networks.
//!
//! ## Available checks
//!
//! - **gaps**: narrow regions of polygons, by morphological opening
//! - **network**: buffer-containment between linear features
//! - **snap**: endpoint dangles, with the parallel-offset excuse
//! - **proximity**: midpoint proximity and short-feature selection
//!
//! Each check works on [`prepare::PreparedFeature`]s in a metric system;
//! [`engine`] wires a check to a store and a sink.

pub mod buffer;
pub mod engine;
pub mod gaps;
pub mod index;
mod maybe_rayon;
pub mod measure;
pub mod network;
pub mod prepare;
pub mod proximity;
pub mod report;
pub mod snap;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{run_gaps, run_midpoints, run_network, run_short_features, run_snap};
    pub use crate::gaps::{extract_gaps, GapExtractor, GapOutcome, GapParams, GapRegion};
    pub use crate::network::{containment_network, ContainmentNetwork, NetworkOutcome, NetworkParams, Relation};
    pub use crate::prepare::{prepare, GeometryKind, PreparedFeature, PreparedInput, PreparedSet};
    pub use crate::proximity::{
        midpoint_proximity, short_features, LengthFilterParams, LengthOutcome, MidpointOutcome,
        MidpointParams, MidpointProximity, ShortFeatures,
    };
    pub use crate::report::{Deadline, RunLimits, RunReport, Skip};
    pub use crate::snap::{
        classify_snaps, Classification, NearReason, SnapClassifier, SnapOutcome, SnapOutputMode,
        SnapParams, SnapPolicy,
    };
    pub use gapsnap_core::prelude::*;
}
