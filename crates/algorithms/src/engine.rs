//! Run orchestration
//!
//! Each entry point takes a store, a sink, a category filter, the check
//! parameters and run limits, and goes through the same steps:
//!
//! 1. validate the configuration (nothing is read on a bad config)
//! 2. list the features and resolve the metric system from their extent
//! 3. reproject and clean the features, recording skips
//! 4. run the check
//! 5. reproject the results back to the dataset CRS and append them
//!
//! Output records are assembled in full before the first append, so a run
//! that fails or hits its deadline leaves the sink untouched.

use geo::{Geometry, Point};
use std::time::Instant;
use tracing::{info, warn};

use crate::gaps::{GapExtractor, GapParams};
use crate::network::{ContainmentNetwork, NetworkParams};
use crate::prepare::{prepare, GeometryKind, PreparedInput, PreparedSet};
use crate::proximity::{LengthFilterParams, MidpointParams, MidpointProximity, ShortFeatures};
use crate::report::{RunLimits, RunReport};
use crate::snap::{SnapClassifier, SnapOutputMode, SnapParams};
use gapsnap_core::crs::{resolve_metric, MetricContext};
use gapsnap_core::store::{Attributes, CategoryFilter, FeatureSink, FeatureStore};
use gapsnap_core::{Algorithm, AttributeValue, FeatureCollection, FeatureId, Result};

/// Output field names
pub mod fields {
    pub const PARENT_ID: &str = "parent_id";
    pub const SOURCE_ID: &str = "source_id";
    pub const SOURCE_LAYER: &str = "source_layer";
    pub const THRESHOLD: &str = "threshold_m";
    pub const AREA: &str = "area_m2";
    pub const METHOD: &str = "method";
    pub const REASON: &str = "reason";
    pub const RELATION: &str = "relation";
    pub const PARTNERS: &str = "partners";
    pub const NEIGHBOR_ID: &str = "neighbor_id";
    pub const DISTANCE: &str = "distance_m";
    pub const LENGTH: &str = "length_m";
}

/// Record waiting for the sink, geometry already in the dataset CRS
type Record = (Geometry<f64>, Attributes);

struct Session {
    ctx: MetricContext,
    prepared: PreparedSet,
    report: RunReport,
    started: Instant,
}

fn begin(
    check: &str,
    store: &dyn FeatureStore,
    filter: &CategoryFilter,
    limits: &RunLimits,
    kind: GeometryKind,
) -> Result<Session> {
    let started = Instant::now();
    filter.validate()?;
    limits.validate()?;

    let collection = FeatureCollection {
        crs: store.crs().clone(),
        features: store.list_features(filter)?,
    };
    let extent = collection.extent();
    let ctx = resolve_metric(&collection.crs, extent.as_ref());
    info!(
        "{}: {} features from [{}] in {}, metric system {}",
        check,
        collection.len(),
        filter.layers.join(", "),
        collection.crs,
        ctx.target()
    );

    let mut report = RunReport::new(check);
    report.metric_crs = ctx.target().identifier();
    if let Some(w) = ctx.warning() {
        report.warnings.push(w.to_string());
    }

    let prepared = prepare(collection.features, &ctx, kind)?;
    if !prepared.skipped.is_empty() {
        warn!("{}: {} features skipped during preparation", check, prepared.skipped.len());
    }
    Ok(Session {
        ctx,
        prepared,
        report,
        started,
    })
}

impl Session {
    /// Move the prepared features out for the check, keeping the skips.
    fn input(&mut self, limits: &RunLimits) -> PreparedInput {
        let features = std::mem::take(&mut self.prepared.features);
        self.report.processed = features.len();
        self.report.skipped.append(&mut self.prepared.skipped);
        PreparedInput::new(features).with_limits(limits.clone())
    }

    /// Bring a metric geometry back to the dataset CRS.
    ///
    /// A failure drops that record with a warning; the rest of the output
    /// is still written.
    fn to_source(&mut self, id: FeatureId, geom: Geometry<f64>) -> Option<Geometry<f64>> {
        match self.ctx.to_source().geometry(&geom) {
            Ok(g) => Some(g),
            Err(reason) => {
                let message = format!("output for feature {id} not written: {reason}");
                warn!("{}", message);
                self.report.warnings.push(message);
                None
            }
        }
    }

    fn finish(mut self, sink: &mut dyn FeatureSink, records: Vec<Record>) -> Result<RunReport> {
        for (geometry, attributes) in records {
            sink.append(geometry, attributes)?;
            self.report.written += 1;
        }
        self.report.elapsed_ms = self.started.elapsed().as_millis();
        self.report.log_summary();
        Ok(self.report)
    }
}

fn id_value(id: FeatureId) -> AttributeValue {
    AttributeValue::Int(id.0 as i64)
}

fn text(s: &str) -> AttributeValue {
    AttributeValue::String(s.to_string())
}

/// Morphological gap extraction over polygon layers.
///
/// Writes one polygon per gap region with `parent_id`, `source_layer`,
/// `threshold_m`, `area_m2` and `method`.
pub fn run_gaps(
    store: &dyn FeatureStore,
    sink: &mut dyn FeatureSink,
    filter: &CategoryFilter,
    params: &GapParams,
    limits: &RunLimits,
) -> Result<RunReport> {
    params.validate()?;
    let mut session = begin("gaps", store, filter, limits, GeometryKind::Areal)?;
    let input = session.input(limits);
    let outcome = GapExtractor.execute(input, params.clone())?;

    session.report.processed = outcome.processed;
    session.report.flagged = outcome.flagged_features();
    session.report.skipped.extend(outcome.skipped);

    let mut records = Vec::with_capacity(outcome.regions.len());
    for gap in outcome.regions {
        let Some(geometry) = session.to_source(gap.parent, gap.polygon.into()) else {
            continue;
        };
        let mut attrs = Attributes::new();
        attrs.insert(fields::PARENT_ID.into(), id_value(gap.parent));
        attrs.insert(fields::SOURCE_LAYER.into(), text(&gap.layer));
        attrs.insert(fields::THRESHOLD.into(), AttributeValue::Float(gap.threshold));
        attrs.insert(fields::AREA.into(), AttributeValue::Float(gap.area));
        attrs.insert(fields::METHOD.into(), text(gap.method));
        records.push((geometry, attrs));
    }
    session.finish(sink, records)
}

/// Buffer-containment network over linear layers.
///
/// Writes each kept feature's source geometry with `source_id`,
/// `source_layer`, `relation` and `partners`.
pub fn run_network(
    store: &dyn FeatureStore,
    sink: &mut dyn FeatureSink,
    filter: &CategoryFilter,
    params: &NetworkParams,
    limits: &RunLimits,
) -> Result<RunReport> {
    params.validate()?;
    let mut session = begin("network", store, filter, limits, GeometryKind::Linear)?;
    let input = session.input(limits);
    let outcome = ContainmentNetwork.execute(input, params.clone())?;

    session.report.processed = outcome.processed;
    session.report.flagged = outcome.kept.len();
    session.report.skipped.extend(outcome.skipped);

    let records = outcome
        .kept
        .into_iter()
        .map(|kept| {
            let partners: Vec<String> = kept.partners.iter().map(|p| p.to_string()).collect();
            let mut attrs = Attributes::new();
            attrs.insert(fields::SOURCE_ID.into(), id_value(kept.id));
            attrs.insert(fields::SOURCE_LAYER.into(), text(&kept.layer));
            attrs.insert(fields::RELATION.into(), text(kept.relation.as_str()));
            attrs.insert(fields::PARTNERS.into(), text(&partners.join(",")));
            (kept.source, attrs)
        })
        .collect();
    session.finish(sink, records)
}

/// Endpoint snap/dangle classification over linear layers.
///
/// In point mode each flagged endpoint is written with `source_id`,
/// `source_layer`, `reason` and `neighbor_id`; in line mode each flagged
/// feature's source geometry with `source_id`, `source_layer` and `reason`.
pub fn run_snap(
    store: &dyn FeatureStore,
    sink: &mut dyn FeatureSink,
    filter: &CategoryFilter,
    params: &SnapParams,
    limits: &RunLimits,
) -> Result<RunReport> {
    params.validate()?;
    let mut session = begin("snap", store, filter, limits, GeometryKind::Linear)?;
    let input = session.input(limits);
    let outcome = SnapClassifier.execute(input, params.clone())?;

    if outcome.degenerate_endpoints > 0 {
        session.report.warnings.push(format!(
            "{} endpoints with a zero-length end segment were not classified",
            outcome.degenerate_endpoints
        ));
    }

    let mut records = Vec::new();
    match params.output {
        SnapOutputMode::Points => {
            session.report.flagged = outcome.flagged_points.len();
            for p in outcome.flagged_points {
                let Some(geometry) = session.to_source(p.source_id, Point::from(p.point).into()) else {
                    continue;
                };
                let mut attrs = Attributes::new();
                attrs.insert(fields::SOURCE_ID.into(), id_value(p.source_id));
                attrs.insert(fields::SOURCE_LAYER.into(), text(&p.layer));
                attrs.insert(fields::REASON.into(), text(p.reason.code()));
                attrs.insert(fields::NEIGHBOR_ID.into(), id_value(p.neighbor));
                records.push((geometry, attrs));
            }
        }
        SnapOutputMode::Lines => {
            session.report.flagged = outcome.flagged_lines.len();
            for line in outcome.flagged_lines {
                let mut attrs = Attributes::new();
                attrs.insert(fields::SOURCE_ID.into(), id_value(line.id));
                attrs.insert(fields::SOURCE_LAYER.into(), text(&line.layer));
                attrs.insert(fields::REASON.into(), text(line.reason.code()));
                records.push((line.source, attrs));
            }
        }
    }
    session.finish(sink, records)
}

/// Midpoint proximity over linear layers.
///
/// Kept features go to `sink` with `source_id`, `source_layer`,
/// `neighbor_id` and `distance_m`. When `midpoint_sink` is given, every
/// computed midpoint is written there with `source_id` and `source_layer`.
pub fn run_midpoints(
    store: &dyn FeatureStore,
    sink: &mut dyn FeatureSink,
    midpoint_sink: Option<&mut dyn FeatureSink>,
    filter: &CategoryFilter,
    params: &MidpointParams,
    limits: &RunLimits,
) -> Result<RunReport> {
    params.validate()?;
    let mut session = begin("midpoints", store, filter, limits, GeometryKind::Linear)?;
    let input = session.input(limits);
    let outcome = MidpointProximity.execute(input, params.clone())?;
    session.report.flagged = outcome.kept.len();

    let mut point_records = Vec::new();
    let mut nearest = std::collections::BTreeMap::new();
    for m in outcome.midpoints {
        if let Some(n) = m.nearest {
            nearest.insert(m.id, n);
        }
        if midpoint_sink.is_none() {
            continue;
        }
        let Some(geometry) = session.to_source(m.id, Point::from(m.point).into()) else {
            continue;
        };
        let mut attrs = Attributes::new();
        attrs.insert(fields::SOURCE_ID.into(), id_value(m.id));
        attrs.insert(fields::SOURCE_LAYER.into(), text(&m.layer));
        point_records.push((geometry, attrs));
    }

    let records = outcome
        .kept
        .into_iter()
        .map(|kept| {
            let mut attrs = Attributes::new();
            attrs.insert(fields::SOURCE_ID.into(), id_value(kept.id));
            attrs.insert(fields::SOURCE_LAYER.into(), text(&kept.layer));
            if let Some((neighbor, d)) = nearest.get(&kept.id) {
                attrs.insert(fields::NEIGHBOR_ID.into(), id_value(*neighbor));
                attrs.insert(fields::DISTANCE.into(), AttributeValue::Float(*d));
            }
            (kept.source, attrs)
        })
        .collect();

    if let Some(points) = midpoint_sink {
        for (geometry, attributes) in point_records {
            points.append(geometry, attributes)?;
        }
    }
    session.finish(sink, records)
}

/// Short-feature selection over linear layers.
///
/// Writes each feature shorter than the limit with `source_id`,
/// `source_layer` and `length_m`.
pub fn run_short_features(
    store: &dyn FeatureStore,
    sink: &mut dyn FeatureSink,
    filter: &CategoryFilter,
    params: &LengthFilterParams,
    limits: &RunLimits,
) -> Result<RunReport> {
    params.validate()?;
    let mut session = begin("short", store, filter, limits, GeometryKind::Linear)?;
    let input = session.input(limits);
    let outcome = ShortFeatures.execute(input, params.clone())?;
    session.report.flagged = outcome.selected.len();

    let records = outcome
        .selected
        .into_iter()
        .map(|s| {
            let mut attrs = Attributes::new();
            attrs.insert(fields::SOURCE_ID.into(), id_value(s.id));
            attrs.insert(fields::SOURCE_LAYER.into(), text(&s.layer));
            attrs.insert(fields::LENGTH.into(), AttributeValue::Float(s.length));
            (s.source, attrs)
        })
        .collect();
    session.finish(sink, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gapsnap_core::store::{MemorySink, MemoryStore};
    use gapsnap_core::{BoundingBox, Error, Feature, CRS};
    use geo::LineString;

    fn metric_store() -> MemoryStore {
        let roads = vec![
            Feature::new(1, LineString::from(vec![(0.0, 0.0), (100.0, 0.0)])),
            Feature::new(2, LineString::from(vec![(50.0, 80.0), (50.0, 10.0)])),
        ];
        MemoryStore::new(CRS::projected(Some(32630), "Meter")).with_layer("RoadC", roads)
    }

    #[test]
    fn test_config_errors_fail_before_reading() {
        let mut sink = MemorySink::new();
        let bad = SnapParams {
            near_tolerance: -1.0,
            ..Default::default()
        };
        let filter = CategoryFilter::layers(["RoadC"]);
        let err = run_snap(&metric_store(), &mut sink, &filter, &bad, &RunLimits::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "near_tolerance", .. }));

        let err = run_snap(
            &metric_store(),
            &mut sink,
            &CategoryFilter::default(),
            &SnapParams::default(),
            &RunLimits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmptyCategory));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_snap_points_written_with_fields() {
        let mut sink = MemorySink::new();
        let report = run_snap(
            &metric_store(),
            &mut sink,
            &CategoryFilter::layers(["roadc"]),
            &SnapParams::default(),
            &RunLimits::default(),
        )
        .unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.flagged, 1);
        assert_eq!(report.written, 1);
        let rec = &sink.records[0];
        assert_eq!(rec.geometry, Geometry::Point(Point::new(50.0, 10.0)));
        assert_eq!(rec.attributes[fields::REASON], text("non_parallel_close"));
        assert_eq!(rec.attributes[fields::SOURCE_ID], AttributeValue::Int(2));
        assert_eq!(rec.attributes[fields::SOURCE_LAYER], text("RoadC"));
    }

    #[test]
    fn test_gaps_back_in_geographic_crs() {
        // 0.0001 degrees wide strip near Madrid, about 8.5 m by 111 m
        let strip = BoundingBox::new(-3.7000, 40.4000, -3.6999, 40.4010).to_polygon();
        let store = MemoryStore::new(CRS::wgs84())
            .with_layer("AgricultureSrf", vec![Feature::new(11, strip)]);
        let mut sink = MemorySink::new();
        let report = run_gaps(
            &store,
            &mut sink,
            &CategoryFilter::layers(["AgricultureSrf"]),
            &GapParams::default(),
            &RunLimits::default(),
        )
        .unwrap();
        assert_eq!(report.metric_crs, "EPSG:32630");
        assert_eq!(sink.len(), 1);
        let rec = &sink.records[0];
        let bbox = BoundingBox::of(&rec.geometry).unwrap();
        assert!((bbox.min_x - -3.7000).abs() < 1e-6);
        assert!((bbox.max_y - 40.4010).abs() < 1e-6);
        match rec.attributes[fields::AREA] {
            AttributeValue::Float(a) => assert!((a - 944.0).abs() < 20.0, "area {a}"),
            ref other => panic!("unexpected {other:?}"),
        }
        assert_eq!(rec.attributes[fields::METHOD], text("opening"));
        assert_eq!(rec.attributes[fields::PARENT_ID], AttributeValue::Int(11));
    }

    #[test]
    fn test_zero_length_end_segment_is_not_classified() {
        let roads = vec![
            Feature::new(1, LineString::from(vec![(0.0, 0.0), (100.0, 0.0)])),
            Feature::new(2, LineString::from(vec![(50.0, 80.0), (50.0, 10.0), (50.0, 10.0)])),
        ];
        let store = MemoryStore::new(CRS::projected(Some(32630), "Meter")).with_layer("RoadC", roads);
        let mut sink = MemorySink::new();
        let report = run_snap(
            &store,
            &mut sink,
            &CategoryFilter::layers(["RoadC"]),
            &SnapParams::default(),
            &RunLimits::default(),
        )
        .unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.flagged, 0);
        assert!(sink.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("1 endpoints"), "{:?}", report.warnings);
    }

    #[test]
    fn test_deadline_leaves_sink_untouched() {
        let mut sink = MemorySink::new();
        let limits = RunLimits::default().with_max_evaluations(1);
        let err = run_snap(
            &metric_store(),
            &mut sink,
            &CategoryFilter::layers(["RoadC"]),
            &SnapParams::default(),
            &limits,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_midpoints_two_sinks() {
        let mut lines = MemorySink::new();
        let mut points = MemorySink::new();
        let report = run_midpoints(
            &metric_store(),
            &mut lines,
            Some(&mut points),
            &CategoryFilter::layers(["RoadC"]),
            &MidpointParams::default(),
            &RunLimits::default(),
        )
        .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(lines.len(), 2);
        assert_eq!(report.flagged, 2);
        assert!(lines.records[0].attributes.contains_key(fields::DISTANCE));
    }
}
