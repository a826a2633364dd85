//! End-to-end runs through the engine over in-memory datasets.
//!
//! Each test builds a small dataset, runs one check with a `MemoryStore`
//! and a `MemorySink`, and looks at the written records and the report.

use gapsnap_algorithms::engine::fields;
use gapsnap_algorithms::prelude::*;
use geo::{Geometry, LineString, Point, Polygon};

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
    BoundingBox::new(x0, y0, x1, y1).to_polygon()
}

/// Default threshold; corner slivers of wide squares (about 134 m2 at
/// r = 25 m) fall under this minimum area.
fn gap_params() -> GapParams {
    GapParams {
        min_area: 200.0,
        ..Default::default()
    }
}

fn metric() -> CRS {
    CRS::projected(Some(32630), "Meter")
}

fn ids(sink: &MemorySink, field: &str) -> Vec<i64> {
    sink.records
        .iter()
        .map(|r| match r.attributes.get(field) {
            Some(AttributeValue::Int(v)) => *v,
            other => panic!("unexpected {field}: {other:?}"),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Gaps
// ---------------------------------------------------------------------------

#[test]
fn gaps_skip_invalid_ring_and_process_the_rest() {
    let bowtie = Polygon::new(
        LineString::from(vec![(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0), (0.0, 0.0)]),
        vec![],
    );
    let store = MemoryStore::new(metric()).with_layer(
        "AgricultureSrf",
        vec![
            Feature::new(1, rect(0.0, 0.0, 10.0, 100.0)),
            Feature::new(2, bowtie),
            Feature::new(3, rect(1000.0, 0.0, 1500.0, 500.0)),
        ],
    );
    let mut sink = MemorySink::new();
    let report = run_gaps(
        &store,
        &mut sink,
        &CategoryFilter::layers(["AgricultureSrf"]),
        &gap_params(),
        &RunLimits::default(),
    )
    .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped_count(), 1);
    assert!(report.is_skipped(FeatureId(2)));
    assert_eq!(report.flagged, 1);
    assert_eq!(report.written, 1);
    assert_eq!(ids(&sink, fields::PARENT_ID), vec![1]);
    match sink.records[0].attributes[fields::AREA] {
        AttributeValue::Float(a) => assert!((a - 1000.0).abs() < 1.0, "area {a}"),
        ref other => panic!("unexpected area {other:?}"),
    }
    assert_eq!(
        sink.records[0].attributes[fields::SOURCE_LAYER],
        AttributeValue::String("AgricultureSrf".into())
    );
}

#[test]
fn gaps_zero_results_is_not_an_error() {
    let store = MemoryStore::new(metric())
        .with_layer("CropLandSrf", vec![Feature::new(1, rect(0.0, 0.0, 400.0, 400.0))]);
    let mut sink = MemorySink::new();
    let report = run_gaps(
        &store,
        &mut sink,
        &CategoryFilter::layers(["Crop Land Srf"]),
        &gap_params(),
        &RunLimits::default(),
    )
    .unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.flagged, 0);
    assert!(sink.is_empty());
}

// ---------------------------------------------------------------------------
// Category filter
// ---------------------------------------------------------------------------

#[test]
fn subtype_filter_limits_the_input() {
    let mut canal = Feature::new(1, LineString::from(vec![(0.0, 0.0), (100.0, 0.0)]));
    canal.set_property("F_CODE", AttributeValue::String("BH020".into()));
    let mut river = Feature::new(2, LineString::from(vec![(0.0, 500.0), (250.0, 500.0)]));
    river.set_property("F_CODE", AttributeValue::String("BH140".into()));
    let store = MemoryStore::new(metric()).with_layer("HydrographyCrv", vec![canal, river]);

    let filter = CategoryFilter::layers(["hydrography-crv"])
        .with_subtype("F_CODE", vec![AttributeValue::String("BH140".into())]);
    let mut sink = MemorySink::new();
    let report = run_short_features(
        &store,
        &mut sink,
        &filter,
        &LengthFilterParams::default(),
        &RunLimits::default(),
    )
    .unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(ids(&sink, fields::SOURCE_ID), vec![2]);
}

#[test]
fn missing_layer_is_reported() {
    let store = MemoryStore::new(metric()).with_layer("RoadC", vec![]);
    let mut sink = MemorySink::new();
    let err = run_network(
        &store,
        &mut sink,
        &CategoryFilter::layers(["RailrdC"]),
        &NetworkParams::default(),
        &RunLimits::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::LayerNotFound(_)));
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

fn network_lines() -> Vec<Feature> {
    vec![
        Feature::new(1, LineString::from(vec![(0.0, 0.0), (1000.0, 0.0)])),
        Feature::new(2, LineString::from(vec![(0.0, 100.0), (1000.0, 100.0)])),
        Feature::new(3, LineString::from(vec![(3000.0, 0.0), (4000.0, 0.0)])),
        Feature::new(4, LineString::from(vec![(3400.0, 150.0), (3500.0, 150.0)])),
        Feature::new(5, LineString::from(vec![(8000.0, 0.0), (9000.0, 0.0)])),
    ]
}

fn kept_network(features: Vec<Feature>) -> Vec<(i64, String)> {
    let store = MemoryStore::new(metric()).with_layer("RiverC", features);
    let mut sink = MemorySink::new();
    run_network(
        &store,
        &mut sink,
        &CategoryFilter::layers(["RiverC"]),
        &NetworkParams::default(),
        &RunLimits::default(),
    )
    .unwrap();
    sink.records
        .iter()
        .map(|r| {
            let id = match r.attributes[fields::SOURCE_ID] {
                AttributeValue::Int(v) => v,
                _ => panic!("source_id is not an integer"),
            };
            (id, r.attributes[fields::RELATION].to_string())
        })
        .collect()
}

#[test]
fn network_mutual_and_one_sided() {
    let kept = kept_network(network_lines());
    assert_eq!(
        kept,
        vec![
            (1, "mutual".to_string()),
            (2, "mutual".to_string()),
            (4, "one_sided".to_string()),
        ]
    );
}

#[test]
fn network_output_does_not_depend_on_input_order() {
    let forward = kept_network(network_lines());
    let mut reversed = network_lines();
    reversed.reverse();
    assert_eq!(kept_network(reversed), forward);
    let mut rotated = network_lines();
    rotated.rotate_left(2);
    assert_eq!(kept_network(rotated), forward);
}

// ---------------------------------------------------------------------------
// Snap
// ---------------------------------------------------------------------------

fn junctions() -> MemoryStore {
    MemoryStore::new(metric()).with_layer(
        "RoadC",
        vec![
            // Main road, long enough that its own ends have no neighbours
            Feature::new(1, LineString::from(vec![(-200.0, 0.0), (300.0, 0.0)])),
            // Snapped to the main road's vertex
            Feature::new(2, LineString::from(vec![(-200.0, 0.0), (-200.0, -150.0)])),
            // Dangle 10 m short of the main road
            Feature::new(3, LineString::from(vec![(100.0, 120.0), (100.0, 10.0)])),
            // Parallel side road 5 m off the main road
            Feature::new(4, LineString::from(vec![(0.0, 5.0), (200.0, 5.0)])),
        ],
    )
}

#[test]
fn snap_flags_only_the_dangle() {
    let mut sink = MemorySink::new();
    let report = run_snap(
        &junctions(),
        &mut sink,
        &CategoryFilter::layers(["RoadC"]),
        &SnapParams::default(),
        &RunLimits::default(),
    )
    .unwrap();
    assert_eq!(report.processed, 4);
    assert_eq!(ids(&sink, fields::SOURCE_ID), vec![3]);
    assert_eq!(sink.records[0].geometry, Geometry::Point(Point::new(100.0, 10.0)));
    assert_eq!(
        sink.records[0].attributes[fields::REASON],
        AttributeValue::String("non_parallel_close".into())
    );
}

#[test]
fn snap_endpoint_on_a_vertex_is_never_flagged() {
    // The branch end (50, 10) is 10 m from road 1, which comes first, and
    // sits on the first vertex of road 3
    let store = MemoryStore::new(metric()).with_layer(
        "RoadC",
        vec![
            Feature::new(1, LineString::from(vec![(-200.0, 0.0), (300.0, 0.0)])),
            Feature::new(2, LineString::from(vec![(50.0, 150.0), (50.0, 10.0)])),
            Feature::new(3, LineString::from(vec![(50.0, 10.0), (150.0, 110.0)])),
        ],
    );
    for policy in [SnapPolicy::EarlyExit, SnapPolicy::Exhaustive] {
        let params = SnapParams {
            policy,
            ..Default::default()
        };
        let mut sink = MemorySink::new();
        let report = run_snap(
            &store,
            &mut sink,
            &CategoryFilter::layers(["RoadC"]),
            &params,
            &RunLimits::default(),
        )
        .unwrap();
        assert!(
            !ids(&sink, fields::SOURCE_ID).contains(&2),
            "{policy:?} flagged the snapped end"
        );
        assert_eq!(report.processed, 3);
    }
}

#[test]
fn snap_line_mode_without_parallel_excuse() {
    let params = SnapParams {
        parallel_angle: None,
        output: SnapOutputMode::Lines,
        ..Default::default()
    };
    let mut sink = MemorySink::new();
    let report = run_snap(
        &junctions(),
        &mut sink,
        &CategoryFilter::layers(["RoadC"]),
        &params,
        &RunLimits::default(),
    )
    .unwrap();
    assert_eq!(report.flagged, 2);
    assert_eq!(ids(&sink, fields::SOURCE_ID), vec![3, 4]);
    assert!(matches!(sink.records[1].geometry, Geometry::LineString(_)));
}

// ---------------------------------------------------------------------------
// Midpoints and short features, geographic input
// ---------------------------------------------------------------------------

#[test]
fn short_features_measured_in_metres() {
    // Near the equator 0.001 degrees of longitude is about 111 m
    let store = MemoryStore::new(CRS::wgs84()).with_layer(
        "TrailC",
        vec![
            Feature::new(1, LineString::from(vec![(10.000, 0.5), (10.002, 0.5)])),
            Feature::new(2, LineString::from(vec![(10.000, 0.6), (10.004, 0.6)])),
        ],
    );
    let mut sink = MemorySink::new();
    let report = run_short_features(
        &store,
        &mut sink,
        &CategoryFilter::layers(["TrailC"]),
        &LengthFilterParams::default(),
        &RunLimits::default(),
    )
    .unwrap();
    assert_eq!(report.metric_crs, "EPSG:32632");
    assert_eq!(ids(&sink, fields::SOURCE_ID), vec![1]);
    match sink.records[0].attributes[fields::LENGTH] {
        AttributeValue::Float(l) => assert!((l - 222.6).abs() < 2.0, "length {l}"),
        ref other => panic!("unexpected length {other:?}"),
    }
    // Source geometry is written untouched
    assert_eq!(
        sink.records[0].geometry,
        Geometry::LineString(LineString::from(vec![(10.000, 0.5), (10.002, 0.5)]))
    );
}

#[test]
fn midpoints_written_back_in_degrees() {
    let store = MemoryStore::new(CRS::wgs84()).with_layer(
        "TrailC",
        vec![
            Feature::new(1, LineString::from(vec![(10.000, 0.500), (10.010, 0.500)])),
            Feature::new(2, LineString::from(vec![(10.004, 0.501), (10.006, 0.501)])),
        ],
    );
    let mut kept = MemorySink::new();
    let mut points = MemorySink::new();
    let report = run_midpoints(
        &store,
        &mut kept,
        Some(&mut points),
        &CategoryFilter::layers(["TrailC"]),
        &MidpointParams::default(),
        &RunLimits::default(),
    )
    .unwrap();
    assert_eq!(report.flagged, 2);
    assert_eq!(ids(&kept, fields::SOURCE_ID), vec![1, 2]);
    assert_eq!(points.len(), 2);
    match &points.records[0].geometry {
        Geometry::Point(p) => {
            assert!((p.x() - 10.005).abs() < 1e-6, "x {}", p.x());
            assert!((p.y() - 0.500).abs() < 1e-6, "y {}", p.y());
        }
        other => panic!("unexpected midpoint geometry {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

#[test]
fn evaluation_cap_aborts_without_writing() {
    let mut sink = MemorySink::new();
    let err = run_network(
        &MemoryStore::new(metric()).with_layer("RiverC", network_lines()),
        &mut sink,
        &CategoryFilter::layers(["RiverC"]),
        &NetworkParams::default(),
        &RunLimits::default().with_max_evaluations(1),
    )
    .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded(_)));
    assert!(sink.is_empty());
}
