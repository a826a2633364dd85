//! Metric projection selection
//!
//! Every distance, buffer and area in gapsnap is computed in a projected
//! system with metre units. A dataset already in such a system is used as
//! is; anything else gets the UTM zone of its extent centroid, and when
//! that cannot be built, the global pseudo-Mercator with a warning.

use geo::Coord;
use tracing::{debug, warn};

use super::transform::{utm_zone, Transformer, UTM_MAX_LAT, UTM_MIN_LAT};
use super::CRS;
use crate::vector::BoundingBox;

/// How the metric system of a run was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricOrigin {
    /// The source CRS is already projected in metres
    Native,
    /// UTM zone derived from the extent centroid
    Utm { zone: u32, north: bool },
    /// Web-Mercator fallback; distances carry scale distortion
    WebMercatorFallback,
}

/// Resolved metric reference system for one analysis run.
///
/// Immutable once built. Holds the transformers in both directions so the
/// geometry pipeline never has to look at CRS descriptors again.
#[derive(Debug, Clone)]
pub struct MetricContext {
    source: CRS,
    target: CRS,
    origin: MetricOrigin,
    /// Extent centroid in lon/lat degrees, when one could be computed
    centroid: Option<(f64, f64)>,
    extent: Option<BoundingBox>,
    warning: Option<String>,
    to_metric: Transformer,
    to_source: Transformer,
}

impl MetricContext {
    fn new(
        source: &CRS,
        target: CRS,
        origin: MetricOrigin,
        centroid: Option<(f64, f64)>,
        extent: Option<BoundingBox>,
        warning: Option<String>,
    ) -> Self {
        let to_metric = Transformer::new(source, &target);
        let to_source = Transformer::new(&target, source);
        Self {
            source: source.clone(),
            target,
            origin,
            centroid,
            extent,
            warning,
            to_metric,
            to_source,
        }
    }

    /// Source reference system of the dataset
    pub fn source(&self) -> &CRS {
        &self.source
    }

    /// Metric reference system all comparisons happen in
    pub fn target(&self) -> &CRS {
        &self.target
    }

    pub fn origin(&self) -> MetricOrigin {
        self.origin
    }

    pub fn centroid(&self) -> Option<(f64, f64)> {
        self.centroid
    }

    pub fn extent(&self) -> Option<&BoundingBox> {
        self.extent.as_ref()
    }

    /// Precision-loss warning, set on the fallback path
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Source → metric
    pub fn to_metric(&self) -> &Transformer {
        &self.to_metric
    }

    /// Metric → source
    pub fn to_source(&self) -> &Transformer {
        &self.to_source
    }
}

/// Pick a metric reference system for a dataset.
///
/// Never fails: a source already projected in metres is returned unchanged,
/// otherwise the UTM zone of the extent centroid is used, and if that cannot
/// be constructed the result falls back to Web-Mercator with a warning.
pub fn resolve_metric(source: &CRS, extent: Option<&BoundingBox>) -> MetricContext {
    if source.is_metric() {
        debug!("CRS {} is already metric", source);
        return MetricContext::new(
            source,
            source.clone(),
            MetricOrigin::Native,
            None,
            extent.copied(),
            None,
        );
    }

    match utm_for_extent(source, extent) {
        Ok((crs, zone, north, centroid)) => {
            debug!(
                "Projecting to UTM zone {} ({}) from centroid ({:.4}, {:.4})",
                zone, crs, centroid.0, centroid.1
            );
            MetricContext::new(
                source,
                crs,
                MetricOrigin::Utm { zone, north },
                Some(centroid),
                extent.copied(),
                None,
            )
        }
        Err((reason, centroid)) => {
            let message = format!(
                "no UTM zone for {} ({}); falling back to EPSG:3857, distances and areas lose precision",
                source, reason
            );
            warn!("{}", message);
            MetricContext::new(
                source,
                CRS::web_mercator(),
                MetricOrigin::WebMercatorFallback,
                centroid,
                extent.copied(),
                Some(message),
            )
        }
    }
}

type UtmChoice = (CRS, u32, bool, (f64, f64));
type UtmFailure = (String, Option<(f64, f64)>);

fn utm_for_extent(
    source: &CRS,
    extent: Option<&BoundingBox>,
) -> std::result::Result<UtmChoice, UtmFailure> {
    let extent = extent.ok_or_else(|| ("dataset has no extent".to_string(), None))?;
    let (cx, cy) = extent.center();

    let to_geographic = Transformer::new(source, &CRS::wgs84());
    let lonlat = to_geographic
        .coord(Coord { x: cx, y: cy })
        .map_err(|e| (format!("centroid not convertible to lon/lat: {e}"), None))?;
    let (lon, lat) = (lonlat.x, lonlat.y);

    if !(UTM_MIN_LAT..=UTM_MAX_LAT).contains(&lat) {
        return Err((
            format!("latitude {lat:.4} outside the UTM band"),
            Some((lon, lat)),
        ));
    }

    let zone = utm_zone(lon);
    let north = lat >= 0.0;
    let crs = u32::try_from(zone)
        .ok()
        .and_then(|z| CRS::utm(z, north))
        .ok_or_else(|| (format!("invalid UTM zone {zone}"), Some((lon, lat))))?;

    Ok((crs, zone as u32, north, (lon, lat)))
}
