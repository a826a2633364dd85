//! JSON dataset store and output files
//!
//! A dataset file is a serialized [`MemoryStore`]:
//!
//! ```json
//! {
//!   "crs": { "epsg": 4326 },
//!   "layers": {
//!     "RoadC": [
//!       { "id": 1, "geometry": { "LineString": [{"x": -3.7, "y": 40.4}, {"x": -3.69, "y": 40.4}] },
//!         "properties": { "F_CODE": "AP030" } }
//!     ]
//!   }
//! }
//! ```
//!
//! Outputs are written the same way, as the dataset CRS plus a list of
//! records.

use anyhow::{Context, Result};
use geo_types::Geometry;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use gapsnap_core::store::{Attributes, FeatureSink, MemoryStore, OutputRecord};
use gapsnap_core::CRS;

/// Parse a dataset from its JSON text.
pub fn parse_dataset(text: &str) -> Result<MemoryStore> {
    serde_json::from_str(text).context("Invalid dataset JSON")
}

/// Read a dataset file.
pub fn read_dataset(path: &Path) -> Result<MemoryStore> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to read dataset {}", path.display()))
}

#[derive(Serialize)]
struct OutputFile<'a> {
    crs: &'a CRS,
    records: &'a [OutputRecord],
}

/// Sink that collects records and writes them to a JSON file on `finish`.
///
/// Nothing touches the disk before `finish`, so a failed run leaves no
/// output file behind.
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
    crs: CRS,
    records: Vec<OutputRecord>,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>, crs: CRS) -> Self {
        Self {
            path: path.into(),
            crs,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn to_json(&self) -> Result<String> {
        let out = OutputFile {
            crs: &self.crs,
            records: &self.records,
        };
        serde_json::to_string_pretty(&out).context("Failed to serialize output")
    }

    /// Write the collected records, returning the output path.
    pub fn finish(self) -> Result<PathBuf> {
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        let out = OutputFile {
            crs: &self.crs,
            records: &self.records,
        };
        serde_json::to_writer_pretty(&mut writer, &out).context("Failed to write output")?;
        writer.flush().context("Failed to write output")?;
        Ok(self.path)
    }
}

impl FeatureSink for JsonFileSink {
    fn append(&mut self, geometry: Geometry<f64>, attributes: Attributes) -> gapsnap_core::Result<()> {
        if attributes.is_empty() {
            return Err(gapsnap_core::Error::Sink("record without attributes".into()));
        }
        self.records.push(OutputRecord { geometry, attributes });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gapsnap_core::store::{CategoryFilter, FeatureStore};
    use gapsnap_core::AttributeValue;

    const DATASET: &str = r#"{
        "crs": { "epsg": 4326 },
        "layers": {
            "RoadC": [
                { "id": 1,
                  "geometry": { "LineString": [{"x": -3.70, "y": 40.40}, {"x": -3.69, "y": 40.40}] },
                  "properties": { "F_CODE": "AP030", "LANES": 2 } },
                { "id": 2,
                  "geometry": { "LineString": [{"x": -3.70, "y": 40.41}, {"x": -3.69, "y": 40.41}] } }
            ],
            "Hydrography Crv": []
        }
    }"#;

    #[test]
    fn test_parse_dataset() {
        let store = parse_dataset(DATASET).unwrap();
        assert_eq!(store.crs().epsg(), Some(4326));
        assert!(!store.crs().is_metric());

        let features = store.list_features(&CategoryFilter::layers(["roadc"])).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].layer, "RoadC");
        assert_eq!(features[0].get_property("LANES"), Some(&AttributeValue::Int(2)));

        let subtype = CategoryFilter::layers(["RoadC"])
            .with_subtype("F_CODE", vec![AttributeValue::String("AP030".into())]);
        assert_eq!(store.list_features(&subtype).unwrap().len(), 1);
        assert!(store.list_features(&CategoryFilter::layers(["hydrography-crv"])).unwrap().is_empty());
    }

    #[test]
    fn test_bad_dataset_is_an_error() {
        assert!(parse_dataset(r#"{ "crs": { "epsg": 4326 }, "layers": { "RoadC": [ { "id": 1 } ] } }"#).is_err());
    }

    #[test]
    fn test_sink_serializes_records() {
        let mut sink = JsonFileSink::new("unused.json", CRS::wgs84());
        let mut attrs = Attributes::new();
        attrs.insert("source_id".into(), AttributeValue::Int(7));
        sink.append(geo_types::Point::new(1.0, 2.0).into(), attrs).unwrap();
        assert!(sink.append(geo_types::Point::new(0.0, 0.0).into(), Attributes::new()).is_err());
        assert_eq!(sink.len(), 1);

        let json: serde_json::Value = serde_json::from_str(&sink.to_json().unwrap()).unwrap();
        assert_eq!(json["records"][0]["attributes"]["source_id"], 7);
        assert_eq!(json["crs"]["epsg"], 4326);
    }
}
