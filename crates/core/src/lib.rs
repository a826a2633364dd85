//! # gapsnap Core
//!
//! Core types and traits for the gapsnap topology checks.
//!
//! This crate provides:
//! - `Feature`, `FeatureId`, `AttributeValue`: the vector data model
//! - `CRS`: coordinate reference descriptors, transforms and the metric resolver
//! - `FeatureStore` / `FeatureSink`: the seam to whatever holds the data
//! - Algorithm trait for consistent API across checks

pub mod crs;
pub mod error;
pub mod store;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use vector::{AttributeValue, BoundingBox, Feature, FeatureCollection, FeatureId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::{resolve_metric, MetricContext, MetricOrigin, CRS};
    pub use crate::error::{Error, Result};
    pub use crate::store::{
        Attributes, CategoryFilter, FeatureSink, FeatureStore, MemorySink, MemoryStore,
    };
    pub use crate::vector::{AttributeValue, BoundingBox, Feature, FeatureCollection, FeatureId};
    pub use crate::Algorithm;
}

/// Core trait for all checks in gapsnap.
///
/// A check is a pure function from prepared input and parameters to a
/// result; it never touches a store or a sink.
pub trait Algorithm {
    /// Input type for the check
    type Input;
    /// Output type for the check
    type Output;
    /// Parameters controlling the check
    type Params: Default;
    /// Error type for check execution
    type Error: std::error::Error;

    /// Returns the check name
    fn name(&self) -> &'static str;

    /// Returns a description of what the check does
    fn description(&self) -> &'static str;

    /// Execute the check
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
