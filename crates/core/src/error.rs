//! Error types for gapsnap

use thiserror::Error;

use crate::vector::FeatureId;

/// Main error type for gapsnap operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Category filter names no layers")]
    EmptyCategory,

    #[error("None of the requested layers were found: {0}")]
    LayerNotFound(String),

    #[error("Feature id {0} appears more than once in the input")]
    DuplicateFeature(FeatureId),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Reprojection failed for feature {id}: {reason}")]
    Reprojection { id: FeatureId, reason: String },

    #[error("Invalid geometry for feature {id}: {reason}")]
    InvalidGeometry { id: FeatureId, reason: String },

    #[error("Geometry operation '{op}' failed: {reason}")]
    GeometryOperation { op: &'static str, reason: String },

    #[error("Run aborted: {0}")]
    DeadlineExceeded(String),

    #[error("Output sink error: {0}")]
    Sink(String),
}

impl Error {
    /// Whether the error is confined to a single feature.
    ///
    /// Such errors are turned into skips; everything else fails the run.
    pub fn is_per_feature(&self) -> bool {
        matches!(
            self,
            Error::Reprojection { .. } | Error::InvalidGeometry { .. } | Error::GeometryOperation { .. }
        )
    }

    pub(crate) fn invalid_parameter(name: &'static str, value: f64, reason: &str) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Check that a distance-like parameter is finite and strictly positive.
pub fn require_positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::invalid_parameter(name, value, "must be a finite value > 0"));
    }
    Ok(())
}

/// Check that a parameter is finite and not negative.
pub fn require_non_negative(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::invalid_parameter(name, value, "must be a finite value >= 0"));
    }
    Ok(())
}

/// Result type alias for gapsnap operations
pub type Result<T> = std::result::Result<T, Error>;
