//! Run accounting and resource limits
//!
//! A [`RunReport`] is returned by every engine entry point. [`RunLimits`]
//! bounds the pairwise evaluation phases; once a [`Deadline`] trips the
//! run aborts and nothing is written.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

use gapsnap_core::{Error, FeatureId, Result};

/// A feature excluded from a run, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skip {
    pub id: FeatureId,
    pub cause: String,
}

impl Skip {
    pub fn new(id: FeatureId, cause: impl Into<String>) -> Self {
        Self {
            id,
            cause: cause.into(),
        }
    }
}

/// Counts and diagnostics of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Check that produced the report
    pub check: String,
    /// Features that went through the check
    pub processed: usize,
    /// Features (or endpoints, for point output) flagged or kept
    pub flagged: usize,
    /// Output records handed to the sink
    pub written: usize,
    pub skipped: Vec<Skip>,
    pub warnings: Vec<String>,
    /// Metric system the comparisons ran in
    pub metric_crs: String,
    pub elapsed_ms: u128,
}

impl RunReport {
    pub fn new(check: &str) -> Self {
        Self {
            check: check.to_string(),
            ..Default::default()
        }
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_skipped(&self, id: FeatureId) -> bool {
        self.skipped.iter().any(|s| s.id == id)
    }

    /// Emit the per-run summary line
    pub fn log_summary(&self) {
        info!(
            "{}: processed {}, flagged {}, skipped {}, written {} ({} ms, metric {})",
            self.check,
            self.processed,
            self.flagged,
            self.skipped.len(),
            self.written,
            self.elapsed_ms,
            self.metric_crs
        );
    }
}

/// Bounds on a run; unset fields mean unbounded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLimits {
    /// Wall-clock budget in seconds
    pub timeout_secs: Option<f64>,
    /// Maximum number of pair or endpoint evaluations
    pub max_evaluations: Option<usize>,
}

impl RunLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_max_evaluations(mut self, max: usize) -> Self {
        self.max_evaluations = Some(max);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.timeout_secs {
            gapsnap_core::error::require_positive("timeout_secs", t)?;
            Duration::try_from_secs_f64(t).map_err(|e| Error::InvalidParameter {
                name: "timeout_secs",
                value: t.to_string(),
                reason: e.to_string(),
            })?;
        }
        if self.max_evaluations == Some(0) {
            return Err(Error::InvalidParameter {
                name: "max_evaluations",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Start the clock. An unrepresentable timeout counts as no timeout;
    /// `validate` rejects it first.
    pub fn start(&self) -> Deadline {
        Deadline {
            started: Instant::now(),
            timeout: self
                .timeout_secs
                .and_then(|t| Duration::try_from_secs_f64(t).ok()),
            max_evaluations: self.max_evaluations,
            evaluations: AtomicUsize::new(0),
        }
    }
}

/// Running budget, shared read-only across worker threads
#[derive(Debug)]
pub struct Deadline {
    started: Instant,
    timeout: Option<Duration>,
    max_evaluations: Option<usize>,
    evaluations: AtomicUsize,
}

impl Deadline {
    pub fn unbounded() -> Self {
        RunLimits::unbounded().start()
    }

    /// Count one evaluation and fail once a limit is exceeded
    pub fn tick(&self) -> Result<()> {
        let n = self.evaluations.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(max) = self.max_evaluations {
            if n > max {
                return Err(Error::DeadlineExceeded(format!(
                    "evaluation cap of {max} reached"
                )));
            }
        }
        self.check()
    }

    /// Check the wall clock without counting
    pub fn check(&self) -> Result<()> {
        match self.timeout {
            Some(t) if self.started.elapsed() > t => Err(Error::DeadlineExceeded(format!(
                "timeout of {:.1}s exceeded",
                t.as_secs_f64()
            ))),
            _ => Ok(()),
        }
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_cap() {
        let deadline = RunLimits::default().with_max_evaluations(3).start();
        for _ in 0..3 {
            deadline.tick().unwrap();
        }
        assert!(matches!(deadline.tick(), Err(Error::DeadlineExceeded(_))));
    }

    #[test]
    fn test_timeout() {
        let deadline = RunLimits::default()
            .with_timeout(Duration::from_nanos(1))
            .start();
        std::thread::sleep(Duration::from_millis(2));
        assert!(deadline.check().is_err());
    }

    #[test]
    fn test_unbounded() {
        let deadline = Deadline::unbounded();
        for _ in 0..10_000 {
            deadline.tick().unwrap();
        }
        assert_eq!(deadline.evaluations(), 10_000);
    }

    #[test]
    fn test_limits_validation() {
        assert!(RunLimits::default().with_max_evaluations(0).validate().is_err());
        let bad = RunLimits {
            timeout_secs: Some(-1.0),
            max_evaluations: None,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_huge_timeout_rejected() {
        let huge = RunLimits {
            timeout_secs: Some(1e20),
            max_evaluations: None,
        };
        match huge.validate() {
            Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, "timeout_secs"),
            other => panic!("unexpected {other:?}"),
        }
        // Starting the clock anyway must not panic
        let deadline = huge.start();
        deadline.tick().unwrap();
    }
}
