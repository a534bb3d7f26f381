//! Records flowing through the detection pipeline.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single timestamped observation from a producer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Observed value
    pub value: f64,
    /// Seconds since the Unix epoch, as reported by the producer
    pub timestamp: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(value: f64, timestamp: f64) -> Self {
        Self { value, timestamp }
    }

    /// Reject samples that cannot take part in window statistics.
    ///
    /// Timestamps are not checked for monotonicity.
    pub fn validate(&self) -> Result<()> {
        if !self.value.is_finite() {
            return Err(Error::validation(format!(
                "value must be a finite number, got {}",
                self.value
            )));
        }
        if !self.timestamp.is_finite() {
            return Err(Error::validation(format!(
                "timestamp must be a finite number, got {}",
                self.timestamp
            )));
        }
        Ok(())
    }
}

/// A sample flagged by the detector, with the window statistics that flagged it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub value: f64,
    pub timestamp: f64,
    /// Window mean at classification time (window includes this value)
    pub mean: f64,
    /// Bessel-corrected window standard deviation at classification time
    pub std_dev: f64,
}

impl Anomaly {
    /// Enrich a sample with the statistics it was judged against
    pub fn from_sample(sample: &Sample, mean: f64, std_dev: f64) -> Self {
        Self {
            value: sample.value,
            timestamp: sample.timestamp,
            mean,
            std_dev,
        }
    }
}
