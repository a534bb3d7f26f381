//! # Sentinel Detection
//!
//! Statistical anomaly detection over a trailing window of sample values.
//!
//! - [`stats`]: mean, Bessel-corrected standard deviation, rolling window
//! - [`detectors`]: the sliding-window `mean + k·σ` detector

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod detectors;
pub mod stats;

use serde::{Deserialize, Serialize};

/// Running counters kept by a detector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    /// Values classified (including those seen while the window filled)
    pub samples_processed: u64,
    /// Values flagged as anomalous
    pub anomalies_detected: u64,
}

impl DetectorStats {
    /// Fraction of processed samples that were flagged
    pub fn anomaly_rate(&self) -> f64 {
        if self.samples_processed == 0 {
            0.0
        } else {
            self.anomalies_detected as f64 / self.samples_processed as f64
        }
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::detectors::{Classification, DetectionConfig, SlidingWindowDetector};
    pub use crate::DetectorStats;
}
