//! Anomaly detection implementations.

pub mod sliding_window;

use sentinel_core::config::DetectionSettings;
use serde::{Deserialize, Serialize};

pub use sliding_window::{Classification, SlidingWindowDetector};

/// Common detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Values the statistics are computed over; classification starts once the window is full
    pub window_size: usize,
    /// Standard deviations above the mean a value must exceed to be anomalous
    pub threshold_multiplier: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::from(&DetectionSettings::default())
    }
}

impl From<&DetectionSettings> for DetectionConfig {
    fn from(settings: &DetectionSettings) -> Self {
        Self {
            window_size: settings.window_size,
            threshold_multiplier: settings.threshold_multiplier,
        }
    }
}
