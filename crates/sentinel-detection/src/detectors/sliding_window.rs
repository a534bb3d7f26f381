//! Trailing-window mean + k·σ detector.
//!
//! # Detection Method
//! Every value is pushed into a FIFO window of the last `window_size`
//! values, flagged or not. Once the window is full, the value is anomalous
//! when it is strictly greater than `mean + k * std_dev`, where both
//! statistics are computed over the window *including* the value itself.
//! Until then every value is classified as normal.

use crate::{detectors::DetectionConfig, stats::RollingWindow, DetectorStats};
use sentinel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of classifying one value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub is_anomaly: bool,
    /// Window mean, absent while the window is still filling
    pub mean: Option<f64>,
    /// Window sample standard deviation, absent while the window is still filling
    pub std_dev: Option<f64>,
}

impl Classification {
    fn insufficient_data() -> Self {
        Self {
            is_anomaly: false,
            mean: None,
            std_dev: None,
        }
    }
}

/// Sliding-window detector. Not internally synchronized; callers serialize access.
#[derive(Debug, Clone)]
pub struct SlidingWindowDetector {
    config: DetectionConfig,
    window: RollingWindow,
    stats: DetectorStats,
}

impl SlidingWindowDetector {
    /// Create a detector. The window must hold at least two values.
    pub fn new(config: DetectionConfig) -> Result<Self> {
        if config.window_size < 2 {
            return Err(Error::config(format!(
                "window_size must be at least 2 for a sample standard deviation, got {}",
                config.window_size
            )));
        }
        if !config.threshold_multiplier.is_finite() {
            return Err(Error::config("threshold_multiplier must be finite"));
        }

        Ok(Self {
            window: RollingWindow::new(config.window_size),
            config,
            stats: DetectorStats::default(),
        })
    }

    /// Push `value` into the window and classify it against the updated window
    pub fn classify(&mut self, value: f64) -> Classification {
        self.window.push(value);
        self.stats.samples_processed += 1;

        if self.window.len() < self.config.window_size {
            debug!(
                window_len = self.window.len(),
                window_size = self.config.window_size,
                "Insufficient samples for classification"
            );
            return Classification::insufficient_data();
        }

        let mean = self.window.mean();
        let std_dev = self.window.std_dev();
        let threshold = mean + self.config.threshold_multiplier * std_dev;
        let is_anomaly = value > threshold;

        if is_anomaly {
            self.stats.anomalies_detected += 1;
        }

        debug!(value, mean, std_dev, threshold, is_anomaly, "Value classified");

        Classification {
            is_anomaly,
            mean: Some(mean),
            std_dev: Some(std_dev),
        }
    }

    /// Number of values currently in the window
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Current window contents, oldest first
    pub fn window_values(&self) -> Vec<f64> {
        self.window.to_vec()
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats.clone()
    }
}
