//! Ingest pipeline: classify, persist, remember anomalies.
//!
//! Every sample is classified by the sliding-window detector and appended to
//! the `data` channel. Flagged samples are first appended to the `anomalies`
//! channel and the in-memory anomaly list.
//!
//! Ingests are fully serialized: the detector lock is held from
//! classification until the data append completes, so the window, the
//! anomaly list and both logs all observe samples in the same order.
//!
//! Throughput and failure counts are emitted through the `metrics` facade;
//! [`Pipeline::stats`] only reports window state the facade cannot.

use sentinel_core::{
    events::{Anomaly, Sample},
    types::Channel,
    ReadError, WriteError,
};
use sentinel_detection::{
    detectors::{DetectionConfig, SlidingWindowDetector},
    DetectorStats,
};
use sentinel_storage::{append_json, replay_json, AppendLog, Offset};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};

/// Failure to ingest one sample
#[derive(Debug, Error)]
pub enum IngestError {
    /// The sample was rejected before touching any state
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// A log append failed; the call did not complete
    #[error("Write failed: {0}")]
    WriteFailed(#[from] WriteError),
}

/// Successful ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestAck {
    /// The anomaly recorded for this sample, if it was flagged
    pub anomaly: Option<Anomaly>,
    /// Position just past the sample in the data log
    pub data_offset: u64,
}

/// Snapshot of detector state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub window_len: usize,
    pub window_size: usize,
    /// Anomalies held in memory since startup
    pub anomalies_listed: usize,
    pub detector: DetectorStats,
}

/// Detection pipeline shared by every ingest request
#[derive(Debug)]
pub struct Pipeline {
    detector: Mutex<SlidingWindowDetector>,
    anomalies: RwLock<Vec<Anomaly>>,
    log: Arc<dyn AppendLog>,
}

impl Pipeline {
    /// Create a pipeline writing to `log`
    pub fn new(config: DetectionConfig, log: Arc<dyn AppendLog>) -> sentinel_core::Result<Self> {
        let detector = SlidingWindowDetector::new(config)?;

        info!(
            window_size = detector.config().window_size,
            threshold_multiplier = detector.config().threshold_multiplier,
            "Creating detection pipeline"
        );

        Ok(Self {
            detector: Mutex::new(detector),
            anomalies: RwLock::new(Vec::new()),
            log,
        })
    }

    /// The log this pipeline writes to
    pub fn log(&self) -> Arc<dyn AppendLog> {
        self.log.clone()
    }

    /// Classify and persist one sample.
    ///
    /// Returns once the data append is durable. If the sample is flagged and
    /// the anomaly append fails, the call fails and the sample is not written
    /// to the data log either. The window has already absorbed the value at
    /// that point.
    #[instrument(skip(self), fields(value = sample.value, timestamp = sample.timestamp))]
    pub async fn ingest(&self, sample: Sample) -> Result<IngestAck, IngestError> {
        if let Err(e) = sample.validate() {
            metrics::counter!("sentinel_samples_rejected_total").increment(1);
            return Err(IngestError::InvalidSample(e.to_string()));
        }

        let start = Instant::now();
        let mut detector = self.detector.lock().await;
        let classification = detector.classify(sample.value);
        metrics::gauge!("sentinel_window_fill").set(detector.window_len() as f64);

        let anomaly = match (classification.is_anomaly, classification.mean, classification.std_dev) {
            (true, Some(mean), Some(std_dev)) => Some(Anomaly::from_sample(&sample, mean, std_dev)),
            _ => None,
        };

        if let Some(anomaly) = &anomaly {
            if let Err(e) = append_json(self.log.as_ref(), Channel::Anomalies, anomaly).await {
                metrics::counter!("sentinel_storage_errors_total", "channel" => Channel::Anomalies.as_str())
                    .increment(1);
                error!(error = %e, "Failed to persist anomaly");
                return Err(e.into());
            }
            self.anomalies.write().await.push(*anomaly);
            metrics::counter!("sentinel_anomalies_detected_total").increment(1);

            info!(
                value = anomaly.value,
                timestamp = anomaly.timestamp,
                mean = anomaly.mean,
                std_dev = anomaly.std_dev,
                "Anomaly detected"
            );
        }

        let data_offset = match append_json(self.log.as_ref(), Channel::Data, &sample).await {
            Ok(offset) => offset,
            Err(e) => {
                metrics::counter!("sentinel_storage_errors_total", "channel" => Channel::Data.as_str())
                    .increment(1);
                error!(error = %e, "Failed to persist sample");
                return Err(e.into());
            }
        };
        drop(detector);

        metrics::counter!("sentinel_samples_ingested_total").increment(1);
        metrics::histogram!("sentinel_ingest_duration_seconds").record(start.elapsed().as_secs_f64());
        debug!(offset = %data_offset, "Sample ingested");

        Ok(IngestAck {
            anomaly,
            data_offset: data_offset.as_u64(),
        })
    }

    /// Anomalies recorded since startup, in the order they were flagged
    pub async fn list_anomalies(&self) -> Vec<Anomaly> {
        self.anomalies.read().await.clone()
    }

    /// Every anomaly in the persisted log, replayed from the beginning
    pub async fn read_anomaly_log(&self) -> Result<Vec<Anomaly>, ReadError> {
        replay_json(self.log.as_ref(), Channel::Anomalies).await
    }

    /// Every sample in the persisted data log
    pub async fn read_data_log(&self) -> Result<Vec<Sample>, ReadError> {
        replay_json(self.log.as_ref(), Channel::Data).await
    }

    /// Offset just past the newest record of `channel`
    pub async fn end_offset(&self, channel: Channel) -> Result<Offset, ReadError> {
        self.log.end_offset(channel).await
    }

    pub async fn stats(&self) -> PipelineStats {
        let detector = self.detector.lock().await;
        PipelineStats {
            anomalies_listed: self.anomalies.read().await.len(),
            window_len: detector.window_len(),
            window_size: detector.config().window_size,
            detector: detector.stats(),
        }
    }
}
