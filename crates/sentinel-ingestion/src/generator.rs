//! Synthetic sample producer.
//!
//! Draws a uniform value in `[value_min, value_max)` every `interval_ms`.
//! With probability `anomaly_probability` an integer offset from
//! `[outlier_min, outlier_max]` is added to produce an outlier. Samples are
//! handed to a [`SampleSink`]: either the in-process pipeline or a remote
//! detect endpoint over HTTP.

use crate::pipeline::{IngestError, Pipeline};
use async_trait::async_trait;
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sentinel_core::{config::GeneratorConfig, events::Sample};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Period used when the configured interval is zero
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Failure to deliver a generated sample
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Destination for generated samples
#[async_trait]
pub trait SampleSink: Send + Sync + std::fmt::Debug {
    /// Sink name for logging
    fn name(&self) -> &'static str;

    /// Deliver one sample
    async fn send(&self, sample: Sample) -> Result<(), SinkError>;
}

/// Feeds samples straight into a local [`Pipeline`]
#[derive(Debug, Clone)]
pub struct PipelineSink {
    pipeline: Arc<Pipeline>,
}

impl PipelineSink {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl SampleSink for PipelineSink {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    async fn send(&self, sample: Sample) -> Result<(), SinkError> {
        self.pipeline.ingest(sample).await?;
        Ok(())
    }
}

/// POSTs samples as JSON to a detect endpoint
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SampleSink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, sample: Sample) -> Result<(), SinkError> {
        self.client
            .post(&self.url)
            .json(&sample)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Random sample source
#[derive(Debug)]
pub struct SampleGenerator {
    config: GeneratorConfig,
    rng: StdRng,
}

impl SampleGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for reproducible runs
    pub fn with_seed(config: GeneratorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw the next sample, stamped with the current time
    pub fn next_sample(&mut self) -> Sample {
        let mut value = self.rng.gen_range(self.config.value_min..self.config.value_max);

        let roll: u32 = self.rng.gen_range(0..=100);
        if (roll as f64) < self.config.anomaly_probability * 100.0 {
            let offset = self
                .rng
                .gen_range(self.config.outlier_min..=self.config.outlier_max);
            value += offset as f64;
        }

        Sample::new(value, now_seconds())
    }

    /// Produce samples until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// Delivery failures are logged and the loop carries on. Returns the
    /// number of samples delivered successfully.
    pub async fn run(mut self, sink: Arc<dyn SampleSink>, mut shutdown: watch::Receiver<bool>) -> u64 {
        let period = self.config.interval();
        let period = if period.is_zero() {
            warn!("generator.interval_ms is 0, falling back to {:?}", MIN_INTERVAL);
            MIN_INTERVAL
        } else {
            period
        };
        let mut interval = tokio::time::interval(period);
        let mut delivered = 0u64;

        info!(
            sink = sink.name(),
            interval_ms = self.config.interval_ms,
            anomaly_probability = self.config.anomaly_probability,
            "Sample generator started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let sample = self.next_sample();
            match sink.send(sample).await {
                Ok(()) => {
                    delivered += 1;
                    debug!(value = sample.value, timestamp = sample.timestamp, "Sample delivered");
                }
                Err(e) => {
                    warn!(sink = sink.name(), error = %e, "Failed to deliver sample");
                }
            }
        }

        info!(delivered, "Sample generator stopped");
        delivered
    }
}

/// Current time as fractional seconds since the Unix epoch
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_detection::detectors::DetectionConfig;
    use sentinel_storage::MemoryAppendLog;
    use std::time::Duration;

    #[test]
    fn test_values_within_normal_range_without_outliers() {
        let config = GeneratorConfig {
            anomaly_probability: 0.0,
            ..GeneratorConfig::default()
        };
        let mut generator = SampleGenerator::with_seed(config, 7);
        for _ in 0..500 {
            let sample = generator.next_sample();
            assert!((40.0..50.0).contains(&sample.value), "{}", sample.value);
            assert!(sample.timestamp > 1_600_000_000.0);
        }
    }

    #[test]
    fn test_outliers_are_offset() {
        let config = GeneratorConfig {
            anomaly_probability: 1.0,
            ..GeneratorConfig::default()
        };
        let mut generator = SampleGenerator::with_seed(config, 7);
        let mut outliers = 0;
        for _ in 0..500 {
            let sample = generator.next_sample();
            assert!(sample.value >= 40.0 && sample.value < 70.0);
            if sample.value >= 50.0 {
                outliers += 1;
            }
        }
        // A roll of exactly 100 is the only way to escape the offset
        assert!(outliers > 480);
    }

    #[tokio::test]
    async fn test_run_feeds_pipeline_until_shutdown() {
        let log = Arc::new(MemoryAppendLog::new());
        let pipeline = Arc::new(Pipeline::new(DetectionConfig::default(), log.clone()).unwrap());
        let sink: Arc<dyn SampleSink> = Arc::new(PipelineSink::new(pipeline.clone()));

        let config = GeneratorConfig {
            interval_ms: 5,
            ..GeneratorConfig::default()
        };
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(SampleGenerator::with_seed(config, 1).run(sink, rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(delivered > 0);
        assert_eq!(
            log.len(sentinel_core::types::Channel::Data) as u64,
            delivered
        );
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_panic() {
        let log = Arc::new(MemoryAppendLog::new());
        let pipeline = Arc::new(Pipeline::new(DetectionConfig::default(), log.clone()).unwrap());
        let sink: Arc<dyn SampleSink> = Arc::new(PipelineSink::new(pipeline));

        let config = GeneratorConfig {
            interval_ms: 0,
            ..GeneratorConfig::default()
        };
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(SampleGenerator::with_seed(config, 3).run(sink, rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(delivered > 0);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_run() {
        #[derive(Debug)]
        struct Failing;

        #[async_trait]
        impl SampleSink for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }

            async fn send(&self, _sample: Sample) -> Result<(), SinkError> {
                Err(SinkError::Ingest(IngestError::InvalidSample("nope".to_string())))
            }
        }

        let config = GeneratorConfig {
            interval_ms: 5,
            ..GeneratorConfig::default()
        };
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(SampleGenerator::with_seed(config, 1).run(Arc::new(Failing), rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(tx);

        let delivered = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered, 0);
    }
}
