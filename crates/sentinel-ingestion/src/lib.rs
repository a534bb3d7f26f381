//! # Sentinel Ingestion
//!
//! Moves samples through detection into the append logs and back out again.
//!
//! - [`pipeline`]: validate, classify, persist, and cache detected anomalies
//! - [`tailer`]: live subscriptions that follow a channel as it grows
//! - [`generator`]: synthetic sample producer with pluggable sinks

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod generator;
pub mod pipeline;
pub mod tailer;

pub use generator::{HttpSink, PipelineSink, SampleGenerator, SampleSink, SinkError};
pub use pipeline::{IngestAck, IngestError, Pipeline, PipelineStats};
pub use tailer::{LogTailer, RecordStream};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::generator::{SampleGenerator, SampleSink};
    pub use crate::pipeline::{IngestAck, IngestError, Pipeline};
    pub use crate::tailer::LogTailer;
}
