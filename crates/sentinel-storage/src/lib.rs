//! # Sentinel Storage
//!
//! Append-only record logs for sentinel.
//!
//! This crate provides:
//! - The [`AppendLog`] trait: atomic appends, offset-addressed reads
//! - A file backend writing newline-delimited JSON ([`FileAppendLog`])
//! - An in-memory backend for tests and ephemeral runs ([`MemoryAppendLog`])
//! - [`LogReader`], a cursor that only ever yields complete records

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod file;
pub mod memory;
pub mod reader;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sentinel_core::{types::Channel, CorruptRecord, ReadError, WriteError};
use std::fmt;

pub use file::FileAppendLog;
pub use memory::MemoryAppendLog;
pub use reader::LogReader;

/// Opaque position in a channel. `Offset::START` is the beginning of every log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(pub u64);

impl Offset {
    /// Beginning of a log
    pub const START: Offset = Offset(0);

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored line, without its terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Position of the first byte of the record
    pub offset: Offset,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(offset: Offset, data: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            data: data.into(),
        }
    }

    /// The record as text; stored bytes are not guaranteed to be UTF-8
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.data)
    }
}

/// Complete records read from a channel and the position just past them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBatch {
    pub records: Vec<Record>,
    pub next: Offset,
}

impl ReadBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Durable, ordered, append-only record sequences addressed by channel.
///
/// Implementations must guarantee:
/// - appends to one channel are linearized and never interleave
/// - readers never observe a partially written record
/// - a channel that was never written reads as empty at `Offset::START`
#[async_trait]
pub trait AppendLog: Send + Sync + fmt::Debug {
    /// Atomically append one record, returning the offset just past it
    async fn append(&self, channel: Channel, record: &str) -> Result<Offset, WriteError>;

    /// Every complete record at or after `from`
    async fn read_from(&self, channel: Channel, from: Offset) -> Result<ReadBatch, ReadError>;

    /// Offset just past the last completed append
    async fn end_offset(&self, channel: Channel) -> Result<Offset, ReadError>;

    /// Backend health check
    async fn health_check(&self) -> Result<(), ReadError>;
}

/// Serialize a value as one log line and append it
pub async fn append_json<T>(
    log: &dyn AppendLog,
    channel: Channel,
    value: &T,
) -> Result<Offset, WriteError>
where
    T: Serialize + Sync,
{
    let record = serde_json::to_string(value).map_err(|e| WriteError::InvalidRecord {
        channel,
        reason: e.to_string(),
    })?;
    log.append(channel, &record).await
}

/// Replay a whole channel from the beginning, decoding each record
pub async fn replay_json<T>(log: &dyn AppendLog, channel: Channel) -> Result<Vec<T>, ReadError>
where
    T: DeserializeOwned,
{
    let batch = log.read_from(channel, Offset::START).await?;
    decode_records(channel, &batch.records)
}

/// Decode each record as JSON; the first undecodable record fails the whole call
pub fn decode_records<T>(channel: Channel, records: &[Record]) -> Result<Vec<T>, ReadError>
where
    T: DeserializeOwned,
{
    records
        .iter()
        .map(|record| {
            let corrupt = |source: CorruptRecord| ReadError::Corrupt {
                channel,
                offset: record.offset.as_u64(),
                source,
            };
            let line = record.text().map_err(|e| corrupt(e.into()))?;
            serde_json::from_str(line).map_err(|e| corrupt(e.into()))
        })
        .collect()
}

pub(crate) fn validate_record(channel: Channel, record: &str) -> Result<(), WriteError> {
    if record.contains('\n') || record.contains('\r') {
        return Err(WriteError::InvalidRecord {
            channel,
            reason: "record must not contain line breaks".to_string(),
        });
    }
    if record.trim().is_empty() {
        return Err(WriteError::InvalidRecord {
            channel,
            reason: "record must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        append_json, replay_json, AppendLog, FileAppendLog, LogReader, MemoryAppendLog, Offset,
        ReadBatch, Record,
    };
}
