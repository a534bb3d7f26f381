//! In-memory [`AppendLog`] used by tests and ephemeral runs.
//!
//! Offsets are record indices. Writes or reads on a channel can be switched
//! to fail to exercise storage-failure paths.

use crate::{validate_record, AppendLog, Offset, ReadBatch, Record};
use async_trait::async_trait;
use sentinel_core::{types::Channel, ReadError, WriteError};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    channels: HashMap<Channel, Vec<String>>,
    failing_writes: HashSet<Channel>,
    failing_reads: HashSet<Channel>,
}

fn toggle(set: &mut HashSet<Channel>, channel: Channel, on: bool) {
    if on {
        set.insert(channel);
    } else {
        set.remove(&channel);
    }
}

/// Volatile append log
#[derive(Debug, Default)]
pub struct MemoryAppendLog {
    inner: RwLock<Inner>,
}

impl MemoryAppendLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append to `channel` fail (or succeed again)
    pub fn set_failing(&self, channel: Channel, failing: bool) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        toggle(&mut inner.failing_writes, channel, failing);
    }

    /// Make every subsequent read of `channel` (including `end_offset`) fail
    pub fn set_read_failing(&self, channel: Channel, failing: bool) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        toggle(&mut inner.failing_reads, channel, failing);
    }

    fn check_readable(inner: &Inner, channel: Channel) -> Result<(), ReadError> {
        if inner.failing_reads.contains(&channel) {
            return Err(ReadError::LogUnavailable {
                channel,
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated read failure"),
            });
        }
        Ok(())
    }

    /// Number of records stored in `channel`
    pub fn len(&self, channel: Channel) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.channels.get(&channel).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, channel: Channel) -> bool {
        self.len(channel) == 0
    }
}

#[async_trait]
impl AppendLog for MemoryAppendLog {
    async fn append(&self, channel: Channel, record: &str) -> Result<Offset, WriteError> {
        validate_record(channel, record)?;

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.failing_writes.contains(&channel) {
            return Err(WriteError::StorageFailure {
                channel,
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated storage failure"),
            });
        }

        let records = inner.channels.entry(channel).or_default();
        records.push(record.to_string());
        Ok(Offset(records.len() as u64))
    }

    async fn read_from(&self, channel: Channel, from: Offset) -> Result<ReadBatch, ReadError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Self::check_readable(&inner, channel)?;
        let records = inner.channels.get(&channel).map(Vec::as_slice).unwrap_or(&[]);

        let start = (from.0 as usize).min(records.len());
        Ok(ReadBatch {
            records: records[start..]
                .iter()
                .enumerate()
                .map(|(i, line)| Record::new(Offset((start + i) as u64), line.as_bytes()))
                .collect(),
            next: Offset(records.len() as u64),
        })
    }

    async fn end_offset(&self, channel: Channel) -> Result<Offset, ReadError> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Self::check_readable(&inner, channel)?;
        Ok(Offset(inner.channels.get(&channel).map_or(0, Vec::len) as u64))
    }

    async fn health_check(&self) -> Result<(), ReadError> {
        Ok(())
    }
}
