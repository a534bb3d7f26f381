//! Position-tracking cursor over one channel.

use crate::{AppendLog, Offset, Record};
use sentinel_core::{types::Channel, ReadError};
use std::sync::Arc;

/// A cursor that yields each complete record of a channel exactly once.
///
/// The offset only advances over records that were returned, so a failed
/// read can simply be retried.
#[derive(Debug, Clone)]
pub struct LogReader {
    log: Arc<dyn AppendLog>,
    channel: Channel,
    offset: Offset,
}

impl LogReader {
    /// Open a reader at `from`. Opening never fails; a missing channel reads as empty.
    pub fn open(log: Arc<dyn AppendLog>, channel: Channel, from: Offset) -> Self {
        Self {
            log,
            channel,
            offset: from,
        }
    }

    /// Open a reader positioned after everything appended so far
    pub async fn open_at_end(log: Arc<dyn AppendLog>, channel: Channel) -> Result<Self, ReadError> {
        let end = log.end_offset(channel).await?;
        Ok(Self::open(log, channel, end))
    }

    /// Records appended since the last call, and the new offset
    pub async fn read_available(&mut self) -> Result<(Vec<Record>, Offset), ReadError> {
        let batch = self.log.read_from(self.channel, self.offset).await?;
        self.offset = batch.next;
        Ok((batch.records, self.offset))
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileAppendLog, MemoryAppendLog};

    fn lines(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.text().unwrap()).collect()
    }

    async fn exercise(log: Arc<dyn AppendLog>) {
        log.append(Channel::Data, "one").await.unwrap();

        let mut from_start = LogReader::open(log.clone(), Channel::Data, Offset::START);
        let mut from_end = LogReader::open_at_end(log.clone(), Channel::Data).await.unwrap();

        log.append(Channel::Data, "two").await.unwrap();

        let (records, _) = from_start.read_available().await.unwrap();
        assert_eq!(lines(&records), vec!["one", "two"]);
        let (records, _) = from_end.read_available().await.unwrap();
        assert_eq!(lines(&records), vec!["two"]);

        // Nothing new
        let (records, offset) = from_start.read_available().await.unwrap();
        assert!(records.is_empty());
        assert_eq!(offset, from_start.offset());

        log.append(Channel::Data, "three").await.unwrap();
        let (records, _) = from_end.read_available().await.unwrap();
        assert_eq!(lines(&records), vec!["three"]);
    }

    #[tokio::test]
    async fn test_reader_memory_backend() {
        exercise(Arc::new(MemoryAppendLog::new())).await;
    }

    #[tokio::test]
    async fn test_reader_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        exercise(Arc::new(FileAppendLog::in_dir(dir.path()))).await;
    }

    #[tokio::test]
    async fn test_reader_on_absent_channel() {
        let log: Arc<dyn AppendLog> = Arc::new(MemoryAppendLog::new());
        let mut reader = LogReader::open(log.clone(), Channel::Anomalies, Offset::START);

        let (records, offset) = reader.read_available().await.unwrap();
        assert!(records.is_empty());
        assert_eq!(offset, Offset::START);
        assert_eq!(reader.channel(), Channel::Anomalies);
    }

    #[tokio::test]
    async fn test_failed_read_keeps_position() {
        let log = Arc::new(MemoryAppendLog::new());
        let mut reader = LogReader::open(log.clone(), Channel::Data, Offset::START);
        log.append(Channel::Data, "one").await.unwrap();

        log.set_read_failing(Channel::Data, true);
        assert!(reader.read_available().await.is_err());
        assert_eq!(reader.offset(), Offset::START);

        log.set_read_failing(Channel::Data, false);
        let (records, _) = reader.read_available().await.unwrap();
        assert_eq!(lines(&records), vec!["one"]);
    }
}
