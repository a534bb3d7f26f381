//! Newline-delimited JSON files, one per channel.
//!
//! Appends to a channel are serialized by a per-channel async mutex and
//! written as a single buffer ending in `\n`. Readers only consume bytes up
//! to the last newline, so a write in progress is never observed.
//!
//! A failed write is truncated back to where the append started. Once the
//! full line has landed it may already have been read, so a later fsync
//! failure is reported without touching the file.

use crate::{validate_record, AppendLog, Offset, ReadBatch, Record};
use async_trait::async_trait;
use sentinel_core::{config::StorageConfig, types::Channel, ReadError, WriteError};
use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Per-channel file state
#[derive(Debug)]
struct ChannelFile {
    path: PathBuf,
    /// Held for the duration of every append
    write_lock: Mutex<()>,
}

/// File-backed [`AppendLog`]
#[derive(Debug)]
pub struct FileAppendLog {
    channels: HashMap<Channel, ChannelFile>,
    data_dir: PathBuf,
    fsync: bool,
    #[cfg(test)]
    fail_sync: bool,
}

impl FileAppendLog {
    /// Create a log with the file layout from `config`. Files are created on first append.
    pub fn new(config: &StorageConfig) -> Self {
        let channels = Channel::ALL
            .iter()
            .map(|&channel| {
                (
                    channel,
                    ChannelFile {
                        path: config.path_for(channel),
                        write_lock: Mutex::new(()),
                    },
                )
            })
            .collect();

        Self {
            channels,
            data_dir: config.data_dir.clone(),
            fsync: config.fsync,
            #[cfg(test)]
            fail_sync: false,
        }
    }

    /// Create a log rooted at `dir` with default file names
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let config = StorageConfig {
            data_dir: dir.as_ref().to_path_buf(),
            ..StorageConfig::default()
        };
        Self::new(&config)
    }

    /// Path of the file backing `channel`
    pub fn path(&self, channel: Channel) -> &Path {
        &self.channel(channel).path
    }

    fn channel(&self, channel: Channel) -> &ChannelFile {
        // Every variant is inserted in `new`
        &self.channels[&channel]
    }

    async fn sync(&self, file: &File) -> std::io::Result<()> {
        #[cfg(test)]
        if self.fail_sync {
            return Err(std::io::Error::new(ErrorKind::Other, "simulated fsync failure"));
        }
        file.sync_data().await
    }
}

#[async_trait]
impl AppendLog for FileAppendLog {
    async fn append(&self, channel: Channel, record: &str) -> Result<Offset, WriteError> {
        validate_record(channel, record)?;

        let state = self.channel(channel);
        let storage_failure = |source| WriteError::StorageFailure { channel, source };

        let mut line = Vec::with_capacity(record.len() + 1);
        line.extend_from_slice(record.as_bytes());
        line.push(b'\n');

        let _guard = state.write_lock.lock().await;

        if let Some(parent) = state.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(storage_failure)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&state.path)
            .await
            .map_err(storage_failure)?;

        let start = file.metadata().await.map_err(storage_failure)?.len();

        // tokio's File completes buffered writes on flush, so both belong to the write
        let written = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            error!(
                channel = %channel,
                path = ?state.path,
                error = %e,
                "Append failed, rolling back partial record"
            );
            // Leave no unterminated bytes that the next append would extend
            if let Err(rollback) = file.set_len(start).await {
                error!(channel = %channel, error = %rollback, "Rollback of partial record failed");
            }
            return Err(storage_failure(e));
        }

        let end = start + line.len() as u64;

        if self.fsync {
            if let Err(e) = self.sync(&file).await {
                // The line is complete and may already have been tailed
                error!(
                    channel = %channel,
                    path = ?state.path,
                    offset = end,
                    error = %e,
                    "fsync failed after append, record kept"
                );
                return Err(storage_failure(e));
            }
        }

        debug!(channel = %channel, offset = end, "Record appended");
        Ok(Offset(end))
    }

    async fn read_from(&self, channel: Channel, from: Offset) -> Result<ReadBatch, ReadError> {
        let path = &self.channel(channel).path;
        let unavailable = |source| ReadError::LogUnavailable { channel, source };

        let mut file = match File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ReadBatch {
                    records: Vec::new(),
                    next: from,
                });
            }
            Err(e) => return Err(unavailable(e)),
        };

        let len = file.metadata().await.map_err(unavailable)?.len();

        let mut start = from.0;
        if len < start {
            warn!(
                channel = %channel,
                offset = start,
                file_len = len,
                "Log shorter than reader offset, restarting from the beginning"
            );
            start = 0;
        }

        if len == start {
            return Ok(ReadBatch {
                records: Vec::new(),
                next: Offset(start),
            });
        }

        file.seek(SeekFrom::Start(start)).await.map_err(unavailable)?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf).await.map_err(unavailable)?;

        Ok(split_complete_lines(&buf, start))
    }

    async fn end_offset(&self, channel: Channel) -> Result<Offset, ReadError> {
        let state = self.channel(channel);
        // No append is in flight while the lock is held
        let _guard = state.write_lock.lock().await;

        match fs::metadata(&state.path).await {
            Ok(meta) => Ok(Offset(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Offset::START),
            Err(source) => Err(ReadError::LogUnavailable { channel, source }),
        }
    }

    async fn health_check(&self) -> Result<(), ReadError> {
        match fs::metadata(&self.data_dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ReadError::LogUnavailable {
                channel: Channel::Data,
                source: std::io::Error::new(
                    ErrorKind::Other,
                    format!("{:?} is not a directory", self.data_dir),
                ),
            }),
            // Created on first append
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ReadError::LogUnavailable {
                channel: Channel::Data,
                source,
            }),
        }
    }
}

/// Split `buf` (read from byte `base`) into complete lines, withholding any
/// trailing bytes that are not yet newline-terminated. Bytes are kept as
/// stored; decoding is left to the caller.
fn split_complete_lines(buf: &[u8], base: u64) -> ReadBatch {
    let complete_len = match buf.iter().rposition(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None => {
            return ReadBatch {
                records: Vec::new(),
                next: Offset(base),
            }
        }
    };

    let mut records = Vec::new();
    let mut line_start = 0usize;
    for line in buf[..complete_len - 1].split(|&b| b == b'\n') {
        let start = line_start;
        line_start += line.len() + 1;

        // Tolerate CRLF and trailing blanks; skip empty lines
        let trimmed = match line.iter().rposition(|b| !b.is_ascii_whitespace()) {
            Some(last) => &line[..=last],
            None => continue,
        };
        records.push(Record::new(Offset(base + start as u64), trimmed));
    }

    ReadBatch {
        records,
        next: Offset(base + complete_len as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_records;
    use sentinel_core::CorruptRecord;
    use std::sync::Arc;

    fn lines(batch: &ReadBatch) -> Vec<&str> {
        batch.records.iter().map(|r| r.text().unwrap()).collect()
    }

    #[test]
    fn test_split_withholds_partial_tail() {
        let batch = split_complete_lines(b"{\"a\":1}\n{\"a\":2}\n{\"a\":", 10);
        assert_eq!(lines(&batch), vec!["{\"a\":1}", "{\"a\":2}"]);
        assert_eq!(batch.next, Offset(10 + 16));

        let none = split_complete_lines(b"{\"a\":", 5);
        assert!(none.records.is_empty());
        assert_eq!(none.next, Offset(5));
    }

    #[test]
    fn test_split_skips_blank_lines() {
        let batch = split_complete_lines(b"\n{\"a\":1}\r\n\n", 0);
        assert_eq!(lines(&batch), vec!["{\"a\":1}"]);
        assert_eq!(batch.next, Offset(11));
    }

    #[test]
    fn test_split_records_carry_their_own_offsets() {
        let batch = split_complete_lines(b"{\"a\":1}\n\n{\"a\":22}\n", 100);
        let offsets: Vec<Offset> = batch.records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![Offset(100), Offset(109)]);
        assert_eq!(batch.next, Offset(118));
    }

    #[test]
    fn test_split_keeps_invalid_utf8_bytes() {
        let batch = split_complete_lines(b"{}\n{\"a\":\"\xff\"}\n", 0);
        assert_eq!(batch.records[1].data, b"{\"a\":\"\xff\"}".to_vec());
        assert!(batch.records[1].text().is_err());
    }

    #[tokio::test]
    async fn test_corrupt_record_reported_at_its_offset() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAppendLog::in_dir(dir.path());
        let first = log.append(Channel::Data, r#"{"value":1.0,"timestamp":1.0}"#).await.unwrap();
        log.append(Channel::Data, r#"{"value":2.0,"timestamp":2.0}"#).await.unwrap();

        // Garbage after two good records, then one invalid UTF-8 line
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(log.path(Channel::Data))
                .unwrap();
            f.write_all(b"\xfe\xff\n").unwrap();
        }
        let bad_offset = std::fs::metadata(log.path(Channel::Data)).unwrap().len() - 3;

        let batch = log.read_from(Channel::Data, Offset::START).await.unwrap();
        assert_eq!(batch.records[1].offset, first);

        let result: Result<Vec<sentinel_core::events::Sample>, _> =
            decode_records(Channel::Data, &batch.records);
        match result {
            Err(ReadError::Corrupt { offset, source: CorruptRecord::Utf8(_), .. }) => {
                assert_eq!(offset, bad_offset)
            }
            other => panic!("expected corrupt UTF-8 record, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fsync_failure_keeps_complete_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = FileAppendLog::in_dir(dir.path());
        let first = log.append(Channel::Data, r#"{"value":1.0}"#).await.unwrap();

        log.fail_sync = true;
        let result = log.append(Channel::Data, r#"{"value":2.0}"#).await;
        assert!(matches!(result, Err(WriteError::StorageFailure { .. })));

        // A tailer may already have delivered the line, so it must stay put
        let batch = log.read_from(Channel::Data, first).await.unwrap();
        assert_eq!(lines(&batch), vec![r#"{"value":2.0}"#]);

        log.fail_sync = false;
        let third = log.append(Channel::Data, r#"{"value":3.0}"#).await.unwrap();
        assert_eq!(log.end_offset(Channel::Data).await.unwrap(), third);

        let content = std::fs::read_to_string(log.path(Channel::Data)).unwrap();
        assert_eq!(content, "{\"value\":1.0}\n{\"value\":2.0}\n{\"value\":3.0}\n");
    }

    #[tokio::test]
    async fn test_missing_channel_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAppendLog::in_dir(dir.path());

        let batch = log.read_from(Channel::Anomalies, Offset::START).await.unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.next, Offset::START);
        assert_eq!(log.end_offset(Channel::Anomalies).await.unwrap(), Offset::START);
        assert!(!log.path(Channel::Anomalies).exists());
    }

    #[tokio::test]
    async fn test_append_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAppendLog::in_dir(dir.path());

        let first = log.append(Channel::Data, r#"{"value":1.0}"#).await.unwrap();
        let second = log.append(Channel::Data, r#"{"value":2.0}"#).await.unwrap();
        assert!(second > first);
        assert_eq!(log.end_offset(Channel::Data).await.unwrap(), second);

        let batch = log.read_from(Channel::Data, Offset::START).await.unwrap();
        assert_eq!(lines(&batch), vec![r#"{"value":1.0}"#, r#"{"value":2.0}"#]);
        assert_eq!(batch.next, second);
        assert_eq!(batch.records[0].offset, Offset::START);
        assert_eq!(batch.records[1].offset, first);

        let tail = log.read_from(Channel::Data, first).await.unwrap();
        assert_eq!(lines(&tail), vec![r#"{"value":2.0}"#]);

        let content = std::fs::read_to_string(log.path(Channel::Data)).unwrap();
        assert_eq!(content, "{\"value\":1.0}\n{\"value\":2.0}\n");
    }

    #[tokio::test]
    async fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAppendLog::in_dir(dir.path().join("nested/logs"));
        log.append(Channel::Anomalies, "{}").await.unwrap();
        assert!(log.path(Channel::Anomalies).exists());
    }

    #[tokio::test]
    async fn test_partial_write_is_withheld() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAppendLog::in_dir(dir.path());
        let end = log.append(Channel::Data, r#"{"value":1.0}"#).await.unwrap();

        // Simulate a writer that has not finished its line yet
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(log.path(Channel::Data))
                .unwrap();
            f.write_all(b"{\"value\":2").unwrap();
        }

        let batch = log.read_from(Channel::Data, end).await.unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.next, end);

        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(log.path(Channel::Data))
                .unwrap();
            f.write_all(b".0}\n").unwrap();
        }

        let batch = log.read_from(Channel::Data, end).await.unwrap();
        assert_eq!(lines(&batch), vec![r#"{"value":2.0}"#]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(FileAppendLog::in_dir(dir.path()));

        let mut handles = Vec::new();
        for writer in 0..8 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let record = format!(r#"{{"writer":{},"seq":{},"pad":"{}"}}"#, writer, i, "x".repeat(64));
                    log.append(Channel::Data, &record).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let batch = log.read_from(Channel::Data, Offset::START).await.unwrap();
        assert_eq!(batch.records.len(), 200);
        for record in lines(&batch) {
            let parsed: serde_json::Value = serde_json::from_str(record).unwrap();
            assert!(parsed["writer"].is_u64());
        }

        // Per-writer order is preserved
        for writer in 0..8u64 {
            let seqs: Vec<u64> = lines(&batch)
                .into_iter()
                .map(|r| serde_json::from_str::<serde_json::Value>(r).unwrap())
                .filter(|v| v["writer"] == writer)
                .map(|v| v["seq"].as_u64().unwrap())
                .collect();
            assert_eq!(seqs, (0..25).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_rejects_multiline_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAppendLog::in_dir(dir.path());
        let result = log.append(Channel::Data, "{\n}").await;
        assert!(matches!(result, Err(WriteError::InvalidRecord { .. })));
        assert!(!log.path(Channel::Data).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwritable_directory_is_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let log = FileAppendLog::in_dir(&blocker);
        let result = log.append(Channel::Data, "{}").await;
        assert!(matches!(result, Err(WriteError::StorageFailure { .. })));
        assert!(log.health_check().await.is_err());
    }
}
