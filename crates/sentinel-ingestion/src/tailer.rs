//! Live tailing of append-only logs.
//!
//! Each subscription owns an independent cursor positioned at the end of the
//! channel at the moment it subscribed, so it sees only records appended
//! afterwards. The cursor is polled; when a poll finds nothing the loop waits
//! one poll interval before trying again. Read failures are logged and
//! retried after the same interval and never end the stream. Records that
//! are not valid UTF-8 are skipped.
//!
//! A stream ends when it is dropped (the subscriber went away) or when the
//! shutdown signal fires.

use futures::stream::{self, BoxStream, StreamExt};
use sentinel_core::types::Channel;
use sentinel_storage::{AppendLog, LogReader, Record};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Stream of raw records from one channel
pub type RecordStream = BoxStream<'static, String>;

/// Turns append-only channels into live record streams
#[derive(Debug, Clone)]
pub struct LogTailer {
    log: Arc<dyn AppendLog>,
    poll_interval: Duration,
    shutdown: Option<watch::Receiver<bool>>,
    active: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl LogTailer {
    /// Create a tailer polling `log` every `poll_interval` when idle
    pub fn new(log: Arc<dyn AppendLog>, poll_interval: Duration) -> Self {
        Self {
            log,
            poll_interval,
            shutdown: None,
            active: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// End every stream once `shutdown` becomes `true` or its sender is dropped
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Streams currently attached
    pub fn active_subscribers(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Subscribe to every record appended to `channel` from now on
    pub async fn subscribe(&self, channel: Channel) -> RecordStream {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Pin the attach point now; if the log can't be reached yet the
        // stream keeps retrying and attaches at the end once it can.
        let reader = match LogReader::open_at_end(self.log.clone(), channel).await {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!(subscriber = id, channel = %channel, error = %e, "Could not locate end of log, will retry");
                None
            }
        };

        let state = Subscription::new(self, id, channel, reader);
        info!(
            subscriber = id,
            channel = %channel,
            offset = ?state.reader.as_ref().map(|r| r.offset().as_u64()),
            active = self.active_subscribers(),
            "Subscriber attached"
        );

        stream::unfold(state, |mut state| async move {
            let record = state.next_record().await?;
            Some((record, state))
        })
        .boxed()
    }

    /// Subscribe and decode each record as `T`, skipping records that fail to decode
    pub async fn subscribe_json<T>(&self, channel: Channel) -> BoxStream<'static, T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.subscribe(channel)
            .await
            .filter_map(move |record| async move {
                match serde_json::from_str::<T>(&record) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Skipping undecodable record");
                        None
                    }
                }
            })
            .boxed()
    }
}

/// Per-subscriber tailing state; dropping it detaches the subscriber
struct Subscription {
    id: u64,
    channel: Channel,
    log: Arc<dyn AppendLog>,
    reader: Option<LogReader>,
    pending: VecDeque<Record>,
    poll_interval: Duration,
    shutdown: Option<watch::Receiver<bool>>,
    active: Arc<AtomicUsize>,
    delivered: u64,
    closed: bool,
}

impl Subscription {
    fn new(tailer: &LogTailer, id: u64, channel: Channel, reader: Option<LogReader>) -> Self {
        tailer.active.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            channel,
            log: tailer.log.clone(),
            reader,
            pending: VecDeque::new(),
            poll_interval: tailer.poll_interval,
            shutdown: tailer.shutdown.clone(),
            active: tailer.active.clone(),
            delivered: 0,
            closed: false,
        }
    }

    /// Next record, or `None` once shutdown was signalled
    async fn next_record(&mut self) -> Option<String> {
        loop {
            if self.is_shutdown() {
                debug!(subscriber = self.id, channel = %self.channel, "Shutdown observed, ending stream");
                return None;
            }

            if let Some(record) = self.pending.pop_front() {
                match String::from_utf8(record.data) {
                    Ok(line) => {
                        self.delivered += 1;
                        return Some(line);
                    }
                    Err(e) => {
                        warn!(
                            subscriber = self.id,
                            channel = %self.channel,
                            offset = record.offset.as_u64(),
                            error = %e.utf8_error(),
                            "Skipping record that is not valid UTF-8"
                        );
                        continue;
                    }
                }
            }

            if self.reader.is_none() {
                match LogReader::open_at_end(self.log.clone(), self.channel).await {
                    Ok(reader) => {
                        debug!(subscriber = self.id, channel = %self.channel, "Attached after retry");
                        self.reader = Some(reader);
                    }
                    Err(e) => {
                        warn!(subscriber = self.id, channel = %self.channel, error = %e, "Log unavailable, retrying");
                        self.wait().await;
                        continue;
                    }
                }
            }

            let result = match self.reader.as_mut() {
                Some(reader) => reader.read_available().await,
                None => continue,
            };

            match result {
                Ok((records, offset)) if !records.is_empty() => {
                    debug!(
                        subscriber = self.id,
                        channel = %self.channel,
                        count = records.len(),
                        offset = offset.as_u64(),
                        "New records"
                    );
                    self.pending.extend(records);
                }
                Ok(_) => self.wait().await,
                Err(e) => {
                    warn!(subscriber = self.id, channel = %self.channel, error = %e, "Tail read failed, retrying");
                    self.wait().await;
                }
            }
        }
    }

    fn is_shutdown(&self) -> bool {
        self.closed || self.shutdown.as_ref().map_or(false, |rx| *rx.borrow())
    }

    /// Sleep one poll interval, waking early on shutdown
    async fn wait(&mut self) {
        match self.shutdown.as_mut() {
            Some(rx) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = rx.changed() => {
                        // Sender gone counts as shutdown
                        if changed.is_err() {
                            self.closed = true;
                        }
                    }
                }
            }
            None => tokio::time::sleep(self.poll_interval).await,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        info!(
            subscriber = self.id,
            channel = %self.channel,
            delivered = self.delivered,
            "Subscriber detached"
        );
    }
}
