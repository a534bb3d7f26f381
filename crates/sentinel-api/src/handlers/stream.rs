//! Live server-sent event streams over the logs.
//!
//! Each connection gets its own subscription, attached at the end of the
//! channel when the request arrives. Closing the connection drops the
//! stream, which detaches the subscriber before its next poll.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{BoxStream, Stream, StreamExt};
use sentinel_core::{
    events::{Anomaly, Sample},
    types::Channel,
};
use serde::Serialize;
use std::time::Duration;
use tracing::instrument;

use crate::AppState;

/// GET /stream_data
#[instrument(skip_all)]
pub async fn stream_data(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let records = state.tailer.subscribe_json::<Sample>(Channel::Data).await;
    event_stream(records, state.keep_alive)
}

/// GET /stream_anomalies
#[instrument(skip_all)]
pub async fn stream_anomalies(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let records = state.tailer.subscribe_json::<Anomaly>(Channel::Anomalies).await;
    event_stream(records, state.keep_alive)
}

fn event_stream<T>(
    records: BoxStream<'static, T>,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    T: Serialize + Send + 'static,
{
    let events = records.map(|record| Event::default().json_data(record));

    Sse::new(events).keep_alive(KeepAlive::new().interval(keep_alive).text("ping"))
}
