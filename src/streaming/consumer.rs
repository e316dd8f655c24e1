//! Consumer helpers
//!
//! The broker only offers non-blocking polls. These helpers wrap the
//! poll-and-back-off loop into a `Stream` and a collector.

use super::broker::StreamBroker;
use super::channel::{ReadOutcome, StreamEntry, StreamTermination};
use crate::error::{GatewayError, Result};
use crate::types::OutputPayload;
use futures::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Stream of entries read from one channel.
pub type EntryStream = Pin<Box<dyn Stream<Item = Result<StreamEntry>> + Send>>;

/// Polling policy for [`into_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Back-off between polls of an empty, open channel.
    pub interval: Duration,
    /// Drop `RUNNING` sentinels instead of yielding them.
    pub skip_running: bool,
    /// Give up if the channel stays empty this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            skip_running: false,
            idle_timeout: None,
        }
    }
}

impl PollOptions {
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub const fn skip_running(mut self, skip: bool) -> Self {
        self.skip_running = skip;
        self
    }

    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }
}

/// Poll `request_id` until it finishes, yielding entries in append order.
///
/// A `Completed` stream ends the iteration; a `Failed` stream yields a
/// [`GatewayError::StreamError`] with the failure reason, and an unknown id
/// yields [`GatewayError::NotFound`].
pub fn into_stream(
    broker: Arc<StreamBroker>,
    request_id: impl Into<String>,
    options: PollOptions,
) -> EntryStream {
    let request_id = request_id.into();
    Box::pin(async_stream::stream! {
        let mut last_progress = Instant::now();
        loop {
            match broker.read(&request_id) {
                ReadOutcome::Entry(entry) => {
                    last_progress = Instant::now();
                    if options.skip_running && entry.is_running() {
                        continue;
                    }
                    yield Ok(entry);
                }
                ReadOutcome::Empty => {
                    if let Some(limit) = options.idle_timeout {
                        if last_progress.elapsed() >= limit {
                            yield Err(GatewayError::StreamError(format!(
                                "no output for `{request_id}` within {limit:?}"
                            )));
                            break;
                        }
                    }
                    tokio::time::sleep(options.interval).await;
                }
                ReadOutcome::Finished(StreamTermination::Completed) => break,
                ReadOutcome::Finished(StreamTermination::Failed { reason }) => {
                    yield Err(GatewayError::StreamError(reason));
                    break;
                }
                ReadOutcome::Unknown => {
                    yield Err(GatewayError::NotFound(format!(
                        "no stream registered under `{request_id}` on `{}`",
                        broker.name()
                    )));
                    break;
                }
            }
        }
    })
}

/// Everything drained from a finished stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedOutput {
    pub text: String,
    pub bytes: Vec<u8>,
    /// Number of data outputs seen (sentinels excluded).
    pub chunks: usize,
    pub saw_running: bool,
    pub input_tokens_count: u64,
    pub generated_tokens_count: u64,
}

/// Drain a stream to completion.
///
/// Token counts keep the last non-zero value reported by the producer.
pub async fn collect(
    broker: Arc<StreamBroker>,
    request_id: impl Into<String>,
    options: PollOptions,
) -> Result<CollectedOutput> {
    let mut stream = into_stream(broker, request_id, options);
    let mut collected = CollectedOutput::default();
    while let Some(entry) = stream.next().await {
        let outputs = match entry? {
            StreamEntry::Running => {
                collected.saw_running = true;
                continue;
            }
            StreamEntry::Outputs(outputs) => outputs,
        };
        for output in outputs {
            let meta = output.metadata();
            if meta.input_tokens_count > 0 {
                collected.input_tokens_count = meta.input_tokens_count;
            }
            if meta.generated_tokens_count > 0 {
                collected.generated_tokens_count = meta.generated_tokens_count;
            }
            match output.into_payload() {
                OutputPayload::Text(text) if text.is_empty() => {}
                OutputPayload::Text(text) => {
                    collected.text.push_str(&text);
                    collected.chunks += 1;
                }
                OutputPayload::Bytes(bytes) => {
                    collected.bytes.extend_from_slice(&bytes);
                    collected.chunks += 1;
                }
            }
        }
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SingleOutput, SingleOutputMeta, StreamOutputs};

    #[tokio::test]
    async fn collect_concatenates_text_and_keeps_usage() {
        let broker = Arc::new(StreamBroker::new("t"));
        broker.register_running("r");
        broker.add_item("r", StreamOutputs::single(SingleOutput::text("Hel")));
        broker.add_item("r", StreamOutputs::single(SingleOutput::text("lo")));
        broker.add_item(
            "r",
            StreamOutputs::single(SingleOutput::with_metadata(
                "",
                SingleOutputMeta::new(7, 2),
            )),
        );
        broker.mark_done("r");

        let out = collect(broker, "r", PollOptions::default()).await.expect("ok");
        assert_eq!(out.text, "Hello");
        assert_eq!(out.chunks, 2);
        assert!(out.saw_running);
        assert_eq!(out.input_tokens_count, 7);
        assert_eq!(out.generated_tokens_count, 2);
    }

    #[tokio::test]
    async fn failed_stream_surfaces_reason() {
        let broker = Arc::new(StreamBroker::new("t"));
        broker.mark_failed("r", "connection reset");
        let err = collect(broker, "r", PollOptions::default())
            .await
            .expect_err("failed");
        assert_eq!(err, GatewayError::StreamError("connection reset".into()));
    }

    #[tokio::test]
    async fn unknown_stream_is_not_found() {
        let broker = Arc::new(StreamBroker::new("t"));
        let err = collect(broker, "missing", PollOptions::default())
            .await
            .expect_err("unknown");
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn idle_timeout_stops_waiting_on_a_stalled_stream() {
        let broker = Arc::new(StreamBroker::new("t"));
        broker.register_running("r");
        let options = PollOptions::default()
            .skip_running(true)
            .with_idle_timeout(Duration::from_millis(30));
        let mut stream = into_stream(broker, "r", options);
        let err = stream.next().await.expect("item").expect_err("stalled");
        assert!(matches!(err, GatewayError::StreamError(_)));
        assert!(stream.next().await.is_none());
    }
}
