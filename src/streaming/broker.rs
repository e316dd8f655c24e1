//! Stream broker
//!
//! A [`StreamBroker`] maps request ids to stream channels. Producers append
//! with [`add_item`](StreamBroker::add_item) and finish with
//! [`mark_done`](StreamBroker::mark_done) or
//! [`mark_failed`](StreamBroker::mark_failed); consumers poll with
//! [`read`](StreamBroker::read). Every operation is internally synchronized:
//! the registry sits behind an `RwLock` and each channel has its own mutex,
//! so appends to different ids never contend on the same lock for long.
//!
//! Channels are created implicitly on first write and removed either
//! explicitly through [`abandon`](StreamBroker::abandon) or by the TTL reaper.
//!
//! ```rust
//! use infergate::streaming::{ReadOutcome, StreamBroker, StreamTermination};
//! use infergate::types::{SingleOutput, StreamOutputs};
//!
//! let broker = StreamBroker::new("text");
//! broker.add_item("req-1", StreamOutputs::single(SingleOutput::text("hi")));
//! broker.mark_done("req-1");
//!
//! assert!(matches!(broker.read("req-1"), ReadOutcome::Entry(_)));
//! assert_eq!(
//!     broker.read("req-1"),
//!     ReadOutcome::Finished(StreamTermination::Completed)
//! );
//! ```

use super::channel::{ChannelInfo, ReadOutcome, StreamChannel, StreamEntry, StreamTermination};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

const ABANDONED: &str = "stream abandoned";

/// Reclamation settings for a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// How long a finished channel stays readable.
    pub finished_ttl: Duration,
    /// How long an open channel may go without appends or reads.
    pub idle_ttl: Duration,
    /// Period of the background reaper.
    pub reap_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            finished_ttl: Duration::from_secs(5 * 60),
            idle_ttl: Duration::from_secs(30 * 60),
            reap_interval: Duration::from_secs(30),
        }
    }
}

impl BrokerConfig {
    pub const fn with_finished_ttl(mut self, ttl: Duration) -> Self {
        self.finished_ttl = ttl;
        self
    }

    pub const fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    pub const fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }
}

/// Registry of in-flight streams for one output modality.
#[derive(Debug)]
pub struct StreamBroker {
    name: String,
    config: BrokerConfig,
    channels: RwLock<HashMap<String, Arc<StreamChannel>>>,
}

static_assertions::assert_impl_all!(StreamBroker: Send, Sync);

impl StreamBroker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, BrokerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: BrokerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Instance name, reported to callers as `stream_server`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn get(&self, request_id: &str) -> Option<Arc<StreamChannel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request_id)
            .cloned()
    }

    fn get_or_create(&self, request_id: &str) -> Arc<StreamChannel> {
        if let Some(channel) = self.get(request_id) {
            return channel;
        }
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(request_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(broker = %self.name, request_id, "registering stream channel");
                Arc::new(StreamChannel::new(request_id))
            })
            .clone()
    }

    /// Channel for `request_id`, registering it if needed.
    pub(crate) fn open_channel(&self, request_id: &str) -> Arc<StreamChannel> {
        self.get_or_create(request_id)
    }

    /// Append an entry, creating the channel if needed.
    ///
    /// Appends after the channel finished are dropped.
    pub fn add_item(&self, request_id: &str, entry: impl Into<StreamEntry>) {
        let channel = self.get_or_create(request_id);
        if !channel.push(entry.into()) {
            tracing::warn!(
                broker = %self.name,
                request_id,
                "dropping entry appended after stream finished"
            );
        }
    }

    /// Append the `RUNNING` sentinel unless the stream already finished.
    ///
    /// Returns whether the sentinel was queued.
    pub fn register_running(&self, request_id: &str) -> bool {
        self.get_or_create(request_id).push(StreamEntry::Running)
    }

    /// Mark the stream completed. Idempotent.
    pub fn mark_done(&self, request_id: &str) {
        self.finish(request_id, StreamTermination::Completed);
    }

    /// Mark the stream failed. No effect if it already finished.
    pub fn mark_failed(&self, request_id: &str, reason: impl Into<String>) {
        self.finish(
            request_id,
            StreamTermination::Failed {
                reason: reason.into(),
            },
        );
    }

    /// Apply a terminal state. Returns `true` only for the first transition.
    pub fn finish(&self, request_id: &str, termination: StreamTermination) -> bool {
        let transitioned = self.get_or_create(request_id).finish(termination);
        if transitioned {
            tracing::debug!(broker = %self.name, request_id, "stream finished");
        }
        transitioned
    }

    /// Pop the next entry for `request_id`.
    pub fn read(&self, request_id: &str) -> ReadOutcome {
        match self.get(request_id) {
            Some(channel) => channel.pop(),
            None => ReadOutcome::Unknown,
        }
    }

    /// Hand ownership of the producer task to the channel.
    ///
    /// Returns `false` if no channel is registered under `request_id`.
    pub fn attach_task(&self, request_id: &str, handle: AbortHandle) -> bool {
        match self.get(request_id) {
            Some(channel) => {
                channel.attach_producer(handle);
                true
            }
            None => false,
        }
    }

    /// Remove a channel and abort its producer.
    pub fn abandon(&self, request_id: &str) -> bool {
        let removed = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_id);
        match removed {
            Some(channel) => {
                channel.close(ABANDONED);
                tracing::debug!(broker = %self.name, request_id, "stream abandoned");
                true
            }
            None => false,
        }
    }

    /// Remove every expired channel. Returns how many were removed.
    pub fn reap_expired(&self) -> usize {
        self.reap_at(Instant::now())
    }

    fn reap_at(&self, now: Instant) -> usize {
        let BrokerConfig {
            finished_ttl,
            idle_ttl,
            ..
        } = self.config;
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = channels
            .iter()
            .filter(|(_, channel)| channel.is_expired(now, finished_ttl, idle_ttl))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(channel) = channels.remove(id) {
                if !channel.is_finished() {
                    tracing::warn!(broker = %self.name, request_id = %id, "reaping idle stream");
                }
                channel.close(ABANDONED);
            }
        }
        if !expired.is_empty() {
            tracing::debug!(broker = %self.name, reaped = expired.len(), "reaped streams");
        }
        expired.len()
    }

    /// Run [`reap_expired`](Self::reap_expired) periodically until `cancel` fires.
    pub fn spawn_reaper(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let period = self.config.reap_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.reap_expired();
                    }
                }
            }
        })
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.get(request_id).is_some()
    }

    pub fn snapshot(&self, request_id: &str) -> Option<ChannelInfo> {
        self.get(request_id).map(|channel| channel.info())
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SingleOutput, StreamOutputs};

    fn text(s: &str) -> StreamOutputs {
        StreamOutputs::single(SingleOutput::text(s))
    }

    #[test]
    fn unknown_id_reads_as_unknown() {
        let broker = StreamBroker::new("t");
        assert_eq!(broker.read("nope"), ReadOutcome::Unknown);
        assert!(!broker.contains("nope"));
    }

    #[test]
    fn open_and_drained_reads_as_empty() {
        let broker = StreamBroker::new("t");
        broker.add_item("r", text("a"));
        assert!(matches!(broker.read("r"), ReadOutcome::Entry(_)));
        assert_eq!(broker.read("r"), ReadOutcome::Empty);
    }

    #[test]
    fn mark_done_without_data_is_a_valid_terminal_state() {
        let broker = StreamBroker::new("t");
        broker.mark_done("r");
        assert_eq!(
            broker.read("r"),
            ReadOutcome::Finished(StreamTermination::Completed)
        );
    }

    #[test]
    fn mark_done_is_idempotent() {
        let broker = StreamBroker::new("t");
        broker.add_item("r", text("a"));
        broker.mark_done("r");
        broker.mark_done("r");
        assert!(matches!(broker.read("r"), ReadOutcome::Entry(_)));
        for _ in 0..3 {
            assert_eq!(
                broker.read("r"),
                ReadOutcome::Finished(StreamTermination::Completed)
            );
        }
    }

    #[test]
    fn failure_is_not_overwritten_by_done() {
        let broker = StreamBroker::new("t");
        broker.mark_failed("r", "upstream 500");
        broker.mark_done("r");
        assert_eq!(
            broker.read("r"),
            ReadOutcome::Finished(StreamTermination::Failed {
                reason: "upstream 500".into()
            })
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn appends_after_done_are_dropped_and_logged() {
        let broker = StreamBroker::new("t");
        broker.mark_done("r");
        broker.add_item("r", text("late"));
        assert!(!broker.register_running("r"));
        assert_eq!(
            broker.read("r"),
            ReadOutcome::Finished(StreamTermination::Completed)
        );
        assert!(logs_contain("dropping entry appended after stream finished"));
    }

    #[test]
    fn reap_removes_finished_and_idle_channels() {
        let config = BrokerConfig::default()
            .with_finished_ttl(Duration::from_secs(1))
            .with_idle_ttl(Duration::from_secs(10));
        let broker = StreamBroker::with_config("t", config);
        broker.add_item("open", text("a"));
        broker.mark_done("done");

        let now = Instant::now();
        assert_eq!(broker.reap_at(now), 0);
        assert_eq!(broker.reap_at(now + Duration::from_secs(2)), 1);
        assert!(broker.contains("open"));
        assert!(!broker.contains("done"));
        assert_eq!(broker.reap_at(now + Duration::from_secs(11)), 1);
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn abandon_aborts_the_producer_task() {
        let broker = StreamBroker::new("t");
        broker.register_running("r");
        let task = tokio::spawn(std::future::pending::<()>());
        assert!(broker.attach_task("r", task.abort_handle()));
        assert!(broker.snapshot("r").expect("registered").has_producer);

        assert!(broker.abandon("r"));
        assert!(task.await.expect_err("aborted").is_cancelled());
        assert_eq!(broker.read("r"), ReadOutcome::Unknown);
        assert!(!broker.abandon("r"));
    }

    #[tokio::test]
    async fn reaper_stops_on_cancel() {
        let broker = Arc::new(StreamBroker::with_config(
            "t",
            BrokerConfig::default().with_reap_interval(Duration::from_millis(5)),
        ));
        let cancel = CancellationToken::new();
        let reaper = broker.clone().spawn_reaper(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), reaper)
            .await
            .expect("reaper exits")
            .expect("no panic");
    }
}
