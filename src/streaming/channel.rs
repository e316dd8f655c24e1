//! Per-request stream channel
//!
//! A channel is an ordered queue of [`StreamEntry`] values plus a terminal
//! state that moves from open to finished exactly once. It is owned by a
//! [`StreamBroker`](super::StreamBroker); callers never hold one directly.

use crate::types::{SingleOutput, StreamOutputs};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;

/// Wire name of the liveness sentinel.
pub const RUNNING_SENTINEL: &str = "RUNNING";

/// One queued item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEntry {
    /// The producer has started; no useful output yet.
    Running,
    Outputs(StreamOutputs),
}

impl StreamEntry {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn outputs(&self) -> Option<&StreamOutputs> {
        match self {
            Self::Outputs(outputs) => Some(outputs),
            Self::Running => None,
        }
    }
}

impl From<StreamOutputs> for StreamEntry {
    fn from(outputs: StreamOutputs) -> Self {
        Self::Outputs(outputs)
    }
}

impl From<SingleOutput> for StreamEntry {
    fn from(output: SingleOutput) -> Self {
        Self::Outputs(output.into())
    }
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTermination {
    Completed,
    Failed { reason: String },
}

impl StreamTermination {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Entry(StreamEntry),
    /// Drained, producer still open; back off and retry.
    Empty,
    /// Drained and terminal.
    Finished(StreamTermination),
    /// No channel registered under this id.
    Unknown,
}

/// Point-in-time view of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub pending: usize,
    pub termination: Option<StreamTermination>,
    pub has_producer: bool,
}

#[derive(Debug)]
struct ChannelState {
    queue: VecDeque<StreamEntry>,
    termination: Option<StreamTermination>,
    finished_at: Option<Instant>,
    last_activity: Instant,
    producer: Option<AbortHandle>,
}

#[derive(Debug)]
pub(crate) struct StreamChannel {
    request_id: String,
    created_at: DateTime<Utc>,
    state: Mutex<ChannelState>,
}

impl StreamChannel {
    pub(crate) fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            created_at: Utc::now(),
            state: Mutex::new(ChannelState {
                queue: VecDeque::new(),
                termination: None,
                finished_at: None,
                last_activity: Instant::now(),
                producer: None,
            }),
        }
    }

    // A panic while holding the lock cannot leave the queue half-written,
    // so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry. Returns `false` if the channel already finished.
    pub(crate) fn push(&self, entry: StreamEntry) -> bool {
        let mut state = self.lock();
        if state.termination.is_some() {
            return false;
        }
        state.queue.push_back(entry);
        state.last_activity = Instant::now();
        true
    }

    /// Move to a terminal state. Returns `false` if one was already set.
    pub(crate) fn finish(&self, termination: StreamTermination) -> bool {
        let mut state = self.lock();
        if state.termination.is_some() {
            return false;
        }
        let now = Instant::now();
        state.termination = Some(termination);
        state.finished_at = Some(now);
        state.last_activity = now;
        true
    }

    pub(crate) fn pop(&self) -> ReadOutcome {
        let mut state = self.lock();
        if let Some(entry) = state.queue.pop_front() {
            state.last_activity = Instant::now();
            return ReadOutcome::Entry(entry);
        }
        match &state.termination {
            Some(termination) => ReadOutcome::Finished(termination.clone()),
            None => ReadOutcome::Empty,
        }
    }

    pub(crate) fn attach_producer(&self, handle: AbortHandle) {
        let mut state = self.lock();
        if let Some(previous) = state.producer.replace(handle) {
            previous.abort();
        }
    }

    /// Seal a channel that is leaving the registry.
    ///
    /// Writers still holding it see a finished channel, so late appends and
    /// terminal marks are dropped instead of reaching a reader.
    pub(crate) fn close(&self, reason: &str) {
        self.finish(StreamTermination::Failed {
            reason: reason.to_string(),
        });
        self.abort_producer();
    }

    /// Abort the producer task, if one is attached.
    pub(crate) fn abort_producer(&self) {
        if let Some(handle) = self.lock().producer.take() {
            handle.abort();
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.lock().termination.is_some()
    }

    pub(crate) fn is_expired(&self, now: Instant, finished_ttl: Duration, idle_ttl: Duration) -> bool {
        let state = self.lock();
        match state.finished_at {
            Some(finished_at) => now.saturating_duration_since(finished_at) >= finished_ttl,
            None => now.saturating_duration_since(state.last_activity) >= idle_ttl,
        }
    }

    pub(crate) fn info(&self) -> ChannelInfo {
        let state = self.lock();
        ChannelInfo {
            request_id: self.request_id.clone(),
            created_at: self.created_at,
            pending: state.queue.len(),
            termination: state.termination.clone(),
            has_producer: state.producer.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SingleOutput;

    fn text(s: &str) -> StreamEntry {
        StreamEntry::Outputs(SingleOutput::text(s).into())
    }

    #[test]
    fn entries_pop_in_append_order_then_terminal() {
        let channel = StreamChannel::new("r");
        assert!(channel.push(text("a")));
        assert!(channel.push(text("b")));
        assert_eq!(channel.pop(), ReadOutcome::Entry(text("a")));
        assert!(channel.finish(StreamTermination::Completed));
        assert_eq!(channel.pop(), ReadOutcome::Entry(text("b")));
        assert_eq!(
            channel.pop(),
            ReadOutcome::Finished(StreamTermination::Completed)
        );
    }

    #[test]
    fn first_terminal_state_wins() {
        let channel = StreamChannel::new("r");
        assert!(channel.finish(StreamTermination::Failed {
            reason: "boom".into()
        }));
        assert!(!channel.finish(StreamTermination::Completed));
        assert!(!channel.push(text("late")));
        assert_eq!(
            channel.pop(),
            ReadOutcome::Finished(StreamTermination::Failed {
                reason: "boom".into()
            })
        );
    }

    #[test]
    fn closed_channel_rejects_writes() {
        let channel = StreamChannel::new("r");
        channel.close("gone");
        assert!(!channel.push(text("late")));
        assert!(!channel.finish(StreamTermination::Completed));
    }

    #[test]
    fn open_channel_expires_only_after_idle_ttl() {
        let channel = StreamChannel::new("r");
        let now = Instant::now();
        let ttl = Duration::from_secs(60);
        assert!(!channel.is_expired(now, ttl, ttl));
        assert!(channel.is_expired(now + ttl, Duration::MAX, ttl));
    }
}
