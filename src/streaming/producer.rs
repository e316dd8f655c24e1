//! Producer handshake
//!
//! [`launch_stream`] starts a detached producer task and returns as soon as
//! the producer has published its request id. Provider ids often arrive with
//! the first upstream event, so the caller waits for the id under a timeout
//! instead of generating one up front.
//!
//! The task wrapper owns the terminal transition: when the producer future
//! resolves, the channel is marked done (on `Ok`) or failed with the error
//! text (on `Err`) exactly once.
//!
//! Once its id is assigned a producer writes to the channel it registered,
//! never to the id, so a stream that was abandoned or reaped stays gone.

use super::broker::StreamBroker;
use super::channel::{StreamChannel, StreamEntry, StreamTermination};
use crate::error::{GatewayError, Result};
use crate::types::{SingleOutput, StreamHandle, StreamOutputs};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Timing of the request id handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// How long the caller waits for the producer to publish its id.
    pub request_id_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            request_id_timeout: Duration::from_secs(10),
        }
    }
}

impl HandshakeConfig {
    pub const fn with_request_id_timeout(mut self, timeout: Duration) -> Self {
        self.request_id_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
enum IdState {
    Pending,
    Assigned {
        request_id: String,
        channel: Arc<StreamChannel>,
    },
    Failed(GatewayError),
}

impl IdState {
    fn assigned(&self) -> Option<(&str, &Arc<StreamChannel>)> {
        match self {
            Self::Assigned {
                request_id,
                channel,
            } => Some((request_id.as_str(), channel)),
            _ => None,
        }
    }
}

/// Write side handed to a producer future.
pub struct StreamProducer {
    broker: Arc<StreamBroker>,
    id_tx: Arc<watch::Sender<IdState>>,
    request_id: Option<String>,
    channel: Option<Arc<StreamChannel>>,
}

impl std::fmt::Debug for StreamProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProducer")
            .field("broker", &self.broker.name())
            .field("request_id", &self.request_id)
            .finish()
    }
}

impl StreamProducer {
    /// Publish the request id, unblocking the waiting caller.
    ///
    /// An id can be assigned once; a second, different id is an error.
    pub fn assign_request_id(&mut self, request_id: impl Into<String>) -> Result<()> {
        let request_id = request_id.into();
        if let Some(current) = &self.request_id {
            if *current == request_id {
                return Ok(());
            }
            return Err(GatewayError::InternalError(format!(
                "request id already assigned as `{current}`"
            )));
        }
        let channel = self.broker.open_channel(&request_id);
        let published = IdState::Assigned {
            request_id: request_id.clone(),
            channel: channel.clone(),
        };
        self.id_tx.send_if_modified(move |state| match state {
            IdState::Pending => {
                *state = published;
                true
            }
            _ => false,
        });
        tracing::debug!(broker = %self.broker.name(), request_id = %request_id, "request id assigned");
        self.request_id = Some(request_id);
        self.channel = Some(channel);
        Ok(())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Append outputs under the assigned id.
    ///
    /// Outputs for a stream that already finished or was abandoned are dropped.
    pub fn push(&self, outputs: impl Into<StreamOutputs>) -> Result<()> {
        let (Some(request_id), Some(channel)) = (&self.request_id, &self.channel) else {
            return Err(GatewayError::InternalError(
                "output pushed before a request id was assigned".into(),
            ));
        };
        if !channel.push(StreamEntry::Outputs(outputs.into())) {
            tracing::warn!(
                broker = %self.broker.name(),
                request_id = %request_id,
                "dropping output for a closed stream"
            );
        }
        Ok(())
    }

    pub fn push_text(&self, text: impl Into<String>) -> Result<()> {
        self.push(SingleOutput::text(text))
    }

    /// Append one raw binary chunk.
    pub fn push_bytes(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.push(SingleOutput::bytes(chunk))
    }

    pub fn broker(&self) -> &StreamBroker {
        &self.broker
    }
}

/// Start `produce` as a detached task and wait for its request id.
///
/// On success the `RUNNING` sentinel is registered, the task handle is
/// attached to the channel, and the handle to poll is returned without
/// waiting for the stream to finish. If no id appears within
/// [`HandshakeConfig::request_id_timeout`] the task is aborted, anything it
/// registered is abandoned, and [`GatewayError::RequestIdTimeout`] is
/// returned. A producer that fails before assigning an id reports its error
/// here instead.
pub async fn launch_stream<F, Fut>(
    broker: Arc<StreamBroker>,
    config: HandshakeConfig,
    produce: F,
) -> Result<StreamHandle>
where
    F: FnOnce(StreamProducer) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let (id_tx, mut id_rx) = watch::channel(IdState::Pending);
    let id_tx = Arc::new(id_tx);
    let producer = StreamProducer {
        broker: broker.clone(),
        id_tx: id_tx.clone(),
        request_id: None,
        channel: None,
    };
    let future = produce(producer);

    let task_broker = broker.clone();
    let task_tx = id_tx.clone();
    let task = tokio::spawn(async move {
        let result = future.await;
        let assigned = task_tx
            .borrow()
            .assigned()
            .map(|(id, channel)| (id.to_string(), channel.clone()));
        match (assigned, result) {
            (Some((id, channel)), Ok(())) => {
                if channel.finish(StreamTermination::Completed) {
                    tracing::debug!(broker = %task_broker.name(), request_id = %id, "stream finished");
                }
            }
            (Some((id, channel)), Err(error)) => {
                tracing::warn!(
                    broker = %task_broker.name(),
                    request_id = %id,
                    error = %error,
                    "stream producer failed"
                );
                channel.finish(StreamTermination::Failed {
                    reason: error.to_string(),
                });
            }
            (None, result) => {
                let error = result.err().unwrap_or_else(|| {
                    GatewayError::StreamError(
                        "producer finished without assigning a request id".into(),
                    )
                });
                tracing::warn!(broker = %task_broker.name(), error = %error, "stream producer failed before handshake");
                task_tx.send_replace(IdState::Failed(error));
            }
        }
    });

    let waited = config.request_id_timeout;
    let state = tokio::time::timeout(waited, async {
        id_rx
            .wait_for(|state| !matches!(state, IdState::Pending))
            .await
            .map(|state| IdState::clone(&state))
    })
    .await;

    match state {
        Ok(Ok(IdState::Assigned {
            request_id,
            channel,
        })) => {
            channel.push(StreamEntry::Running);
            channel.attach_producer(task.abort_handle());
            Ok(StreamHandle {
                request_id,
                stream_server: broker.name().to_string(),
            })
        }
        Ok(Ok(IdState::Failed(error))) => Err(error),
        Ok(Ok(IdState::Pending)) | Ok(Err(_)) => Err(GatewayError::InternalError(
            "request id channel closed unexpectedly".into(),
        )),
        Err(_) => {
            task.abort();
            // Wait for the abort to land so no append can race the cleanup.
            let _ = task.await;
            let late_id = id_rx.borrow().assigned().map(|(id, _)| id.to_string());
            if let Some(id) = late_id {
                broker.abandon(&id);
            }
            tracing::warn!(broker = %broker.name(), ?waited, "request id handshake timed out");
            Err(GatewayError::RequestIdTimeout { waited })
        }
    }
}
