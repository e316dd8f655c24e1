//! SSE decoding for streaming providers
//!
//! Provider converters turn each server-sent event into zero or more
//! [`SseAction`]s; [`pump_sse`] feeds the resulting actions into a
//! [`StreamProducer`]. Line buffering and UTF-8 boundaries are handled by
//! `eventsource-stream`.

use super::producer::StreamProducer;
use crate::error::{GatewayError, Result};
use crate::types::StreamOutputs;
use eventsource_stream::{Event, Eventsource};
use futures::Stream;
use futures_util::StreamExt;

/// What a decoded event asks the producer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseAction {
    /// Publish the provider-assigned request id.
    AssignId(String),
    Emit(StreamOutputs),
    /// The provider signalled the end of the stream.
    Finish,
}

/// Convert provider-specific SSE events into [`SseAction`]s.
pub trait SseEventConverter: Send {
    /// Convert one event. Errors end the stream as failed.
    fn convert_event(&mut self, event: &Event) -> Result<Vec<SseAction>>;

    /// Actions for the `[DONE]` marker used by OpenAI-style streams.
    fn handle_stream_end(&mut self) -> Vec<SseAction> {
        vec![SseAction::Finish]
    }

    /// Called when the body ends before any `Finish` action.
    fn handle_eof(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Drive an HTTP response body through `converter` into `producer`.
pub async fn pump_sse<C>(
    response: reqwest::Response,
    converter: C,
    producer: &mut StreamProducer,
) -> Result<()>
where
    C: SseEventConverter,
{
    pump_sse_bytes(response.bytes_stream(), converter, producer).await
}

/// Same as [`pump_sse`] over any byte stream.
pub async fn pump_sse_bytes<S, B, E, C>(
    bytes: S,
    mut converter: C,
    producer: &mut StreamProducer,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    C: SseEventConverter,
{
    let mut events = Box::pin(bytes.eventsource());
    while let Some(event) = events.next().await {
        let event =
            event.map_err(|e| GatewayError::StreamError(format!("SSE parsing error: {e}")))?;
        let data = event.data.trim();
        if data.is_empty() {
            continue;
        }
        let actions = if data == "[DONE]" {
            converter.handle_stream_end()
        } else {
            converter.convert_event(&event)?
        };
        if apply(actions, producer)? {
            return Ok(());
        }
    }
    converter.handle_eof()
}

/// Returns `true` once a `Finish` action was applied.
fn apply(actions: Vec<SseAction>, producer: &mut StreamProducer) -> Result<bool> {
    for action in actions {
        match action {
            SseAction::AssignId(id) => producer.assign_request_id(id)?,
            SseAction::Emit(outputs) => producer.push(outputs)?,
            SseAction::Finish => return Ok(true),
        }
    }
    Ok(false)
}
