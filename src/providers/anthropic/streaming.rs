//! Anthropic SSE event conversion
//!
//! Event mapping:
//! - `message_start`: publish `message.id`, remember the input token count
//! - `content_block_delta` with a text delta: one text output
//! - `message_delta`: one empty output carrying the token counts
//! - `error`: fail the stream
//! - `message_stop`: end of stream; a body that ends without it fails

use super::transformers::{Usage, error_status};
use crate::error::{GatewayError, Result};
use crate::streaming::sse::{SseAction, SseEventConverter};
use crate::types::{SingleOutput, SingleOutputMeta, StreamOutputs};
use eventsource_stream::Event;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StreamEvent {
    r#type: String,
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    id: String,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, rename = "type")]
    error_type: String,
    #[serde(default)]
    message: String,
}

/// Converts Messages API stream events into producer actions.
#[derive(Debug, Default)]
pub struct AnthropicEventConverter {
    input_tokens: u64,
}

impl AnthropicEventConverter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SseEventConverter for AnthropicEventConverter {
    fn convert_event(&mut self, event: &Event) -> Result<Vec<SseAction>> {
        let parsed: StreamEvent = serde_json::from_str(&event.data)
            .map_err(|e| GatewayError::ParseError(format!("invalid Anthropic event: {e}")))?;

        match parsed.r#type.as_str() {
            "message_start" => {
                let message = parsed.message.ok_or_else(|| {
                    GatewayError::ParseError("message_start without a message".into())
                })?;
                self.input_tokens = message.usage.input_tokens;
                Ok(vec![SseAction::AssignId(message.id)])
            }
            "content_block_delta" => Ok(parsed
                .delta
                .and_then(|delta| delta.text)
                .map(|text| vec![SseAction::Emit(SingleOutput::text(text).into())])
                .unwrap_or_default()),
            "message_delta" => {
                let generated = parsed.usage.map_or(0, |usage| usage.output_tokens);
                let counts = SingleOutputMeta::new(self.input_tokens, generated);
                Ok(vec![SseAction::Emit(StreamOutputs::single(
                    SingleOutput::with_metadata("", counts),
                ))])
            }
            "error" => {
                let error = parsed.error.unwrap_or(ErrorBody {
                    error_type: String::new(),
                    message: "unknown streaming error".into(),
                });
                Err(GatewayError::upstream(
                    error_status(&error.error_type),
                    error.message,
                ))
            }
            "message_stop" => Ok(vec![SseAction::Finish]),
            // ping, content_block_start, content_block_stop
            _ => Ok(Vec::new()),
        }
    }

    fn handle_eof(&mut self) -> Result<()> {
        Err(GatewayError::StreamError(
            "stream ended before message_stop".into(),
        ))
    }
}
