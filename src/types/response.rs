//! Result shapes handed back by adapters

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Metadata of a completed (non-streaming) call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub request_id: String,
    pub input_tokens_count: u64,
    pub generated_tokens_count: u64,
    /// Wall-clock seconds spent on the call.
    pub time_cost: f64,
    pub first_token_time: f64,
    /// Generated tokens per second.
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResponseMetadata {
    /// Throughput in tokens per second; `0.0` when no time elapsed.
    pub fn speed(generated_tokens_count: u64, time_cost: f64) -> f64 {
        if time_cost > 0.0 && time_cost.is_finite() {
            generated_tokens_count as f64 / time_cost
        } else {
            0.0
        }
    }

    /// Metadata with `speed` derived from the token count and elapsed time.
    pub fn completed(
        request_id: impl Into<String>,
        input_tokens_count: u64,
        generated_tokens_count: u64,
        time_cost: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            input_tokens_count,
            generated_tokens_count,
            time_cost,
            first_token_time: 0.0,
            speed: Self::speed(generated_tokens_count, time_cost),
            stop_reason: None,
            mime_type: None,
        }
    }

    pub fn with_stop_reason(mut self, stop_reason: Option<String>) -> Self {
        self.stop_reason = stop_reason;
        self
    }

    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }
}

/// Completed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Bytes(Bytes),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

/// Where to poll for a streaming call's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamHandle {
    pub request_id: String,
    /// Name of the broker instance holding the channel.
    pub stream_server: String,
}

/// Result of [`Provider::stream_chat`](crate::providers::Provider::stream_chat).
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    Complete {
        content: Content,
        metadata: ResponseMetadata,
    },
    /// The call returned before completion; drain the broker named in the handle.
    Streaming(StreamHandle),
}

impl ChatOutcome {
    pub fn stream_handle(&self) -> Option<&StreamHandle> {
        match self {
            Self::Streaming(handle) => Some(handle),
            Self::Complete { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&Content> {
        match self {
            Self::Complete { content, .. } => Some(content),
            Self::Streaming(_) => None,
        }
    }

    /// The `{"metadata": {...}}` object of the wire handback.
    ///
    /// Streaming handbacks carry an empty content string alongside it.
    pub fn handback_metadata(&self) -> Value {
        match self {
            Self::Complete { metadata, .. } => json!({ "metadata": metadata }),
            Self::Streaming(handle) => json!({ "metadata": handle }),
        }
    }
}
