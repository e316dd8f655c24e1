//! Unified chat request

use super::message::{ChatMessage, RawInstruction};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request accepted by [`Provider::stream_chat`](crate::providers::Provider::stream_chat).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub instruction: RawInstruction,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub max_length: u32,
    pub top_p: f32,
    pub temperature: f32,
    #[serde(default)]
    pub stream: bool,
    /// Provider-specific extras; unknown keys are ignored by adapters.
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl ChatRequest {
    pub fn new(instruction: impl Into<RawInstruction>) -> Self {
        Self {
            instruction: instruction.into(),
            history: Vec::new(),
            max_length: 1024,
            top_p: 0.9,
            temperature: 0.1,
            stream: false,
            options: Map::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// History followed by the instruction as a final user turn.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(self.instruction.clone()));
        messages
    }
}
