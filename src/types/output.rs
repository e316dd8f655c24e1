//! Output record types
//!
//! A [`SingleOutput`] is one unit of generated output (a text fragment or a
//! binary chunk) and is never mutated after construction. Producers batch
//! zero or more of them into a [`StreamOutputs`] per push.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Token accounting attached to each output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleOutputMeta {
    pub input_tokens_count: u64,
    pub generated_tokens_count: u64,
}

impl SingleOutputMeta {
    pub const fn new(input_tokens_count: u64, generated_tokens_count: u64) -> Self {
        Self {
            input_tokens_count,
            generated_tokens_count,
        }
    }
}

/// Generated payload: text for chat streams, bytes for audio streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPayload {
    Text(String),
    Bytes(Bytes),
}

impl OutputPayload {
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

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// One chunk of output plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleOutput {
    payload: OutputPayload,
    metadata: SingleOutputMeta,
}

impl SingleOutput {
    pub fn new(payload: OutputPayload, metadata: SingleOutputMeta) -> Self {
        Self { payload, metadata }
    }

    /// Text output with zero token counts.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(OutputPayload::Text(text.into()), SingleOutputMeta::default())
    }

    /// Binary output with zero token counts.
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(OutputPayload::Bytes(bytes.into()), SingleOutputMeta::default())
    }

    pub fn with_metadata(text: impl Into<String>, metadata: SingleOutputMeta) -> Self {
        Self::new(OutputPayload::Text(text.into()), metadata)
    }

    pub fn payload(&self) -> &OutputPayload {
        &self.payload
    }

    pub fn metadata(&self) -> SingleOutputMeta {
        self.metadata
    }

    pub fn into_payload(self) -> OutputPayload {
        self.payload
    }
}

/// Outputs appended together by one producer push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOutputs {
    pub outputs: Vec<SingleOutput>,
}

impl StreamOutputs {
    pub fn new(outputs: Vec<SingleOutput>) -> Self {
        Self { outputs }
    }

    pub fn single(output: SingleOutput) -> Self {
        Self {
            outputs: vec![output],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SingleOutput> {
        self.outputs.iter()
    }
}

impl From<SingleOutput> for StreamOutputs {
    fn from(output: SingleOutput) -> Self {
        Self::single(output)
    }
}

impl IntoIterator for StreamOutputs {
    type Item = SingleOutput;
    type IntoIter = std::vec::IntoIter<SingleOutput>;

    fn into_iter(self) -> Self::IntoIter {
        self.outputs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_exposes_bytes() {
        let out = SingleOutput::text("héllo");
        assert_eq!(out.payload().as_text(), Some("héllo"));
        assert_eq!(out.payload().as_bytes(), "héllo".as_bytes());
        assert_eq!(out.metadata(), SingleOutputMeta::default());
    }

    #[test]
    fn binary_payload_has_no_text_view() {
        let out = SingleOutput::bytes(vec![0u8, 1, 2]);
        assert!(out.payload().as_text().is_none());
        assert_eq!(out.payload().as_bytes(), &[0, 1, 2]);
    }
}
