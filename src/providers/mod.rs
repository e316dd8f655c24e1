//! Provider adapters
//!
//! Every adapter implements [`Provider`]: a static capability descriptor,
//! input normalization and a single async entry point that either completes
//! the call or hands back a [`StreamHandle`](crate::types::StreamHandle) to
//! poll on one of the brokers.

use crate::error::{GatewayError, Result};
use crate::types::{ChatOutcome, ChatRequest, Instruction, ModelMeta, RawInstruction};
use async_trait::async_trait;
use std::str::FromStr;

pub(crate) mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "azure")]
pub mod azure_tts;

/// A hosted model backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in logs.
    fn provider_id(&self) -> &'static str;

    /// Capability descriptors; pure.
    fn meta(&self) -> Vec<ModelMeta>;

    /// Normalize a caller instruction.
    fn process_input(&self, raw: &RawInstruction) -> Instruction {
        crate::types::process_input(raw)
    }

    /// Run one call.
    ///
    /// With `request.stream` set, returns [`ChatOutcome::Streaming`] as soon
    /// as the provider has assigned a request id; the output keeps arriving
    /// on the broker named in the handle.
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatOutcome>;
}

/// Adapters known to [`Gateway::build_provider`](crate::gateway::Gateway::build_provider).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Anthropic,
    AzureTts,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::AzureTts => "azure_tts",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = GatewayError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Self::Anthropic),
            "azure_tts" | "azure" => Ok(Self::AzureTts),
            other => Err(GatewayError::UnsupportedOperation(format!(
                "unknown provider `{other}`"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
