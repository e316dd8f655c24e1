//! infergate
//!
//! Provider-agnostic inference gateway: a uniform adapter contract over
//! hosted model APIs, and an in-process stream broker that decouples a
//! streaming producer from the consumer polling its output.
#![deny(unsafe_code)]

pub mod error;
pub mod gateway;
pub mod params;
pub mod providers;
pub mod retry;
pub mod streaming;
pub mod telemetry;
pub mod types;

pub use error::{GatewayError, Result};

/// Commonly used items.
pub mod prelude {
    pub use crate::error::{GatewayError, Result};
    pub use crate::gateway::{Gateway, GatewayConfig};
    pub use crate::params::ProviderParams;
    pub use crate::providers::{Provider, ProviderKind};
    pub use crate::streaming::{
        BrokerConfig, PollOptions, ReadOutcome, StreamBroker, StreamEntry, StreamTermination,
        collect, into_stream,
    };
    pub use crate::types::{
        ChatMessage, ChatOutcome, ChatRequest, Content, Instruction, RawInstruction,
        StreamHandle,
    };
}
