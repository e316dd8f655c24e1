//! Streaming Module
//!
//! The stream broker and everything around it:
//! - per-request channels and their entry/termination types
//! - the broker registry and its reaper
//! - the text/binary broker pair
//! - the producer handshake used by adapters
//! - polling helpers for consumers
//! - SSE decoding shared by providers

mod broker;
mod channel;
pub mod consumer;
mod producer;
mod servers;
pub mod sse;

pub use broker::{BrokerConfig, StreamBroker};
pub use channel::{ChannelInfo, RUNNING_SENTINEL, ReadOutcome, StreamEntry, StreamTermination};
pub use consumer::{CollectedOutput, EntryStream, PollOptions, collect, into_stream};
pub use producer::{HandshakeConfig, StreamProducer, launch_stream};
pub use servers::{BINARY_STREAM_SERVER, StreamServers, TEXT_STREAM_SERVER};
