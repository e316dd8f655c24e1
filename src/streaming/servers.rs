//! Broker instances by output modality

use super::broker::{BrokerConfig, StreamBroker};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Name of the broker carrying text-token streams.
pub const TEXT_STREAM_SERVER: &str = "BLOCK_VLLM_STREAM_SERVER";
/// Name of the broker carrying binary (audio) streams.
pub const BINARY_STREAM_SERVER: &str = "BlockBinaryStreamServer";

/// The text and binary brokers, created once by the service root and
/// shared with every adapter.
#[derive(Debug, Clone)]
pub struct StreamServers {
    text: Arc<StreamBroker>,
    binary: Arc<StreamBroker>,
}

impl Default for StreamServers {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl StreamServers {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            text: Arc::new(StreamBroker::with_config(TEXT_STREAM_SERVER, config)),
            binary: Arc::new(StreamBroker::with_config(BINARY_STREAM_SERVER, config)),
        }
    }

    pub fn text(&self) -> &Arc<StreamBroker> {
        &self.text
    }

    pub fn binary(&self) -> &Arc<StreamBroker> {
        &self.binary
    }

    /// Resolve the `stream_server` name of a handback.
    pub fn get(&self, name: &str) -> Option<Arc<StreamBroker>> {
        [&self.text, &self.binary]
            .into_iter()
            .find(|broker| broker.name() == name)
            .cloned()
    }

    /// Start a reaper for each broker.
    pub fn spawn_reapers(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            self.text.clone().spawn_reaper(cancel.child_token()),
            self.binary.clone().spawn_reaper(cancel.child_token()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brokers_resolve_by_name() {
        let servers = StreamServers::default();
        let text = servers.get(TEXT_STREAM_SERVER).expect("text broker");
        assert!(Arc::ptr_eq(&text, servers.text()));
        let binary = servers.get(BINARY_STREAM_SERVER).expect("binary broker");
        assert!(Arc::ptr_eq(&binary, servers.binary()));
        assert!(servers.get("other").is_none());
    }

    #[test]
    fn brokers_are_independent() {
        let servers = StreamServers::default();
        servers.text().mark_done("same-id");
        assert!(!servers.binary().contains("same-id"));
    }
}
