//! Service root
//!
//! Owns the two stream brokers, their reapers, and builds adapters wired to
//! the right broker.
//!
//! ```rust,no_run
//! use infergate::gateway::{Gateway, GatewayConfig};
//! use infergate::params::{self, ProviderParams};
//! use infergate::types::ChatRequest;
//!
//! # async fn run() -> infergate::Result<()> {
//! let gateway = Gateway::new(GatewayConfig::default())?;
//! let claude = gateway.build_provider(
//!     "claude",
//!     &ProviderParams::new().with(params::API_KEY, "sk-..."),
//! )?;
//! let outcome = claude.stream_chat(ChatRequest::new("Hello").with_stream(true)).await?;
//! let handle = outcome.stream_handle().expect("streaming call");
//! let broker = gateway.broker(&handle.stream_server).expect("known broker");
//! # let _ = broker;
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::error::{GatewayError, Result};
use crate::params::ProviderParams;
use crate::providers::{Provider, ProviderKind};
use crate::streaming::{BrokerConfig, StreamBroker, StreamServers};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    pub broker: BrokerConfig,
    /// Start a TTL reaper per broker.
    pub spawn_reapers: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            spawn_reapers: true,
        }
    }
}

impl GatewayConfig {
    pub const fn with_broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }

    pub const fn with_reapers(mut self, spawn_reapers: bool) -> Self {
        self.spawn_reapers = spawn_reapers;
        self
    }
}

/// Process-wide gateway state.
#[derive(Debug)]
pub struct Gateway {
    servers: StreamServers,
    cancel: CancellationToken,
    reapers: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Create the brokers and, if configured, their reapers.
    ///
    /// Reapers need a running Tokio runtime; without one this fails.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let servers = StreamServers::new(config.broker);
        let cancel = CancellationToken::new();
        let reapers = if config.spawn_reapers {
            tokio::runtime::Handle::try_current().map_err(|_| {
                GatewayError::ConfigurationError(
                    "broker reapers require a running Tokio runtime".into(),
                )
            })?;
            servers.spawn_reapers(&cancel)
        } else {
            Vec::new()
        };
        tracing::info!(reapers = reapers.len(), "gateway started");
        Ok(Self {
            servers,
            cancel,
            reapers,
        })
    }

    /// Build an adapter by name (`claude`/`anthropic`, `azure_tts`/`azure`).
    pub fn build_provider(&self, kind: &str, params: &ProviderParams) -> Result<Arc<dyn Provider>> {
        self.build(kind.parse()?, params)
    }

    pub fn build(&self, kind: ProviderKind, params: &ProviderParams) -> Result<Arc<dyn Provider>> {
        let provider: Arc<dyn Provider> = match kind {
            #[cfg(feature = "anthropic")]
            ProviderKind::Anthropic => Arc::new(crate::providers::anthropic::AnthropicProvider::from_params(
                params,
                self.servers.text().clone(),
            )?),
            #[cfg(feature = "azure")]
            ProviderKind::AzureTts => Arc::new(crate::providers::azure_tts::AzureTtsProvider::from_params(
                params,
                self.servers.binary().clone(),
            )?),
            #[allow(unreachable_patterns)]
            other => {
                return Err(GatewayError::UnsupportedOperation(format!(
                    "provider `{other}` is not enabled in this build"
                )));
            }
        };
        tracing::debug!(provider = provider.provider_id(), "provider built");
        Ok(provider)
    }

    /// Broker by its wire name, as found in a [`StreamHandle`](crate::types::StreamHandle).
    pub fn broker(&self, name: &str) -> Option<Arc<StreamBroker>> {
        self.servers.get(name)
    }

    pub fn servers(&self) -> &StreamServers {
        &self.servers
    }

    /// Stop the reapers and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for reaper in std::mem::take(&mut self.reapers) {
            let _ = reaper.await;
        }
        tracing::info!("gateway stopped");
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
