//! Anthropic Messages API adapter
//!
//! Non-streaming calls return the concatenated text blocks with token usage.
//! Streaming calls hand back a handle on the text broker keyed by the
//! provider's message id.

mod config;
mod streaming;
mod transformers;

pub use config::{
    ClaudeConfig, DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_MODEL,
};
pub use streaming::AnthropicEventConverter;

use super::Provider;
use super::http;
use crate::error::Result;
use crate::params::ProviderParams;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::streaming::sse::pump_sse;
use crate::streaming::{HandshakeConfig, StreamBroker, launch_stream};
use crate::types::{ChatOutcome, ChatRequest, ModelMeta};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Instant;

/// Adapter for `POST /v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    config: ClaudeConfig,
    http: reqwest::Client,
    broker: Arc<StreamBroker>,
    retry: RetryExecutor,
}

impl AnthropicProvider {
    /// `broker` receives streaming output; normally the text broker.
    pub fn new(config: ClaudeConfig, broker: Arc<StreamBroker>) -> Result<Self> {
        Ok(Self {
            retry: RetryExecutor::new(RetryPolicy::with_retries(config.max_retries)),
            http: http::build_client()?,
            config,
            broker,
        })
    }

    pub fn from_params(params: &ProviderParams, broker: Arc<StreamBroker>) -> Result<Self> {
        Self::new(ClaudeConfig::from_params(params)?, broker)
    }

    /// Replace the retry policy, e.g. to shorten delays.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn config(&self) -> &ClaudeConfig {
        &self.config
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        http::insert_header(&mut headers, "x-api-key", self.config.api_key.expose_secret())?;
        http::insert_header(
            &mut headers,
            "anthropic-version",
            &self.config.anthropic_version,
        )?;
        Ok(headers)
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        let body = transformers::build_request_body(&self.config, request, false);
        let headers = self.headers()?;
        let url = self.config.messages_url();
        let started = Instant::now();

        let response = self
            .retry
            .execute(|| {
                http::send(
                    self.http
                        .post(&url)
                        .headers(headers.clone())
                        .json(&body),
                )
            })
            .await?;
        let text = response.text().await?;
        let (content, metadata) =
            transformers::parse_response(&text, started.elapsed().as_secs_f64())?;
        tracing::debug!(
            request_id = %metadata.request_id,
            input_tokens = metadata.input_tokens_count,
            output_tokens = metadata.generated_tokens_count,
            "anthropic call completed"
        );
        Ok(ChatOutcome::Complete { content, metadata })
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        let body = transformers::build_request_body(&self.config, request, true);
        let headers = self.headers()?;
        let url = self.config.messages_url();
        let client = self.http.clone();
        let retry = self.retry.clone();
        let handshake =
            HandshakeConfig::default().with_request_id_timeout(self.config.request_id_timeout);

        let handle = launch_stream(self.broker.clone(), handshake, move |mut producer| async move {
            // Retries only cover the request itself, never a partly read body.
            let response = retry
                .execute(|| http::send(client.post(&url).headers(headers.clone()).json(&body)))
                .await?;
            pump_sse(response, AnthropicEventConverter::new(), &mut producer).await
        })
        .await?;
        tracing::debug!(request_id = %handle.request_id, "anthropic stream started");
        Ok(ChatOutcome::Streaming(handle))
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn provider_id(&self) -> &'static str {
        "anthropic"
    }

    fn meta(&self) -> Vec<ModelMeta> {
        vec![ModelMeta::saas(self.config.model.clone(), true)]
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatOutcome> {
        if request.stream {
            self.stream(&request).await
        } else {
            self.complete(&request).await
        }
    }
}
