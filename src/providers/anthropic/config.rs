//! Anthropic adapter configuration

use crate::error::Result;
use crate::params::{self, ProviderParams, validation_error};
use secrecy::SecretString;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_REQUEST_ID_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for [`AnthropicProvider`](super::AnthropicProvider).
#[derive(Debug, Clone, Validate)]
pub struct ClaudeConfig {
    pub api_key: SecretString,
    #[validate(length(min = 1))]
    pub model: String,
    #[validate(url)]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub anthropic_version: String,
    #[validate(range(max = 50))]
    pub max_retries: u32,
    pub request_id_timeout: Duration,
}

impl ClaudeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            anthropic_version: DEFAULT_API_VERSION.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_id_timeout: DEFAULT_REQUEST_ID_TIMEOUT,
        }
    }

    /// Read the `saas.*` keys; only `saas.api_key` is required.
    pub fn from_params(params: &ProviderParams) -> Result<Self> {
        let config = Self {
            api_key: params.secret(params::API_KEY)?,
            model: params.get_or(params::MODEL, DEFAULT_MODEL).to_string(),
            base_url: params
                .get_or(params::BASE_URL, DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            anthropic_version: params
                .get_or(params::ANTHROPIC_VERSION, DEFAULT_API_VERSION)
                .to_string(),
            max_retries: params.parse_or(params::MAX_RETRIES, DEFAULT_MAX_RETRIES)?,
            request_id_timeout: params
                .duration_ms_or(params::REQUEST_ID_TIMEOUT_MS, DEFAULT_REQUEST_ID_TIMEOUT)?,
        };
        config
            .validate()
            .map_err(|e| validation_error("anthropic", e))?;
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_request_id_timeout(mut self, timeout: Duration) -> Self {
        self.request_id_timeout = timeout;
        self
    }

    pub(crate) fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}
