//! Azure speech configuration

use crate::error::Result;
use crate::params::{self, ProviderParams, validation_error};
use secrecy::SecretString;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_VOICE: &str = "en-US-AvaMultilingualNeural";
pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_REQUEST_ID_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Validate)]
pub struct AzureTtsConfig {
    pub subscription_key: SecretString,
    #[validate(length(min = 1))]
    pub region: String,
    #[validate(length(min = 1))]
    pub voice_name: String,
    #[validate(range(max = 50))]
    pub max_retries: u32,
    /// Defaults to `https://{region}.tts.speech.microsoft.com`.
    #[validate(url)]
    pub base_url: String,
    pub request_id_timeout: Duration,
}

impl AzureTtsConfig {
    pub fn new(subscription_key: impl Into<String>, region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            subscription_key: SecretString::from(subscription_key.into()),
            base_url: default_base_url(&region),
            region,
            voice_name: DEFAULT_VOICE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_id_timeout: DEFAULT_REQUEST_ID_TIMEOUT,
        }
    }

    /// Read the `saas.*` keys; the subscription key and region are required.
    pub fn from_params(params: &ProviderParams) -> Result<Self> {
        let region = params.require(params::REGION)?.to_string();
        let base_url = match params.get(params::BASE_URL) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => default_base_url(&region),
        };
        let config = Self {
            subscription_key: params.secret(params::SUBSCRIPTION_KEY)?,
            voice_name: params.get_or(params::VOICE_NAME, DEFAULT_VOICE).to_string(),
            max_retries: params.parse_or(params::MAX_RETRIES, DEFAULT_MAX_RETRIES)?,
            request_id_timeout: params
                .duration_ms_or(params::REQUEST_ID_TIMEOUT_MS, DEFAULT_REQUEST_ID_TIMEOUT)?,
            region,
            base_url,
        };
        config
            .validate()
            .map_err(|e| validation_error("azure_tts", e))?;
        Ok(config)
    }

    pub fn with_voice_name(mut self, voice_name: impl Into<String>) -> Self {
        self.voice_name = voice_name.into();
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

    pub(crate) fn synthesis_url(&self) -> String {
        format!("{}/cognitiveservices/v1", self.base_url)
    }
}

fn default_base_url(region: &str) -> String {
    format!("https://{region}.tts.speech.microsoft.com")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;

    #[test]
    fn url_is_derived_from_region() {
        let params = ProviderParams::new()
            .with(params::SUBSCRIPTION_KEY, "key")
            .with(params::REGION, "westeurope");
        let config = AzureTtsConfig::from_params(&params).expect("valid");
        assert_eq!(
            config.synthesis_url(),
            "https://westeurope.tts.speech.microsoft.com/cognitiveservices/v1"
        );
        assert_eq!(config.voice_name, DEFAULT_VOICE);
        assert_eq!(config.max_retries, 10);
    }

    #[test]
    fn region_and_key_are_required() {
        let only_key = ProviderParams::new().with(params::SUBSCRIPTION_KEY, "key");
        assert_eq!(
            AzureTtsConfig::from_params(&only_key).expect_err("no region"),
            GatewayError::missing_key(params::REGION)
        );
        let only_region = ProviderParams::new().with(params::REGION, "eastus");
        assert_eq!(
            AzureTtsConfig::from_params(&only_region).expect_err("no key"),
            GatewayError::missing_key(params::SUBSCRIPTION_KEY)
        );
    }
}
