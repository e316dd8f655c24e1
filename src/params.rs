//! Adapter configuration map
//!
//! Adapters are built from flat `saas.*` string maps. Unknown keys are
//! ignored; a missing required key fails construction.

use crate::error::{GatewayError, Result};
use secrecy::SecretString;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

pub const API_KEY: &str = "saas.api_key";
pub const MODEL: &str = "saas.model";
pub const BASE_URL: &str = "saas.base_url";
pub const MAX_RETRIES: &str = "saas.max_retries";
pub const REQUEST_ID_TIMEOUT_MS: &str = "saas.request_id_timeout_ms";
pub const ANTHROPIC_VERSION: &str = "saas.anthropic_version";
pub const SUBSCRIPTION_KEY: &str = "saas.subscription_key";
pub const REGION: &str = "saas.region";
pub const VOICE_NAME: &str = "saas.voice_name";

/// String-keyed adapter parameters.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderParams {
    values: HashMap<String, String>,
}

// Values may hold credentials, so only keys are printed.
impl std::fmt::Debug for ProviderParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("ProviderParams").field("keys", &keys).finish()
    }
}

impl ProviderParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| GatewayError::missing_key(key))
    }

    pub fn secret(&self, key: &str) -> Result<SecretString> {
        self.require(key).map(|value| SecretString::from(value.to_string()))
    }

    /// Parse `key`, falling back to `default` when absent.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|e| {
                GatewayError::ConfigurationError(format!("invalid value for `{key}`: {e}"))
            }),
            None => Ok(default),
        }
    }

    pub fn duration_ms_or(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.get(key) {
            Some(_) => self.parse_or::<u64>(key, 0).map(Duration::from_millis),
            None => Ok(default),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ProviderParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for ProviderParams {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

/// Map `validator` failures onto configuration errors.
pub(crate) fn validation_error(provider: &str, errors: validator::ValidationErrors) -> GatewayError {
    GatewayError::ConfigurationError(format!("invalid {provider} configuration: {errors}"))
}
