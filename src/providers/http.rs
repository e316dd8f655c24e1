//! HTTP plumbing shared by adapters

use crate::error::{GatewayError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client used by every adapter. No overall timeout: streams may run long.
pub(crate) fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("infergate/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| GatewayError::HttpError(format!("failed to build HTTP client: {e}")))
}

/// Insert a header, reporting invalid values as configuration errors.
pub(crate) fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value).map_err(|_| {
        GatewayError::ConfigurationError(format!("invalid value for header `{name}`"))
    })?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Send a request and turn non-2xx responses into [`GatewayError::UpstreamRequestError`].
pub(crate) async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let response = request.send().await?;
    ensure_success(response).await
}

pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::upstream(status.as_u16(), error_message(&body)))
}

/// Pull `error.message` out of a JSON error body, else use the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("message"))
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_json_message() {
        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"max_tokens: required"}}"#;
        assert_eq!(error_message(body), "max_tokens: required");
        assert_eq!(error_message(" Service Unavailable \n"), "Service Unavailable");
    }

    #[test]
    fn invalid_header_values_are_configuration_errors() {
        let mut headers = HeaderMap::new();
        assert!(insert_header(&mut headers, "x-api-key", "ok").is_ok());
        assert!(matches!(
            insert_header(&mut headers, "x-api-key", "bad\nvalue"),
            Err(GatewayError::ConfigurationError(_))
        ));
    }
}
