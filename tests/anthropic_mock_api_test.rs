#![cfg(feature = "anthropic")]

use infergate::GatewayError;
use infergate::params::{self, ProviderParams};
use infergate::providers::Provider;
use infergate::providers::anthropic::AnthropicProvider;
use infergate::streaming::{PollOptions, StreamBroker, TEXT_STREAM_SERVER, collect};
use infergate::types::{ChatMessage, ChatOutcome, ChatRequest, Content};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;

fn provider(server: &MockServer, broker: Arc<StreamBroker>) -> AnthropicProvider {
    let params = ProviderParams::new()
        .with(params::API_KEY, "test-key")
        .with(params::BASE_URL, server.uri());
    AnthropicProvider::from_params(&params, broker)
        .expect("provider")
        .with_retry_policy(support::fast_retry(3))
}

fn text_broker() -> Arc<StreamBroker> {
    Arc::new(StreamBroker::new(TEXT_STREAM_SERVER))
}

fn sse_response(fixture: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_raw(support::read_fixture(fixture), "text/event-stream")
}

#[tokio::test]
async fn non_streaming_call_returns_text_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-haiku-20240307",
            "system": "Answer in one sentence.",
            "max_tokens": 256,
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(support::read_fixture("anthropic/message.json"), "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = ChatRequest::new("What is Rust?")
        .with_history(vec![ChatMessage::system("Answer in one sentence.")])
        .with_max_length(256);
    let outcome = provider(&server, text_broker())
        .stream_chat(request)
        .await
        .expect("completed");

    let ChatOutcome::Complete { content, metadata } = outcome else {
        panic!("expected a completed outcome");
    };
    assert_eq!(
        content,
        Content::Text("Rust is a systems programming language.".into())
    );
    assert_eq!(metadata.request_id, "msg_013Zva2CMHLNnXjNJJKqJ2EF");
    assert_eq!(metadata.input_tokens_count, 14);
    assert_eq!(metadata.generated_tokens_count, 9);
    assert_eq!(metadata.first_token_time, 0.0);
    assert_eq!(metadata.stop_reason.as_deref(), Some("end_turn"));
    assert!(metadata.time_cost >= 0.0);
}

#[tokio::test]
async fn streaming_call_hands_back_message_id_and_drains_through_broker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse_response("anthropic/message_start_deltas_stop.sse"))
        .mount(&server)
        .await;

    let broker = text_broker();
    let outcome = provider(&server, broker.clone())
        .stream_chat(ChatRequest::new("Say hello").with_stream(true))
        .await
        .expect("handshake");

    let handle = outcome.stream_handle().expect("streaming").clone();
    assert_eq!(handle.request_id, "msg_01XFDUDYJgAACzvnptvVoYEL");
    assert_eq!(handle.stream_server, TEXT_STREAM_SERVER);
    assert_eq!(
        outcome.handback_metadata(),
        json!({"metadata": {
            "request_id": "msg_01XFDUDYJgAACzvnptvVoYEL",
            "stream_server": "BLOCK_VLLM_STREAM_SERVER",
        }})
    );

    let collected = collect(broker.clone(), &handle.request_id, PollOptions::default())
        .await
        .expect("completed stream");
    assert_eq!(collected.text, "Hello world");
    assert_eq!(collected.input_tokens_count, 12);
    assert_eq!(collected.generated_tokens_count, 5);
}

#[tokio::test]
async fn error_event_fails_the_stream_after_partial_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(sse_response("anthropic/error_mid_stream.sse"))
        .mount(&server)
        .await;

    let broker = text_broker();
    let outcome = provider(&server, broker.clone())
        .stream_chat(ChatRequest::new("hi").with_stream(true))
        .await
        .expect("handshake");
    let handle = outcome.stream_handle().expect("streaming");
    assert_eq!(handle.request_id, "msg_overloaded");

    let err = collect(broker, &handle.request_id, PollOptions::default())
        .await
        .expect_err("failed stream");
    match err {
        GatewayError::StreamError(reason) => assert!(reason.contains("Overloaded"), "{reason}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn body_ending_without_message_stop_fails_the_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(sse_response("anthropic/truncated_no_stop.sse"))
        .mount(&server)
        .await;

    let broker = text_broker();
    let outcome = provider(&server, broker.clone())
        .stream_chat(ChatRequest::new("hi").with_stream(true))
        .await
        .expect("handshake");
    let handle = outcome.stream_handle().expect("streaming");
    assert_eq!(handle.request_id, "msg_truncated");

    let err = collect(broker, &handle.request_id, PollOptions::default())
        .await
        .expect_err("truncated stream");
    assert_eq!(
        err,
        GatewayError::StreamError("Stream error: stream ended before message_stop".into())
    );
}

#[tokio::test]
async fn stream_rejected_before_first_event_reports_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let broker = text_broker();
    let err = provider(&server, broker.clone())
        .stream_chat(ChatRequest::new("hi").with_stream(true))
        .await
        .expect_err("rejected");
    assert_eq!(err, GatewayError::upstream(401, "invalid x-api-key"));
    assert!(broker.is_empty());
}

#[tokio::test]
async fn retryable_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(support::read_fixture("anthropic/message.json"), "application/json"),
        )
        .mount(&server)
        .await;

    let outcome = provider(&server, text_broker())
        .stream_chat(ChatRequest::new("hi"))
        .await
        .expect("second attempt succeeds");
    assert!(outcome.content().is_some());
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "message": "messages: field required"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider(&server, text_broker())
        .stream_chat(ChatRequest::new("hi"))
        .await
        .expect_err("bad request");
    assert_eq!(err, GatewayError::upstream(400, "messages: field required"));
}

#[tokio::test]
async fn slow_first_event_times_out_and_leaves_no_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            sse_response("anthropic/message_start_deltas_stop.sse")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let broker = text_broker();
    let params = ProviderParams::new()
        .with(params::API_KEY, "test-key")
        .with(params::BASE_URL, server.uri())
        .with(params::REQUEST_ID_TIMEOUT_MS, "50");
    let provider = AnthropicProvider::from_params(&params, broker.clone()).expect("provider");

    let err = provider
        .stream_chat(ChatRequest::new("hi").with_stream(true))
        .await
        .expect_err("timeout");
    assert!(matches!(err, GatewayError::RequestIdTimeout { .. }));
    assert!(broker.is_empty());
}
