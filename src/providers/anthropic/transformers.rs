//! Request and response mapping for the Messages API

use super::config::ClaudeConfig;
use crate::error::{GatewayError, Result};
use crate::types::{
    ChatRequest, ContentPart, Content, Instruction, RawInstruction, ResponseMetadata, Role,
    process_input,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Request options forwarded verbatim when present.
const PASSTHROUGH_OPTIONS: &[&str] = &["top_k", "stop_sequences", "metadata"];

/// Build the `/v1/messages` body.
///
/// System turns are hoisted into the top-level `system` field (the last one
/// wins); every other turn keeps its position. Object instructions are sent
/// as the caller wrote them.
pub(crate) fn build_request_body(config: &ClaudeConfig, request: &ChatRequest, stream: bool) -> Value {
    let mut system = None;
    let mut messages = Vec::new();
    for message in request.conversation() {
        let instruction = process_input(&message.content);
        match message.role {
            Role::System => system = Some(match &instruction {
                Instruction::Object(_) => raw_text(&message.content),
                other => other.plain_text(),
            }),
            Role::User | Role::Assistant => messages.push(json!({
                "role": message.role.as_str(),
                "content": content_value(&message.content, &instruction),
            })),
        }
    }

    let mut body = Map::new();
    body.insert("model".into(), json!(config.model));
    body.insert("max_tokens".into(), json!(request.max_length));
    body.insert("messages".into(), Value::Array(messages));
    body.insert("temperature".into(), json!(request.temperature));
    body.insert("top_p".into(), json!(request.top_p));
    if let Some(system) = system {
        body.insert("system".into(), Value::String(system));
    }
    for key in PASSTHROUGH_OPTIONS {
        if let Some(value) = request.options.get(*key) {
            body.insert((*key).to_string(), value.clone());
        }
    }
    if stream {
        body.insert("stream".into(), Value::Bool(true));
    }
    Value::Object(body)
}

fn content_value(raw: &RawInstruction, instruction: &Instruction) -> Value {
    match instruction {
        Instruction::Text(text) => Value::String(text.clone()),
        Instruction::Parts(parts) => Value::Array(parts.iter().map(content_block).collect()),
        Instruction::Object(_) => Value::String(raw_text(raw)),
    }
}

fn raw_text(raw: &RawInstruction) -> String {
    match raw {
        RawInstruction::Text(text) => text.clone(),
        RawInstruction::Json(value) => value.to_string(),
    }
}

fn content_block(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
        ContentPart::ImageUrl { image_url } => {
            let source = match parse_data_url(&image_url.url) {
                Some((media_type, data)) => json!({
                    "type": "base64",
                    "media_type": media_type,
                    "data": data,
                }),
                None => json!({ "type": "url", "url": image_url.url }),
            };
            json!({ "type": "image", "source": source })
        }
    }
}

/// Split `data:<media>;base64,<payload>`.
fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    Some((media_type, data))
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    id: String,
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Parse a non-streaming response body into content and metadata.
pub(crate) fn parse_response(body: &str, time_cost: f64) -> Result<(Content, ResponseMetadata)> {
    let response: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::ParseError(format!("invalid Anthropic response: {e}")))?;
    let text: String = response
        .content
        .iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text.as_str()),
            ResponseBlock::Other => None,
        })
        .collect();
    let metadata = ResponseMetadata::completed(
        response.id,
        response.usage.input_tokens,
        response.usage.output_tokens,
        time_cost,
    )
    .with_stop_reason(response.stop_reason);
    Ok((Content::Text(text), metadata))
}

/// Map an Anthropic error type onto an HTTP-like status.
pub(crate) fn error_status(error_type: &str) -> u16 {
    match error_type {
        "invalid_request_error" => 400,
        "authentication_error" => 401,
        "permission_error" => 403,
        "not_found_error" => 404,
        "request_too_large" => 413,
        "rate_limit_error" => 429,
        "overloaded_error" => 529,
        _ => 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn config() -> ClaudeConfig {
        ClaudeConfig::new("sk-test")
    }

    #[test]
    fn system_turns_are_hoisted_and_last_one_wins() {
        let request = ChatRequest::new("What is Rust?").with_history(vec![
            ChatMessage::system("first"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::system("be brief"),
        ]);
        let body = build_request_body(&config(), &request, false);
        assert_eq!(body["system"], "be brief");
        assert_eq!(
            body["messages"],
            json!([
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "What is Rust?"},
            ])
        );
        assert_eq!(body["model"], "claude-3-haiku-20240307");
        assert_eq!(body["max_tokens"], 1024);
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn parts_become_content_blocks() {
        let request = ChatRequest::new(
            json!([
                {"text": "describe"},
                {"image": "QUJD"},
                {"image_url": {"url": "https://example.com/cat.png"}},
            ])
            .to_string(),
        );
        let body = build_request_body(&config(), &request, true);
        assert_eq!(body["stream"], true);
        assert_eq!(
            body["messages"][0]["content"],
            json!([
                {"type": "text", "text": "describe"},
                {"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "QUJD"}},
                {"type": "image", "source": {"type": "url", "url": "https://example.com/cat.png"}},
            ])
        );
    }

    #[test]
    fn object_prompts_are_sent_verbatim() {
        let prompt = r#"{"zeta": 1,   "alpha": 2}"#;
        let request = ChatRequest::new(prompt)
            .with_history(vec![ChatMessage::system(r#"{"rules":  ["b", "a"]}"#)]);
        let body = build_request_body(&config(), &request, false);
        assert_eq!(body["messages"][0]["content"], prompt);
        assert_eq!(body["system"], r#"{"rules":  ["b", "a"]}"#);
    }

    #[test]
    fn known_options_are_forwarded() {
        let request = ChatRequest::new("hi")
            .with_option("top_k", 5)
            .with_option("unrelated", true);
        let body = build_request_body(&config(), &request, false);
        assert_eq!(body["top_k"], 5);
        assert!(body.get("unrelated").is_none());
    }

    #[test]
    fn response_text_and_usage_are_extracted() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": " world"},
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 4},
        })
        .to_string();
        let (content, metadata) = parse_response(&body, 2.0).expect("parses");
        assert_eq!(content, Content::Text("Hello world".into()));
        assert_eq!(metadata.request_id, "msg_01");
        assert_eq!(metadata.input_tokens_count, 12);
        assert_eq!(metadata.generated_tokens_count, 4);
        assert_eq!(metadata.speed, 2.0);
        assert_eq!(metadata.first_token_time, 0.0);
        assert_eq!(metadata.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn malformed_response_is_a_parse_error() {
        assert!(matches!(
            parse_response("{\"content\": []}", 1.0),
            Err(GatewayError::ParseError(_))
        ));
    }

    #[test]
    fn data_urls_split_into_media_type_and_payload() {
        assert_eq!(
            parse_data_url("data:image/png;base64,AAAA"),
            Some(("image/png", "AAAA"))
        );
        assert_eq!(parse_data_url("https://example.com/a.png"), None);
    }
}
