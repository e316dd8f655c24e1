//! Chat messages and the canonical instruction model
//!
//! Callers hand the gateway either plain text or JSON. [`process_input`]
//! decodes that into an [`Instruction`]; anything that does not parse is
//! kept as opaque text rather than rejected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DEFAULT_IMAGE_DATA_PREFIX: &str = "data:image/jpeg;base64,";

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Instruction as supplied by a caller, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawInstruction {
    Text(String),
    Json(Value),
}

impl From<&str> for RawInstruction {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawInstruction {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Value> for RawInstruction {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: RawInstruction,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<RawInstruction>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<RawInstruction>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<RawInstruction>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<RawInstruction>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Image reference carried by an `image_url` part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Typed message part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image part with `url` stored as given.
    ///
    /// When decoding caller input, only bare base64 payloads are rewritten
    /// into `data:image/jpeg;base64,` URLs.
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Canonical, normalized instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Opaque text, including input that failed to decode.
    Text(String),
    /// Ordered multi-part message.
    Parts(Vec<ContentPart>),
    /// Structured request object (e.g. a speech request with an `input` key).
    Object(Map<String, Value>),
}

impl Instruction {
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Serialize back to the JSON form accepted by [`process_input`].
    pub fn to_json_string(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => serde_json::to_string(parts).unwrap_or_default(),
            Self::Object(map) => Value::Object(map.clone()).to_string(),
        }
    }

    /// Concatenated text of the instruction, ignoring images.
    pub fn plain_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Object(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

/// Normalize a caller instruction into its canonical shape.
pub fn process_input(raw: &RawInstruction) -> Instruction {
    match raw {
        RawInstruction::Json(value) => from_json(value, None),
        RawInstruction::Text(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => from_json(&value, Some(text)),
            Err(_) => Instruction::Text(text.clone()),
        },
    }
}

fn from_json(value: &Value, original: Option<&str>) -> Instruction {
    let fallback = || Instruction::Text(original.map_or_else(|| value.to_string(), str::to_string));
    match value {
        Value::Object(map) => Instruction::Object(map.clone()),
        Value::Array(items) => {
            let parts: Vec<ContentPart> = items.iter().filter_map(decode_part).collect();
            if parts.is_empty() {
                fallback()
            } else {
                Instruction::Parts(parts)
            }
        }
        _ => fallback(),
    }
}

fn decode_part(item: &Value) -> Option<ContentPart> {
    let obj = item.as_object()?;
    if let Some(image) = obj.get("image").or_else(|| obj.get("image_url")) {
        let url = match image {
            Value::String(url) => url.as_str(),
            Value::Object(inner) => inner.get("url").and_then(Value::as_str).unwrap_or_default(),
            _ => "",
        };
        return Some(ContentPart::image_url(normalize_image_url(url)));
    }
    obj.get("text")
        .and_then(Value::as_str)
        .map(ContentPart::text)
}

/// Bare base64 payloads get a JPEG data-URL prefix; anything else passes through.
fn normalize_image_url(url: &str) -> String {
    if is_bare_base64(url) {
        format!("{DEFAULT_IMAGE_DATA_PREFIX}{url}")
    } else {
        url.to_string()
    }
}

fn is_bare_base64(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\n' | b'\r'))
}
