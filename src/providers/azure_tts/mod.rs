//! Azure text-to-speech adapter
//!
//! The caller's instruction is a JSON object:
//!
//! ```json
//! {"input": "Hello", "voice": "en-US-JennyNeural", "chunk_size": 4096, "response_format": "mp3"}
//! ```
//!
//! Only `input` is required. Streaming calls forward audio chunks to the
//! binary broker under a locally generated request id.

mod config;
mod ssml;

pub use config::{AzureTtsConfig, DEFAULT_MAX_RETRIES, DEFAULT_VOICE};
pub use ssml::{build_ssml, output_format};

use super::Provider;
use super::http;
use crate::error::{GatewayError, Result};
use crate::params::ProviderParams;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::streaming::{HandshakeConfig, StreamBroker, launch_stream};
use crate::types::{ChatOutcome, ChatRequest, Content, Instruction, ModelMeta, ResponseMetadata};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub const MODEL_NAME: &str = "azure_tts";
const DEFAULT_RESPONSE_FORMAT: &str = "mp3";

/// One synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsRequest {
    pub text: String,
    pub voice: String,
    /// Re-chunk streamed audio to this many bytes.
    pub chunk_size: Option<usize>,
    pub response_format: String,
    pub stream: bool,
}

impl TtsRequest {
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            chunk_size: None,
            response_format: DEFAULT_RESPONSE_FORMAT.to_string(),
            stream: false,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size).filter(|size| *size > 0);
        self
    }

    pub fn with_response_format(mut self, format: impl Into<String>) -> Self {
        self.response_format = format.into();
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Adapter for the Azure speech synthesis REST endpoint.
#[derive(Debug, Clone)]
pub struct AzureTtsProvider {
    config: AzureTtsConfig,
    http: reqwest::Client,
    broker: Arc<StreamBroker>,
    retry: RetryExecutor,
}

impl AzureTtsProvider {
    /// `broker` receives streamed audio; normally the binary broker.
    pub fn new(config: AzureTtsConfig, broker: Arc<StreamBroker>) -> Result<Self> {
        Ok(Self {
            retry: RetryExecutor::new(RetryPolicy::with_retries(config.max_retries)),
            http: http::build_client()?,
            config,
            broker,
        })
    }

    pub fn from_params(params: &ProviderParams, broker: Arc<StreamBroker>) -> Result<Self> {
        Self::new(AzureTtsConfig::from_params(params)?, broker)
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn config(&self) -> &AzureTtsConfig {
        &self.config
    }

    /// Turn the caller's instruction object into a [`TtsRequest`].
    fn tts_request(&self, request: &ChatRequest) -> Result<TtsRequest> {
        let invalid = || GatewayError::InvalidInput("Invalid input".into());
        let instruction = self.process_input(&request.instruction);
        let Instruction::Object(object) = instruction else {
            return Err(invalid());
        };
        let text = object.get("input").and_then(Value::as_str).ok_or_else(invalid)?;
        let voice = object
            .get("voice")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.voice_name);

        let mut tts = TtsRequest::new(text, voice).with_stream(request.stream);
        if let Some(size) = object.get("chunk_size").and_then(Value::as_u64) {
            tts = tts.with_chunk_size(usize::try_from(size).map_err(|_| invalid())?);
        }
        if let Some(format) = object.get("response_format").and_then(Value::as_str) {
            tts = tts.with_response_format(format);
        }
        Ok(tts)
    }

    fn headers(&self, response_format: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        http::insert_header(
            &mut headers,
            "ocp-apim-subscription-key",
            self.config.subscription_key.expose_secret(),
        )?;
        http::insert_header(&mut headers, "content-type", "application/ssml+xml")?;
        http::insert_header(
            &mut headers,
            "x-microsoft-outputformat",
            output_format(response_format),
        )?;
        Ok(headers)
    }

    /// Synthesize speech, streaming to the binary broker when `request.stream` is set.
    pub async fn text_to_speech(&self, request: TtsRequest) -> Result<ChatOutcome> {
        let headers = self.headers(&request.response_format)?;
        let body = build_ssml(&request.text, &request.voice);
        let url = self.config.synthesis_url();
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            request_id = %request_id,
            voice = %request.voice,
            format = %request.response_format,
            stream = request.stream,
            "azure tts request"
        );

        if !request.stream {
            let started = Instant::now();
            let response = self
                .retry
                .execute(|| http::send(self.http.post(&url).headers(headers.clone()).body(body.clone())))
                .await?;
            let audio = response.bytes().await?;
            let metadata =
                ResponseMetadata::completed(request_id, 0, 0, started.elapsed().as_secs_f64())
                    .with_mime_type(sniff_mime_type(&audio));
            return Ok(ChatOutcome::Complete {
                content: Content::Bytes(audio),
                metadata,
            });
        }

        let client = self.http.clone();
        let retry = self.retry.clone();
        let chunk_size = request.chunk_size;
        let handshake =
            HandshakeConfig::default().with_request_id_timeout(self.config.request_id_timeout);
        let handle = launch_stream(self.broker.clone(), handshake, move |mut producer| async move {
            producer.assign_request_id(request_id)?;
            let response = retry
                .execute(|| http::send(client.post(&url).headers(headers.clone()).body(body.clone())))
                .await?;
            let mut audio = Box::pin(response.bytes_stream());
            let mut chunker = Rechunker::new(chunk_size);
            while let Some(chunk) = audio.next().await {
                for piece in chunker.push(chunk?) {
                    producer.push_bytes(piece)?;
                }
            }
            if let Some(rest) = chunker.finish() {
                producer.push_bytes(rest)?;
            }
            Ok(())
        })
        .await?;
        Ok(ChatOutcome::Streaming(handle))
    }
}

#[async_trait]
impl Provider for AzureTtsProvider {
    fn provider_id(&self) -> &'static str {
        "azure_tts"
    }

    fn meta(&self) -> Vec<ModelMeta> {
        vec![ModelMeta::saas(MODEL_NAME, true)]
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatOutcome> {
        let tts = self.tts_request(&request)?;
        self.text_to_speech(tts).await
    }
}

fn sniff_mime_type(audio: &[u8]) -> Option<String> {
    infer::get(audio).map(|kind| kind.mime_type().to_string())
}

/// Regroups upstream chunks into fixed-size pieces.
///
/// Without a size, non-empty chunks pass through unchanged.
#[derive(Debug)]
struct Rechunker {
    size: Option<usize>,
    buffer: BytesMut,
}

impl Rechunker {
    fn new(size: Option<usize>) -> Self {
        Self {
            size: size.filter(|size| *size > 0),
            buffer: BytesMut::new(),
        }
    }

    fn push(&mut self, chunk: Bytes) -> Vec<Bytes> {
        if chunk.is_empty() {
            return Vec::new();
        }
        let Some(size) = self.size else {
            return vec![chunk];
        };
        self.buffer.extend_from_slice(&chunk);
        let mut pieces = Vec::new();
        while self.buffer.len() >= size {
            pieces.push(self.buffer.split_to(size).freeze());
        }
        pieces
    }

    fn finish(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.split().freeze())
        }
    }
}
