//! Ollama API client
//!
//! Text completion against `POST /api/generate`, either as one JSON response
//! (`stream: false`) or as newline-delimited JSON chunks decoded into answer
//! fragments as they arrive.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::errors::{QueryError, Result};
use crate::generation::parser::JsonParser;
use crate::generation::{FragmentStream, GenerationBackend};

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "llama3.2:latest";

/// Generation can be slow on CPU-only hosts
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Ollama completion client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaClient {
    /// Create new Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL, 1.0, DEFAULT_TIMEOUT)
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(
        base_url: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            timeout,
        })
    }

    fn request(&self, prompt: &str, stream: bool) -> OllamaGenerateRequest {
        OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt, stream))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QueryError::Generation(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }

    fn transport_error(&self, err: reqwest::Error) -> QueryError {
        if err.is_timeout() {
            QueryError::Timeout {
                duration_ms: self.timeout.as_millis() as u64,
            }
        } else {
            QueryError::Generation(format!("Failed to send request: {}", err))
        }
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt, false).await?;

        let body: GenerateChunk = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        if let Some(error) = body.error {
            return Err(QueryError::Generation(error));
        }

        Ok(body.response)
    }

    async fn complete_stream(&self, prompt: &str) -> Result<FragmentStream> {
        let response = self.send(prompt, true).await?;
        let timeout_ms = self.timeout.as_millis() as u64;

        let bytes = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| {
                    if e.is_timeout() {
                        QueryError::Timeout {
                            duration_ms: timeout_ms,
                        }
                    } else {
                        QueryError::Streaming(e.to_string())
                    }
                })
            })
            .boxed();

        Ok(decode_fragments(bytes))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Turn a stream of NDJSON bytes into answer fragments.
///
/// Ends after the `done: true` chunk; ending earlier is an error.
pub fn decode_fragments(bytes: BoxStream<'static, Result<Bytes>>) -> FragmentStream {
    let state = DecodeState {
        bytes,
        decoder: NdjsonDecoder::new(),
        pending: VecDeque::new(),
        error: None,
        closed: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if let Some(err) = state.error.take() {
                state.closed = true;
                return Some((Err(err), state));
            }
            if state.closed {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    if let Err(err) = state.decoder.feed(&chunk, &mut state.pending) {
                        state.error = Some(err);
                    } else if state.decoder.is_done() {
                        state.closed = true;
                    }
                }
                Some(Err(err)) => state.error = Some(err),
                None => {
                    state.closed = true;
                    if let Err(err) = state.decoder.finish() {
                        state.error = Some(err);
                    }
                }
            }
        }
    })
    .boxed()
}

struct DecodeState {
    bytes: BoxStream<'static, Result<Bytes>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<String>,
    error: Option<QueryError>,
    closed: bool,
}

/// Decoder for Ollama's streamed `/api/generate` chunks
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    parser: JsonParser,
    done: bool,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, pushing every non-empty fragment decoded so far
    pub fn feed(&mut self, bytes: &[u8], out: &mut VecDeque<String>) -> Result<()> {
        if self.done {
            return Ok(());
        }

        let mut next = self.parser.add_bytes(bytes)?;
        while let Some(json) = next {
            let chunk: GenerateChunk = serde_json::from_str(&json)
                .map_err(|e| QueryError::JsonParse(format!("Invalid generate chunk: {}", e)))?;

            if let Some(error) = chunk.error {
                return Err(QueryError::Generation(error));
            }
            if !chunk.response.is_empty() {
                out.push_back(chunk.response);
            }
            if chunk.done {
                debug!("Generation stream finished");
                self.done = true;
                self.parser.clear();
                return Ok(());
            }

            next = self.parser.next_object()?;
        }

        Ok(())
    }

    /// True once the final chunk was seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Check the stream ended cleanly
    pub fn finish(&self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        if self.parser.has_partial() {
            return Err(QueryError::Streaming(
                "generation stream ended mid-chunk".to_string(),
            ));
        }
        Err(QueryError::Streaming(
            "generation stream ended before completion".to_string(),
        ))
    }
}

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// One generate response object (the whole body when not streaming)
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}
