//! Ollama API client for streamed text generation

use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::frames::decode_frames;
use super::stop::StopFlag;

/// One item produced while streaming a generation.
///
/// A generation yields a `Token` per fragment of text, and usually a single
/// `Done` at the end carrying the server's timing and token counts. A
/// generation cut short by a [`StopFlag`] ends with `Stopped` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A fragment of the model's response
    Token(String),
    /// Metadata from the final (`done: true`) frame
    Done(GenerateStats),
    /// A stop request was observed; nothing follows
    Stopped,
}

/// Counters reported by Ollama in the final frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateStats {
    /// Number of tokens generated
    pub eval_count: u32,
    /// Number of tokens in the prompt
    pub prompt_eval_count: u32,
    /// Time spent generating tokens (nanoseconds)
    pub eval_duration_ns: u64,
    /// Wall time for the whole request, including model load (nanoseconds)
    pub total_duration_ns: u64,
}

impl GenerateStats {
    pub(crate) fn from_frame(data: &Value) -> Self {
        Self {
            eval_count: data["eval_count"].as_u64().unwrap_or(0) as u32,
            prompt_eval_count: data["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            eval_duration_ns: data["eval_duration"].as_u64().unwrap_or(0),
            total_duration_ns: data["total_duration"].as_u64().unwrap_or(0),
        }
    }
}

/// A fully collected generation
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    /// The generated text
    pub response: String,
    /// Final-frame metadata, if the server sent it
    pub stats: Option<GenerateStats>,
}

/// Non-fatal problems reported while streaming.
///
/// Neither variant aborts a chat turn: the caller records it and keeps
/// whatever text arrived.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// Non-2xx status, connection failure, or a body read failure
    #[error("transport error: {0}")]
    Transport(String),
    /// A frame that is not valid JSON
    #[error("could not decode frame {frame:?}: {reason}")]
    Decode { reason: String, frame: String },
}

impl StreamError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Transport(_) => "transport",
            StreamError::Decode { .. } => "decode",
        }
    }
}

/// Parameters of a single `/api/generate` call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// The model name (e.g., "qwen2.5:0.5b")
    pub model: String,
    /// The user prompt
    pub prompt: String,
    /// System instruction sent with every prompt
    pub system: String,
    /// Context window size requested from the server
    pub num_ctx: u32,
}

/// Boxed stream returned by [`OllamaClient::generate_stream`]
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, StreamError>> + Send>>;

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for interacting with Ollama's HTTP API
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Ollama server (e.g., "http://localhost:11434")
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a streaming generation
    ///
    /// Sends exactly one request, with no retries. The returned stream never
    /// fails as a whole; problems are reported as `Err` items:
    /// - a non-2xx status or connection failure yields one `Transport` error
    ///   followed by a single empty token, then ends
    /// - a malformed frame yields a `Decode` error and streaming continues
    ///
    /// `stop` is polled once per frame. When it is set the stream clears it
    /// and ends without reading the rest of the response.
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
        stop: &StopFlag,
    ) -> ChunkStream {
        let endpoint = format!("{}/api/generate", self.base_url);
        debug!(endpoint = %endpoint, model = %request.model, "sending generate request");

        let result = self
            .client
            .post(&endpoint)
            .json(&serde_json::json!({
                "model": request.model,
                "prompt": request.prompt,
                "system": request.system,
                "num_ctx": request.num_ctx,
                "stream": true
            }))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "generate request failed");
                return failed_generation(StreamError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "generate request rejected");
            return failed_generation(StreamError::Transport(format!("{}: {}", status, body)));
        }

        Box::pin(decode_frames(response.bytes_stream(), stop.clone()))
    }

    /// Generate a complete (non-streaming) response
    ///
    /// Collects the stream into one string. Transport errors are returned;
    /// malformed frames are logged and skipped.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, StreamError> {
        let mut stream = self.generate_stream(request, &StopFlag::new()).await;
        let mut collected = GenerateResponse::default();

        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamChunk::Token(token)) => collected.response.push_str(&token),
                Ok(StreamChunk::Done(stats)) => collected.stats = Some(stats),
                Ok(StreamChunk::Stopped) => break,
                Err(e @ StreamError::Transport(_)) => return Err(e),
                Err(e) => warn!(error = %e, "skipping frame"),
            }
        }

        Ok(collected)
    }

    /// Names of the models installed on the server (`GET /api/tags`)
    pub async fn list_models(&self) -> Result<Vec<String>, StreamError> {
        let endpoint = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        let tags: TagsResponse = serde_json::from_str(&body).map_err(|e| StreamError::Decode {
            reason: e.to_string(),
            frame: body.clone(),
        })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

fn failed_generation(error: StreamError) -> ChunkStream {
    Box::pin(stream::iter(vec![
        Err(error),
        Ok(StreamChunk::Token(String::new())),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(StreamError::Transport("x".into()).kind(), "transport");
        let decode = StreamError::Decode {
            reason: "eof".into(),
            frame: "{".into(),
        };
        assert_eq!(decode.kind(), "decode");
        assert!(decode.to_string().contains("eof"));
    }

    #[tokio::test]
    async fn test_unreachable_server_yields_empty_token() {
        // Port 9 (discard) is closed on test hosts; the connection is refused.
        let client = OllamaClient::new("http://127.0.0.1:9");
        let request = GenerateRequest {
            model: "m".into(),
            prompt: "p".into(),
            system: "s".into(),
            num_ctx: 2048,
        };
        let items: Vec<_> = client
            .generate_stream(&request, &StopFlag::new())
            .await
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Err(StreamError::Transport(_))));
        assert_eq!(items[1], Ok(StreamChunk::Token(String::new())));
    }
}
