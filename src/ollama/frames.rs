//! Newline-delimited JSON framing for `/api/generate` responses
//!
//! Ollama streams one JSON object per line, but the HTTP body arrives in
//! arbitrary chunks: a chunk may hold several frames, or end in the middle
//! of one. [`FrameDecoder`] reassembles lines and [`decode_frames`] turns a
//! body stream into [`StreamChunk`] items.

use futures_util::stream::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use super::client::{GenerateStats, StreamChunk, StreamError};
use super::stop::StopFlag;

/// Splits a byte stream into newline-terminated frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, without its line terminator
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let newline = self.buf.iter().position(|&b| b == b'\n')?;
        let mut frame: Vec<u8> = self.buf.drain(..=newline).collect();
        frame.pop();
        if frame.last() == Some(&b'\r') {
            frame.pop();
        }
        Some(frame)
    }

    /// Take whatever is left once the transport has closed
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// Interpret a single frame
///
/// Blank frames produce nothing. A frame with a string `response` field
/// produces a token; a frame with `done: true` additionally produces the
/// final stats. Anything that is not JSON produces a decode error.
pub fn decode_frame(frame: &[u8]) -> Vec<Result<StreamChunk, StreamError>> {
    let text = String::from_utf8_lossy(frame);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let data: Value = match serde_json::from_str(text) {
        Ok(data) => data,
        Err(e) => {
            return vec![Err(StreamError::Decode {
                reason: e.to_string(),
                frame: text.to_string(),
            })]
        }
    };

    let mut items = Vec::with_capacity(2);
    if let Some(token) = data.get("response").and_then(Value::as_str) {
        items.push(Ok(StreamChunk::Token(token.to_string())));
    }
    if data.get("done").and_then(Value::as_bool) == Some(true) {
        items.push(Ok(StreamChunk::Done(GenerateStats::from_frame(&data))));
    }
    items
}

/// Decode a response body into chunks, honouring the stop flag
///
/// The flag is polled once per received frame. Observing a stop request
/// clears it, yields [`StreamChunk::Stopped`] and ends the stream; the rest
/// of the body is dropped unread.
/// A transport error ends the stream after being reported.
pub fn decode_frames<S, B, E>(
    body: S,
    stop: StopFlag,
) -> impl Stream<Item = Result<StreamChunk, StreamError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        futures_util::pin_mut!(body);
        let mut decoder = FrameDecoder::new();

        'transport: loop {
            match body.next().await {
                Some(Ok(bytes)) => {
                    decoder.extend(bytes.as_ref());
                    while let Some(frame) = decoder.next_frame() {
                        if stop.take() {
                            debug!("stop requested, abandoning response body");
                            yield Ok(StreamChunk::Stopped);
                            break 'transport;
                        }
                        for item in decode_frame(&frame) {
                            yield item;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "response body failed mid-stream");
                    yield Err(StreamError::Transport(e.to_string()));
                    break 'transport;
                }
                None => {
                    if let Some(frame) = decoder.finish() {
                        if stop.take() {
                            debug!("stop requested, dropping trailing frame");
                            yield Ok(StreamChunk::Stopped);
                            break 'transport;
                        }
                        for item in decode_frame(&frame) {
                            yield item;
                        }
                    }
                    break 'transport;
                }
            }
        }
    }
}
