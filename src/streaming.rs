//! Common Streaming Utilities
//!
//! Every provider adapter decodes its upstream transport into the same
//! [`DeltaStream`]. The framing differs per provider (SSE for OpenAI and
//! Gemini, newline-delimited JSON for Ollama) but the termination rules are
//! shared and live here:
//!
//! - a stream ends after its first terminal delta or its first error
//! - an upstream that closes cleanly without a terminal delta gets one
//!   synthesized by the converter's `handle_stream_end`
//! - framing is decoded incrementally, so chunk boundaries never matter

use std::fmt::Display;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use eventsource_stream::{Event, Eventsource};
use futures::Stream;
use futures_util::StreamExt;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::io::StreamReader;

use crate::error::{LlmError, map_send_error};
use crate::types::{FinishReason, StreamDelta};

/// Longest NDJSON line accepted before the stream is failed.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Lazily decoded sequence of deltas from one upstream response.
///
/// Dropping the stream drops the underlying response body, which closes the
/// upstream connection.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, LlmError>> + Send>>;

/// Converts provider-specific SSE events into deltas.
pub trait SseEventConverter: Send + Sync {
    /// Convert one SSE event into zero or more deltas.
    ///
    /// Events that cannot be parsed should be logged and yield nothing.
    fn convert_event(&self, event: &Event) -> Vec<Result<StreamDelta, LlmError>>;

    /// Called on `[DONE]` or on a clean end of stream with no terminal delta.
    fn handle_stream_end(&self) -> Option<Result<StreamDelta, LlmError>> {
        Some(Ok(StreamDelta::terminal(FinishReason::Stop)))
    }
}

/// Converts one line of a newline-delimited JSON body into deltas.
pub trait JsonLineConverter: Send + Sync {
    fn convert_line(&self, line: &str) -> Vec<Result<StreamDelta, LlmError>>;

    fn handle_stream_end(&self) -> Option<Result<StreamDelta, LlmError>> {
        Some(Ok(StreamDelta::terminal(FinishReason::Stop)))
    }
}

/// Stream factory for creating provider-specific delta streams
pub struct StreamFactory;

impl StreamFactory {
    /// Send a streaming request and return the response once the status is known good.
    ///
    /// Transport failures go through [`map_send_error`]; non-2xx responses are
    /// read in full and handed to `classify` with the status code and body.
    pub async fn send<F>(
        provider: &str,
        request: reqwest::RequestBuilder,
        classify: F,
    ) -> Result<reqwest::Response, LlmError>
    where
        F: FnOnce(u16, &str) -> LlmError,
    {
        let response = request
            .send()
            .await
            .map_err(|e| map_send_error(provider, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify(status.as_u16(), &body_text));
        }
        Ok(response)
    }

    /// Decode an SSE byte stream with `converter`.
    pub fn sse_stream<S, B, E, C>(bytes: S, converter: C) -> DeltaStream
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
        C: SseEventConverter + 'static,
    {
        Box::pin(async_stream::stream! {
            let mut events = Box::pin(bytes.eventsource());
            let mut finished = false;

            while let Some(event) = events.next().await {
                let batch = match event {
                    Ok(event) if event.data.trim() == "[DONE]" => {
                        converter.handle_stream_end().into_iter().collect()
                    }
                    Ok(event) if event.data.trim().is_empty() => Vec::new(),
                    Ok(event) => converter.convert_event(&event),
                    Err(e) => vec![Err(LlmError::StreamError(format!("SSE stream error: {e}")))],
                };

                for item in batch {
                    let ends_stream = !matches!(&item, Ok(delta) if !delta.is_terminal());
                    yield item;
                    if ends_stream {
                        finished = true;
                        break;
                    }
                }
                if finished {
                    break;
                }
            }

            if !finished {
                if let Some(end) = converter.handle_stream_end() {
                    yield end;
                }
            }
        })
    }

    /// Decode a newline-delimited JSON byte stream with `converter`.
    ///
    /// Lines are reassembled across chunk boundaries before conversion; blank
    /// lines are ignored and a line that is not valid UTF-8 is logged and
    /// skipped. Transport errors and lines over [`MAX_LINE_BYTES`] end the
    /// stream.
    pub fn json_line_stream<S, E, C>(bytes: S, converter: C) -> DeltaStream
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
        C: JsonLineConverter + 'static,
    {
        let reader = StreamReader::new(
            bytes.map(|chunk| chunk.map_err(|e| io::Error::other(e.to_string()))),
        );

        Box::pin(async_stream::stream! {
            let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), MAX_LINE_BYTES);
            let mut lines = Box::pin(FramedRead::new(reader, codec));
            let mut finished = false;

            while let Some(line) = lines.next().await {
                let batch = match line {
                    Ok(raw) => match std::str::from_utf8(&raw) {
                        Ok(line) if line.trim().is_empty() => Vec::new(),
                        Ok(line) => converter.convert_line(line.trim()),
                        Err(e) => {
                            tracing::warn!(error = %e, len = raw.len(), "Skipping non-UTF-8 line");
                            Vec::new()
                        }
                    },
                    Err(e) => vec![Err(LlmError::StreamError(format!("line stream error: {e}")))],
                };

                for item in batch {
                    let ends_stream = !matches!(&item, Ok(delta) if !delta.is_terminal());
                    yield item;
                    if ends_stream {
                        finished = true;
                        break;
                    }
                }
                if finished {
                    break;
                }
            }

            if !finished {
                if let Some(end) = converter.handle_stream_end() {
                    yield end;
                }
            }
        })
    }
}
