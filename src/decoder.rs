//! Streaming response decoder.
//!
//! Turns the body of one chat response into an ordered sequence of text
//! chunks. Three framings are recognised transparently:
//!
//! ```text
//! data: {"req_id":"abc-123","result_code":0,"result_msg":"ok"}
//!
//! data: {"ai_output":"Hello"}
//!
//! data: [DONE]
//! ```
//!
//! * SSE-style: `data:` lines, frames separated by a blank line.
//! * JSON-lines: one JSON object per line, no prefix.
//! * Plain text: raw bytes delivered as they arrive.
//!
//! The first `result_code` record is the handshake; a non-zero code aborts the
//! session with [`ChatError::Rejected`]. If the stream ends without a single
//! delivery (and without an accepted handshake), the raw body is re-read once
//! as text so the caller still sees whatever the server sent.

use std::borrow::Cow;
use std::fmt::Display;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::ChatError;

/// Line prefix that switches a read into SSE-style framing.
pub const DATA_PREFIX: &str = "data:";
/// Logical end-of-stream marker; never delivered.
pub const DONE_SENTINEL: &str = "[DONE]";
const FRAME_SEPARATOR: &str = "\n\n";

/// Content-bearing fields, in priority order.
pub const CONTENT_FIELDS: [&str; 3] = ["ai_output", "content", "message"];

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receiver of decoded content chunks, called once per chunk in stream order.
pub trait ChunkSink {
    fn deliver(&mut self, text: &str);
}

impl<F: FnMut(&str)> ChunkSink for F {
    fn deliver(&mut self, text: &str) {
        self(text)
    }
}

/// Forwards chunks into an unbounded channel, for consumers running in
/// another task.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub mpsc::UnboundedSender<String>);

impl ChunkSink for ChannelSink {
    fn deliver(&mut self, text: &str) {
        if self.0.send(text.to_string()).is_err() {
            debug!("chunk receiver dropped, discarding chunk");
        }
    }
}

// ---------------------------------------------------------------------------
// Payload classification
// ---------------------------------------------------------------------------

/// Interpretation of a single frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedRecord {
    /// One-time control record: `{"result_code": .., "result_msg": ..}`.
    Handshake {
        result_code: i64,
        result_msg: Option<String>,
    },
    /// Text to append to the response. May be empty, in which case nothing is
    /// delivered.
    Content(String),
    /// A JSON object with none of the recognised fields.
    Ignored,
}

/// Classify one payload. This is the only place that inspects JSON shape.
pub fn classify_payload(payload: &str) -> DecodedRecord {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => {
            if let Some(code) = map.get("result_code") {
                return DecodedRecord::Handshake {
                    result_code: result_code_of(code),
                    result_msg: map
                        .get("result_msg")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
            }
            CONTENT_FIELDS
                .iter()
                .filter_map(|field| map.get(*field).and_then(Value::as_str))
                .find(|text| !text.is_empty())
                .map(|text| DecodedRecord::Content(text.to_string()))
                .unwrap_or(DecodedRecord::Ignored)
        }
        Ok(Value::String(text)) => DecodedRecord::Content(text),
        // Numbers, booleans, null and arrays are not records; keep them as text.
        Ok(_) => literal_text(payload),
        Err(e) => {
            debug!(error = %e, "payload is not JSON, delivering as literal text");
            literal_text(payload)
        }
    }
}

fn literal_text(payload: &str) -> DecodedRecord {
    DecodedRecord::Content(payload.replace("\\n", "\n"))
}

/// Anything other than an integral zero counts as a failure code.
fn result_code_of(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .unwrap_or(-1),
        Value::String(s) => s.trim().parse().unwrap_or(-1),
        _ => -1,
    }
}

// ---------------------------------------------------------------------------
// Incremental UTF-8
// ---------------------------------------------------------------------------

/// Incremental UTF-8 decoder. A multi-byte sequence split across reads is
/// carried to the next [`push`](Self::push); invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Truncated sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still pending at end of stream.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Response body handed to [`StreamingResponseDecoder::decode`].
pub enum ResponseBody<S> {
    /// Incrementally delivered byte source.
    Streaming(S),
    /// Non-streaming transport: the whole body, already read as text.
    Buffered(String),
}

/// Outcome of a completed decode session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeSummary {
    pub chunks_delivered: usize,
    pub bytes_read: usize,
    pub handshake_seen: bool,
    pub fallback_attempted: bool,
}

/// State for one request/response cycle.
///
/// Drive it with [`feed`](Self::feed) and [`finish`](Self::finish), or let
/// [`decode`](Self::decode) pull from a byte stream.
#[derive(Debug, Default)]
pub struct StreamingResponseDecoder {
    utf8: Utf8Carry,
    buffer: String,
    // Raw bytes read so far; source of the fallback read. Released once the
    // fallback can no longer run.
    raw: Vec<u8>,
    bytes_read: usize,
    chunks_delivered: usize,
    handshake_seen: bool,
}

impl StreamingResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a whole response body, delivering chunks to `sink` as they are
    /// resolved. The byte source is dropped on every exit path.
    pub async fn decode<S, B, E, K>(
        body: ResponseBody<S>,
        sink: &mut K,
    ) -> Result<DecodeSummary, ChatError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
        K: ChunkSink + ?Sized,
    {
        let stream = match body {
            ResponseBody::Buffered(text) => return Ok(Self::decode_buffered(&text, sink)),
            ResponseBody::Streaming(stream) => stream,
        };

        let mut stream = std::pin::pin!(stream);
        let mut decoder = Self::new();
        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|e| ChatError::Stream(e.to_string()))?;
            decoder.feed(chunk.as_ref(), sink)?;
        }
        decoder.finish(sink)
    }

    /// Non-streaming path: a non-empty body is a single chunk, delivered as is.
    pub fn decode_buffered<K: ChunkSink + ?Sized>(text: &str, sink: &mut K) -> DecodeSummary {
        let mut summary = DecodeSummary {
            bytes_read: text.len(),
            ..DecodeSummary::default()
        };
        if !text.is_empty() {
            sink.deliver(text);
            summary.chunks_delivered = 1;
        }
        summary
    }

    /// Process one network read.
    pub fn feed<K: ChunkSink + ?Sized>(
        &mut self,
        bytes: &[u8],
        sink: &mut K,
    ) -> Result<(), ChatError> {
        self.bytes_read += bytes.len();
        if self.fallback_pending() {
            self.raw.extend_from_slice(bytes);
        }
        let text = self.utf8.push(bytes);
        if text.is_empty() {
            return Ok(());
        }
        self.buffer.push_str(&text);
        let result = if self.buffer.contains(DATA_PREFIX) {
            self.drain_frames(sink)
        } else {
            self.passthrough(sink)
        };
        if !self.fallback_pending() && !self.raw.is_empty() {
            self.raw = Vec::new();
        }
        result
    }

    /// End of stream: resolve the leftover buffer, then run the fallback read
    /// if nothing was delivered.
    pub fn finish<K: ChunkSink + ?Sized>(mut self, sink: &mut K) -> Result<DecodeSummary, ChatError> {
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        let rest = std::mem::take(&mut self.buffer);
        if rest.contains(DATA_PREFIX) {
            self.resolve_data_lines(&rest, sink)?;
        } else {
            self.resolve_passthrough(rest.trim(), sink)?;
        }

        let mut fallback_attempted = false;
        if self.fallback_pending() {
            fallback_attempted = true;
            self.fallback(sink);
        }

        Ok(DecodeSummary {
            chunks_delivered: self.chunks_delivered,
            bytes_read: self.bytes_read,
            handshake_seen: self.handshake_seen,
            fallback_attempted,
        })
    }

    pub fn chunks_delivered(&self) -> usize {
        self.chunks_delivered
    }

    pub fn handshake_seen(&self) -> bool {
        self.handshake_seen
    }

    /// The fallback read still applies: nothing delivered, no handshake.
    fn fallback_pending(&self) -> bool {
        self.chunks_delivered == 0 && !self.handshake_seen
    }

    fn drain_frames<K: ChunkSink + ?Sized>(&mut self, sink: &mut K) -> Result<(), ChatError> {
        while let Some(pos) = self.buffer.find(FRAME_SEPARATOR) {
            let frame: String = self.buffer.drain(..pos + FRAME_SEPARATOR.len()).collect();
            self.resolve_data_lines(&frame[..pos], sink)?;
        }
        Ok(())
    }

    fn passthrough<K: ChunkSink + ?Sized>(&mut self, sink: &mut K) -> Result<(), ChatError> {
        // Keep a trailing "d", "da", ... so a prefix split across reads is
        // still recognised, and an unterminated JSON line until it completes.
        let held = held_json_line_len(&self.buffer).max(held_prefix_len(&self.buffer));
        let split = self.buffer.len() - held;
        let frame: String = self.buffer.drain(..split).collect();
        self.resolve_passthrough(frame.trim(), sink)
    }

    fn resolve_data_lines<K: ChunkSink + ?Sized>(
        &mut self,
        frame: &str,
        sink: &mut K,
    ) -> Result<(), ChatError> {
        for line in frame.lines() {
            let Some(payload) = line.trim_start().strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() || payload == DONE_SENTINEL {
                continue;
            }
            self.resolve(payload, sink)?;
        }
        Ok(())
    }

    fn resolve_passthrough<K: ChunkSink + ?Sized>(
        &mut self,
        frame: &str,
        sink: &mut K,
    ) -> Result<(), ChatError> {
        if frame.is_empty() {
            return Ok(());
        }
        if frame.contains('\n') && serde_json::from_str::<Value>(frame).is_err() {
            let lines: Vec<&str> = frame
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
            let json_lines = lines.len() > 1
                && lines
                    .iter()
                    .all(|line| serde_json::from_str::<Value>(line).is_ok());
            if json_lines {
                for line in lines {
                    self.resolve(line, sink)?;
                }
                return Ok(());
            }
        }
        self.resolve(frame, sink)
    }

    fn resolve<K: ChunkSink + ?Sized>(&mut self, payload: &str, sink: &mut K) -> Result<(), ChatError> {
        match classify_payload(payload) {
            DecodedRecord::Handshake {
                result_code,
                result_msg,
            } => {
                if self.handshake_seen {
                    debug!(result_code, "ignoring repeated handshake");
                    return Ok(());
                }
                self.handshake_seen = true;
                if result_code != 0 {
                    warn!(result_code, result_msg = ?result_msg, "handshake rejected request");
                    return Err(ChatError::rejected(result_code, result_msg.as_deref()));
                }
                debug!(result_msg = ?result_msg, "handshake accepted");
            }
            DecodedRecord::Content(text) => self.emit(&text, sink),
            DecodedRecord::Ignored => {
                debug!(payload, "JSON payload has no content field");
            }
        }
        Ok(())
    }

    fn emit<K: ChunkSink + ?Sized>(&mut self, text: &str, sink: &mut K) {
        if text.is_empty() {
            return;
        }
        sink.deliver(text);
        self.chunks_delivered += 1;
    }

    fn fallback<K: ChunkSink + ?Sized>(&mut self, sink: &mut K) {
        let raw = std::mem::take(&mut self.raw);
        let text = String::from_utf8_lossy(&raw);
        if let Cow::Owned(_) = text {
            warn!(bytes = raw.len(), "fallback body is not valid UTF-8, replacing invalid bytes");
        }
        if text.trim().is_empty() {
            return;
        }
        debug!(bytes = text.len(), "no chunks decoded, delivering full body");
        self.emit(&text, sink);
    }
}

/// Length of the longest proper prefix of [`DATA_PREFIX`] that ends `text`.
fn held_prefix_len(text: &str) -> usize {
    (1..DATA_PREFIX.len())
        .rev()
        .find(|&k| text.ends_with(&DATA_PREFIX[..k]))
        .unwrap_or(0)
}

/// Length of a trailing line that opens a JSON object but has no newline yet.
fn held_json_line_len(text: &str) -> usize {
    let start = text.rfind('\n').map_or(0, |i| i + 1);
    let line = &text[start..];
    if line.trim_start().starts_with('{') {
        line.len()
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
