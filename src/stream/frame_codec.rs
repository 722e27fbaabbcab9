//! Line-delimited event framing for streamed chat output.
//!
//! Envelope mode writes every event as an SSE `data:` field followed by a
//! blank line:
//! - a chunk is `data: {"chunk":"..."}`
//! - the terminal marker is `data: [DONE]`
//! - a mid-stream failure is `data: {"error":"..."}`
//!
//! Raw mode writes fragment text as-is and relies on the transport closing.
//! Decoders can be pinned to either mode or left on [`WireMode::Auto`], which
//! looks for an envelope prefix in the first bytes received.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::delimited::DelimitedBuffer;
use super::StreamDecoder;

/// SSE field carrying event payloads.
pub const DATA_FIELD: &str = "data:";
/// Payload of the terminal marker.
pub const DONE_PAYLOAD: &str = "[DONE]";
/// Blank line separating frames.
pub const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Encoder configuration shared by the server and the client.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FrameCodec {
    /// Wrap events in the SSE envelope (`true`) or emit raw text (`false`).
    pub envelope: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::envelope()
    }
}

#[derive(Serialize)]
struct ChunkOut<'a> {
    chunk: &'a str,
}

#[derive(Serialize)]
struct ErrorOut<'a> {
    error: &'a str,
}

#[derive(Deserialize)]
struct PayloadIn {
    #[serde(default)]
    chunk: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl FrameCodec {
    /// Codec emitting SSE envelopes.
    #[must_use]
    pub const fn envelope() -> Self {
        Self { envelope: true }
    }

    /// Codec emitting bare text.
    #[must_use]
    pub const fn raw() -> Self {
        Self { envelope: false }
    }

    /// Encode one text fragment.
    #[must_use]
    pub fn encode_chunk(&self, text: &str) -> String {
        if !self.envelope {
            return text.to_string();
        }
        let payload = serde_json::to_string(&ChunkOut { chunk: text })
            .unwrap_or_else(|_| String::from("{\"chunk\":\"\"}"));
        format!("{DATA_FIELD} {payload}\n\n")
    }

    /// Encode the terminal marker. Raw mode has none.
    #[must_use]
    pub fn encode_done(&self) -> Option<String> {
        self.envelope
            .then(|| format!("{DATA_FIELD} {DONE_PAYLOAD}\n\n"))
    }

    /// Encode a mid-stream failure notice. Raw mode has none.
    #[must_use]
    pub fn encode_error(&self, message: &str) -> Option<String> {
        if !self.envelope {
            return None;
        }
        let payload = serde_json::to_string(&ErrorOut { error: message })
            .unwrap_or_else(|_| String::from("{\"error\":\"\"}"));
        Some(format!("{DATA_FIELD} {payload}\n\n"))
    }

    /// Encode an SSE comment line. Raw mode has none.
    #[must_use]
    pub fn encode_comment(&self, text: &str) -> Option<String> {
        self.envelope.then(|| format!(": {text}\n\n"))
    }

    /// Decoder pinned to this codec's mode.
    #[must_use]
    pub fn decoder(&self) -> FrameDecoder {
        if self.envelope {
            FrameDecoder::new(WireMode::Envelope)
        } else {
            FrameDecoder::new(WireMode::Raw)
        }
    }
}

/// How a decoder interprets inbound bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMode {
    /// Decide from the first non-blank bytes.
    Auto,
    /// SSE envelope frames.
    Envelope,
    /// Bare text fragments.
    Raw,
}

/// A fully decoded event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    /// Text fragment.
    Chunk(String),
    /// Terminal marker.
    Done,
    /// Failure reported by the sender.
    Error(String),
}

/// Incremental decoder for envelope or raw streams.
#[derive(Debug)]
pub struct FrameDecoder {
    mode: WireMode,
    undecided: Vec<u8>,
    frames: DelimitedBuffer,
    utf8_tail: Vec<u8>,
    skipped: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(WireMode::Auto)
    }
}

impl FrameDecoder {
    /// Create a decoder in the given mode.
    #[must_use]
    pub const fn new(mode: WireMode) -> Self {
        Self {
            mode,
            undecided: Vec::new(),
            frames: DelimitedBuffer::new(FRAME_DELIMITER),
            utf8_tail: Vec::new(),
            skipped: 0,
        }
    }

    /// Mode in effect. `Auto` until enough bytes were seen.
    #[must_use]
    pub const fn mode(&self) -> WireMode {
        self.mode
    }

    /// Number of frames dropped as malformed.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Bytes carried over to the next read.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.undecided.len() + self.frames.pending() + self.utf8_tail.len()
    }

    /// Decode every frame completed by `bytes`.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<Frame> {
        match self.mode {
            WireMode::Envelope => self.decode_envelope(bytes),
            WireMode::Raw => self.decode_raw(bytes),
            WireMode::Auto => {
                self.undecided.extend_from_slice(bytes);
                match detect_mode(&self.undecided) {
                    Some(mode) => {
                        debug!(?mode, "detected wire mode");
                        self.mode = mode;
                        let buffered = std::mem::take(&mut self.undecided);
                        self.decode(&buffered)
                    }
                    None => Vec::new(),
                }
            }
        }
    }

    /// Flush anything left once the transport has closed.
    pub fn finish(&mut self) -> Vec<Frame> {
        match self.mode {
            WireMode::Auto => {
                self.mode = WireMode::Raw;
                let buffered = std::mem::take(&mut self.undecided);
                let mut frames = self.decode_raw(&buffered);
                frames.extend(self.finish());
                frames
            }
            WireMode::Envelope => self
                .frames
                .take_remainder()
                .and_then(|segment| self.parse_frame(&segment))
                .into_iter()
                .collect(),
            WireMode::Raw => {
                let tail = std::mem::take(&mut self.utf8_tail);
                if tail.is_empty() {
                    return Vec::new();
                }
                warn!(bytes = tail.len(), "stream ended inside a UTF-8 sequence");
                vec![Frame::Chunk(String::from_utf8_lossy(&tail).into_owned())]
            }
        }
    }

    fn decode_envelope(&mut self, bytes: &[u8]) -> Vec<Frame> {
        // CR only ever appears as part of CRLF line endings; JSON escapes it.
        let normalized: Vec<u8> = bytes.iter().copied().filter(|b| *b != b'\r').collect();
        self.frames
            .push(&normalized)
            .into_iter()
            .filter_map(|segment| self.parse_frame(&segment))
            .collect()
    }

    fn decode_raw(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut data = std::mem::take(&mut self.utf8_tail);
        data.extend_from_slice(bytes);

        let text = match String::from_utf8(data) {
            Ok(text) => text,
            Err(err) => {
                let utf8 = err.utf8_error();
                let mut data = err.into_bytes();
                if utf8.error_len().is_none() {
                    self.utf8_tail = data.split_off(utf8.valid_up_to());
                    String::from_utf8_lossy(&data).into_owned()
                } else {
                    warn!("invalid UTF-8 in raw stream, replacing");
                    String::from_utf8_lossy(&data).into_owned()
                }
            }
        };

        if text.is_empty() {
            Vec::new()
        } else {
            vec![Frame::Chunk(text)]
        }
    }

    fn parse_frame(&mut self, segment: &[u8]) -> Option<Frame> {
        let Ok(text) = std::str::from_utf8(segment) else {
            self.skipped += 1;
            warn!(bytes = segment.len(), "skipping frame with invalid UTF-8");
            return None;
        };

        let mut data_lines: Vec<&str> = Vec::new();
        for line in text.split('\n') {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(value) = line.strip_prefix(DATA_FIELD) {
                data_lines.push(value.strip_prefix(' ').unwrap_or(value));
            } else {
                debug!(line, "ignoring non-data field");
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        let payload = data_lines.join("\n");
        let payload = payload.trim();
        if payload == DONE_PAYLOAD {
            return Some(Frame::Done);
        }

        match serde_json::from_str::<PayloadIn>(payload) {
            Ok(PayloadIn {
                chunk: Some(chunk), ..
            }) => Some(Frame::Chunk(chunk)),
            Ok(PayloadIn {
                error: Some(error), ..
            }) => Some(Frame::Error(error)),
            Ok(_) => {
                self.skipped += 1;
                warn!(payload, "skipping frame without chunk or error");
                None
            }
            Err(err) => {
                self.skipped += 1;
                warn!(payload, %err, "skipping malformed frame");
                None
            }
        }
    }
}

impl StreamDecoder for FrameDecoder {
    type Item = Frame;

    fn decode(&mut self, bytes: &[u8]) -> Vec<Frame> {
        Self::decode(self, bytes)
    }

    fn finish(&mut self) -> Vec<Frame> {
        Self::finish(self)
    }
}

/// Envelope if the first non-blank bytes are a `data:` field or an SSE
/// comment line (`: text` or a bare `:`).
///
/// Returns `None` while the bytes are still a prefix of either.
fn detect_mode(bytes: &[u8]) -> Option<WireMode> {
    let start = bytes
        .iter()
        .position(|b| !matches!(b, b'\n' | b'\r'))?;
    let head = &bytes[start..];
    let field = DATA_FIELD.as_bytes();

    if head.starts_with(field) {
        return Some(WireMode::Envelope);
    }
    if head[0] == b':' {
        return match head.get(1) {
            None => None,
            Some(b' ' | b'\n' | b'\r') => Some(WireMode::Envelope),
            Some(_) => Some(WireMode::Raw),
        };
    }
    if field.starts_with(head) {
        None
    } else {
        Some(WireMode::Raw)
    }
}
