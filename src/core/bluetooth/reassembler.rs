//! Response reassembly for the Blox command characteristic
//!
//! A notification carries one of four shapes:
//!
//! ```text
//! plain value   : any non-JSON text, or a JSON array / scalar
//! chunk header  : {"type": "ble_header", "chunks": N, "total_length": L}
//! chunk fragment: {"type": "ble_chunk", "index": i, "data": "..."}
//! regular object: any other JSON object
//! ```
//!
//! Fragments are assembled strictly by declared index. Completion is
//! detected by the number of filled slots reaching the announced count, so
//! fragments may arrive in any order.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::core::bluetooth::constants::{CHUNK_MARKER, HEADER_MARKER};
use crate::core::bluetooth::types::Response;

/// Result of feeding one payload to the reassembler.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// A whole logical response is available.
    Complete(Response),
    /// Part of a chunked response was buffered.
    Pending,
    /// The payload was malformed or stray and has been dropped.
    Ignored,
}

/// One classified notification payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Value(Response),
    Header {
        chunks: usize,
        total_length: Option<usize>,
    },
    Chunk {
        index: usize,
        data: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Marker {
    #[serde(rename = "ble_header", alias = "header")]
    Header {
        chunks: usize,
        #[serde(default)]
        total_length: Option<usize>,
    },
    #[serde(rename = "ble_chunk", alias = "chunk")]
    Chunk { index: usize, data: String },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed chunk marker: {0}")]
    Marker(#[from] serde_json::Error),
    #[error("header announces zero chunks")]
    EmptyHeader,
}

fn is_marker(kind: &str) -> bool {
    matches!(kind, HEADER_MARKER | CHUNK_MARKER | "header" | "chunk")
}

impl Frame {
    pub fn parse(raw: &str) -> Result<Frame, FrameError> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => return Ok(Frame::Value(Response::Text(raw.to_string()))),
        };

        let marked = value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(is_marker);
        if !marked {
            return Ok(Frame::Value(Response::Json(value)));
        }

        match serde_json::from_value::<Marker>(value)? {
            Marker::Header { chunks: 0, .. } => Err(FrameError::EmptyHeader),
            Marker::Header {
                chunks,
                total_length,
            } => Ok(Frame::Header {
                chunks,
                total_length,
            }),
            Marker::Chunk { index, data } => Ok(Frame::Chunk { index, data }),
        }
    }

    pub fn parse_bytes(raw: &[u8]) -> Result<Frame, FrameError> {
        Frame::parse(std::str::from_utf8(raw)?)
    }
}

/// Fragments of one chunked response, keyed by index.
#[derive(Debug, Clone, PartialEq)]
pub struct ReassemblyBuffer {
    expected: usize,
    total_length: Option<usize>,
    fragments: BTreeMap<usize, String>,
    received: usize,
}

impl ReassemblyBuffer {
    pub fn new(expected: usize, total_length: Option<usize>) -> Self {
        Self {
            expected,
            total_length,
            fragments: BTreeMap::new(),
            received: 0,
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Number of fragment deliveries, duplicates included.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Store a fragment. Returns `false` when the index is outside the
    /// announced range.
    pub fn insert(&mut self, index: usize, data: String) -> bool {
        if index >= self.expected {
            return false;
        }
        self.fragments.insert(index, data);
        self.received += 1;
        true
    }

    /// Slots holding a non-empty fragment.
    pub fn filled(&self) -> usize {
        self.fragments.values().filter(|d| !d.is_empty()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.filled() == self.expected
    }

    /// Concatenate in index order; JSON when it parses, text otherwise.
    pub fn assemble(self) -> Response {
        let joined: String = self.fragments.into_values().collect();
        if let Some(total_length) = self.total_length {
            if total_length != joined.len() {
                warn!(
                    "Assembled {} bytes but header announced {}",
                    joined.len(),
                    total_length
                );
            }
        }
        match serde_json::from_str(&joined) {
            Ok(value) => Response::Json(value),
            Err(_) => Response::Text(joined),
        }
    }
}

/// Advance the reassembly state by one payload.
///
/// `buffer` is the in-progress reassembly, if any. The returned buffer is
/// `Some` only while more fragments are expected.
pub fn step(
    buffer: Option<ReassemblyBuffer>,
    raw: &[u8],
) -> (Option<ReassemblyBuffer>, DecodeOutcome) {
    let frame = match Frame::parse_bytes(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping malformed payload: {}", e);
            return (None, DecodeOutcome::Ignored);
        }
    };

    match (frame, buffer) {
        (Frame::Value(response), _) => (None, DecodeOutcome::Complete(response)),
        (
            Frame::Header {
                chunks,
                total_length,
            },
            _,
        ) => {
            debug!("Chunked response announced: {} chunks", chunks);
            (
                Some(ReassemblyBuffer::new(chunks, total_length)),
                DecodeOutcome::Pending,
            )
        }
        (Frame::Chunk { index, .. }, None) => {
            debug!("Stray chunk {} with no reassembly in progress", index);
            (None, DecodeOutcome::Ignored)
        }
        (Frame::Chunk { index, data }, Some(mut buffer)) => {
            if !buffer.insert(index, data) {
                warn!(
                    "Chunk index {} outside announced range {}",
                    index,
                    buffer.expected()
                );
                return (Some(buffer), DecodeOutcome::Ignored);
            }
            debug!(
                "Chunk {} stored ({}/{})",
                index,
                buffer.filled(),
                buffer.expected()
            );
            if buffer.is_complete() {
                (None, DecodeOutcome::Complete(buffer.assemble()))
            } else {
                (Some(buffer), DecodeOutcome::Pending)
            }
        }
    }
}

/// Standalone reassembler over a stream of notification payloads.
#[derive(Debug, Default)]
pub struct ResponseReassembler {
    buffer: Option<ReassemblyBuffer>,
}

impl ResponseReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_response(&mut self, raw: &[u8]) -> DecodeOutcome {
        let (buffer, outcome) = step(self.buffer.take(), raw);
        self.buffer = buffer;
        outcome
    }

    pub fn is_receiving(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffer(&self) -> Option<&ReassemblyBuffer> {
        self.buffer.as_ref()
    }

    /// Drop any partial reassembly. Safe to call repeatedly.
    pub fn reset(&mut self) {
        self.buffer = None;
    }
}
