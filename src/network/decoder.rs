//! # Stream Decoder
//!
//! Turns raw bytes read from a scanner socket into [`ScanFrame`]s.
//!
//! Socket reads do not line up with message boundaries, so every connection owns a
//! [`FrameDecoder`] that buffers bytes until a complete JSON document is available. Documents
//! may be separated by the line terminator, arrive back to back, or be split across any
//! number of reads.
//!
//! Decoding fails closed: a document that does not match the scan schema is dropped (and
//! logged) without interrupting the connection.
//!
//! ```text
//! {"codes":[{"content":"A1","corners":[{"x":1,"y":2},...]}],"image":{"name":"cam","trigger":{"index":4}}}\r\n
//! ```

use log::{debug, warn};
use serde::Deserialize;

use super::types::{DecodedScan, ImageTrigger, ScanFrame};
use crate::error_handling::types::ProtocolError;
use crate::session_management::session::{CodeEntry, Corner};

/// Terminator appended to every outbound command.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Marks the end of a connection, distinct from any data payload.
pub const DISCONNECT_SENTINEL: &str = "__disconnected__";

/// Pending bytes above this bound are discarded.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct WireDocument {
    codes: Option<Vec<WireCode>>,
    image: Option<WireImage>,
}

#[derive(Debug, Deserialize)]
struct WireCode {
    content: String,
    #[serde(default)]
    corners: Option<Vec<Corner>>,
}

#[derive(Debug, Deserialize)]
struct WireImage {
    name: String,
    trigger: WireTrigger,
}

#[derive(Debug, Deserialize)]
struct WireTrigger {
    index: u64,
}

impl TryFrom<WireDocument> for DecodedScan {
    type Error = ProtocolError;

    fn try_from(doc: WireDocument) -> Result<Self, Self::Error> {
        if doc.codes.is_none() && doc.image.is_none() {
            return Err(ProtocolError::NoFacets);
        }
        let codes = doc
            .codes
            .unwrap_or_default()
            .into_iter()
            .map(|code| CodeEntry::scanned(code.content, code.corners))
            .collect();
        let image = doc.image.map(|image| ImageTrigger {
            name: image.name,
            index: image.trigger.index,
        });
        Ok(DecodedScan { codes, image })
    }
}

/// Decodes one complete document.
pub fn decode_document(text: &str) -> Result<ScanFrame, ProtocolError> {
    let trimmed = text.trim();
    if trimmed == DISCONNECT_SENTINEL {
        return Ok(ScanFrame::Disconnected);
    }
    let doc: WireDocument = serde_json::from_str(trimmed)?;
    Ok(ScanFrame::Scan(DecodedScan::try_from(doc)?))
}

/// Puts exactly one canonical terminator at the end of an operator command.
pub fn normalize_command(payload: &str) -> String {
    let body = payload.trim_end_matches(&['\r', '\n'][..]);
    format!("{}{}", body, LINE_TERMINATOR)
}

enum Step {
    Frame(ScanFrame),
    Dropped,
    Incomplete,
}

enum Parsed {
    Document(WireDocument, usize),
    Incomplete,
    Malformed(serde_json::Error),
}

/// Per-connection reassembly buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for the rest of a document.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one chunk and returns every frame it completes, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ScanFrame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pending.is_empty() {
                break;
            }
            match self.next_frame() {
                Step::Frame(frame) => frames.push(frame),
                Step::Dropped => continue,
                Step::Incomplete => break,
            }
        }
        if self.pending.len() > MAX_PENDING_BYTES {
            warn!(
                "dropping pending scanner data: {}",
                ProtocolError::Oversized(MAX_PENDING_BYTES)
            );
            self.pending.clear();
        }
        frames
    }

    fn next_frame(&mut self) -> Step {
        let sentinel = DISCONNECT_SENTINEL.as_bytes();
        if self.pending.starts_with(sentinel) {
            self.pending.drain(..sentinel.len());
            return Step::Frame(ScanFrame::Disconnected);
        }
        if sentinel.starts_with(&self.pending) {
            return Step::Incomplete;
        }

        let parsed = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.pending).into_iter::<WireDocument>();
            match stream.next() {
                Some(Ok(doc)) => Parsed::Document(doc, stream.byte_offset()),
                Some(Err(e)) if e.is_eof() => Parsed::Incomplete,
                Some(Err(e)) => Parsed::Malformed(e),
                None => Parsed::Incomplete,
            }
        };

        match parsed {
            Parsed::Document(doc, used) => {
                self.pending.drain(..used);
                match DecodedScan::try_from(doc) {
                    Ok(scan) => Step::Frame(ScanFrame::Scan(scan)),
                    Err(e) => {
                        debug!("dropping scan document: {}", e);
                        Step::Dropped
                    }
                }
            }
            Parsed::Incomplete => Step::Incomplete,
            Parsed::Malformed(e) => {
                debug!("dropping scanner frame: {}", ProtocolError::Malformed(e));
                self.discard_line();
                Step::Dropped
            }
        }
    }

    fn skip_whitespace(&mut self) {
        let leading = self
            .pending
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.pending.drain(..leading);
    }

    /// Drops everything up to and including the next newline, or all of it if there is none.
    fn discard_line(&mut self) {
        match self.pending.iter().position(|b| *b == b'\n') {
            Some(newline) => {
                self.pending.drain(..=newline);
            }
            None => self.pending.clear(),
        }
    }
}
