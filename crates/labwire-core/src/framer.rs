//! Terminator-delimited framing.
//!
//! The [`Framer`] owns the receive buffer for a session. Bytes are appended as
//! they arrive and a frame is cut at the first occurrence of the terminator.
//! Anything after the terminator stays buffered for the next frame, and so does a
//! partial frame left over after a timeout.
//!
//! ```text
//!   read #1: "12."      buffer = "12."          -> keep reading
//!   read #2: "5\n0.1"   buffer = "12.5\n0.1"    -> frame "12.5", buffer = "0.1"
//! ```

use crate::error::{LinkError, Result};
use crate::transport::{ReadOutcome, Transport};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use tokio::time::Instant;

/// Default upper bound on a single frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

// =============================================================================
// Terminator
// =============================================================================

/// Non-empty byte sequence that ends every command and every response.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Terminator(Bytes);

impl Terminator {
    /// Line feed (`\n`).
    pub fn lf() -> Self {
        Self(Bytes::from_static(b"\n"))
    }

    /// Carriage return (`\r`).
    pub fn cr() -> Self {
        Self(Bytes::from_static(b"\r"))
    }

    /// Carriage return + line feed.
    pub fn crlf() -> Self {
        Self(Bytes::from_static(b"\r\n"))
    }

    /// Build a terminator from arbitrary bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(LinkError::Configuration(
                "terminator must not be empty".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    /// Raw terminator bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte offset of the first occurrence of the terminator in `haystack`.
    pub fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        let needle = self.as_bytes();
        if haystack.len() < needle.len() {
            return None;
        }
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }
}

impl Default for Terminator {
    fn default() -> Self {
        Self::lf()
    }
}

impl fmt::Debug for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Terminator({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl TryFrom<String> for Terminator {
    type Error = LinkError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value.into_bytes())
    }
}

impl From<Terminator> for String {
    fn from(value: Terminator) -> Self {
        String::from_utf8_lossy(&value.0).into_owned()
    }
}

// =============================================================================
// Trim policy
// =============================================================================

/// Whitespace handling applied to a frame after the terminator is stripped.
///
/// Instruments routinely pad replies (`"1.25 \r"` before a `\n` terminator), so
/// the default trims both ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimPolicy {
    /// Keep the payload exactly as received.
    None,
    /// Strip trailing ASCII whitespace only.
    Trailing,
    /// Strip leading and trailing ASCII whitespace.
    #[default]
    Both,
}

impl TrimPolicy {
    fn apply<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        match self {
            TrimPolicy::None => payload,
            TrimPolicy::Trailing => payload.trim_ascii_end(),
            TrimPolicy::Both => payload.trim_ascii(),
        }
    }
}

// =============================================================================
// Response
// =============================================================================

/// One received frame, terminator removed and trim policy applied.
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    raw: Bytes,
}

impl Response {
    /// Wrap already-framed bytes.
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self { raw: raw.into() }
    }

    /// Payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    /// Comma-separated fields, each trimmed.
    ///
    /// `"1, 0,2"` yields `["1", "0", "2"]`. An empty payload yields one empty field.
    pub fn fields(&self) -> Vec<String> {
        self.text()
            .split(',')
            .map(|field| field.trim().to_string())
            .collect()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Response({:?})", self.text())
    }
}

impl From<&str> for Response {
    fn from(value: &str) -> Self {
        Self::new(Bytes::copy_from_slice(value.as_bytes()))
    }
}

// =============================================================================
// Framer
// =============================================================================

/// Result of one [`Framer::consume`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A full frame was cut from the stream.
    Complete(Response),
    /// The deadline passed before a terminator arrived. The partial bytes are
    /// still buffered.
    TimedOut {
        /// Snapshot of the buffered bytes
        partial: Vec<u8>,
    },
    /// The stream ended before a terminator arrived.
    Closed {
        /// Bytes received before end-of-stream
        partial: Vec<u8>,
    },
}

/// Incremental frame assembler bound to one terminator.
#[derive(Debug)]
pub struct Framer {
    terminator: Terminator,
    trim: TrimPolicy,
    max_frame_len: usize,
    buffer: BytesMut,
}

impl Framer {
    /// Create a framer with the default trim policy and frame limit.
    pub fn new(terminator: Terminator) -> Self {
        Self {
            terminator,
            trim: TrimPolicy::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Replace the trim policy.
    pub fn with_trim(mut self, trim: TrimPolicy) -> Self {
        self.trim = trim;
        self
    }

    /// Replace the maximum frame length.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len.max(1);
        self
    }

    /// Terminator in use.
    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    /// Bytes received but not yet returned as a frame.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop all buffered bytes, returning how many were discarded.
    pub fn reset(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        discarded
    }

    /// Append the terminator to `command`.
    ///
    /// Fails with `InvalidCommand` when the command already contains the
    /// terminator, since the device would see two commands.
    pub fn frame(&self, command: &str) -> Result<Bytes> {
        if self.terminator.find_in(command.as_bytes()).is_some() {
            return Err(LinkError::InvalidCommand {
                command: command.to_string(),
                reason: format!("contains the terminator {:?}", self.terminator),
            });
        }

        let mut out = BytesMut::with_capacity(command.len() + self.terminator.as_bytes().len());
        out.extend_from_slice(command.as_bytes());
        out.extend_from_slice(self.terminator.as_bytes());
        Ok(out.freeze())
    }

    /// Feed bytes directly into the receive buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Cut the next complete frame from the buffer, if there is one.
    pub fn next_frame(&mut self) -> Option<Response> {
        let end = self.terminator.find_in(&self.buffer)?;
        let mut frame = self.buffer.split_to(end + self.terminator.as_bytes().len());
        frame.truncate(end);

        let payload = self.trim.apply(&frame);
        Some(Response::new(Bytes::copy_from_slice(payload)))
    }

    /// Read from `transport` until a frame completes, the deadline passes, or the
    /// stream ends.
    ///
    /// Timeouts and end-of-stream are reported as [`Frame`] variants rather than
    /// errors so the session decides what they mean. Transport I/O errors and
    /// oversize frames are errors; an oversize frame also clears the buffer.
    pub async fn consume(
        &mut self,
        transport: &mut (dyn Transport + '_),
        deadline: Instant,
    ) -> Result<Frame> {
        loop {
            if let Some(response) = self.next_frame() {
                return Ok(Frame::Complete(response));
            }

            if self.buffer.len() > self.max_frame_len {
                let len = self.reset();
                return Err(LinkError::Protocol(format!(
                    "frame exceeded {} bytes without a terminator ({} bytes discarded)",
                    self.max_frame_len, len
                )));
            }

            match transport.read(&mut self.buffer, deadline).await? {
                ReadOutcome::Data(n) => {
                    tracing::trace!(bytes = n, buffered = self.buffer.len(), "read chunk");
                }
                ReadOutcome::TimedOut => {
                    return Ok(Frame::TimedOut {
                        partial: self.buffer.to_vec(),
                    });
                }
                ReadOutcome::Closed => {
                    return Ok(Frame::Closed {
                        partial: self.buffer.split().to_vec(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_appends_terminator() {
        let framer = Framer::new(Terminator::crlf());
        assert_eq!(&framer.frame("*IDN?").unwrap()[..], b"*IDN?\r\n");
    }

    #[test]
    fn test_frame_rejects_embedded_terminator() {
        let framer = Framer::new(Terminator::lf());
        let err = framer.frame("RANGE 1\nRANGE 2").unwrap_err();
        assert!(matches!(err, LinkError::InvalidCommand { .. }));

        // A lone CR is not the CRLF terminator
        let framer = Framer::new(Terminator::crlf());
        assert!(framer.frame("A\rB").is_ok());
    }

    #[test]
    fn test_empty_terminator_rejected() {
        assert!(Terminator::new(Vec::new()).is_err());
        assert!(Terminator::try_from(String::new()).is_err());
    }

    #[test]
    fn test_next_frame_keeps_trailing_bytes() {
        let mut framer = Framer::new(Terminator::lf());
        framer.push(b"1.5\n2.");
        assert_eq!(framer.next_frame().unwrap().text(), "1.5");
        assert_eq!(framer.pending(), b"2.");
        assert!(framer.next_frame().is_none());

        framer.push(b"5\n");
        assert_eq!(framer.next_frame().unwrap().text(), "2.5");
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_trim_policies() {
        let mut both = Framer::new(Terminator::lf());
        both.push(b"  1.25 \r\n");
        assert_eq!(both.next_frame().unwrap().as_bytes(), b"1.25");

        let mut trailing = Framer::new(Terminator::cr()).with_trim(TrimPolicy::Trailing);
        trailing.push(b" +1.0E-3 \r");
        assert_eq!(trailing.next_frame().unwrap().as_bytes(), b" +1.0E-3");

        let mut none = Framer::new(Terminator::lf()).with_trim(TrimPolicy::None);
        none.push(b"OK\r\n");
        assert_eq!(none.next_frame().unwrap().as_bytes(), b"OK\r");
    }

    #[test]
    fn test_two_byte_terminator_split_across_pushes() {
        let mut framer = Framer::new(Terminator::crlf());
        framer.push(b"READY\r");
        assert!(framer.next_frame().is_none());
        framer.push(b"\n");
        assert_eq!(framer.next_frame().unwrap().text(), "READY");
    }

    #[test]
    fn test_response_fields() {
        let response = Response::from("LSCI,MODEL425, 1234567 ,1.2");
        assert_eq!(response.fields(), vec!["LSCI", "MODEL425", "1234567", "1.2"]);
    }

    #[test]
    fn test_terminator_deserializes_from_toml_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            terminator: Terminator,
        }
        let parsed: Wrapper = toml::from_str("terminator = \"\\r\\n\"").unwrap();
        assert_eq!(parsed.terminator, Terminator::crlf());
    }
}
