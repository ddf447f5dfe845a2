//! Wire protocol for the assistant TCP interface.
//!
//! Framing is marker-delimited: fixed byte literals act as structural
//! signals, with no escaping mechanism. `<END>` terminates a request;
//! the server greets an accepted connection with `<OK_>` or `<BSY>` and
//! terminates a completed response with `\n<END>`. Markers must never
//! appear in legitimate content - this format is kept for wire
//! compatibility with existing clients.

use std::io;

use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Request terminator, appended by the client after the prompt text.
/// Also the tail of the response terminator.
pub const END_MARKER: &[u8] = b"<END>";

/// Sent by the server when the inference slot is held; the connection is
/// closed immediately afterward.
pub const BUSY_MARKER: &[u8] = b"<BSY>";

/// Sent by the server once the inference slot has been granted.
pub const OK_MARKER: &[u8] = b"<OK_>";

/// Reserved for a server-initiated idle disconnect. Part of the marker set
/// for wire compatibility, never emitted by the current server flow.
pub const TIMEOUT_MARKER: &[u8] = b"<TMT>";

/// Sent once at the end of a completed response, only if the connection
/// stayed writable for the whole generation.
pub const RESPONSE_TERMINATOR: &[u8] = b"\n<END>";

/// Unterminated request sizes above this are logged once per request.
const LARGE_REQUEST_BYTES: usize = 64 * 1024;

/// Position of the first occurrence of `marker` in `haystack`.
pub fn find_marker(haystack: &[u8], marker: &[u8]) -> Option<usize> {
    haystack.windows(marker.len()).position(|w| w == marker)
}

/// Admission reply sent by the server right after accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    /// `<OK_>` - slot granted, the client may send requests.
    Granted,
    /// `<BSY>` - slot held by another session, connection will close.
    Busy,
}

impl Greeting {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Greeting::Granted => OK_MARKER,
            Greeting::Busy => BUSY_MARKER,
        }
    }

    /// Scan accumulated bytes for an admission reply.
    pub fn from_bytes(buf: &[u8]) -> Option<Greeting> {
        if find_marker(buf, OK_MARKER).is_some() {
            Some(Greeting::Granted)
        } else if find_marker(buf, BUSY_MARKER).is_some() {
            Some(Greeting::Busy)
        } else {
            None
        }
    }
}

/// Decoder for client requests: yields the text preceding each `<END>`.
///
/// Bytes after the marker stay buffered for the next round, so a single
/// connection can carry multiple question/answer rounds. A buffer left
/// unterminated at EOF is discarded rather than erroring - a peer that
/// disconnects mid-request has sent no request.
#[derive(Debug, Default)]
pub struct RequestCodec {
    logged_large: bool,
}

impl RequestCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RequestCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match find_marker(src, END_MARKER) {
            Some(at) => {
                let frame = src.split_to(at);
                src.advance(END_MARKER.len());
                self.logged_large = false;
                let text = String::from_utf8(frame.to_vec())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(text))
            }
            None => {
                if src.len() > LARGE_REQUEST_BYTES && !self.logged_large {
                    tracing::info!(buffered = src.len(), "large request still unterminated");
                    self.logged_large = true;
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            tracing::debug!(
                discarded = src.len(),
                "peer closed with unterminated request buffer"
            );
            src.clear();
        }
        Ok(None)
    }
}
