//! Incremental packet reader.
//!
//! Uses `bytes::BytesMut` accumulators and a small state machine:
//! - `AwaitingHeader`: collecting bytes until a blank line (`\r\n\r\n` or `\n\n`)
//! - `AwaitingBody`: header parsed, collecting `content-length` bytes
//! - `Ready`: packet produced; the next push starts a fresh exchange
//!
//! Bytes arriving after the declared content within the same push are
//! discarded, not kept for a following exchange.
//!
//! # Example
//!
//! ```
//! use rpcwire::protocol::{PacketReader, RequestHeader};
//!
//! let mut reader = PacketReader::<RequestHeader>::new();
//!
//! // Data arrives in chunks from the socket
//! assert!(reader.read_packet(b"POST /RPC2 HTTP/1.1\r\nContent-Length: 5\r\n\r\n").unwrap().is_none());
//! let packet = reader.read_packet(b"hello").unwrap().unwrap();
//!
//! assert_eq!(packet.header().uri(), "/RPC2");
//! assert_eq!(packet.content(), b"hello");
//! ```

use std::sync::Arc;

use bytes::BytesMut;

use super::error::EnvelopeError;
use super::header::{Envelope, ParserRegistry};
use super::packet::Packet;

/// Default cap on accumulated header bytes (64 KiB).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 64 * 1024;

/// Default cap on declared content length (16 MiB).
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

/// State machine for packet reading.
#[derive(Debug)]
enum State<E> {
    /// No blank line seen yet.
    AwaitingHeader,
    /// Header parsed, waiting for content bytes.
    AwaitingBody { header: E },
    /// Packet handed out.
    Ready,
}

/// Per-connection reader turning arbitrarily chunked bytes into one [`Packet`].
pub struct PacketReader<E: Envelope> {
    /// Bytes received before the header terminator was found.
    header_buf: BytesMut,
    /// Content bytes received so far.
    content_buf: BytesMut,
    /// Where the next terminator search starts.
    scan_from: usize,
    /// Current parsing state.
    state: State<E>,
    /// Option parsers applied to every header.
    parsers: Arc<ParserRegistry<E>>,
    /// Maximum accepted header size.
    max_header_size: usize,
    /// Maximum accepted declared content length.
    max_content_length: usize,
}

impl<E: Envelope> PacketReader<E> {
    /// Create a reader with default limits and parsers.
    pub fn new() -> Self {
        Self::with_parsers(Arc::new(ParserRegistry::new()))
    }

    /// Create a reader using a caller-supplied parser registry.
    pub fn with_parsers(parsers: Arc<ParserRegistry<E>>) -> Self {
        Self {
            header_buf: BytesMut::with_capacity(1024),
            content_buf: BytesMut::new(),
            scan_from: 0,
            state: State::AwaitingHeader,
            parsers,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }

    /// Set the header and content size limits.
    pub fn with_limits(mut self, max_header_size: usize, max_content_length: usize) -> Self {
        self.max_header_size = max_header_size;
        self.max_content_length = max_content_length;
        self
    }

    /// Consume a chunk of bytes.
    ///
    /// Returns `Ok(None)` while more data is needed and `Ok(Some(packet))`
    /// once the header and all declared content have arrived. Calling it
    /// again after a packet was produced starts a new exchange.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvelopeError`] if the header is malformed, names an
    /// unsupported method or content type, or exceeds the configured limits.
    /// The reader is reset in that case.
    pub fn read_packet(&mut self, data: &[u8]) -> Result<Option<Packet<E>>, EnvelopeError> {
        if matches!(self.state, State::Ready) {
            self.clear();
        }

        let result = match self.state {
            State::AwaitingHeader => self.read_header(data),
            State::AwaitingBody { .. } => {
                self.content_buf.extend_from_slice(data);
                Ok(())
            }
            State::Ready => Ok(()),
        };

        if let Err(e) = result {
            self.clear();
            return Err(e);
        }

        Ok(self.try_complete())
    }

    /// Drop all accumulated state.
    pub fn clear(&mut self) {
        self.header_buf.clear();
        self.content_buf.clear();
        self.scan_from = 0;
        self.state = State::AwaitingHeader;
    }

    /// Whether the last push produced a packet.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready)
    }

    /// Number of buffered bytes not yet part of a produced packet.
    pub fn buffered(&self) -> usize {
        self.header_buf.len() + self.content_buf.len()
    }

    fn read_header(&mut self, data: &[u8]) -> Result<(), EnvelopeError> {
        self.header_buf.extend_from_slice(data);

        let Some(end) = find_terminator(&self.header_buf, self.scan_from) else {
            if self.header_buf.len() > self.max_header_size {
                return Err(EnvelopeError::TooLarge {
                    what: "header",
                    limit: self.max_header_size,
                });
            }
            // A terminator may straddle the next chunk boundary.
            self.scan_from = self.header_buf.len().saturating_sub(3);
            return Ok(());
        };

        if end > self.max_header_size {
            return Err(EnvelopeError::TooLarge {
                what: "header",
                limit: self.max_header_size,
            });
        }

        let (header, consumed) = E::parse_with(&self.header_buf, &self.parsers)?;

        let declared = header.header().content_length();
        if declared > self.max_content_length {
            return Err(EnvelopeError::TooLarge {
                what: "content",
                limit: self.max_content_length,
            });
        }

        tracing::debug!(declared, "Header complete");

        self.content_buf
            .extend_from_slice(&self.header_buf[consumed..]);
        self.header_buf.clear();
        self.state = State::AwaitingBody { header };
        Ok(())
    }

    fn try_complete(&mut self) -> Option<Packet<E>> {
        let declared = match &self.state {
            State::AwaitingBody { header } => header.header().content_length(),
            _ => return None,
        };

        if self.content_buf.len() < declared {
            return None;
        }

        let State::AwaitingBody { header } = std::mem::replace(&mut self.state, State::Ready)
        else {
            return None;
        };

        if self.content_buf.len() > declared {
            tracing::debug!(
                discarded = self.content_buf.len() - declared,
                "Dropping bytes past declared content length"
            );
        }
        self.content_buf.truncate(declared);
        let content = self.content_buf.split().freeze();

        Some(Packet::new(header, content))
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::AwaitingHeader => "AwaitingHeader",
            State::AwaitingBody { .. } => "AwaitingBody",
            State::Ready => "Ready",
        }
    }
}

impl<E: Envelope> Default for PacketReader<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset just past the first header terminator at or after `from`.
///
/// `\r\n\r\n` takes precedence over `\n\n`.
fn find_terminator(buf: &[u8], from: usize) -> Option<usize> {
    let tail = buf.get(from..)?;

    if let Some(i) = tail.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(from + i + 4);
    }
    tail.windows(2)
        .position(|w| w == b"\n\n")
        .map(|i| from + i + 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestHeader, ResponseHeader};
    use bytes::Bytes;
    use proptest::prelude::*;

    const WHOLE: &[u8] = b"POST /RPC2 HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello";
    const HEAD_LEN: usize = WHOLE.len() - 5;

    #[test]
    fn test_whole_exchange_in_one_chunk() {
        let mut reader = PacketReader::<RequestHeader>::new();
        let packet = reader.read_packet(WHOLE).unwrap().unwrap();

        assert_eq!(packet.header().uri(), "/RPC2");
        assert_eq!(packet.header().host(), "h");
        assert_eq!(packet.content(), b"hello");
        assert_eq!(reader.state_name(), "Ready");
    }

    #[test]
    fn test_header_then_body_chunks() {
        let mut whole_reader = PacketReader::<RequestHeader>::new();
        let expected = whole_reader.read_packet(WHOLE).unwrap().unwrap();

        let mut reader = PacketReader::<RequestHeader>::new();
        assert!(reader.read_packet(&WHOLE[..HEAD_LEN]).unwrap().is_none());
        assert_eq!(reader.state_name(), "AwaitingBody");

        let packet = reader.read_packet(&WHOLE[HEAD_LEN..]).unwrap().unwrap();
        assert_eq!(packet, expected);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut whole_reader = PacketReader::<RequestHeader>::new();
        let expected = whole_reader.read_packet(WHOLE).unwrap().unwrap();

        let mut reader = PacketReader::<RequestHeader>::new();
        let mut produced = Vec::new();

        for byte in WHOLE {
            if let Some(packet) = reader.read_packet(&[*byte]).unwrap() {
                produced.push(packet);
            }
        }

        assert_eq!(produced, vec![expected]);
    }

    #[test]
    fn test_every_split_point() {
        let mut whole_reader = PacketReader::<RequestHeader>::new();
        let expected = whole_reader.read_packet(WHOLE).unwrap().unwrap();

        for split in 1..WHOLE.len() {
            let mut reader = PacketReader::<RequestHeader>::new();
            let first = reader.read_packet(&WHOLE[..split]).unwrap();
            assert!(first.is_none(), "premature packet at split {}", split);

            let packet = reader.read_packet(&WHOLE[split..]).unwrap().unwrap();
            assert_eq!(packet, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_short_body_needs_more_data() {
        let mut reader = PacketReader::<RequestHeader>::new();
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";

        assert!(reader.read_packet(raw).unwrap().is_none());
        assert_eq!(reader.state_name(), "AwaitingBody");
        assert_eq!(reader.buffered(), 3);
    }

    #[test]
    fn test_extra_bytes_are_discarded() {
        let mut reader = PacketReader::<RequestHeader>::new();
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 2\r\n\r\nokPOST / HTTP/1.1\r\n";

        let packet = reader.read_packet(raw).unwrap().unwrap();
        assert_eq!(packet.content(), b"ok");
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_zero_length_body() {
        let mut reader = PacketReader::<ResponseHeader>::new();
        let packet = reader
            .read_packet(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n")
            .unwrap()
            .unwrap();

        assert_eq!(packet.header().code(), 404);
        assert!(packet.content().is_empty());
    }

    #[test]
    fn test_lf_only_terminator() {
        let mut reader = PacketReader::<RequestHeader>::new();
        let packet = reader
            .read_packet(b"POST /x HTTP/1.0\ncontent-length: 1\n\nZ")
            .unwrap()
            .unwrap();
        assert_eq!(packet.content(), b"Z");
    }

    #[test]
    fn test_get_rejected_before_body() {
        let mut reader = PacketReader::<RequestHeader>::new();
        let err = reader
            .read_packet(b"GET /RPC2 HTTP/1.1\r\nContent-Length: 100\r\n\r\n")
            .unwrap_err();

        assert_eq!(err, EnvelopeError::MethodNotAllowed("GET".to_string()));
        assert_eq!(reader.state_name(), "AwaitingHeader");
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_malformed_header() {
        let mut reader = PacketReader::<RequestHeader>::new();
        let err = reader
            .read_packet(b"POST / HTTP/1.1\r\nnot-an-option\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn test_reuse_after_ready_starts_fresh() {
        let mut reader = PacketReader::<RequestHeader>::new();
        reader.read_packet(WHOLE).unwrap().unwrap();

        let partial = reader.read_packet(&WHOLE[..10]).unwrap();
        assert!(partial.is_none());
        assert_eq!(reader.state_name(), "AwaitingHeader");

        let packet = reader.read_packet(&WHOLE[10..]).unwrap().unwrap();
        assert_eq!(packet.content(), b"hello");
    }

    #[test]
    fn test_header_size_limit() {
        let mut reader = PacketReader::<RequestHeader>::new().with_limits(16, 1024);
        let err = reader
            .read_packet(b"POST /a/very/long/uri HTTP/1.1\r\n")
            .unwrap_err();

        assert_eq!(err, EnvelopeError::TooLarge { what: "header", limit: 16 });
    }

    #[test]
    fn test_content_length_limit() {
        let mut reader = PacketReader::<RequestHeader>::new().with_limits(1024, 4);
        let err = reader
            .read_packet(b"POST / HTTP/1.1\r\ncontent-length: 5\r\n\r\n")
            .unwrap_err();

        assert_eq!(err, EnvelopeError::TooLarge { what: "content", limit: 4 });
    }

    #[test]
    fn test_clear_resets_state() {
        let mut reader = PacketReader::<RequestHeader>::new();
        reader.read_packet(&WHOLE[..HEAD_LEN + 2]).unwrap();
        assert_eq!(reader.state_name(), "AwaitingBody");

        reader.clear();

        assert_eq!(reader.state_name(), "AwaitingHeader");
        assert_eq!(reader.buffered(), 0);
        assert!(!reader.is_ready());
    }

    #[test]
    fn test_find_terminator() {
        assert_eq!(find_terminator(b"a\r\n\r\nb", 0), Some(5));
        assert_eq!(find_terminator(b"a\n\nb", 0), Some(3));
        assert_eq!(find_terminator(b"a\r\nb", 0), None);
        assert_eq!(find_terminator(b"ab", 5), None);
    }

    prop_compose! {
        fn wire_request()(
            body in prop::collection::vec(any::<u8>(), 0..512),
            keep_alive in any::<bool>(),
        ) -> Bytes {
            let mut packet = Packet::new(RequestHeader::new("/RPC2", "h").unwrap(), body);
            packet.set_keep_alive(keep_alive);
            packet.dump()
        }
    }

    proptest! {
        #[test]
        fn test_any_chunking_yields_same_packet(
            wire in wire_request(),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let expected = PacketReader::<RequestHeader>::new()
                .read_packet(&wire)
                .unwrap()
                .unwrap();

            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(wire.len())).collect();
            points.push(wire.len());
            points.sort_unstable();
            points.dedup();

            let mut reader = PacketReader::<RequestHeader>::new();
            let mut produced = Vec::new();
            let mut start = 0;
            for end in points {
                if let Some(packet) = reader.read_packet(&wire[start..end]).unwrap() {
                    produced.push(packet);
                }
                start = end;
            }

            prop_assert_eq!(produced, vec![expected]);
        }
    }
}
