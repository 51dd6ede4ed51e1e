//! Packet: an envelope paired with its content.
//!
//! The header's content length always equals the content's byte length;
//! every way of attaching content goes through
//! [`Header::set_content_length`](super::Header::set_content_length).
//!
//! # Example
//!
//! ```
//! use rpcwire::protocol::{Envelope, Packet, RequestHeader};
//!
//! let packet = Packet::new(RequestHeader::new("/RPC2", "localhost").unwrap(), "<call/>");
//!
//! assert_eq!(packet.header().header().content_length(), 7);
//! assert!(packet.dump().ends_with(b"\r\n\r\n<call/>"));
//! ```

use bytes::{Bytes, BytesMut};

use super::header::{Envelope, CONNECTION};
use super::request::RequestHeader;
use super::response::ResponseHeader;

/// Packet carrying a request envelope.
pub type RequestPacket = Packet<RequestHeader>;

/// Packet carrying a response envelope.
pub type ResponsePacket = Packet<ResponseHeader>;

/// A complete HTTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<E> {
    header: E,
    content: Bytes,
}

impl<E: Envelope> Packet<E> {
    /// Pair `header` with `content`, fixing up the content length.
    pub fn new(mut header: E, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        header.header_mut().set_content_length(content.len());
        Self { header, content }
    }

    /// The envelope.
    #[inline]
    pub fn header(&self) -> &E {
        &self.header
    }

    /// Content bytes.
    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content as `Bytes` (cheap clone).
    #[inline]
    pub fn content_bytes(&self) -> Bytes {
        self.content.clone()
    }

    /// Replace the content, updating the declared length.
    pub fn set_content(&mut self, content: impl Into<Bytes>) {
        self.content = content.into();
        self.header
            .header_mut()
            .set_content_length(self.content.len());
    }

    /// Set `connection: keep-alive` or `connection: close`.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.header.header_mut().put_option(CONNECTION, value.to_string());
    }

    /// Whether the peer should keep the connection open.
    pub fn keep_alive(&self) -> bool {
        self.header
            .header()
            .option(CONNECTION)
            .is_some_and(|v| v.eq_ignore_ascii_case("keep-alive"))
    }

    /// Split into envelope and content.
    pub fn into_parts(self) -> (E, Bytes) {
        (self.header, self.content)
    }

    /// Wire representation: envelope followed by content.
    pub fn dump(&self) -> Bytes {
        let head = self.header.dump();
        let mut buf = BytesMut::with_capacity(head.len() + self.content.len());
        buf.extend_from_slice(head.as_bytes());
        buf.extend_from_slice(&self.content);
        buf.freeze()
    }
}
