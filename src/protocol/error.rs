//! Envelope-level failures and the HTTP error responses they turn into.
//!
//! An [`ErrorResponse`] is both an error value and a ready-to-send response:
//! the layer that catches it sends its serialization as-is.
//!
//! # Example
//!
//! ```
//! use rpcwire::protocol::{EnvelopeError, ErrorResponse};
//!
//! let err = EnvelopeError::MethodNotAllowed("GET".into());
//! let response: ErrorResponse = err.into();
//!
//! assert_eq!(response.status(), 405);
//! let wire = response.dump();
//! assert!(wire.starts_with(b"HTTP/1.1 405 Method not allowed\r\n"));
//! ```

use bytes::Bytes;
use thiserror::Error;

use super::header::{check_option, clean_phrase, Envelope, ALLOWED, CONTENT_LENGTH};
use super::packet::{Packet, ResponsePacket};
use super::request::SUPPORTED_METHOD;
use super::response::ResponseHeader;

/// Failure to read or accept an HTTP envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Syntax error in the header or start line.
    #[error("Malformed HTTP packet: {0}")]
    Malformed(&'static str),

    /// Request method other than `POST`.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Content type other than `text/xml`.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Option name, option value or start line field that cannot be written
    /// without breaking the envelope.
    #[error("invalid {what}: {value:?}")]
    Invalid {
        /// Which field was rejected.
        what: &'static str,
        /// Rejected input.
        value: String,
    },

    /// Header or declared content beyond the configured limit.
    #[error("{what} exceeds limit of {limit} bytes")]
    TooLarge {
        /// Which part of the packet overflowed.
        what: &'static str,
        /// Configured limit.
        limit: usize,
    },
}

impl EnvelopeError {
    /// The HTTP response that reports this failure to the peer.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            EnvelopeError::Malformed(_)
            | EnvelopeError::Invalid { .. }
            | EnvelopeError::TooLarge { .. } => {
                ErrorResponse::bad_request()
            }
            EnvelopeError::MethodNotAllowed(_) => ErrorResponse::method_not_allowed(),
            EnvelopeError::UnsupportedContentType(_) => ErrorResponse::unsupported_media_type(),
        }
    }
}

/// HTTP-level error that doubles as a serializable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP: {status} {phrase}")]
pub struct ErrorResponse {
    status: u16,
    phrase: String,
    options: Vec<(String, String)>,
}

impl ErrorResponse {
    /// Error response with an arbitrary status.
    ///
    /// Control characters in `phrase` are replaced with spaces.
    pub fn new(status: u16, phrase: impl Into<String>) -> Self {
        Self {
            status,
            phrase: clean_phrase(&phrase.into()),
            options: Vec::new(),
        }
    }

    /// `400 Bad request`.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad request")
    }

    /// `405 Method not allowed`, naming the supported method.
    pub fn method_not_allowed() -> Self {
        let mut response = Self::new(405, "Method not allowed");
        response
            .options
            .push((ALLOWED.to_string(), SUPPORTED_METHOD.to_string()));
        response
    }

    /// `415 Unsupported media type`.
    pub fn unsupported_media_type() -> Self {
        Self::new(415, "Unsupported media type")
    }

    /// `500 Internal server error`.
    pub fn internal_error() -> Self {
        Self::new(500, "Internal server error")
    }

    /// Attach an extra option to the response header.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Invalid`] for a name without its trailing
    /// `:`, a value with line breaks, or `content-length:`, which always
    /// describes the (empty) content.
    pub fn with_option(mut self, name: &str, value: impl Into<String>) -> Result<Self, EnvelopeError> {
        let name = name.to_ascii_lowercase();
        if name == CONTENT_LENGTH {
            return Err(EnvelopeError::Invalid {
                what: "option name",
                value: name,
            });
        }

        let value = value.into();
        check_option(&name, &value)?;
        self.options.push((name, value.trim().to_string()));
        Ok(self)
    }

    /// Status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase.
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Extra options carried by this response.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Response header for this error, with the extra options applied.
    pub fn response_header(&self) -> ResponseHeader {
        let mut header = ResponseHeader::new(self.status, self.phrase.clone());
        for (name, value) in &self.options {
            header.header_mut().put_option(name, value.clone());
        }
        header
    }

    /// Response packet with empty content.
    pub fn to_packet(&self) -> ResponsePacket {
        Packet::new(self.response_header(), Bytes::new())
    }

    /// Wire representation.
    pub fn dump(&self) -> Bytes {
        self.to_packet().dump()
    }
}

impl From<EnvelopeError> for ErrorResponse {
    fn from(err: EnvelopeError) -> Self {
        err.to_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CONTENT_LENGTH;

    #[test]
    fn test_envelope_error_status_mapping() {
        assert_eq!(EnvelopeError::Malformed("x").to_response().status(), 400);
        assert_eq!(
            EnvelopeError::TooLarge { what: "header", limit: 1 }
                .to_response()
                .status(),
            400
        );
        assert_eq!(
            EnvelopeError::MethodNotAllowed("GET".into())
                .to_response()
                .status(),
            405
        );
        assert_eq!(
            EnvelopeError::UnsupportedContentType("a/b".into())
                .to_response()
                .status(),
            415
        );
    }

    #[test]
    fn test_method_not_allowed_names_post() {
        let packet = ErrorResponse::method_not_allowed().to_packet();
        assert_eq!(packet.header().header().option(ALLOWED), Some("POST"));
    }

    #[test]
    fn test_error_packet_has_empty_content() {
        let packet = ErrorResponse::bad_request().to_packet();

        assert!(packet.content().is_empty());
        assert_eq!(packet.header().code(), 400);
        assert_eq!(packet.header().header().option(CONTENT_LENGTH), Some("0"));
        assert!(!packet.keep_alive());
    }

    #[test]
    fn test_with_option_validates() {
        let response = ErrorResponse::new(503, "Busy")
            .with_option("Retry-After:", " 5 ")
            .unwrap();
        assert_eq!(
            response.to_packet().header().header().option("retry-after:"),
            Some("5")
        );

        for (name, value) in [
            ("retry-after", "5"),
            ("x-note:", "a\r\nx-evil: 1"),
            ("content-length:", "9"),
        ] {
            let err = ErrorResponse::new(503, "Busy").with_option(name, value).unwrap_err();
            assert!(matches!(err, EnvelopeError::Invalid { .. }), "{}", name);
        }
    }

    #[test]
    fn test_phrase_line_breaks_removed() {
        let response = ErrorResponse::new(500, "oops\r\nx-evil: 1");
        let wire = response.dump();
        let (header, consumed) = ResponseHeader::parse(&wire).unwrap();

        assert_eq!(consumed, wire.len());
        assert_eq!(header.phrase(), response.phrase());
        assert_eq!(header.header().option("x-evil:"), None);
    }

    #[test]
    fn test_error_display() {
        let err = ErrorResponse::unsupported_media_type();
        assert_eq!(err.to_string(), "HTTP: 415 Unsupported media type");
    }

    #[test]
    fn test_dump_is_parseable_response() {
        let wire = ErrorResponse::method_not_allowed().dump();
        let (header, consumed) = ResponseHeader::parse(&wire).unwrap();

        assert_eq!(consumed, wire.len());
        assert_eq!(header.code(), 405);
        assert_eq!(header.phrase(), "Method not allowed");
    }
}
