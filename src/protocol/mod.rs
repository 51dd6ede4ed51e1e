//! Protocol module - HTTP envelope parsing and packet framing.
//!
//! This module implements the transport-independent HTTP layer:
//! - [`Header`] option store with a per-option [`ParserRegistry`]
//! - [`RequestHeader`] / [`ResponseHeader`] envelopes
//! - [`Packet`] pairing an envelope with its content
//! - [`PacketReader`] for accumulating arbitrarily chunked reads
//! - [`EnvelopeError`] / [`ErrorResponse`] for 400/405/415 failures

mod error;
mod header;
mod packet;
mod packet_reader;
mod request;
mod response;

pub use error::{EnvelopeError, ErrorResponse};
pub use header::{
    Envelope, Header, OptionParser, ParserRegistry, ALLOWED, CONNECTION, CONTENT_LENGTH,
    CONTENT_TYPE, DATE, DELIMITER, HOST, SERVER, USER_AGENT, XML_CONTENT_TYPE,
};
pub(crate) use header::check_token;
pub use packet::{Packet, RequestPacket, ResponsePacket};
pub use packet_reader::{PacketReader, DEFAULT_MAX_CONTENT_LENGTH, DEFAULT_MAX_HEADER_SIZE};
pub use request::{RequestHeader, DEFAULT_USER_AGENT, REQUEST_VERSION, SUPPORTED_METHOD};
pub use response::{ResponseHeader, DEFAULT_SERVER_NAME, RESPONSE_VERSION, STATUS_OK};
