//! Client builder, per-connection protocol and TCP client.
//!
//! The [`ClientBuilder`] provides a fluent API for the request target and
//! limits. [`ClientProtocol`] is the transport-independent half: it builds
//! request packets, feeds response bytes into a [`PacketReader`] and turns the
//! finished response into a value, an HTTP error or a fault. [`Client`] drives
//! it over a `tokio::net::TcpStream`.
//!
//! # Example
//!
//! ```no_run
//! use rpcwire::codec::Value;
//! use rpcwire::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::builder()
//!         .uri("/RPC2")
//!         .host("rpc.example.com")
//!         .build("127.0.0.1:8080".parse()?);
//!
//!     let reply = client.call("echo", vec![Value::from("hello")]).await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::codec::{Call, JsonCodec, PayloadCodec, Value};
use crate::error::{Result, RpcError};
use crate::protocol::{
    ErrorResponse, Packet, PacketReader, RequestHeader, RequestPacket, ResponseHeader,
    ResponsePacket, DEFAULT_MAX_CONTENT_LENGTH, DEFAULT_MAX_HEADER_SIZE, DEFAULT_USER_AGENT,
};
use crate::server::DEFAULT_READ_BUFFER_SIZE;
use crate::transport;

/// Default request target.
pub const DEFAULT_URI: &str = "/RPC2";

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Request target.
    pub uri: String,
    /// Value of the `host:` option.
    pub host: String,
    /// Value of the `user-agent:` option.
    pub user_agent: String,
    /// Ask the server to keep the connection open.
    pub keep_alive: bool,
    /// Maximum accepted response header size.
    pub max_header_size: usize,
    /// Maximum accepted declared response length.
    pub max_content_length: usize,
    /// Size of the read buffer.
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            host: "localhost".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            keep_alive: false,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Builder for configuring and creating a [`Client`] or [`ClientProtocol`].
pub struct ClientBuilder<C = JsonCodec> {
    codec: C,
    config: ClientConfig,
}

impl ClientBuilder<JsonCodec> {
    /// Create a new client builder using [`JsonCodec`].
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for ClientBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PayloadCodec> ClientBuilder<C> {
    /// Create a new client builder using `codec` for payloads.
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec,
            config: ClientConfig::default(),
        }
    }

    /// Set the request target.
    ///
    /// Default: `/RPC2`
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.config.uri = uri.into();
        self
    }

    /// Set the `host:` option value.
    ///
    /// Default: `localhost`
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the `user-agent:` option value.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Ask the server to keep connections open between calls.
    ///
    /// Default: false
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.config.keep_alive = enabled;
        self
    }

    /// Set the maximum response header size.
    pub fn max_header_size(mut self, limit: usize) -> Self {
        self.config.max_header_size = limit;
        self
    }

    /// Set the maximum declared response length.
    pub fn max_content_length(mut self, limit: usize) -> Self {
        self.config.max_content_length = limit;
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the transport-independent protocol state.
    pub fn protocol(self) -> ClientProtocol<C> {
        let reader = PacketReader::new()
            .with_limits(self.config.max_header_size, self.config.max_content_length);

        ClientProtocol {
            codec: self.codec,
            config: self.config,
            reader,
            reusable: false,
        }
    }

    /// Build a TCP client for `addr`. Connects lazily on the first call.
    pub fn build(self, addr: SocketAddr) -> Client<C> {
        Client {
            addr,
            protocol: self.protocol(),
            stream: None,
        }
    }
}

/// Client side of one connection.
pub struct ClientProtocol<C = JsonCodec> {
    codec: C,
    config: ClientConfig,
    reader: PacketReader<ResponseHeader>,
    reusable: bool,
}

impl<C: PayloadCodec> ClientProtocol<C> {
    /// Build the request packet for `call`.
    ///
    /// Fails with [`RpcError::Envelope`] if the configured URI, host or
    /// user agent is not a single token.
    pub fn request_packet(&self, call: &Call) -> Result<RequestPacket> {
        let header = RequestHeader::new(self.config.uri.clone(), self.config.host.clone())?
            .with_user_agent(self.config.user_agent.clone())?;
        let body = self.codec.encode_call(call)?;

        let mut packet = Packet::new(header, body);
        packet.set_keep_alive(self.config.keep_alive);
        Ok(packet)
    }

    /// Feed received bytes into the response reader.
    ///
    /// Returns `Ok(None)` while more data is needed.
    pub fn read_response(&mut self, chunk: &[u8]) -> Result<Option<ResponsePacket>> {
        let packet = self.reader.read_packet(chunk)?;
        if let Some(packet) = &packet {
            self.reusable = self.config.keep_alive && packet.keep_alive();
            tracing::debug!(
                code = packet.header().code(),
                length = packet.content().len(),
                "Response received"
            );
        }
        Ok(packet)
    }

    /// Turn a complete response into the call's result.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Http`] for a non-200 status, carrying code and phrase
    /// - [`RpcError::Fault`] if the server reported a fault
    /// - [`RpcError::Codec`] if the content cannot be decoded
    pub fn finish(&self, packet: ResponsePacket) -> Result<Value> {
        let header = packet.header();
        if !header.is_success() {
            tracing::warn!(code = header.code(), phrase = header.phrase(), "Call rejected");
            return Err(ErrorResponse::new(header.code(), header.phrase()).into());
        }

        self.codec
            .decode_response(packet.content())?
            .map_err(RpcError::Fault)
    }

    /// Drop any partially read response.
    pub fn reset(&mut self) {
        self.reader.clear();
        self.reusable = false;
    }

    /// Whether the last response allows sending another request on the same
    /// connection.
    pub fn connection_reusable(&self) -> bool {
        self.reusable
    }

    /// Client settings.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Configured read buffer size.
    pub fn read_buffer_size(&self) -> usize {
        self.config.read_buffer_size
    }
}

impl<C> fmt::Debug for ClientProtocol<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProtocol")
            .field("config", &self.config)
            .field("reusable", &self.reusable)
            .finish_non_exhaustive()
    }
}

/// TCP client. Keeps the connection between calls when keep-alive was
/// negotiated, reconnects otherwise.
pub struct Client<C = JsonCodec> {
    addr: SocketAddr,
    protocol: ClientProtocol<C>,
    stream: Option<TcpStream>,
}

impl Client<JsonCodec> {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder<JsonCodec> {
        ClientBuilder::new()
    }
}

impl<C: PayloadCodec> Client<C> {
    /// Call `method` with `params` and wait for the result.
    pub async fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value> {
        let call = Call::new(method, params);

        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                tracing::debug!(addr = %self.addr, "Connecting");
                TcpStream::connect(self.addr).await?
            }
        };

        let result = transport::exchange(&mut stream, &mut self.protocol, &call).await;

        let answered = matches!(result, Ok(_) | Err(RpcError::Http(_)) | Err(RpcError::Fault(_)));
        if answered && self.protocol.connection_reusable() {
            self.stream = Some(stream);
        }

        result
    }

    /// Server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether a connection is held open for the next call.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl<C> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.addr)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use crate::protocol::{Envelope, EnvelopeError, CONNECTION, HOST, USER_AGENT};

    fn response(status_line: &str, extra: &str, body: &str) -> Vec<u8> {
        format!(
            "{}\r\n{}content-length: {}\r\n\r\n{}",
            status_line,
            extra,
            body.len(),
            body
        )
        .into_bytes()
    }

    #[test]
    fn test_request_packet_headers() {
        let protocol = ClientBuilder::new()
            .uri("/api")
            .host("rpc.example.com")
            .user_agent("tester/2")
            .protocol();

        let packet = protocol
            .request_packet(&Call::new("echo", vec![Value::from(1)]))
            .unwrap();
        let header = packet.header();

        assert_eq!(header.uri(), "/api");
        assert_eq!(header.header().option(HOST), Some("rpc.example.com"));
        assert_eq!(header.header().option(USER_AGENT), Some("tester/2"));
        assert_eq!(header.header().option(CONNECTION), Some("close"));
        assert_eq!(header.header().content_length(), packet.content().len());

        let wire = packet.dump();
        let (parsed, _) = RequestHeader::parse(&wire).unwrap();
        assert_eq!(parsed.host(), "rpc.example.com");
    }

    #[test]
    fn test_request_fields_must_be_tokens() {
        let call = Call::new("echo", vec![]);

        let err = ClientBuilder::new()
            .host("evil\r\nx-injected: 1")
            .protocol()
            .request_packet(&call)
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::Envelope(EnvelopeError::Invalid { what: "host", .. })
        ));

        let err = ClientBuilder::new()
            .user_agent("two words")
            .protocol()
            .request_packet(&call)
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::Envelope(EnvelopeError::Invalid { what: "user agent", .. })
        ));

        assert!(ClientBuilder::new()
            .uri("/a b")
            .protocol()
            .request_packet(&call)
            .is_err());
    }

    #[test]
    fn test_successful_response() {
        let mut protocol = ClientBuilder::new().protocol();
        let bytes = response("HTTP/1.1 200 OK", "content-type: text/xml\r\n", r#"{"result":7}"#);

        let packet = protocol.read_response(&bytes).unwrap().unwrap();
        assert_eq!(protocol.finish(packet).unwrap(), Value::from(7));
    }

    #[test]
    fn test_response_across_chunks() {
        let mut protocol = ClientBuilder::new().protocol();
        let bytes = response("HTTP/1.1 200 OK", "", r#"{"result":"ok"}"#);
        let (head, tail) = bytes.split_at(10);

        assert!(protocol.read_response(head).unwrap().is_none());
        let packet = protocol.read_response(tail).unwrap().unwrap();
        assert_eq!(protocol.finish(packet).unwrap(), Value::from("ok"));
    }

    #[test]
    fn test_not_found_status_is_error() {
        let mut protocol = ClientBuilder::new().protocol();
        let bytes = response("HTTP/1.1 404 Not Found", "content-type: text/html\r\n", "<h1>gone</h1>");

        let packet = protocol.read_response(&bytes).unwrap().unwrap();
        let err = protocol.finish(packet).unwrap_err();

        assert_eq!(err.status(), Some((404, "Not Found")));
    }

    #[test]
    fn test_fault_response_is_error() {
        let mut protocol = ClientBuilder::new().protocol();
        let bytes = response(
            "HTTP/1.1 200 OK",
            "",
            r#"{"fault":{"faultCode":3,"faultString":"nope"}}"#,
        );

        let packet = protocol.read_response(&bytes).unwrap().unwrap();
        match protocol.finish(packet) {
            Err(RpcError::Fault(fault)) => assert_eq!(fault, Fault::new(3, "nope")),
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_response_is_envelope_error() {
        let mut protocol = ClientBuilder::new().protocol();
        let err = protocol
            .read_response(b"HTTP/1.1 abc OK\r\n\r\n")
            .unwrap_err();

        assert!(matches!(err, RpcError::Envelope(_)));
    }

    #[test]
    fn test_keep_alive_needs_both_sides() {
        let body = r#"{"result":null}"#;
        let bytes = response("HTTP/1.1 200 OK", "connection: keep-alive\r\n", body);

        let mut without = ClientBuilder::new().protocol();
        without.read_response(&bytes).unwrap().unwrap();
        assert!(!without.connection_reusable());

        let mut with = ClientBuilder::new().keep_alive(true).protocol();
        with.read_response(&bytes).unwrap().unwrap();
        assert!(with.connection_reusable());

        with.reset();
        assert!(!with.connection_reusable());
    }
}
