//! Server builder and per-connection protocol.
//!
//! The [`ServerBuilder`] provides a fluent API for registering methods,
//! interceptors and an execution strategy. The built [`Server`] is a cheap
//! handle shared by all connections; each connection gets its own
//! [`ServerProtocol`], which:
//! 1. Feeds received bytes into a [`PacketReader`]
//! 2. Decodes the call with the payload codec
//! 3. Creates the method through the [`Dispatcher`]
//! 4. Runs it through the interceptor chain on the executor
//! 5. Encodes the result or fault into a response packet
//!
//! Envelope failures become `400`/`405`/`415` responses; everything after
//! the envelope was accepted becomes a fault inside a `200` response.
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::Value;
//! use rpcwire::Server;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let server = Server::builder()
//!     .method("echo", |_ctx, params| Ok(params.first().cloned().unwrap_or(Value::Null)))
//!     .build()
//!     .unwrap();
//!
//! let mut conn = server.connection("127.0.0.1:4000".parse().unwrap());
//! let request = b"POST /RPC2 HTTP/1.0\r\ncontent-type: text/xml\r\ncontent-length: 37\r\n\r\n{\"methodName\":\"echo\",\"params\":[\"hi\"]}";
//! let response = conn.feed(&request[..]).await.unwrap();
//!
//! assert_eq!(response.header().code(), 200);
//! # }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::codec::{Call, JsonCodec, PayloadCodec, Response, Value};
use crate::error::{Fault, PARSE_ERROR};
use crate::handler::{
    Dispatcher, Executor, Interceptor, InterceptorChain, Method, MethodContext, MethodFactory,
    MethodResult, MethodTask, SerialExecutor, ServerFeedback,
};
use crate::protocol::{
    check_token, EnvelopeError, ErrorResponse, Packet, PacketReader, ParserRegistry, RequestHeader,
    RequestPacket, ResponseHeader, ResponsePacket, DEFAULT_MAX_CONTENT_LENGTH,
    DEFAULT_MAX_HEADER_SIZE, DEFAULT_SERVER_NAME, STATUS_OK,
};

/// Default socket read buffer size (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Value of the `server:` option on every response.
    pub server_name: String,
    /// Allow `connection: keep-alive` when the client asks for it.
    pub keep_alive: bool,
    /// Maximum accepted request header size.
    pub max_header_size: usize,
    /// Maximum accepted declared content length.
    pub max_content_length: usize,
    /// Size of the per-connection read buffer.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            keep_alive: false,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder<C = JsonCodec> {
    dispatcher: Dispatcher,
    chain: InterceptorChain,
    executor: Arc<dyn Executor>,
    parsers: ParserRegistry<RequestHeader>,
    codec: C,
    config: ServerConfig,
}

impl ServerBuilder<JsonCodec> {
    /// Create a new server builder using [`JsonCodec`].
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for ServerBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PayloadCodec> ServerBuilder<C> {
    /// Create a new server builder using `codec` for payloads.
    pub fn with_codec(codec: C) -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            chain: InterceptorChain::new(),
            executor: Arc::new(SerialExecutor),
            parsers: ParserRegistry::new(),
            codec,
            config: ServerConfig::default(),
        }
    }

    /// Register a plain function as a method.
    pub fn method<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&MethodContext, &[Value]) -> MethodResult + Send + Sync + 'static,
    {
        self.dispatcher.register_fn(name, function);
        self
    }

    /// Register a method factory.
    pub fn register<M: MethodFactory>(mut self, name: &str, factory: M) -> Self {
        self.dispatcher.register(name, factory);
        self
    }

    /// Register a default-constructible method type.
    pub fn register_default<T: Method + Default>(mut self, name: &str) -> Self {
        self.dispatcher.register_default::<T>(name);
        self
    }

    /// Add an interceptor inside the ones added before it.
    pub fn interceptor<I: Interceptor>(mut self, interceptor: I) -> Self {
        self.chain.push(interceptor);
        self
    }

    /// Set the execution strategy.
    ///
    /// Default: [`SerialExecutor`]
    pub fn executor<X: Executor>(mut self, executor: X) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    /// Register an extra request option parser.
    pub fn option_parser<F>(mut self, name: &str, parser: F) -> Self
    where
        F: Fn(&mut RequestHeader, &str) -> Result<(), EnvelopeError> + Send + Sync + 'static,
    {
        self.parsers.register(name, parser);
        self
    }

    /// Set the `server:` option value.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Allow keep-alive connections.
    ///
    /// Default: false
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.config.keep_alive = enabled;
        self
    }

    /// Set the maximum request header size.
    ///
    /// Default: 64 KiB
    pub fn max_header_size(mut self, limit: usize) -> Self {
        self.config.max_header_size = limit;
        self
    }

    /// Set the maximum declared content length.
    ///
    /// Default: 16 MiB
    pub fn max_content_length(mut self, limit: usize) -> Self {
        self.config.max_content_length = limit;
        self
    }

    /// Set the per-connection read buffer size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Envelope`](crate::RpcError::Envelope) if the
    /// configured server name is not a single token.
    pub fn build(self) -> crate::Result<Server<C>> {
        check_token("server name", &self.config.server_name)?;

        tracing::debug!(
            methods = ?self.dispatcher.method_names(),
            interceptors = self.chain.len(),
            "Server built"
        );

        Ok(Server {
            inner: Arc::new(Shared {
                dispatcher: self.dispatcher,
                chain: Arc::new(self.chain),
                executor: self.executor,
                parsers: Arc::new(self.parsers),
                codec: self.codec,
                config: self.config,
            }),
        })
    }
}

struct Shared<C> {
    dispatcher: Dispatcher,
    chain: Arc<InterceptorChain>,
    executor: Arc<dyn Executor>,
    parsers: Arc<ParserRegistry<RequestHeader>>,
    codec: C,
    config: ServerConfig,
}

/// A built server. Cheap to clone; all clones share methods and settings.
pub struct Server<C = JsonCodec> {
    inner: Arc<Shared<C>>,
}

impl Server<JsonCodec> {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder<JsonCodec> {
        ServerBuilder::new()
    }
}

impl<C: PayloadCodec> Server<C> {
    /// Protocol state for a new connection from `peer`.
    pub fn connection(&self, peer: SocketAddr) -> ServerProtocol<C> {
        let config = &self.inner.config;
        let reader = PacketReader::with_parsers(self.inner.parsers.clone())
            .with_limits(config.max_header_size, config.max_content_length);

        ServerProtocol {
            server: self.clone(),
            peer,
            reader,
        }
    }

    /// Handle shared with every method.
    pub fn feedback(&self) -> &ServerFeedback {
        self.inner.dispatcher.feedback()
    }

    /// Whether some method asked the server to stop.
    pub fn exit_requested(&self) -> bool {
        self.feedback().exit_requested()
    }

    /// Server settings.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Registered methods.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

impl<C> Clone for Server<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C> fmt::Debug for Server<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("dispatcher", &self.inner.dispatcher)
            .field("chain", &self.inner.chain)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Server side of one connection.
pub struct ServerProtocol<C = JsonCodec> {
    server: Server<C>,
    peer: SocketAddr,
    reader: PacketReader<RequestHeader>,
}

impl<C: PayloadCodec> ServerProtocol<C> {
    /// Feed received bytes into the request reader.
    ///
    /// # Errors
    ///
    /// Returns the [`ErrorResponse`] to send back if the envelope is
    /// rejected.
    pub fn read_request(&mut self, chunk: &[u8]) -> Result<Option<RequestPacket>, ErrorResponse> {
        self.reader.read_packet(chunk).map_err(|e| {
            tracing::warn!(peer = %self.peer, "Rejected request: {}", e);
            e.to_response()
        })
    }

    /// Produce the response for a complete request.
    ///
    /// Never fails: every failure after the envelope was accepted is
    /// reported as a fault.
    pub async fn execute(&self, request: &RequestPacket) -> ResponsePacket {
        let shared = &self.server.inner;

        let response = match shared.codec.decode_call(request.content()) {
            Ok(call) => self.dispatch(call).await,
            Err(e) => {
                tracing::warn!(peer = %self.peer, "Failed to decode call: {}", e);
                Err(Fault::new(PARSE_ERROR, e.to_string()))
            }
        };

        let body = match shared.codec.encode_response(&response) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(peer = %self.peer, "Failed to encode response: {}", e);
                match shared.codec.encode_response(&Err(Fault::unknown())) {
                    Ok(body) => body,
                    Err(_) => return self.error_packet(&ErrorResponse::internal_error()),
                }
            }
        };

        let header = ResponseHeader::new(STATUS_OK, "OK").served_by(shared.config.server_name.clone());
        let mut packet = Packet::new(header, body);
        packet.set_keep_alive(shared.config.keep_alive && request.keep_alive());
        packet
    }

    /// Feed received bytes and produce a response once a request completes.
    ///
    /// Returns `None` while more data is needed.
    pub async fn feed(&mut self, chunk: &[u8]) -> Option<ResponsePacket> {
        match self.read_request(chunk) {
            Ok(None) => None,
            Ok(Some(request)) => Some(self.execute(&request).await),
            Err(response) => Some(self.error_packet(&response)),
        }
    }

    /// Response packet for an envelope failure. Always closes the connection.
    pub fn error_packet(&self, error: &ErrorResponse) -> ResponsePacket {
        let header = error
            .response_header()
            .served_by(self.server.inner.config.server_name.clone());
        Packet::new(header, Bytes::new())
    }

    /// Drop any partially read request.
    pub fn reset(&mut self) {
        self.reader.clear();
    }

    /// Address of the connected client.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Configured read buffer size.
    pub fn read_buffer_size(&self) -> usize {
        self.server.inner.config.read_buffer_size
    }

    /// The server this connection belongs to.
    pub fn server(&self) -> &Server<C> {
        &self.server
    }

    async fn dispatch(&self, call: Call) -> Response {
        let shared = &self.server.inner;

        let Some(method) = shared.dispatcher.create(&call.method_name, self.peer) else {
            tracing::warn!(peer = %self.peer, method = %call.method_name, "Unknown method");
            return Err(Fault::method_not_found(&call.method_name));
        };

        tracing::debug!(peer = %self.peer, method = %call.method_name, "Dispatching call");

        let task = MethodTask::new(method, call.params, shared.chain.clone());
        shared.executor.run(task).await.map_err(|e| {
            tracing::error!(peer = %self.peer, method = %call.method_name, "Method failed: {}", e);
            e.into_fault()
        })
    }
}

impl<C> fmt::Debug for ServerProtocol<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProtocol")
            .field("peer", &self.peer)
            .field("buffered", &self.reader.buffered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RpcError, APPLICATION_ERROR, METHOD_NOT_FOUND};
    use crate::handler::{LoggingInterceptor, MethodError};
    use crate::protocol::{Envelope, ALLOWED, CONNECTION, SERVER};

    fn peer() -> SocketAddr {
        "192.168.1.7:40000".parse().unwrap()
    }

    fn request(body: &str, extra: &str) -> Vec<u8> {
        format!(
            "POST /RPC2 HTTP/1.0\r\ncontent-type: text/xml\r\ncontent-length: {}\r\n{}\r\n{}",
            body.len(),
            extra,
            body
        )
        .into_bytes()
    }

    fn server() -> Server {
        Server::builder()
            .method("echo", |_, params| Ok(Value::Array(params.to_vec())))
            .method("fail", |_, _| Err(MethodError::application("disk on fire")))
            .method("custom", |_, _| Err(Fault::new(42, "custom fault").into()))
            .method("panic", |_, _| panic!("method exploded"))
            .method("peer", |ctx, _| Ok(Value::from(ctx.peer_addr().to_string())))
            .build()
            .unwrap()
    }

    fn decode(packet: &ResponsePacket) -> Response {
        JsonCodec.decode_response(packet.content()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_call() {
        let mut conn = server().connection(peer());
        let response = conn
            .feed(&request(r#"{"methodName":"echo","params":[1,"two"]}"#, ""))
            .await
            .unwrap();

        assert_eq!(response.header().code(), 200);
        assert_eq!(response.header().phrase(), "OK");
        assert_eq!(decode(&response), Ok(serde_json::json!([1, "two"])));
        assert!(!response.keep_alive());
    }

    #[tokio::test]
    async fn test_partial_request_needs_more_data() {
        let mut conn = server().connection(peer());
        let bytes = request(r#"{"methodName":"echo"}"#, "");
        let (head, tail) = bytes.split_at(bytes.len() - 3);

        assert!(conn.feed(head).await.is_none());
        let response = conn.feed(tail).await.unwrap();
        assert_eq!(decode(&response), Ok(serde_json::json!([])));
    }

    #[tokio::test]
    async fn test_peer_address_reaches_method() {
        let mut conn = server().connection(peer());
        let response = conn
            .feed(&request(r#"{"methodName":"peer"}"#, ""))
            .await
            .unwrap();

        assert_eq!(decode(&response), Ok(Value::from("192.168.1.7:40000")));
    }

    #[tokio::test]
    async fn test_unknown_method_is_fault() {
        let mut conn = server().connection(peer());
        let response = conn
            .feed(&request(r#"{"methodName":"no.such"}"#, ""))
            .await
            .unwrap();

        assert_eq!(response.header().code(), 200);
        let fault = decode(&response).unwrap_err();
        assert_eq!(fault.code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_method_failures_become_faults() {
        let server = server();

        let cases = [
            ("fail", APPLICATION_ERROR, "disk on fire"),
            ("custom", 42, "custom fault"),
            ("panic", APPLICATION_ERROR, "Unknown Error"),
        ];

        for (name, code, message) in cases {
            let mut conn = server.connection(peer());
            let body = format!(r#"{{"methodName":"{}"}}"#, name);
            let response = conn.feed(&request(&body, "")).await.unwrap();

            assert_eq!(response.header().code(), 200, "{}", name);
            assert_eq!(decode(&response), Err(Fault::new(code, message)), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_parse_fault() {
        let mut conn = server().connection(peer());
        let response = conn.feed(&request("not a call", "")).await.unwrap();

        assert_eq!(response.header().code(), 200);
        assert_eq!(decode(&response).unwrap_err().code, PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_get_is_rejected_with_405() {
        let mut conn = server().connection(peer());
        let response = conn
            .feed(b"GET /RPC2 HTTP/1.0\r\nhost: h\r\n\r\n")
            .await
            .unwrap();

        assert_eq!(response.header().code(), 405);
        assert_eq!(response.header().header().option(ALLOWED), Some("POST"));
        assert!(response.content().is_empty());
        assert!(!response.keep_alive());
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_rejected_with_415() {
        let mut conn = server().connection(peer());
        let body = r#"{"methodName":"echo"}"#;
        let raw = format!(
            "POST /RPC2 HTTP/1.0\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            body.len(),
            body
        );

        let response = conn.feed(raw.as_bytes()).await.unwrap();
        assert_eq!(response.header().code(), 415);
    }

    #[tokio::test]
    async fn test_malformed_header_is_rejected_with_400() {
        let mut conn = server().connection(peer());
        let response = conn
            .feed(b"POST /RPC2 HTTP/1.0\r\nbroken line\r\n\r\n")
            .await
            .unwrap();

        assert_eq!(response.header().code(), 400);
    }

    #[tokio::test]
    async fn test_oversized_content_is_rejected() {
        let server = Server::builder().max_content_length(4).build().unwrap();
        let mut conn = server.connection(peer());

        let response = conn
            .feed(&request(r#"{"methodName":"x"}"#, ""))
            .await
            .unwrap();
        assert_eq!(response.header().code(), 400);
    }

    #[tokio::test]
    async fn test_keep_alive_negotiation() {
        let body = r#"{"methodName":"echo"}"#;
        let asks = "connection: keep-alive\r\n";

        let closed = Server::builder()
            .method("echo", |_, _| Ok(Value::Null))
            .build()
            .unwrap();
        let response = closed.connection(peer()).feed(&request(body, asks)).await.unwrap();
        assert!(!response.keep_alive());

        let open = Server::builder()
            .method("echo", |_, _| Ok(Value::Null))
            .keep_alive(true)
            .build()
            .unwrap();
        let response = open.connection(peer()).feed(&request(body, asks)).await.unwrap();
        assert_eq!(response.header().header().option(CONNECTION), Some("keep-alive"));

        let response = open.connection(peer()).feed(&request(body, "")).await.unwrap();
        assert!(!response.keep_alive());
    }

    #[tokio::test]
    async fn test_server_name_applied() {
        let server = Server::builder()
            .server_name("test-server/1")
            .method("echo", |_, _| Ok(Value::Null))
            .build()
            .unwrap();

        let mut conn = server.connection(peer());
        let ok = conn
            .feed(&request(r#"{"methodName":"echo"}"#, ""))
            .await
            .unwrap();
        assert_eq!(ok.header().header().option(SERVER), Some("test-server/1"));

        let rejected = conn.feed(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
        assert_eq!(rejected.header().server(), "test-server/1");
    }

    #[test]
    fn test_server_name_must_be_token() {
        let err = Server::builder()
            .server_name("evil\r\nx-injected: 1")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::Envelope(EnvelopeError::Invalid { what: "server name", .. })
        ));

        let config = ServerConfig {
            server_name: "two words".to_string(),
            ..ServerConfig::default()
        };
        assert!(Server::builder().config(config).build().is_err());
    }

    #[tokio::test]
    async fn test_exit_flag_visible_on_server() {
        let server = Server::builder()
            .method("shutdown", |ctx, _| {
                ctx.server().set_exit_flag();
                Ok(Value::Bool(true))
            })
            .interceptor(LoggingInterceptor)
            .build()
            .unwrap();

        assert!(!server.exit_requested());
        server
            .connection(peer())
            .feed(&request(r#"{"methodName":"shutdown"}"#, ""))
            .await
            .unwrap();
        assert!(server.exit_requested());
    }

    #[tokio::test]
    async fn test_custom_option_parser() {
        let server = Server::builder()
            .method("echo", |_, _| Ok(Value::Null))
            .option_parser("x-token:", |_, value| {
                if value == "secret" {
                    Ok(())
                } else {
                    Err(EnvelopeError::Malformed("bad token"))
                }
            })
            .build()
            .unwrap();

        let body = r#"{"methodName":"echo"}"#;
        let ok = server
            .connection(peer())
            .feed(&request(body, "x-token: secret\r\n"))
            .await
            .unwrap();
        assert_eq!(ok.header().code(), 200);

        let rejected = server
            .connection(peer())
            .feed(&request(body, "x-token: guess\r\n"))
            .await
            .unwrap();
        assert_eq!(rejected.header().code(), 400);
    }
}
