//! # rpcwire
//!
//! HTTP envelope, framing and dispatch core for XML-RPC style servers and
//! clients.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): request/response headers, packets and an
//!   incremental [`PacketReader`](protocol::PacketReader) that frames
//!   arbitrarily chunked bytes
//! - **Codec** ([`codec`]): the payload seam turning content into calls and
//!   results ([`JsonCodec`](codec::JsonCodec) ships in the box)
//! - **Handler** ([`handler`]): dispatcher, interceptor chain and executors
//! - **Server/Client**: per-connection protocol state driven by
//!   [`transport`] over tokio streams
//!
//! ## Example
//!
//! ```no_run
//! use rpcwire::codec::Value;
//! use rpcwire::handler::LoggingInterceptor;
//! use rpcwire::{transport, Server};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .method("echo", |_ctx, params| Ok(Value::Array(params.to_vec())))
//!         .interceptor(LoggingInterceptor)
//!         .build()?;
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     transport::serve(listener, server).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod client;
mod server;

pub use client::{Client, ClientBuilder, ClientConfig, ClientProtocol, DEFAULT_URI};
pub use error::{Fault, Result, RpcError};
pub use handler::{Method, MethodContext, MethodError, MethodResult, ServerFeedback};
pub use server::{Server, ServerBuilder, ServerConfig, ServerProtocol, DEFAULT_READ_BUFFER_SIZE};
