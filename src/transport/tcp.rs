//! Byte-stream adapter over tokio I/O.
//!
//! Works with any `AsyncRead + AsyncWrite` stream; [`serve`] adds the TCP
//! accept loop. Read buffers are owned by the connection task and released
//! with it.
//!
//! # Example
//!
//! ```no_run
//! use rpcwire::{transport, Server};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .method("stop", |ctx, _| {
//!             ctx.server().set_exit_flag();
//!             Ok(true.into())
//!         })
//!         .build()?;
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     transport::serve(listener, server).await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::client::ClientProtocol;
use crate::codec::{Call, PayloadCodec, Value};
use crate::error::{Result, RpcError};
use crate::server::{Server, ServerProtocol};

/// Pause after a failed accept, e.g. when the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept connections until a method sets the exit flag.
///
/// Each connection runs on its own task. Connections already accepted are
/// left to finish on their own.
pub async fn serve<C: PayloadCodec>(listener: TcpListener, server: Server<C>) -> Result<()> {
    tracing::info!(addr = ?listener.local_addr().ok(), "Serving");

    loop {
        tokio::select! {
            _ = server.feedback().exit_signal() => {
                tracing::info!("Exit flag set, no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        back_off(e).await;
                        continue;
                    }
                };

                tracing::debug!(peer = %peer, "Connection accepted");
                let protocol = server.connection(peer);

                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, protocol).await {
                        tracing::error!(peer = %peer, "Connection error: {}", e);
                    }
                });
            }
        }
    }
}

async fn back_off(error: std::io::Error) {
    tracing::error!(retry_in = ?ACCEPT_BACKOFF, "Accept failed: {}", error);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

/// Serve one connection until it closes.
///
/// Writes one response per request. Unless keep-alive was negotiated the
/// stream is shut down after the first response.
pub async fn serve_connection<S, C>(mut io: S, mut protocol: ServerProtocol<C>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: PayloadCodec,
{
    let mut buf = vec![0u8; protocol.read_buffer_size().max(1)];

    loop {
        let n = io.read(&mut buf).await?;
        if n == 0 {
            tracing::debug!(peer = %protocol.peer_addr(), "Peer closed connection");
            return Ok(());
        }

        let Some(response) = protocol.feed(&buf[..n]).await else {
            continue;
        };

        io.write_all(&response.dump()).await?;
        io.flush().await?;

        if !response.keep_alive() {
            io.shutdown().await?;
            return Ok(());
        }

        protocol.reset();
    }
}

/// Send `call` and wait for its response on `io`.
///
/// # Errors
///
/// Returns [`RpcError::ConnectionClosed`] if the stream ends before a full
/// response arrives, plus everything [`ClientProtocol::finish`] reports.
pub async fn exchange<S, C>(io: &mut S, protocol: &mut ClientProtocol<C>, call: &Call) -> Result<Value>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: PayloadCodec,
{
    protocol.reset();

    let request = protocol.request_packet(call)?;
    io.write_all(&request.dump()).await?;
    io.flush().await?;

    let mut buf = vec![0u8; protocol.read_buffer_size().max(1)];

    loop {
        let n = io.read(&mut buf).await?;
        if n == 0 {
            return Err(RpcError::ConnectionClosed);
        }

        if let Some(packet) = protocol.read_response(&buf[..n])? {
            return protocol.finish(packet);
        }
    }
}
