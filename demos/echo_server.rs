//! Echo server.
//!
//! Run with `cargo run --example echo_server -- 127.0.0.1:8080`, then call
//! `shutdown` to stop accepting connections:
//!
//! ```text
//! curl -H 'Content-Type: text/xml' -d '{"methodName":"echo","params":["hi"]}' http://127.0.0.1:8080/RPC2
//! curl -H 'Content-Type: text/xml' -d '{"methodName":"shutdown"}' http://127.0.0.1:8080/RPC2
//! ```

use rpcwire::codec::Value;
use rpcwire::handler::{BlockingExecutor, LoggingInterceptor, Method, MethodContext, MethodResult};
use rpcwire::{transport, Server};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Counts its parameters.
#[derive(Default)]
struct Count;

impl Method for Count {
    fn execute(&mut self, ctx: &MethodContext, params: &[Value]) -> MethodResult {
        ctx.log(&format!("counting {} params", params.len()));
        Ok(Value::from(params.len()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let server = Server::builder()
        .method("echo", |_ctx, params| Ok(Value::Array(params.to_vec())))
        .method("shutdown", |ctx, _params| {
            ctx.server().log_message("shutdown requested");
            ctx.server().set_exit_flag();
            Ok(Value::Bool(true))
        })
        .register_default::<Count>("count")
        .interceptor(LoggingInterceptor)
        .executor(BlockingExecutor)
        .build()?;

    let listener = TcpListener::bind(&addr).await?;
    transport::serve(listener, server).await?;

    tracing::info!("Server stopped");
    Ok(())
}
