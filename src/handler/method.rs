//! Server methods and their per-call context.
//!
//! A [`Method`] is created fresh for every call by a
//! [`MethodFactory`](super::MethodFactory) and bound to a [`MethodContext`]
//! holding the method name, the caller's address and a [`ServerFeedback`]
//! handle.
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::Value;
//! use rpcwire::handler::{Method, MethodContext, MethodError, MethodResult};
//!
//! #[derive(Default)]
//! struct Sum;
//!
//! impl Method for Sum {
//!     fn execute(&mut self, _ctx: &MethodContext, params: &[Value]) -> MethodResult {
//!         let mut total = 0;
//!         for p in params {
//!             total += p.as_i64().ok_or_else(|| MethodError::application("not a number"))?;
//!         }
//!         Ok(Value::from(total))
//!     }
//! }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Notify;

use crate::codec::Value;
use crate::error::Fault;

/// Outcome of a method or interceptor.
pub type MethodResult = Result<Value, MethodError>;

/// Failure raised while running a method.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MethodError {
    /// Domain failure with its own fault code.
    #[error(transparent)]
    Fault(#[from] Fault),

    /// Generic runtime failure; reported with the application error code.
    #[error("{0}")]
    Application(String),

    /// Failure nobody could describe, e.g. a panic inside the method.
    #[error("Unknown Error")]
    Unknown,
}

impl MethodError {
    /// Generic runtime failure from anything displayable.
    pub fn application(message: impl fmt::Display) -> Self {
        MethodError::Application(message.to_string())
    }

    /// The fault reported to the caller.
    pub fn into_fault(self) -> Fault {
        match self {
            MethodError::Fault(fault) => fault,
            MethodError::Application(message) => Fault::application(message),
            MethodError::Unknown => Fault::unknown(),
        }
    }
}

impl From<String> for MethodError {
    fn from(message: String) -> Self {
        MethodError::Application(message)
    }
}

impl From<&str> for MethodError {
    fn from(message: &str) -> Self {
        MethodError::Application(message.to_string())
    }
}

/// Restricted handle into the server, given to every method.
///
/// Cheap to clone; all clones share the exit flag.
#[derive(Clone, Default)]
pub struct ServerFeedback {
    exit: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ServerFeedback {
    /// Create a fresh handle with the exit flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to stop accepting connections.
    pub fn set_exit_flag(&self) {
        self.exit.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether some method asked the server to stop.
    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    /// Resolve once the exit flag is set. Any number of tasks may wait.
    pub async fn exit_signal(&self) {
        loop {
            // Register before checking the flag so a concurrent
            // `set_exit_flag` cannot slip between the two.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.exit_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Write a line to the server log.
    pub fn log_message(&self, message: &str) {
        tracing::info!(target: "rpcwire::method", "{}", message);
    }
}

impl fmt::Debug for ServerFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerFeedback")
            .field("exit_requested", &self.exit_requested())
            .finish()
    }
}

/// Per-call identity of a method.
#[derive(Debug, Clone)]
pub struct MethodContext {
    name: String,
    peer: SocketAddr,
    feedback: ServerFeedback,
}

impl MethodContext {
    /// Bind a call to its name, caller and server handle.
    pub fn new(name: impl Into<String>, peer: SocketAddr, feedback: ServerFeedback) -> Self {
        Self {
            name: name.into(),
            peer,
            feedback,
        }
    }

    /// Name the method was dispatched under.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caller's address.
    #[inline]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Server handle.
    #[inline]
    pub fn server(&self) -> &ServerFeedback {
        &self.feedback
    }

    /// Log a line tagged with this call's method name and peer.
    pub fn log(&self, message: &str) {
        tracing::info!(
            target: "rpcwire::method",
            method = %self.name,
            peer = %self.peer,
            "{}",
            message
        );
    }
}

/// A server method. One instance serves exactly one call.
pub trait Method: Send + 'static {
    /// Run the method.
    fn execute(&mut self, ctx: &MethodContext, params: &[Value]) -> MethodResult;
}

/// Method that wraps a plain function.
pub struct FunctionMethod<F> {
    function: Arc<F>,
}

impl<F> FunctionMethod<F> {
    pub(crate) fn new(function: Arc<F>) -> Self {
        Self { function }
    }
}

impl<F> Method for FunctionMethod<F>
where
    F: Fn(&MethodContext, &[Value]) -> MethodResult + Send + Sync + 'static,
{
    fn execute(&mut self, ctx: &MethodContext, params: &[Value]) -> MethodResult {
        (self.function)(ctx, params)
    }
}

/// A method instance bound to its call context.
pub struct BoundMethod {
    pub(crate) ctx: MethodContext,
    pub(crate) method: Box<dyn Method>,
}

impl BoundMethod {
    /// Bind `method` to `ctx`.
    pub fn new(ctx: MethodContext, method: Box<dyn Method>) -> Self {
        Self { ctx, method }
    }

    /// Call context.
    pub fn context(&self) -> &MethodContext {
        &self.ctx
    }

    /// Method name.
    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    /// Run the method directly, without interceptors.
    pub fn execute(&mut self, params: &[Value]) -> MethodResult {
        self.method.execute(&self.ctx, params)
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethod")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}
