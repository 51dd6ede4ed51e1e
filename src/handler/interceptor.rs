//! Interceptor chain wrapped around every method execution.
//!
//! Interceptors are kept in an ordered list; the first one added is the
//! outermost. Each interceptor receives a [`Next`] cursor and decides whether
//! to call [`Next::proceed`], which runs the remaining interceptors and
//! finally the method itself. Not proceeding skips everything further in.
//!
//! Interceptors are shared by all connections of a server, so any state they
//! keep must be synchronized.
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::Value;
//! use rpcwire::handler::{Interceptor, InterceptorChain, MethodContext, MethodResult, Next};
//!
//! struct DenyAll;
//!
//! impl Interceptor for DenyAll {
//!     fn process(&self, _ctx: &MethodContext, _params: &[Value], _next: Next<'_>) -> MethodResult {
//!         Err("denied".into())
//!     }
//! }
//!
//! let chain = InterceptorChain::new().with(DenyAll);
//! assert_eq!(chain.len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::method::{BoundMethod, Method, MethodContext, MethodResult};
use crate::codec::Value;

/// Wraps method execution.
pub trait Interceptor: Send + Sync + 'static {
    /// Handle one call. Call `next.proceed(params)` to continue inward.
    fn process(&self, ctx: &MethodContext, params: &[Value], next: Next<'_>) -> MethodResult;
}

/// Cursor over the rest of the chain.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
    method: &'a mut Box<dyn Method>,
    ctx: &'a MethodContext,
}

impl Next<'_> {
    /// Run the remaining interceptors and then the method.
    pub fn proceed(self, params: &[Value]) -> MethodResult {
        match self.rest.split_first() {
            Some((first, rest)) => first.process(
                self.ctx,
                params,
                Next {
                    rest,
                    method: self.method,
                    ctx: self.ctx,
                },
            ),
            None => self.method.execute(self.ctx, params),
        }
    }

    /// Number of interceptors still ahead of the method.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

/// Ordered list of interceptors, outermost first.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    links: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interceptor inside all existing ones (builder style).
    pub fn with<I: Interceptor>(mut self, interceptor: I) -> Self {
        self.push(interceptor);
        self
    }

    /// Add an interceptor inside all existing ones.
    pub fn push<I: Interceptor>(&mut self, interceptor: I) {
        self.links.push(Arc::new(interceptor));
    }

    /// Number of interceptors.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if the chain has no interceptors.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Run `method` through the chain.
    pub fn process(&self, method: &mut BoundMethod, params: &[Value]) -> MethodResult {
        let next = Next {
            rest: &self.links,
            method: &mut method.method,
            ctx: &method.ctx,
        };
        next.proceed(params)
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.links.len())
            .finish()
    }
}

/// Logs every call with its duration and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn process(&self, ctx: &MethodContext, params: &[Value], next: Next<'_>) -> MethodResult {
        let start = Instant::now();
        let result = next.proceed(params);
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => tracing::info!(
                method = ctx.name(),
                peer = %ctx.peer_addr(),
                ?elapsed,
                "Call completed"
            ),
            Err(e) => tracing::warn!(
                method = ctx.name(),
                peer = %ctx.peer_addr(),
                ?elapsed,
                error = %e,
                "Call failed"
            ),
        }

        result
    }
}
