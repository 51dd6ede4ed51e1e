//! Handler module - method dispatch and execution.
//!
//! Provides:
//! - [`Method`] - one instance per call, bound to a [`MethodContext`]
//! - [`Dispatcher`] - maps method names to [`MethodFactory`] instances
//! - [`InterceptorChain`] - ordered wrappers around every execution
//! - [`Executor`] - runs a [`MethodTask`] inline or on the blocking pool
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::Value;
//! use rpcwire::handler::{Dispatcher, InterceptorChain, LoggingInterceptor, MethodTask};
//! use std::sync::Arc;
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.register_fn("ping", |_, _| Ok(Value::from("pong")));
//!
//! let chain = Arc::new(InterceptorChain::new().with(LoggingInterceptor));
//! let method = dispatcher.create("ping", "127.0.0.1:1".parse().unwrap()).unwrap();
//!
//! let result = MethodTask::new(method, vec![], chain).run();
//! assert_eq!(result.unwrap(), Value::from("pong"));
//! ```

mod executor;
mod interceptor;
mod method;
mod registry;

pub use executor::{BlockingExecutor, BoxFuture, Executor, MethodTask, SerialExecutor};
pub use interceptor::{Interceptor, InterceptorChain, LoggingInterceptor, Next};
pub use method::{
    BoundMethod, FunctionMethod, Method, MethodContext, MethodError, MethodResult, ServerFeedback,
};
pub use registry::{DefaultFactory, Dispatcher, FunctionFactory, MethodFactory};
