//! Executors decide where a method runs.
//!
//! - [`SerialExecutor`] runs the method inline on the connection task.
//! - [`BlockingExecutor`] moves it onto tokio's blocking pool, so slow
//!   methods do not stall other connections.
//!
//! A panic inside a method (or an interceptor) is caught and reported as
//! [`MethodError::Unknown`].

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use super::interceptor::InterceptorChain;
use super::method::{BoundMethod, MethodError, MethodResult};
use crate::codec::Value;

/// Boxed future type for executor results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A method bound to its call, ready to run through the interceptor chain.
#[derive(Debug)]
pub struct MethodTask {
    method: BoundMethod,
    params: Vec<Value>,
    chain: Arc<InterceptorChain>,
}

impl MethodTask {
    /// Create a task.
    pub fn new(method: BoundMethod, params: Vec<Value>, chain: Arc<InterceptorChain>) -> Self {
        Self {
            method,
            params,
            chain,
        }
    }

    /// Name of the method this task runs.
    pub fn method_name(&self) -> &str {
        self.method.name()
    }

    /// Run the task on the current thread.
    pub fn run(mut self) -> MethodResult {
        let Self {
            ref mut method,
            ref params,
            ref chain,
        } = self;

        match panic::catch_unwind(AssertUnwindSafe(|| chain.process(method, params))) {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(method = method.name(), "Method panicked");
                Err(MethodError::Unknown)
            }
        }
    }
}

/// Runs method tasks.
pub trait Executor: Send + Sync + 'static {
    /// Run `task` and resolve to its outcome.
    fn run(&self, task: MethodTask) -> BoxFuture<'static, MethodResult>;
}

/// Runs each task inline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

impl Executor for SerialExecutor {
    fn run(&self, task: MethodTask) -> BoxFuture<'static, MethodResult> {
        Box::pin(std::future::ready(task.run()))
    }
}

/// Runs each task on tokio's blocking thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingExecutor;

impl Executor for BlockingExecutor {
    fn run(&self, task: MethodTask) -> BoxFuture<'static, MethodResult> {
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || task.run()).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Blocking method task failed: {}", e);
                    Err(MethodError::Unknown)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Dispatcher, LoggingInterceptor};

    fn dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_fn("double", |_, params| {
            let n = params
                .first()
                .and_then(Value::as_i64)
                .ok_or_else(|| MethodError::application("expected a number"))?;
            Ok(Value::from(n * 2))
        });
        dispatcher.register_fn("panic", |_, _| panic!("boom"));
        dispatcher
    }

    fn task(name: &str, params: Vec<Value>) -> MethodTask {
        let method = dispatcher()
            .create(name, "127.0.0.1:2000".parse().unwrap())
            .unwrap();
        MethodTask::new(method, params, Arc::new(InterceptorChain::new()))
    }

    #[test]
    fn test_task_runs_method() {
        let task = task("double", vec![Value::from(21)]);
        assert_eq!(task.method_name(), "double");
        assert_eq!(task.run(), Ok(Value::from(42)));
    }

    #[test]
    fn test_task_catches_panic() {
        assert_eq!(task("panic", vec![]).run(), Err(MethodError::Unknown));
    }

    #[test]
    fn test_task_runs_chain() {
        let method = dispatcher()
            .create("double", "127.0.0.1:2000".parse().unwrap())
            .unwrap();
        let chain = Arc::new(InterceptorChain::new().with(LoggingInterceptor));
        let task = MethodTask::new(method, vec![Value::from(1)], chain);

        assert_eq!(task.run(), Ok(Value::from(2)));
    }

    #[tokio::test]
    async fn test_serial_executor() {
        let result = SerialExecutor.run(task("double", vec![Value::from(3)])).await;
        assert_eq!(result, Ok(Value::from(6)));
    }

    #[tokio::test]
    async fn test_blocking_executor() {
        let result = BlockingExecutor
            .run(task("double", vec![Value::from(5)]))
            .await;
        assert_eq!(result, Ok(Value::from(10)));

        let result = BlockingExecutor.run(task("panic", vec![])).await;
        assert_eq!(result, Err(MethodError::Unknown));
    }

    #[tokio::test]
    async fn test_application_error_passes_through() {
        let result = SerialExecutor.run(task("double", vec![])).await;
        assert_eq!(result, Err(MethodError::application("expected a number")));
    }
}
