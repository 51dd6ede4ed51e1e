//! Dispatcher mapping method names to method factories.
//!
//! The dispatcher owns its factories; registering a name twice replaces
//! (and drops) the earlier factory. It is populated once at setup and only
//! read afterwards, so a built server shares it across connections without
//! locking.
//!
//! # Example
//!
//! ```
//! use rpcwire::codec::Value;
//! use rpcwire::handler::Dispatcher;
//!
//! let mut dispatcher = Dispatcher::new();
//!
//! dispatcher.register_fn("echo", |_ctx, params| {
//!     Ok(params.first().cloned().unwrap_or(Value::Null))
//! });
//!
//! let peer = "127.0.0.1:9000".parse().unwrap();
//! let mut method = dispatcher.create("echo", peer).unwrap();
//! assert_eq!(method.execute(&[Value::from("hi")]).unwrap(), Value::from("hi"));
//!
//! assert!(dispatcher.create("missing", peer).is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use super::method::{BoundMethod, FunctionMethod, Method, MethodContext, MethodResult, ServerFeedback};
use crate::codec::Value;

/// Creates a new [`Method`] instance for every call.
pub trait MethodFactory: Send + Sync + 'static {
    /// Build a method instance.
    fn create(&self) -> Box<dyn Method>;
}

/// Factory for methods backed by a plain function.
pub struct FunctionFactory<F> {
    function: Arc<F>,
}

impl<F> FunctionFactory<F>
where
    F: Fn(&MethodContext, &[Value]) -> MethodResult + Send + Sync + 'static,
{
    /// Create a new function factory.
    pub fn new(function: F) -> Self {
        Self {
            function: Arc::new(function),
        }
    }
}

impl<F> MethodFactory for FunctionFactory<F>
where
    F: Fn(&MethodContext, &[Value]) -> MethodResult + Send + Sync + 'static,
{
    fn create(&self) -> Box<dyn Method> {
        Box::new(FunctionMethod::new(self.function.clone()))
    }
}

/// Factory for default-constructible method types.
pub struct DefaultFactory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Method + Default> DefaultFactory<T> {
    /// Create a new default factory.
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: Method + Default> Default for DefaultFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Method + Default> MethodFactory for DefaultFactory<T> {
    fn create(&self) -> Box<dyn Method> {
        Box::new(T::default())
    }
}

/// Registry mapping method names to factories.
pub struct Dispatcher {
    /// Factories by method name.
    factories: HashMap<String, Box<dyn MethodFactory>>,
    /// Handle given to every created method.
    feedback: ServerFeedback,
}

impl Dispatcher {
    /// Create an empty dispatcher with its own server handle.
    pub fn new() -> Self {
        Self::with_feedback(ServerFeedback::new())
    }

    /// Create an empty dispatcher bound to an existing server handle.
    pub fn with_feedback(feedback: ServerFeedback) -> Self {
        Self {
            factories: HashMap::new(),
            feedback,
        }
    }

    /// Bind `name` to `factory`, replacing any previous registration.
    pub fn register<M: MethodFactory>(&mut self, name: &str, factory: M) {
        if self
            .factories
            .insert(name.to_string(), Box::new(factory))
            .is_some()
        {
            tracing::debug!(method = name, "Replaced method factory");
        }
    }

    /// Register a plain function as a method.
    pub fn register_fn<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&MethodContext, &[Value]) -> MethodResult + Send + Sync + 'static,
    {
        self.register(name, FunctionFactory::new(function));
    }

    /// Register a default-constructible method type.
    pub fn register_default<T: Method + Default>(&mut self, name: &str) {
        self.register(name, DefaultFactory::<T>::new());
    }

    /// Create a method bound to `name` and `peer`.
    ///
    /// Returns `None` if no factory is registered under `name`.
    pub fn create(&self, name: &str, peer: SocketAddr) -> Option<BoundMethod> {
        let factory = self.factories.get(name)?;
        let ctx = MethodContext::new(name, peer, self.feedback.clone());
        Some(BoundMethod::new(ctx, factory.create()))
    }

    /// Check whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if no method is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Handle given to every created method.
    pub fn feedback(&self) -> &ServerFeedback {
        &self.feedback
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.method_names())
            .finish()
    }
}
