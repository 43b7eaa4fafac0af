//! # Capability registry of name-addressed call targets.
//!
//! A [`Registry`] maps a target name to a set of methods, each addressed by name at runtime
//! and backed by a statically typed handler. Incoming [`CallRequest`](crate::CallRequest)s are
//! resolved against it by the [`Responder`](crate::Responder).
//!
//! Every handler produces a **stream** of values; single-value methods are a stream of one.
//!
//! ## Registration
//! ```rust
//! use procvisor::{Registry, Target};
//! use serde_json::Value;
//!
//! let registry = Registry::builder()
//!     .target(
//!         Target::new("Test")
//!             .unary("echo", |args: Vec<Value>| async move {
//!                 Ok::<_, anyhow::Error>(args.into_iter().next().unwrap_or(Value::Null))
//!             })
//!             .typed("double", |(n,): (i64,)| async move { Ok::<_, anyhow::Error>(n * 2) }),
//!     )
//!     .build()
//!     .expect("unique names");
//!
//! assert!(registry.contains("Test", "echo"));
//! assert!(!registry.contains("Test", "missing"));
//! ```
//!
//! ## Rules
//! - Duplicate target or method names are rejected by [`RegistryBuilder::build`].
//! - The registry is immutable once built; share it as `Arc<Registry>`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{RegistryError, RemoteError};

/// Stream of values produced by one method invocation.
pub type ValueStream = BoxStream<'static, Result<Value, RemoteError>>;

/// Type-erased method handler.
pub type Handler = Arc<dyn Fn(Vec<Value>) -> ValueStream + Send + Sync>;

/// Immutable map of targets to their methods.
#[derive(Default)]
pub struct Registry {
    targets: HashMap<String, HashMap<String, Handler>>,
}

impl Registry {
    /// Starts building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with no targets; every call resolves to `TargetNotFound`.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Looks up a handler by target and method name.
    pub fn resolve(&self, target: &str, method: &str) -> Result<&Handler, RemoteError> {
        let methods = self
            .targets
            .get(target)
            .ok_or_else(|| RemoteError::target_not_found(target))?;
        methods
            .get(method)
            .ok_or_else(|| RemoteError::method_not_found(target, method))
    }

    /// `true` if `target.method` is registered.
    pub fn contains(&self, target: &str, method: &str) -> bool {
        self.resolve(target, method).is_ok()
    }

    /// Returns the sorted list of registered target names.
    pub fn targets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Builder for [`Registry`]; the first registration error is reported by [`build`](Self::build).
#[derive(Default)]
pub struct RegistryBuilder {
    targets: HashMap<String, HashMap<String, Handler>>,
    error: Option<RegistryError>,
}

impl RegistryBuilder {
    /// Adds a target with its methods.
    pub fn target(mut self, target: Target) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let Some(err) = target.error {
            self.error = Some(err);
            return self;
        }
        if self.targets.contains_key(&target.name) {
            self.error = Some(RegistryError::DuplicateTarget(target.name));
            return self;
        }
        self.targets.insert(target.name, target.methods);
        self
    }

    /// Finishes the registry.
    pub fn build(self) -> Result<Arc<Registry>, RegistryError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(Arc::new(Registry {
                targets: self.targets,
            })),
        }
    }
}

/// One named target and its methods.
pub struct Target {
    name: String,
    methods: HashMap<String, Handler>,
    error: Option<RegistryError>,
}

impl Target {
    /// Creates a target with no methods.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
            error: None,
        }
    }

    /// Registers a method returning a stream of zero or more values.
    pub fn streaming<F, S, E>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Value, E>> + Send + 'static,
        E: Into<RemoteError> + 'static,
    {
        let handler: Handler = Arc::new(move |args| {
            f(args)
                .map(|r| r.map_err(Into::<RemoteError>::into))
                .boxed()
        });
        self.insert(method.into(), handler)
    }

    /// Registers a method producing exactly one value (or an error).
    pub fn unary<F, Fut, E>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<RemoteError> + 'static,
    {
        let handler: Handler = Arc::new(move |args| {
            let fut = f(args);
            stream::once(async move { fut.await.map_err(Into::<RemoteError>::into) }).boxed()
        });
        self.insert(method.into(), handler)
    }

    /// Registers a single-value method with typed arguments and result.
    ///
    /// The positional `args` array is decoded into `A` (use a tuple for several arguments);
    /// a decode failure is answered with a `TypeError`.
    pub fn typed<F, Fut, A, R, E>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        E: Into<RemoteError> + 'static,
    {
        let f = Arc::new(f);
        self.unary(method, move |args: Vec<Value>| {
            let f = Arc::clone(&f);
            async move {
                let decoded: A = serde_json::from_value(Value::Array(args))
                    .map_err(|e| RemoteError::new("TypeError", e.to_string()))?;
                let out = f(decoded).await.map_err(Into::<RemoteError>::into)?;
                serde_json::to_value(out).map_err(|e| RemoteError::new("TypeError", e.to_string()))
            }
        })
    }

    fn insert(mut self, method: String, handler: Handler) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.methods.contains_key(&method) {
            self.error = Some(RegistryError::DuplicateMethod {
                target: self.name.clone(),
                method,
            });
            return self;
        }
        self.methods.insert(method, handler);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    fn echo() -> Target {
        Target::new("Test").unary("echo", |args: Vec<Value>| async move {
            Ok::<_, RemoteError>(args.into_iter().next().unwrap_or(Value::Null))
        })
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let err = Registry::builder().target(echo()).target(echo()).build().err();
        assert_eq!(err, Some(RegistryError::DuplicateTarget("Test".into())));
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let target = echo().unary("echo", |_args: Vec<Value>| async { Ok::<_, RemoteError>(json!(1)) });
        let err = Registry::builder().target(target).build().err();
        assert_eq!(
            err,
            Some(RegistryError::DuplicateMethod {
                target: "Test".into(),
                method: "echo".into()
            })
        );
    }

    #[test]
    fn test_resolve_reports_which_name_is_missing() {
        let registry = Registry::builder().target(echo()).build().unwrap();
        assert_eq!(registry.resolve("Nope", "echo").err().unwrap().name, "TargetNotFound");
        assert_eq!(registry.resolve("Test", "nope").err().unwrap().name, "MethodNotFound");
    }

    #[tokio::test]
    async fn test_typed_decodes_tuple_args() {
        let registry = Registry::builder()
            .target(Target::new("Math").typed("add", |(a, b): (i64, i64)| async move {
                Ok::<_, RemoteError>(a + b)
            }))
            .build()
            .unwrap();

        let handler = registry.resolve("Math", "add").unwrap();
        let out: Vec<Value> = handler(vec![json!(2), json!(3)]).try_collect().await.unwrap();
        assert_eq!(out, vec![json!(5)]);

        let err = handler(vec![json!("x")]).try_collect::<Vec<_>>().await.unwrap_err();
        assert_eq!(err.name, "TypeError");
    }
}
