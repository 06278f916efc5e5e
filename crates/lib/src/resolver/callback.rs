//! Closure-backed resolvers.
//!
//! These let callers attach lazy values without declaring a resolver type.
//! The name given at construction is the type identity used for fingerprints
//! and serialization; deserializing one needs a factory registered under the
//! same name.

use std::{collections::BTreeMap, fmt, future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::{LoadContext, Resolver, ResolverError};
use crate::{Item, bag::CallbackError};

type LoadFn = Arc<dyn Fn(&LoadContext) -> Result<Item, CallbackError> + Send + Sync>;

type LoadFuture = Pin<Box<dyn Future<Output = Result<Item, CallbackError>> + Send>>;

type AsyncLoadFn = Arc<dyn Fn(LoadContext) -> LoadFuture + Send + Sync>;

/// Resolver backed by a synchronous closure.
#[derive(Clone)]
pub struct FnResolver {
    name: String,
    defaults: BTreeMap<String, JsonValue>,
    load: LoadFn,
}

impl FnResolver {
    /// Creates a resolver named `name` that calls `load`.
    pub fn new<F>(name: impl Into<String>, load: F) -> Self
    where
        F: Fn(&LoadContext) -> Result<Item, CallbackError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            defaults: BTreeMap::new(),
            load: Arc::new(load),
        }
    }

    /// Declares a keyword parameter default
    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }
}

impl fmt::Debug for FnResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResolver")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Resolver for FnResolver {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn defaults(&self) -> BTreeMap<String, JsonValue> {
        self.defaults.clone()
    }

    fn load(&self, context: &LoadContext) -> Result<Item, ResolverError> {
        (self.load)(context).map_err(|source| ResolverError::LoadFailed {
            resolver: self.name.clone(),
            source,
        })
    }
}

/// Resolver backed by a closure returning a future.
#[derive(Clone)]
pub struct AsyncFnResolver {
    name: String,
    defaults: BTreeMap<String, JsonValue>,
    load: AsyncLoadFn,
}

impl AsyncFnResolver {
    /// Creates a resolver named `name` that awaits `load`.
    pub fn new<F, Fut>(name: impl Into<String>, load: F) -> Self
    where
        F: Fn(LoadContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Item, CallbackError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            defaults: BTreeMap::new(),
            load: Arc::new(move |context| Box::pin(load(context))),
        }
    }

    /// Declares a keyword parameter default
    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }
}

impl fmt::Debug for AsyncFnResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnResolver")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for AsyncFnResolver {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn defaults(&self) -> BTreeMap<String, JsonValue> {
        self.defaults.clone()
    }

    fn is_async(&self) -> bool {
        true
    }

    async fn load_async(&self, context: LoadContext) -> Result<Item, ResolverError> {
        (self.load)(context)
            .await
            .map_err(|source| ResolverError::LoadFailed {
                resolver: self.name.clone(),
                source,
            })
    }
}
