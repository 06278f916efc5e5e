//! Type-identity lookup for resolver deserialization.

use std::{collections::HashMap, fmt, sync::Arc};

use super::{Resolver, ResolverError, SerializedResolver};

/// Builds a resolver implementation from its serialized form.
pub type ResolverFactory =
    Arc<dyn Fn(&SerializedResolver) -> Result<Arc<dyn Resolver>, ResolverError> + Send + Sync>;

/// Maps resolver type identities to factories.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bagtree::Item;
/// use bagtree::resolver::{FnResolver, ResolverHandle, ResolverRegistry};
///
/// let mut registry = ResolverRegistry::new();
/// registry.register("now", |_data| {
///     let resolver: Arc<dyn bagtree::resolver::Resolver> =
///         Arc::new(FnResolver::new("now", |_| Ok(Item::from(0))));
///     Ok(resolver)
/// });
///
/// let handle = ResolverHandle::new(FnResolver::new("now", |_| Ok(Item::from(0))));
/// let restored = ResolverHandle::deserialize(&handle.serialize(), &registry).unwrap();
/// assert_eq!(restored, handle);
/// ```
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    factories: HashMap<String, ResolverFactory>,
}

impl ResolverRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `type_name`, replacing any previous one.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&SerializedResolver) -> Result<Arc<dyn Resolver>, ResolverError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(type_name.into(), Arc::new(factory));
    }

    /// Registers a resolver type whose parameters all live in the handle.
    pub fn register_default<R>(&mut self)
    where
        R: Resolver + Default + 'static,
    {
        let type_name = R::default().type_name().to_string();
        self.register(type_name, |_| Ok(Arc::new(R::default()) as Arc<dyn Resolver>));
    }

    /// Whether `type_name` can be deserialized
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type identities, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds the resolver implementation for `data`.
    pub fn build(&self, data: &SerializedResolver) -> Result<Arc<dyn Resolver>, ResolverError> {
        let factory =
            self.factories
                .get(&data.type_name)
                .ok_or_else(|| ResolverError::UnknownType {
                    type_name: data.type_name.clone(),
                })?;
        factory(data)
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
