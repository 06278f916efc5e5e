//! Lazy node values.
//!
//! A [`Resolver`] produces a value on demand. Attached to a node through a
//! [`ResolverHandle`], it owns the cache policy for that node:
//!
//! - `cache_time == 0`: every read loads again
//! - `cache_time > 0`: loads are reused for that many seconds
//! - `cache_time < 0`: the first load is kept until [`ResolverHandle::reset`]
//!
//! Read-only handles load on every read and never write the result into the
//! node's value slot.
//!
//! Loads are dispatched by [`Dispatch`], which picks one of four execution
//! strategies from whether the loader is async and whether the caller is.
//!
//! ```
//! use bagtree::{Bag, Item};
//! use bagtree::resolver::{FnResolver, ResolverHandle};
//!
//! let mut bag = Bag::new();
//! let answer = FnResolver::new("answer", |_ctx| Ok(Item::from(42)));
//! bag.set_item("lazy", ResolverHandle::new(answer)).unwrap();
//! assert_eq!(bag.get_item("lazy").unwrap(), Some(42.into()));
//! ```

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    Item,
    bag::path::BagPath,
    clock::{Clock, millis_to_utc},
};

pub mod callback;
pub mod dispatch;
pub mod errors;
pub mod registry;

pub use callback::{AsyncFnResolver, FnResolver};
pub use dispatch::{Dispatch, LoadRequest};
pub use errors::ResolverError;
pub use registry::{ResolverFactory, ResolverRegistry};

/// Parameters handed to a loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadContext {
    /// Positional construction arguments
    pub args: Vec<JsonValue>,
    /// Keyword parameters, declared defaults merged in
    pub params: BTreeMap<String, JsonValue>,
}

impl LoadContext {
    /// Returns a positional argument
    pub fn arg(&self, index: usize) -> Option<&JsonValue> {
        self.args.get(index)
    }

    /// Returns a keyword parameter
    pub fn param(&self, name: &str) -> Option<&JsonValue> {
        self.params.get(name)
    }

    /// Decodes a keyword parameter into `T`
    pub fn param_as<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, ResolverError> {
        self.params
            .get(name)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(ResolverError::from)
    }
}

/// A pluggable lazy-value provider.
///
/// Implementors override [`load`](Resolver::load), or
/// [`load_async`](Resolver::load_async) together with
/// [`is_async`](Resolver::is_async). A resolver that overrides neither fails
/// loudly the first time it is invoked.
#[async_trait]
pub trait Resolver: Send + Sync + fmt::Debug {
    /// Type identity used by fingerprints and the [`ResolverRegistry`].
    fn type_name(&self) -> &str;

    /// Declared keyword parameter defaults, merged under explicit parameters.
    fn defaults(&self) -> BTreeMap<String, JsonValue> {
        BTreeMap::new()
    }

    /// Whether [`load_async`](Resolver::load_async) is the load hook.
    fn is_async(&self) -> bool {
        false
    }

    /// Synchronous load hook.
    fn load(&self, _context: &LoadContext) -> Result<Item, ResolverError> {
        Err(ResolverError::LoadNotImplemented {
            resolver: self.type_name().to_string(),
        })
    }

    /// Asynchronous load hook.
    async fn load_async(&self, _context: LoadContext) -> Result<Item, ResolverError> {
        Err(ResolverError::LoadNotImplemented {
            resolver: self.type_name().to_string(),
        })
    }
}

/// Serialized form of a resolver: type identity plus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedResolver {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub args: Vec<JsonValue>,
    #[serde(default)]
    pub params: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub cache_time: i64,
    #[serde(default)]
    pub read_only: bool,
}

/// A resolver attached (or attachable) to one node, with its cache state.
///
/// Handles are deliberately not `Clone`: cache state belongs to exactly one
/// node. [`duplicate`](ResolverHandle::duplicate) makes an equal handle with a
/// fresh cache.
#[derive(Debug)]
pub struct ResolverHandle {
    resolver: Arc<dyn Resolver>,
    args: Vec<JsonValue>,
    params: BTreeMap<String, JsonValue>,
    cache_time: i64,
    read_only: bool,
    last_update: Option<u64>,
    // Only used when resolving outside a tree
    cache: Option<Box<Item>>,
}

impl ResolverHandle {
    /// Wraps a resolver with its declared defaults and no caching.
    pub fn new(resolver: impl Resolver + 'static) -> Self {
        Self::from_arc(Arc::new(resolver))
    }

    /// Wraps a shared resolver implementation.
    pub fn from_arc(resolver: Arc<dyn Resolver>) -> Self {
        let params = resolver.defaults();
        Self {
            resolver,
            args: Vec::new(),
            params,
            cache_time: 0,
            read_only: false,
            last_update: None,
            cache: None,
        }
    }

    /// Sets the positional arguments
    pub fn with_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets one keyword parameter, overriding its default
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets keyword parameters, overriding defaults
    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<JsonValue>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the cache policy in seconds (0 never, >0 TTL, <0 until reset)
    pub fn with_cache_time(mut self, seconds: i64) -> Self {
        self.cache_time = seconds;
        self
    }

    /// Makes the handle read-only: every read loads, nothing is written back
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Type identity of the wrapped resolver
    pub fn type_name(&self) -> &str {
        self.resolver.type_name()
    }

    /// Positional arguments
    pub fn args(&self) -> &[JsonValue] {
        &self.args
    }

    /// Effective keyword parameters
    pub fn params(&self) -> &BTreeMap<String, JsonValue> {
        &self.params
    }

    /// Cache policy in seconds
    pub fn cache_time(&self) -> i64 {
        self.cache_time
    }

    /// Whether results bypass the node's value slot
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the wrapped resolver loads asynchronously
    pub fn is_async(&self) -> bool {
        self.resolver.is_async()
    }

    /// Time of the last completed load
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update.map(millis_to_utc)
    }

    /// Time of the last completed load, in Unix milliseconds
    pub fn last_update_millis(&self) -> Option<u64> {
        self.last_update
    }

    /// Whether the next read must load again
    pub fn expired(&self, clock: &dyn Clock) -> bool {
        self.expired_at(clock.now_millis())
    }

    /// [`expired`](Self::expired) against an explicit time
    pub fn expired_at(&self, now_millis: u64) -> bool {
        match (self.cache_time, self.last_update) {
            (0, _) => true,
            (_, None) => true,
            (ttl, Some(_)) if ttl < 0 => false,
            (ttl, Some(loaded)) => {
                now_millis.saturating_sub(loaded) > (ttl as u64).saturating_mul(1000)
            }
        }
    }

    /// Forgets the last load so the next read loads again
    pub fn reset(&mut self) {
        self.last_update = None;
        self.cache = None;
    }

    /// Hash over (type identity, args, params); cache state is not included.
    pub fn fingerprint(&self) -> String {
        let identity = json!({
            "type": self.type_name(),
            "args": self.args,
            "params": self.params,
        });
        hex::encode(Sha256::digest(identity.to_string().as_bytes()))
    }

    /// Serializes type identity and parameters
    pub fn serialize(&self) -> SerializedResolver {
        SerializedResolver {
            type_name: self.type_name().to_string(),
            args: self.args.clone(),
            params: self.params.clone(),
            cache_time: self.cache_time,
            read_only: self.read_only,
        }
    }

    /// Rebuilds an uncached handle, looking the type up in `registry`
    pub fn deserialize(
        data: &SerializedResolver,
        registry: &ResolverRegistry,
    ) -> Result<Self, ResolverError> {
        let resolver = registry.build(data)?;
        let mut handle = Self::from_arc(resolver).with_args(data.args.iter().cloned());
        handle.params.extend(data.params.clone());
        handle.cache_time = data.cache_time;
        handle.read_only = data.read_only;
        Ok(handle)
    }

    /// An equal handle with a fresh cache
    pub fn duplicate(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            args: self.args.clone(),
            params: self.params.clone(),
            cache_time: self.cache_time,
            read_only: self.read_only,
            last_update: None,
            cache: None,
        }
    }

    /// Builds a load request with the handle's parameters
    pub fn request(&self) -> LoadRequest {
        LoadRequest::new(
            Arc::clone(&self.resolver),
            LoadContext {
                args: self.args.clone(),
                params: self.params.clone(),
            },
        )
    }

    /// Builds a load request with `overrides` layered over the parameters
    /// for this call only
    pub fn request_with(&self, overrides: BTreeMap<String, JsonValue>) -> LoadRequest {
        let mut request = self.request();
        request.context_mut().params.extend(overrides);
        request
    }

    /// Records a completed load
    pub(crate) fn mark_loaded(&mut self, now_millis: u64) {
        self.last_update = Some(now_millis);
    }

    /// Resolves outside a tree, caching in the handle itself.
    pub fn resolve(&mut self, clock: &dyn Clock) -> Result<Item, ResolverError> {
        if let Some(cached) = self.cached(clock) {
            return Ok(cached);
        }
        let item = self.request().run()?;
        Ok(self.finalize(clock, item))
    }

    /// Async variant of [`resolve`](Self::resolve).
    pub async fn resolve_async(&mut self, clock: &dyn Clock) -> Result<Item, ResolverError> {
        if let Some(cached) = self.cached(clock) {
            return Ok(cached);
        }
        let item = self.request().run_async().await?;
        Ok(self.finalize(clock, item))
    }

    fn cached(&self, clock: &dyn Clock) -> Option<Item> {
        if self.read_only || self.expired(clock) {
            return None;
        }
        self.cache.as_deref().cloned()
    }

    fn finalize(&mut self, clock: &dyn Clock, item: Item) -> Item {
        if self.read_only {
            return item;
        }
        self.mark_loaded(clock.now_millis());
        debug!(resolver = %self.type_name(), cache_time = self.cache_time, "cached standalone load");
        self.cache = Some(Box::new(item.clone()));
        item
    }

    /// Resolves and reads `path` inside the resolved container, copied out.
    pub fn get_item(
        &mut self,
        clock: &dyn Clock,
        path: impl Into<BagPath>,
    ) -> Result<Option<Item>, ResolverError> {
        let path = path.into();
        Ok(match self.resolve(clock)? {
            Item::Bag(bag) => bag.get_owned(path),
            _ => None,
        })
    }

    /// Resolves and lists the labels of the resolved container
    pub fn keys(&mut self, clock: &dyn Clock) -> Result<Vec<String>, ResolverError> {
        Ok(match self.resolve(clock)? {
            Item::Bag(bag) => bag.keys(),
            _ => Vec::new(),
        })
    }

    /// Resolves and copies out the values of the resolved container
    pub fn values(&mut self, clock: &dyn Clock) -> Result<Vec<Item>, ResolverError> {
        Ok(self.items(clock)?.into_iter().map(|(_, item)| item).collect())
    }

    /// Resolves and copies out `(label, value)` pairs of the resolved container
    pub fn items(&mut self, clock: &dyn Clock) -> Result<Vec<(String, Item)>, ResolverError> {
        Ok(match self.resolve(clock)? {
            Item::Bag(bag) => bag.items_owned(),
            _ => Vec::new(),
        })
    }
}

impl PartialEq for ResolverHandle {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl fmt::Display for ResolverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<resolver {}>", self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{Value, clock::FixedClock};

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Resolver for Counting {
        fn type_name(&self) -> &str {
            "counting"
        }

        fn defaults(&self) -> BTreeMap<String, JsonValue> {
            BTreeMap::from([("step".to_string(), json!(1))])
        }

        fn load(&self, context: &LoadContext) -> Result<Item, ResolverError> {
            let step = context.param_as::<i64>("step")?.unwrap_or(0);
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) as i64 + 1;
            Ok(Item::from(calls * step))
        }
    }

    #[derive(Debug)]
    struct Unimplemented;

    impl Resolver for Unimplemented {
        fn type_name(&self) -> &str {
            "unimplemented"
        }
    }

    #[test]
    fn test_expiry_policies() {
        let clock = FixedClock::new(10_000);
        let never = ResolverHandle::new(Counting::default());
        assert!(never.expired(&clock));

        let mut ttl = ResolverHandle::new(Counting::default()).with_cache_time(60);
        assert!(ttl.expired(&clock));
        ttl.mark_loaded(clock.now_millis());
        assert!(!ttl.expired(&clock));
        clock.advance_secs(60);
        assert!(!ttl.expired(&clock));
        clock.advance(1);
        assert!(ttl.expired(&clock));

        let mut forever = ResolverHandle::new(Counting::default()).with_cache_time(-1);
        forever.mark_loaded(clock.now_millis());
        clock.advance_secs(1_000_000);
        assert!(!forever.expired(&clock));
        forever.reset();
        assert!(forever.expired(&clock));
    }

    #[test]
    fn test_standalone_resolve_caches() {
        let clock = FixedClock::default();
        let mut handle = ResolverHandle::new(Counting::default()).with_cache_time(60);

        assert_eq!(handle.resolve(&clock).unwrap(), Value::Int(1));
        assert_eq!(handle.resolve(&clock).unwrap(), Value::Int(1));
        assert!(handle.last_update().is_some());

        handle.reset();
        assert_eq!(handle.resolve(&clock).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_read_only_never_caches() {
        let clock = FixedClock::default();
        let mut handle = ResolverHandle::new(Counting::default())
            .with_cache_time(-1)
            .read_only(true);
        handle.resolve(&clock).unwrap();
        assert_eq!(handle.resolve(&clock).unwrap(), Value::Int(2));
        assert!(handle.last_update().is_none());
    }

    #[test]
    fn test_params_merge_over_defaults() {
        let handle = ResolverHandle::new(Counting::default()).with_param("step", 5);
        assert_eq!(handle.params().get("step"), Some(&json!(5)));

        let clock = FixedClock::default();
        let mut handle = handle;
        assert_eq!(handle.resolve(&clock).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_request_overrides_are_per_call() {
        let handle = ResolverHandle::new(Counting::default());
        let item = handle
            .request_with(BTreeMap::from([("step".to_string(), json!(10))]))
            .run()
            .unwrap();
        assert_eq!(item, Value::Int(10));
        assert_eq!(handle.params().get("step"), Some(&json!(1)));
    }

    #[test]
    fn test_fingerprint_ignores_cache_state() {
        let a = ResolverHandle::new(Counting::default()).with_args([1, 2]);
        let mut b = ResolverHandle::new(Counting::default()).with_args([1, 2]);
        b.mark_loaded(5);
        assert_eq!(a, b);
        assert_eq!(a.fingerprint().len(), 64);

        let c = a.duplicate().with_param("step", 2);
        assert_ne!(a, c);
        assert_eq!(a.duplicate(), a);
    }

    #[test]
    fn test_unimplemented_load_fails_loudly() {
        let clock = FixedClock::default();
        let mut handle = ResolverHandle::new(Unimplemented);
        let err = handle.resolve(&clock).unwrap_err();
        assert!(err.is_contract_error());
        assert_eq!(err.resolver(), Some("unimplemented"));
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut registry = ResolverRegistry::new();
        registry.register_default::<Counting>();

        let handle = ResolverHandle::new(Counting::default())
            .with_args(["x"])
            .with_param("step", 3)
            .with_cache_time(30);
        let data = handle.serialize();
        assert_eq!(data.type_name, "counting");

        let json = serde_json::to_string(&data).unwrap();
        let decoded: SerializedResolver = serde_json::from_str(&json).unwrap();
        let restored = ResolverHandle::deserialize(&decoded, &registry).unwrap();
        assert_eq!(restored, handle);
        assert_eq!(restored.cache_time(), 30);
        assert!(restored.last_update().is_none());

        let unknown = SerializedResolver {
            type_name: "nope".into(),
            ..data
        };
        let err = ResolverHandle::deserialize(&unknown, &registry).unwrap_err();
        assert!(err.is_serialization_error());
    }
}
