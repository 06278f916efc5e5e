//! Reads: plain lookups, resolver evaluation and derived views.
//!
//! Missing data is never an error. Every read returns `None` (or an empty
//! list) when the path does not resolve; errors only come from resolver
//! loaders.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::{
    AttrSelector, Attributes, Bag, BagError, BagId, BagPath, Digest, DigestField, Item, NodeRef,
    Scalar, Segment, Value, traversal::Descent,
};
use crate::{
    constants::{MODE_ATTRS, MODE_DIGEST, MODE_KEYS},
    resolver::LoadRequest,
};

/// Whether a read consults resolvers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Run resolvers whose cache has expired
    #[default]
    Resolved,
    /// Return the raw value slot without running anything
    Static,
}

/// Result of [`Bag::get_item_with`]
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Value(Value),
    Attrs(Attributes),
    Keys(Vec<String>),
    Digest(Digest),
}

/// What a node needs before its value can be read
enum Pending {
    Ready,
    Load { request: LoadRequest, read_only: bool },
}

/// A loader result reduced to what a value slot can hold
enum Loaded {
    Value(Value),
    Bag(Bag),
}

fn into_loaded(item: Item, resolver: &str) -> Loaded {
    match item {
        Item::Value(Value::Bag(id)) => {
            warn!(resolver, id = %id, "loader returned a foreign container handle, storing null");
            Loaded::Value(Value::Null)
        }
        Item::Value(value) => Loaded::Value(value),
        Item::Bag(bag) => Loaded::Bag(bag),
        Item::Resolver(_) => {
            warn!(resolver, "loader returned a resolver, storing null");
            Loaded::Value(Value::Null)
        }
        Item::Node(node) => into_loaded(node.value, resolver),
    }
}

impl Bag {
    fn pending(&self, cid: BagId, idx: usize) -> Result<Pending, BagError> {
        let node = self.live_node(cid, idx)?;
        Ok(match node.resolver() {
            None => Pending::Ready,
            Some(resolver) if resolver.is_read_only() => Pending::Load {
                request: resolver.request(),
                read_only: true,
            },
            Some(resolver) if resolver.expired(self.clock.as_ref()) => Pending::Load {
                request: resolver.request(),
                read_only: false,
            },
            Some(_) => Pending::Ready,
        })
    }

    /// Stores a loader result. Cached resolvers write the value slot and
    /// record the load time; read-only resolvers only keep a container result
    /// in the node's scratch slot so it stays addressable.
    fn finish_load(
        &mut self,
        cid: BagId,
        idx: usize,
        item: Item,
        read_only: bool,
    ) -> crate::Result<Value> {
        let now = self.clock.now_millis();
        let resolver = self
            .live_node(cid, idx)?
            .resolver()
            .map(|r| r.type_name().to_string())
            .unwrap_or_default();
        let value = match into_loaded(item, &resolver) {
            Loaded::Value(value) => value,
            Loaded::Bag(bag) => Value::Bag(self.adopt(bag, cid)),
        };

        let node = self.live_node_mut(cid, idx)?;
        debug!(label = node.label(), resolver, read_only, "resolver loaded");
        if read_only {
            let old = std::mem::replace(&mut node.scratch, value.as_bag());
            if let Some(old) = old {
                self.free(old);
            }
            return Ok(value);
        }

        if let Some(handle) = node.resolver_mut() {
            handle.mark_loaded(now);
        }
        let old = node.set_raw_value(value.clone());
        if let Some(old) = old.as_bag().filter(|old| Some(*old) != value.as_bag()) {
            self.free(old);
        }
        Ok(value)
    }

    /// Current value of a node, running its resolver when needed
    pub(crate) fn resolve_node(&mut self, cid: BagId, idx: usize) -> crate::Result<Value> {
        match self.pending(cid, idx)? {
            Pending::Ready => Ok(self.live_node(cid, idx)?.value().clone()),
            Pending::Load { request, read_only } => {
                let item = request.run()?;
                self.finish_load(cid, idx, item, read_only)
            }
        }
    }

    /// Async variant of [`resolve_node`](Self::resolve_node)
    pub(crate) async fn resolve_node_async(&mut self, cid: BagId, idx: usize) -> crate::Result<Value> {
        match self.pending(cid, idx)? {
            Pending::Ready => Ok(self.live_node(cid, idx)?.value().clone()),
            Pending::Load { request, read_only } => {
                let item = request.run_async().await?;
                self.finish_load(cid, idx, item, read_only)
            }
        }
    }

    fn last_index(&self, cid: BagId, last: &Segment) -> Option<usize> {
        let label = last.as_label()?;
        self.container(cid)?.nodes.index(label)
    }

    fn read_attr(&self, cid: BagId, idx: usize, attr: &AttrSelector) -> crate::Result<Option<Value>> {
        Ok(match attr {
            AttrSelector::Named(name) => self.live_node(cid, idx)?.attr(name).cloned().map(Value::from),
            AttrSelector::All => None,
        })
    }

    /// Reads the value at `path`, running resolvers on the way.
    ///
    /// A `?name` suffix reads an attribute instead. Nested containers come
    /// back as [`Value::Bag`] handles into this tree. The empty path is the
    /// root container.
    pub fn get_item(&mut self, path: impl Into<BagPath>) -> crate::Result<Option<Value>> {
        let path = path.into();
        let Some((last, parents)) = path.split_last() else {
            return Ok(Some(Value::Bag(self.root)));
        };
        let Some(cid) = self.descend(&path, parents, Descent::Read)? else {
            return Ok(None);
        };
        if let Segment::Parent = last {
            return Ok(path.attr().is_none().then(|| self.parent_of(cid)).flatten().map(Value::Bag));
        }
        let Some(idx) = self.last_index(cid, last) else {
            return Ok(None);
        };
        match path.attr() {
            Some(attr) => self.read_attr(cid, idx, attr),
            None => self.resolve_node(cid, idx).map(Some),
        }
    }

    /// Async variant of [`get_item`](Self::get_item); async loaders are
    /// awaited and sync loaders run off the async worker.
    pub async fn get_item_async(&mut self, path: impl Into<BagPath>) -> crate::Result<Option<Value>> {
        let path = path.into();
        let Some((last, parents)) = path.split_last() else {
            return Ok(Some(Value::Bag(self.root)));
        };
        let Some(cid) = self.descend_async(parents).await? else {
            return Ok(None);
        };
        if let Segment::Parent = last {
            return Ok(path.attr().is_none().then(|| self.parent_of(cid)).flatten().map(Value::Bag));
        }
        let Some(idx) = self.last_index(cid, last) else {
            return Ok(None);
        };
        match path.attr() {
            Some(attr) => self.read_attr(cid, idx, attr),
            None => self.resolve_node_async(cid, idx).await.map(Some),
        }
    }

    /// [`get_item`](Self::get_item) with a fallback for missing paths
    pub fn get_item_or(
        &mut self,
        path: impl Into<BagPath>,
        default: impl Into<Value>,
    ) -> crate::Result<Value> {
        Ok(self.get_item(path)?.unwrap_or_else(|| default.into()))
    }

    /// Reads raw value slots only; resolvers are not run.
    pub fn get_static(&self, path: impl Into<BagPath>) -> Option<Value> {
        let path = path.into();
        self.get_static_in(self.root, &path)
    }

    pub(crate) fn get_static_in(&self, start: BagId, path: &BagPath) -> Option<Value> {
        let Some((last, parents)) = path.split_last() else {
            return Some(Value::Bag(start));
        };
        let (cid, consumed) = self.descend_static(start, parents);
        if consumed < parents.len() {
            return None;
        }
        if let Segment::Parent = last {
            return path.attr().is_none().then(|| self.parent_of(cid)).flatten().map(Value::Bag);
        }
        let node = self.node_at(cid, self.last_index(cid, last)?)?;
        match path.attr() {
            Some(AttrSelector::Named(name)) => node.attr(name).cloned().map(Value::from),
            Some(AttrSelector::All) => None,
            None => Some(node.value().clone()),
        }
    }

    /// Reads `path` either resolved or static
    pub fn get_value(&mut self, path: impl Into<BagPath>, access: Access) -> crate::Result<Option<Value>> {
        match access {
            Access::Resolved => self.get_item(path),
            Access::Static => Ok(self.get_static(path)),
        }
    }

    /// Async variant of [`get_value`](Self::get_value)
    pub async fn get_value_async(
        &mut self,
        path: impl Into<BagPath>,
        access: Access,
    ) -> crate::Result<Option<Value>> {
        match access {
            Access::Resolved => self.get_item_async(path).await,
            Access::Static => Ok(self.get_static(path)),
        }
    }

    /// Container reached by following the whole path, resolving on the way
    fn container_at(&mut self, path: &BagPath) -> crate::Result<Option<BagId>> {
        self.descend(path, path.segments(), Descent::Read)
    }

    /// Derived reads.
    ///
    /// | mode       | result                                         |
    /// |------------|------------------------------------------------|
    /// | `""`       | the value, or the attribute map for a bare `?` |
    /// | `"?"`      | the attribute map of the node                  |
    /// | `"k:"`     | labels of the container at `path`              |
    /// | `"d:spec"` | [`digest`](Self::digest) of the container      |
    ///
    /// ```
    /// use bagtree::{Bag, bag::Lookup};
    ///
    /// let mut bag = Bag::new();
    /// bag.set_item("users.alice", 1).unwrap();
    /// bag.set_item("users.bob", 2).unwrap();
    /// let keys = bag.get_item_with("users", "k:").unwrap();
    /// assert_eq!(keys, Some(Lookup::Keys(vec!["alice".into(), "bob".into()])));
    /// ```
    pub fn get_item_with(
        &mut self,
        path: impl Into<BagPath>,
        mode: &str,
    ) -> crate::Result<Option<Lookup>> {
        let path = path.into();
        if mode.is_empty() {
            if path.attr() == Some(&AttrSelector::All) {
                return Ok(self.attributes(&path).map(Lookup::Attrs));
            }
            return Ok(self.get_item(path)?.map(Lookup::Value));
        }
        if mode == MODE_ATTRS {
            return Ok(self.attributes(&path).map(Lookup::Attrs));
        }
        if mode == MODE_KEYS {
            let keys = self
                .container_at(&path)?
                .and_then(|cid| self.container(cid))
                .map(|c| c.nodes.labels());
            return Ok(keys.map(Lookup::Keys));
        }
        if let Some(spec) = mode.strip_prefix(MODE_DIGEST) {
            let fields = DigestField::parse_spec(spec);
            let digest = self
                .container_at(&path)?
                .map(|cid| self.digest_in(cid, &fields, None));
            return Ok(digest.map(Lookup::Digest));
        }
        Err(BagError::InvalidPath {
            path: path.to_string(),
            reason: format!("unknown read mode '{mode}'"),
        }
        .into())
    }

    /// Runs the resolver at `path` once with `overrides` layered over its
    /// parameters. Nothing is cached or stored; the result is returned as is.
    pub fn call_resolver(
        &mut self,
        path: impl Into<BagPath>,
        overrides: BTreeMap<String, JsonValue>,
    ) -> crate::Result<Option<Item>> {
        let path = path.into();
        let Some((last, parents)) = path.split_last() else {
            return Ok(None);
        };
        let Some(cid) = self.descend(&path, parents, Descent::Read)? else {
            return Ok(None);
        };
        let request = self
            .last_index(cid, last)
            .and_then(|idx| self.node_at(cid, idx))
            .and_then(|node| node.resolver())
            .map(|resolver| resolver.request_with(overrides));
        match request {
            Some(request) => Ok(Some(request.run()?)),
            None => Ok(None),
        }
    }

    /// Invalidates the cache of the resolver at `path` so the next read loads
    /// again. Returns whether a resolver was found.
    pub fn reset_resolver(&mut self, path: impl Into<BagPath>) -> bool {
        let path = path.into();
        let Some((cid, idx)) = self.node_location(&path) else {
            return false;
        };
        match self.node_at_mut(cid, idx).and_then(|node| node.resolver_mut()) {
            Some(resolver) => {
                resolver.reset();
                debug!(path = %path, "resolver cache reset");
                true
            }
            None => false,
        }
    }

    /// Node at `path`, without resolving
    pub fn get_node(&self, path: impl Into<BagPath>) -> Option<NodeRef<'_>> {
        let path = path.into();
        let (cid, idx) = self.node_location(&path)?;
        self.node_at(cid, idx).map(|node| NodeRef::new(self, node))
    }

    /// Whether a node exists at `path`
    pub fn contains(&self, path: impl Into<BagPath>) -> bool {
        self.node_location(&path.into()).is_some()
    }

    /// One attribute of the node at `path`
    pub fn get_attr(&self, path: impl Into<BagPath>, name: &str) -> Option<Scalar> {
        self.get_node(path)?.attr(name).cloned()
    }

    /// Attribute map of the node at `path`
    pub fn attributes(&self, path: impl Into<BagPath>) -> Option<Attributes> {
        self.get_node(path).map(|node| node.attrs().clone())
    }

    /// Labels of the root container
    pub fn keys(&self) -> Vec<String> {
        self.container(self.root)
            .map(|c| c.nodes.labels())
            .unwrap_or_default()
    }

    /// Labels of the container at `path`; empty if there is none
    pub fn keys_at(&self, path: impl Into<BagPath>) -> Vec<String> {
        let path = path.into();
        self.container_at_static(path.segments())
            .and_then(|cid| self.container(cid))
            .map(|c| c.nodes.labels())
            .unwrap_or_default()
    }

    /// Raw value at `path` copied out of the tree
    pub fn get_owned(&self, path: impl Into<BagPath>) -> Option<Item> {
        self.get_static(path).map(|value| self.value_to_item(&value))
    }

    /// `(label, value)` pairs of the root container, copied out
    pub fn items_owned(&self) -> Vec<(String, Item)> {
        self.container(self.root)
            .map(|c| {
                c.nodes
                    .iter()
                    .map(|node| (node.label().to_string(), self.value_to_item(node.value())))
                    .collect()
            })
            .unwrap_or_default()
    }
}
