//! Ordered hierarchical containers.
//!
//! A [`Bag`] is a tree of containers. Each container holds an ordered index
//! of labelled [`Node`]s; a node's value is a scalar or another container.
//! Containers are addressed by dotted paths:
//!
//! ```
//! use bagtree::{Bag, Value};
//!
//! let mut bag = Bag::new();
//! bag.set_item("config.db.host", "localhost").unwrap();
//! bag.set_item("config.db.port", 5432).unwrap();
//! bag.set_item("config.db?driver", "pg").unwrap();
//!
//! assert_eq!(bag.get_item("config.db.port").unwrap(), Some(Value::Int(5432)));
//! assert_eq!(bag.get_item("config.db?driver").unwrap(), Some(Value::from("pg")));
//! assert_eq!(bag.keys_at("config.db"), vec!["host", "port"]);
//! assert_eq!(bag.get_item("config.missing").unwrap(), None);
//! ```
//!
//! # Storage
//!
//! All containers of a tree live in one slot arena owned by the `Bag` and are
//! referenced by [`BagId`] handles. Parent links are handles too, so a
//! container knowing its parent creates no ownership cycle. Back-reference
//! mode is a per-container flag that enables `#^` ascent and event bubbling.
//!
//! Values never alias: assigning a container of the same tree copies it,
//! assigning a standalone `Bag` moves it in, and removing a container-valued
//! node hands its subtree back as a standalone `Bag`.

use std::{fmt, sync::Arc};

use tracing::{trace, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::BagConfig,
    resolver::{FnResolver, LoadContext, ResolverHandle},
};

mod access;
mod arena;
mod compare;
mod digest;
pub mod errors;
pub mod events;
pub mod index;
mod merge;
mod mutate;
pub mod node;
pub mod path;
mod traversal;
pub mod value;

pub use access::{Access, Lookup};
pub use arena::BagId;
pub use digest::{Digest, DigestField, DigestValue};
pub use errors::{BagError, CallbackError};
pub use events::{BagEvent, EventCallback, EventKind, SubscriberKind, Subscription, UpdateKind};
pub use index::{Indexed, OrderedIndex, Position, Selector};
pub use merge::{MergeOptions, UpdateOptions};
pub use mutate::{AttrOptions, SetOptions};
pub use node::{
    Attributes, DetachedNode, Node, NodeCallback, NodeEvent, NodeEventKind, NodeRef, attrs,
};
pub use path::{AttrSelector, BagPath, Segment};
pub use traversal::Traverse;
pub use value::{Item, Scalar, Value};

use arena::Arena;
use events::Registries;

/// One container: its nodes, parent link and subscribers.
#[derive(Debug, Default)]
pub(crate) struct Container {
    pub(crate) nodes: OrderedIndex<Node>,
    pub(crate) parent: Option<BagId>,
    pub(crate) backref: bool,
    pub(crate) subscribers: Registries,
}

impl Container {
    fn with_parent(parent: Option<BagId>) -> Self {
        Self {
            parent,
            ..Default::default()
        }
    }
}

/// An ordered, path-addressable tree of nodes.
pub struct Bag {
    arena: Arena<Container>,
    root: BagId,
    config: BagConfig,
    clock: Arc<dyn Clock>,
}

impl Bag {
    /// Creates an empty tree with default settings
    pub fn new() -> Self {
        Self::with_config(BagConfig::default())
    }

    /// Creates an empty tree with `config`
    pub fn with_config(config: BagConfig) -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(Container {
            backref: config.backref,
            ..Default::default()
        });
        Self {
            arena,
            root,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for resolver caches
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle of the root container
    pub fn root(&self) -> BagId {
        self.root
    }

    pub fn config(&self) -> &BagConfig {
        &self.config
    }

    /// Time source used for resolver caches
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Number of nodes in the root container
    pub fn len(&self) -> usize {
        self.container(self.root).map_or(0, |c| c.nodes.len())
    }

    /// True if the root container has no nodes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` refers to a live container of this tree
    pub fn contains_id(&self, id: BagId) -> bool {
        self.arena.contains(id)
    }

    /// Number of live containers, root included
    pub fn container_count(&self) -> usize {
        self.arena.len()
    }

    /// Builds a closure-backed resolver handle using the configured default
    /// cache time.
    pub fn resolver<F>(&self, name: impl Into<String>, load: F) -> ResolverHandle
    where
        F: Fn(&LoadContext) -> Result<Item, CallbackError> + Send + Sync + 'static,
    {
        ResolverHandle::new(FnResolver::new(name, load))
            .with_cache_time(self.config.default_cache_time)
    }

    // Subscriptions and back-references

    /// Registers callbacks on the root container under `id`, replacing any
    /// previous registration with that id. Subscribing switches the tree to
    /// back-reference mode so events from nested containers reach the root.
    pub fn subscribe(&mut self, id: &str, subscription: Subscription) {
        let root = self.root;
        self.subscribe_container(root, id, subscription);
    }

    /// Registers callbacks on the container at `path`. Returns false when the
    /// path does not lead to a container.
    pub fn subscribe_at(
        &mut self,
        path: impl Into<BagPath>,
        id: &str,
        subscription: Subscription,
    ) -> bool {
        let path = path.into();
        match self.container_at_static(path.segments()) {
            Some(cid) => {
                self.subscribe_container(cid, id, subscription);
                true
            }
            None => false,
        }
    }

    fn subscribe_container(&mut self, cid: BagId, id: &str, subscription: Subscription) {
        self.set_backref(cid);
        if let Some(container) = self.arena.get_mut(cid) {
            container.subscribers.subscribe(id, subscription);
        }
    }

    /// Removes the root container's callbacks registered under `id`
    pub fn unsubscribe(&mut self, id: &str, kind: SubscriberKind) -> bool {
        let root = self.root;
        self.arena
            .get_mut(root)
            .is_some_and(|c| c.subscribers.unsubscribe(id, kind))
    }

    /// Removes callbacks registered under `id` on the container at `path`
    pub fn unsubscribe_at(&mut self, path: impl Into<BagPath>, id: &str, kind: SubscriberKind) -> bool {
        let path = path.into();
        let Some(cid) = self.container_at_static(path.segments()) else {
            return false;
        };
        self.arena
            .get_mut(cid)
            .is_some_and(|c| c.subscribers.unsubscribe(id, kind))
    }

    /// Registers a per-node callback. Returns false when no node is at `path`.
    pub fn subscribe_node<F>(&mut self, path: impl Into<BagPath>, id: &str, callback: F) -> bool
    where
        F: Fn(&NodeEvent<'_>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let path = path.into();
        let Some((cid, idx)) = self.node_location(&path) else {
            return false;
        };
        match self.node_at_mut(cid, idx) {
            Some(node) => {
                node.subscribe(id, Arc::new(callback));
                true
            }
            None => false,
        }
    }

    /// Removes a per-node callback
    pub fn unsubscribe_node(&mut self, path: impl Into<BagPath>, id: &str) -> bool {
        let path = path.into();
        self.node_location(&path)
            .and_then(|(cid, idx)| self.node_at_mut(cid, idx))
            .is_some_and(|node| node.unsubscribe(id))
    }

    /// Switches the whole tree to back-reference mode
    pub fn enable_backref(&mut self) {
        let root = self.root;
        self.set_backref(root);
    }

    /// Whether the root container is in back-reference mode
    pub fn is_backref(&self) -> bool {
        self.container(self.root).is_some_and(|c| c.backref)
    }

    /// Parent of a container, when it is in back-reference mode
    pub fn parent_of(&self, id: BagId) -> Option<BagId> {
        let container = self.container(id)?;
        container
            .parent
            .filter(|parent| container.backref && self.contains_id(*parent))
    }

    /// Puts `id` and every container below it in back-reference mode and
    /// re-establishes their parent links.
    pub(crate) fn set_backref(&mut self, id: BagId) {
        let mut stack = vec![(id, None)];
        while let Some((cur, parent)) = stack.pop() {
            let Some(container) = self.arena.get_mut(cur) else {
                warn!(id = %cur, "stale container handle while enabling back-references");
                continue;
            };
            container.backref = true;
            if parent.is_some() {
                container.parent = parent;
            }
            stack.extend(
                container
                    .nodes
                    .iter()
                    .filter_map(Node::bag_id)
                    .map(|child| (child, Some(cur))),
            );
        }
        trace!(id = %id, "back-reference mode enabled");
    }

    // Arena access

    pub(crate) fn container(&self, id: BagId) -> Option<&Container> {
        self.arena.get(id)
    }

    pub(crate) fn live(&self, id: BagId) -> Result<&Container, BagError> {
        self.arena.get(id).ok_or_else(|| stale(id))
    }

    pub(crate) fn live_mut(&mut self, id: BagId) -> Result<&mut Container, BagError> {
        self.arena.get_mut(id).ok_or_else(|| stale(id))
    }

    pub(crate) fn node_at(&self, cid: BagId, idx: usize) -> Option<&Node> {
        self.arena.get(cid)?.nodes.get_at(idx)
    }

    pub(crate) fn node_at_mut(&mut self, cid: BagId, idx: usize) -> Option<&mut Node> {
        self.arena.get_mut(cid)?.nodes.get_at_mut(idx)
    }

    pub(crate) fn live_node(&self, cid: BagId, idx: usize) -> Result<&Node, BagError> {
        self.node_at(cid, idx).ok_or_else(|| stale(cid))
    }

    pub(crate) fn live_node_mut(&mut self, cid: BagId, idx: usize) -> Result<&mut Node, BagError> {
        self.node_at_mut(cid, idx).ok_or_else(|| stale(cid))
    }

    pub(crate) fn new_container(&mut self, parent: BagId) -> BagId {
        let backref = self.container(parent).is_some_and(|c| c.backref);
        let id = self.arena.insert(Container::with_parent(Some(parent)));
        if backref {
            self.set_backref(id);
        }
        id
    }

    /// Moves a standalone tree into this one under `parent`.
    pub(crate) fn adopt(&mut self, mut bag: Bag, parent: BagId) -> BagId {
        let id = move_container(&mut bag.arena, bag.root, &mut self.arena, Some(parent))
            .unwrap_or_else(|| self.arena.insert(Container::with_parent(Some(parent))));
        if self.container(parent).is_some_and(|c| c.backref) {
            self.set_backref(id);
        }
        id
    }

    /// Moves the subtree at `id` out into a standalone tree.
    pub(crate) fn detach(&mut self, id: BagId) -> Bag {
        let mut arena = Arena::new();
        let root = move_container(&mut self.arena, id, &mut arena, None)
            .unwrap_or_else(|| arena.insert(Container::default()));
        Bag {
            arena,
            root,
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Standalone deep copy of the subtree at `id`.
    pub(crate) fn copy_out(&self, id: BagId) -> Bag {
        let mut arena = Arena::new();
        let root = copy_container(self, id, &mut arena, None)
            .unwrap_or_else(|| arena.insert(Container::default()));
        Bag {
            arena,
            root,
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Deep copy of the subtree at `id` inside this tree, under `parent`.
    pub(crate) fn copy_within(&mut self, id: BagId, parent: BagId) -> Result<BagId, BagError> {
        if !self.contains_id(id) {
            return Err(stale(id));
        }
        let copy = self.copy_out(id);
        Ok(self.adopt(copy, parent))
    }

    /// Frees the subtree at `id`.
    pub(crate) fn free(&mut self, id: BagId) {
        free_container(&mut self.arena, id);
    }

    /// Frees everything a removed node still references.
    pub(crate) fn discard_node(&mut self, node: Node) {
        if let Some(scratch) = node.scratch {
            self.free(scratch);
        }
        if let Some(id) = node.value.as_bag() {
            self.free(id);
        }
    }

    /// Turns a removed node into a standalone one.
    pub(crate) fn detach_node(&mut self, mut node: Node) -> DetachedNode {
        if let Some(scratch) = node.scratch.take() {
            self.free(scratch);
        }
        let value = match node.value.as_bag() {
            Some(id) => Item::Bag(self.detach(id)),
            None => Item::Value(std::mem::take(&mut node.value)),
        };
        DetachedNode {
            label: node.label,
            value,
            attrs: node.attrs,
            tag: node.tag,
            resolver: node.resolver,
        }
    }

    /// Copies a value out of the tree; containers become standalone trees.
    pub(crate) fn value_to_item(&self, value: &Value) -> Item {
        match value {
            Value::Bag(id) => Item::Bag(self.copy_out(*id)),
            other => Item::Value(other.clone()),
        }
    }

    fn fmt_container(&self, id: BagId, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(container) = self.container(id) else {
            return Ok(());
        };
        let indent = "  ".repeat(depth);
        for node in container.nodes.iter() {
            write!(f, "{indent}{}", node.label())?;
            if let Some(tag) = node.tag() {
                write!(f, " <{tag}>")?;
            }
            if !node.attrs().is_empty() {
                let attrs: Vec<String> =
                    node.attrs().iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, " [{}]", attrs.join(", "))?;
            }
            match (node.value(), node.resolver()) {
                (Value::Bag(child), _) => {
                    writeln!(f)?;
                    self.fmt_container(*child, depth + 1, f)?;
                }
                (Value::Null, Some(resolver)) => writeln!(f, " = {resolver}")?,
                (value, _) => writeln!(f, " = {value}")?,
            }
        }
        Ok(())
    }
}

impl Default for Bag {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep copy: resolvers are duplicated with a fresh cache, subscribers are
/// not copied.
impl Clone for Bag {
    fn clone(&self) -> Self {
        self.copy_out(self.root)
    }
}

/// Structural equality: labels, order, values and attributes
impl PartialEq for Bag {
    fn eq(&self, other: &Self) -> bool {
        compare::container_eq(self, self.root, other, other.root)
    }
}

impl Bag {
    /// Textual description of how `other` differs, `None` when equal
    pub fn diff(&self, other: &Bag) -> Option<String> {
        compare::container_diff(self, self.root, other, other.root)
    }
}

impl fmt::Display for Bag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_container(self.root, 0, f)
    }
}

impl fmt::Debug for Bag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bag")
            .field("root", &self.root)
            .field("containers", &self.arena.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn stale(id: BagId) -> BagError {
    warn!(id = %id, "stale container handle");
    BagError::StaleHandle { id: id.to_string() }
}

fn copy_container(
    src: &Bag,
    id: BagId,
    dst: &mut Arena<Container>,
    parent: Option<BagId>,
) -> Option<BagId> {
    let container = src.container(id)?;
    let new_id = dst.insert(Container {
        parent,
        backref: container.backref,
        ..Default::default()
    });
    let mut nodes = OrderedIndex::new();
    for node in container.nodes.iter() {
        let mut copy = node.duplicate();
        if let Some(child) = node.value().as_bag() {
            let copied = copy_container(src, child, dst, Some(new_id));
            copy.value = copied.map(Value::Bag).unwrap_or_default();
        }
        nodes.push(copy);
    }
    if let Some(target) = dst.get_mut(new_id) {
        target.nodes = nodes;
    }
    Some(new_id)
}

fn move_container(
    src: &mut Arena<Container>,
    id: BagId,
    dst: &mut Arena<Container>,
    parent: Option<BagId>,
) -> Option<BagId> {
    let mut container = src.remove(id)?;
    let new_id = dst.insert(Container {
        parent,
        backref: container.backref,
        subscribers: std::mem::take(&mut container.subscribers),
        ..Default::default()
    });
    for node in container.nodes.iter_mut() {
        if let Some(scratch) = node.scratch.take() {
            free_container(src, scratch);
        }
        if let Some(child) = node.value.as_bag() {
            let moved = move_container(src, child, dst, Some(new_id));
            node.value = moved.map(Value::Bag).unwrap_or_default();
        }
    }
    if let Some(target) = dst.get_mut(new_id) {
        target.nodes = container.nodes;
    }
    Some(new_id)
}

fn free_container(arena: &mut Arena<Container>, id: BagId) {
    let mut pending = vec![id];
    while let Some(cur) = pending.pop() {
        let Some(container) = arena.remove(cur) else {
            continue;
        };
        for node in container.nodes.iter() {
            pending.extend(node.value.as_bag());
            pending.extend(node.scratch);
        }
    }
}
