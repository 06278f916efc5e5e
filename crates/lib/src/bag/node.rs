//! Nodes: one labelled entry of a container.
//!
//! A [`Node`] lives inside its container's index and is only reachable by
//! reference; callers see it through [`NodeRef`] (read access tied to a tree)
//! or as a [`DetachedNode`] once it has been removed.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use super::{
    Bag, BagId, CallbackError, compare,
    index::Indexed,
    value::{Item, Scalar, Value},
};
use crate::resolver::ResolverHandle;

/// Attribute map of a node, in insertion order.
pub type Attributes = IndexMap<String, Scalar>;

/// Builds an attribute map from pairs.
///
/// ```
/// use bagtree::{Scalar, attrs};
///
/// let map = attrs([("color", Scalar::from("red")), ("size", Scalar::from(3))]);
/// assert_eq!(map.get("size"), Some(&Scalar::Int(3)));
/// ```
pub fn attrs<I, K, V>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Scalar>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Per-node subscriber callback
pub type NodeCallback = Arc<dyn Fn(&NodeEvent<'_>) -> Result<(), CallbackError> + Send + Sync>;

/// What a node subscriber is told about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    /// Raised by value assignment; attribute changes made in the same call
    /// are folded in
    UpdateValue,
    /// Raised by attribute-only changes
    UpdateAttrs,
}

/// A change delivered to node subscribers.
#[derive(Debug, Clone, Copy)]
pub struct NodeEvent<'a> {
    pub(crate) kind: NodeEventKind,
    pub(crate) node: &'a Node,
    pub(crate) old_value: Option<&'a Value>,
    pub(crate) changed_attrs: &'a [String],
    pub(crate) reason: Option<&'a str>,
}

impl<'a> NodeEvent<'a> {
    pub fn kind(&self) -> NodeEventKind {
        self.kind
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn old_value(&self) -> Option<&'a Value> {
        self.old_value
    }

    /// Attribute names whose value changed
    pub fn changed_attrs(&self) -> &'a [String] {
        self.changed_attrs
    }

    pub fn reason(&self) -> Option<&'a str> {
        self.reason
    }
}

/// A labelled entry with value, attributes, optional tag and resolver.
pub struct Node {
    pub(crate) label: String,
    pub(crate) value: Value,
    pub(crate) attrs: Attributes,
    pub(crate) tag: Option<String>,
    pub(crate) resolver: Option<ResolverHandle>,
    // Last container produced by a read-only resolver
    pub(crate) scratch: Option<BagId>,
    subscribers: IndexMap<String, NodeCallback>,
}

impl Node {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: Value::Null,
            attrs: Attributes::new(),
            tag: None,
            resolver: None,
            scratch: None,
            subscribers: IndexMap::new(),
        }
    }

    /// Label of the node, unique within its container unless duplicated on
    /// purpose
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The stored value slot, without consulting the resolver
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Attribute map
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// One attribute
    pub fn attr(&self, name: &str) -> Option<&Scalar> {
        self.attrs.get(name)
    }

    /// Tag set by builders
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Attached resolver
    pub fn resolver(&self) -> Option<&ResolverHandle> {
        self.resolver.as_ref()
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    /// Container reachable through this node: the value, or the last
    /// read-only resolver result
    pub fn bag_id(&self) -> Option<BagId> {
        self.value.as_bag().or(self.scratch)
    }

    /// Whether any node subscriber is registered
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    pub(crate) fn set_raw_value(&mut self, value: Value) -> Value {
        std::mem::replace(&mut self.value, value)
    }

    pub(crate) fn resolver_mut(&mut self) -> Option<&mut ResolverHandle> {
        self.resolver.as_mut()
    }

    pub(crate) fn set_resolver(&mut self, resolver: Option<ResolverHandle>) {
        self.resolver = resolver;
    }

    pub(crate) fn take_resolver(&mut self) -> Option<ResolverHandle> {
        self.resolver.take()
    }

    pub(crate) fn set_tag(&mut self, tag: Option<String>) {
        self.tag = tag;
    }

    pub(crate) fn take_attrs(&mut self) -> Attributes {
        std::mem::take(&mut self.attrs)
    }

    /// Applies `incoming` to the attribute map and returns the names whose
    /// value changed.
    ///
    /// With `merge` the map is updated, otherwise replaced. Null values remove
    /// the attribute when `strip_nulls` is set.
    pub(crate) fn apply_attrs(
        &mut self,
        incoming: Attributes,
        merge: bool,
        strip_nulls: bool,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        if !merge {
            let dropped: Vec<String> = self
                .attrs
                .keys()
                .filter(|k| !incoming.contains_key(*k))
                .cloned()
                .collect();
            for key in dropped {
                self.attrs.shift_remove(&key);
                changed.push(key);
            }
        }
        for (key, value) in incoming {
            if value.is_null() && strip_nulls {
                if self.attrs.shift_remove(&key).is_some() {
                    changed.push(key);
                }
            } else if self.attrs.get(&key) != Some(&value) {
                self.attrs.insert(key.clone(), value);
                changed.push(key);
            }
        }
        changed
    }

    pub(crate) fn subscribe(&mut self, id: &str, callback: NodeCallback) {
        self.subscribers.insert(id.to_string(), callback);
    }

    pub(crate) fn unsubscribe(&mut self, id: &str) -> bool {
        self.subscribers.shift_remove(id).is_some()
    }

    pub(crate) fn callbacks(&self) -> Vec<(String, NodeCallback)> {
        self.subscribers
            .iter()
            .map(|(id, cb)| (id.clone(), Arc::clone(cb)))
            .collect()
    }

    /// Copy of label, attributes, tag and resolver. The value is copied as
    /// is; a container handle must be remapped by the caller. Subscribers are
    /// not copied.
    pub(crate) fn duplicate(&self) -> Node {
        Node {
            label: self.label.clone(),
            value: self.value.clone(),
            attrs: self.attrs.clone(),
            tag: self.tag.clone(),
            resolver: self.resolver.as_ref().map(ResolverHandle::duplicate),
            scratch: None,
            subscribers: IndexMap::new(),
        }
    }
}

impl Indexed for Node {
    fn label(&self) -> &str {
        &self.label
    }

    fn attr(&self, name: &str) -> Option<&Scalar> {
        self.attrs.get(name)
    }

    fn value_matches(&self, rhs: &str) -> bool {
        self.value.matches_text(rhs)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("label", &self.label)
            .field("value", &self.value)
            .field("attrs", &self.attrs)
            .field("tag", &self.tag)
            .field("resolver", &self.resolver.as_ref().map(|r| r.type_name()))
            .field("subscribers", &self.subscribers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A node outside any tree: what `pop_node` returns and what `set_value`
/// adopts.
#[derive(Debug)]
pub struct DetachedNode {
    pub label: String,
    pub value: Item,
    pub attrs: Attributes,
    pub tag: Option<String>,
    pub resolver: Option<ResolverHandle>,
}

impl DetachedNode {
    pub fn new(label: impl Into<String>, value: impl Into<Item>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            attrs: Attributes::new(),
            tag: None,
            resolver: None,
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverHandle) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl Clone for DetachedNode {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            value: self.value.clone(),
            attrs: self.attrs.clone(),
            tag: self.tag.clone(),
            resolver: self.resolver.as_ref().map(ResolverHandle::duplicate),
        }
    }
}

/// Read access to a node inside a tree.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    pub(crate) bag: &'a Bag,
    pub(crate) node: &'a Node,
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(bag: &'a Bag, node: &'a Node) -> Self {
        Self { bag, node }
    }

    /// The underlying node
    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn label(&self) -> &'a str {
        self.node.label()
    }

    /// Stored value, without consulting the resolver
    pub fn value(&self) -> &'a Value {
        self.node.value()
    }

    pub fn attrs(&self) -> &'a Attributes {
        self.node.attrs()
    }

    pub fn attr(&self, name: &str) -> Option<&'a Scalar> {
        self.node.attr(name)
    }

    pub fn tag(&self) -> Option<&'a str> {
        self.node.tag()
    }

    pub fn resolver(&self) -> Option<&'a ResolverHandle> {
        self.node.resolver()
    }

    /// Whether the node currently leads to a container
    pub fn is_bag(&self) -> bool {
        self.node.bag_id().is_some_and(|id| self.bag.contains_id(id))
    }

    /// Child nodes, if the node leads to a container
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        let bag = self.bag;
        self.node
            .bag_id()
            .and_then(|id| bag.container(id))
            .map(|c| c.nodes.iter().map(|n| NodeRef::new(bag, n)).collect())
            .unwrap_or_default()
    }

    /// Textual description of how `other` differs, `None` when equal
    pub fn diff(&self, other: &NodeRef<'_>) -> Option<String> {
        compare::node_diff(self.bag, self.node, other.bag, other.node)
    }

    /// Copies the node out of the tree
    pub fn to_detached(&self) -> DetachedNode {
        DetachedNode {
            label: self.node.label.clone(),
            value: self.bag.value_to_item(self.node.value()),
            attrs: self.node.attrs.clone(),
            tag: self.node.tag.clone(),
            resolver: self.node.resolver.as_ref().map(ResolverHandle::duplicate),
        }
    }
}

/// Nodes are equal when attributes match and either both values match or,
/// with a resolver, both resolvers have the same fingerprint.
impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        compare::node_eq(self.bag, self.node, other.bag, other.node)
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.node, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_attrs_merge_and_strip() {
        let mut node = Node::new("n");
        let changed = node.apply_attrs(attrs([("a", 1), ("b", 2)]), true, true);
        assert_eq!(changed, vec!["a", "b"]);

        // Same values: nothing changes
        assert!(node.apply_attrs(attrs([("a", 1)]), true, true).is_empty());

        let changed = node.apply_attrs(attrs([("a", Scalar::Null)]), true, true);
        assert_eq!(changed, vec!["a"]);
        assert_eq!(node.attr("a"), None);

        let changed = node.apply_attrs(attrs([("c", Scalar::Null)]), true, false);
        assert_eq!(changed, vec!["c"]);
        assert_eq!(node.attr("c"), Some(&Scalar::Null));
    }

    #[test]
    fn test_apply_attrs_replace() {
        let mut node = Node::new("n");
        node.apply_attrs(attrs([("a", 1), ("b", 2)]), true, true);
        let changed = node.apply_attrs(attrs([("b", 2), ("c", 3)]), false, true);
        assert_eq!(changed, vec!["a", "c"]);
        assert_eq!(node.attrs().keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_duplicate_drops_subscribers() {
        let mut node = Node::new("n");
        node.subscribe("watch", Arc::new(|_| Ok(())));
        assert!(node.has_subscribers());
        let copy = node.duplicate();
        assert!(!copy.has_subscribers());
        assert_eq!(copy.label(), "n");
    }

    #[test]
    fn test_detached_node_builder() {
        let node = DetachedNode::new("item", 5)
            .with_attr("unit", "kg")
            .with_tag("weight");
        let copy = node.clone();
        assert_eq!(copy.value, Value::Int(5));
        assert_eq!(copy.attrs.get("unit"), Some(&Scalar::from("kg")));
        assert_eq!(copy.tag.as_deref(), Some("weight"));
    }
}
