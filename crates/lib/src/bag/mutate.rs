//! Mutations and the notifications they raise.
//!
//! Every change goes through value assignment, node insertion, attribute
//! update or node removal, which compute what actually changed and fire
//! events: first per-node subscribers, then the subscribers of the
//! owning container, then (in back-reference mode) each ancestor with the
//! path extended by the label of the container inside its parent.

use std::slice;

use tracing::trace;

use super::{
    AttrSelector, Attributes, Bag, BagError, BagEvent, BagId, BagPath, DetachedNode, EventKind,
    Item, Node, NodeEvent, NodeEventKind, Position, Scalar, Segment, Selector, UpdateKind, Value,
    compare, path::is_reference, traversal::Descent,
};
use crate::{constants::LIST_SEPARATOR, resolver::ResolverHandle};

/// Options for [`Bag::set_item_with`] and [`Bag::set_value_with`].
#[derive(Debug, Clone)]
pub struct SetOptions {
    /// Attributes merged into the node together with the value
    pub attrs: Attributes,
    /// Where a new node is inserted; ignored when the label exists
    pub position: Position,
    /// Always insert a new node, even if the label already exists
    pub duplicate: bool,
    /// Fire the change, then reset the stored value to null without notifying
    pub fired: bool,
    /// Whether subscribers are notified
    pub trigger: bool,
    /// Free-form reason passed to subscribers
    pub reason: Option<String>,
    /// Drop existing attributes before applying `attrs`
    pub clear_attrs: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            attrs: Attributes::new(),
            position: Position::End,
            duplicate: false,
            fired: false,
            trigger: true,
            reason: None,
            clear_attrs: false,
        }
    }
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs.extend(attrs);
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_position(mut self, position: impl Into<Position>) -> Self {
        self.position = position.into();
        self
    }

    pub fn with_duplicate(mut self, duplicate: bool) -> Self {
        self.duplicate = duplicate;
        self
    }

    pub fn with_fired(mut self, fired: bool) -> Self {
        self.fired = fired;
        self
    }

    pub fn with_trigger(mut self, trigger: bool) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_clear_attrs(mut self, clear: bool) -> Self {
        self.clear_attrs = clear;
        self
    }
}

/// Options for [`Bag::set_attr_with`].
#[derive(Debug, Clone)]
pub struct AttrOptions {
    pub trigger: bool,
    /// Merge into the existing map instead of replacing it
    pub merge: bool,
    /// Remove attributes set to null; defaults to the tree's configuration
    pub strip_nulls: Option<bool>,
    pub reason: Option<String>,
}

impl Default for AttrOptions {
    fn default() -> Self {
        Self {
            trigger: true,
            merge: true,
            strip_nulls: None,
            reason: None,
        }
    }
}

impl AttrOptions {
    pub fn with_trigger(mut self, trigger: bool) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_strip_nulls(mut self, strip: bool) -> Self {
        self.strip_nulls = Some(strip);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// An item turned into what a node can hold
struct Incoming {
    value: Value,
    resolver: Option<ResolverHandle>,
    attrs: Attributes,
    tag: Option<String>,
}

impl Incoming {
    fn value(value: Value) -> Self {
        Self {
            value,
            resolver: None,
            attrs: Attributes::new(),
            tag: None,
        }
    }
}

fn invalid(path: &BagPath, reason: &str) -> BagError {
    BagError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn changed_keys(before: &Attributes, after: &Attributes) -> Vec<String> {
    let mut changed: Vec<String> = before
        .iter()
        .filter(|(k, v)| after.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    changed.extend(
        after
            .keys()
            .filter(|k| !before.contains_key(*k))
            .cloned(),
    );
    changed
}

fn notify_node(
    node: &Node,
    kind: NodeEventKind,
    old_value: Option<&Value>,
    changed_attrs: &[String],
    reason: Option<&str>,
) -> Result<(), BagError> {
    if !node.has_subscribers() {
        return Ok(());
    }
    let event = NodeEvent {
        kind,
        node,
        old_value,
        changed_attrs,
        reason,
    };
    for (id, callback) in node.callbacks() {
        callback(&event).map_err(|source| BagError::Subscriber { id, source })?;
    }
    Ok(())
}

impl Bag {
    /// Label under which `child` hangs in `parent`
    fn label_in(&self, parent: BagId, child: BagId) -> Option<String> {
        self.container(parent)?
            .nodes
            .iter()
            .find(|node| node.bag_id() == Some(child))
            .map(|node| node.label().to_string())
    }

    /// Delivers an event to `cid` and, while back-references allow it, to
    /// every ancestor.
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        cid: BagId,
        kind: EventKind,
        nodes: &[Node],
        mut path: Vec<String>,
        index: Option<usize>,
        old_value: Option<&Value>,
        reason: Option<&str>,
    ) -> Result<(), BagError> {
        let mut current = cid;
        loop {
            let callbacks = self.live(current)?.subscribers.callbacks(kind);
            if !callbacks.is_empty() {
                trace!(%kind, path = ?path, subscribers = callbacks.len(), "delivering event");
                let event = BagEvent {
                    kind,
                    nodes,
                    path: &path,
                    index,
                    old_value,
                    reason,
                };
                for (id, callback) in callbacks {
                    callback(&event).map_err(|source| BagError::Subscriber { id, source })?;
                }
            }
            let Some(parent) = self.parent_of(current) else {
                break;
            };
            let Some(label) = self.label_in(parent, current) else {
                break;
            };
            path.insert(0, label);
            current = parent;
        }
        Ok(())
    }

    pub(crate) fn notify_insert(
        &self,
        cid: BagId,
        idx: usize,
        reason: Option<&str>,
    ) -> Result<(), BagError> {
        let node = self.live_node(cid, idx)?;
        self.notify(
            cid,
            EventKind::Insert,
            slice::from_ref(node),
            vec![node.label().to_string()],
            Some(idx),
            None,
            reason,
        )
    }

    pub(crate) fn notify_value_update(
        &self,
        cid: BagId,
        idx: usize,
        old_value: &Value,
        changed_attrs: &[String],
        reason: Option<&str>,
    ) -> Result<(), BagError> {
        let node = self.live_node(cid, idx)?;
        notify_node(
            node,
            NodeEventKind::UpdateValue,
            Some(old_value),
            changed_attrs,
            reason,
        )?;
        let kind = if changed_attrs.is_empty() {
            UpdateKind::Value
        } else {
            UpdateKind::ValueAndAttrs
        };
        self.notify(
            cid,
            EventKind::Update(kind),
            slice::from_ref(node),
            vec![node.label().to_string()],
            Some(idx),
            Some(old_value),
            reason,
        )
    }

    fn notify_attrs_update(
        &self,
        cid: BagId,
        idx: usize,
        changed_attrs: &[String],
        reason: Option<&str>,
    ) -> Result<(), BagError> {
        let node = self.live_node(cid, idx)?;
        notify_node(node, NodeEventKind::UpdateAttrs, None, changed_attrs, reason)?;
        self.notify(
            cid,
            EventKind::Update(UpdateKind::Attrs),
            slice::from_ref(node),
            vec![node.label().to_string()],
            Some(idx),
            None,
            reason,
        )
    }

    /// Turns an item into node content owned by this tree. Same-tree
    /// containers are copied, standalone trees are moved in.
    fn materialize(&mut self, cid: BagId, item: Item) -> crate::Result<Incoming> {
        Ok(match item {
            Item::Value(Value::Bag(id)) => Incoming::value(Value::Bag(self.copy_within(id, cid)?)),
            Item::Value(value) => Incoming::value(value),
            Item::Bag(bag) => Incoming::value(Value::Bag(self.adopt(bag, cid))),
            Item::Resolver(resolver) => Incoming {
                resolver: Some(resolver),
                ..Incoming::value(Value::Null)
            },
            Item::Node(node) => {
                let DetachedNode {
                    value,
                    attrs,
                    tag,
                    resolver,
                    ..
                } = *node;
                let mut incoming = self.materialize(cid, value)?;
                incoming.attrs.extend(attrs);
                incoming.tag = tag.or(incoming.tag);
                incoming.resolver = resolver.or(incoming.resolver);
                incoming
            }
        })
    }

    pub(crate) fn insert_node(
        &mut self,
        cid: BagId,
        label: &str,
        item: Item,
        options: &SetOptions,
    ) -> crate::Result<usize> {
        let incoming = self.materialize(cid, item)?;
        let mut node = Node::new(label);
        node.value = incoming.value;
        node.resolver = incoming.resolver;
        node.tag = incoming.tag;
        let mut attrs = incoming.attrs;
        attrs.extend(options.attrs.clone());
        node.apply_attrs(attrs, true, self.config.strip_null_attrs);

        let idx = self.live_mut(cid)?.nodes.insert(node, &options.position);
        if options.trigger {
            self.notify_insert(cid, idx, options.reason.as_deref())?;
        }
        Ok(idx)
    }

    /// Assigns `item` to an existing node and notifies if anything changed
    pub(crate) fn assign(
        &mut self,
        cid: BagId,
        idx: usize,
        item: Item,
        options: &SetOptions,
    ) -> crate::Result<()> {
        let incoming = self.materialize(cid, item)?;
        let strip = self.config.strip_null_attrs;

        let (old_value, old_fingerprint) = {
            let node = self.live_node(cid, idx)?;
            (
                node.value().clone(),
                node.resolver().map(ResolverHandle::fingerprint),
            )
        };
        let resolver_changed = incoming
            .resolver
            .as_ref()
            .is_some_and(|r| Some(r.fingerprint()) != old_fingerprint);
        let value_changed = resolver_changed
            || match (&old_value, &incoming.value) {
                (Value::Bag(a), Value::Bag(b)) => !compare::container_eq(self, *a, self, *b),
                (a, b) => a != b,
            };

        let mut attrs = incoming.attrs;
        attrs.extend(options.attrs.clone());

        let node = self.live_node_mut(cid, idx)?;
        let mut scratch = None;
        if let Some(resolver) = incoming.resolver {
            scratch = node.scratch.take();
            node.set_resolver(Some(resolver));
        }
        if let Some(tag) = incoming.tag {
            node.set_tag(Some(tag));
        }
        let before = node.attrs().clone();
        if options.clear_attrs {
            node.take_attrs();
        }
        node.apply_attrs(attrs, true, strip);
        let changed_attrs = changed_keys(&before, node.attrs());

        // Container that is no longer referenced once this call returns
        let orphan = if value_changed {
            node.set_raw_value(incoming.value).as_bag()
        } else {
            incoming.value.as_bag()
        };

        let reason = options.reason.as_deref();
        let notified = match (options.trigger, value_changed) {
            (false, _) => Ok(()),
            (true, true) => self.notify_value_update(cid, idx, &old_value, &changed_attrs, reason),
            (true, false) if !changed_attrs.is_empty() => {
                self.notify_attrs_update(cid, idx, &changed_attrs, reason)
            }
            (true, false) => Ok(()),
        };
        for id in orphan.into_iter().chain(scratch) {
            self.free(id);
        }
        Ok(notified?)
    }

    /// Applies attributes to an existing node and notifies on change
    pub(crate) fn update_attrs(
        &mut self,
        cid: BagId,
        idx: usize,
        attrs: Attributes,
        options: &AttrOptions,
    ) -> crate::Result<()> {
        let strip = options.strip_nulls.unwrap_or(self.config.strip_null_attrs);
        let changed = self
            .live_node_mut(cid, idx)?
            .apply_attrs(attrs, options.merge, strip);
        if options.trigger && !changed.is_empty() {
            self.notify_attrs_update(cid, idx, &changed, options.reason.as_deref())?;
        }
        Ok(())
    }

    fn reset_fired(&mut self, cid: BagId, idx: usize) -> crate::Result<()> {
        let old = self.live_node_mut(cid, idx)?.set_raw_value(Value::Null);
        if let Some(id) = old.as_bag() {
            self.free(id);
        }
        Ok(())
    }

    /// Sets the value at `path`, creating intermediate containers.
    ///
    /// ```
    /// use bagtree::{Bag, Value};
    ///
    /// let mut bag = Bag::new();
    /// bag.set_item("a.b.c", 1).unwrap();
    /// bag.set_item("a.b.c", 2).unwrap();
    /// assert_eq!(bag.get_item("a.b.c").unwrap(), Some(Value::Int(2)));
    /// assert_eq!(bag.keys_at("a.b"), vec!["c"]);
    /// ```
    pub fn set_item(&mut self, path: impl Into<BagPath>, item: impl Into<Item>) -> crate::Result<()> {
        self.set_item_with(path, item, SetOptions::default())
    }

    /// Sets the value at `path` with explicit options.
    ///
    /// An existing label is updated in place unless `duplicate` is set. A
    /// `?name` suffix sets that attribute instead of the value, creating the
    /// node if needed.
    pub fn set_item_with(
        &mut self,
        path: impl Into<BagPath>,
        item: impl Into<Item>,
        options: SetOptions,
    ) -> crate::Result<()> {
        let path = path.into();
        let item = item.into();
        let Some((last, parents)) = path.split_last() else {
            return Err(invalid(&path, "empty path").into());
        };
        let Segment::Label(label) = last else {
            return Err(invalid(&path, "cannot assign to a parent segment").into());
        };
        let cid = self
            .descend(&path, parents, Descent::Create)?
            .ok_or_else(|| invalid(&path, "container not reachable"))?;

        let existing = if options.duplicate {
            None
        } else {
            self.container(cid).and_then(|c| c.nodes.index(label))
        };
        if existing.is_none() && is_reference(label) {
            return Err(BagError::IndexNotCreatable {
                path: path.to_string(),
                segment: label.clone(),
            }
            .into());
        }

        match path.attr() {
            Some(AttrSelector::Named(name)) => {
                let scalar = item
                    .as_value()
                    .and_then(Value::to_scalar)
                    .ok_or_else(|| invalid(&path, "attribute values must be scalars"))?;
                return match existing {
                    Some(idx) => {
                        let mut attrs = options.attrs;
                        attrs.insert(name.clone(), scalar);
                        let attr_options = AttrOptions {
                            trigger: options.trigger,
                            reason: options.reason,
                            ..Default::default()
                        };
                        self.update_attrs(cid, idx, attrs, &attr_options)
                    }
                    None => {
                        let mut options = options;
                        options.attrs.insert(name.clone(), scalar);
                        self.insert_node(cid, label, Item::null(), &options)
                            .map(|_| ())
                    }
                };
            }
            Some(AttrSelector::All) => {
                return Err(invalid(&path, "a bare '?' cannot be assigned").into());
            }
            None => {}
        }

        let idx = match existing {
            Some(idx) => {
                self.assign(cid, idx, item, &options)?;
                idx
            }
            None => self.insert_node(cid, label, item, &options)?,
        };
        if options.fired {
            self.reset_fired(cid, idx)?;
        }
        Ok(())
    }

    /// Sets the value of an existing node. Returns false when there is none.
    pub fn set_value(&mut self, path: impl Into<BagPath>, item: impl Into<Item>) -> crate::Result<bool> {
        self.set_value_with(path, item, SetOptions::default())
    }

    /// [`set_value`](Self::set_value) with options; `position` and
    /// `duplicate` do not apply.
    pub fn set_value_with(
        &mut self,
        path: impl Into<BagPath>,
        item: impl Into<Item>,
        options: SetOptions,
    ) -> crate::Result<bool> {
        let Some((cid, idx)) = self.node_location(&path.into()) else {
            return Ok(false);
        };
        self.assign(cid, idx, item.into(), &options)?;
        if options.fired {
            self.reset_fired(cid, idx)?;
        }
        Ok(true)
    }

    /// Merges `attrs` into the node at `path`. Null values remove the
    /// attribute unless null stripping is disabled.
    pub fn set_attr(&mut self, path: impl Into<BagPath>, attrs: Attributes) -> crate::Result<bool> {
        self.set_attr_with(path, attrs, AttrOptions::default())
    }

    pub fn set_attr_with(
        &mut self,
        path: impl Into<BagPath>,
        attrs: Attributes,
        options: AttrOptions,
    ) -> crate::Result<bool> {
        let Some((cid, idx)) = self.node_location(&path.into()) else {
            return Ok(false);
        };
        self.update_attrs(cid, idx, attrs, &options)?;
        Ok(true)
    }

    /// Removes attributes; `names` may be comma-joined (`"a,b"`).
    pub fn del_attr(&mut self, path: impl Into<BagPath>, names: &str) -> crate::Result<bool> {
        let removal: Attributes = names
            .split(LIST_SEPARATOR)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| (name.to_string(), Scalar::Null))
            .collect();
        self.set_attr_with(path, removal, AttrOptions::default().with_strip_nulls(true))
    }

    /// Sets or clears the tag of the node at `path`. No event is raised.
    pub fn set_tag(&mut self, path: impl Into<BagPath>, tag: Option<&str>) -> bool {
        let Some((cid, idx)) = self.node_location(&path.into()) else {
            return false;
        };
        match self.node_at_mut(cid, idx) {
            Some(node) => {
                node.set_tag(tag.map(str::to_string));
                true
            }
            None => false,
        }
    }

    /// Removes a node, firing the delete event while it is still intact
    fn remove_node(&mut self, cid: BagId, idx: usize) -> crate::Result<Node> {
        let node = self
            .live_mut(cid)?
            .nodes
            .remove_at(idx)
            .ok_or_else(|| BagError::StaleHandle { id: cid.to_string() })?;
        let notified = self.notify(
            cid,
            EventKind::Delete,
            slice::from_ref(&node),
            Vec::new(),
            Some(idx),
            Some(node.value()),
            None,
        );
        match notified {
            Ok(()) => Ok(node),
            Err(err) => {
                self.discard_node(node);
                Err(err.into())
            }
        }
    }

    /// Removes the node at `path` and returns its raw value; containers come
    /// back as standalone trees.
    pub fn pop(&mut self, path: impl Into<BagPath>) -> crate::Result<Option<Item>> {
        Ok(self.pop_node(path)?.map(|node| node.value))
    }

    /// Removes the node at `path` and returns it whole
    pub fn pop_node(&mut self, path: impl Into<BagPath>) -> crate::Result<Option<DetachedNode>> {
        let Some((cid, idx)) = self.node_location(&path.into()) else {
            return Ok(None);
        };
        let node = self.remove_node(cid, idx)?;
        Ok(Some(self.detach_node(node)))
    }

    /// Removes the node at `path`. Returns false when there is none.
    pub fn delete(&mut self, path: impl Into<BagPath>) -> crate::Result<bool> {
        let Some((cid, idx)) = self.node_location(&path.into()) else {
            return Ok(false);
        };
        let node = self.remove_node(cid, idx)?;
        self.discard_node(node);
        Ok(true)
    }

    /// Removes every node of the root container
    pub fn clear(&mut self) -> crate::Result<()> {
        self.clear_at(BagPath::new()).map(|_| ())
    }

    /// Removes every node of the container at `path` with a single delete
    /// event carrying all of them.
    pub fn clear_at(&mut self, path: impl Into<BagPath>) -> crate::Result<bool> {
        let path = path.into();
        let Some(cid) = self.container_at_static(path.segments()) else {
            return Ok(false);
        };
        let nodes = self.live_mut(cid)?.nodes.clear();
        let notified = if nodes.is_empty() {
            Ok(())
        } else {
            self.notify(cid, EventKind::Delete, &nodes, Vec::new(), None, None, None)
        };
        for node in nodes {
            self.discard_node(node);
        }
        notified?;
        Ok(true)
    }

    /// Moves root nodes; see [`move_nodes_at`](Self::move_nodes_at)
    pub fn move_nodes<S: AsRef<str>>(
        &mut self,
        refs: &[S],
        position: impl Into<Position>,
    ) -> crate::Result<Vec<usize>> {
        self.move_nodes_at(BagPath::new(), refs, position, true)
    }

    /// Moves the referenced nodes of the container at `path` to `position`,
    /// keeping their relative order. Invalid destinations move nothing.
    /// With `trigger` each moved node raises a delete then an insert event.
    pub fn move_nodes_at<S: AsRef<str>>(
        &mut self,
        path: impl Into<BagPath>,
        refs: &[S],
        position: impl Into<Position>,
        trigger: bool,
    ) -> crate::Result<Vec<usize>> {
        let path = path.into();
        let position = position.into();
        let Some(cid) = self.container_at_static(path.segments()) else {
            return Ok(Vec::new());
        };
        let nodes = &mut self.live_mut(cid)?.nodes;
        let selector = Selector::refs(refs.iter().map(|r| r.as_ref().to_string()));
        let from = nodes.select(&selector);
        let moved = nodes.move_entries(refs, &position);
        trace!(path = %path, ?position, moved = moved.len(), "moved nodes");

        if trigger {
            for (&old, &new) in from.iter().zip(&moved) {
                let node = self.live_node(cid, new)?;
                let nodes = slice::from_ref(node);
                self.notify(cid, EventKind::Delete, nodes, Vec::new(), Some(old), None, None)?;
                self.notify(
                    cid,
                    EventKind::Insert,
                    nodes,
                    vec![node.label().to_string()],
                    Some(new),
                    None,
                    None,
                )?;
            }
        }
        Ok(moved)
    }
}
