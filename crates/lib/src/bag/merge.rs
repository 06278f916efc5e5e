//! Combining trees: `merge` builds a new tree, `update` works in place, and
//! `filtered` copies a selection of the root's nodes.

use std::sync::Arc;

use super::{
    AttrOptions, Bag, BagId, Item, Node, NodeRef, Selector, SetOptions, Value, copy_container,
};

/// Controls how [`Bag::merge`] combines two trees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Replace values of labels present on both sides
    pub upd_values: bool,
    /// Copy labels only present on the right-hand side
    pub add_values: bool,
    /// Overwrite attributes present on both sides
    pub upd_attrs: bool,
    /// Copy attributes only present on the right-hand side
    pub add_attrs: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            upd_values: true,
            add_values: true,
            upd_attrs: true,
            add_attrs: true,
        }
    }
}

/// Controls [`Bag::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOptions {
    /// Resolve the source's resolvers and copy their values instead of the
    /// resolvers themselves
    pub resolved: bool,
    /// Skip source nodes whose value is null
    pub ignore_null: bool,
}

impl Bag {
    /// Returns a new tree combining `self` with `other`.
    ///
    /// Shared labels keep their position from `self`; nested containers are
    /// merged recursively, other values are replaced when `upd_values` is set.
    /// Labels only in `other` are appended when `add_values` is set.
    ///
    /// ```
    /// use bagtree::{Bag, Value, bag::MergeOptions};
    ///
    /// let mut left = Bag::new();
    /// left.set_item("a", 0).unwrap();
    /// left.set_item("c", 3).unwrap();
    /// let mut right = Bag::new();
    /// right.set_item("a", 1).unwrap();
    /// right.set_item("b", 2).unwrap();
    ///
    /// let mut merged = left.merge(&right, MergeOptions::default());
    /// assert_eq!(merged.keys(), vec!["a", "c", "b"]);
    /// assert_eq!(merged.get_item("a").unwrap(), Some(Value::Int(1)));
    /// ```
    pub fn merge(&self, other: &Bag, options: MergeOptions) -> Bag {
        let mut merged = self.clone();
        let root = merged.root;
        merged.merge_from(root, other, other.root, options);
        merged
    }

    fn merge_from(&mut self, cid: BagId, other: &Bag, source: BagId, options: MergeOptions) {
        let Some(container) = other.container(source) else {
            return;
        };
        for incoming in container.nodes.iter() {
            let Some(idx) = self
                .container(cid)
                .and_then(|c| c.nodes.position_of(incoming.label()))
            else {
                if options.add_values {
                    self.import_node(cid, other, incoming);
                }
                continue;
            };

            let target_child = self.node_at(cid, idx).and_then(|n| n.value().as_bag());
            match (target_child, incoming.value().as_bag()) {
                (Some(dst), Some(src)) => self.merge_from(dst, other, src, options),
                _ if options.upd_values => self.replace_from(cid, idx, other, incoming),
                _ => {}
            }

            if let Some(node) = self.node_at_mut(cid, idx) {
                for (name, value) in incoming.attrs() {
                    let exists = node.attrs.contains_key(name);
                    if (exists && options.upd_attrs) || (!exists && options.add_attrs) {
                        node.attrs.insert(name.clone(), value.clone());
                    }
                }
            }
        }
    }

    /// Copies the container `id` of `other` into this tree under `parent`
    fn import(&mut self, other: &Bag, id: BagId, parent: BagId) -> Value {
        let Some(copy) = copy_container(other, id, &mut self.arena, Some(parent)) else {
            return Value::Null;
        };
        if self.container(parent).is_some_and(|c| c.backref) {
            self.set_backref(copy);
        }
        Value::Bag(copy)
    }

    fn import_node(&mut self, cid: BagId, other: &Bag, source: &Node) {
        let mut node = source.duplicate();
        if let Some(id) = source.value().as_bag() {
            node.value = self.import(other, id, cid);
        }
        if let Some(container) = self.arena.get_mut(cid) {
            container.nodes.push(node);
        }
    }

    fn replace_from(&mut self, cid: BagId, idx: usize, other: &Bag, source: &Node) {
        let value = match source.value().as_bag() {
            Some(id) => self.import(other, id, cid),
            None => source.value().clone(),
        };
        let Some(node) = self.node_at_mut(cid, idx) else {
            return;
        };
        node.set_resolver(source.resolver().map(|r| r.duplicate()));
        let scratch = node.scratch.take();
        let old = node.set_raw_value(value);
        for id in old.as_bag().into_iter().chain(scratch) {
            self.free(id);
        }
    }

    /// Updates this tree in place from `other`.
    ///
    /// Existing labels take the source's value, resolver and attributes
    /// (attributes merge); nested containers on both sides are updated
    /// recursively. New labels are appended. Subscribers see the changes as
    /// ordinary updates and inserts.
    pub fn update(&mut self, other: &mut Bag, options: UpdateOptions) -> crate::Result<()> {
        let (root, source) = (self.root, other.root);
        self.update_from(root, other, source, options)
    }

    fn update_from(
        &mut self,
        cid: BagId,
        other: &mut Bag,
        source: BagId,
        options: UpdateOptions,
    ) -> crate::Result<()> {
        let count = other.live(source)?.nodes.len();
        for i in 0..count {
            if options.resolved {
                other.resolve_node(source, i)?;
            }
            let incoming = other.live_node(source, i)?;
            let label = incoming.label().to_string();
            let source_child = if options.resolved {
                incoming.bag_id()
            } else {
                incoming.value().as_bag()
            }
            .filter(|id| other.contains_id(*id));
            let pending_resolver = !options.resolved && incoming.has_resolver();
            if options.ignore_null
                && source_child.is_none()
                && incoming.value().is_null()
                && !pending_resolver
            {
                continue;
            }

            let target = self
                .container(cid)
                .and_then(|c| c.nodes.position_of(&label));
            let target_child = target
                .and_then(|idx| self.node_at(cid, idx))
                .and_then(|n| n.value().as_bag());

            match (target, target_child, source_child) {
                (Some(idx), Some(dst), Some(src)) => {
                    let attrs = incoming.attrs().clone();
                    self.update_from(dst, other, src, options)?;
                    self.update_attrs(cid, idx, attrs, &AttrOptions::default())?;
                }
                (Some(idx), _, _) => {
                    let item = source_item(other, incoming, options.resolved);
                    self.assign(cid, idx, item, &SetOptions::default())?;
                }
                (None, _, _) => {
                    let item = source_item(other, incoming, options.resolved);
                    self.insert_node(cid, &label, item, &SetOptions::default())?;
                }
            }
        }
        Ok(())
    }

    /// Copy of the tree keeping only the root nodes picked by `selector`
    ///
    /// ```
    /// use bagtree::{Bag, Node, bag::Selector};
    ///
    /// let mut bag = Bag::new();
    /// for (label, n) in [("a", 1), ("b", 2), ("c", 3)] {
    ///     bag.set_item(label, n).unwrap();
    /// }
    /// let odd = bag.filtered(Selector::predicate(|node: &Node| {
    ///     node.value().as_int().is_some_and(|n| n % 2 == 1)
    /// }));
    /// assert_eq!(odd.keys(), vec!["a", "c"]);
    /// ```
    pub fn filtered(&self, selector: Selector<'_, Node>) -> Bag {
        let mut filtered = Bag::with_config(self.config.clone()).with_clock(Arc::clone(&self.clock));
        let Some(container) = self.container(self.root) else {
            return filtered;
        };
        let root = filtered.root;
        for idx in container.nodes.select(&selector) {
            if let Some(node) = container.nodes.get_at(idx) {
                filtered.import_node(root, self, node);
            }
        }
        filtered
    }
}

/// Source node as an item for assignment, copied out of `other`
fn source_item(other: &Bag, node: &Node, resolved: bool) -> Item {
    let mut detached = NodeRef::new(other, node).to_detached();
    if resolved {
        detached.resolver = None;
        detached.value = match node.bag_id().filter(|id| other.contains_id(*id)) {
            Some(id) => Item::Bag(other.copy_out(id)),
            None => Item::Value(node.value().clone()),
        };
    }
    Item::Node(Box::new(detached))
}
