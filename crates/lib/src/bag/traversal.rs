//! Path traversal over the container arena.
//!
//! Three flavours share the same segment rules:
//!
//! - static (`&self`): raw value slots only, resolvers are never run
//! - resolving (`&mut self`): nodes with a resolver are resolved before being
//!   descended into, optionally creating missing intermediate containers
//! - async resolving: the same as resolving, awaiting async loaders
//!
//! A segment is resolved by the container's [`OrderedIndex`](super::OrderedIndex)
//! (`label`, `#n`, `?attr=value`), except `#^`, which ascends to the parent
//! container and is only available in back-reference mode.

use std::ops::ControlFlow;

use tracing::trace;

use super::{Bag, BagError, BagId, BagPath, Node, NodeRef, Segment, path::is_reference};
use crate::constants::PARENT_SEGMENT;

/// Outcome of resolving one segment against one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Ascend to this container
    Parent(BagId),
    /// The segment names the node at this index
    Node(usize),
    /// Nothing matches
    Missing,
    /// `#^` without a reachable parent
    NoParent,
}

/// How [`Bag::descend`] treats missing containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Descent {
    /// Stop at the first missing piece; every resolver is run
    Read,
    /// Create missing intermediate containers and replace scalar values on
    /// the way; read-only resolvers cannot be written through
    Create,
}

impl Bag {
    fn step(&self, cid: BagId, segment: &Segment) -> Step {
        match segment {
            Segment::Parent => self.parent_of(cid).map_or(Step::NoParent, Step::Parent),
            Segment::Label(label) => self
                .container(cid)
                .and_then(|c| c.nodes.index(label))
                .map_or(Step::Missing, Step::Node),
        }
    }

    /// Follows `segments` from `start` through raw value slots. Returns the
    /// deepest container reached and the number of segments consumed.
    pub(crate) fn descend_static(&self, start: BagId, segments: &[Segment]) -> (BagId, usize) {
        let mut current = start;
        for (consumed, segment) in segments.iter().enumerate() {
            let next = match self.step(current, segment) {
                Step::Parent(parent) => Some(parent),
                Step::Node(idx) => self
                    .node_at(current, idx)
                    .and_then(Node::bag_id)
                    .filter(|id| self.contains_id(*id)),
                Step::Missing | Step::NoParent => None,
            };
            match next {
                Some(id) => current = id,
                None => return (current, consumed),
            }
        }
        (current, segments.len())
    }

    /// Container reached by following every segment, without resolving
    pub(crate) fn container_at_static(&self, segments: &[Segment]) -> Option<BagId> {
        let (id, consumed) = self.descend_static(self.root, segments);
        (consumed == segments.len()).then_some(id)
    }

    /// Container and index of the node named by `path`, without resolving
    pub(crate) fn node_location(&self, path: &BagPath) -> Option<(BagId, usize)> {
        let (last, parents) = path.split_last()?;
        let cid = self.container_at_static(parents)?;
        match self.step(cid, last) {
            Step::Node(idx) => Some((cid, idx)),
            _ => None,
        }
    }

    /// Deepest container matched by `path` and the part of the path left
    /// over. Resolvers are not run.
    ///
    /// ```
    /// use bagtree::Bag;
    ///
    /// let mut bag = Bag::new();
    /// bag.set_item("a.b.c", 1).unwrap();
    /// let (_, rest) = bag.last_match("a.b.x.y");
    /// assert_eq!(rest.to_string(), "x.y");
    /// ```
    pub fn last_match(&self, path: impl Into<BagPath>) -> (BagId, BagPath) {
        let path = path.into();
        let (id, consumed) = self.descend_static(self.root, path.segments());
        let rest = path.segments()[consumed..]
            .iter()
            .fold(BagPath::new(), |rest, segment| {
                rest.push(segment.as_label().unwrap_or(PARENT_SEGMENT))
            });
        let rest = match path.attr() {
            Some(attr) => rest.with_attr(attr.clone()),
            None => rest,
        };
        (id, rest)
    }

    /// Follows `segments`, resolving nodes with resolvers on the way.
    ///
    /// With [`Descent::Read`] a missing piece gives `Ok(None)`. With
    /// [`Descent::Create`] missing labels become empty containers and scalar
    /// values are replaced by one, so the result is always `Some`.
    pub(crate) fn descend(
        &mut self,
        path: &BagPath,
        segments: &[Segment],
        mode: Descent,
    ) -> crate::Result<Option<BagId>> {
        let mut current = self.root;
        for segment in segments {
            let next = match self.step(current, segment) {
                Step::Parent(parent) => Some(parent),
                Step::NoParent => match mode {
                    Descent::Read => None,
                    Descent::Create => {
                        return Err(BagError::InvalidPath {
                            path: path.to_string(),
                            reason: "no parent container to ascend to".to_string(),
                        }
                        .into());
                    }
                },
                Step::Missing => match (mode, segment) {
                    (Descent::Read, _) | (_, Segment::Parent) => None,
                    (Descent::Create, Segment::Label(label)) => {
                        Some(self.autocreate(path, current, label)?)
                    }
                },
                Step::Node(idx) => {
                    if mode == Descent::Create {
                        self.check_writable(path, current, idx)?;
                    }
                    self.resolve_node(current, idx)?;
                    match self.child_container(current, idx) {
                        Some(child) => Some(child),
                        None if mode == Descent::Create => Some(self.replace_with_container(current, idx)?),
                        None => None,
                    }
                }
            };
            match next {
                Some(id) => current = id,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Async variant of [`descend`](Self::descend) for reads
    pub(crate) async fn descend_async(&mut self, segments: &[Segment]) -> crate::Result<Option<BagId>> {
        let mut current = self.root;
        for segment in segments {
            let next = match self.step(current, segment) {
                Step::Parent(parent) => Some(parent),
                Step::NoParent | Step::Missing => None,
                Step::Node(idx) => {
                    self.resolve_node_async(current, idx).await?;
                    self.child_container(current, idx)
                }
            };
            match next {
                Some(id) => current = id,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    pub(crate) fn child_container(&self, cid: BagId, idx: usize) -> Option<BagId> {
        self.node_at(cid, idx)
            .and_then(Node::bag_id)
            .filter(|id| self.contains_id(*id))
    }

    fn check_writable(&self, path: &BagPath, cid: BagId, idx: usize) -> Result<(), BagError> {
        let node = self.live_node(cid, idx)?;
        match node.resolver() {
            Some(resolver) if resolver.is_read_only() => Err(BagError::InvalidPath {
                path: path.to_string(),
                reason: format!("'{}' is backed by a read-only resolver", node.label()),
            }),
            _ => Ok(()),
        }
    }

    fn autocreate(&mut self, path: &BagPath, cid: BagId, label: &str) -> crate::Result<BagId> {
        if is_reference(label) {
            return Err(BagError::IndexNotCreatable {
                path: path.to_string(),
                segment: label.to_string(),
            }
            .into());
        }
        trace!(path = %path, label, "autocreating container");
        let child = self.new_container(cid);
        let mut node = Node::new(label);
        node.value = child.into();
        let idx = self.live_mut(cid)?.nodes.push(node);
        self.notify_insert(cid, idx, None)?;
        Ok(child)
    }

    fn replace_with_container(&mut self, cid: BagId, idx: usize) -> crate::Result<BagId> {
        let child = self.new_container(cid);
        let node = self.live_node_mut(cid, idx)?;
        trace!(label = node.label(), "replacing value with a container");
        node.take_resolver();
        let scratch = node.scratch.take();
        let old = node.set_raw_value(child.into());
        if let Some(scratch) = scratch {
            self.free(scratch);
        }
        self.notify_value_update(cid, idx, &old, &[], None)?;
        Ok(child)
    }

    /// Depth-first, pre-order walk over raw values.
    ///
    /// `visit` receives the label path of each node. Returning
    /// `ControlFlow::Break` stops the walk and becomes the result; children are
    /// visited only when the callback continues.
    ///
    /// ```
    /// use std::ops::ControlFlow;
    /// use bagtree::Bag;
    ///
    /// let mut bag = Bag::new();
    /// bag.set_item("a.b", 1).unwrap();
    /// bag.set_item("a.c", 2).unwrap();
    /// let found = bag.walk(|path, node| {
    ///     if node.value() == &2 {
    ///         ControlFlow::Break(path.join("."))
    ///     } else {
    ///         ControlFlow::Continue(())
    ///     }
    /// });
    /// assert_eq!(found.as_deref(), Some("a.c"));
    /// ```
    pub fn walk<T, F>(&self, mut visit: F) -> Option<T>
    where
        F: FnMut(&[String], NodeRef<'_>) -> ControlFlow<T>,
    {
        let mut stack = vec![(self.root, 0usize)];
        let mut path: Vec<String> = Vec::new();
        while let Some((cid, idx)) = stack.pop() {
            let Some(node) = self.node_at(cid, idx) else {
                path.pop();
                continue;
            };
            stack.push((cid, idx + 1));
            path.push(node.label().to_string());
            if let ControlFlow::Break(found) = visit(&path, NodeRef::new(self, node)) {
                return Some(found);
            }
            match self.child_container(cid, idx) {
                Some(child) => stack.push((child, 0)),
                None => {
                    path.pop();
                }
            }
        }
        None
    }

    /// Like [`walk`](Self::walk), but every node is resolved before it is
    /// visited. Loader errors stop the walk.
    pub fn walk_resolved<T, F>(&mut self, mut visit: F) -> crate::Result<Option<T>>
    where
        F: FnMut(&[String], NodeRef<'_>) -> ControlFlow<T>,
    {
        let mut stack = vec![(self.root, 0usize)];
        let mut path: Vec<String> = Vec::new();
        while let Some((cid, idx)) = stack.pop() {
            let Some(label) = self.node_at(cid, idx).map(|n| n.label().to_string()) else {
                path.pop();
                continue;
            };
            stack.push((cid, idx + 1));
            self.resolve_node(cid, idx)?;
            path.push(label);
            let node = self.live_node(cid, idx)?;
            if let ControlFlow::Break(found) = visit(&path, NodeRef::new(self, node)) {
                return Ok(Some(found));
            }
            match self.child_container(cid, idx) {
                Some(child) => stack.push((child, 0)),
                None => {
                    path.pop();
                }
            }
        }
        Ok(None)
    }

    /// Lazy depth-first iterator over every node, raw values only. Each
    /// call starts a fresh traversal.
    pub fn traverse(&self) -> Traverse<'_> {
        Traverse {
            bag: self,
            stack: vec![(self.root, 0)],
        }
    }
}

/// Iterator returned by [`Bag::traverse`].
#[derive(Clone)]
pub struct Traverse<'a> {
    bag: &'a Bag,
    stack: Vec<(BagId, usize)>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bag = self.bag;
        loop {
            let (cid, idx) = self.stack.pop()?;
            let Some(node) = bag.node_at(cid, idx) else {
                continue;
            };
            self.stack.push((cid, idx + 1));
            if let Some(child) = bag.child_container(cid, idx) {
                self.stack.push((child, 0));
            }
            return Some(NodeRef::new(bag, node));
        }
    }
}

impl std::fmt::Debug for Traverse<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traverse")
            .field("pending", &self.stack.len())
            .finish()
    }
}
