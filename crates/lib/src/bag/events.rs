//! Change notifications.
//!
//! Every container holds three subscriber registries (insert, update,
//! delete). Callbacks run synchronously, in registration order, before the
//! mutating call returns. When a container is in back-reference mode the
//! event is then forwarded to its parent with the parent-side label prepended
//! to the path, up to the root.
//!
//! Insert and update events carry the path of the node itself; delete events
//! carry the path of the container the node was removed from.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use super::{CallbackError, node::Node, value::Value};

/// Kind of attribute/value change reported by an update event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// The value changed
    Value,
    /// The value was set and attributes changed with it
    ValueAndAttrs,
    /// Only attributes changed
    Attrs,
}

/// What happened to the nodes of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Insert,
    Update(UpdateKind),
    Delete,
}

impl EventKind {
    /// Registry that receives this kind
    pub fn subscriber_kind(&self) -> SubscriberKind {
        match self {
            EventKind::Insert => SubscriberKind::Insert,
            EventKind::Update(_) => SubscriberKind::Update,
            EventKind::Delete => SubscriberKind::Delete,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Insert => write!(f, "ins"),
            EventKind::Update(UpdateKind::Value) => write!(f, "upd_value"),
            EventKind::Update(UpdateKind::ValueAndAttrs) => write!(f, "upd_value_attr"),
            EventKind::Update(UpdateKind::Attrs) => write!(f, "upd_attrs"),
            EventKind::Delete => write!(f, "del"),
        }
    }
}

/// Registry selector for [`Bag::unsubscribe`](super::Bag::unsubscribe)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    Insert,
    Update,
    Delete,
    /// All three registries
    Any,
}

/// A change delivered to container subscribers.
#[derive(Debug, Clone, Copy)]
pub struct BagEvent<'a> {
    pub(crate) kind: EventKind,
    pub(crate) nodes: &'a [Node],
    pub(crate) path: &'a [String],
    pub(crate) index: Option<usize>,
    pub(crate) old_value: Option<&'a Value>,
    pub(crate) reason: Option<&'a str>,
}

impl<'a> BagEvent<'a> {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Nodes affected; several only for `clear`
    pub fn nodes(&self) -> &'a [Node] {
        self.nodes
    }

    /// The first affected node
    pub fn node(&self) -> Option<&'a Node> {
        self.nodes.first()
    }

    /// Labels from the receiving container down to the node (insert/update)
    /// or to the node's former container (delete)
    pub fn path(&self) -> &'a [String] {
        self.path
    }

    /// Dotted form of [`path`](Self::path)
    pub fn dotted_path(&self) -> String {
        super::path::BagPath::from_labels(self.path.iter().cloned()).to_string()
    }

    /// Position of the node inside its own container
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Value before an update
    pub fn old_value(&self) -> Option<&'a Value> {
        self.old_value
    }

    /// Caller-supplied reason passed through from the mutation
    pub fn reason(&self) -> Option<&'a str> {
        self.reason
    }
}

/// Container subscriber callback
pub type EventCallback = Arc<dyn Fn(&BagEvent<'_>) -> Result<(), CallbackError> + Send + Sync>;

/// Callbacks to install under one subscriber id.
///
/// ```
/// use bagtree::{Bag, Subscription};
///
/// let mut bag = Bag::new();
/// bag.subscribe(
///     "audit",
///     Subscription::new().on_any(|event| {
///         println!("{} {}", event.kind(), event.dotted_path());
///         Ok(())
///     }),
/// );
/// assert!(bag.is_backref());
/// ```
#[derive(Clone, Default)]
pub struct Subscription {
    insert: Option<EventCallback>,
    update: Option<EventCallback>,
    delete: Option<EventCallback>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_insert<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BagEvent<'_>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.insert = Some(Arc::new(callback));
        self
    }

    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BagEvent<'_>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.update = Some(Arc::new(callback));
        self
    }

    pub fn on_delete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BagEvent<'_>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.delete = Some(Arc::new(callback));
        self
    }

    /// Installs one callback into all three registries
    pub fn on_any<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BagEvent<'_>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let callback: EventCallback = Arc::new(callback);
        self.insert = Some(Arc::clone(&callback));
        self.update = Some(Arc::clone(&callback));
        self.delete = Some(callback);
        self
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("insert", &self.insert.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

/// The three registries of one container.
#[derive(Clone, Default)]
pub(crate) struct Registries {
    insert: IndexMap<String, EventCallback>,
    update: IndexMap<String, EventCallback>,
    delete: IndexMap<String, EventCallback>,
}

impl Registries {
    /// Installs the callbacks of `subscription`; an existing id keeps its
    /// place in registration order
    pub(crate) fn subscribe(&mut self, id: &str, subscription: Subscription) {
        let Subscription {
            insert,
            update,
            delete,
        } = subscription;
        for (registry, callback) in [
            (&mut self.insert, insert),
            (&mut self.update, update),
            (&mut self.delete, delete),
        ] {
            if let Some(callback) = callback {
                registry.insert(id.to_string(), callback);
            }
        }
    }

    pub(crate) fn unsubscribe(&mut self, id: &str, kind: SubscriberKind) -> bool {
        let mut removed = false;
        for (registry_kind, registry) in [
            (SubscriberKind::Insert, &mut self.insert),
            (SubscriberKind::Update, &mut self.update),
            (SubscriberKind::Delete, &mut self.delete),
        ] {
            if kind == SubscriberKind::Any || kind == registry_kind {
                removed |= registry.shift_remove(id).is_some();
            }
        }
        removed
    }

    /// Snapshot of the callbacks for `kind`, in registration order
    pub(crate) fn callbacks(&self, kind: EventKind) -> Vec<(String, EventCallback)> {
        let registry = match kind.subscriber_kind() {
            SubscriberKind::Insert => &self.insert,
            SubscriberKind::Update => &self.update,
            SubscriberKind::Delete | SubscriberKind::Any => &self.delete,
        };
        registry
            .iter()
            .map(|(id, callback)| (id.clone(), Arc::clone(callback)))
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

impl fmt::Debug for Registries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registries")
            .field("insert", &self.insert.keys().collect::<Vec<_>>())
            .field("update", &self.update.keys().collect::<Vec<_>>())
            .field("delete", &self.delete.keys().collect::<Vec<_>>())
            .finish()
    }
}
