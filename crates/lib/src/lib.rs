//!
//! Bagtree: an in-memory, ordered, hierarchical key-value store.
//! This library provides a tree of labelled nodes addressed by dotted paths,
//! with change events and lazily computed values.
//!
//! ## Core Concepts
//!
//! Bagtree is built around several key concepts:
//!
//! * **Bags (`bag::Bag`)**: A tree of ordered containers. Every container maps labels to nodes
//!   while keeping insertion order; containers nest through node values.
//! * **Nodes (`bag::Node`)**: A labelled entry carrying a value, an attribute map, an optional
//!   tag and an optional resolver.
//! * **Ordered indexes (`bag::OrderedIndex`)**: The label-ordered sequence behind each container,
//!   addressable by label, by position (`#3`) or by attribute lookup (`?id=7`).
//! * **Paths (`bag::path::BagPath`)**: Dotted addresses such as `a.b.#0` or `cfg.host?port`,
//!   including the parent segment `#^` in back-reference mode.
//! * **Resolvers (`resolver::ResolverHandle`)**: Lazy value producers with a per-node cache
//!   policy, loaded synchronously or asynchronously.
//! * **Events (`bag::Subscription`)**: Insert, update and delete callbacks on containers and
//!   nodes, propagated to ancestors when back-references are enabled.
//!
//! ```
//! use bagtree::Bag;
//!
//! let mut bag = Bag::new();
//! bag.set_item("server.host", "localhost").unwrap();
//! bag.set_item("server.port", 8080).unwrap();
//!
//! assert_eq!(bag.keys_at("server"), vec!["host", "port"]);
//! assert_eq!(bag.get_item("server.port").unwrap(), Some(8080.into()));
//! ```

pub mod bag;
pub mod clock;
pub mod config;
pub mod constants;
pub mod resolver;

pub use bag::{
    Bag, BagId, DetachedNode, Item, Node, NodeRef, Scalar, Subscription, Value, attrs,
};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use clock::{Clock, SystemClock};
pub use config::BagConfig;
pub use resolver::{AsyncFnResolver, FnResolver, Resolver, ResolverHandle};

/// Result type used throughout the Bagtree library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Bagtree library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured container errors from the bag module
    #[error(transparent)]
    Bag(bag::BagError),

    /// Structured resolver errors from the resolver module
    #[error(transparent)]
    Resolver(resolver::ResolverError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Bag(_) => "bag",
            Error::Resolver(_) => "resolver",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error is container-related.
    pub fn is_bag_error(&self) -> bool {
        matches!(self, Error::Bag(_))
    }

    /// Check if this error is a structural addressing error.
    pub fn is_structural_error(&self) -> bool {
        match self {
            Error::Bag(bag_err) => bag_err.is_structural_error(),
            _ => false,
        }
    }

    /// Check if this error is related to an unusable path.
    pub fn is_path_error(&self) -> bool {
        match self {
            Error::Bag(bag_err) => bag_err.is_path_error(),
            _ => false,
        }
    }

    /// Check if this error was raised by a subscriber callback.
    pub fn is_callback_error(&self) -> bool {
        match self {
            Error::Bag(bag_err) => bag_err.is_callback_error(),
            _ => false,
        }
    }

    /// Check if this error is resolver-related.
    pub fn is_resolver_error(&self) -> bool {
        matches!(self, Error::Resolver(_))
    }

    /// Check if this error is a loader failure.
    pub fn is_load_error(&self) -> bool {
        match self {
            Error::Resolver(resolver_err) => resolver_err.is_load_error(),
            _ => false,
        }
    }

    /// Check if this error comes from bridging sync and async loads.
    pub fn is_runtime_error(&self) -> bool {
        match self {
            Error::Resolver(resolver_err) => resolver_err.is_runtime_error(),
            _ => false,
        }
    }

    /// Check if this error is serialization-related.
    pub fn is_serialization_error(&self) -> bool {
        match self {
            Error::Serialize(_) => true,
            Error::Resolver(resolver_err) => resolver_err.is_serialization_error(),
            _ => false,
        }
    }

    /// Get the path involved, if this is a path-related error.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::Bag(bag_err) => bag_err.path(),
            _ => None,
        }
    }
}
