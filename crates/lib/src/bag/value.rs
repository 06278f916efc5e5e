//! Value types stored in bag nodes.
//!
//! - [`Scalar`] is a leaf value; attribute maps hold scalars only.
//! - [`Value`] is what a node's value slot holds: a scalar or a handle to a
//!   nested container living in the same tree.
//! - [`Item`] is what callers hand over when assigning, and what removal
//!   hands back: it can carry whole standalone trees, resolvers, or detached
//!   nodes, none of which can sit in a value slot directly.

use std::fmt;

use super::{Bag, BagId, DetachedNode};
use crate::resolver::ResolverHandle;

/// Leaf values, used for attributes and as the non-container part of [`Value`].
///
/// ```
/// # use bagtree::Scalar;
/// let color = Scalar::from("red");
/// assert!(color == "red");
/// assert!(Scalar::from(None::<i64>).is_null());
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Null/empty value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text string value
    Text(String),
}

impl Scalar {
    /// Returns true if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "text",
        }
    }

    /// Attempts to convert to a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to convert to an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to convert to a float; integers widen
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Scalar::Float(f) => Some(*f),
            Scalar::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Attempts to convert to a string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compares against the textual right-hand side of a lookup reference
    /// (`?attr=value`). Scalars compare by their display form.
    pub fn matches_text(&self, rhs: &str) -> bool {
        match self {
            Scalar::Text(s) => s == rhs,
            Scalar::Null => rhs.is_empty(),
            other => other.to_string() == rhs,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

/// The content of a node's value slot.
///
/// Nested containers are referenced by [`BagId`]; the container itself is owned
/// by the tree, never by the value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null/empty value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text string value
    Text(String),
    /// Nested container in the same tree
    Bag(BagId),
}

impl Value {
    /// Returns true if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value is a nested container
    pub fn is_bag(&self) -> bool {
        matches!(self, Value::Bag(_))
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bag(_) => "bag",
        }
    }

    /// Attempts to convert to a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to convert to an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to convert to a float; integers widen
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Attempts to convert to a string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested container handle, if any
    pub fn as_bag(&self) -> Option<BagId> {
        match self {
            Value::Bag(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the scalar part of this value; `None` for containers
    pub fn to_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Int(n) => Some(Scalar::Int(*n)),
            Value::Float(f) => Some(Scalar::Float(*f)),
            Value::Text(s) => Some(Scalar::Text(s.clone())),
            Value::Bag(_) => None,
        }
    }

    /// Compares against the textual right-hand side of a lookup reference.
    pub(crate) fn matches_text(&self, rhs: &str) -> bool {
        self.to_scalar().is_some_and(|s| s.matches_text(rhs))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bag(id) => write!(f, "<bag {id}>"),
            other => match other.to_scalar() {
                Some(scalar) => write!(f, "{scalar}"),
                None => Ok(()),
            },
        }
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(n) => Value::Int(n),
            Scalar::Float(f) => Value::Float(f),
            Scalar::Text(s) => Value::Text(s),
        }
    }
}

// Convenient From implementations for common types
macro_rules! impl_from_primitive {
    ($($target:ident),*) => {$(
        impl From<bool> for $target {
            fn from(value: bool) -> Self {
                $target::Bool(value)
            }
        }

        impl From<i64> for $target {
            fn from(value: i64) -> Self {
                $target::Int(value)
            }
        }

        impl From<i32> for $target {
            fn from(value: i32) -> Self {
                $target::Int(value as i64)
            }
        }

        impl From<u32> for $target {
            fn from(value: u32) -> Self {
                $target::Int(value as i64)
            }
        }

        impl From<f64> for $target {
            fn from(value: f64) -> Self {
                $target::Float(value)
            }
        }

        impl From<String> for $target {
            fn from(value: String) -> Self {
                $target::Text(value)
            }
        }

        impl From<&str> for $target {
            fn from(value: &str) -> Self {
                $target::Text(value.to_string())
            }
        }

        impl From<()> for $target {
            fn from(_: ()) -> Self {
                $target::Null
            }
        }

        impl PartialEq<str> for $target {
            fn eq(&self, other: &str) -> bool {
                matches!(self, $target::Text(s) if s == other)
            }
        }

        impl PartialEq<&str> for $target {
            fn eq(&self, other: &&str) -> bool {
                self == *other
            }
        }

        impl PartialEq<i64> for $target {
            fn eq(&self, other: &i64) -> bool {
                matches!(self, $target::Int(n) if n == other)
            }
        }

        impl PartialEq<i32> for $target {
            fn eq(&self, other: &i32) -> bool {
                matches!(self, $target::Int(n) if *n == *other as i64)
            }
        }

        impl PartialEq<bool> for $target {
            fn eq(&self, other: &bool) -> bool {
                matches!(self, $target::Bool(b) if b == other)
            }
        }

        impl PartialEq<f64> for $target {
            fn eq(&self, other: &f64) -> bool {
                matches!(self, $target::Float(x) if x == other)
            }
        }
    )*};
}

impl_from_primitive!(Scalar, Value);

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

impl From<BagId> for Value {
    fn from(value: BagId) -> Self {
        Value::Bag(value)
    }
}

/// Anything that can be assigned to a node, or taken back out of one.
///
/// - `Value`: a scalar, or a container of the *same* tree, which is
///   deep-copied rather than aliased
/// - `Bag`: a standalone tree, moved in as a nested container
/// - `Resolver`: replaces the node's resolver; the raw value becomes null
/// - `Node`: a detached node whose value and attributes are adopted
#[derive(Debug)]
pub enum Item {
    Value(Value),
    Bag(Bag),
    Resolver(ResolverHandle),
    Node(Box<DetachedNode>),
}

impl Item {
    /// The null item
    pub fn null() -> Self {
        Item::Value(Value::Null)
    }

    /// Returns true if this item is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Item::Value(Value::Null))
    }

    /// Returns the plain value, if this item is one
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Item::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the standalone tree, if this item is one
    pub fn as_bag(&self) -> Option<&Bag> {
        match self {
            Item::Bag(bag) => Some(bag),
            _ => None,
        }
    }

    /// Consumes the item, returning the standalone tree if it is one
    pub fn into_bag(self) -> Option<Bag> {
        match self {
            Item::Bag(bag) => Some(bag),
            _ => None,
        }
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Item::Value(v) => v.type_name(),
            Item::Bag(_) => "bag",
            Item::Resolver(_) => "resolver",
            Item::Node(_) => "node",
        }
    }
}

impl Default for Item {
    fn default() -> Self {
        Item::null()
    }
}

// Trees are deep-copied and resolvers duplicated with a fresh cache
impl Clone for Item {
    fn clone(&self) -> Self {
        match self {
            Item::Value(v) => Item::Value(v.clone()),
            Item::Bag(bag) => Item::Bag(bag.clone()),
            Item::Resolver(handle) => Item::Resolver(handle.duplicate()),
            Item::Node(node) => Item::Node(node.clone()),
        }
    }
}

macro_rules! impl_item_from_value {
    ($($source:ty),*) => {$(
        impl From<$source> for Item {
            fn from(value: $source) -> Self {
                Item::Value(Value::from(value))
            }
        }
    )*};
}

impl_item_from_value!(bool, i64, i32, u32, f64, String, &str, (), Scalar, BagId);

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Item::Value(value)
    }
}

impl From<Bag> for Item {
    fn from(value: Bag) -> Self {
        Item::Bag(value)
    }
}

impl From<ResolverHandle> for Item {
    fn from(value: ResolverHandle) -> Self {
        Item::Resolver(value)
    }
}

impl From<DetachedNode> for Item {
    fn from(value: DetachedNode) -> Self {
        Item::Node(Box::new(value))
    }
}

impl PartialEq<Value> for Item {
    fn eq(&self, other: &Value) -> bool {
        self.as_value() == Some(other)
    }
}
