//! Column projections over the nodes of one container.
//!
//! A digest spec is a comma-separated list of fields:
//!
//! | token       | field                                   |
//! |-------------|-----------------------------------------|
//! | `#k`        | label                                   |
//! | `#v`        | raw value                               |
//! | `#v.path`   | value at `path` inside a nested container |
//! | `#a`        | whole attribute map                     |
//! | `#a.name`   | one attribute                           |
//! | anything else | the attribute with that name          |

use std::{fmt, sync::Arc};

use super::{Attributes, Bag, BagId, BagPath, NodeRef, Value};
use crate::constants::{LIST_SEPARATOR, PATH_SEPARATOR};

/// Per-node projection used by [`DigestField::Custom`]
pub type DigestFn = Arc<dyn Fn(NodeRef<'_>) -> Value + Send + Sync>;

/// One column of a digest
#[derive(Clone)]
pub enum DigestField {
    Label,
    Value,
    Attrs,
    Attr(String),
    /// Value at a path inside the node's container
    ValueAt(String),
    Custom(DigestFn),
}

impl DigestField {
    /// Parses a comma-separated digest spec
    pub fn parse_spec(spec: &str) -> Vec<DigestField> {
        spec.split(LIST_SEPARATOR)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(Self::parse_token)
            .collect()
    }

    fn parse_token(token: &str) -> DigestField {
        let (head, rest) = match token.split_once(PATH_SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (token, None),
        };
        match (head, rest) {
            ("#k", None) => DigestField::Label,
            ("#v", None) => DigestField::Value,
            ("#v", Some(path)) => DigestField::ValueAt(path.to_string()),
            ("#a", None) => DigestField::Attrs,
            ("#a", Some(name)) => DigestField::Attr(name.to_string()),
            _ => DigestField::Attr(token.to_string()),
        }
    }

    /// Builds a custom column
    pub fn custom(f: impl Fn(NodeRef<'_>) -> Value + Send + Sync + 'static) -> Self {
        DigestField::Custom(Arc::new(f))
    }
}

impl fmt::Debug for DigestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestField::Label => write!(f, "Label"),
            DigestField::Value => write!(f, "Value"),
            DigestField::Attrs => write!(f, "Attrs"),
            DigestField::Attr(name) => f.debug_tuple("Attr").field(name).finish(),
            DigestField::ValueAt(path) => f.debug_tuple("ValueAt").field(path).finish(),
            DigestField::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// One cell of a digest
#[derive(Debug, Clone, PartialEq)]
pub enum DigestValue {
    Value(Value),
    Attrs(Attributes),
}

impl DigestValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            DigestValue::Value(value) => Some(value),
            DigestValue::Attrs(_) => None,
        }
    }
}

/// Rows of projected fields, one row per node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Digest {
    rows: Vec<Vec<DigestValue>>,
}

impl Digest {
    /// Row tuples, in node order
    pub fn rows(&self) -> &[Vec<DigestValue>] {
        &self.rows
    }

    /// Parallel lists, one per field
    pub fn columns(&self) -> Vec<Vec<DigestValue>> {
        let width = self.rows.first().map_or(0, Vec::len);
        (0..width)
            .map(|col| self.rows.iter().map(|row| row[col].clone()).collect())
            .collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Bag {
    /// Projects the root container's nodes through a digest spec. Raw values
    /// are read; resolvers are not run.
    ///
    /// ```
    /// use bagtree::{Bag, Value, bag::{DigestValue, SetOptions}};
    ///
    /// let mut bag = Bag::new();
    /// bag.set_item_with("a", 1, SetOptions::new().with_attr("unit", "kg")).unwrap();
    /// bag.set_item("b", 2).unwrap();
    ///
    /// let digest = bag.digest("#k,#v,#a.unit");
    /// assert_eq!(digest.len(), 2);
    /// assert_eq!(digest.columns()[0][1], DigestValue::Value(Value::from("b")));
    /// assert_eq!(digest.rows()[0][2], DigestValue::Value(Value::from("kg")));
    /// ```
    pub fn digest(&self, spec: &str) -> Digest {
        self.digest_in(self.root, &DigestField::parse_spec(spec), None)
    }

    /// Digest of the container at `path`, keeping only nodes accepted by
    /// `condition`. `None` when `path` does not lead to a container.
    pub fn digest_with(
        &self,
        path: impl Into<BagPath>,
        fields: &[DigestField],
        condition: Option<&dyn Fn(NodeRef<'_>) -> bool>,
    ) -> Option<Digest> {
        let path = path.into();
        let cid = self.container_at_static(path.segments())?;
        Some(self.digest_in(cid, fields, condition))
    }

    pub(crate) fn digest_in(
        &self,
        cid: BagId,
        fields: &[DigestField],
        condition: Option<&dyn Fn(NodeRef<'_>) -> bool>,
    ) -> Digest {
        let Some(container) = self.container(cid) else {
            return Digest::default();
        };
        let rows = container
            .nodes
            .iter()
            .map(|node| NodeRef::new(self, node))
            .filter(|node| condition.is_none_or(|keep| keep(*node)))
            .map(|node| fields.iter().map(|field| self.project(node, field)).collect())
            .collect();
        Digest { rows }
    }

    fn project(&self, node: NodeRef<'_>, field: &DigestField) -> DigestValue {
        match field {
            DigestField::Label => DigestValue::Value(Value::from(node.label())),
            DigestField::Value => DigestValue::Value(node.value().clone()),
            DigestField::Attrs => DigestValue::Attrs(node.attrs().clone()),
            DigestField::Attr(name) => {
                DigestValue::Value(node.attr(name).cloned().map(Value::from).unwrap_or_default())
            }
            DigestField::ValueAt(path) => {
                let value = node
                    .node()
                    .bag_id()
                    .and_then(|id| self.get_static_in(id, &BagPath::parse(path)))
                    .unwrap_or_default();
                DigestValue::Value(value)
            }
            DigestField::Custom(f) => DigestValue::Value(f(node)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec() {
        let fields = DigestField::parse_spec("#k, #v,#a,#a.color,#v.inner.x,weight");
        let names: Vec<String> = fields.iter().map(|f| format!("{f:?}")).collect();
        assert_eq!(
            names,
            vec![
                "Label",
                "Value",
                "Attrs",
                "Attr(\"color\")",
                "ValueAt(\"inner.x\")",
                "Attr(\"weight\")",
            ]
        );
    }

    #[test]
    fn test_condition_and_nested_values() {
        let mut bag = Bag::new();
        bag.set_item("rows.r1.qty", 3).unwrap();
        bag.set_item("rows.r2.qty", 0).unwrap();
        bag.set_item("rows.r3.qty", 5).unwrap();

        let keep = |node: NodeRef<'_>| node.label() != "r2";
        let digest = bag
            .digest_with(
                "rows",
                &[DigestField::Label, DigestField::ValueAt("qty".into())],
                Some(&keep),
            )
            .unwrap();
        assert_eq!(
            digest.columns()[1],
            vec![
                DigestValue::Value(Value::Int(3)),
                DigestValue::Value(Value::Int(5))
            ]
        );
        assert!(bag.digest_with("rows.r1.qty", &[DigestField::Label], None).is_none());
    }

    #[test]
    fn test_custom_field() {
        let mut bag = Bag::new();
        bag.set_item("a", 2).unwrap();
        let double = DigestField::custom(|node| {
            Value::from(node.value().as_int().unwrap_or(0) * 2)
        });
        let digest = bag.digest_with("", &[double], None).unwrap();
        assert_eq!(digest.rows()[0][0].as_value(), Some(&Value::Int(4)));
    }
}
