//! Path types for hierarchical bag access.
//!
//! A path is a dot-separated list of segments. Each segment is resolved by the
//! ordered index of the container reached so far, so besides plain labels it
//! may be a positional reference (`#2`) or an attribute lookup (`?id=7`).
//!
//! - `\.` escapes a literal dot inside a label
//! - `#^` ascends to the container holding the current container
//! - a `?name` suffix on the final segment selects an attribute instead of the
//!   value, and a bare `?` selects the whole attribute map
//!
//! Empty segments are dropped, so `".a..b."` is the same path as `"a.b"`.
//!
//! ```rust
//! use bagtree::bag::path::{AttrSelector, BagPath, Segment};
//!
//! let path = BagPath::parse("config.db\\.host?port");
//! assert_eq!(
//!     path.segments(),
//!     &[Segment::label("config"), Segment::label("db.host")]
//! );
//! assert_eq!(path.attr(), Some(&AttrSelector::Named("port".to_string())));
//! assert_eq!(path.to_string(), "config.db\\.host?port");
//! ```

use std::{convert::Infallible, fmt, str::FromStr};

use crate::constants::{
    ATTR_MARKER, ESCAPE, INDEX_PREFIX, LOOKUP_SEPARATOR, PARENT_SEGMENT, PATH_SEPARATOR,
};

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `#^`: ascend to the parent container
    Parent,
    /// A label, positional reference or lookup reference (unescaped)
    Label(String),
}

impl Segment {
    /// Creates a label segment
    pub fn label(label: impl Into<String>) -> Self {
        Segment::Label(label.into())
    }

    /// Returns the label text, `None` for `#^`
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Segment::Label(label) => Some(label),
            Segment::Parent => None,
        }
    }

    /// True for `#n` references and `?attr=value` lookups: segments that
    /// address existing nodes and can never name a node to be created.
    pub fn is_reference(&self) -> bool {
        self.as_label().is_some_and(is_reference)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Parent => write!(f, "{PARENT_SEGMENT}"),
            Segment::Label(label) => write!(f, "{}", escape_label(label)),
        }
    }
}

/// True if `label` is a `#<digits>` positional reference.
pub fn is_index_reference(label: &str) -> bool {
    parse_index_reference(label).is_some()
}

/// Parses a `#<digits>` positional reference.
pub fn parse_index_reference(label: &str) -> Option<usize> {
    let digits = label.strip_prefix(INDEX_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Splits a `?attr=value` lookup reference into `(attr, value)`.
///
/// An empty `attr` means the lookup compares node values.
pub fn parse_lookup_reference(label: &str) -> Option<(&str, &str)> {
    label.strip_prefix(ATTR_MARKER)?.split_once(LOOKUP_SEPARATOR)
}

pub(crate) fn is_reference(label: &str) -> bool {
    is_index_reference(label) || parse_lookup_reference(label).is_some()
}

/// Escapes the dots of a label so it survives path parsing.
pub fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c == PATH_SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Splits a raw path into unescaped components, dropping empty ones.
///
/// ```rust
/// # use bagtree::bag::path::split_components;
/// assert_eq!(split_components(""), Vec::<String>::new());
/// assert_eq!(split_components(".user..name."), vec!["user", "name"]);
/// assert_eq!(split_components("a\\.b.c"), vec!["a.b", "c"]);
/// ```
pub fn split_components(input: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(next) => current.push(next),
                None => current.push(ESCAPE),
            },
            PATH_SEPARATOR => {
                if !current.is_empty() {
                    components.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        components.push(current);
    }
    components
}

/// What the `?` suffix of a path selects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrSelector {
    /// Bare `?`: the whole attribute map
    All,
    /// `?name`: a single attribute
    Named(String),
}

/// An owned, parsed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BagPath {
    segments: Vec<Segment>,
    attr: Option<AttrSelector>,
}

impl BagPath {
    /// Creates a new empty path (the container itself).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a path string. Parsing never fails; malformed pieces simply
    /// produce labels that will not resolve.
    pub fn parse(input: &str) -> Self {
        let mut components = split_components(input);
        let mut attr = None;

        if let Some(last) = components.last_mut() {
            // A leading `?` is a lookup reference, not an attribute suffix
            let start = if last.starts_with(ATTR_MARKER) { ATTR_MARKER.len_utf8() } else { 0 };
            if let Some(pos) = last[start..].find(ATTR_MARKER).map(|pos| pos + start) {
                let name = last[pos + ATTR_MARKER.len_utf8()..].to_string();
                last.truncate(pos);
                attr = Some(if name.is_empty() {
                    AttrSelector::All
                } else {
                    AttrSelector::Named(name)
                });
            }
        }

        let segments = components
            .into_iter()
            .map(|component| {
                if component == PARENT_SEGMENT {
                    Segment::Parent
                } else {
                    Segment::Label(component)
                }
            })
            .collect();

        Self { segments, attr }
    }

    /// Adds a label to the end of this path. The label is taken literally:
    /// dots inside it are part of the label.
    pub fn push(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        if !label.is_empty() {
            self.segments.push(if label == PARENT_SEGMENT {
                Segment::Parent
            } else {
                Segment::Label(label)
            });
        }
        self
    }

    /// Selects an attribute of the final node.
    pub fn with_attr(mut self, attr: AttrSelector) -> Self {
        self.attr = Some(attr);
        self
    }

    /// Joins this path with another path; the attribute selector of `other` wins.
    pub fn join(mut self, other: &BagPath) -> Self {
        self.segments.extend(other.segments.iter().cloned());
        self.attr = other.attr.clone();
        self
    }

    /// Returns the segments of the path.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the attribute selector, if any.
    pub fn attr(&self) -> Option<&AttrSelector> {
        self.attr.as_ref()
    }

    /// Returns the number of segments in the path.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the final segment and everything before it.
    pub fn split_last(&self) -> Option<(&Segment, &[Segment])> {
        self.segments.split_last()
    }

    /// Returns the parent path, or `None` if this path has at most one segment.
    pub fn parent(&self) -> Option<BagPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(BagPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
            attr: None,
        })
    }

    /// Returns the last label of the path, or `None` if empty.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().and_then(Segment::as_label)
    }

    /// Builds a path from already-unescaped labels.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        labels.into_iter().fold(BagPath::new(), BagPath::push)
    }
}

impl FromStr for BagPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for BagPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for BagPath {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&String> for BagPath {
    fn from(s: &String) -> Self {
        Self::parse(s)
    }
}

impl From<&BagPath> for BagPath {
    fn from(path: &BagPath) -> Self {
        path.clone()
    }
}

impl fmt::Display for BagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            write!(f, "{segment}")?;
        }
        match &self.attr {
            Some(AttrSelector::All) => write!(f, "{ATTR_MARKER}"),
            Some(AttrSelector::Named(name)) => write!(f, "{ATTR_MARKER}{name}"),
            None => Ok(()),
        }
    }
}
