//! Ordered label index for the nodes of one container.
//!
//! [`OrderedIndex`] keeps entries in insertion order and resolves the
//! reference and position grammar used by paths, insertion and moves:
//!
//! | reference   | resolves to                                        |
//! |-------------|----------------------------------------------------|
//! | `label`     | first entry with that label                        |
//! | `#n`        | the entry at position `n` (only if `n < len`)      |
//! | `?attr=val` | first entry whose attribute `attr` displays as `val` |
//! | `?=val`     | first entry whose value displays as `val`          |
//!
//! Position specs are parsed by [`OrderedIndex::parse_position`].

use std::collections::HashMap;

use super::{
    path::{parse_index_reference, parse_lookup_reference},
    value::Scalar,
};
use crate::constants::{LIST_SEPARATOR, POSITION_END, POSITION_START};

/// Entries stored in an [`OrderedIndex`].
pub trait Indexed {
    /// Label of the entry
    fn label(&self) -> &str;

    /// Attribute used by `?attr=value` lookups
    fn attr(&self, name: &str) -> Option<&Scalar>;

    /// Whether the raw value matches the right-hand side of a `?=value` lookup
    fn value_matches(&self, rhs: &str) -> bool;
}

/// Where to insert, or where to move entries to.
///
/// Strings follow the position grammar: `>` (end), `<` (start), `#n`,
/// `<ref`, `>ref`, `<#n`, `>#n`, or a bare reference meaning "before it".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Position {
    /// Append (also what `None` means)
    #[default]
    End,
    /// Prepend
    Start,
    /// Absolute index, clamped on insertion
    Index(i64),
    /// A position spec string
    Spec(String),
}

impl Position {
    /// Parses a spec string, normalising `>`/`<`/empty.
    pub fn parse(spec: &str) -> Self {
        match spec {
            "" | POSITION_END => Position::End,
            POSITION_START => Position::Start,
            other => Position::Spec(other.to_string()),
        }
    }
}

impl From<&str> for Position {
    fn from(spec: &str) -> Self {
        Position::parse(spec)
    }
}

impl From<String> for Position {
    fn from(spec: String) -> Self {
        Position::parse(&spec)
    }
}

impl From<&String> for Position {
    fn from(spec: &String) -> Self {
        Position::parse(spec)
    }
}

impl From<i64> for Position {
    fn from(index: i64) -> Self {
        Position::Index(index)
    }
}

impl From<i32> for Position {
    fn from(index: i32) -> Self {
        Position::Index(index as i64)
    }
}

impl From<usize> for Position {
    fn from(index: usize) -> Self {
        Position::Index(i64::try_from(index).unwrap_or(i64::MAX))
    }
}

impl<T: Into<Position>> From<Option<T>> for Position {
    fn from(position: Option<T>) -> Self {
        position.map(Into::into).unwrap_or_default()
    }
}

/// Which entries [`OrderedIndex::select`] keeps.
pub enum Selector<'a, T> {
    /// Every entry
    All,
    /// Entries named by references (labels, `#n`, `?attr=value`); each string
    /// may itself be a comma-joined list
    Refs(Vec<String>),
    /// Entries accepted by the predicate
    Predicate(Box<dyn Fn(&T) -> bool + 'a>),
}

impl<'a, T> Selector<'a, T> {
    /// Selects the given references
    pub fn refs<I, S>(refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selector::Refs(refs.into_iter().map(Into::into).collect())
    }

    /// Selects entries accepted by `predicate`
    pub fn predicate(predicate: impl Fn(&T) -> bool + 'a) -> Self {
        Selector::Predicate(Box::new(predicate))
    }
}

impl<T> Default for Selector<'_, T> {
    fn default() -> Self {
        Selector::All
    }
}

impl<T> std::fmt::Debug for Selector<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::All => write!(f, "All"),
            Selector::Refs(refs) => f.debug_tuple("Refs").field(refs).finish(),
            Selector::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Splits references that may be comma-joined into single references.
pub fn split_refs<S: AsRef<str>>(refs: &[S]) -> Vec<&str> {
    refs.iter()
        .flat_map(|r| r.as_ref().split(LIST_SEPARATOR))
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect()
}

/// Insertion-ordered entries with label lookup.
#[derive(Debug, Clone)]
pub struct OrderedIndex<T> {
    entries: Vec<T>,
    // label -> first position holding it
    positions: HashMap<String, usize>,
}

impl<T> Default for OrderedIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<T: Indexed> OrderedIndex<T> {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    /// Iterates entries mutably, in order. Labels must not be changed.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.entries.iter_mut()
    }

    /// Labels in order
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.label().to_string()).collect()
    }

    /// Entries as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    /// Resolves a reference to a position.
    ///
    /// Tries an exact label first, then `#n`, then `?attr=value`. Missing
    /// references give `None`, never an error.
    pub fn index(&self, reference: &str) -> Option<usize> {
        if let Some(&pos) = self.positions.get(reference) {
            return Some(pos);
        }
        if let Some(n) = parse_index_reference(reference) {
            return (n < self.entries.len()).then_some(n);
        }
        let (attr, rhs) = parse_lookup_reference(reference)?;
        self.entries.iter().position(|entry| {
            if attr.is_empty() {
                entry.value_matches(rhs)
            } else {
                entry.attr(attr).is_some_and(|s| s.matches_text(rhs))
            }
        })
    }

    /// Computes the insertion index for `position`.
    ///
    /// - `End`/`>` append, `Start`/`<` prepend
    /// - integers and `#n` are clamped to `0..=len`
    /// - `<ref`/`>ref` insert before/after the referenced entry, appending if
    ///   the reference does not resolve; a bare reference inserts before it
    /// - `<#n`/`>#n` insert before/after literal index `n`, clamped
    pub fn parse_position(&self, position: &Position) -> usize {
        let len = self.entries.len();
        let clamp = |n: i64| usize::try_from(n.max(0)).unwrap_or(usize::MAX).min(len);

        let spec = match position {
            Position::End => return len,
            Position::Start => return 0,
            Position::Index(n) => return clamp(*n),
            Position::Spec(spec) => match spec.as_str() {
                "" | POSITION_END => return len,
                POSITION_START => return 0,
                spec => spec,
            },
        };

        if let Some(n) = parse_index_reference(spec) {
            return n.min(len);
        }

        let (anchor, after) = match split_anchor(spec) {
            Some(parts) => parts,
            // Bare reference: before it
            None => return self.index(spec).unwrap_or(len),
        };

        if let Some(n) = parse_index_reference(anchor) {
            let n = if after { n.saturating_add(1) } else { n };
            return n.min(len);
        }

        match self.index(anchor) {
            Some(i) if after => i + 1,
            Some(i) => i,
            None => len,
        }
    }

    /// Strict variant of [`parse_position`](Self::parse_position) used by moves.
    ///
    /// Returns the anchor an entry set should land against, or `None` when the
    /// destination is negative, out of range or unresolved.
    pub fn destination(&self, position: &Position) -> Option<Destination> {
        let len = self.entries.len();
        let absolute = |n: i64| usize::try_from(n).ok().filter(|n| *n < len);

        let spec = match position {
            Position::End => return Some(Destination::End),
            Position::Start => return Some(Destination::Start),
            Position::Index(n) => return absolute(*n).map(Destination::At),
            Position::Spec(spec) => match spec.as_str() {
                "" | POSITION_END => return Some(Destination::End),
                POSITION_START => return Some(Destination::Start),
                spec => spec,
            },
        };

        if let Some(n) = parse_index_reference(spec) {
            return (n < len).then_some(Destination::At(n));
        }

        let (anchor, after) = split_anchor(spec).unwrap_or((spec, false));
        let target = match parse_index_reference(anchor) {
            Some(n) => (n < len).then_some(n)?,
            None => self.index(anchor)?,
        };
        Some(if after {
            Destination::After(target)
        } else {
            Destination::Before(target)
        })
    }

    /// Position of the first entry labelled exactly `label`, ignoring the
    /// reference grammar
    pub fn position_of(&self, label: &str) -> Option<usize> {
        self.positions.get(label).copied()
    }

    /// Returns the entry named by `reference`
    pub fn get(&self, reference: &str) -> Option<&T> {
        self.index(reference).map(|i| &self.entries[i])
    }

    /// Returns the entry at `index`
    pub fn get_at(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    /// Returns the entry named by `reference`, mutably
    pub fn get_mut(&mut self, reference: &str) -> Option<&mut T> {
        let i = self.index(reference)?;
        self.entries.get_mut(i)
    }

    /// Returns the entry at `index`, mutably
    pub fn get_at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    /// Inserts `entry` at `position`, even if its label already exists.
    /// Returns the index it landed at.
    pub fn insert(&mut self, entry: T, position: &Position) -> usize {
        let at = self.parse_position(position);
        if at == self.entries.len() {
            return self.push(entry);
        }
        for i in self.positions.values_mut() {
            if *i >= at {
                *i += 1;
            }
        }
        match self.positions.get_mut(entry.label()) {
            // Earlier duplicate stays first
            Some(first) if *first < at => {}
            Some(first) => *first = at,
            None => {
                self.positions.insert(entry.label().to_string(), at);
            }
        }
        self.entries.insert(at, entry);
        at
    }

    /// Appends `entry`
    pub fn push(&mut self, entry: T) -> usize {
        let at = self.entries.len();
        self.positions.entry(entry.label().to_string()).or_insert(at);
        self.entries.push(entry);
        at
    }

    /// Replaces the entry with the same label in place, or inserts it at
    /// `position`. Returns the index and the replaced entry.
    pub fn upsert(&mut self, entry: T, position: &Position) -> (usize, Option<T>) {
        match self.positions.get(entry.label()).copied() {
            Some(i) => {
                let old = std::mem::replace(&mut self.entries[i], entry);
                (i, Some(old))
            }
            None => (self.insert(entry, position), None),
        }
    }

    /// Removes the entry named by `reference`
    pub fn remove(&mut self, reference: &str) -> Option<(usize, T)> {
        let i = self.index(reference)?;
        self.remove_at(i).map(|entry| (i, entry))
    }

    /// Removes the entry at `index`
    pub fn remove_at(&mut self, index: usize) -> Option<T> {
        if index >= self.entries.len() {
            return None;
        }
        let entry = self.entries.remove(index);
        let label = entry.label();
        if self.positions.get(label) == Some(&index) {
            match self.entries[index..].iter().position(|e| e.label() == label) {
                Some(offset) => {
                    self.positions.insert(label.to_string(), index + offset + 1);
                }
                None => {
                    self.positions.remove(label);
                }
            }
        }
        for i in self.positions.values_mut() {
            if *i > index {
                *i -= 1;
            }
        }
        Some(entry)
    }

    /// Removes every entry, returning them in order
    pub fn clear(&mut self) -> Vec<T> {
        self.positions.clear();
        std::mem::take(&mut self.entries)
    }

    /// Moves the referenced entries to `position`, keeping their relative
    /// order. References may be comma-joined.
    ///
    /// Returns the new indexes of the moved entries; empty when nothing moved
    /// (no reference resolved, or the destination is invalid).
    pub fn move_entries<S: AsRef<str>>(&mut self, refs: &[S], position: &Position) -> Vec<usize> {
        let mut moving: Vec<usize> = split_refs(refs)
            .into_iter()
            .filter_map(|r| self.index(r))
            .collect();
        moving.sort_unstable();
        moving.dedup();
        if moving.is_empty() {
            return Vec::new();
        }

        let Some(destination) = self.destination(position) else {
            return Vec::new();
        };
        if matches!(destination, Destination::Before(a) | Destination::After(a) if moving.binary_search(&a).is_ok())
        {
            return Vec::new();
        }

        let mut taken = Vec::with_capacity(moving.len());
        for &i in moving.iter().rev() {
            taken.push(self.entries.remove(i));
        }
        taken.reverse();

        // Translate the destination into the shortened list
        let shift = |i: usize| i - moving.iter().filter(|&&m| m < i).count();
        let remaining = self.entries.len();
        let at = match destination {
            Destination::End => remaining,
            Destination::Start => 0,
            Destination::At(n) => n.min(remaining),
            Destination::Before(anchor) => shift(anchor),
            Destination::After(anchor) => shift(anchor) + 1,
        };

        let count = taken.len();
        self.entries.splice(at..at, taken);
        self.reindex();
        (at..at + count).collect()
    }

    /// Returns the indexes accepted by `selector`, in order.
    pub fn select(&self, selector: &Selector<'_, T>) -> Vec<usize> {
        match selector {
            Selector::All => (0..self.entries.len()).collect(),
            Selector::Refs(refs) => {
                let mut picked: Vec<usize> = split_refs(refs)
                    .into_iter()
                    .filter_map(|r| self.index(r))
                    .collect();
                picked.sort_unstable();
                picked.dedup();
                picked
            }
            Selector::Predicate(keep) => self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| keep(entry))
                .map(|(i, _)| i)
                .collect(),
        }
    }

    /// Order-preserving filtered copy
    pub fn filtered(&self, selector: &Selector<'_, T>) -> Self
    where
        T: Clone,
    {
        let mut copy = Self::new();
        copy.entries = self
            .select(selector)
            .into_iter()
            .map(|i| self.entries[i].clone())
            .collect();
        copy.reindex();
        copy
    }

    fn reindex(&mut self) {
        self.positions.clear();
        for (i, entry) in self.entries.iter().enumerate() {
            self.positions.entry(entry.label().to_string()).or_insert(i);
        }
    }
}

impl<'a, T> IntoIterator for &'a OrderedIndex<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A resolved move destination, relative to the list before the move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    End,
    Start,
    /// Final index of the first moved entry
    At(usize),
    Before(usize),
    After(usize),
}

fn split_anchor(spec: &str) -> Option<(&str, bool)> {
    if let Some(rest) = spec.strip_prefix(POSITION_START) {
        Some((rest, false))
    } else {
        spec.strip_prefix(POSITION_END).map(|rest| (rest, true))
    }
}
