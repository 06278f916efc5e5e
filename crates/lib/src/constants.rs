//! Constants used throughout the bagtree library.
//!
//! Central definitions for the path and position grammar tokens.

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Escape character; `\.` is a literal dot inside a label.
pub const ESCAPE: char = '\\';

/// Path segment that ascends to the container holding the current container.
pub const PARENT_SEGMENT: &str = "#^";

/// Prefix of absolute position references (`#3`).
pub const INDEX_PREFIX: char = '#';

/// Marker for attribute selection (`node?color`) and attribute lookups (`?color=red`).
pub const ATTR_MARKER: char = '?';

/// Separator between the attribute name and value of a lookup reference.
pub const LOOKUP_SEPARATOR: char = '=';

/// Position spec meaning "append at the end".
pub const POSITION_END: &str = ">";

/// Position spec meaning "insert at the front".
pub const POSITION_START: &str = "<";

/// Separator of compound reference lists (`a,b,c`).
pub const LIST_SEPARATOR: char = ',';

/// `get_item_with` mode returning the child labels.
pub const MODE_KEYS: &str = "k:";

/// `get_item_with` mode prefix delegating to `digest`.
pub const MODE_DIGEST: &str = "d:";

/// `get_item_with` mode returning the attribute map.
pub const MODE_ATTRS: &str = "?";
