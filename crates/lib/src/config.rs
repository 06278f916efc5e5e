//! Tree-wide settings.

use serde::{Deserialize, Serialize};

/// Settings a [`Bag`](crate::Bag) is created with.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use bagtree::BagConfig;
///
/// let config = BagConfig::from_json_str(r#"{ "backref": true }"#).unwrap();
/// assert!(config.backref);
/// assert!(config.strip_null_attrs);
/// assert_eq!(config.default_cache_time, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BagConfig {
    /// Start the root container in back-reference mode
    pub backref: bool,
    /// Remove attributes assigned a null value
    pub strip_null_attrs: bool,
    /// Cache time, in seconds, for resolvers built with [`Bag::resolver`](crate::Bag::resolver)
    pub default_cache_time: i64,
}

impl Default for BagConfig {
    fn default() -> Self {
        Self {
            backref: false,
            strip_null_attrs: true,
            default_cache_time: 0,
        }
    }
}

impl BagConfig {
    /// Parses a JSON settings document
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the settings as JSON
    pub fn to_json_string(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn with_backref(mut self, backref: bool) -> Self {
        self.backref = backref;
        self
    }

    pub fn with_strip_null_attrs(mut self, strip: bool) -> Self {
        self.strip_null_attrs = strip;
        self
    }

    pub fn with_default_cache_time(mut self, seconds: i64) -> Self {
        self.default_cache_time = seconds;
        self
    }
}
