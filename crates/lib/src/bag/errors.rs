//! Error types for container operations.
//!
//! Missing data is never an error here: read paths return `Option` and fall
//! back to defaults. These variants cover structural misuse (addressing that
//! cannot be honoured) and failures raised by subscriber callbacks.

use thiserror::Error;

/// Error type user callbacks may return; it is carried up to the caller of the
/// mutating operation unchanged.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured error types for container operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BagError {
    /// Autocreation hit a positional or lookup reference (`#3`, `?id=7`) that
    /// does not exist; such nodes cannot be fabricated.
    #[error("Cannot create '{segment}' while resolving '{path}': positional references cannot be fabricated")]
    IndexNotCreatable { path: String, segment: String },

    /// The path cannot be used for the requested operation
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A container handle whose slot has been freed or reused
    #[error("Stale container handle {id}")]
    StaleHandle { id: String },

    /// A subscriber callback returned an error
    #[error("Subscriber '{id}' failed: {source}")]
    Subscriber {
        id: String,
        #[source]
        source: CallbackError,
    },
}

impl BagError {
    /// Check if this error is a structural addressing error
    pub fn is_structural_error(&self) -> bool {
        matches!(self, BagError::IndexNotCreatable { .. })
    }

    /// Check if this error is related to an unusable path
    pub fn is_path_error(&self) -> bool {
        matches!(
            self,
            BagError::InvalidPath { .. } | BagError::IndexNotCreatable { .. }
        )
    }

    /// Check if this error came from a user callback
    pub fn is_callback_error(&self) -> bool {
        matches!(self, BagError::Subscriber { .. })
    }

    /// Get the path if this is a path-related error
    pub fn path(&self) -> Option<&str> {
        match self {
            BagError::IndexNotCreatable { path, .. } | BagError::InvalidPath { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

// Conversion from BagError to the main Error type
impl From<BagError> for crate::Error {
    fn from(err: BagError) -> Self {
        crate::Error::Bag(err)
    }
}
