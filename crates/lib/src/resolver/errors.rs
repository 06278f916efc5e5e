//! Error types for resolver loading and (de)serialization.

use thiserror::Error;

use crate::bag::CallbackError;

/// Structured error types for resolver operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The resolver does not implement the load hook it was dispatched to
    #[error("Resolver '{resolver}' does not implement load")]
    LoadNotImplemented { resolver: String },

    /// The user loader failed
    #[error("Resolver '{resolver}' failed to load: {source}")]
    LoadFailed {
        resolver: String,
        #[source]
        source: CallbackError,
    },

    /// A private runtime for driving an async loader could not be built
    #[error("Failed to build runtime for async load: {0}")]
    Runtime(#[source] std::io::Error),

    /// An offloaded or helper-thread load panicked or was cancelled
    #[error("Resolver task failed: {0}")]
    Join(String),

    /// `deserialize` met a type identity the registry does not know
    #[error("Unknown resolver type '{type_name}'")]
    UnknownType { type_name: String },

    /// Resolver parameters could not be encoded or decoded
    #[error("Resolver serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ResolverError {
    /// Check if this error comes from the resolver contract (missing load hook)
    pub fn is_contract_error(&self) -> bool {
        matches!(self, ResolverError::LoadNotImplemented { .. })
    }

    /// Check if the user loader itself failed
    pub fn is_load_error(&self) -> bool {
        matches!(self, ResolverError::LoadFailed { .. })
    }

    /// Check if this error came from the runtime bridging sync and async loads
    pub fn is_runtime_error(&self) -> bool {
        matches!(self, ResolverError::Runtime(_) | ResolverError::Join(_))
    }

    /// Check if this error came from resolver serialization
    pub fn is_serialization_error(&self) -> bool {
        matches!(
            self,
            ResolverError::UnknownType { .. } | ResolverError::Serialization(_)
        )
    }

    /// Get the resolver type involved, if known
    pub fn resolver(&self) -> Option<&str> {
        match self {
            ResolverError::LoadNotImplemented { resolver }
            | ResolverError::LoadFailed { resolver, .. } => Some(resolver),
            ResolverError::UnknownType { type_name } => Some(type_name),
            _ => None,
        }
    }
}

// Conversion from ResolverError to the main Error type
impl From<ResolverError> for crate::Error {
    fn from(err: ResolverError) -> Self {
        crate::Error::Resolver(err)
    }
}
