//! Error types shared by the stackgen crates
//!
//! These cover failures in the resource layer itself. Configuration and
//! generation errors live in their own crates and wrap this type where needed.

use thiserror::Error;

/// Errors raised while building or serializing Kubernetes resources
#[derive(Debug, Error)]
pub enum Error {
    /// A resource quantity string could not be parsed
    #[error("invalid quantity '{value}': {message}")]
    InvalidQuantity {
        /// The offending quantity string
        value: String,
        /// What is wrong with it
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },
}

impl Error {
    /// Create a quantity parse error
    pub fn invalid_quantity(value: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            value: value.into(),
            message: msg.into(),
        }
    }

    /// Serialization failure without a known kind
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error for a specific resource kind
    pub fn serialization_for(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
