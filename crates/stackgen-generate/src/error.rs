//! Generation errors
//!
//! Unlike configuration errors, these are scoped to one app: the driver
//! records the failure and carries on with the remaining apps.

use stackgen_config::ConfigError;
use thiserror::Error;

/// Errors raised while planning or generating an app
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The app asks for something the target environment cannot provide
    #[error("{app}: {field}: {message}")]
    UnsupportedCombination {
        /// App name
        app: String,
        /// Field path inside the app entry
        field: String,
        /// What cannot be combined
        message: String,
    },

    /// No generator is registered for an app-type section
    #[error("unknown app type '{discriminant}'")]
    UnknownAppType {
        /// Section key
        discriminant: String,
    },

    /// A discriminant was registered twice
    #[error("app type '{discriminant}' is already registered")]
    DuplicateAppType {
        /// Section key
        discriminant: String,
    },

    /// A requested app does not exist in the configuration
    #[error("unknown app '{name}'")]
    UnknownApp {
        /// Requested name
        name: String,
    },

    /// Environment profile resolution failed
    #[error(transparent)]
    Profile(#[from] ConfigError),

    /// Generated manifests could not be rendered
    #[error("{app}: failed to serialize manifests: {message}")]
    Serialization {
        /// App name
        app: String,
        /// Serializer message
        message: String,
    },
}

impl GenerateError {
    /// Create an unsupported-combination error
    pub fn unsupported(
        app: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::UnsupportedCombination {
            app: app.into(),
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error for an app
    pub fn serialization(app: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            app: app.into(),
            message: msg.into(),
        }
    }
}
