//! apps.yaml configuration for stackgen
//!
//! This crate owns everything that happens before generation: the typed
//! configuration model, `${VAR}` substitution, compose file parsing, the
//! shared gateway section, the per-environment profiles and the loader that
//! validates all of it up front.
//! A [`Config`] returned by [`ConfigLoader`] is immutable and fully validated.

#![deny(missing_docs)]

pub mod compose;
pub mod env_value;
pub mod error;
pub mod gateway;
pub mod loader;
pub mod model;
pub mod profile;

pub use compose::ComposeProject;
pub use env_value::{EnvValue, SecretRef};
pub use error::ConfigError;
pub use gateway::{GatewayConfig, GatewayRoute};
pub use loader::{Config, ConfigLoader, Defaults};
pub use model::{AppSpec, FunctionSpec, IngressBackend, ScalingConfig, ScalingPolicy, Visibility};
pub use profile::{EnvironmentProfile, Profiles};

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment used when none is given
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Namespace apps land in when neither the app nor `defaults` names one
pub const DEFAULT_NAMESPACE: &str = "apps";
