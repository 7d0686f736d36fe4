//! Configuration errors
//!
//! Every load failure is fatal for the whole run: nothing is generated from a
//! configuration that does not validate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration or compose file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A document is not well-formed YAML or has the wrong shape
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File or section being parsed
        path: String,
        /// Parser message
        message: String,
    },

    /// A field violates an invariant
    #[error("{path}: {message}")]
    Validation {
        /// Field path, e.g. `apps[2].scaling.queue_name`
        path: String,
        /// Description of what is invalid
        message: String,
    },

    /// A top-level section names an app type nobody registered
    #[error("unknown app type '{section}' (known types: {known})")]
    UnknownAppType {
        /// The section key
        section: String,
        /// Comma-separated registered discriminants
        known: String,
    },

    /// An environment identifier without a profile
    #[error("unknown environment '{name}'")]
    UnknownEnvironment {
        /// The requested environment
        name: String,
    },
}

impl ConfigError {
    /// Create a validation error for a field path
    pub fn validation(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error
    pub fn parse(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create an IO error for a file
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an unknown environment error
    pub fn unknown_environment(name: impl Into<String>) -> Self {
        Self::UnknownEnvironment { name: name.into() }
    }

    /// Prefix the path of a validation or parse error with a parent path
    ///
    /// Lets nested validators report paths relative to themselves while the
    /// caller supplies the `apps[2]` part.
    pub fn within(self, parent: &str) -> Self {
        match self {
            Self::Validation { path, message } => Self::Validation {
                path: join_path(parent, &path),
                message,
            },
            Self::Parse { path, message } => Self::Parse {
                path: join_path(parent, &path),
                message,
            },
            other => other,
        }
    }
}

fn join_path(parent: &str, child: &str) -> String {
    if child.is_empty() {
        parent.to_string()
    } else if parent.is_empty() || child.starts_with('[') {
        format!("{}{}", parent, child)
    } else {
        format!("{}.{}", parent, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_prints_path_first() {
        let err = ConfigError::validation(
            "apps[2].scaling.queue_name",
            "required when kind=queue-depth-autoscale",
        );
        assert_eq!(
            err.to_string(),
            "apps[2].scaling.queue_name: required when kind=queue-depth-autoscale"
        );
    }

    #[test]
    fn within_prefixes_nested_paths() {
        let err = ConfigError::validation("scaling.max", "must be at least min").within("apps[0]");
        assert_eq!(err.to_string(), "apps[0].scaling.max: must be at least min");

        let err = ConfigError::validation("[1].name", "duplicate").within("functions[0].functions");
        assert_eq!(err.to_string(), "functions[0].functions[1].name: duplicate");
    }

    #[test]
    fn within_leaves_other_errors_alone() {
        let err = ConfigError::unknown_environment("prod").within("apps[0]");
        assert_eq!(err.to_string(), "unknown environment 'prod'");
    }
}
