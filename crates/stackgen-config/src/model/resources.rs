//! Compute resource requests and limits.

use serde::Deserialize;
use stackgen_common::quantity::{compare_quantities, parse_quantity};

use crate::error::ConfigError;
use crate::Result;

/// Requests and limits for the app's container
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceConfig {
    /// Memory request
    pub memory: String,
    /// CPU request
    pub cpu: String,
    /// Memory limit (defaults to the request)
    pub memory_limit: Option<String>,
    /// CPU limit (defaults to the request)
    pub cpu_limit: Option<String>,
    /// Ephemeral storage request and limit
    pub ephemeral_storage: Option<String>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory: "256Mi".to_string(),
            cpu: "100m".to_string(),
            memory_limit: None,
            cpu_limit: None,
            ephemeral_storage: None,
        }
    }
}

impl ResourceConfig {
    /// Memory limit to emit
    pub fn effective_memory_limit(&self) -> &str {
        self.memory_limit.as_deref().unwrap_or(&self.memory)
    }

    /// CPU limit to emit
    pub fn effective_cpu_limit(&self) -> &str {
        self.cpu_limit.as_deref().unwrap_or(&self.cpu)
    }

    /// Check every quantity parses and no limit is below its request
    pub fn validate(&self) -> Result<()> {
        check_quantity("memory", &self.memory)?;
        check_quantity("cpu", &self.cpu)?;

        if let Some(limit) = &self.memory_limit {
            check_limit("memory_limit", &self.memory, limit)?;
        }
        if let Some(limit) = &self.cpu_limit {
            check_limit("cpu_limit", &self.cpu, limit)?;
        }
        if let Some(storage) = &self.ephemeral_storage {
            check_quantity("ephemeral_storage", storage)?;
        }
        Ok(())
    }
}

fn check_quantity(field: &str, value: &str) -> Result<()> {
    parse_quantity(value)
        .map(|_| ())
        .map_err(|e| ConfigError::validation(field, e.to_string()))
}

fn check_limit(field: &str, request: &str, limit: &str) -> Result<()> {
    check_quantity(field, limit)?;
    let ordering = compare_quantities(limit, request)
        .map_err(|e| ConfigError::validation(field, e.to_string()))?;
    if ordering.is_lt() {
        return Err(ConfigError::validation(
            field,
            format!("limit {} is below request {}", limit, request),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_defaults() {
        let resources = ResourceConfig::default();
        assert_eq!(resources.memory, "256Mi");
        assert_eq!(resources.cpu, "100m");
        assert_eq!(resources.effective_memory_limit(), "256Mi");
        assert_eq!(resources.effective_cpu_limit(), "100m");
        resources.validate().expect("defaults are valid");
    }

    #[rstest]
    #[case("512Mi", "1Gi", true)]
    #[case("1Gi", "1024Mi", true)]
    #[case("1Gi", "512Mi", false)]
    #[case("256Mi", "268435456", true)]
    fn test_memory_limit_vs_request(#[case] request: &str, #[case] limit: &str, #[case] ok: bool) {
        let resources = ResourceConfig {
            memory: request.to_string(),
            memory_limit: Some(limit.to_string()),
            ..Default::default()
        };
        assert_eq!(resources.validate().is_ok(), ok);
    }

    #[test]
    fn test_cpu_limit_below_request_reports_field() {
        let resources = ResourceConfig {
            cpu: "1".to_string(),
            cpu_limit: Some("500m".to_string()),
            ..Default::default()
        };
        let err = resources.validate().expect_err("limit below request");
        assert_eq!(err.to_string(), "cpu_limit: limit 500m is below request 1");
    }

    #[test]
    fn test_unparseable_quantity_rejected() {
        let resources = ResourceConfig {
            memory: "lots".to_string(),
            ..Default::default()
        };
        match resources.validate() {
            Err(ConfigError::Validation { path, .. }) => assert_eq!(path, "memory"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
