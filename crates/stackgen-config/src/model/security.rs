//! Visibility, network policy rules, service accounts and security contexts.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::Result;

/// Who may reach the app
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Exposed publicly; any namespace may connect
    Public,
    /// Any namespace in the cluster
    Internal,
    /// Only pods in the same namespace
    #[default]
    Private,
    /// Only explicitly allowed peers
    Restricted,
}

impl Visibility {
    /// Name as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Private => "private",
            Self::Restricted => "restricted",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security section of an app
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// Visibility level
    pub visibility: Visibility,
    /// NetworkPolicy settings
    pub network_policy: NetworkPolicyConfig,
    /// ServiceAccount the pods run as
    pub service_account: Option<String>,
    /// Generate the ServiceAccount
    pub create_service_account: bool,
    /// Annotations on the generated ServiceAccount
    pub service_account_annotations: BTreeMap<String, String>,
    /// Cloud identity bound to the ServiceAccount
    pub workload_identity: Option<String>,
    /// Pod-level security context
    pub pod_security_context: Option<PodSecurityConfig>,
    /// Container-level security context
    pub container_security_context: Option<ContainerSecurityConfig>,
}

impl SecurityConfig {
    /// ServiceAccount name referenced by the pod, if any
    pub fn service_account_name(&self, app_name: &str) -> Option<String> {
        match (&self.service_account, self.create_service_account) {
            (Some(name), _) => Some(name.clone()),
            (None, true) => Some(app_name.to_string()),
            (None, false) => None,
        }
    }

    /// Validate network rules
    pub fn validate(&self) -> Result<()> {
        validate_rules("network_policy.allow_from", &self.network_policy.allow_from)?;
        validate_rules("network_policy.allow_to", &self.network_policy.allow_to)?;
        if let Some(name) = &self.service_account {
            if name.trim().is_empty() {
                return Err(ConfigError::validation("service_account", "must not be empty"));
            }
        }
        Ok(())
    }
}

/// NetworkPolicy settings
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkPolicyConfig {
    /// Generate a NetworkPolicy
    pub enabled: bool,
    /// Extra inbound peers
    pub allow_from: Vec<NetworkRule>,
    /// Outbound peers; egress is unrestricted when empty
    pub allow_to: Vec<NetworkRule>,
}

impl Default for NetworkPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_from: Vec::new(),
            allow_to: Vec::new(),
        }
    }
}

/// One network peer; at least one selector is set
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkRule {
    /// Namespace name
    pub namespace: Option<String>,
    /// Pod labels
    pub pod_labels: BTreeMap<String, String>,
    /// CIDR block
    pub cidr: Option<String>,
    /// Ports (all when empty)
    pub ports: Vec<u16>,
}

impl NetworkRule {
    /// Whether the rule selects anything
    pub fn is_empty(&self) -> bool {
        self.namespace.is_none() && self.pod_labels.is_empty() && self.cidr.is_none()
    }
}

fn validate_rules(field: &str, rules: &[NetworkRule]) -> Result<()> {
    for (i, rule) in rules.iter().enumerate() {
        let path = format!("{}[{}]", field, i);
        if rule.is_empty() {
            return Err(ConfigError::validation(
                path,
                "set at least one of namespace, pod_labels or cidr",
            ));
        }
        if let Some(cidr) = &rule.cidr {
            if !cidr.contains('/') {
                return Err(ConfigError::validation(
                    format!("{}.cidr", path),
                    format!("'{}' is not a CIDR block", cidr),
                ));
            }
        }
        if rule.ports.contains(&0) {
            return Err(ConfigError::validation(format!("{}.ports", path), "port cannot be 0"));
        }
    }
    Ok(())
}

/// Pod security context
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PodSecurityConfig {
    /// Refuse to start as root
    pub run_as_non_root: bool,
    /// UID
    pub run_as_user: Option<i64>,
    /// GID
    pub run_as_group: Option<i64>,
    /// Group owning mounted volumes
    pub fs_group: Option<i64>,
}

impl Default for PodSecurityConfig {
    fn default() -> Self {
        Self {
            run_as_non_root: true,
            run_as_user: None,
            run_as_group: None,
            fs_group: None,
        }
    }
}

/// Container security context
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerSecurityConfig {
    /// Allow setuid escalation
    pub allow_privilege_escalation: bool,
    /// Mount the root filesystem read-only
    pub read_only_root_filesystem: bool,
    /// Capabilities to drop
    pub capabilities_drop: Vec<String>,
    /// Capabilities to add
    pub capabilities_add: Vec<String>,
    /// Container user id
    pub run_as_user: Option<i64>,
    /// Container group id
    pub run_as_group: Option<i64>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_defaults() {
        let security = SecurityConfig::default();
        assert_eq!(security.visibility, Visibility::Private);
        assert!(security.network_policy.enabled);
        assert!(!security.create_service_account);
        assert_eq!(security.service_account_name("api"), None);
    }

    #[rstest]
    #[case("public", Visibility::Public)]
    #[case("internal", Visibility::Internal)]
    #[case("private", Visibility::Private)]
    #[case("restricted", Visibility::Restricted)]
    fn test_visibility_parses(#[case] raw: &str, #[case] expected: Visibility) {
        let security: SecurityConfig =
            serde_yaml::from_str(&format!("visibility: {raw}\n")).expect("valid yaml");
        assert_eq!(security.visibility, expected);
        assert_eq!(expected.as_str(), raw);
    }

    #[test]
    fn test_empty_rule_rejected() {
        let security: SecurityConfig =
            serde_yaml::from_str("network_policy:\n  allow_to:\n    - ports: [443]\n").expect("valid yaml");
        let err = security.validate().expect_err("rule selects nothing");
        assert_eq!(
            err.to_string(),
            "network_policy.allow_to[0]: set at least one of namespace, pod_labels or cidr"
        );
    }

    #[test]
    fn test_service_account_name_resolution() {
        let mut security = SecurityConfig {
            create_service_account: true,
            ..Default::default()
        };
        assert_eq!(security.service_account_name("api").as_deref(), Some("api"));
        security.service_account = Some("runner".to_string());
        assert_eq!(security.service_account_name("api").as_deref(), Some("runner"));
    }

    #[test]
    fn test_pod_security_defaults_to_non_root() {
        let security: SecurityConfig =
            serde_yaml::from_str("pod_security_context:\n  fs_group: 2000\n").expect("valid yaml");
        let pod = security.pod_security_context.expect("present");
        assert!(pod.run_as_non_root);
        assert_eq!(pod.fs_group, Some(2000));
    }
}
