//! Core pod-level types shared by every workload kind

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Selectors and references
// =============================================================================

/// Label selector
///
/// An empty selector serializes as `{}`, which Kubernetes reads as "match everything".
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Match labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selector matching every object
    pub fn any() -> Self {
        Self::default()
    }

    /// Selector matching the given labels
    pub fn matching(labels: BTreeMap<String, String>) -> Self {
        Self {
            match_labels: labels,
        }
    }

    /// Selector matching a single label
    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut match_labels = BTreeMap::new();
        match_labels.insert(key.into(), value.into());
        Self { match_labels }
    }
}

/// Named reference to an object in the same namespace
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    /// Object name
    pub name: String,
}

/// Integer or string value, e.g. `minAvailable: 1` or `maxUnavailable: "25%"`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum IntOrString {
    /// Integer form
    Int(i32),
    /// String form (usually a percentage)
    String(String),
}

// =============================================================================
// Container
// =============================================================================

/// Container spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    pub image: String,
    /// One of Always, IfNotPresent or Never
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Args
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Bulk env sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvFromSource>,
    /// Resource requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Startup probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_probe: Option<Probe>,
    /// Readiness probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
    /// Liveness probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
    /// Volume mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    /// Security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
}

/// A container env entry holding a literal or a secret key reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Literal value; unset when `value_from` is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Secret key source; unset when `value` is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    /// Literal env entry
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
        }
    }

    /// Env entry read from `secret`/`key`
    pub fn from_secret(
        name: impl Into<String>,
        secret_name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret_name.into(),
                    key: key.into(),
                }),
            }),
        }
    }
}

/// Where an env value comes from
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    /// Secret key backing the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeySelector>,
}

/// Secret name and key
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Data key
    pub key: String,
}

/// Bulk env import from a ConfigMap or Secret
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvFromSource {
    /// Prefix prepended to every imported key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// ConfigMap reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<EnvSourceRef>,
    /// Secret reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<EnvSourceRef>,
}

impl EnvFromSource {
    /// Import every key of a Secret
    pub fn secret(name: impl Into<String>) -> Self {
        Self {
            secret_ref: Some(EnvSourceRef::named(name)),
            ..Default::default()
        }
    }

    /// Import every key of a ConfigMap
    pub fn config_map(name: impl Into<String>) -> Self {
        Self {
            config_map_ref: Some(EnvSourceRef::named(name)),
            ..Default::default()
        }
    }
}

/// Named ConfigMap/Secret reference for env imports
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnvSourceRef {
    /// Object name
    pub name: String,
    /// Whether the object may be missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

impl EnvSourceRef {
    /// Required reference to the named object
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: None,
        }
    }
}

/// Container port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Port number
    pub container_port: u16,
    /// Protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

// =============================================================================
// Resource requirements
// =============================================================================

/// Resource requirements
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceQuantity>,
    /// Limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceQuantity>,
}

/// Resource quantity
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceQuantity {
    /// CPU quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    /// Ephemeral storage quantity
    #[serde(
        default,
        rename = "ephemeral-storage",
        skip_serializing_if = "Option::is_none"
    )]
    pub ephemeral_storage: Option<String>,
}

impl ResourceQuantity {
    /// True when no dimension is set
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none() && self.ephemeral_storage.is_none()
    }
}

// =============================================================================
// Probes
// =============================================================================

/// Health probe, serialized as the Kubernetes probe object
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    /// HTTP GET probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_get: Option<HttpGetAction>,
    /// TCP socket probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_socket: Option<TcpSocketAction>,
    /// Exec probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecAction>,
    /// Delay before the first check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_seconds: Option<u32>,
    /// Interval between checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_seconds: Option<u32>,
    /// Per-check timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    /// Passes needed to count as healthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,
    /// Failures tolerated before acting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
}

impl Probe {
    /// HTTP GET probe against `path` on `port`
    pub fn http(path: impl Into<String>, port: u16) -> Self {
        Self {
            http_get: Some(HttpGetAction {
                path: path.into(),
                port,
            }),
            ..Default::default()
        }
    }

    /// TCP connect probe on `port`
    pub fn tcp(port: u16) -> Self {
        Self {
            tcp_socket: Some(TcpSocketAction { port }),
            ..Default::default()
        }
    }

    /// Exec probe running `command`
    pub fn exec(command: Vec<String>) -> Self {
        Self {
            exec: Some(ExecAction { command }),
            ..Default::default()
        }
    }
}

/// HTTP GET action for probe
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpGetAction {
    /// Path
    pub path: String,
    /// Port
    pub port: u16,
}

/// TCP socket action for probe
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TcpSocketAction {
    /// Port
    pub port: u16,
}

/// Exec action for probe
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecAction {
    /// Command
    pub command: Vec<String>,
}

// =============================================================================
// Security context
// =============================================================================

/// Per-container security settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    /// Allow privilege escalation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_privilege_escalation: Option<bool>,
    /// Read-only root filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_root_filesystem: Option<bool>,
    /// Container UID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    /// Container GID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,
    /// Linux capability changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

/// Capability add/drop lists
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Capabilities to add
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<String>,
    /// Capabilities to drop
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop: Vec<String>,
}

/// Pod-level security context
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityContext {
    /// Reject images that run as root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
    /// UID for all containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    /// GID for all containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,
    /// Group owning mounted volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_group: Option<i64>,
}

impl PodSecurityContext {
    /// True when nothing is set
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// =============================================================================
// Volumes
// =============================================================================

/// Volume
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name
    pub name: String,
    /// ConfigMap source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapVolumeSource>,
    /// Secret source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretVolumeSource>,
    /// EmptyDir source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirVolumeSource>,
    /// PVC source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PvcVolumeSource>,
    /// Host path source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPathVolumeSource>,
}

impl Volume {
    /// ConfigMap-backed volume
    pub fn from_config_map(
        name: impl Into<String>,
        cm_name: impl Into<String>,
        items: Vec<KeyToPath>,
    ) -> Self {
        Self {
            name: name.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: cm_name.into(),
                items,
            }),
            ..Default::default()
        }
    }

    /// Secret-backed volume
    pub fn from_secret(
        name: impl Into<String>,
        secret_name: impl Into<String>,
        items: Vec<KeyToPath>,
    ) -> Self {
        Self {
            name: name.into(),
            secret: Some(SecretVolumeSource {
                secret_name: secret_name.into(),
                items,
            }),
            ..Default::default()
        }
    }

    /// Scratch emptyDir volume
    pub fn from_empty_dir(
        name: impl Into<String>,
        medium: Option<String>,
        size_limit: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            empty_dir: Some(EmptyDirVolumeSource { medium, size_limit }),
            ..Default::default()
        }
    }

    /// Volume bound to an existing claim
    pub fn from_pvc(name: impl Into<String>, claim_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persistent_volume_claim: Some(PvcVolumeSource {
                claim_name: claim_name.into(),
            }),
            ..Default::default()
        }
    }

    /// Create a Volume backed by a node directory.
    pub fn from_host_path(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host_path: Some(HostPathVolumeSource {
                path: path.into(),
                type_: Some("DirectoryOrCreate".to_string()),
            }),
            ..Default::default()
        }
    }
}

/// Key projected from a ConfigMap/Secret into a file
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeyToPath {
    /// Source key
    pub key: String,
    /// Relative file path
    pub path: String,
}

/// ConfigMap volume source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapVolumeSource {
    /// ConfigMap name
    pub name: String,
    /// Projected keys (all keys when empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<KeyToPath>,
}

/// Secret volume source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretVolumeSource {
    /// Secret name
    pub secret_name: String,
    /// Projected keys (all keys when empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<KeyToPath>,
}

/// EmptyDir volume source
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmptyDirVolumeSource {
    /// "Memory" for tmpfs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    /// Optional size cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_limit: Option<String>,
}

/// PVC volume source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PvcVolumeSource {
    /// PVC claim name
    pub claim_name: String,
}

/// Host path volume source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostPathVolumeSource {
    /// Path on the node
    pub path: String,
    /// Host path type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// Volume mount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Volume name
    pub name: String,
    /// Mount path
    pub mount_path: String,
    /// Read only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

impl VolumeMount {
    /// Mount `name` at `mount_path`
    pub fn new(name: impl Into<String>, mount_path: impl Into<String>, read_only: bool) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only: read_only.then_some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selector_serializes_as_empty_object() {
        let json = serde_json::to_value(LabelSelector::any()).expect("serializable");
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn secret_env_var_has_no_literal_value() {
        let var = EnvVar::from_secret("DB_PASSWORD", "api-secrets", "DB_PASSWORD");
        let json = serde_json::to_value(&var).expect("serializable");
        assert!(json.get("value").is_none());
        assert_eq!(json["valueFrom"]["secretKeyRef"]["name"], "api-secrets");
        assert_eq!(json["valueFrom"]["secretKeyRef"]["key"], "DB_PASSWORD");
    }

    #[test]
    fn ephemeral_storage_uses_kubernetes_key() {
        let q = ResourceQuantity {
            ephemeral_storage: Some("1Gi".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&q).expect("serializable");
        assert_eq!(json["ephemeral-storage"], "1Gi");
        assert!(!q.is_empty());
    }

    #[test]
    fn int_or_string_serializes_both_forms() {
        assert_eq!(
            serde_json::to_value(IntOrString::Int(1)).expect("int"),
            serde_json::json!(1)
        );
        assert_eq!(
            serde_json::to_value(IntOrString::String("25%".into())).expect("string"),
            serde_json::json!("25%")
        );
    }

    #[test]
    fn read_only_mount_only_sets_flag_when_true() {
        assert_eq!(VolumeMount::new("data", "/data", false).read_only, None);
        assert_eq!(VolumeMount::new("data", "/data", true).read_only, Some(true));
    }
}
