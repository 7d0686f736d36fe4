//! Container details: ports, probes, env sources, volumes and disruption budget.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use stackgen_common::k8s::pod::IntOrString;
use stackgen_common::kube_utils::sanitize_name;
use stackgen_common::quantity::parse_quantity;

use crate::error::ConfigError;
use crate::Result;

// =============================================================================
// Container
// =============================================================================

/// Command, arguments, ports and working directory of the main container
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    /// Entrypoint override
    pub command: Option<Vec<String>>,
    /// Arguments
    pub args: Option<Vec<String>>,
    /// Exposed ports; the first is the primary port
    pub ports: Vec<PortConfig>,
    /// Working directory
    pub working_dir: Option<String>,
}

impl ContainerConfig {
    /// The primary port, or the default `http` port when none are listed
    pub fn primary_port(&self) -> PortConfig {
        self.ports.first().cloned().unwrap_or_default()
    }

    /// Ports to expose, never empty
    pub fn effective_ports(&self) -> Vec<PortConfig> {
        if self.ports.is_empty() {
            vec![PortConfig::default()]
        } else {
            self.ports.clone()
        }
    }

    /// Validate port names and numbers
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut service_ports = HashSet::new();
        for (i, port) in self.ports.iter().enumerate() {
            let path = |field: &str| format!("ports[{}].{}", i, field);
            if sanitize_name(&port.name) != port.name {
                return Err(ConfigError::validation(
                    path("name"),
                    format!("'{}' is not a valid port name", port.name),
                ));
            }
            if !names.insert(port.name.as_str()) {
                return Err(ConfigError::validation(
                    path("name"),
                    format!("duplicate port name '{}'", port.name),
                ));
            }
            if port.container_port == 0 {
                return Err(ConfigError::validation(path("container_port"), "cannot be 0"));
            }
            if port.service_port == 0 {
                return Err(ConfigError::validation(path("service_port"), "cannot be 0"));
            }
            if !service_ports.insert(port.service_port) {
                return Err(ConfigError::validation(
                    path("service_port"),
                    format!("duplicate service port {}", port.service_port),
                ));
            }
            if !matches!(port.protocol.as_str(), "TCP" | "UDP" | "SCTP") {
                return Err(ConfigError::validation(
                    path("protocol"),
                    format!("expected TCP, UDP or SCTP, got '{}'", port.protocol),
                ));
            }
        }
        Ok(())
    }
}

/// One exposed port
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PortConfig {
    /// Port name
    pub name: String,
    /// Port the container listens on
    #[serde(alias = "port")]
    pub container_port: u16,
    /// Port the Service exposes
    pub service_port: u16,
    /// TCP, UDP or SCTP
    pub protocol: String,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: "http".to_string(),
            container_port: 8080,
            service_port: 80,
            protocol: "TCP".to_string(),
        }
    }
}

// =============================================================================
// Probes
// =============================================================================

/// Startup, readiness and liveness probes
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProbesConfig {
    /// Startup probe
    pub startup: Option<ProbeConfig>,
    /// Readiness probe
    pub readiness: Option<ProbeConfig>,
    /// Liveness probe
    pub liveness: Option<ProbeConfig>,
}

impl ProbesConfig {
    /// Validate each configured probe
    pub fn validate(&self) -> Result<()> {
        for (name, probe) in [
            ("startup", &self.startup),
            ("readiness", &self.readiness),
            ("liveness", &self.liveness),
        ] {
            if let Some(probe) = probe {
                probe.validate().map_err(|e| e.within(name))?;
            }
        }
        Ok(())
    }
}

/// Probe mechanism
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// HTTP GET
    #[default]
    Http,
    /// TCP connect
    Tcp,
    /// Command inside the container
    Exec,
}

/// One probe
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// Mechanism
    #[serde(rename = "type")]
    pub kind: ProbeKind,
    /// HTTP path
    pub path: String,
    /// Port (defaults to the primary container port)
    pub port: Option<u16>,
    /// Command for exec probes
    pub command: Vec<String>,
    /// Seconds before the first check
    pub initial_delay: u32,
    /// Seconds between checks
    pub period: u32,
    /// Seconds before a check times out
    pub timeout: u32,
    /// Successes needed to pass
    pub success_threshold: u32,
    /// Failures needed to fail
    pub failure_threshold: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Http,
            path: "/health".to_string(),
            port: None,
            command: Vec::new(),
            initial_delay: 0,
            period: 10,
            timeout: 1,
            success_threshold: 1,
            failure_threshold: 3,
        }
    }
}

impl ProbeConfig {
    fn validate(&self) -> Result<()> {
        match self.kind {
            ProbeKind::Http if !self.path.starts_with('/') => {
                return Err(ConfigError::validation("path", "must start with '/'"))
            }
            ProbeKind::Exec if self.command.is_empty() => {
                return Err(ConfigError::validation("command", "required when type=exec"))
            }
            _ => {}
        }
        if self.period == 0 {
            return Err(ConfigError::validation("period", "must be greater than 0"));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::validation("failure_threshold", "must be greater than 0"));
        }
        Ok(())
    }
}

// =============================================================================
// Env sources
// =============================================================================

/// Kind of object an `env_from` entry imports
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvFromKind {
    /// Secret
    Secret,
    /// ConfigMap
    #[serde(alias = "config-map", alias = "configMap")]
    Configmap,
}

/// Import every key of a Secret or ConfigMap as env vars
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EnvFromConfig {
    /// Object kind
    #[serde(rename = "type")]
    pub kind: EnvFromKind,
    /// Object name
    pub name: String,
    /// Prefix added to every imported key
    #[serde(default)]
    pub prefix: Option<String>,
    /// Start even when the object is missing
    #[serde(default)]
    pub optional: bool,
}

// =============================================================================
// Volumes
// =============================================================================

/// Volume source type
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeKind {
    /// Scratch space living as long as the pod
    #[serde(alias = "emptyDir", alias = "emptydir")]
    EmptyDir,
    /// PersistentVolumeClaim generated alongside the app
    #[serde(alias = "persistent")]
    Pvc,
    /// Existing Secret
    Secret,
    /// ConfigMap, generated when `data` is given
    #[serde(alias = "config-map", alias = "configMap")]
    Configmap,
    /// Directory on the node
    #[serde(alias = "hostPath")]
    HostPath,
}

/// One volume mounted into the main container
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VolumeConfig {
    /// Volume name
    pub name: String,
    /// Source type
    #[serde(rename = "type")]
    pub kind: VolumeKind,
    /// Mount path inside the container
    pub mount_path: String,
    /// Mount read-only
    #[serde(default)]
    pub read_only: bool,
    /// emptyDir medium (`Memory` for tmpfs)
    #[serde(default)]
    pub medium: Option<String>,
    /// emptyDir size limit
    #[serde(default)]
    pub size_limit: Option<String>,
    /// PVC size
    #[serde(default = "default_volume_size")]
    pub size: String,
    /// PVC storage class
    #[serde(default)]
    pub storage_class: Option<String>,
    /// PVC access modes
    #[serde(default = "default_access_modes")]
    pub access_modes: Vec<String>,
    /// Mount this existing claim instead of generating one
    #[serde(default)]
    pub claim_name: Option<String>,
    /// Node directory for `host-path` volumes
    #[serde(default)]
    pub host_path: Option<String>,
    /// Secret name (defaults to the volume name)
    #[serde(default)]
    pub secret_name: Option<String>,
    /// ConfigMap name (defaults to the volume name)
    #[serde(default)]
    pub configmap_name: Option<String>,
    /// Keys to project as files
    #[serde(default)]
    pub items: Vec<KeyPathConfig>,
    /// Inline ConfigMap content
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Key projected to a relative path
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct KeyPathConfig {
    /// Key in the source object
    pub key: String,
    /// File path relative to the mount
    pub path: String,
}

fn default_volume_size() -> String {
    "1Gi".to_string()
}

fn default_access_modes() -> Vec<String> {
    vec!["ReadWriteOnce".to_string()]
}

impl VolumeConfig {
    /// Volume with every optional field at its default
    pub fn new(name: impl Into<String>, kind: VolumeKind, mount_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            mount_path: mount_path.into(),
            read_only: false,
            medium: None,
            size_limit: None,
            size: default_volume_size(),
            storage_class: None,
            access_modes: default_access_modes(),
            claim_name: None,
            host_path: None,
            secret_name: None,
            configmap_name: None,
            items: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    /// Secret backing a `secret` volume
    pub fn secret_name(&self) -> &str {
        self.secret_name.as_deref().unwrap_or(&self.name)
    }

    /// ConfigMap backing a `configmap` volume
    pub fn configmap_name(&self) -> &str {
        self.configmap_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether a PersistentVolumeClaim is generated for this volume
    pub fn creates_claim(&self) -> bool {
        self.kind == VolumeKind::Pvc && self.claim_name.is_none()
    }
}

/// Validate a list of volumes; paths are relative to the list
pub fn validate_volumes(volumes: &[VolumeConfig]) -> Result<()> {
    let mut names = HashSet::new();
    let mut mounts = HashSet::new();
    for (i, volume) in volumes.iter().enumerate() {
        let path = |field: &str| format!("[{}].{}", i, field);

        if sanitize_name(&volume.name) != volume.name {
            return Err(ConfigError::validation(
                path("name"),
                format!("'{}' is not a valid volume name", volume.name),
            ));
        }
        if !names.insert(volume.name.as_str()) {
            return Err(ConfigError::validation(
                path("name"),
                format!("duplicate volume '{}'", volume.name),
            ));
        }
        if !volume.mount_path.starts_with('/') {
            return Err(ConfigError::validation(path("mount_path"), "must be an absolute path"));
        }
        if !mounts.insert(volume.mount_path.as_str()) {
            return Err(ConfigError::validation(
                path("mount_path"),
                format!("'{}' is mounted twice", volume.mount_path),
            ));
        }
        if !volume.data.is_empty() && volume.kind != VolumeKind::Configmap {
            return Err(ConfigError::validation(path("data"), "only valid for configmap volumes"));
        }
        if volume.kind == VolumeKind::Pvc {
            parse_quantity(&volume.size)
                .map_err(|e| ConfigError::validation(path("size"), e.to_string()))?;
            if volume.access_modes.is_empty() {
                return Err(ConfigError::validation(path("access_modes"), "must not be empty"));
            }
        }
        if volume.kind == VolumeKind::HostPath
            && !volume.host_path.as_deref().is_some_and(|p| p.starts_with('/'))
        {
            return Err(ConfigError::validation(
                path("host_path"),
                "absolute path required when type=host-path",
            ));
        }
        if let Some(limit) = &volume.size_limit {
            parse_quantity(limit)
                .map_err(|e| ConfigError::validation(path("size_limit"), e.to_string()))?;
        }
    }
    Ok(())
}

// =============================================================================
// Disruption budget
// =============================================================================

/// PodDisruptionBudget settings; exactly one field is set
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PdbConfig {
    /// Pods that must stay available
    pub min_available: Option<IntOrString>,
    /// Pods that may be unavailable
    pub max_unavailable: Option<IntOrString>,
}

impl PdbConfig {
    /// Check exactly one bound is given
    pub fn validate(&self) -> Result<()> {
        match (&self.min_available, &self.max_unavailable) {
            (Some(_), Some(_)) => Err(ConfigError::validation(
                "",
                "set either min_available or max_unavailable, not both",
            )),
            (None, None) => Err(ConfigError::validation(
                "",
                "one of min_available or max_unavailable is required",
            )),
            _ => Ok(()),
        }
    }
}
