//! Workload resources: Deployment, Service, ServiceAccount, storage, PDB and CronJob

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::pod::{
    Container, IntOrString, LabelSelector, LocalObjectReference, PodSecurityContext, Volume,
};
use crate::kube_utils::{HasApiResource, ObjectMeta};

// =============================================================================
// Deployment
// =============================================================================

/// Kubernetes Deployment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// API version
    #[serde(default = "Deployment::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "Deployment::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: DeploymentSpec,
}

impl HasApiResource for Deployment {
    const API_VERSION: &'static str = "apps/v1";
    const KIND: &'static str = "Deployment";
}

impl_api_defaults!(Deployment);

impl Deployment {
    /// Create a new Deployment
    pub fn new(metadata: ObjectMeta, spec: DeploymentSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Deployment spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Number of replicas; left unset when an autoscaler owns the count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// Label selector
    pub selector: LabelSelector,
    /// Pod template
    pub template: PodTemplateSpec,
}

/// Pod template spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    /// Pod metadata
    pub metadata: PodMeta,
    /// Pod spec
    pub spec: PodSpec,
}

/// Labels and annotations stamped on pods
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodMeta {
    /// Labels
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Pod spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Service account name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Containers
    pub containers: Vec<Container>,
    /// Volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// Pod-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,
    /// Registry credentials
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,
    /// Restart policy (Always for Deployments, OnFailure/Never for Jobs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
}

// =============================================================================
// Service
// =============================================================================

/// Kubernetes Service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// API version
    #[serde(default = "Service::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "Service::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: ServiceSpec,
}

impl HasApiResource for Service {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Service";
}

impl_api_defaults!(Service);

impl Service {
    /// Create a ClusterIP Service selecting pods by label
    pub fn cluster_ip(
        metadata: ObjectMeta,
        selector: BTreeMap<String, String>,
        ports: Vec<ServicePort>,
    ) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec: ServiceSpec {
                type_: None,
                selector,
                ports,
                external_name: None,
            },
        }
    }

    /// Create an ExternalName Service aliasing another DNS name
    pub fn external_name(
        metadata: ObjectMeta,
        external_name: impl Into<String>,
        ports: Vec<ServicePort>,
    ) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec: ServiceSpec {
                type_: Some("ExternalName".to_string()),
                selector: BTreeMap::new(),
                ports,
                external_name: Some(external_name.into()),
            },
        }
    }
}

/// Service spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Service type (ClusterIP when unset)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Pod selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    /// Ports
    pub ports: Vec<ServicePort>,
    /// Target DNS name for ExternalName services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_name: Option<String>,
}

/// Service port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Service port
    pub port: u16,
    /// Target container port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    /// Protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

// =============================================================================
// ServiceAccount
// =============================================================================

/// Kubernetes ServiceAccount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    /// API version
    #[serde(default = "ServiceAccount::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "ServiceAccount::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
}

impl HasApiResource for ServiceAccount {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "ServiceAccount";
}

impl_api_defaults!(ServiceAccount);

impl ServiceAccount {
    /// Create a new ServiceAccount
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
        }
    }
}

// =============================================================================
// ConfigMap and PersistentVolumeClaim
// =============================================================================

/// Kubernetes ConfigMap
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    /// API version
    #[serde(default = "ConfigMap::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "ConfigMap::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// String data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl HasApiResource for ConfigMap {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "ConfigMap";
}

impl_api_defaults!(ConfigMap);

impl ConfigMap {
    /// Empty ConfigMap
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            data: BTreeMap::new(),
        }
    }

    /// Add a data entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Kubernetes PersistentVolumeClaim
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaim {
    /// API version
    #[serde(default = "PersistentVolumeClaim::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "PersistentVolumeClaim::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: PvcSpec,
}

impl HasApiResource for PersistentVolumeClaim {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "PersistentVolumeClaim";
}

impl_api_defaults!(PersistentVolumeClaim);

impl PersistentVolumeClaim {
    /// Create a claim requesting `size` of storage
    pub fn new(
        metadata: ObjectMeta,
        size: impl Into<String>,
        access_modes: Vec<String>,
        storage_class_name: Option<String>,
    ) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec: PvcSpec {
                access_modes,
                storage_class_name,
                resources: PvcResources {
                    requests: PvcStorage {
                        storage: size.into(),
                    },
                },
            },
        }
    }
}

/// PVC spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PvcSpec {
    /// Access modes
    pub access_modes: Vec<String>,
    /// Storage class (cluster default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// Requested resources
    pub resources: PvcResources,
}

/// PVC resource requests
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PvcResources {
    /// Requests
    pub requests: PvcStorage,
}

/// PVC storage request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PvcStorage {
    /// Storage quantity
    pub storage: String,
}

// =============================================================================
// PodDisruptionBudget
// =============================================================================

/// Kubernetes PodDisruptionBudget
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodDisruptionBudget {
    /// API version
    #[serde(default = "PodDisruptionBudget::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "PodDisruptionBudget::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: PdbSpec,
}

impl HasApiResource for PodDisruptionBudget {
    const API_VERSION: &'static str = "policy/v1";
    const KIND: &'static str = "PodDisruptionBudget";
}

impl_api_defaults!(PodDisruptionBudget);

impl PodDisruptionBudget {
    /// Create a new PodDisruptionBudget
    pub fn new(metadata: ObjectMeta, spec: PdbSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// PDB spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PdbSpec {
    /// Minimum available pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<IntOrString>,
    /// Maximum unavailable pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
    /// Label selector
    pub selector: LabelSelector,
}

// =============================================================================
// CronJob
// =============================================================================

/// Kubernetes CronJob
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    /// API version
    #[serde(default = "CronJob::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "CronJob::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: CronJobSpec,
}

impl HasApiResource for CronJob {
    const API_VERSION: &'static str = "batch/v1";
    const KIND: &'static str = "CronJob";
}

impl_api_defaults!(CronJob);

impl CronJob {
    /// Create a new CronJob
    pub fn new(metadata: ObjectMeta, spec: CronJobSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// CronJob spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CronJobSpec {
    /// Cron schedule expression
    pub schedule: String,
    /// IANA time zone the schedule is evaluated in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    /// Allow, Forbid or Replace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_policy: Option<String>,
    /// Job template
    pub job_template: JobTemplateSpec,
}

/// Job template inside a CronJob
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobTemplateSpec {
    /// Job spec
    pub spec: JobSpec,
}

/// Job spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Retries before the job is marked failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<u32>,
    /// Pod template
    pub template: PodTemplateSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_without_replicas_omits_field() {
        let deployment = Deployment::new(
            ObjectMeta::new("api", "apps"),
            DeploymentSpec {
                replicas: None,
                selector: LabelSelector::label("app", "api"),
                template: PodTemplateSpec {
                    metadata: PodMeta::default(),
                    spec: PodSpec::default(),
                },
            },
        );

        let json = serde_json::to_value(&deployment).expect("serializable");
        assert_eq!(json["apiVersion"], "apps/v1");
        assert_eq!(json["kind"], "Deployment");
        assert!(json["spec"].get("replicas").is_none());
        assert_eq!(json["spec"]["selector"]["matchLabels"]["app"], "api");
    }

    #[test]
    fn external_name_service_has_no_selector() {
        let svc = Service::external_name(
            ObjectMeta::new("api-interceptor", "apps"),
            "proxy.keda.svc.cluster.local",
            vec![ServicePort {
                name: Some("http".to_string()),
                port: 8080,
                target_port: None,
                protocol: None,
            }],
        );

        let json = serde_json::to_value(&svc).expect("serializable");
        assert_eq!(json["spec"]["type"], "ExternalName");
        assert_eq!(json["spec"]["externalName"], "proxy.keda.svc.cluster.local");
        assert!(json["spec"].get("selector").is_none());
    }

    #[test]
    fn pvc_carries_storage_request() {
        let pvc = PersistentVolumeClaim::new(
            ObjectMeta::new("data", "apps"),
            "5Gi",
            vec!["ReadWriteOnce".to_string()],
            Some("standard".to_string()),
        );
        let json = serde_json::to_value(&pvc).expect("serializable");
        assert_eq!(json["spec"]["resources"]["requests"]["storage"], "5Gi");
        assert_eq!(json["spec"]["storageClassName"], "standard");
        assert_eq!(json["spec"]["accessModes"][0], "ReadWriteOnce");
    }
}
