//! KEDA resources: ScaledObject, TriggerAuthentication and the HTTP add-on's HTTPScaledObject

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

// =============================================================================
// ScaledObject
// =============================================================================

/// KEDA ScaledObject for event-driven autoscaling
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObject {
    /// API version
    #[serde(default = "ScaledObject::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "ScaledObject::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: ScaledObjectSpec,
}

impl HasApiResource for ScaledObject {
    const API_VERSION: &'static str = "keda.sh/v1alpha1";
    const KIND: &'static str = "ScaledObject";
}

impl_api_defaults!(ScaledObject);

impl ScaledObject {
    /// Create a new ScaledObject
    pub fn new(metadata: ObjectMeta, spec: ScaledObjectSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// ScaledObject spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectSpec {
    /// Target workload
    pub scale_target_ref: ScaleTargetRef,
    /// Minimum replicas
    pub min_replica_count: u32,
    /// Maximum replicas
    pub max_replica_count: u32,
    /// Seconds between trigger checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<u32>,
    /// Seconds to wait before scaling back to the minimum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_period: Option<u32>,
    /// Triggers
    pub triggers: Vec<ScaledObjectTrigger>,
}

/// Reference to the scaled workload
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTargetRef {
    /// Workload name
    pub name: String,
    /// Workload kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Workload apiVersion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl ScaleTargetRef {
    /// Reference to an apps/v1 Deployment
    pub fn deployment(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some("Deployment".to_string()),
            api_version: Some("apps/v1".to_string()),
        }
    }
}

/// KEDA trigger
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectTrigger {
    /// Scaler type (redis, cron, ...)
    #[serde(rename = "type")]
    pub type_: String,
    /// Scaler metadata
    pub metadata: BTreeMap<String, String>,
    /// Credentials for the scaler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_ref: Option<AuthenticationRef>,
}

/// Reference to a TriggerAuthentication
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthenticationRef {
    /// TriggerAuthentication name
    pub name: String,
}

// =============================================================================
// TriggerAuthentication
// =============================================================================

/// KEDA TriggerAuthentication
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAuthentication {
    /// API version
    #[serde(default = "TriggerAuthentication::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "TriggerAuthentication::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: TriggerAuthenticationSpec,
}

impl HasApiResource for TriggerAuthentication {
    const API_VERSION: &'static str = "keda.sh/v1alpha1";
    const KIND: &'static str = "TriggerAuthentication";
}

impl_api_defaults!(TriggerAuthentication);

impl TriggerAuthentication {
    /// Authentication sourcing one parameter from a Secret key
    pub fn from_secret(
        metadata: ObjectMeta,
        parameter: impl Into<String>,
        secret: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec: TriggerAuthenticationSpec {
                secret_target_ref: vec![SecretTargetRef {
                    parameter: parameter.into(),
                    name: secret.into(),
                    key: key.into(),
                }],
            },
        }
    }
}

/// TriggerAuthentication spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAuthenticationSpec {
    /// Secret-sourced parameters
    pub secret_target_ref: Vec<SecretTargetRef>,
}

/// One scaler parameter read from a Secret key
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SecretTargetRef {
    /// Scaler parameter name
    pub parameter: String,
    /// Secret name
    pub name: String,
    /// Secret key
    pub key: String,
}

// =============================================================================
// HTTPScaledObject
// =============================================================================

/// KEDA HTTP add-on HTTPScaledObject (scale-to-zero on request rate)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpScaledObject {
    /// API version
    #[serde(default = "HttpScaledObject::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "HttpScaledObject::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: HttpScaledObjectSpec,
}

impl HasApiResource for HttpScaledObject {
    const API_VERSION: &'static str = "http.keda.sh/v1alpha1";
    const KIND: &'static str = "HTTPScaledObject";
}

impl_api_defaults!(HttpScaledObject);

impl HttpScaledObject {
    /// Create a new HTTPScaledObject
    pub fn new(metadata: ObjectMeta, spec: HttpScaledObjectSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// HTTPScaledObject spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpScaledObjectSpec {
    /// Host headers the interceptor routes to this workload
    pub hosts: Vec<String>,
    /// Path prefixes routed to this workload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_prefixes: Vec<String>,
    /// Target workload and service
    pub scale_target_ref: HttpScaleTargetRef,
    /// Replica bounds
    pub replicas: ReplicaBounds,
    /// Scaling metric
    pub scaling_metric: HttpScalingMetric,
    /// Seconds of idleness before scaling down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaledown_period: Option<u32>,
}

/// Workload and service the interceptor forwards to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpScaleTargetRef {
    /// Workload name
    pub name: String,
    /// Workload kind
    pub kind: String,
    /// Workload apiVersion
    pub api_version: String,
    /// Service name
    pub service: String,
    /// Service port
    pub port: u16,
}

/// Min/max replicas
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReplicaBounds {
    /// Minimum
    pub min: u32,
    /// Maximum
    pub max: u32,
}

/// HTTP scaling metric
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpScalingMetric {
    /// Request rate target
    pub request_rate: RequestRateMetric,
}

/// Request rate target
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestRateMetric {
    /// Bucket size
    pub granularity: String,
    /// Target requests per granularity per replica
    pub target_value: u32,
    /// Averaging window
    pub window: String,
}
