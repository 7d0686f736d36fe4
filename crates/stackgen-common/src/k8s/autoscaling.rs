//! autoscaling/v2 HorizontalPodAutoscaler

use serde::{Deserialize, Serialize};

use super::keda::ScaleTargetRef;
use crate::kube_utils::{HasApiResource, ObjectMeta};

/// Kubernetes HorizontalPodAutoscaler
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscaler {
    /// API version
    #[serde(default = "HorizontalPodAutoscaler::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "HorizontalPodAutoscaler::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: HpaSpec,
}

impl HasApiResource for HorizontalPodAutoscaler {
    const API_VERSION: &'static str = "autoscaling/v2";
    const KIND: &'static str = "HorizontalPodAutoscaler";
}

impl_api_defaults!(HorizontalPodAutoscaler);

impl HorizontalPodAutoscaler {
    /// Create a new HorizontalPodAutoscaler
    pub fn new(metadata: ObjectMeta, spec: HpaSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// HPA spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaSpec {
    /// Target workload
    pub scale_target_ref: ScaleTargetRef,
    /// Minimum replicas (at least 1)
    pub min_replicas: u32,
    /// Maximum replicas
    pub max_replicas: u32,
    /// Metrics
    pub metrics: Vec<MetricSpec>,
    /// Scaling behavior
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<HpaBehavior>,
}

/// One scaling metric
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricSpec {
    /// Metric source type (Resource)
    #[serde(rename = "type")]
    pub type_: String,
    /// Resource metric
    pub resource: ResourceMetricSource,
}

impl MetricSpec {
    /// Average utilization target for `cpu` or `memory`
    pub fn utilization(resource: impl Into<String>, percent: u32) -> Self {
        Self {
            type_: "Resource".to_string(),
            resource: ResourceMetricSource {
                name: resource.into(),
                target: MetricTarget {
                    type_: "Utilization".to_string(),
                    average_utilization: percent,
                },
            },
        }
    }
}

/// Resource metric source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResourceMetricSource {
    /// Resource name
    pub name: String,
    /// Target
    pub target: MetricTarget,
}

/// Metric target
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricTarget {
    /// Target type (Utilization)
    #[serde(rename = "type")]
    pub type_: String,
    /// Average utilization percentage
    pub average_utilization: u32,
}

/// Scale-up/scale-down behavior
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaBehavior {
    /// Scale-up rules
    pub scale_up: ScalingRules,
    /// Scale-down rules
    pub scale_down: ScalingRules,
}

/// Stabilization rules for one direction
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingRules {
    /// Stabilization window in seconds
    pub stabilization_window_seconds: u32,
}
