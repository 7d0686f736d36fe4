//! Typed Kubernetes resources emitted by the generators
//!
//! Every resource is a plain serde struct with `camelCase` field names and
//! `skip_serializing_if` on optional fields, so serialized output contains only
//! what a generator actually set. Maps are `BTreeMap` to keep output ordering
//! stable across runs.
//!
//! [`Manifest`] is the closed set of resources a generator can return.

use serde::Serialize;

use crate::kube_utils::ObjectMeta;

/// Implements `default_api_version`/`default_kind` from a type's `HasApiResource` consts
macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as $crate::kube_utils::HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as $crate::kube_utils::HasApiResource>::KIND.to_string()
            }
        }
    };
}

pub mod apps;
pub mod autoscaling;
pub mod pod;
pub mod eso;
pub mod keda;
pub mod networking;
pub mod traefik;

use apps::{ConfigMap, CronJob, Deployment, PersistentVolumeClaim, PodDisruptionBudget, Service, ServiceAccount};
use autoscaling::HorizontalPodAutoscaler;
use eso::ExternalSecret;
use keda::{HttpScaledObject, ScaledObject, TriggerAuthentication};
use networking::{Ingress, NetworkPolicy};
use traefik::{IngressRoute, Middleware};

// =============================================================================
// Manifest
// =============================================================================

/// One generated Kubernetes object.
///
/// Serializes untagged, i.e. exactly as the wrapped resource.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Manifest {
    /// apps/v1 Deployment
    Deployment(Deployment),
    /// v1 Service
    Service(Service),
    /// v1 ServiceAccount
    ServiceAccount(ServiceAccount),
    /// v1 ConfigMap
    ConfigMap(ConfigMap),
    /// v1 PersistentVolumeClaim
    PersistentVolumeClaim(PersistentVolumeClaim),
    /// policy/v1 PodDisruptionBudget
    PodDisruptionBudget(PodDisruptionBudget),
    /// batch/v1 CronJob
    CronJob(CronJob),
    /// networking.k8s.io/v1 Ingress
    Ingress(Ingress),
    /// networking.k8s.io/v1 NetworkPolicy
    NetworkPolicy(NetworkPolicy),
    /// traefik.io/v1alpha1 IngressRoute
    IngressRoute(IngressRoute),
    /// traefik.io/v1alpha1 Middleware
    Middleware(Middleware),
    /// autoscaling/v2 HorizontalPodAutoscaler
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
    /// http.keda.sh/v1alpha1 HTTPScaledObject
    HttpScaledObject(HttpScaledObject),
    /// keda.sh/v1alpha1 ScaledObject
    ScaledObject(ScaledObject),
    /// keda.sh/v1alpha1 TriggerAuthentication
    TriggerAuthentication(TriggerAuthentication),
    /// external-secrets.io/v1beta1 ExternalSecret
    ExternalSecret(ExternalSecret),
}

macro_rules! manifest_variants {
    ($($variant:ident),* $(,)?) => {
        impl Manifest {
            /// Object metadata
            pub fn metadata(&self) -> &ObjectMeta {
                match self {
                    $(Manifest::$variant(r) => &r.metadata,)*
                }
            }

            /// Resource kind as written to the manifest
            pub fn kind(&self) -> &str {
                match self {
                    $(Manifest::$variant(r) => &r.kind,)*
                }
            }

            /// Resource apiVersion as written to the manifest
            pub fn api_version(&self) -> &str {
                match self {
                    $(Manifest::$variant(r) => &r.api_version,)*
                }
            }
        }

        $(
            impl From<$variant> for Manifest {
                fn from(resource: $variant) -> Self {
                    Manifest::$variant(resource)
                }
            }
        )*
    };
}

manifest_variants!(
    Deployment,
    Service,
    ServiceAccount,
    ConfigMap,
    PersistentVolumeClaim,
    PodDisruptionBudget,
    CronJob,
    Ingress,
    NetworkPolicy,
    IngressRoute,
    Middleware,
    HorizontalPodAutoscaler,
    HttpScaledObject,
    ScaledObject,
    TriggerAuthentication,
    ExternalSecret,
);

impl Manifest {
    /// Object name
    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Object namespace
    pub fn namespace(&self) -> &str {
        &self.metadata().namespace
    }

    /// `Kind/name`, used in logs and error messages
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }

    /// Convert to a JSON value
    pub fn to_value(&self) -> crate::Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| crate::Error::serialization_for(self.kind(), e.to_string()))
    }
}
