//! networking.k8s.io resources: Ingress and NetworkPolicy

use serde::{Deserialize, Serialize};

use super::pod::LabelSelector;
use crate::kube_utils::{HasApiResource, ObjectMeta};

// =============================================================================
// Ingress
// =============================================================================

/// Kubernetes Ingress
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    /// API version
    #[serde(default = "Ingress::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "Ingress::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: IngressSpec,
}

impl HasApiResource for Ingress {
    const API_VERSION: &'static str = "networking.k8s.io/v1";
    const KIND: &'static str = "Ingress";
}

impl_api_defaults!(Ingress);

impl Ingress {
    /// Create a new Ingress
    pub fn new(metadata: ObjectMeta, spec: IngressSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Ingress spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Ingress class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    /// Routing rules
    pub rules: Vec<IngressRule>,
    /// TLS termination
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<IngressTls>,
}

/// Host-scoped rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngressRule {
    /// Host (all hosts when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// HTTP paths
    pub http: HttpIngressRuleValue,
}

/// HTTP paths of a rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpIngressRuleValue {
    /// Paths
    pub paths: Vec<HttpIngressPath>,
}

/// One path routed to a backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressPath {
    /// Path
    pub path: String,
    /// Prefix, Exact or ImplementationSpecific
    pub path_type: String,
    /// Backend
    pub backend: IngressBackend,
}

/// Ingress backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngressBackend {
    /// Service backend
    pub service: IngressServiceBackend,
}

impl IngressBackend {
    /// Backend pointing at `name:port`
    pub fn service(name: impl Into<String>, port: u16) -> Self {
        Self {
            service: IngressServiceBackend {
                name: name.into(),
                port: ServiceBackendPort { number: port },
            },
        }
    }
}

/// Service referenced by an ingress backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngressServiceBackend {
    /// Service name
    pub name: String,
    /// Service port
    pub port: ServiceBackendPort,
}

/// Numbered service port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServiceBackendPort {
    /// Port number
    pub number: u16,
}

/// TLS block
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressTls {
    /// Hosts covered by the certificate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    /// Secret holding the certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

// =============================================================================
// NetworkPolicy
// =============================================================================

/// Kubernetes NetworkPolicy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    /// API version
    #[serde(default = "NetworkPolicy::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "NetworkPolicy::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: NetworkPolicySpec,
}

impl HasApiResource for NetworkPolicy {
    const API_VERSION: &'static str = "networking.k8s.io/v1";
    const KIND: &'static str = "NetworkPolicy";
}

impl_api_defaults!(NetworkPolicy);

impl NetworkPolicy {
    /// Create a new NetworkPolicy
    pub fn new(metadata: ObjectMeta, spec: NetworkPolicySpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// NetworkPolicy spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    /// Pods the policy applies to
    pub pod_selector: LabelSelector,
    /// Ingress and/or Egress
    pub policy_types: Vec<String>,
    /// Inbound rules
    pub ingress: Vec<NetworkPolicyIngressRule>,
    /// Outbound rules, only present when the policy restricts egress
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<NetworkPolicyEgressRule>,
}

/// Inbound rule
///
/// `from` is always serialized: an absent `from` would admit all sources.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NetworkPolicyIngressRule {
    /// Allowed sources
    pub from: Vec<NetworkPolicyPeer>,
    /// Allowed ports (all when empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<NetworkPolicyPort>,
}

/// Outbound rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NetworkPolicyEgressRule {
    /// Allowed destinations
    pub to: Vec<NetworkPolicyPeer>,
    /// Allowed ports (all when empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<NetworkPolicyPort>,
}

/// Traffic peer
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyPeer {
    /// Namespace selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
    /// Pod selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,
    /// CIDR block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_block: Option<IpBlock>,
}

/// CIDR peer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IpBlock {
    /// CIDR
    pub cidr: String,
}

/// Port/protocol pair
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NetworkPolicyPort {
    /// TCP, UDP or SCTP
    pub protocol: String,
    /// Port number
    pub port: u16,
}

impl NetworkPolicyPort {
    /// TCP port
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: "TCP".to_string(),
            port,
        }
    }

    /// UDP port
    pub fn udp(port: u16) -> Self {
        Self {
            protocol: "UDP".to_string(),
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_rule_without_host_omits_field() {
        let rule = IngressRule {
            host: None,
            http: HttpIngressRuleValue {
                paths: vec![HttpIngressPath {
                    path: "/api".to_string(),
                    path_type: "Prefix".to_string(),
                    backend: IngressBackend::service("api", 80),
                }],
            },
        };
        let json = serde_json::to_value(&rule).expect("serializable");
        assert!(json.get("host").is_none());
        assert_eq!(json["http"]["paths"][0]["pathType"], "Prefix");
        assert_eq!(json["http"]["paths"][0]["backend"]["service"]["port"]["number"], 80);
    }

    #[test]
    fn empty_from_list_is_still_serialized() {
        let rule = NetworkPolicyIngressRule {
            from: vec![],
            ports: vec![],
        };
        let json = serde_json::to_value(&rule).expect("serializable");
        assert_eq!(json["from"], serde_json::json!([]));
    }

    #[test]
    fn policy_without_egress_omits_block() {
        let policy = NetworkPolicy::new(
            ObjectMeta::new("api-policy", "apps"),
            NetworkPolicySpec {
                pod_selector: LabelSelector::label("app", "api"),
                policy_types: vec!["Ingress".to_string()],
                ingress: vec![],
                egress: vec![],
            },
        );
        let json = serde_json::to_value(&policy).expect("serializable");
        assert!(json["spec"].get("egress").is_none());
    }
}
