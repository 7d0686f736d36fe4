//! NetworkPolicy generation
//!
//! Ingress is always restricted: KEDA may reach the primary port (the HTTP
//! interceptor and scalers probe it), the visibility level adds one default
//! rule and each `allow_from` entry adds a peer. Egress is only restricted
//! when `allow_to` lists destinations, and then DNS is always allowed first.

use stackgen_common::k8s::networking::{
    IpBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort, NetworkPolicySpec,
};
use stackgen_common::k8s::pod::LabelSelector;
use stackgen_common::k8s::Manifest;
use stackgen_common::{LABEL_NAMESPACE_NAME, LABEL_VISIBILITY};
use stackgen_config::model::NetworkRule;
use stackgen_config::Visibility;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;

/// Namespace the KEDA operator and HTTP add-on run in
const KEDA_NAMESPACE: &str = "keda";

const DNS_PORT: u16 = 53;

/// NetworkPolicy `<n>-policy`
pub struct NetworkPolicyGenerator;

impl NetworkPolicyGenerator {
    fn peer(rule: &NetworkRule) -> NetworkPolicyPeer {
        NetworkPolicyPeer {
            namespace_selector: rule
                .namespace
                .as_ref()
                .map(|ns| LabelSelector::label(LABEL_NAMESPACE_NAME, ns.clone())),
            pod_selector: (!rule.pod_labels.is_empty())
                .then(|| LabelSelector::matching(rule.pod_labels.clone())),
            ip_block: rule.cidr.as_ref().map(|cidr| IpBlock { cidr: cidr.clone() }),
        }
    }

    fn ports(rule: &NetworkRule) -> Vec<NetworkPolicyPort> {
        rule.ports.iter().copied().map(NetworkPolicyPort::tcp).collect()
    }

    fn ingress_rules(ctx: &GenerationContext<'_>) -> Vec<NetworkPolicyIngressRule> {
        let primary = ctx.primary_port().container_port;
        let on_primary = || vec![NetworkPolicyPort::tcp(primary)];

        let mut rules = vec![NetworkPolicyIngressRule {
            from: vec![NetworkPolicyPeer {
                namespace_selector: Some(LabelSelector::label(
                    LABEL_NAMESPACE_NAME,
                    KEDA_NAMESPACE,
                )),
                ..Default::default()
            }],
            ports: on_primary(),
        }];

        let default_peer = match ctx.app.security.visibility {
            Visibility::Public | Visibility::Internal => Some(NetworkPolicyPeer {
                namespace_selector: Some(LabelSelector::any()),
                ..Default::default()
            }),
            Visibility::Private => Some(NetworkPolicyPeer {
                pod_selector: Some(LabelSelector::any()),
                ..Default::default()
            }),
            Visibility::Restricted => None,
        };
        if let Some(peer) = default_peer {
            rules.push(NetworkPolicyIngressRule {
                from: vec![peer],
                ports: on_primary(),
            });
        }

        for rule in &ctx.app.security.network_policy.allow_from {
            let ports = Self::ports(rule);
            rules.push(NetworkPolicyIngressRule {
                from: vec![Self::peer(rule)],
                ports: if ports.is_empty() { on_primary() } else { ports },
            });
        }

        rules
    }

    fn egress_rules(ctx: &GenerationContext<'_>) -> Vec<NetworkPolicyEgressRule> {
        let allow_to = &ctx.app.security.network_policy.allow_to;
        if allow_to.is_empty() {
            return Vec::new();
        }

        let dns = NetworkPolicyEgressRule {
            to: vec![NetworkPolicyPeer {
                namespace_selector: Some(LabelSelector::any()),
                pod_selector: Some(LabelSelector::label("k8s-app", "kube-dns")),
                ip_block: None,
            }],
            ports: vec![
                NetworkPolicyPort::udp(DNS_PORT),
                NetworkPolicyPort::tcp(DNS_PORT),
            ],
        };

        std::iter::once(dns)
            .chain(allow_to.iter().map(|rule| NetworkPolicyEgressRule {
                to: vec![Self::peer(rule)],
                ports: Self::ports(rule),
            }))
            .collect()
    }
}

impl ManifestGenerator for NetworkPolicyGenerator {
    fn name(&self) -> &'static str {
        "network-policy"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.app.security.network_policy.enabled
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let egress = Self::egress_rules(ctx);
        let mut policy_types = vec!["Ingress".to_string()];
        if !egress.is_empty() {
            policy_types.push("Egress".to_string());
        }

        let policy = NetworkPolicy::new(
            ctx.metadata(ctx.naming.object("policy"))
                .with_label(LABEL_VISIBILITY, ctx.app.security.visibility.as_str()),
            NetworkPolicySpec {
                pod_selector: LabelSelector::matching(ctx.naming.selector_labels()),
                policy_types,
                ingress: Self::ingress_rules(ctx),
                egress,
            },
        );
        vec![policy.into()]
    }
}
