//! Shared gateway generators
//!
//! The `gateway` section publishes paths on the environment's domain and
//! forwards them to in-cluster services, independently of any app entry.
//! Each gateway route compiles into the same [`Route`] the app ingress
//! generators render, so host matching, TLS and Host rewriting behave the
//! same way; the backends add the gateway-only policies (rate limit, CORS,
//! basic auth, method filtering).
//!
//! - **HAProxy**: one `Ingress` per route, in the controller namespace
//! - **Traefik**: one `IngressRoute` for every route plus per-route
//!   `Middleware`s and a shared CORS `Middleware`
//!
//! Every route gets an ExternalName Service `gateway-<route>` so each route
//! keeps its own backend: the interceptor for scale-to-zero services,
//! otherwise the target Service's cluster DNS name.

pub mod haproxy;
pub mod traefik;

use stackgen_common::k8s::apps::{Service, ServicePort};
use stackgen_common::k8s::Manifest;
use stackgen_common::kube_utils::{suffixed_name, ObjectMeta};
use stackgen_common::{LABEL_ENVIRONMENT, LABEL_GATEWAY_ROUTE, LABEL_NAME, LABEL_PART_OF};
use stackgen_config::gateway::GATEWAY_SECTION;
use stackgen_config::model::PathType;
use stackgen_config::{EnvironmentProfile, GatewayConfig, GatewayRoute, IngressBackend};

use crate::error::GenerateError;
use crate::ingress::route::{INTERCEPTOR_HOST, INTERCEPTOR_PORT};
use crate::ingress::{Route, RouteTarget, RouteTls};
use crate::Result;

pub use haproxy::HaproxyGateway;
pub use traefik::TraefikGateway;

/// Produces the gateway objects for one backend
pub trait GatewayGenerator {
    /// Manifests for every route in `ctx`
    fn generate(&self, ctx: &GatewayContext<'_>) -> Vec<Manifest>;
}

/// The gateway section resolved against one environment
pub struct GatewayContext<'a> {
    /// Gateway section
    pub gateway: &'a GatewayConfig,
    /// Target environment profile
    pub profile: &'a EnvironmentProfile,
    /// Environment name
    pub env: &'a str,
    /// Backend rendering the gateway
    pub backend: IngressBackend,
    /// Namespace of the gateway objects
    pub namespace: String,
    /// Namespace of services referenced without one
    pub service_namespace: &'a str,
}

impl<'a> GatewayContext<'a> {
    /// Resolve backend and namespace for `profile`
    pub fn new(
        gateway: &'a GatewayConfig,
        profile: &'a EnvironmentProfile,
        env: &'a str,
        service_namespace: &'a str,
    ) -> Self {
        let backend = gateway.backend(profile);
        Self {
            gateway,
            profile,
            env,
            backend,
            namespace: gateway.namespace(backend, service_namespace),
            service_namespace,
        }
    }

    /// Metadata in the gateway namespace, labelled with the route when given
    pub fn metadata(&self, name: impl Into<String>, route: Option<&GatewayRoute>) -> ObjectMeta {
        let meta = ObjectMeta::new(name, &self.namespace)
            .with_label(LABEL_NAME, GATEWAY_SECTION)
            .with_label(LABEL_PART_OF, GATEWAY_SECTION)
            .with_label(LABEL_ENVIRONMENT, self.env);
        match route {
            Some(route) => meta.with_label(LABEL_GATEWAY_ROUTE, route.name()),
            None => meta,
        }
    }

    /// Hosts the gateway answers on
    pub fn hosts(&self) -> Vec<String> {
        if self.gateway.hosts.is_empty() {
            vec![self.profile.domain.clone()]
        } else {
            self.gateway.hosts.clone()
        }
    }

    /// TLS at the edge: the section's setting, else the environment default
    pub fn tls(&self) -> Option<RouteTls> {
        let hosts = self.hosts();
        let default_secret = || suffixed_name(GATEWAY_SECTION, "tls");
        match &self.gateway.tls {
            Some(tls) if tls.enabled => Some(RouteTls {
                secret: tls.secret.clone().unwrap_or_else(default_secret),
                hosts: if tls.hosts.is_empty() { hosts } else { tls.hosts.clone() },
            }),
            Some(_) => None,
            None if self.profile.tls => Some(RouteTls {
                secret: self.profile.tls_secret.clone().unwrap_or_else(default_secret),
                hosts,
            }),
            None => None,
        }
    }

    /// Host header the interceptor routes on: `<service>.<namespace>`
    pub fn routing_host(&self, route: &GatewayRoute) -> String {
        format!(
            "{}.{}",
            route.service_name(),
            route.service_namespace(self.service_namespace)
        )
    }

    /// Backend-independent route for a gateway route
    pub fn route(&self, route: &GatewayRoute) -> Route {
        let target = if route.interceptor {
            RouteTarget::Interceptor {
                name: route.object_name(),
                host: self.routing_host(route),
            }
        } else {
            RouteTarget::Service {
                name: route.object_name(),
                port: route.port,
            }
        };

        Route {
            hosts: self.hosts(),
            path: route.path.clone(),
            path_type: PathType::Prefix,
            strip_prefix: route.rewrites_path(),
            rewrite_to: route.rewrite_to.clone(),
            tls: self.tls(),
            target,
            annotations: Default::default(),
        }
    }

    /// ExternalName Service `gateway-<route>` the edge forwards to
    pub fn route_service(&self, route: &GatewayRoute) -> Service {
        let (external_name, port) = if route.interceptor {
            (INTERCEPTOR_HOST.to_string(), INTERCEPTOR_PORT)
        } else {
            (
                format!("{}.svc.cluster.local", self.routing_host(route)),
                route.port,
            )
        };

        Service::external_name(
            self.metadata(route.object_name(), Some(route)),
            external_name,
            vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port: Some(port),
                protocol: Some("TCP".to_string()),
            }],
        )
    }
}

/// Gateway generator for the context's backend.
///
/// Fails when the environment does not host the backend.
pub fn select(ctx: &GatewayContext<'_>) -> Result<Box<dyn GatewayGenerator>> {
    if !ctx.profile.supports_ingress(ctx.backend) {
        return Err(GenerateError::unsupported(
            GATEWAY_SECTION,
            "gateway.class",
            format!(
                "{} ingress is not available in environment '{}'",
                ctx.backend, ctx.profile.name
            ),
        ));
    }

    Ok(match ctx.backend {
        IngressBackend::Traefik => Box::new(TraefikGateway),
        IngressBackend::Haproxy => Box::new(HaproxyGateway),
    })
}

/// Every gateway object for the environment in `ctx`
pub fn generate(ctx: &GatewayContext<'_>) -> Result<Vec<Manifest>> {
    Ok(select(ctx)?.generate(ctx))
}

#[cfg(test)]
mod tests {
    use stackgen_config::model::TlsConfig;

    use super::*;

    fn gateway(yaml: &str) -> GatewayConfig {
        serde_yaml::from_str(yaml).expect("valid gateway yaml")
    }

    const ROUTES: &str = "routes:\n  - path: /api/users\n    service: users.team\n    strip_prefix: true\n  - path: /static\n    service: web\n    port: 8080\n    interceptor: false\n";

    // =========================================================================
    // Story: Routes resolve against the environment
    // =========================================================================

    #[test]
    fn test_routes_default_to_environment_domain() {
        let gateway = gateway(ROUTES);
        let profile = EnvironmentProfile::dev();
        let ctx = GatewayContext::new(&gateway, &profile, "dev", "apps");

        let route = ctx.route(&gateway.routes[0]);
        assert_eq!(route.hosts, vec![profile.domain.clone()]);
        assert_eq!(route.backend(), ("gateway-api-users", INTERCEPTOR_PORT));
        assert_eq!(route.rewrite_host(), Some("users.team"));
        assert!(route.strip_prefix);
        assert!(route.tls.is_none());
    }

    #[test]
    fn test_direct_route_targets_service_dns() {
        let gateway = gateway(ROUTES);
        let profile = EnvironmentProfile::dev();
        let ctx = GatewayContext::new(&gateway, &profile, "dev", "apps");

        let route = ctx.route(&gateway.routes[1]);
        assert_eq!(route.backend(), ("gateway-static", 8080));
        assert_eq!(route.rewrite_host(), None);

        let service = serde_json::to_value(ctx.route_service(&gateway.routes[1])).expect("serializable");
        assert_eq!(service["spec"]["externalName"], "web.apps.svc.cluster.local");
        assert_eq!(service["spec"]["ports"][0]["port"], 8080);
        assert_eq!(service["metadata"]["labels"][LABEL_GATEWAY_ROUTE], "static");
        assert_eq!(service["metadata"]["namespace"], "apps");
    }

    #[test]
    fn test_tls_follows_section_then_profile() {
        let mut profile = EnvironmentProfile::gcp();
        profile.tls = true;
        profile.tls_secret = Some("wildcard-tls".to_string());

        let inherited = gateway(ROUTES);
        let ctx = GatewayContext::new(&inherited, &profile, "gcp", "apps");
        assert_eq!(ctx.tls().expect("profile tls").secret, "wildcard-tls");
        assert_eq!(ctx.namespace, "haproxy-ingress");

        let mut own = gateway(ROUTES);
        own.hosts = vec!["api.example.com".to_string()];
        own.tls = Some(TlsConfig {
            enabled: true,
            secret: None,
            hosts: Vec::new(),
        });
        let ctx = GatewayContext::new(&own, &profile, "gcp", "apps");
        let tls = ctx.tls().expect("section tls");
        assert_eq!(tls.secret, "gateway-tls");
        assert_eq!(tls.hosts, vec!["api.example.com".to_string()]);
    }

    // =========================================================================
    // Story: Backend follows class or environment default
    // =========================================================================

    #[test]
    fn test_unavailable_backend_is_unsupported() {
        let mut gateway = gateway(ROUTES);
        gateway.class = Some(IngressBackend::Haproxy);
        let profile = EnvironmentProfile::local();
        let ctx = GatewayContext::new(&gateway, &profile, "local", "apps");
        match generate(&ctx) {
            Err(GenerateError::UnsupportedCombination { app, field, .. }) => {
                assert_eq!(app, "gateway");
                assert_eq!(field, "gateway.class");
            }
            other => panic!("expected unsupported backend, got {other:?}"),
        }
    }

    #[test]
    fn test_backend_picks_object_kinds() {
        let gateway = gateway(ROUTES);
        let gcp = EnvironmentProfile::gcp();
        let kinds: Vec<String> = generate(&GatewayContext::new(&gateway, &gcp, "gcp", "apps"))
            .expect("haproxy available")
            .iter()
            .map(|m| m.kind().to_string())
            .collect();
        assert_eq!(kinds, vec!["Service", "Ingress", "Service", "Ingress"]);

        let local = EnvironmentProfile::local();
        let manifests = generate(&GatewayContext::new(&gateway, &local, "local", "apps"))
            .expect("traefik available");
        assert_eq!(manifests.last().map(|m| m.kind()), Some("IngressRoute"));
    }
}
