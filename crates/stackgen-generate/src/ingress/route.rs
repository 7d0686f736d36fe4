//! Backend-independent route model
//!
//! Both ingress backends render the same [`Route`]: which hosts and path reach
//! the app, whether TLS terminates at the edge, and where traffic lands. Apps
//! that scale to zero cannot be reached through their own Service while no
//! pod runs, so their traffic goes through the KEDA HTTP interceptor with the
//! Host header rewritten to the routing host the HTTPScaledObject claims.

use std::collections::BTreeMap;

use stackgen_common::k8s::apps::{Service, ServicePort};
use stackgen_config::model::{PathType, INTERCEPTOR_SUFFIX};
use stackgen_config::ScalingPolicy;

use crate::context::GenerationContext;

/// In-cluster address of the KEDA HTTP interceptor proxy
pub const INTERCEPTOR_HOST: &str = "keda-add-ons-http-interceptor-proxy.keda.svc.cluster.local";

/// Port the interceptor proxy listens on
pub const INTERCEPTOR_PORT: u16 = 8080;

/// Host header the interceptor routes on: `<n>.<namespace>`
pub fn routing_host(ctx: &GenerationContext<'_>) -> String {
    format!("{}.{}", ctx.name(), ctx.namespace())
}

/// Where the edge forwards matched requests
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteTarget {
    /// The app's own Service
    Service {
        /// Service name
        name: String,
        /// Service port
        port: u16,
    },
    /// The interceptor indirection Service, with the Host rewritten
    Interceptor {
        /// ExternalName Service in the app namespace
        name: String,
        /// Host header the interceptor expects
        host: String,
    },
}

/// TLS termination at the edge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTls {
    /// Certificate secret
    pub secret: String,
    /// Hosts covered by the certificate
    pub hosts: Vec<String>,
}

/// Everything an ingress backend needs to expose the app
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    /// Hosts matched, never empty
    pub hosts: Vec<String>,
    /// Request path
    pub path: String,
    /// Path matching mode
    pub path_type: PathType,
    /// Remove `path` before forwarding
    pub strip_prefix: bool,
    /// Prefix that replaces `path` when stripping (default `/`)
    pub rewrite_to: Option<String>,
    /// TLS, if terminated
    pub tls: Option<RouteTls>,
    /// Forwarding target
    pub target: RouteTarget,
    /// User annotations (policy then override), applied last
    pub annotations: BTreeMap<String, String>,
}

impl Route {
    /// Build the route for the workload in `ctx`
    pub fn compile(ctx: &GenerationContext<'_>) -> Self {
        let ingress = &ctx.app.ingress;

        let hosts = if ingress.hosts.is_empty() {
            vec![format!("{}.{}", ctx.name(), ctx.profile.domain)]
        } else {
            ingress.hosts.clone()
        };

        let tls = match &ingress.tls {
            Some(tls) if tls.enabled => Some(RouteTls {
                secret: tls
                    .secret
                    .clone()
                    .unwrap_or_else(|| ctx.naming.object("tls")),
                hosts: if tls.hosts.is_empty() {
                    hosts.clone()
                } else {
                    tls.hosts.clone()
                },
            }),
            Some(_) => None,
            None if ctx.profile.tls => Some(RouteTls {
                secret: ctx
                    .profile
                    .tls_secret
                    .clone()
                    .unwrap_or_else(|| ctx.naming.object("tls")),
                hosts: hosts.clone(),
            }),
            None => None,
        };

        let target = match ctx.scaling {
            ScalingPolicy::RequestRate(_) => RouteTarget::Interceptor {
                name: ctx.naming.object(INTERCEPTOR_SUFFIX),
                host: routing_host(ctx),
            },
            _ => RouteTarget::Service {
                name: ctx.name().to_string(),
                port: ctx.primary_port().service_port,
            },
        };

        Self {
            hosts,
            path: ingress.path.clone(),
            path_type: ingress.path_type,
            strip_prefix: ingress.strips_prefix(),
            rewrite_to: None,
            tls,
            target,
            annotations: ingress.annotations.clone(),
        }
    }

    /// Service name and port the edge sends traffic to
    pub fn backend(&self) -> (&str, u16) {
        match &self.target {
            RouteTarget::Service { name, port } => (name, *port),
            RouteTarget::Interceptor { name, .. } => (name, INTERCEPTOR_PORT),
        }
    }

    /// Host header to set on forwarded requests, when routing via the interceptor
    pub fn rewrite_host(&self) -> Option<&str> {
        match &self.target {
            RouteTarget::Interceptor { host, .. } => Some(host),
            RouteTarget::Service { .. } => None,
        }
    }

    /// `path` without a trailing slash, as stripped from forwarded requests
    pub fn strip_path(&self) -> &str {
        self.path.trim_end_matches('/')
    }

    /// Prefix put in place of `path` without its trailing slash; empty for `/`
    pub fn rewrite_prefix(&self) -> &str {
        self.rewrite_to
            .as_deref()
            .unwrap_or("/")
            .trim_end_matches('/')
    }
}

/// ExternalName Service pointing at the interceptor, when the route needs one
pub fn interceptor_service(ctx: &GenerationContext<'_>, route: &Route) -> Option<Service> {
    let RouteTarget::Interceptor { name, .. } = &route.target else {
        return None;
    };

    Some(Service::external_name(
        ctx.metadata(name.clone()),
        INTERCEPTOR_HOST,
        vec![ServicePort {
            name: Some("http".to_string()),
            port: INTERCEPTOR_PORT,
            target_port: Some(INTERCEPTOR_PORT),
            protocol: Some("TCP".to_string()),
        }],
    ))
}

#[cfg(test)]
mod tests {
    use stackgen_config::model::{ScalingKind, TlsConfig};
    use stackgen_config::{AppSpec, EnvironmentProfile};

    use super::*;

    fn make_app(name: &str) -> AppSpec {
        let mut app = AppSpec::new(name, format!("services/{}", name));
        app.ingress.enabled = true;
        app
    }

    fn compile(app: &AppSpec, profile: &EnvironmentProfile) -> Route {
        let ctx = GenerationContext::new(app, profile, &profile.name).expect("valid context");
        Route::compile(&ctx)
    }

    // =========================================================================
    // Story: Hosts and TLS fall back to environment defaults
    // =========================================================================

    #[test]
    fn test_hosts_default_to_profile_domain() {
        let route = compile(&make_app("api"), &EnvironmentProfile::dev());
        assert_eq!(route.hosts, vec!["api.localhost".to_string()]);
        assert!(route.tls.is_none());
    }

    #[test]
    fn test_policy_tls_defaults_secret_and_hosts() {
        let mut app = make_app("api");
        app.ingress.hosts = vec!["api.example.com".to_string()];
        app.ingress.tls = Some(TlsConfig {
            enabled: true,
            secret: None,
            hosts: Vec::new(),
        });
        let route = compile(&app, &EnvironmentProfile::dev());
        let tls = route.tls.expect("tls enabled");
        assert_eq!(tls.secret, "api-tls");
        assert_eq!(tls.hosts, vec!["api.example.com".to_string()]);
    }

    #[test]
    fn test_profile_tls_applies_when_policy_silent() {
        let mut profile = EnvironmentProfile::dev();
        profile.tls = true;
        profile.tls_secret = Some("wildcard-tls".to_string());
        let route = compile(&make_app("api"), &profile);
        assert_eq!(route.tls.expect("profile tls").secret, "wildcard-tls");

        let mut app = make_app("api");
        app.ingress.tls = Some(TlsConfig {
            enabled: false,
            secret: None,
            hosts: Vec::new(),
        });
        assert!(compile(&app, &profile).tls.is_none());
    }

    // =========================================================================
    // Story: Scale-to-zero apps route through the interceptor
    // =========================================================================

    #[test]
    fn test_request_rate_routes_via_interceptor() {
        let profile = EnvironmentProfile::dev();
        let app = make_app("api");
        let ctx = GenerationContext::new(&app, &profile, "dev").expect("valid context");
        let route = Route::compile(&ctx);

        assert_eq!(route.backend(), ("api-interceptor", 8080));
        assert_eq!(route.rewrite_host(), Some("api.apps"));

        let service = interceptor_service(&ctx, &route).expect("interceptor service");
        let value = serde_json::to_value(&service).expect("serializable");
        assert_eq!(value["spec"]["type"], "ExternalName");
        assert_eq!(value["spec"]["externalName"], INTERCEPTOR_HOST);
        assert_eq!(value["spec"]["ports"][0]["targetPort"], 8080);
    }

    #[test]
    fn test_other_scaling_routes_to_app_service() {
        let profile = EnvironmentProfile::dev();
        let mut app = make_app("api");
        app.scaling.kind = ScalingKind::FixedReplicaAutoscale;
        let ctx = GenerationContext::new(&app, &profile, "dev").expect("valid context");
        let route = Route::compile(&ctx);

        assert_eq!(route.backend(), ("api", 80));
        assert_eq!(route.rewrite_host(), None);
        assert!(interceptor_service(&ctx, &route).is_none());
    }

    #[test]
    fn test_strip_path_trims_trailing_slash() {
        let mut app = make_app("api");
        app.ingress.path = "/api/".to_string();
        app.ingress.strip_prefix = true;
        let route = compile(&app, &EnvironmentProfile::dev());
        assert!(route.strip_prefix);
        assert_eq!(route.strip_path(), "/api");
        assert_eq!(route.rewrite_prefix(), "");
    }
}
