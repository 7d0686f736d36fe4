//! Traefik backend: IngressRoute plus Middlewares

use std::collections::BTreeMap;

use stackgen_common::k8s::traefik::{
    IngressRoute, IngressRouteSpec, Middleware, MiddlewareRef, TraefikRoute, TraefikService,
    TraefikTls,
};
use stackgen_common::k8s::Manifest;
use stackgen_common::LABEL_INGRESS;
use stackgen_config::model::PathType;
use stackgen_config::IngressBackend;

use super::route::{interceptor_service, Route};
use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;

/// Traefik IngressRoute `<n>`, with `<n>-host-rewrite` and `<n>-strip-prefix`
/// Middlewares as the route needs them
pub struct TraefikIngress;

impl TraefikIngress {
    /// Host and path rule; `Prefix` matches whole path segments
    pub(crate) fn match_expression(route: &Route) -> String {
        let path = match route.path_type {
            PathType::Exact => format!("Path(`{}`)", route.path),
            PathType::Prefix => match route.strip_path() {
                "" => "PathPrefix(`/`)".to_string(),
                prefix => format!("PathRegexp(`^{}(/|$)`)", escape_regex(prefix)),
            },
            PathType::ImplementationSpecific => format!("PathPrefix(`{}`)", route.path),
        };

        let hosts: Vec<String> = route
            .hosts
            .iter()
            .map(|host| format!("Host(`{}`)", host))
            .collect();

        match hosts.len() {
            0 => path,
            1 => format!("{} && {}", hosts[0], path),
            _ => format!("({}) && {}", hosts.join(" || "), path),
        }
    }
}

pub(crate) fn escape_regex(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl ManifestGenerator for TraefikIngress {
    fn name(&self) -> &'static str {
        "ingress"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.app.ingress.enabled
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let route = Route::compile(ctx);
        let mut manifests: Vec<Manifest> = Vec::new();
        let mut middlewares = Vec::new();

        if let Some(host) = route.rewrite_host() {
            let name = ctx.naming.object("host-rewrite");
            let mut headers = BTreeMap::new();
            headers.insert("Host".to_string(), host.to_string());
            manifests.push(Middleware::request_headers(ctx.metadata(name.clone()), headers).into());
            middlewares.push(MiddlewareRef { name });
        }

        if route.strip_prefix {
            let name = ctx.naming.object("strip-prefix");
            manifests.push(
                Middleware::strip_prefix(
                    ctx.metadata(name.clone()),
                    vec![route.strip_path().to_string()],
                )
                .into(),
            );
            middlewares.push(MiddlewareRef { name });
        }

        if let Some(service) = interceptor_service(ctx, &route) {
            manifests.push(service.into());
        }

        let (backend, port) = route.backend();
        let ingress_route = IngressRoute::new(
            ctx.metadata(ctx.name())
                .with_label(LABEL_INGRESS, IngressBackend::Traefik.as_str())
                .with_annotations(&route.annotations),
            IngressRouteSpec {
                entry_points: vec!["web".to_string(), "websecure".to_string()],
                routes: vec![TraefikRoute {
                    kind: "Rule".to_string(),
                    match_: Self::match_expression(&route),
                    middlewares,
                    services: vec![TraefikService {
                        name: backend.to_string(),
                        port,
                    }],
                }],
                tls: route.tls.as_ref().map(|tls| TraefikTls {
                    secret_name: Some(tls.secret.clone()),
                }),
            },
        );
        manifests.push(ingress_route.into());
        manifests
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use stackgen_config::model::ScalingKind;
    use stackgen_config::{AppSpec, EnvironmentProfile};

    use super::*;

    fn make_app(name: &str) -> AppSpec {
        let mut app = AppSpec::new(name, format!("services/{}", name));
        app.ingress.enabled = true;
        app
    }

    fn generate(app: &AppSpec) -> Vec<serde_json::Value> {
        let profile = EnvironmentProfile::local();
        let ctx = GenerationContext::new(app, &profile, "local").expect("valid context");
        assert!(TraefikIngress.should_generate(&ctx));
        TraefikIngress
            .generate(&ctx)
            .iter()
            .map(|m| m.to_value().expect("serializable"))
            .collect()
    }

    fn find<'a>(manifests: &'a [serde_json::Value], kind: &str, name: &str) -> &'a serde_json::Value {
        manifests
            .iter()
            .find(|m| m["kind"] == kind && m["metadata"]["name"] == name)
            .unwrap_or_else(|| panic!("missing {}/{}", kind, name))
    }

    // =========================================================================
    // Story: Match expressions combine hosts and path
    // =========================================================================

    #[test]
    fn test_match_with_several_hosts() {
        let mut app = make_app("api");
        app.ingress.path = "/api".to_string();
        app.ingress.hosts = vec!["a.example.com".to_string(), "b.example.com".to_string()];
        let manifests = generate(&app);
        let route = find(&manifests, "IngressRoute", "api");
        assert_eq!(
            route["spec"]["routes"][0]["match"],
            "(Host(`a.example.com`) || Host(`b.example.com`)) && PathRegexp(`^/api(/|$)`)"
        );
        assert_eq!(route["spec"]["entryPoints"], serde_json::json!(["web", "websecure"]));
        assert_eq!(route["metadata"]["labels"][LABEL_INGRESS], "traefik");
    }

    #[test]
    fn test_exact_path_uses_path_matcher() {
        let mut app = make_app("api");
        app.ingress.path = "/hook".to_string();
        app.ingress.path_type = PathType::Exact;
        let manifests = generate(&app);
        let route = find(&manifests, "IngressRoute", "api");
        assert_eq!(
            route["spec"]["routes"][0]["match"],
            "Host(`api.localhost`) && Path(`/hook`)"
        );
    }

    #[rstest]
    #[case(PathType::Prefix, "/", "PathPrefix(`/`)")]
    #[case(PathType::Prefix, "/api/", "PathRegexp(`^/api(/|$)`)")]
    #[case(PathType::Prefix, "/v1.0/items", "PathRegexp(`^/v1\\.0/items(/|$)`)")]
    #[case(PathType::ImplementationSpecific, "/api", "PathPrefix(`/api`)")]
    fn test_prefix_matches_whole_segments(
        #[case] path_type: PathType,
        #[case] path: &str,
        #[case] expected: &str,
    ) {
        let mut app = make_app("api");
        app.ingress.hosts = vec!["api.example.com".to_string()];
        app.ingress.path = path.to_string();
        app.ingress.path_type = path_type;
        let manifests = generate(&app);
        let route = find(&manifests, "IngressRoute", "api");
        assert_eq!(
            route["spec"]["routes"][0]["match"],
            format!("Host(`api.example.com`) && {}", expected)
        );
    }

    // =========================================================================
    // Story: Middlewares follow the routing target
    // =========================================================================

    #[test]
    fn test_interceptor_route_rewrites_host() {
        let manifests = generate(&make_app("api"));
        let middleware = find(&manifests, "Middleware", "api-host-rewrite");
        assert_eq!(
            middleware["spec"]["headers"]["customRequestHeaders"]["Host"],
            "api.apps"
        );
        find(&manifests, "Service", "api-interceptor");

        let route = find(&manifests, "IngressRoute", "api");
        let rule = &route["spec"]["routes"][0];
        assert_eq!(rule["middlewares"][0]["name"], "api-host-rewrite");
        assert_eq!(rule["services"][0]["name"], "api-interceptor");
        assert_eq!(rule["services"][0]["port"], 8080);
    }

    #[test]
    fn test_direct_route_with_strip_prefix() {
        let mut app = make_app("api");
        app.scaling.kind = ScalingKind::None;
        app.ingress.path = "/api".to_string();
        app.ingress.strip_prefix = true;
        let manifests = generate(&app);

        assert!(!manifests.iter().any(|m| m["metadata"]["name"] == "api-host-rewrite"));
        let strip = find(&manifests, "Middleware", "api-strip-prefix");
        assert_eq!(strip["spec"]["stripPrefix"]["prefixes"][0], "/api");

        let rule = &find(&manifests, "IngressRoute", "api")["spec"]["routes"][0];
        assert_eq!(rule["middlewares"][0]["name"], "api-strip-prefix");
        assert_eq!(rule["services"][0]["name"], "api");
        assert_eq!(rule["services"][0]["port"], 80);
    }

    #[test]
    fn test_annotation_overlay_is_applied() {
        let mut app = make_app("api");
        app.ingress
            .annotations
            .insert("traefik.ingress.kubernetes.io/priority".to_string(), "10".to_string());
        let manifests = generate(&app);
        let route = find(&manifests, "IngressRoute", "api");
        assert_eq!(
            route["metadata"]["annotations"]["traefik.ingress.kubernetes.io/priority"],
            "10"
        );
    }
}
