//! Traefik gateway: one IngressRoute `gateway` with a rule per route, plus
//! per-route Middlewares and the shared `gateway-cors` Middleware

use std::collections::BTreeMap;

use stackgen_common::k8s::traefik::{
    HeadersMiddleware, IngressRoute, IngressRouteSpec, Middleware, MiddlewareRef, TraefikRoute,
    TraefikService, TraefikTls,
};
use stackgen_common::k8s::Manifest;
use stackgen_common::kube_utils::suffixed_name;
use stackgen_common::LABEL_INGRESS;
use stackgen_config::gateway::GATEWAY_SECTION;
use stackgen_config::{GatewayRoute, IngressBackend};

use super::{GatewayContext, GatewayGenerator};
use crate::ingress::traefik::{escape_regex, TraefikIngress};
use crate::ingress::Route;

/// Traefik gateway objects
pub struct TraefikGateway;

impl TraefikGateway {
    fn cors(ctx: &GatewayContext<'_>) -> Option<Middleware> {
        let cors = &ctx.gateway.cors;
        if !cors.enabled {
            return None;
        }
        Some(Middleware::cors(
            ctx.metadata(suffixed_name(GATEWAY_SECTION, "cors"), None),
            HeadersMiddleware {
                access_control_allow_methods: cors.allow_methods.clone(),
                access_control_allow_headers: cors.allow_headers.clone(),
                access_control_allow_origin_list: cors.allow_origins.clone(),
                access_control_expose_headers: cors.expose_headers.clone(),
                access_control_max_age: cors.max_age,
                add_vary_header: true,
                ..Default::default()
            },
        ))
    }

    /// Middlewares for one route, in the order they apply
    fn middlewares(
        ctx: &GatewayContext<'_>,
        route: &GatewayRoute,
        compiled: &Route,
    ) -> Vec<Middleware> {
        let base = route.object_name();
        let meta = |suffix: &str| ctx.metadata(suffixed_name(&base, suffix), Some(route));
        let mut middlewares = Vec::new();

        if let Some(limit) = ctx.gateway.rate_limit_for(route) {
            middlewares.push(Middleware::rate_limit(
                meta("ratelimit"),
                limit.requests_per_second,
                limit.burst,
            ));
        }

        if let Some(secret) = route.basic_auth_secret() {
            middlewares.push(Middleware::basic_auth(meta("basicauth"), secret));
        }

        if let Some(host) = compiled.rewrite_host() {
            let mut headers = BTreeMap::new();
            headers.insert("Host".to_string(), host.to_string());
            middlewares.push(Middleware::request_headers(meta("host-rewrite"), headers));
        }

        if compiled.strip_prefix {
            middlewares.push(match &compiled.rewrite_to {
                Some(_) => Middleware::replace_path_regex(
                    meta("replace-path"),
                    format!("^{}(/|$)(.*)", escape_regex(compiled.strip_path())),
                    format!("{}/$2", compiled.rewrite_prefix()),
                ),
                None => Middleware::strip_prefix(
                    meta("strip-prefix"),
                    vec![compiled.strip_path().to_string()],
                ),
            });
        }

        middlewares
    }

    fn match_expression(route: &GatewayRoute, compiled: &Route) -> String {
        let expression = TraefikIngress::match_expression(compiled);
        let methods: Vec<String> = route
            .methods
            .iter()
            .map(|method| format!("Method(`{}`)", method))
            .collect();
        match methods.len() {
            0 => expression,
            1 => format!("{} && {}", expression, methods[0]),
            _ => format!("{} && ({})", expression, methods.join(" || ")),
        }
    }
}

impl GatewayGenerator for TraefikGateway {
    fn generate(&self, ctx: &GatewayContext<'_>) -> Vec<Manifest> {
        let mut manifests: Vec<Manifest> = Vec::new();
        let mut shared = Vec::new();

        if let Some(cors) = Self::cors(ctx) {
            shared.push(MiddlewareRef {
                name: cors.metadata.name.clone(),
            });
            manifests.push(cors.into());
        }

        let mut rules = Vec::with_capacity(ctx.gateway.routes.len());
        for route in &ctx.gateway.routes {
            let compiled = ctx.route(route);
            manifests.push(ctx.route_service(route).into());

            let mut middlewares = shared.clone();
            for middleware in Self::middlewares(ctx, route, &compiled) {
                middlewares.push(MiddlewareRef {
                    name: middleware.metadata.name.clone(),
                });
                manifests.push(middleware.into());
            }

            let (backend, port) = compiled.backend();
            rules.push(TraefikRoute {
                kind: "Rule".to_string(),
                match_: Self::match_expression(route, &compiled),
                middlewares,
                services: vec![TraefikService {
                    name: backend.to_string(),
                    port,
                }],
            });
        }

        let ingress_route = IngressRoute::new(
            ctx.metadata(GATEWAY_SECTION, None)
                .with_label(LABEL_INGRESS, IngressBackend::Traefik.as_str()),
            IngressRouteSpec {
                entry_points: vec!["web".to_string(), "websecure".to_string()],
                routes: rules,
                tls: ctx.tls().map(|tls| TraefikTls {
                    secret_name: Some(tls.secret),
                }),
            },
        );
        manifests.push(ingress_route.into());
        manifests
    }
}
