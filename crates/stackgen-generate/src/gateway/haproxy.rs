//! HAProxy gateway: one Ingress per route, tuned with haproxy-ingress
//! annotations

use stackgen_common::k8s::Manifest;
use stackgen_config::gateway::CorsConfig;
use stackgen_config::GatewayRoute;

use super::{GatewayContext, GatewayGenerator};
use crate::ingress::haproxy::{annotation, HaproxyIngress};

/// Service and Ingress `gateway-<route>` for every route
pub struct HaproxyGateway;

impl HaproxyGateway {
    fn ingress(ctx: &GatewayContext<'_>, route: &GatewayRoute) -> Manifest {
        let compiled = ctx.route(route);
        let mut annotations = HaproxyIngress::annotations(&route.timeouts, &compiled);

        if !route.methods.is_empty() {
            annotations
                .entry(annotation("config-backend"))
                .or_default()
                .push_str(&format!(
                    "http-request deny deny_status 405 if !{{ method {} }}\n",
                    route.methods.join(" ")
                ));
        }

        if let Some(limit) = ctx.gateway.rate_limit_for(route) {
            annotations.insert(annotation("limit-rps"), limit.requests_per_second.to_string());
            annotations.insert(annotation("limit-connections"), limit.burst.to_string());
        }

        if let Some(secret) = route.basic_auth_secret() {
            annotations.insert(annotation("auth-type"), "basic".to_string());
            annotations.insert(annotation("auth-secret"), secret);
        }

        let cors = &ctx.gateway.cors;
        if cors.enabled {
            for (key, value) in cors_annotations(cors) {
                annotations.insert(annotation(key), value);
            }
        }

        HaproxyIngress::ingress(
            ctx.metadata(route.object_name(), Some(route))
                .with_annotations(&annotations),
            &compiled,
        )
        .into()
    }
}

fn cors_annotations(cors: &CorsConfig) -> Vec<(&'static str, String)> {
    let mut annotations = vec![
        ("cors-enable", "true".to_string()),
        ("cors-allow-origin", cors.allow_origins.join(",")),
        ("cors-allow-methods", cors.allow_methods.join(",")),
        ("cors-allow-headers", cors.allow_headers.join(",")),
    ];
    if !cors.expose_headers.is_empty() {
        annotations.push(("cors-expose-headers", cors.expose_headers.join(",")));
    }
    if let Some(max_age) = cors.max_age {
        annotations.push(("cors-max-age", max_age.to_string()));
    }
    annotations
}

impl GatewayGenerator for HaproxyGateway {
    fn generate(&self, ctx: &GatewayContext<'_>) -> Vec<Manifest> {
        ctx.gateway
            .routes
            .iter()
            .flat_map(|route| [Manifest::from(ctx.route_service(route)), Self::ingress(ctx, route)])
            .collect()
    }
}
