//! Ingress generators
//!
//! One generator per controller flavor. Both render the shared [`Route`], so
//! "requests to `path` reach the app" holds whichever controller the
//! environment runs; only the object kinds and proxy tuning differ.
//!
//! - **Traefik**: `IngressRoute` plus `Middleware`s for Host rewrite and
//!   prefix stripping
//! - **HAProxy**: `networking.k8s.io/v1` `Ingress` with haproxy-ingress
//!   annotations
//!
//! Apps scaled on request rate are routed through the KEDA interceptor; the
//! ExternalName Service for that hop is emitted alongside the route.

pub mod haproxy;
pub mod route;
pub mod traefik;

use stackgen_config::IngressBackend;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;
use crate::Result;

pub use haproxy::HaproxyIngress;
pub use route::{Route, RouteTarget, RouteTls};
pub use traefik::TraefikIngress;

/// Backend serving the app: `ingress.class`, else the environment default
pub fn backend(ctx: &GenerationContext<'_>) -> IngressBackend {
    ctx.app.ingress.class.unwrap_or(ctx.profile.ingress)
}

/// Ingress generator for the app.
///
/// Fails when the app is exposed through a backend the environment does not
/// host.
pub fn select(ctx: &GenerationContext<'_>) -> Result<Box<dyn ManifestGenerator>> {
    let backend = backend(ctx);
    if ctx.app.ingress.enabled && !ctx.profile.supports_ingress(backend) {
        return Err(ctx.unsupported(
            "ingress.class",
            format!(
                "{} ingress is not available in environment '{}'",
                backend, ctx.profile.name
            ),
        ));
    }

    Ok(match backend {
        IngressBackend::Traefik => Box::new(TraefikIngress),
        IngressBackend::Haproxy => Box::new(HaproxyIngress),
    })
}
