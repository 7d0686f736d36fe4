//! Shared API gateway: the top-level `gateway` section.
//!
//! The gateway publishes paths on the environment's domain and forwards each
//! one to an in-cluster service. It is not tied to any app entry:
//!
//! ```yaml
//! gateway:
//!   cors:
//!     allow_origins: ["https://app.example.com"]
//!   routes:
//!     - path: /api/users
//!       service: users.apps
//!       strip_prefix: true
//!       methods: [GET, POST]
//!       rate_limit:
//!         requests_per_second: 20
//! ```
//!
//! Routes reach scale-to-zero services through the KEDA HTTP interceptor
//! unless `interceptor: false` sends them straight to the Service.

use std::collections::HashSet;

use serde::Deserialize;
use stackgen_common::kube_utils::{sanitize_name, suffixed_name};

use crate::compose::parse_duration;
use crate::error::ConfigError;
use crate::model::{IngressBackend, TimeoutConfig, TlsConfig};
use crate::profile::EnvironmentProfile;
use crate::Result;

/// Top-level key of the gateway section
pub const GATEWAY_SECTION: &str = "gateway";

/// Namespace the HAProxy controller watches for gateway objects
pub const HAPROXY_GATEWAY_NAMESPACE: &str = "haproxy-ingress";

/// HTTP methods a route may restrict itself to
const METHODS: [&str; 9] = [
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "CONNECT", "TRACE",
];

// =============================================================================
// GatewayConfig
// =============================================================================

/// `gateway` section
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Namespace for gateway objects (default: `haproxy-ingress` for HAProxy,
    /// the default app namespace for Traefik)
    pub namespace: Option<String>,
    /// Backend override; the environment default applies when unset
    pub class: Option<IngressBackend>,
    /// Hosts the gateway answers on (default: the environment domain)
    pub hosts: Vec<String>,
    /// TLS (environment default when unset)
    pub tls: Option<TlsConfig>,
    /// Rate limit for routes without their own
    pub rate_limit: GatewayRateLimit,
    /// CORS policy applied to every route
    pub cors: CorsConfig,
    /// Published routes
    pub routes: Vec<GatewayRoute>,
}

impl GatewayConfig {
    /// Whether there is anything to generate
    pub fn has_routes(&self) -> bool {
        !self.routes.is_empty()
    }

    /// Backend serving the gateway in `profile`
    pub fn backend(&self, profile: &EnvironmentProfile) -> IngressBackend {
        self.class.unwrap_or(profile.ingress)
    }

    /// Namespace of the gateway objects for `backend`
    pub fn namespace(&self, backend: IngressBackend, default_namespace: &str) -> String {
        match (&self.namespace, backend) {
            (Some(namespace), _) => namespace.clone(),
            (None, IngressBackend::Haproxy) => HAPROXY_GATEWAY_NAMESPACE.to_string(),
            (None, IngressBackend::Traefik) => default_namespace.to_string(),
        }
    }

    /// Rate limit for a route: its own, else the global one when enabled
    pub fn rate_limit_for(&self, route: &GatewayRoute) -> Option<RateLimit> {
        route
            .rate_limit
            .clone()
            .or_else(|| self.rate_limit.enabled.then(|| self.rate_limit.limit()))
    }

    /// Service names the gateway claims in its namespace: the shared objects
    /// and one per route
    pub fn reserved_names(&self) -> Vec<String> {
        let mut names = vec![GATEWAY_SECTION.to_string()];
        names.extend(self.routes.iter().map(GatewayRoute::object_name));
        names
    }

    /// Validate every route; paths are relative to the section
    pub fn validate(&self) -> Result<()> {
        if let Some(namespace) = &self.namespace {
            if namespace.is_empty() || sanitize_name(namespace) != *namespace {
                return Err(ConfigError::validation(
                    "namespace",
                    format!("'{}' is not a valid namespace name", namespace),
                ));
            }
        }
        for (i, host) in self.hosts.iter().enumerate() {
            if host.trim().is_empty() || host.contains('/') || host.contains(' ') {
                return Err(ConfigError::validation(
                    format!("hosts[{}]", i),
                    format!("'{}' is not a valid hostname", host),
                ));
            }
        }
        if self.rate_limit.enabled {
            self.rate_limit
                .limit()
                .validate()
                .map_err(|e| e.within("rate_limit"))?;
        }
        self.cors.validate().map_err(|e| e.within("cors"))?;

        let mut seen = HashSet::new();
        for (i, route) in self.routes.iter().enumerate() {
            let path = format!("routes[{}]", i);
            route.validate().map_err(|e| e.within(&path))?;
            let name = route.name();
            if !seen.insert(name.clone()) {
                return Err(ConfigError::validation(
                    format!("{}.path", path),
                    format!("route name '{}' is already used by another path", name),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Routes
// =============================================================================

/// One published path
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GatewayRoute {
    /// Path prefix on the gateway hosts
    pub path: String,
    /// Target service as `name` or `name.namespace`
    pub service: String,
    /// Target service port, used when bypassing the interceptor
    #[serde(default = "default_port")]
    pub port: u16,
    /// Remove `path` before forwarding
    #[serde(default)]
    pub strip_prefix: bool,
    /// Replace `path` with this prefix before forwarding
    #[serde(default)]
    pub rewrite_to: Option<String>,
    /// Allowed methods (all when empty)
    #[serde(default)]
    pub methods: Vec<String>,
    /// Route through the KEDA HTTP interceptor
    #[serde(default = "default_true")]
    pub interceptor: bool,
    /// Proxy timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Route rate limit, over the global one
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    /// Authentication in front of the route
    #[serde(default)]
    pub auth: RouteAuth,
}

fn default_port() -> u16 {
    80
}

fn default_true() -> bool {
    true
}

impl GatewayRoute {
    /// Identifier derived from the path: `/api/users` is `api-users`, `/` is `root`
    pub fn name(&self) -> String {
        let name = sanitize_name(&self.path.trim_matches('/').replace('/', "-"));
        if name.is_empty() {
            "root".to_string()
        } else {
            name
        }
    }

    /// `gateway-<route>`
    pub fn object_name(&self) -> String {
        suffixed_name(GATEWAY_SECTION, &self.name())
    }

    /// Target service name
    pub fn service_name(&self) -> &str {
        self.service
            .split_once('.')
            .map_or(self.service.as_str(), |(name, _)| name)
    }

    /// Target service namespace, `default_namespace` when not given
    pub fn service_namespace<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.service
            .split_once('.')
            .map_or(default_namespace, |(_, namespace)| namespace)
    }

    /// Whether the path prefix is replaced before forwarding
    pub fn rewrites_path(&self) -> bool {
        self.path != "/" && (self.strip_prefix || self.rewrite_to.is_some())
    }

    /// Validate one route; paths are relative to it
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::validation("path", "must start with '/'"));
        }

        let valid_part = |part: &str| !part.is_empty() && sanitize_name(part) == part;
        let service_ok = match self.service.split_once('.') {
            Some((name, namespace)) => valid_part(name) && valid_part(namespace),
            None => valid_part(&self.service),
        };
        if !service_ok {
            return Err(ConfigError::validation(
                "service",
                format!("'{}' is not a service reference (name or name.namespace)", self.service),
            ));
        }

        if self.port == 0 {
            return Err(ConfigError::validation("port", "must be between 1 and 65535"));
        }
        if let Some(rewrite) = &self.rewrite_to {
            if !rewrite.starts_with('/') {
                return Err(ConfigError::validation("rewrite_to", "must start with '/'"));
            }
            if self.path == "/" {
                return Err(ConfigError::validation(
                    "rewrite_to",
                    "the root path has no prefix to replace",
                ));
            }
        }
        for (i, method) in self.methods.iter().enumerate() {
            if !METHODS.contains(&method.as_str()) {
                return Err(ConfigError::validation(
                    format!("methods[{}]", i),
                    format!("unknown method '{}' (known: {})", method, METHODS.join(", ")),
                ));
            }
        }
        for (field, value) in [
            ("connect", &self.timeouts.connect),
            ("server", &self.timeouts.server),
            ("client", &self.timeouts.client),
            ("queue", &self.timeouts.queue),
        ] {
            parse_duration(value)
                .map_err(|msg| ConfigError::validation(format!("timeouts.{}", field), msg))?;
        }
        if let Some(limit) = &self.rate_limit {
            limit.validate().map_err(|e| e.within("rate_limit"))?;
        }
        Ok(())
    }
}

// =============================================================================
// Policies
// =============================================================================

/// Requests per second and burst
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimit {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Requests allowed above the sustained rate
    pub burst: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_second: 100,
            burst: 200,
        }
    }
}

impl RateLimit {
    fn validate(&self) -> Result<()> {
        if self.requests_per_second == 0 {
            return Err(ConfigError::validation("requests_per_second", "must be at least 1"));
        }
        if self.burst == 0 {
            return Err(ConfigError::validation("burst", "must be at least 1"));
        }
        Ok(())
    }
}

/// Global rate limit
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayRateLimit {
    /// Apply to routes without their own limit
    pub enabled: bool,
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Requests allowed above the sustained rate
    pub burst: u32,
}

impl Default for GatewayRateLimit {
    fn default() -> Self {
        let limit = RateLimit::default();
        Self {
            enabled: false,
            requests_per_second: limit.requests_per_second,
            burst: limit.burst,
        }
    }
}

impl GatewayRateLimit {
    /// The limit applied to routes
    pub fn limit(&self) -> RateLimit {
        RateLimit {
            requests_per_second: self.requests_per_second,
            burst: self.burst,
        }
    }
}

/// CORS policy
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Answer CORS requests
    pub enabled: bool,
    /// Allowed origins
    pub allow_origins: Vec<String>,
    /// Allowed methods
    pub allow_methods: Vec<String>,
    /// Allowed request headers
    pub allow_headers: Vec<String>,
    /// Response headers exposed to scripts
    pub expose_headers: Vec<String>,
    /// Seconds a preflight response may be cached
    pub max_age: Option<u32>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origins: vec!["*".to_string()],
            allow_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_headers: vec!["*".to_string()],
            expose_headers: Vec::new(),
            max_age: None,
        }
    }
}

impl CorsConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && self.allow_origins.is_empty() {
            return Err(ConfigError::validation(
                "allow_origins",
                "at least one origin is required when enabled",
            ));
        }
        for (i, method) in self.allow_methods.iter().enumerate() {
            if !METHODS.contains(&method.as_str()) {
                return Err(ConfigError::validation(
                    format!("allow_methods[{}]", i),
                    format!("unknown method '{}'", method),
                ));
            }
        }
        Ok(())
    }
}

/// Authentication scheme of a route
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    /// No authentication
    #[default]
    None,
    /// HTTP basic auth against the `gateway-<route>-auth` secret
    Basic,
}

/// Route authentication
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RouteAuth {
    /// Require authentication
    pub enabled: bool,
    /// Scheme
    #[serde(rename = "type")]
    pub kind: AuthKind,
    /// Credentials secret (default `gateway-<route>-auth`)
    pub secret: Option<String>,
}

impl GatewayRoute {
    /// Secret holding basic-auth credentials, when the route requires them
    pub fn basic_auth_secret(&self) -> Option<String> {
        (self.auth.enabled && self.auth.kind == AuthKind::Basic).then(|| {
            self.auth
                .secret
                .clone()
                .unwrap_or_else(|| suffixed_name(&self.object_name(), "auth"))
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn gateway(yaml: &str) -> GatewayConfig {
        serde_yaml::from_str(yaml).expect("valid gateway yaml")
    }

    fn route(yaml: &str) -> GatewayRoute {
        serde_yaml::from_str(yaml).expect("valid route yaml")
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn test_route_defaults() {
        let route = route("path: /api\nservice: api\n");
        assert_eq!(route.port, 80);
        assert!(route.interceptor);
        assert!(!route.rewrites_path());
        assert_eq!(route.timeouts.server, "180s");
        assert_eq!(route.auth.kind, AuthKind::None);
        route.validate().expect("minimal route is valid");
    }

    #[test]
    fn test_global_defaults() {
        let gateway = gateway("routes: []\n");
        assert!(!gateway.has_routes());
        assert!(!gateway.rate_limit.enabled);
        assert_eq!(gateway.rate_limit.requests_per_second, 100);
        assert!(gateway.cors.enabled);
        assert_eq!(gateway.cors.allow_origins, vec!["*"]);
    }

    #[test]
    fn test_unsupported_auth_type_rejected() {
        let result: std::result::Result<GatewayRoute, _> =
            serde_yaml::from_str("path: /a\nservice: a\nauth:\n  enabled: true\n  type: bearer\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // Names
    // =========================================================================

    #[rstest]
    #[case("/api/users", "api-users")]
    #[case("/", "root")]
    #[case("/v1/", "v1")]
    #[case("/Shop_Cart", "shop-cart")]
    fn test_route_names(#[case] path: &str, #[case] expected: &str) {
        let route = route(&format!("path: {}\nservice: api\n", path));
        assert_eq!(route.name(), expected);
        assert_eq!(route.object_name(), format!("gateway-{}", expected));
    }

    #[test]
    fn test_service_reference_split() {
        let qualified = route("path: /a\nservice: users.team\n");
        assert_eq!(qualified.service_name(), "users");
        assert_eq!(qualified.service_namespace("apps"), "team");

        let bare = route("path: /a\nservice: users\n");
        assert_eq!(bare.service_name(), "users");
        assert_eq!(bare.service_namespace("apps"), "apps");
    }

    #[test]
    fn test_namespace_follows_backend() {
        let gateway = gateway("routes: []\n");
        assert_eq!(gateway.namespace(IngressBackend::Haproxy, "apps"), "haproxy-ingress");
        assert_eq!(gateway.namespace(IngressBackend::Traefik, "apps"), "apps");

        let pinned = self::gateway("namespace: edge\n");
        assert_eq!(pinned.namespace(IngressBackend::Haproxy, "apps"), "edge");
    }

    #[test]
    fn test_basic_auth_secret_defaults_per_route() {
        let route = route("path: /admin\nservice: admin\nauth:\n  enabled: true\n  type: basic\n");
        assert_eq!(route.basic_auth_secret().as_deref(), Some("gateway-admin-auth"));

        let disabled = self::route("path: /admin\nservice: admin\nauth:\n  type: basic\n");
        assert_eq!(disabled.basic_auth_secret(), None);
    }

    // =========================================================================
    // Rate limits
    // =========================================================================

    #[test]
    fn test_route_limit_wins_over_global() {
        let gateway = gateway(
            "rate_limit:\n  enabled: true\n  requests_per_second: 50\nroutes:\n  - path: /a\n    service: a\n  - path: /b\n    service: b\n    rate_limit:\n      requests_per_second: 5\n      burst: 10\n",
        );
        let global = gateway.rate_limit_for(&gateway.routes[0]).expect("global applies");
        assert_eq!((global.requests_per_second, global.burst), (50, 200));
        let own = gateway.rate_limit_for(&gateway.routes[1]).expect("route limit");
        assert_eq!((own.requests_per_second, own.burst), (5, 10));
    }

    #[test]
    fn test_disabled_global_limit_is_ignored() {
        let gateway = gateway("routes:\n  - path: /a\n    service: a\n");
        assert!(gateway.rate_limit_for(&gateway.routes[0]).is_none());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[rstest]
    #[case("routes:\n  - path: api\n    service: a\n", "routes[0].path")]
    #[case("routes:\n  - path: /a\n    service: A.b.c\n", "routes[0].service")]
    #[case("routes:\n  - path: /a\n    service: a\n    port: 0\n", "routes[0].port")]
    #[case("routes:\n  - path: /a\n    service: a\n    rewrite_to: v2\n", "routes[0].rewrite_to")]
    #[case("routes:\n  - path: /\n    service: a\n    rewrite_to: /v2\n", "routes[0].rewrite_to")]
    #[case("routes:\n  - path: /a\n    service: a\n    methods: [GET, FETCH]\n", "routes[0].methods[1]")]
    #[case("routes:\n  - path: /a\n    service: a\n    timeouts:\n      server: soon\n", "routes[0].timeouts.server")]
    #[case("routes:\n  - path: /a\n    service: a\n    rate_limit:\n      burst: 0\n", "routes[0].rate_limit.burst")]
    #[case("routes:\n  - path: /a/b\n    service: a\n  - path: /a-b\n    service: b\n", "routes[1].path")]
    #[case("namespace: Edge\n", "namespace")]
    #[case("cors:\n  allow_origins: []\n", "cors.allow_origins")]
    fn test_invalid_gateway_reports_path(#[case] yaml: &str, #[case] expected: &str) {
        match gateway(yaml).validate() {
            Err(ConfigError::Validation { path, .. }) => assert_eq!(path, expected),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
