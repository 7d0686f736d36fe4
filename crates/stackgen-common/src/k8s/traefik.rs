//! Traefik CRDs: IngressRoute and Middleware

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

/// Traefik IngressRoute
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressRoute {
    /// API version (traefik.io/v1alpha1)
    #[serde(default = "IngressRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (IngressRoute)
    #[serde(default = "IngressRoute::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: IngressRouteSpec,
}

impl HasApiResource for IngressRoute {
    const API_VERSION: &'static str = "traefik.io/v1alpha1";
    const KIND: &'static str = "IngressRoute";
}

impl_api_defaults!(IngressRoute);

impl IngressRoute {
    /// Create a new IngressRoute
    pub fn new(metadata: ObjectMeta, spec: IngressRouteSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// IngressRoute spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteSpec {
    /// Entry points (web, websecure)
    pub entry_points: Vec<String>,
    /// Routes
    pub routes: Vec<TraefikRoute>,
    /// TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TraefikTls>,
}

/// One routing rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraefikRoute {
    /// Always "Rule"
    pub kind: String,
    /// Matcher expression, e.g. ``Host(`a`) && PathPrefix(`/p`)``
    #[serde(rename = "match")]
    pub match_: String,
    /// Middlewares applied in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<MiddlewareRef>,
    /// Backends
    pub services: Vec<TraefikService>,
}

/// Reference to a Middleware in the same namespace
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MiddlewareRef {
    /// Middleware name
    pub name: String,
}

/// Backend service of a route
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraefikService {
    /// Service name
    pub name: String,
    /// Service port
    pub port: u16,
}

/// TLS settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraefikTls {
    /// Certificate secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

// =============================================================================
// Middleware
// =============================================================================

/// Traefik Middleware
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Middleware {
    /// API version (traefik.io/v1alpha1)
    #[serde(default = "Middleware::default_api_version")]
    pub api_version: String,
    /// Resource kind (Middleware)
    #[serde(default = "Middleware::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: MiddlewareSpec,
}

impl HasApiResource for Middleware {
    const API_VERSION: &'static str = "traefik.io/v1alpha1";
    const KIND: &'static str = "Middleware";
}

impl_api_defaults!(Middleware);

impl Middleware {
    fn with_spec(metadata: ObjectMeta, spec: MiddlewareSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }

    /// Middleware that overwrites request headers
    pub fn request_headers(metadata: ObjectMeta, headers: BTreeMap<String, String>) -> Self {
        Self::with_spec(
            metadata,
            MiddlewareSpec {
                headers: Some(HeadersMiddleware {
                    custom_request_headers: headers,
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
    }

    /// Middleware answering CORS requests
    pub fn cors(metadata: ObjectMeta, cors: HeadersMiddleware) -> Self {
        Self::with_spec(
            metadata,
            MiddlewareSpec {
                headers: Some(cors),
                ..Default::default()
            },
        )
    }

    /// Middleware that removes path prefixes before forwarding
    pub fn strip_prefix(metadata: ObjectMeta, prefixes: Vec<String>) -> Self {
        Self::with_spec(
            metadata,
            MiddlewareSpec {
                strip_prefix: Some(StripPrefixMiddleware { prefixes }),
                ..Default::default()
            },
        )
    }

    /// Middleware that rewrites the path through a regex
    pub fn replace_path_regex(
        metadata: ObjectMeta,
        regex: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self::with_spec(
            metadata,
            MiddlewareSpec {
                replace_path_regex: Some(ReplacePathRegexMiddleware {
                    regex: regex.into(),
                    replacement: replacement.into(),
                }),
                ..Default::default()
            },
        )
    }

    /// Middleware limiting the request rate
    pub fn rate_limit(metadata: ObjectMeta, average: u32, burst: u32) -> Self {
        Self::with_spec(
            metadata,
            MiddlewareSpec {
                rate_limit: Some(RateLimitMiddleware { average, burst }),
                ..Default::default()
            },
        )
    }

    /// Middleware requiring HTTP basic auth against a secret
    pub fn basic_auth(metadata: ObjectMeta, secret: impl Into<String>) -> Self {
        Self::with_spec(
            metadata,
            MiddlewareSpec {
                basic_auth: Some(BasicAuthMiddleware {
                    secret: secret.into(),
                }),
                ..Default::default()
            },
        )
    }
}

/// Middleware spec; exactly one field is set
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareSpec {
    /// Header rewriting and CORS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeadersMiddleware>,
    /// Prefix stripping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<StripPrefixMiddleware>,
    /// Regex path rewriting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_path_regex: Option<ReplacePathRegexMiddleware>,
    /// Rate limiting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitMiddleware>,
    /// Basic auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthMiddleware>,
}

/// Headers middleware: request header rewriting and CORS responses
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeadersMiddleware {
    /// Headers set on the forwarded request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_request_headers: BTreeMap<String, String>,
    /// CORS allowed methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_control_allow_methods: Vec<String>,
    /// CORS allowed request headers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_control_allow_headers: Vec<String>,
    /// CORS allowed origins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_control_allow_origin_list: Vec<String>,
    /// CORS exposed response headers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_control_expose_headers: Vec<String>,
    /// CORS preflight cache lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control_max_age: Option<u32>,
    /// Add `Vary: Origin` to CORS responses
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub add_vary_header: bool,
}

/// Prefix stripping middleware
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StripPrefixMiddleware {
    /// Prefixes to strip
    pub prefixes: Vec<String>,
}

/// Regex path rewriting middleware
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReplacePathRegexMiddleware {
    /// Pattern matched against the path
    pub regex: String,
    /// Replacement, with `$n` group references
    pub replacement: String,
}

/// Rate limiting middleware
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RateLimitMiddleware {
    /// Requests per second on average
    pub average: u32,
    /// Requests allowed above the average
    pub burst: u32,
}

/// Basic auth middleware
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BasicAuthMiddleware {
    /// Secret holding htpasswd users
    pub secret: String,
}
