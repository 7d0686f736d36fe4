//! External exposure: ingress backend choice, path matching, hosts and TLS.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::Result;

/// Ingress controller flavor
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IngressBackend {
    /// Traefik IngressRoute + Middleware
    Traefik,
    /// HAProxy ingress controller via networking.k8s.io Ingress
    Haproxy,
}

impl IngressBackend {
    /// Name as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traefik => "traefik",
            Self::Haproxy => "haproxy",
        }
    }
}

impl fmt::Display for IngressBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the ingress path matches requests
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum PathType {
    /// Path prefix
    #[default]
    #[serde(alias = "prefix")]
    Prefix,
    /// Exact path
    #[serde(alias = "exact")]
    Exact,
    /// Controller-defined matching
    ImplementationSpecific,
}

impl PathType {
    /// Kubernetes `pathType` value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prefix => "Prefix",
            Self::Exact => "Exact",
            Self::ImplementationSpecific => "ImplementationSpecific",
        }
    }
}

/// Ingress section of an app
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IngressConfig {
    /// Expose the app outside the cluster
    pub enabled: bool,
    /// Backend override; the environment default applies when unset
    pub class: Option<IngressBackend>,
    /// Request path routed to the app
    pub path: String,
    /// Path matching
    pub path_type: PathType,
    /// Remove `path` before forwarding
    pub strip_prefix: bool,
    /// Hostnames (default `<name>.<domain>`)
    pub hosts: Vec<String>,
    /// TLS (environment default when unset)
    pub tls: Option<TlsConfig>,
    /// Proxy timeouts
    pub timeouts: TimeoutConfig,
    /// Extra annotations, applied over generated ones
    pub annotations: BTreeMap<String, String>,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            class: None,
            path: "/".to_string(),
            path_type: PathType::default(),
            strip_prefix: false,
            hosts: Vec::new(),
            tls: None,
            timeouts: TimeoutConfig::default(),
            annotations: BTreeMap::new(),
        }
    }
}

impl IngressConfig {
    /// Whether a prefix actually needs stripping
    pub fn strips_prefix(&self) -> bool {
        self.strip_prefix && self.path != "/"
    }

    /// Validate path and hosts
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::validation("path", "must start with '/'"));
        }
        for (i, host) in self.hosts.iter().enumerate() {
            if host.trim().is_empty() || host.contains('/') || host.contains(' ') {
                return Err(ConfigError::validation(
                    format!("hosts[{}]", i),
                    format!("'{}' is not a valid hostname", host),
                ));
            }
        }
        if let Some(tls) = &self.tls {
            for (i, host) in tls.hosts.iter().enumerate() {
                if host.trim().is_empty() {
                    return Err(ConfigError::validation(
                        format!("tls.hosts[{}]", i),
                        "must not be empty",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// TLS termination
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    /// Terminate TLS
    pub enabled: bool,
    /// Certificate secret (default `<name>-tls`)
    pub secret: Option<String>,
    /// Hosts on the certificate (default: the ingress hosts)
    pub hosts: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret: None,
            hosts: Vec::new(),
        }
    }
}

/// Proxy timeouts, as duration strings (`10s`, `3m`)
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Backend connect timeout
    pub connect: String,
    /// Backend response timeout
    pub server: String,
    /// Client inactivity timeout
    pub client: String,
    /// Time a request may wait for a free backend slot
    pub queue: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: "10s".to_string(),
            server: "180s".to_string(),
            client: "180s".to_string(),
            queue: "180s".to_string(),
        }
    }
}
