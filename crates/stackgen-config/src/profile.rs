//! Per-environment profiles.
//!
//! A profile holds every environment-specific constant generators need:
//! which ingress controllers exist, where images live, the default domain and
//! TLS, and whether secret sync and workload identity are available. All
//! per-environment branching reads from here, so generators never match on an
//! environment name.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::IngressBackend;
use crate::Result;

/// Tag used when neither the CLI nor `defaults.tag` gives one
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// ClusterSecretStore the built-in profiles sync from
pub const DEFAULT_SECRET_STORE: &str = "gcp-secret-manager";

/// Pull secret added for Artifact Registry hosts
pub const ARTIFACT_REGISTRY_PULL_SECRET: &str = "artifact-registry";

const ARTIFACT_REGISTRY_HOST: &str = "docker.pkg.dev";

// =============================================================================
// EnvironmentProfile
// =============================================================================

/// Resolved constants for one environment
#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentProfile {
    /// Environment identifier
    pub name: String,
    /// Default ingress backend
    pub ingress: IngressBackend,
    /// Backends the environment can host; always contains `ingress`
    pub ingress_backends: Vec<IngressBackend>,
    /// Image registry or registry template
    pub registry: String,
    /// Image tag
    pub tag: String,
    /// Domain for default hostnames
    pub domain: String,
    /// Terminate TLS by default
    pub tls: bool,
    /// Default certificate secret
    pub tls_secret: Option<String>,
    /// ExternalSecret sync is installed
    pub external_secrets: bool,
    /// ClusterSecretStore name
    pub secret_store: String,
    /// Provider the store serves
    pub secret_provider: String,
    /// Workload identity binding is available
    pub workload_identity: bool,
    /// Extra image pull secrets
    pub image_pull_secrets: Vec<String>,
}

impl EnvironmentProfile {
    /// Local cluster (kind/k3d) with a local registry
    pub fn local() -> Self {
        Self {
            name: "local".to_string(),
            ingress: IngressBackend::Traefik,
            ingress_backends: vec![IngressBackend::Traefik],
            registry: "localhost:5000".to_string(),
            external_secrets: false,
            ..Self::dev()
        }
    }

    /// Shared development cluster
    pub fn dev() -> Self {
        Self {
            name: "dev".to_string(),
            ingress: IngressBackend::Traefik,
            ingress_backends: vec![IngressBackend::Traefik, IngressBackend::Haproxy],
            registry: String::new(),
            tag: DEFAULT_IMAGE_TAG.to_string(),
            domain: "localhost".to_string(),
            tls: false,
            tls_secret: None,
            external_secrets: true,
            secret_store: DEFAULT_SECRET_STORE.to_string(),
            secret_provider: crate::env_value::DEFAULT_SECRET_PROVIDER.to_string(),
            workload_identity: false,
            image_pull_secrets: Vec::new(),
        }
    }

    /// GKE
    pub fn gcp() -> Self {
        Self {
            name: "gcp".to_string(),
            ingress: IngressBackend::Haproxy,
            ingress_backends: vec![IngressBackend::Haproxy, IngressBackend::Traefik],
            workload_identity: true,
            ..Self::dev()
        }
    }

    /// Built-in profile by name
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "local" => Some(Self::local()),
            "dev" => Some(Self::dev()),
            "gcp" => Some(Self::gcp()),
            _ => None,
        }
    }

    /// Same profile with a different image tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Whether `backend` can serve ingress in this environment
    pub fn supports_ingress(&self, backend: IngressBackend) -> bool {
        self.ingress_backends.contains(&backend)
    }

    /// Image reference for an app.
    ///
    /// A registry containing `{name}`, `{path}` or `{tag}` is rendered as a
    /// template (`:<tag>` is appended when it has no `{tag}`); an empty
    /// registry yields `<name>:<tag>`; anything else is a registry prefix.
    pub fn resolve_image(&self, name: &str, path: &str) -> String {
        let registry = self.registry.trim_end_matches('/');
        if registry.is_empty() {
            return format!("{}:{}", name, self.tag);
        }

        let is_template = ["{name}", "{path}", "{tag}"]
            .iter()
            .any(|placeholder| registry.contains(placeholder));
        if !is_template {
            return format!("{}/{}:{}", registry, name, self.tag);
        }

        let last_component = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|c| !c.is_empty())
            .unwrap_or(name);
        let rendered = registry
            .replace("{name}", name)
            .replace("{path}", last_component)
            .replace("{tag}", &self.tag);
        if registry.contains("{tag}") {
            rendered
        } else {
            format!("{}:{}", rendered, self.tag)
        }
    }

    /// Pull secrets for pods in this environment
    pub fn image_pull_secrets(&self) -> Vec<String> {
        let mut secrets = Vec::new();
        if self.registry.contains(ARTIFACT_REGISTRY_HOST) {
            secrets.push(ARTIFACT_REGISTRY_PULL_SECRET.to_string());
        }
        for secret in &self.image_pull_secrets {
            if !secrets.contains(secret) {
                secrets.push(secret.clone());
            }
        }
        secrets
    }

    fn apply(mut self, config: &EnvironmentConfig) -> Self {
        if let Some(ingress) = config.ingress {
            self.ingress = ingress;
        }
        if let Some(backends) = &config.ingress_backends {
            self.ingress_backends = backends.clone();
        }
        if let Some(registry) = &config.registry {
            self.registry = registry.clone();
        }
        if let Some(tag) = &config.tag {
            self.tag = tag.clone();
        }
        if let Some(domain) = &config.domain {
            self.domain = domain.clone();
        }
        if let Some(tls) = config.tls {
            self.tls = tls;
        }
        if let Some(secret) = &config.tls_secret {
            self.tls_secret = Some(secret.clone());
        }
        if let Some(enabled) = config.external_secrets {
            self.external_secrets = enabled;
        }
        if let Some(store) = &config.secret_store {
            self.secret_store = store.clone();
        }
        if let Some(provider) = &config.secret_provider {
            self.secret_provider = provider.clone();
        }
        if let Some(enabled) = config.workload_identity {
            self.workload_identity = enabled;
        }
        if let Some(secrets) = &config.image_pull_secrets {
            self.image_pull_secrets = secrets.clone();
        }
        self
    }

    fn ensure_default_ingress(mut self) -> Self {
        if !self.ingress_backends.contains(&self.ingress) {
            self.ingress_backends.insert(0, self.ingress);
        }
        self
    }
}

/// Profile fields as written under `environments.<name>`
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Default ingress backend
    pub ingress: Option<IngressBackend>,
    /// Hostable backends
    pub ingress_backends: Option<Vec<IngressBackend>>,
    /// Registry or template
    pub registry: Option<String>,
    /// Image tag
    pub tag: Option<String>,
    /// Default domain
    pub domain: Option<String>,
    /// TLS default
    pub tls: Option<bool>,
    /// Default certificate secret
    pub tls_secret: Option<String>,
    /// Secret sync available
    pub external_secrets: Option<bool>,
    /// ClusterSecretStore
    pub secret_store: Option<String>,
    /// Provider served by the store
    pub secret_provider: Option<String>,
    /// Workload identity available
    pub workload_identity: Option<bool>,
    /// Extra pull secrets
    pub image_pull_secrets: Option<Vec<String>>,
}

// =============================================================================
// Profiles
// =============================================================================

/// Every environment a configuration can target
#[derive(Clone, Debug, PartialEq)]
pub struct Profiles {
    profiles: BTreeMap<String, EnvironmentProfile>,
}

impl Default for Profiles {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Sources merged into the profiles, lowest precedence first
#[derive(Clone, Debug, Default)]
pub struct ProfileSources<'a> {
    /// `environments` section
    pub environments: Option<&'a BTreeMap<String, EnvironmentConfig>>,
    /// `defaults.registry`
    pub registry: Option<&'a BTreeMap<String, String>>,
    /// `defaults.ingress`
    pub ingress: Option<&'a BTreeMap<String, IngressBackend>>,
    /// `defaults.tag`
    pub tag: Option<&'a str>,
}

impl Profiles {
    /// Only the built-in `local`, `dev` and `gcp` profiles
    pub fn builtin() -> Self {
        let profiles = [
            EnvironmentProfile::local(),
            EnvironmentProfile::dev(),
            EnvironmentProfile::gcp(),
        ]
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();
        Self { profiles }
    }

    /// Built-ins overlaid with configuration.
    ///
    /// Environments declared only in `environments` start from `dev`.
    /// `defaults.registry`, `defaults.ingress` and `defaults.tag` win over
    /// the `environments` section. Keys in `defaults` naming an environment
    /// that does not exist are rejected.
    pub fn build(sources: ProfileSources<'_>) -> Result<Self> {
        let mut profiles = Self::builtin().profiles;

        if let Some(environments) = sources.environments {
            for (name, config) in environments {
                let base = profiles.remove(name).unwrap_or_else(|| EnvironmentProfile {
                    name: name.clone(),
                    ..EnvironmentProfile::dev()
                });
                profiles.insert(name.clone(), base.apply(config));
            }
        }

        if let Some(registry) = sources.registry {
            for (env, template) in registry {
                let profile = profiles.get_mut(env).ok_or_else(|| {
                    ConfigError::validation(
                        format!("defaults.registry.{}", env),
                        format!("unknown environment '{}'", env),
                    )
                })?;
                profile.registry = template.clone();
            }
        }

        if let Some(ingress) = sources.ingress {
            for (env, backend) in ingress {
                let profile = profiles.get_mut(env).ok_or_else(|| {
                    ConfigError::validation(
                        format!("defaults.ingress.{}", env),
                        format!("unknown environment '{}'", env),
                    )
                })?;
                profile.ingress = *backend;
            }
        }

        if let Some(tag) = sources.tag {
            for profile in profiles.values_mut() {
                profile.tag = tag.to_string();
            }
        }

        let profiles = profiles
            .into_iter()
            .map(|(name, profile)| (name, profile.ensure_default_ingress()))
            .collect::<BTreeMap<_, _>>();

        for (name, profile) in &profiles {
            if profile.tag.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("environments.{}.tag", name),
                    "must not be empty",
                ));
            }
        }

        Ok(Self { profiles })
    }

    /// Profile for an environment
    pub fn resolve(&self, id: &str) -> Result<&EnvironmentProfile> {
        self.profiles
            .get(id)
            .ok_or_else(|| ConfigError::unknown_environment(id))
    }

    /// Whether a profile exists
    pub fn contains(&self, id: &str) -> bool {
        self.profiles.contains_key(id)
    }

    /// Environment names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}
