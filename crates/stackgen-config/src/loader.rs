//! Loading and validating apps.yaml.
//!
//! The root document is a mapping. `defaults` and `environments` configure
//! the profiles and `gateway` holds the shared gateway routes; every other
//! key is an app-type section holding a list of
//! [`AppSpec`] entries. The loader is built with the discriminants the
//! registry knows, so a section nobody can generate fails the load:
//!
//! ```yaml
//! defaults:
//!   namespace: apps
//!   registry:
//!     gcp: europe-docker.pkg.dev/my-project/apps
//! environments:
//!   gcp:
//!     domain: example.com
//! apps:
//!   - name: api
//!     path: services/api
//! functions:
//!   - name: billing
//!     functions:
//!       - name: charge
//! ```
//!
//! Loading is all or nothing: the first invalid field aborts with its path.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::compose::ComposeProject;
use crate::env_value::EnvLookup;
use crate::error::ConfigError;
use crate::gateway::{GatewayConfig, GATEWAY_SECTION};
use crate::model::{AppSpec, IngressBackend, COMPOSE_SECTION, FUNCTIONS_SECTION};
use crate::profile::{EnvironmentConfig, EnvironmentProfile, ProfileSources, Profiles};
use crate::Result;

const DEFAULTS_KEY: &str = "defaults";
const ENVIRONMENTS_KEY: &str = "environments";

// =============================================================================
// Config
// =============================================================================

/// `defaults` section
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Namespace for apps that do not name one
    pub namespace: String,
    /// Registry template per environment
    pub registry: BTreeMap<String, String>,
    /// Default ingress backend per environment
    pub ingress: BTreeMap<String, IngressBackend>,
    /// Image tag for every environment
    pub tag: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            namespace: crate::DEFAULT_NAMESPACE.to_string(),
            registry: BTreeMap::new(),
            ingress: BTreeMap::new(),
            tag: None,
        }
    }
}

/// A loaded, validated configuration
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// `defaults` section
    pub defaults: Defaults,
    /// Profiles for every known environment
    pub profiles: Profiles,
    /// Apps in section order, then entry order
    pub apps: Vec<AppSpec>,
    /// `gateway` section
    pub gateway: GatewayConfig,
}

impl Config {
    /// App by name
    pub fn app(&self, name: &str) -> Option<&AppSpec> {
        self.apps.iter().find(|app| app.name == name)
    }

    /// Apps declared under one section
    pub fn apps_of_type<'a>(&'a self, app_type: &'a str) -> impl Iterator<Item = &'a AppSpec> + 'a {
        self.apps.iter().filter(move |app| app.app_type == app_type)
    }

    /// Sections with at least one app, in declaration order
    pub fn app_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for app in &self.apps {
            if !types.contains(&app.app_type.as_str()) {
                types.push(&app.app_type);
            }
        }
        types
    }

    /// Profile for an environment
    pub fn profile(&self, env: &str) -> Result<&EnvironmentProfile> {
        self.profiles.resolve(env)
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loads apps.yaml into a [`Config`]
pub struct ConfigLoader {
    app_types: Vec<String>,
    env_lookup: Box<EnvLookup>,
}

impl ConfigLoader {
    /// Loader accepting the given app-type sections, reading `${VAR}` from
    /// the process environment
    pub fn new<I, S>(app_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            app_types: app_types.into_iter().map(Into::into).collect(),
            env_lookup: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the `${VAR}` lookup
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.env_lookup = Box::new(lookup);
        self
    }

    /// Load a configuration file; compose files resolve relative to its directory
    pub fn load_file(&self, path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let config = self.load_document(&text, base_dir, &path.display().to_string())?;
        info!(
            file = %path.display(),
            apps = config.apps.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration text; compose files resolve relative to `base_dir`
    pub fn load_str(&self, text: &str, base_dir: &Path) -> Result<Config> {
        self.load_document(text, base_dir, "configuration")
    }

    fn load_document(&self, text: &str, base_dir: &Path, source: &str) -> Result<Config> {
        let root: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| ConfigError::parse(source, e.to_string()))?;
        let root = match root {
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            serde_yaml::Value::Mapping(map) => map,
            _ => return Err(ConfigError::parse(source, "root must be a mapping")),
        };

        let mut defaults = Defaults::default();
        let mut environments = BTreeMap::new();
        let mut gateway = GatewayConfig::default();
        let mut sections = Vec::new();

        for (key, value) in root {
            let Some(key) = key.as_str().map(str::to_string) else {
                return Err(ConfigError::parse(source, "top-level keys must be strings"));
            };
            match key.as_str() {
                DEFAULTS_KEY => {
                    defaults = from_value_or_default(value)
                        .map_err(|e| ConfigError::parse(DEFAULTS_KEY, e.to_string()))?;
                }
                ENVIRONMENTS_KEY => {
                    environments = from_value_or_default::<BTreeMap<String, EnvironmentConfig>>(value)
                        .map_err(|e| ConfigError::parse(ENVIRONMENTS_KEY, e.to_string()))?;
                }
                GATEWAY_SECTION => {
                    gateway = from_value_or_default(value)
                        .map_err(|e| ConfigError::parse(GATEWAY_SECTION, e.to_string()))?;
                }
                section if self.app_types.iter().any(|t| t == section) => {
                    sections.push((key, value));
                }
                _ => {
                    return Err(ConfigError::UnknownAppType {
                        section: key,
                        known: self.app_types.join(", "),
                    })
                }
            }
        }

        validate_namespace_default(&defaults.namespace)?;
        let profiles = Profiles::build(ProfileSources {
            environments: Some(&environments),
            registry: Some(&defaults.registry),
            ingress: Some(&defaults.ingress),
            tag: defaults.tag.as_deref(),
        })?;

        let mut apps = Vec::new();
        let mut seen = NameIndex::default();
        for (section, value) in sections {
            let entries = match value {
                serde_yaml::Value::Null => Vec::new(),
                serde_yaml::Value::Sequence(entries) => entries,
                _ => return Err(ConfigError::parse(section.as_str(), "expected a list of apps")),
            };

            for (i, entry) in entries.into_iter().enumerate() {
                let path = format!("{}[{}]", section, i);
                let app = self.load_app(&section, &path, entry, &defaults, &profiles, base_dir)?;
                seen.insert(&app, &path, &profiles)?;
                debug!(app = %app.name, app_type = %section, "app loaded");
                apps.push(app);
            }
        }

        if gateway.has_routes() {
            gateway.validate().map_err(|e| e.within(GATEWAY_SECTION))?;
            if let Some(app) = apps.iter().find(|app| app.object_name() == GATEWAY_SECTION) {
                return Err(ConfigError::validation(
                    GATEWAY_SECTION,
                    format!(
                        "app '{}' would share the gateway's output file {}.yaml",
                        app.name, GATEWAY_SECTION
                    ),
                ));
            }
            seen.insert_gateway(&gateway, &defaults.namespace, &profiles)?;
            debug!(routes = gateway.routes.len(), "gateway loaded");
        }

        Ok(Config {
            defaults,
            profiles,
            apps,
            gateway,
        })
    }

    fn load_app(
        &self,
        section: &str,
        path: &str,
        entry: serde_yaml::Value,
        defaults: &Defaults,
        profiles: &Profiles,
        base_dir: &Path,
    ) -> Result<AppSpec> {
        let mut app: AppSpec =
            serde_yaml::from_value(entry).map_err(|e| ConfigError::parse(path, e.to_string()))?;
        app.app_type = section.to_string();
        if app.namespace.is_empty() {
            app.namespace = defaults.namespace.clone();
        }
        app.substitute_environment(self.env_lookup.as_ref());

        if section == FUNCTIONS_SECTION {
            if app.functions.is_empty() {
                return Err(ConfigError::validation(
                    format!("{}.functions", path),
                    "at least one function is required",
                ));
            }
        } else if !app.functions.is_empty() {
            return Err(ConfigError::validation(
                format!("{}.functions", path),
                format!("only valid in the '{}' section", FUNCTIONS_SECTION),
            ));
        }

        if section == COMPOSE_SECTION {
            app.compose = Some(self.load_compose(&app, path, base_dir)?);
        } else if app.file.is_some() {
            return Err(ConfigError::validation(
                format!("{}.file", path),
                format!("only valid in the '{}' section", COMPOSE_SECTION),
            ));
        }

        app.validate().map_err(|e| e.within(path))?;

        for (env, delta) in &app.overrides {
            let override_path = format!("{}.overrides.{}", path, env);
            if !profiles.contains(env) {
                let known: Vec<&str> = profiles.names().collect();
                return Err(ConfigError::validation(
                    override_path,
                    format!("unknown environment '{}' (known: {})", env, known.join(", ")),
                ));
            }
            delta.validate().map_err(|e| e.within(&override_path))?;
            app.effective(env)
                .validate()
                .map_err(|e| e.within(&override_path))?;
        }

        Ok(app)
    }

    fn load_compose(&self, app: &AppSpec, path: &str, base_dir: &Path) -> Result<ComposeProject> {
        let compose_dir = base_dir.join(&app.path);
        let file = compose_dir.join(app.compose_file());
        let text = std::fs::read_to_string(&file).map_err(|e| ConfigError::io(&file, e))?;

        let read_env_file = |name: &str| -> Result<String> {
            let env_path: PathBuf = compose_dir.join(name);
            std::fs::read_to_string(&env_path).map_err(|e| ConfigError::io(env_path, e))
        };

        ComposeProject::parse(&text, &read_env_file, self.env_lookup.as_ref()).map_err(|e| match e {
            ConfigError::Validation { path: inner, message } => ConfigError::validation(
                format!("{}.file", path),
                format!("{}: {}: {}", file.display(), inner, message),
            ),
            ConfigError::Parse { path: inner, message } if inner.is_empty() => {
                ConfigError::parse(file.display().to_string(), message)
            }
            ConfigError::Parse { path: inner, message } => {
                ConfigError::parse(format!("{} ({})", file.display(), inner), message)
            }
            other => other,
        })
    }
}

fn from_value_or_default<T>(value: serde_yaml::Value) -> std::result::Result<T, serde_yaml::Error>
where
    T: serde::de::DeserializeOwned + Default,
{
    if value.is_null() {
        Ok(T::default())
    } else {
        serde_yaml::from_value(value)
    }
}

fn validate_namespace_default(namespace: &str) -> Result<()> {
    if namespace.is_empty()
        || stackgen_common::kube_utils::sanitize_name(namespace) != namespace
    {
        return Err(ConfigError::validation(
            "defaults.namespace",
            format!("'{}' is not a valid namespace name", namespace),
        ));
    }
    Ok(())
}

/// Tracks app names and the object names each app claims per environment
#[derive(Default)]
struct NameIndex {
    apps: HashMap<String, String>,
    objects: HashMap<(String, String), String>,
}

impl NameIndex {
    fn insert(&mut self, app: &AppSpec, path: &str, profiles: &Profiles) -> Result<()> {
        if let Some(first) = self.apps.get(&app.name) {
            return Err(ConfigError::validation(
                format!("{}.name", path),
                format!("app '{}' is already defined at {}", app.name, first),
            ));
        }
        self.apps.insert(app.name.clone(), path.to_string());

        let reserved = app.reserved_names();
        let mut own = HashSet::new();
        for name in &reserved {
            if !own.insert(name) {
                return Err(ConfigError::validation(
                    format!("{}.name", path),
                    format!("'{}' is produced twice by this app", name),
                ));
            }
        }
        let field = format!("{}.name", path);
        for env in profiles.names() {
            let namespace = app.effective(env).namespace;
            for name in &reserved {
                self.claim(&namespace, name, env, path, &field)?;
            }
        }
        Ok(())
    }

    fn insert_gateway(
        &mut self,
        gateway: &GatewayConfig,
        default_namespace: &str,
        profiles: &Profiles,
    ) -> Result<()> {
        let names = gateway.reserved_names();
        for env in profiles.names() {
            let profile = profiles.resolve(env)?;
            let namespace = gateway.namespace(gateway.backend(profile), default_namespace);
            for (i, name) in names.iter().enumerate() {
                let (owner, field) = match i {
                    0 => (GATEWAY_SECTION.to_string(), GATEWAY_SECTION.to_string()),
                    _ => {
                        let owner = format!("{}.routes[{}]", GATEWAY_SECTION, i - 1);
                        let field = format!("{}.path", owner);
                        (owner, field)
                    }
                };
                self.claim(&namespace, name, env, &owner, &field)?;
            }
        }
        Ok(())
    }

    /// Claim `name` in `namespace` for `owner`; repeated claims by the same
    /// owner are no-ops
    fn claim(&mut self, namespace: &str, name: &str, env: &str, owner: &str, field: &str) -> Result<()> {
        let key = (namespace.to_string(), name.to_string());
        match self.objects.get(&key) {
            Some(first) if first == owner => Ok(()),
            Some(first) => Err(ConfigError::validation(
                field,
                format!(
                    "'{}' in namespace '{}' (environment {}) is already produced by {}",
                    name, namespace, env, first
                ),
            )),
            None => {
                self.objects.insert(key, owner.to_string());
                Ok(())
            }
        }
    }
}
