//! Typed configuration model.
//!
//! [`AppSpec`] is one deployable unit as written under an app-type section of
//! apps.yaml. The building blocks it composes live in the submodules. Every
//! struct defaults its optional fields, so a minimal entry is just a name:
//!
//! ```yaml
//! apps:
//!   - name: api
//!     path: services/api
//! ```
//!
//! Validation methods report paths relative to the struct being validated;
//! callers prefix them with [`ConfigError::within`].

pub mod container;
pub mod ingress;
pub mod resources;
pub mod scaling;
pub mod security;

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Deserialize;
use stackgen_common::kube_utils::{sanitize_name, suffixed_name};

use crate::compose::ComposeProject;
use crate::env_value::{EnvLookup, EnvValue};
use crate::error::ConfigError;
use crate::Result;

pub use container::{
    validate_volumes, ContainerConfig, EnvFromConfig, EnvFromKind, KeyPathConfig, PdbConfig,
    PortConfig, ProbeConfig, ProbeKind, ProbesConfig, VolumeConfig, VolumeKind,
};
pub use ingress::{IngressBackend, IngressConfig, PathType, TimeoutConfig, TlsConfig};
pub use resources::ResourceConfig;
pub use scaling::{
    QueueDepthScaling, RequestRateScaling, ScalingConfig, ScalingKind, ScalingPolicy, TimeWindow,
    TimeWindowScaling, UtilizationScaling,
};
pub use security::{
    ContainerSecurityConfig, NetworkPolicyConfig, NetworkRule, PodSecurityConfig, SecurityConfig,
    Visibility,
};

/// Section holding container apps
pub const APPS_SECTION: &str = "apps";

/// Section holding function apps
pub const FUNCTIONS_SECTION: &str = "functions";

/// Section holding compose-derived apps
pub const COMPOSE_SECTION: &str = "compose";

/// Compose file read when a compose app does not name one
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yaml";

/// Suffix of the Service that forwards a workload's edge traffic to the
/// KEDA HTTP interceptor
pub const INTERCEPTOR_SUFFIX: &str = "interceptor";

fn default_true() -> bool {
    true
}

// =============================================================================
// AppSpec
// =============================================================================

/// One deployable unit
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppSpec {
    /// Logical name; normalized into object names
    pub name: String,
    /// Source path, relative to the configuration file
    #[serde(default)]
    pub path: String,
    /// Target namespace (filled from `defaults.namespace` at load)
    #[serde(default)]
    pub namespace: String,
    /// Generate this app
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Full image reference, bypassing the registry template
    #[serde(default)]
    pub image: Option<String>,
    /// Requests and limits
    #[serde(default)]
    pub resources: ResourceConfig,
    /// Scaling policy
    #[serde(default)]
    pub scaling: ScalingConfig,
    /// Ingress policy
    #[serde(default)]
    pub ingress: IngressConfig,
    /// Security policy
    #[serde(default)]
    pub security: SecurityConfig,
    /// Environment variables
    #[serde(default)]
    pub environment: BTreeMap<String, EnvValue>,
    /// Secrets and ConfigMaps imported wholesale
    #[serde(default)]
    pub env_from: Vec<EnvFromConfig>,
    /// Container details
    #[serde(default)]
    pub container: ContainerConfig,
    /// Health probes
    #[serde(default)]
    pub probes: ProbesConfig,
    /// Volumes
    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
    /// Disruption budget
    #[serde(default)]
    pub pdb: Option<PdbConfig>,
    /// Per-environment deltas
    #[serde(default)]
    pub overrides: BTreeMap<String, AppOverride>,
    /// Functions (function apps only)
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    /// Compose file name (compose apps only)
    #[serde(default)]
    pub file: Option<String>,

    /// Section the app was declared under
    #[serde(skip)]
    pub app_type: String,
    /// Parsed compose file (compose apps only)
    #[serde(skip)]
    pub compose: Option<ComposeProject>,
    /// Replica count forced by the active override
    #[serde(skip)]
    pub replicas_override: Option<u32>,
}

impl AppSpec {
    /// Minimal spec, as if written with only a name and path
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            namespace: crate::DEFAULT_NAMESPACE.to_string(),
            enabled: true,
            image: None,
            resources: ResourceConfig::default(),
            scaling: ScalingConfig::default(),
            ingress: IngressConfig::default(),
            security: SecurityConfig::default(),
            environment: BTreeMap::new(),
            env_from: Vec::new(),
            container: ContainerConfig::default(),
            probes: ProbesConfig::default(),
            volumes: Vec::new(),
            pdb: None,
            overrides: BTreeMap::new(),
            functions: Vec::new(),
            file: None,
            app_type: APPS_SECTION.to_string(),
            compose: None,
            replicas_override: None,
        }
    }

    /// Spec with the override for `env` merged in.
    ///
    /// Scalar sections replace the base; `environment` and
    /// `ingress_annotations` merge key-wise with the override winning.
    pub fn effective(&self, env: &str) -> AppSpec {
        let mut spec = self.clone();
        let Some(delta) = self.overrides.get(env) else {
            return spec;
        };

        if let Some(enabled) = delta.enabled {
            spec.enabled = enabled;
        }
        if let Some(namespace) = &delta.namespace {
            spec.namespace = namespace.clone();
        }
        if let Some(resources) = &delta.resources {
            spec.resources = resources.clone();
        }
        if let Some(scaling) = &delta.scaling {
            spec.scaling = scaling.clone();
        }
        if let Some(replicas) = delta.replicas {
            spec.scaling.replicas = replicas;
            spec.replicas_override = Some(replicas);
        }
        if let Some(pdb) = &delta.pdb {
            spec.pdb = Some(pdb.clone());
        }
        spec.environment
            .extend(delta.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
        spec.ingress
            .annotations
            .extend(delta.ingress_annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        spec
    }

    /// Normalized base name for generated objects
    pub fn object_name(&self) -> String {
        sanitize_name(&self.name)
    }

    /// Names of the workloads this app produces
    pub fn workload_names(&self) -> Vec<String> {
        if let Some(project) = &self.compose {
            return project
                .services
                .iter()
                .map(|svc| suffixed_name(&self.name, &svc.name))
                .collect();
        }
        if !self.functions.is_empty() {
            return self
                .functions
                .iter()
                .map(|func| suffixed_name(&self.name, &func.name))
                .collect();
        }
        vec![self.object_name()]
    }

    /// Service names the app may produce: each workload's own Service and
    /// its interceptor Service
    pub fn reserved_names(&self) -> Vec<String> {
        self.workload_names()
            .into_iter()
            .flat_map(|workload| {
                let interceptor = suffixed_name(&workload, INTERCEPTOR_SUFFIX);
                [workload, interceptor]
            })
            .collect()
    }

    /// Env entries that reference secrets, in key order
    pub fn secret_env(&self) -> impl Iterator<Item = (&str, &crate::SecretRef)> {
        self.environment
            .iter()
            .filter_map(|(k, v)| v.as_secret().map(|s| (k.as_str(), s)))
    }

    /// Compose file name relative to the app path
    pub fn compose_file(&self) -> &str {
        self.file.as_deref().unwrap_or(DEFAULT_COMPOSE_FILE)
    }

    /// Validate the app entry; error paths are relative to it
    pub fn validate(&self) -> Result<()> {
        if self.object_name().is_empty() {
            return Err(ConfigError::validation(
                "name",
                format!("'{}' contains no valid DNS label characters", self.name),
            ));
        }
        validate_namespace(&self.namespace).map_err(|e| e.within("namespace"))?;

        self.resources.validate().map_err(|e| e.within("resources"))?;
        self.scaling.resolve().map_err(|e| e.within("scaling"))?;
        self.ingress.validate().map_err(|e| e.within("ingress"))?;
        self.security.validate().map_err(|e| e.within("security"))?;
        self.container.validate().map_err(|e| e.within("container"))?;
        self.probes.validate().map_err(|e| e.within("probes"))?;
        validate_volumes(&self.volumes).map_err(|e| e.within("volumes"))?;
        if let Some(pdb) = &self.pdb {
            pdb.validate().map_err(|e| e.within("pdb"))?;
        }
        validate_env_names(&self.environment).map_err(|e| e.within("environment"))?;

        for (i, source) in self.env_from.iter().enumerate() {
            if source.name.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("env_from[{}].name", i),
                    "must not be empty",
                ));
            }
        }

        let mut function_names = HashSet::new();
        for (i, func) in self.functions.iter().enumerate() {
            let path = format!("functions[{}]", i);
            func.validate().map_err(|e| e.within(&path))?;
            if !function_names.insert(func.name.as_str()) {
                return Err(ConfigError::validation(
                    format!("{}.name", path),
                    format!("duplicate function '{}'", func.name),
                ));
            }
        }
        Ok(())
    }

    /// Expand `${VAR}` references in every literal env value
    pub fn substitute_environment(&mut self, lookup: &EnvLookup) {
        substitute_map(&mut self.environment, lookup);
        for delta in self.overrides.values_mut() {
            substitute_map(&mut delta.environment, lookup);
        }
        for func in &mut self.functions {
            substitute_map(&mut func.environment, lookup);
        }
    }
}

fn substitute_map(env: &mut BTreeMap<String, EnvValue>, lookup: &EnvLookup) {
    let taken = std::mem::take(env);
    *env = taken
        .into_iter()
        .map(|(k, v)| (k, v.substituted(lookup)))
        .collect();
}

fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() || sanitize_name(namespace) != namespace {
        return Err(ConfigError::validation(
            "",
            format!("'{}' is not a valid namespace name", namespace),
        ));
    }
    Ok(())
}

fn validate_env_names(env: &BTreeMap<String, EnvValue>) -> Result<()> {
    for name in env.keys() {
        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid {
            return Err(ConfigError::validation(
                name.as_str(),
                "not a valid environment variable name",
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Overrides
// =============================================================================

/// Per-environment delta merged over the base spec
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppOverride {
    /// Replaces `enabled`
    pub enabled: Option<bool>,
    /// Replaces `namespace`
    pub namespace: Option<String>,
    /// Replaces the static replica count
    pub replicas: Option<u32>,
    /// Replaces `resources`
    pub resources: Option<ResourceConfig>,
    /// Replaces `scaling`
    pub scaling: Option<ScalingConfig>,
    /// Replaces `pdb`
    pub pdb: Option<PdbConfig>,
    /// Merged over `environment`
    pub environment: BTreeMap<String, EnvValue>,
    /// Merged over `ingress.annotations`
    pub ingress_annotations: BTreeMap<String, String>,
}

impl AppOverride {
    /// Validate the parts the override replaces
    pub fn validate(&self) -> Result<()> {
        if let Some(namespace) = &self.namespace {
            validate_namespace(namespace).map_err(|e| e.within("namespace"))?;
        }
        if self.replicas == Some(0) {
            return Err(ConfigError::validation("replicas", "must be at least 1"));
        }
        if let Some(resources) = &self.resources {
            resources.validate().map_err(|e| e.within("resources"))?;
        }
        if let Some(scaling) = &self.scaling {
            scaling.resolve().map_err(|e| e.within("scaling"))?;
        }
        if let Some(pdb) = &self.pdb {
            pdb.validate().map_err(|e| e.within("pdb"))?;
        }
        validate_env_names(&self.environment).map_err(|e| e.within("environment"))
    }
}

// =============================================================================
// Functions
// =============================================================================

/// What invokes a function
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// HTTP requests
    #[default]
    Http,
    /// Messages on a queue
    Queue,
    /// Cron schedule
    Schedule,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Queue => "queue",
            Self::Schedule => "schedule",
        })
    }
}

/// One function of a function app
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
    /// Function name
    pub name: String,
    /// Trigger
    #[serde(default)]
    pub trigger: TriggerKind,
    /// HTTP route (default `/<name>`)
    #[serde(default)]
    pub route: Option<String>,
    /// Queue to consume (queue trigger)
    #[serde(default)]
    pub queue: Option<String>,
    /// Messages handled per invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Cron schedule (schedule trigger)
    #[serde(default)]
    pub schedule: Option<String>,
    /// Timezone of `schedule`
    #[serde(default = "scaling::default_timezone")]
    pub timezone: String,
    /// Visibility override
    #[serde(default)]
    pub visibility: Option<Visibility>,
    /// Resources override
    #[serde(default)]
    pub resources: Option<ResourceConfig>,
    /// Scaling override
    #[serde(default)]
    pub scaling: Option<ScalingConfig>,
    /// Env vars merged over the app's
    #[serde(default)]
    pub environment: BTreeMap<String, EnvValue>,
}

fn default_batch_size() -> u32 {
    1
}

impl FunctionSpec {
    /// HTTP route of the function
    pub fn route(&self) -> String {
        self.route
            .clone()
            .unwrap_or_else(|| format!("/{}", self.name))
    }

    /// Validate trigger requirements; paths are relative to the function
    pub fn validate(&self) -> Result<()> {
        if sanitize_name(&self.name).is_empty() {
            return Err(ConfigError::validation(
                "name",
                format!("'{}' contains no valid DNS label characters", self.name),
            ));
        }
        match self.trigger {
            TriggerKind::Http => {
                if !self.route().starts_with('/') {
                    return Err(ConfigError::validation("route", "must start with '/'"));
                }
            }
            TriggerKind::Queue => {
                if self.queue.as_deref().map_or(true, |q| q.trim().is_empty()) {
                    return Err(ConfigError::validation("queue", "required when trigger=queue"));
                }
                if self.batch_size == 0 {
                    return Err(ConfigError::validation("batch_size", "must be at least 1"));
                }
            }
            TriggerKind::Schedule => match self.schedule.as_deref() {
                None => {
                    return Err(ConfigError::validation(
                        "schedule",
                        "required when trigger=schedule",
                    ))
                }
                Some(expr) if !scaling::is_cron_expression(expr) => {
                    return Err(ConfigError::validation(
                        "schedule",
                        format!("'{}' is not a five-field cron expression", expr),
                    ))
                }
                Some(_) => {}
            },
        }
        if let Some(resources) = &self.resources {
            resources.validate().map_err(|e| e.within("resources"))?;
        }
        if let Some(scaling) = &self.scaling {
            scaling.resolve().map_err(|e| e.within("scaling"))?;
        }
        validate_env_names(&self.environment).map_err(|e| e.within("environment"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env_value::SecretRef;

    fn app(yaml: &str) -> AppSpec {
        let mut spec: AppSpec = serde_yaml::from_str(yaml).expect("valid app yaml");
        if spec.namespace.is_empty() {
            spec.namespace = crate::DEFAULT_NAMESPACE.to_string();
        }
        spec
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn test_minimal_app_gets_defaults() {
        let spec = app("name: api\n");
        assert!(spec.enabled);
        assert_eq!(spec.scaling.kind, ScalingKind::RequestRateAutoscale);
        assert_eq!(spec.security.visibility, Visibility::Private);
        assert!(!spec.ingress.enabled);
        spec.validate().expect("minimal app is valid");
    }

    #[test]
    fn test_unknown_app_field_rejected() {
        let result: std::result::Result<AppSpec, _> = serde_yaml::from_str("name: api\nreplica: 2\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_name_rejected() {
        let spec = app("name: '___'\n");
        let err = spec.validate().expect_err("name normalizes to nothing");
        assert!(err.to_string().starts_with("name:"));
    }

    #[test]
    fn test_nested_errors_carry_section_path() {
        let spec = app("name: worker\nscaling:\n  kind: keda-queue\n");
        let err = spec.validate().expect_err("queue name missing");
        assert_eq!(
            err.to_string(),
            "scaling.queue_name: required when kind=queue-depth-autoscale"
        );
    }

    #[test]
    fn test_invalid_env_name_rejected() {
        let spec = app("name: api\nenvironment:\n  'BAD NAME': x\n");
        assert!(spec.validate().is_err());
    }

    // =========================================================================
    // Overrides
    // =========================================================================

    #[test]
    fn test_effective_without_override_is_base() {
        let spec = app("name: api\n");
        assert_eq!(spec.effective("gcp"), spec);
    }

    #[test]
    fn test_override_replaces_sections_and_merges_maps() {
        let spec = app(
            r#"
name: api
environment:
  LOG_LEVEL: info
  REGION: eu
ingress:
  annotations:
    a: base
scaling:
  kind: none
  replicas: 1
overrides:
  gcp:
    replicas: 3
    namespace: prod
    resources:
      memory: 1Gi
    environment:
      LOG_LEVEL: warn
    ingress_annotations:
      a: override
      b: added
"#,
        );

        let effective = spec.effective("gcp");
        assert_eq!(effective.namespace, "prod");
        assert_eq!(effective.scaling.replicas, 3);
        assert_eq!(effective.replicas_override, Some(3));
        assert_eq!(effective.resources.memory, "1Gi");
        assert_eq!(effective.resources.cpu, "100m");
        assert_eq!(effective.environment["LOG_LEVEL"], EnvValue::literal("warn"));
        assert_eq!(effective.environment["REGION"], EnvValue::literal("eu"));
        assert_eq!(effective.ingress.annotations["a"], "override");
        assert_eq!(effective.ingress.annotations["b"], "added");

        assert_eq!(spec.effective("dev").namespace, "apps");
    }

    #[test]
    fn test_override_validation_reports_relative_path() {
        let spec = app("name: api\noverrides:\n  dev:\n    scaling:\n      kind: hpa\n      min: 4\n      max: 2\n");
        let err = spec.overrides["dev"].validate().expect_err("min > max");
        assert_eq!(err.to_string(), "scaling.min: must not exceed max (min=4, max=2)");
    }

    // =========================================================================
    // Functions
    // =========================================================================

    #[test]
    fn test_function_workload_names() {
        let spec = app(
            "name: billing\nfunctions:\n  - name: charge\n  - name: refund_all\n    trigger: queue\n    queue: refunds\n",
        );
        assert_eq!(spec.workload_names(), vec!["billing-charge", "billing-refund-all"]);
        spec.validate().expect("valid function app");
    }

    #[test]
    fn test_reserved_names_include_interceptor_services() {
        let spec = app("name: billing\nfunctions:\n  - name: charge\n");
        assert_eq!(
            spec.reserved_names(),
            vec!["billing-charge", "billing-charge-interceptor"]
        );
        assert_eq!(app("name: api\n").reserved_names(), vec!["api", "api-interceptor"]);
    }

    #[test]
    fn test_function_trigger_requirements() {
        let spec = app("name: jobs\nfunctions:\n  - name: nightly\n    trigger: schedule\n");
        let err = spec.validate().expect_err("schedule missing");
        assert_eq!(err.to_string(), "functions[0].schedule: required when trigger=schedule");

        let spec = app("name: jobs\nfunctions:\n  - name: drain\n    trigger: queue\n");
        let err = spec.validate().expect_err("queue missing");
        assert_eq!(err.to_string(), "functions[0].queue: required when trigger=queue");
    }

    #[test]
    fn test_duplicate_function_names_rejected() {
        let spec = app("name: f\nfunctions:\n  - name: a\n  - name: a\n");
        let err = spec.validate().expect_err("duplicate");
        assert_eq!(err.to_string(), "functions[1].name: duplicate function 'a'");
    }

    #[test]
    fn test_function_route_defaults_to_name() {
        let spec = app("name: f\nfunctions:\n  - name: hello\n  - name: bye\n    route: /api/bye\n");
        assert_eq!(spec.functions[0].route(), "/hello");
        assert_eq!(spec.functions[1].route(), "/api/bye");
    }

    // =========================================================================
    // Environment
    // =========================================================================

    #[test]
    fn test_secret_env_lists_only_secrets() {
        let mut spec = AppSpec::new("api", "services/api");
        spec.environment.insert("A".into(), EnvValue::literal("1"));
        spec.environment
            .insert("B".into(), EnvValue::Secret(SecretRef::new("b-secret")));
        let secrets: Vec<_> = spec.secret_env().map(|(k, _)| k).collect();
        assert_eq!(secrets, vec!["B"]);
    }

    #[test]
    fn test_substitution_covers_overrides_and_functions() {
        let mut spec = app(
            "name: f\nenvironment:\n  A: ${X}\noverrides:\n  dev:\n    environment:\n      B: ${X:-d}\nfunctions:\n  - name: g\n    environment:\n      C: pre-${X}\n",
        );
        let lookup = |name: &str| (name == "X").then(|| "v".to_string());
        spec.substitute_environment(&lookup);
        assert_eq!(spec.environment["A"], EnvValue::literal("v"));
        assert_eq!(spec.overrides["dev"].environment["B"], EnvValue::literal("v"));
        assert_eq!(spec.functions[0].environment["C"], EnvValue::literal("pre-v"));
    }
}
