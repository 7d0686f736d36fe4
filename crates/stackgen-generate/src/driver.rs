//! Generation run
//!
//! [`Driver::run`] turns a loaded configuration into one rendered document
//! per app for a single environment. Apps are processed sequentially in
//! configuration order. A failing app is recorded in the [`RunReport`] and
//! the run carries on with the next one; only problems that affect every app
//! (unknown environment, unknown `--app`) abort the run.
//!
//! A `gateway` section with routes is rendered after the apps as one more
//! output named `gateway`; `--app gateway` selects it alone.

use std::fmt;

use stackgen_common::k8s::Manifest;
use stackgen_config::gateway::GATEWAY_SECTION;
use stackgen_config::{AppSpec, Config, EnvironmentProfile};
use tracing::{debug, info, warn};

use crate::context::GenerationContext;
use crate::error::GenerateError;
use crate::gateway::{self, GatewayContext};
use crate::registry::Registry;
use crate::Result;

// =============================================================================
// Options and report
// =============================================================================

/// Rendering of an app's manifests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-document YAML separated by `---`
    #[default]
    Yaml,
    /// A JSON array
    Json,
}

impl OutputFormat {
    /// File extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }

    /// Render manifests as one document
    pub fn render(&self, manifests: &[Manifest]) -> std::result::Result<String, String> {
        match self {
            Self::Yaml => {
                let mut out = String::new();
                for (i, manifest) in manifests.iter().enumerate() {
                    if i > 0 {
                        out.push_str("---\n");
                    }
                    out.push_str(&serde_yaml::to_string(manifest).map_err(|e| e.to_string())?);
                }
                Ok(out)
            }
            Self::Json => serde_json::to_string_pretty(manifests)
                .map(|mut out| {
                    out.push('\n');
                    out
                })
                .map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// What to generate
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Target environment
    pub env: String,
    /// Generate only this app
    pub app: Option<String>,
    /// Also generate apps disabled for the environment
    pub include_disabled: bool,
    /// Image tag overriding the profile's
    pub tag: Option<String>,
    /// Output rendering
    pub format: OutputFormat,
}

impl RunOptions {
    /// Options for every enabled app in `env`
    pub fn for_env(env: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            ..Self::default()
        }
    }
}

/// Rendered output of one app
#[derive(Clone, Debug, PartialEq)]
pub struct AppOutput {
    /// App name as configured
    pub app: String,
    /// `<name>.yaml` or `<name>.json`
    pub file_name: String,
    /// Number of objects in the document
    pub objects: usize,
    /// Rendered document
    pub rendered: String,
}

/// An app that could not be generated
#[derive(Debug)]
pub struct AppFailure {
    /// App name as configured
    pub app: String,
    /// Why
    pub error: GenerateError,
}

/// Outcome of a run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Generated apps, in configuration order
    pub outputs: Vec<AppOutput>,
    /// Failed apps, in configuration order
    pub failures: Vec<AppFailure>,
    /// Apps skipped because they are disabled
    pub skipped: Vec<String>,
}

impl RunReport {
    /// Whether every selected app was generated
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Runs app generators over a configuration
pub struct Driver {
    registry: Registry,
}

impl Driver {
    /// Driver dispatching through `registry`
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Registry used for dispatch
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Manifests for one app in the environment described by `profile`
    pub fn generate_app(
        &self,
        app: &AppSpec,
        profile: &EnvironmentProfile,
        env: &str,
    ) -> Result<Vec<Manifest>> {
        let generator = self.registry.resolve(&app.app_type)?;
        let ctx = GenerationContext::new(app, profile, env)?;
        generator.generate(&ctx)
    }

    /// Gateway objects for the environment described by `profile`
    pub fn generate_gateway(
        &self,
        config: &Config,
        profile: &EnvironmentProfile,
        env: &str,
    ) -> Result<Vec<Manifest>> {
        let ctx = GatewayContext::new(&config.gateway, profile, env, &config.defaults.namespace);
        gateway::generate(&ctx)
    }

    /// Generate and render the selected apps
    pub fn run(&self, config: &Config, options: &RunOptions) -> Result<RunReport> {
        let mut profile = config.profile(&options.env)?.clone();
        if let Some(tag) = &options.tag {
            profile = profile.with_tag(tag.clone());
        }

        let gateway_only =
            config.gateway.has_routes() && options.app.as_deref() == Some(GATEWAY_SECTION);
        let with_gateway = config.gateway.has_routes() && (options.app.is_none() || gateway_only);

        let apps: Vec<&AppSpec> = match &options.app {
            Some(_) if gateway_only => Vec::new(),
            Some(name) => vec![config.app(name).ok_or_else(|| GenerateError::UnknownApp {
                name: name.clone(),
            })?],
            None => config.apps.iter().collect(),
        };

        info!(env = %options.env, apps = apps.len(), gateway = with_gateway, "generating manifests");
        let mut report = RunReport::default();

        for app in apps {
            if !options.include_disabled && !app.effective(&options.env).enabled {
                debug!(app = %app.name, env = %options.env, "disabled, skipping");
                report.skipped.push(app.name.clone());
                continue;
            }

            let manifests = self.generate_app(app, &profile, &options.env);
            report.record(&app.name, &app.object_name(), manifests, options);
        }

        if with_gateway {
            let manifests = self.generate_gateway(config, &profile, &options.env);
            report.record(GATEWAY_SECTION, GATEWAY_SECTION, manifests, options);
        }

        Ok(report)
    }
}

impl RunReport {
    /// Render `manifests` into an output, or record why they are missing
    fn record(
        &mut self,
        app: &str,
        file_stem: &str,
        manifests: Result<Vec<Manifest>>,
        options: &RunOptions,
    ) {
        let rendered = manifests.and_then(|manifests| {
            let rendered = options
                .format
                .render(&manifests)
                .map_err(|message| GenerateError::serialization(app, message))?;
            Ok((manifests.len(), rendered))
        });

        match rendered {
            Ok((objects, rendered)) => {
                info!(app = %app, env = %options.env, objects, "generated");
                self.outputs.push(AppOutput {
                    app: app.to_string(),
                    file_name: format!("{}.{}", file_stem, options.format.extension()),
                    objects,
                    rendered,
                });
            }
            Err(error) => {
                warn!(app = %app, env = %options.env, error = %error, "generation failed");
                self.failures.push(AppFailure {
                    app: app.to_string(),
                    error,
                });
            }
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new(Registry::builtin())
    }
}
