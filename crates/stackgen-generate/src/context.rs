//! Generation context and naming
//!
//! A [`GenerationContext`] is rebuilt for every (app, environment) pair and
//! dropped once the app's manifests are produced. It carries the effective
//! (override-merged) spec, the resolved scaling policy and the environment
//! profile, so generators never look at raw configuration or branch on the
//! environment name themselves.
//!
//! Function and compose apps produce several workloads. Each child workload is
//! described by a [`WorkloadScope`]; [`GenerationContext::scoped`] rebuilds the
//! context for that child while keeping the profile and environment.

use std::collections::BTreeMap;

use stackgen_common::kube_utils::{suffixed_name, ObjectMeta};
use stackgen_common::{
    LABEL_APP, LABEL_ENVIRONMENT, LABEL_MANAGED_BY, LABEL_MANAGED_BY_STACKGEN, LABEL_NAME,
    LABEL_PART_OF,
};
use stackgen_config::model::PortConfig;
use stackgen_config::{AppSpec, ConfigError, EnvironmentProfile, ScalingPolicy};

use crate::error::GenerateError;
use crate::Result;

// =============================================================================
// Naming
// =============================================================================

/// Derives object names and labels for one workload.
///
/// `base` names the workload itself; `app` is the logical app it belongs to.
/// They are equal for container apps and differ for function and compose
/// children (`billing-charge` is part of `billing`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Naming {
    base: String,
    app: String,
    env: String,
}

impl Naming {
    /// Naming for a top-level app
    pub fn new(app_name: &str, env: &str) -> Self {
        let base = suffixed_name(app_name, "");
        Self {
            app: base.clone(),
            base,
            env: env.to_string(),
        }
    }

    /// Naming for a child workload `<app>-<child>`
    pub fn child(&self, child: &str) -> Self {
        Self {
            base: suffixed_name(&self.app, child),
            app: self.app.clone(),
            env: self.env.clone(),
        }
    }

    /// Workload name
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Logical app name
    pub fn app(&self) -> &str {
        &self.app
    }

    /// `<base>-<suffix>`
    pub fn object(&self, suffix: &str) -> String {
        suffixed_name(&self.base, suffix)
    }

    /// `<app>-<suffix>`, for objects shared by every workload of the app
    pub fn app_object(&self, suffix: &str) -> String {
        suffixed_name(&self.app, suffix)
    }

    /// Labels selecting this workload's pods
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), self.base.clone());
        labels
    }

    /// Labels carried by every generated object
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(LABEL_NAME.to_string(), self.base.clone());
        labels.insert(LABEL_PART_OF.to_string(), self.app.clone());
        labels.insert(
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_STACKGEN.to_string(),
        );
        labels.insert(LABEL_ENVIRONMENT.to_string(), self.env.clone());
        labels
    }
}

// =============================================================================
// Workload shape
// =============================================================================

/// How the app type shapes its workload
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadShape {
    /// Name of the single container
    pub container_name: String,
    /// Image reference
    pub image: String,
    /// Whether a Service fronts the workload
    pub service: bool,
    /// Run as a CronJob instead of a Deployment
    pub schedule: Option<CronSchedule>,
}

impl WorkloadShape {
    /// Long-running container named after the workload
    pub fn deployment(container_name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            image: image.into(),
            service: true,
            schedule: None,
        }
    }
}

/// CronJob timing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronSchedule {
    /// Cron expression
    pub schedule: String,
    /// IANA timezone
    pub timezone: String,
}

/// A child workload of a multi-workload app
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadScope {
    /// Effective spec of the child
    pub app: AppSpec,
    /// Child naming
    pub naming: Naming,
    /// Resolved scaling of the child
    pub scaling: ScalingPolicy,
    /// Child shape
    pub shape: WorkloadShape,
}

// =============================================================================
// GenerationContext
// =============================================================================

/// Everything a generator may read about one workload
#[derive(Clone, Debug)]
pub struct GenerationContext<'a> {
    /// Effective spec (overrides for `env` applied)
    pub app: AppSpec,
    /// Target environment profile
    pub profile: &'a EnvironmentProfile,
    /// Target environment name
    pub env: &'a str,
    /// Names and labels
    pub naming: Naming,
    /// Resolved scaling policy
    pub scaling: ScalingPolicy,
    /// Workload shape chosen by the app type
    pub shape: WorkloadShape,
}

impl<'a> GenerationContext<'a> {
    /// Build the context for `app` in `env`.
    ///
    /// Applies the environment override and re-checks the scaling policy on
    /// the merged result.
    pub fn new(app: &AppSpec, profile: &'a EnvironmentProfile, env: &'a str) -> Result<Self> {
        let app = app.effective(env);
        let naming = Naming::new(&app.name, env);
        let scaling = resolve_scaling(&app, &naming, "scaling")?;
        let image = app
            .image
            .clone()
            .unwrap_or_else(|| profile.resolve_image(&app.name, &app.path));
        let shape = WorkloadShape::deployment(naming.base(), image);

        Ok(Self {
            app,
            profile,
            env,
            naming,
            scaling,
            shape,
        })
    }

    /// Describe a child workload; `field` locates the child in the app entry
    pub fn scope(
        &self,
        field: &str,
        app: AppSpec,
        naming: Naming,
        shape: WorkloadShape,
    ) -> Result<WorkloadScope> {
        let scaling = resolve_scaling(&app, &naming, &format!("{}.scaling", field))?;
        Ok(WorkloadScope {
            app,
            naming,
            scaling,
            shape,
        })
    }

    /// Context for a child workload
    pub fn scoped(&self, scope: &WorkloadScope) -> GenerationContext<'a> {
        GenerationContext {
            app: scope.app.clone(),
            profile: self.profile,
            env: self.env,
            naming: scope.naming.clone(),
            scaling: scope.scaling.clone(),
            shape: scope.shape.clone(),
        }
    }

    /// Workload name
    pub fn name(&self) -> &str {
        self.naming.base()
    }

    /// Target namespace
    pub fn namespace(&self) -> &str {
        &self.app.namespace
    }

    /// Metadata for an object named `name` with the common labels
    pub fn metadata(&self, name: impl Into<String>) -> ObjectMeta {
        ObjectMeta::new(name, self.namespace()).with_labels(&self.naming.labels())
    }

    /// Primary container port
    pub fn primary_port(&self) -> PortConfig {
        self.app.container.primary_port()
    }

    /// Name of the Secret the ExternalSecret materializes
    pub fn secrets_name(&self) -> String {
        self.naming.app_object("secrets")
    }

    /// Whether secret references are synced by an ExternalSecret
    pub fn secret_sync(&self) -> bool {
        self.profile.external_secrets && self.app.secret_env().next().is_some()
    }

    /// ServiceAccount the pods run as, if any
    pub fn service_account(&self) -> Option<String> {
        self.app.security.service_account_name(self.naming.app())
    }

    /// Unsupported-combination error attributed to this app
    pub fn unsupported(&self, field: impl Into<String>, msg: impl Into<String>) -> GenerateError {
        GenerateError::unsupported(self.naming.app(), field, msg)
    }
}

fn resolve_scaling(app: &AppSpec, naming: &Naming, field: &str) -> Result<ScalingPolicy> {
    app.scaling
        .resolve()
        .map_err(|e| match e.within(field) {
            ConfigError::Validation { path, message } => {
                GenerateError::unsupported(naming.app(), path, message)
            }
            other => GenerateError::Profile(other),
        })
}
