//! App generators, one per app-type section
//!
//! - [`ContainerApp`] (`apps`): one workload per entry
//! - [`FunctionApp`] (`functions`): one workload per function, sharing the
//!   app image, ServiceAccount and ExternalSecret
//! - [`ComposeApp`] (`compose`): one workload per compose service
//!
//! Every workload runs the same generator sequence, built by
//! [`workload_plan`]; objects shared by all workloads of an app come first
//! from [`shared_plan`].

pub mod compose;
pub mod container;
pub mod function;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;
use crate::security::{ExternalSecretGenerator, NetworkPolicyGenerator, ServiceAccountGenerator};
use crate::storage::{ConfigMapGenerator, PvcGenerator};
use crate::workload::{CronJobGenerator, DeploymentGenerator, PdbGenerator, ServiceGenerator};
use crate::{ingress, scaling, Result};

pub use compose::ComposeApp;
pub use container::ContainerApp;
pub use function::FunctionApp;

/// Objects shared by every workload of an app: ServiceAccount, ExternalSecret.
///
/// Fails when a secret reference names a provider the environment's store
/// does not serve.
pub fn shared_plan(ctx: &GenerationContext<'_>) -> Result<Vec<Box<dyn ManifestGenerator>>> {
    ExternalSecretGenerator::check_providers(ctx)?;
    Ok(vec![
        Box::new(ServiceAccountGenerator),
        Box::new(ExternalSecretGenerator),
    ])
}

/// Generators for one workload, in emission order.
///
/// Deployment (or CronJob), Service, the scaler for the resolved policy,
/// ingress, NetworkPolicy, PodDisruptionBudget, then storage.
pub fn workload_plan(ctx: &GenerationContext<'_>) -> Result<Vec<Box<dyn ManifestGenerator>>> {
    let mut plan: Vec<Box<dyn ManifestGenerator>> = vec![
        Box::new(DeploymentGenerator),
        Box::new(CronJobGenerator),
        Box::new(ServiceGenerator),
    ];
    plan.extend(scaling::for_policy(&ctx.scaling));
    plan.push(ingress::select(ctx)?);
    plan.push(Box::new(NetworkPolicyGenerator));
    plan.push(Box::new(PdbGenerator));
    plan.push(Box::new(PvcGenerator));
    plan.push(Box::new(ConfigMapGenerator));
    Ok(plan)
}
