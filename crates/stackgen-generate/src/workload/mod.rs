//! Workload generators: Deployment, Service, CronJob and PodDisruptionBudget
//!
//! All of them build on the shared pod template in [`pod_template`]. Which
//! ones apply follows the workload shape: long-running workloads get a
//! Deployment (plus a Service when they accept traffic), scheduled ones a
//! CronJob.

pub mod pdb;
pub mod pod_template;

use stackgen_common::k8s::apps::{
    CronJob, CronJobSpec, Deployment, DeploymentSpec, JobSpec, JobTemplateSpec, Service,
    ServicePort,
};
use stackgen_common::k8s::pod::LabelSelector;
use stackgen_common::k8s::Manifest;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;

pub use pdb::PdbGenerator;

// =============================================================================
// Deployment
// =============================================================================

/// Deployment `<n>`
///
/// `replicas` is only written for static scaling; autoscalers own the count
/// otherwise.
pub struct DeploymentGenerator;

impl ManifestGenerator for DeploymentGenerator {
    fn name(&self) -> &'static str {
        "deployment"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.shape.schedule.is_none()
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let deployment = Deployment::new(
            ctx.metadata(ctx.name()),
            DeploymentSpec {
                replicas: ctx.scaling.static_replicas(),
                selector: LabelSelector::matching(ctx.naming.selector_labels()),
                template: pod_template::compile(ctx),
            },
        );
        vec![deployment.into()]
    }
}

// =============================================================================
// Service
// =============================================================================

/// ClusterIP Service `<n>` exposing every container port
pub struct ServiceGenerator;

impl ManifestGenerator for ServiceGenerator {
    fn name(&self) -> &'static str {
        "service"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.shape.service && ctx.shape.schedule.is_none()
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let ports = ctx
            .app
            .container
            .effective_ports()
            .into_iter()
            .map(|port| ServicePort {
                name: Some(port.name),
                port: port.service_port,
                target_port: Some(port.container_port),
                protocol: Some(port.protocol),
            })
            .collect();

        let service = Service::cluster_ip(
            ctx.metadata(ctx.name()),
            ctx.naming.selector_labels(),
            ports,
        );
        vec![service.into()]
    }
}

// =============================================================================
// CronJob
// =============================================================================

/// CronJob `<n>` for scheduled workloads; overlapping runs are forbidden
pub struct CronJobGenerator;

impl ManifestGenerator for CronJobGenerator {
    fn name(&self) -> &'static str {
        "cronjob"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.shape.schedule.is_some()
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let Some(schedule) = &ctx.shape.schedule else {
            return Vec::new();
        };

        let cron_job = CronJob::new(
            ctx.metadata(ctx.name()),
            CronJobSpec {
                schedule: schedule.schedule.clone(),
                time_zone: Some(schedule.timezone.clone()),
                concurrency_policy: Some("Forbid".to_string()),
                job_template: JobTemplateSpec {
                    spec: JobSpec {
                        backoff_limit: None,
                        template: pod_template::compile(ctx),
                    },
                },
            },
        );
        vec![cron_job.into()]
    }
}
