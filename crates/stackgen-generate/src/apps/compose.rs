//! Compose apps (`compose:` section)
//!
//! Every compose service becomes a workload `<project>-<service>`. The first
//! service exposing a port is the primary service: it takes the app's
//! scaling, ingress and disruption budget. The others run at their
//! `deploy.replicas` count behind a plain Service, or no Service when they
//! listen on nothing.
//!
//! Named volumes are project-wide: one claim `<project>-<volume>` per
//! top-level volume, mounted by every service that references it.

use std::collections::BTreeMap;
use std::sync::Arc;

use stackgen_common::k8s::Manifest;
use stackgen_common::kube_utils::sanitize_name;
use stackgen_config::compose::{ComposeMount, ComposeService, Healthcheck, MountKind};
use stackgen_config::model::{
    ContainerSecurityConfig, PortConfig, ProbeConfig, ProbeKind, ProbesConfig, ResourceConfig,
    ScalingConfig, ScalingKind, VolumeConfig, VolumeKind, COMPOSE_SECTION,
};
use stackgen_config::{AppSpec, ComposeProject, EnvValue};
use tracing::debug;

use super::{shared_plan, workload_plan};
use crate::context::{GenerationContext, WorkloadScope, WorkloadShape};
use crate::generator::{self, AppGenerator, ManifestGenerator};
use crate::storage;
use crate::Result;

/// One workload per compose service
pub struct ComposeApp;

impl ComposeApp {
    fn project<'c>(ctx: &'c GenerationContext<'_>) -> Result<&'c ComposeProject> {
        ctx.app
            .compose
            .as_ref()
            .ok_or_else(|| ctx.unsupported("file", format!("{} was not loaded", ctx.app.compose_file())))
    }

    /// Child workload for `service`; `primary` services inherit the app's
    /// scaling, ingress and disruption budget
    fn service_scope(
        ctx: &GenerationContext<'_>,
        project: &ComposeProject,
        service: &ComposeService,
        primary: bool,
    ) -> Result<WorkloadScope> {
        let naming = ctx.naming.child(&service.name);

        let mut app: AppSpec = ctx.app.clone();
        app.name = naming.base().to_string();
        app.compose = None;
        app.file = None;
        app.image = service.image.clone();

        app.container.command = service.entrypoint.clone();
        app.container.args = service.command.clone();
        app.container.ports = service_ports(service);

        let mut environment: BTreeMap<String, EnvValue> = service
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), EnvValue::literal(v.clone())))
            .collect();
        environment.extend(ctx.app.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
        app.environment = environment;

        app.resources = service_resources(service);
        if let Some(check) = &service.healthcheck {
            app.probes = exec_probes(check);
        } else if !primary {
            app.probes = ProbesConfig::default();
        }

        app.volumes = service
            .volumes
            .iter()
            .enumerate()
            .map(|(i, mount)| mount_volume(ctx, project, i, mount))
            .collect();

        if let Some(user) = &service.user {
            let mut security = app.security.container_security_context.take().unwrap_or_default();
            security.run_as_user = Some(user.uid);
            security.run_as_group = user.gid;
            app.security.container_security_context = Some(security);
        }

        if primary {
            if app.scaling.kind == ScalingKind::None && app.replicas_override.is_none() {
                if let Some(replicas) = service.replicas {
                    app.scaling.replicas = replicas;
                }
            }
        } else {
            app.scaling = ScalingConfig {
                kind: ScalingKind::None,
                replicas: service.replicas.unwrap_or(1),
                ..ScalingConfig::default()
            };
            app.ingress.enabled = false;
            app.pdb = None;
        }

        let image = match &service.image {
            Some(image) => image.clone(),
            None => ctx.profile.resolve_image(naming.base(), &ctx.app.path),
        };
        let mut shape = WorkloadShape::deployment(sanitize_name(&service.name), image);
        shape.service = service.exposes_ports();

        ctx.scope(&format!("services.{}", service.name), app, naming, shape)
    }
}

fn service_ports(service: &ComposeService) -> Vec<PortConfig> {
    service
        .ports
        .iter()
        .enumerate()
        .map(|(i, port)| PortConfig {
            name: if i == 0 {
                "http".to_string()
            } else {
                format!("port-{}", i)
            },
            container_port: port.container_port,
            service_port: port.service_port(),
            protocol: port.protocol.clone(),
        })
        .collect()
}

/// Requests from reservations, falling back to limits; limits as given
fn service_resources(service: &ComposeService) -> ResourceConfig {
    let defaults = ResourceConfig::default();
    let pick = |reserved: &Option<String>, limit: &Option<String>, default: String| {
        reserved.clone().or_else(|| limit.clone()).unwrap_or(default)
    };
    ResourceConfig {
        memory: pick(
            &service.reservations.memory,
            &service.limits.memory,
            defaults.memory,
        ),
        cpu: pick(&service.reservations.cpu, &service.limits.cpu, defaults.cpu),
        memory_limit: service.limits.memory.clone(),
        cpu_limit: service.limits.cpu.clone(),
        ephemeral_storage: None,
    }
}

fn exec_probes(check: &Healthcheck) -> ProbesConfig {
    let defaults = ProbeConfig::default();
    let probe = ProbeConfig {
        kind: ProbeKind::Exec,
        command: check.command.clone(),
        initial_delay: check.start_period.unwrap_or(defaults.initial_delay),
        period: check.interval.filter(|s| *s > 0).unwrap_or(defaults.period),
        timeout: check.timeout.filter(|s| *s > 0).unwrap_or(defaults.timeout),
        failure_threshold: check
            .retries
            .filter(|r| *r > 0)
            .unwrap_or(defaults.failure_threshold),
        ..defaults
    };
    ProbesConfig {
        startup: None,
        readiness: Some(probe.clone()),
        liveness: Some(probe),
    }
}

fn mount_volume(
    ctx: &GenerationContext<'_>,
    project: &ComposeProject,
    index: usize,
    mount: &ComposeMount,
) -> VolumeConfig {
    let mut volume = match (mount.kind, &mount.source) {
        (MountKind::Volume, Some(source)) => {
            let mut volume = VolumeConfig::new(sanitize_name(source), VolumeKind::Pvc, &mount.target);
            volume.claim_name = Some(if project.is_external_volume(source) {
                source.clone()
            } else {
                ctx.naming.app_object(source)
            });
            volume
        }
        (MountKind::Volume, None) => {
            VolumeConfig::new(format!("anon-{}", index), VolumeKind::EmptyDir, &mount.target)
        }
        (MountKind::Bind, source) => {
            let mut volume =
                VolumeConfig::new(format!("bind-{}", index), VolumeKind::HostPath, &mount.target);
            volume.host_path = source.clone();
            volume
        }
        (MountKind::Tmpfs, _) => {
            let mut volume =
                VolumeConfig::new(format!("tmpfs-{}", index), VolumeKind::EmptyDir, &mount.target);
            volume.medium = Some("Memory".to_string());
            volume
        }
    };
    volume.read_only = mount.read_only;
    volume
}

// =============================================================================
// Project claims
// =============================================================================

/// One claim per top-level named volume not marked `external`
struct ProjectClaims;

impl ManifestGenerator for ProjectClaims {
    fn name(&self) -> &'static str {
        "compose-volumes"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.app
            .compose
            .as_ref()
            .is_some_and(|project| project.volumes.values().any(|v| !v.external))
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let Some(project) = &ctx.app.compose else {
            return Vec::new();
        };
        project
            .volumes
            .iter()
            .filter(|(_, volume)| !volume.external)
            .map(|(name, _)| {
                let volume = VolumeConfig::new(name.clone(), VolumeKind::Pvc, "");
                storage::claim(ctx, ctx.naming.app_object(name), &volume).into()
            })
            .collect()
    }
}

impl AppGenerator for ComposeApp {
    fn app_type(&self) -> &'static str {
        COMPOSE_SECTION
    }

    fn plan(&self, ctx: &GenerationContext<'_>) -> Result<Vec<Box<dyn ManifestGenerator>>> {
        let project = Self::project(ctx)?;
        if project.services.is_empty() {
            return Err(ctx.unsupported("file", "compose file defines no services"));
        }

        let primary = project.primary_index();
        if primary.is_none() {
            if ctx.app.ingress.enabled {
                return Err(ctx.unsupported(
                    "ingress.enabled",
                    "no compose service exposes a port to route to",
                ));
            }
            debug!(app = %ctx.naming.app(), "no compose service exposes a port");
        }

        let mut plan = shared_plan(ctx)?;
        for (i, service) in project.services.iter().enumerate() {
            let scope = Arc::new(Self::service_scope(ctx, project, service, primary == Some(i))?);
            plan.extend(generator::scoped(
                &scope,
                workload_plan(&ctx.scoped(&scope))?,
            ));
        }
        plan.push(Box::new(ProjectClaims));
        Ok(plan)
    }
}
