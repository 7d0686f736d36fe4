//! Pod template compilation
//!
//! Builds the single-container pod shared by Deployments and CronJobs: image,
//! ports, env, resources, probes, volumes and security contexts.

use stackgen_common::k8s::apps::{PodMeta, PodSpec, PodTemplateSpec};
use stackgen_common::k8s::pod::{
    Capabilities, Container, ContainerPort, EnvFromSource, EnvVar, KeyToPath,
    LocalObjectReference, PodSecurityContext, Probe, ResourceQuantity, ResourceRequirements,
    SecurityContext, Volume, VolumeMount,
};
use stackgen_config::model::{
    EnvFromKind, ProbeConfig, ProbeKind, ResourceConfig, VolumeConfig, VolumeKind,
};
use stackgen_config::EnvValue;
use tracing::debug;

use crate::context::GenerationContext;

/// Compile the pod template for the workload in `ctx`
pub fn compile(ctx: &GenerationContext<'_>) -> PodTemplateSpec {
    let pod_security = ctx
        .app
        .security
        .pod_security_context
        .as_ref()
        .map(|psc| PodSecurityContext {
            run_as_non_root: psc.run_as_non_root.then_some(true),
            run_as_user: psc.run_as_user,
            run_as_group: psc.run_as_group,
            fs_group: psc.fs_group,
        })
        .filter(|psc| !psc.is_empty());

    let image_pull_secrets = ctx
        .profile
        .image_pull_secrets()
        .into_iter()
        .map(|name| LocalObjectReference { name })
        .collect();

    PodTemplateSpec {
        metadata: PodMeta {
            labels: ctx.naming.labels(),
            annotations: Default::default(),
        },
        spec: PodSpec {
            service_account_name: ctx.service_account(),
            containers: vec![compile_container(ctx)],
            volumes: ctx.app.volumes.iter().map(|v| compile_volume(ctx, v)).collect(),
            security_context: pod_security,
            image_pull_secrets,
            restart_policy: ctx.shape.schedule.as_ref().map(|_| "OnFailure".to_string()),
        },
    }
}

// =============================================================================
// Container
// =============================================================================

fn compile_container(ctx: &GenerationContext<'_>) -> Container {
    let app = &ctx.app;
    let primary = ctx.primary_port();

    // Unserved workloads without declared ports get no default port
    let unserved = !ctx.shape.service && app.container.ports.is_empty();
    let ports = if ctx.shape.schedule.is_some() || unserved {
        Vec::new()
    } else {
        app.container
            .effective_ports()
            .into_iter()
            .map(|port| ContainerPort {
                name: Some(port.name),
                container_port: port.container_port,
                protocol: Some(port.protocol),
            })
            .collect()
    };

    Container {
        name: ctx.shape.container_name.clone(),
        image: ctx.shape.image.clone(),
        image_pull_policy: None,
        command: app.container.command.clone(),
        args: app.container.args.clone(),
        working_dir: app.container.working_dir.clone(),
        ports,
        env: compile_env(ctx),
        env_from: compile_env_from(ctx),
        resources: Some(compile_resources(&app.resources)),
        startup_probe: app
            .probes
            .startup
            .as_ref()
            .map(|p| compile_probe(p, primary.container_port)),
        readiness_probe: app
            .probes
            .readiness
            .as_ref()
            .map(|p| compile_probe(p, primary.container_port)),
        liveness_probe: app
            .probes
            .liveness
            .as_ref()
            .map(|p| compile_probe(p, primary.container_port)),
        volume_mounts: app
            .volumes
            .iter()
            .map(|v| VolumeMount::new(&v.name, &v.mount_path, v.read_only))
            .collect(),
        security_context: compile_security_context(ctx),
    }
}

/// Env vars in key order.
///
/// Secret references point at the synced `<app>-secrets` Secret when the
/// environment runs secret sync, otherwise at a Secret named after the
/// reference that the operator provides.
pub fn compile_env(ctx: &GenerationContext<'_>) -> Vec<EnvVar> {
    let sync = ctx.secret_sync();
    let secrets_name = ctx.secrets_name();

    ctx.app
        .environment
        .iter()
        .map(|(var, value)| match value {
            EnvValue::Literal(literal) => EnvVar::literal(var, literal),
            EnvValue::Secret(_) if sync => EnvVar::from_secret(var, &secrets_name, var),
            EnvValue::Secret(secret) => {
                debug!(
                    app = %ctx.naming.app(),
                    env = %ctx.env,
                    var = %var,
                    secret = %secret.secret,
                    "secret sync unavailable, referencing cluster secret directly"
                );
                EnvVar::from_secret(
                    var,
                    secret.cluster_secret_name(),
                    secret.cluster_secret_key(var),
                )
            }
        })
        .collect()
}

fn compile_env_from(ctx: &GenerationContext<'_>) -> Vec<EnvFromSource> {
    ctx.app
        .env_from
        .iter()
        .map(|source| {
            let mut compiled = match source.kind {
                EnvFromKind::Secret => EnvFromSource::secret(&source.name),
                EnvFromKind::Configmap => EnvFromSource::config_map(&source.name),
            };
            compiled.prefix = source.prefix.clone();
            if source.optional {
                for reference in [&mut compiled.secret_ref, &mut compiled.config_map_ref]
                    .into_iter()
                    .flatten()
                {
                    reference.optional = Some(true);
                }
            }
            compiled
        })
        .collect()
}

/// Requests and limits; each limit defaults to its request
pub fn compile_resources(resources: &ResourceConfig) -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(ResourceQuantity {
            cpu: Some(resources.cpu.clone()),
            memory: Some(resources.memory.clone()),
            ephemeral_storage: resources.ephemeral_storage.clone(),
        }),
        limits: Some(ResourceQuantity {
            cpu: Some(resources.effective_cpu_limit().to_string()),
            memory: Some(resources.effective_memory_limit().to_string()),
            ephemeral_storage: resources.ephemeral_storage.clone(),
        }),
    }
}

fn compile_probe(config: &ProbeConfig, default_port: u16) -> Probe {
    let port = config.port.unwrap_or(default_port);
    let probe = match config.kind {
        ProbeKind::Http => Probe::http(&config.path, port),
        ProbeKind::Tcp => Probe::tcp(port),
        ProbeKind::Exec => Probe::exec(config.command.clone()),
    };
    Probe {
        initial_delay_seconds: (config.initial_delay > 0).then_some(config.initial_delay),
        period_seconds: Some(config.period),
        timeout_seconds: Some(config.timeout),
        success_threshold: Some(config.success_threshold),
        failure_threshold: Some(config.failure_threshold),
        ..probe
    }
}

fn compile_security_context(ctx: &GenerationContext<'_>) -> Option<SecurityContext> {
    let config = ctx.app.security.container_security_context.as_ref()?;
    let capabilities = (!config.capabilities_add.is_empty()
        || !config.capabilities_drop.is_empty())
    .then(|| Capabilities {
        add: config.capabilities_add.clone(),
        drop: config.capabilities_drop.clone(),
    });

    Some(SecurityContext {
        allow_privilege_escalation: Some(config.allow_privilege_escalation),
        read_only_root_filesystem: Some(config.read_only_root_filesystem),
        run_as_user: config.run_as_user,
        run_as_group: config.run_as_group,
        capabilities,
    })
}

// =============================================================================
// Volumes
// =============================================================================

fn compile_volume(ctx: &GenerationContext<'_>, volume: &VolumeConfig) -> Volume {
    let items = || -> Vec<KeyToPath> {
        volume
            .items
            .iter()
            .map(|item| KeyToPath {
                key: item.key.clone(),
                path: item.path.clone(),
            })
            .collect()
    };

    match volume.kind {
        VolumeKind::EmptyDir => Volume::from_empty_dir(
            &volume.name,
            volume.medium.clone(),
            volume.size_limit.clone(),
        ),
        VolumeKind::Pvc => Volume::from_pvc(&volume.name, claim_name(ctx, volume)),
        VolumeKind::Secret => Volume::from_secret(&volume.name, volume.secret_name(), items()),
        VolumeKind::Configmap => {
            Volume::from_config_map(&volume.name, configmap_name(ctx, volume), items())
        }
        VolumeKind::HostPath => {
            Volume::from_host_path(&volume.name, volume.host_path.clone().unwrap_or_default())
        }
    }
}

/// Claim a `pvc` volume mounts: the existing claim, or the generated `<n>-<volume>`
pub fn claim_name(ctx: &GenerationContext<'_>, volume: &VolumeConfig) -> String {
    match &volume.claim_name {
        Some(existing) => existing.clone(),
        None => ctx.naming.object(&volume.name),
    }
}

/// ConfigMap a `configmap` volume mounts; inline data is generated as `<n>-<volume>`
pub fn configmap_name(ctx: &GenerationContext<'_>, volume: &VolumeConfig) -> String {
    if volume.data.is_empty() {
        volume.configmap_name().to_string()
    } else {
        ctx.naming.object(volume.configmap_name())
    }
}

#[cfg(test)]
mod tests {
    use stackgen_config::model::{
        ContainerSecurityConfig, EnvFromConfig, PodSecurityConfig, ProbesConfig,
    };
    use stackgen_config::{AppSpec, EnvironmentProfile, SecretRef};

    use super::*;

    fn make_app(name: &str) -> AppSpec {
        AppSpec::new(name, format!("services/{}", name))
    }

    fn compile_for(app: &AppSpec, profile: &EnvironmentProfile) -> PodTemplateSpec {
        let ctx = GenerationContext::new(app, profile, &profile.name).expect("valid context");
        compile(&ctx)
    }

    // =========================================================================
    // Story: Container basics
    // =========================================================================

    #[test]
    fn test_container_named_after_workload_with_default_port() {
        let template = compile_for(&make_app("api"), &EnvironmentProfile::dev());
        let container = &template.spec.containers[0];
        assert_eq!(container.name, "api");
        assert_eq!(container.image, "api:latest");
        assert_eq!(container.ports.len(), 1);
        assert_eq!(container.ports[0].container_port, 8080);
        assert_eq!(container.ports[0].name.as_deref(), Some("http"));
        assert_eq!(template.metadata.labels["app"], "api");
    }

    #[test]
    fn test_memory_limit_defaults_to_request() {
        let mut app = make_app("api");
        app.resources.memory = "512Mi".to_string();
        app.resources.cpu_limit = Some("1".to_string());
        let template = compile_for(&app, &EnvironmentProfile::dev());
        let resources = template.spec.containers[0]
            .resources
            .clone()
            .expect("resources set");
        let limits = resources.limits.expect("limits set");
        assert_eq!(limits.memory.as_deref(), Some("512Mi"));
        assert_eq!(limits.cpu.as_deref(), Some("1"));
    }

    #[test]
    fn test_cpu_limit_defaults_to_request() {
        let mut app = make_app("api");
        app.resources.cpu = "250m".to_string();
        let template = compile_for(&app, &EnvironmentProfile::dev());
        let resources = template.spec.containers[0]
            .resources
            .clone()
            .expect("resources set");
        assert_eq!(resources.requests.expect("requests set").cpu.as_deref(), Some("250m"));
        assert_eq!(resources.limits.expect("limits set").cpu.as_deref(), Some("250m"));
    }

    // =========================================================================
    // Story: Secret env follows the environment's sync capability
    // =========================================================================

    #[test]
    fn test_secret_env_uses_synced_secret_when_available() {
        let mut app = make_app("api");
        app.environment.insert("LOG".into(), EnvValue::literal("info"));
        app.environment
            .insert("DB_PASSWORD".into(), EnvValue::Secret(SecretRef::new("db-password")));

        let template = compile_for(&app, &EnvironmentProfile::dev());
        let env = &template.spec.containers[0].env;
        assert_eq!(env[0].name, "DB_PASSWORD");
        let selector = env[0]
            .value_from
            .as_ref()
            .and_then(|s| s.secret_key_ref.as_ref())
            .expect("secret ref");
        assert_eq!(selector.name, "api-secrets");
        assert_eq!(selector.key, "DB_PASSWORD");
        assert!(env[0].value.is_none());
        assert_eq!(env[1].value.as_deref(), Some("info"));
    }

    #[test]
    fn test_secret_env_degrades_to_cluster_secret_without_sync() {
        let mut app = make_app("api");
        let mut secret = SecretRef::new("Stripe_Key");
        secret.key = Some("token".to_string());
        app.environment
            .insert("STRIPE".into(), EnvValue::Secret(secret));

        let template = compile_for(&app, &EnvironmentProfile::local());
        let selector = template.spec.containers[0].env[0]
            .value_from
            .as_ref()
            .and_then(|s| s.secret_key_ref.as_ref())
            .expect("secret ref")
            .clone();
        assert_eq!(selector.name, "stripe-key");
        assert_eq!(selector.key, "token");
    }

    // =========================================================================
    // Story: Probes, volumes and security
    // =========================================================================

    #[test]
    fn test_probe_defaults_to_primary_port_and_omits_zero_delay() {
        let mut app = make_app("api");
        app.probes = ProbesConfig {
            readiness: Some(ProbeConfig::default()),
            liveness: Some(ProbeConfig {
                kind: ProbeKind::Tcp,
                port: Some(9000),
                initial_delay: 5,
                ..Default::default()
            }),
            ..Default::default()
        };

        let template = compile_for(&app, &EnvironmentProfile::dev());
        let container = &template.spec.containers[0];
        let readiness = container.readiness_probe.as_ref().expect("readiness");
        assert_eq!(readiness.http_get.as_ref().map(|h| h.port), Some(8080));
        assert!(readiness.initial_delay_seconds.is_none());
        assert_eq!(readiness.period_seconds, Some(10));

        let liveness = container.liveness_probe.as_ref().expect("liveness");
        assert_eq!(liveness.tcp_socket.as_ref().map(|t| t.port), Some(9000));
        assert_eq!(liveness.initial_delay_seconds, Some(5));
        assert!(container.startup_probe.is_none());
    }

    #[test]
    fn test_volumes_mount_and_reference_sources() {
        let mut app = make_app("db");
        app.volumes = vec![
            VolumeConfig::new("data", VolumeKind::Pvc, "/var/lib/data"),
            {
                let mut v = VolumeConfig::new("shared", VolumeKind::Pvc, "/shared");
                v.claim_name = Some("nfs-shared".to_string());
                v
            },
            {
                let mut v = VolumeConfig::new("conf", VolumeKind::Configmap, "/etc/conf");
                v.data.insert("a.conf".into(), "x".into());
                v.read_only = true;
                v
            },
        ];

        let template = compile_for(&app, &EnvironmentProfile::dev());
        let volumes = &template.spec.volumes;
        assert_eq!(
            volumes[0].persistent_volume_claim.as_ref().map(|c| c.claim_name.as_str()),
            Some("db-data")
        );
        assert_eq!(
            volumes[1].persistent_volume_claim.as_ref().map(|c| c.claim_name.as_str()),
            Some("nfs-shared")
        );
        assert_eq!(
            volumes[2].config_map.as_ref().map(|c| c.name.as_str()),
            Some("db-conf")
        );

        let mounts = &template.spec.containers[0].volume_mounts;
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[2].read_only, Some(true));
    }

    #[test]
    fn test_security_contexts_and_env_from() {
        let mut app = make_app("api");
        app.security.pod_security_context = Some(PodSecurityConfig {
            fs_group: Some(2000),
            ..Default::default()
        });
        app.security.container_security_context = Some(ContainerSecurityConfig {
            capabilities_drop: vec!["ALL".to_string()],
            run_as_user: Some(1000),
            ..Default::default()
        });
        app.env_from = vec![EnvFromConfig {
            kind: EnvFromKind::Configmap,
            name: "shared-config".to_string(),
            prefix: Some("CFG_".to_string()),
            optional: true,
        }];

        let template = compile_for(&app, &EnvironmentProfile::dev());
        let pod = template.spec.security_context.as_ref().expect("pod context");
        assert_eq!(pod.run_as_non_root, Some(true));
        assert_eq!(pod.fs_group, Some(2000));

        let container = &template.spec.containers[0];
        let sc = container.security_context.as_ref().expect("container context");
        assert_eq!(sc.run_as_user, Some(1000));
        assert_eq!(
            sc.capabilities.as_ref().map(|c| c.drop.clone()),
            Some(vec!["ALL".to_string()])
        );

        let source = &container.env_from[0];
        assert_eq!(source.prefix.as_deref(), Some("CFG_"));
        assert_eq!(
            source.config_map_ref.as_ref().and_then(|r| r.optional),
            Some(true)
        );
    }

    #[test]
    fn test_service_account_referenced_by_name() {
        let mut app = make_app("api");
        app.security.create_service_account = true;
        let template = compile_for(&app, &EnvironmentProfile::dev());
        assert_eq!(template.spec.service_account_name.as_deref(), Some("api"));

        let plain = compile_for(&make_app("api"), &EnvironmentProfile::dev());
        assert!(plain.spec.service_account_name.is_none());
    }

    #[test]
    fn test_pull_secrets_come_from_profile() {
        let mut profile = EnvironmentProfile::gcp();
        profile.registry = "europe-docker.pkg.dev/proj/apps".to_string();
        let template = compile_for(&make_app("api"), &profile);
        assert_eq!(template.spec.image_pull_secrets[0].name, "artifact-registry");
        assert!(template.spec.containers[0]
            .image
            .starts_with("europe-docker.pkg.dev/proj/apps/api:"));
    }
}
