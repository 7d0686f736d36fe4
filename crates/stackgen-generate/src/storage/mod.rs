//! Storage generators: PersistentVolumeClaims and inline ConfigMaps
//!
//! Names match what the pod template mounts, via
//! [`pod_template::claim_name`] and [`pod_template::configmap_name`].

use stackgen_common::k8s::apps::{ConfigMap, PersistentVolumeClaim};
use stackgen_common::k8s::Manifest;
use stackgen_config::model::{VolumeConfig, VolumeKind};

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;
use crate::workload::pod_template;

/// Claim `name` sized and classed as `volume` asks
pub fn claim(ctx: &GenerationContext<'_>, name: String, volume: &VolumeConfig) -> PersistentVolumeClaim {
    PersistentVolumeClaim::new(
        ctx.metadata(name),
        volume.size.clone(),
        volume.access_modes.clone(),
        volume.storage_class.clone(),
    )
}

// =============================================================================
// PersistentVolumeClaim
// =============================================================================

/// One PersistentVolumeClaim per `pvc` volume without an existing claim
pub struct PvcGenerator;

impl ManifestGenerator for PvcGenerator {
    fn name(&self) -> &'static str {
        "pvc"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.app.volumes.iter().any(VolumeConfig::creates_claim)
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        ctx.app
            .volumes
            .iter()
            .filter(|volume| volume.creates_claim())
            .map(|volume| claim(ctx, pod_template::claim_name(ctx, volume), volume).into())
            .collect()
    }
}

// =============================================================================
// ConfigMap
// =============================================================================

/// One ConfigMap per `configmap` volume carrying inline data
pub struct ConfigMapGenerator;

impl ConfigMapGenerator {
    fn inline(volume: &VolumeConfig) -> bool {
        volume.kind == VolumeKind::Configmap && !volume.data.is_empty()
    }
}

impl ManifestGenerator for ConfigMapGenerator {
    fn name(&self) -> &'static str {
        "configmap"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.app.volumes.iter().any(Self::inline)
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        ctx.app
            .volumes
            .iter()
            .filter(|volume| Self::inline(volume))
            .map(|volume| {
                volume
                    .data
                    .iter()
                    .fold(
                        ConfigMap::new(ctx.metadata(pod_template::configmap_name(ctx, volume))),
                        |map, (key, value)| map.with_data(key.clone(), value.clone()),
                    )
                    .into()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use stackgen_config::{AppSpec, EnvironmentProfile};

    use super::*;

    fn generate(generator: &dyn ManifestGenerator, app: &AppSpec) -> Vec<serde_json::Value> {
        let profile = EnvironmentProfile::dev();
        let ctx = GenerationContext::new(app, &profile, "dev").expect("valid context");
        if !generator.should_generate(&ctx) {
            return Vec::new();
        }
        generator
            .generate(&ctx)
            .iter()
            .map(|m| m.to_value().expect("serializable"))
            .collect()
    }

    // =========================================================================
    // Story: Claims for pvc volumes
    // =========================================================================

    #[test]
    fn test_claim_named_after_app_and_volume() {
        let mut app = AppSpec::new("db", "services/db");
        let mut data = VolumeConfig::new("data", VolumeKind::Pvc, "/var/lib/data");
        data.size = "10Gi".to_string();
        data.storage_class = Some("fast".to_string());
        app.volumes = vec![data];

        let claims = generate(&PvcGenerator, &app);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0]["metadata"]["name"], "db-data");
        assert_eq!(claims[0]["spec"]["resources"]["requests"]["storage"], "10Gi");
        assert_eq!(claims[0]["spec"]["accessModes"][0], "ReadWriteOnce");
        assert_eq!(claims[0]["spec"]["storageClassName"], "fast");
    }

    #[test]
    fn test_existing_claims_are_not_generated() {
        let mut app = AppSpec::new("db", "services/db");
        let mut shared = VolumeConfig::new("shared", VolumeKind::Pvc, "/shared");
        shared.claim_name = Some("team-shared".to_string());
        app.volumes = vec![
            shared,
            VolumeConfig::new("scratch", VolumeKind::EmptyDir, "/tmp"),
        ];
        assert!(generate(&PvcGenerator, &app).is_empty());
    }

    // =========================================================================
    // Story: Inline ConfigMaps
    // =========================================================================

    #[test]
    fn test_inline_configmap_generated() {
        let mut app = AppSpec::new("web", "services/web");
        let mut conf = VolumeConfig::new("nginx", VolumeKind::Configmap, "/etc/nginx/conf.d");
        conf.data
            .insert("default.conf".to_string(), "server {}".to_string());
        let external = VolumeConfig::new("certs", VolumeKind::Configmap, "/certs");
        app.volumes = vec![conf, external];

        let maps = generate(&ConfigMapGenerator, &app);
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0]["metadata"]["name"], "web-nginx");
        assert_eq!(maps[0]["data"]["default.conf"], "server {}");
    }
}
