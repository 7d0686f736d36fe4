//! Container apps (`apps:` section)

use stackgen_config::model::APPS_SECTION;

use super::{shared_plan, workload_plan};
use crate::context::GenerationContext;
use crate::generator::{AppGenerator, ManifestGenerator};
use crate::Result;

/// One long-running container per app entry
pub struct ContainerApp;

impl AppGenerator for ContainerApp {
    fn app_type(&self) -> &'static str {
        APPS_SECTION
    }

    fn plan(&self, ctx: &GenerationContext<'_>) -> Result<Vec<Box<dyn ManifestGenerator>>> {
        let mut plan = shared_plan(ctx)?;
        plan.extend(workload_plan(ctx)?);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use stackgen_common::k8s::Manifest;
    use stackgen_config::model::{PdbConfig, ScalingKind, VolumeConfig, VolumeKind};
    use stackgen_config::{AppSpec, EnvValue, EnvironmentProfile, IngressBackend, SecretRef};
    use stackgen_common::k8s::pod::IntOrString;

    use super::*;
    use crate::GenerateError;

    fn make_app(name: &str) -> AppSpec {
        AppSpec::new(name, format!("services/{}", name))
    }

    fn generate(app: &AppSpec, profile: &EnvironmentProfile) -> Vec<Manifest> {
        let ctx = GenerationContext::new(app, profile, &profile.name).expect("valid context");
        ContainerApp.generate(&ctx).expect("generation succeeds")
    }

    fn keys(manifests: &[Manifest]) -> Vec<String> {
        manifests.iter().map(Manifest::key).collect()
    }

    // =========================================================================
    // Story: Plans emit in a fixed order
    // =========================================================================

    #[test]
    fn test_full_plan_order() {
        let mut app = make_app("api");
        app.security.create_service_account = true;
        app.environment.insert(
            "API_TOKEN".to_string(),
            EnvValue::Secret(SecretRef::new("api-token")),
        );
        app.ingress.enabled = true;
        app.scaling.kind = ScalingKind::FixedReplicaAutoscale;
        app.pdb = Some(PdbConfig {
            min_available: Some(IntOrString::Int(1)),
            max_unavailable: None,
        });
        app.volumes = vec![VolumeConfig::new("data", VolumeKind::Pvc, "/data")];

        let manifests = generate(&app, &EnvironmentProfile::gcp());
        assert_eq!(
            keys(&manifests),
            vec![
                "ServiceAccount/api",
                "ExternalSecret/api-secrets",
                "Deployment/api",
                "Service/api",
                "HorizontalPodAutoscaler/api",
                "Ingress/api",
                "NetworkPolicy/api-policy",
                "PodDisruptionBudget/api",
                "PersistentVolumeClaim/api-data",
            ]
        );
    }

    #[test]
    fn test_minimal_app() {
        let manifests = generate(&make_app("api"), &EnvironmentProfile::dev());
        assert_eq!(
            keys(&manifests),
            vec![
                "Deployment/api",
                "Service/api",
                "HTTPScaledObject/api-http",
                "NetworkPolicy/api-policy",
            ]
        );
    }

    // =========================================================================
    // Story: References are by name, not position
    // =========================================================================

    #[test]
    fn test_service_account_referenced_by_name() {
        let mut app = make_app("api");
        app.security.create_service_account = true;
        let manifests = generate(&app, &EnvironmentProfile::dev());

        let deployment = manifests
            .iter()
            .find(|m| m.kind() == "Deployment")
            .expect("deployment")
            .to_value()
            .expect("serializable");
        assert_eq!(
            deployment["spec"]["template"]["spec"]["serviceAccountName"],
            "api"
        );
        assert!(manifests.iter().any(|m| m.key() == "ServiceAccount/api"));
    }

    // =========================================================================
    // Story: Unsupported combinations fail the app before generation
    // =========================================================================

    #[test]
    fn test_unavailable_ingress_backend_fails_plan() {
        let mut app = make_app("api");
        app.ingress.enabled = true;
        app.ingress.class = Some(IngressBackend::Haproxy);
        let profile = EnvironmentProfile::local();
        let ctx = GenerationContext::new(&app, &profile, "local").expect("valid context");
        let err = ContainerApp.plan(&ctx).err().expect("plan rejected");
        assert!(matches!(err, GenerateError::UnsupportedCombination { .. }));
    }
}
