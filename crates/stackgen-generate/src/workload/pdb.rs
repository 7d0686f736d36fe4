//! PodDisruptionBudget generation

use stackgen_common::k8s::apps::{PdbSpec, PodDisruptionBudget};
use stackgen_common::k8s::pod::LabelSelector;
use stackgen_common::k8s::Manifest;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;

/// PodDisruptionBudget `<n>` when the app sets `pdb`
pub struct PdbGenerator;

impl ManifestGenerator for PdbGenerator {
    fn name(&self) -> &'static str {
        "pdb"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.app.pdb.is_some() && ctx.shape.schedule.is_none()
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let Some(pdb) = &ctx.app.pdb else {
            return Vec::new();
        };

        let budget = PodDisruptionBudget::new(
            ctx.metadata(ctx.name()),
            PdbSpec {
                min_available: pdb.min_available.clone(),
                max_unavailable: pdb.max_unavailable.clone(),
                selector: LabelSelector::matching(ctx.naming.selector_labels()),
            },
        );
        vec![budget.into()]
    }
}

#[cfg(test)]
mod tests {
    use stackgen_common::k8s::pod::IntOrString;
    use stackgen_config::model::PdbConfig;
    use stackgen_config::{AppSpec, EnvironmentProfile};

    use super::*;

    #[test]
    fn test_no_budget_without_config() {
        let app = AppSpec::new("api", "services/api");
        let profile = EnvironmentProfile::dev();
        let ctx = GenerationContext::new(&app, &profile, "dev").expect("valid context");
        assert!(!PdbGenerator.should_generate(&ctx));
    }

    #[test]
    fn test_budget_selects_workload_pods() {
        let mut app = AppSpec::new("api", "services/api");
        app.pdb = Some(PdbConfig {
            min_available: None,
            max_unavailable: Some(IntOrString::String("25%".to_string())),
        });
        let profile = EnvironmentProfile::dev();
        let ctx = GenerationContext::new(&app, &profile, "dev").expect("valid context");
        assert!(PdbGenerator.should_generate(&ctx));

        let value = PdbGenerator.generate(&ctx)[0]
            .to_value()
            .expect("serializable");
        assert_eq!(value["kind"], "PodDisruptionBudget");
        assert_eq!(value["spec"]["maxUnavailable"], "25%");
        assert!(value["spec"].get("minAvailable").is_none());
        assert_eq!(value["spec"]["selector"]["matchLabels"]["app"], "api");
    }
}
