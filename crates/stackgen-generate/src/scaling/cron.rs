//! Time-window autoscaling with KEDA cron triggers

use stackgen_common::k8s::keda::{
    ScaleTargetRef, ScaledObject, ScaledObjectSpec, ScaledObjectTrigger,
};
use stackgen_common::k8s::Manifest;
use stackgen_config::ScalingPolicy;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;

/// ScaledObject `<n>-cron` with one cron trigger per window
///
/// Outside every window the workload falls back to `min`.
pub struct CronScaling;

impl ManifestGenerator for CronScaling {
    fn name(&self) -> &'static str {
        "cron-scaler"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        matches!(ctx.scaling, ScalingPolicy::TimeWindow(_))
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let ScalingPolicy::TimeWindow(policy) = &ctx.scaling else {
            return Vec::new();
        };

        let triggers = policy
            .windows
            .iter()
            .map(|window| ScaledObjectTrigger {
                type_: "cron".to_string(),
                metadata: [
                    ("timezone", window.timezone.clone()),
                    ("start", window.start.clone()),
                    ("end", window.end.clone()),
                    ("desiredReplicas", window.replicas.to_string()),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
                authentication_ref: None,
            })
            .collect();

        let scaled = ScaledObject::new(
            ctx.metadata(ctx.naming.object("cron")),
            ScaledObjectSpec {
                scale_target_ref: ScaleTargetRef::deployment(ctx.name()),
                min_replica_count: policy.min,
                max_replica_count: policy.max,
                polling_interval: None,
                cooldown_period: None,
                triggers,
            },
        );
        vec![scaled.into()]
    }
}

#[cfg(test)]
mod tests {
    use stackgen_config::model::{ScalingConfig, ScalingKind, TimeWindow};
    use stackgen_config::{AppSpec, EnvironmentProfile};

    use super::*;

    fn generate(scaling: ScalingConfig) -> serde_json::Value {
        let mut app = AppSpec::new("reports", "services/reports");
        app.scaling = scaling;
        let profile = EnvironmentProfile::dev();
        let ctx = GenerationContext::new(&app, &profile, "dev").expect("valid context");
        CronScaling.generate(&ctx)[0]
            .to_value()
            .expect("serializable")
    }

    #[test]
    fn test_default_business_hours_window() {
        let scaled = generate(ScalingConfig {
            kind: ScalingKind::TimeWindowAutoscale,
            max: 3,
            ..Default::default()
        });
        assert_eq!(scaled["metadata"]["name"], "reports-cron");
        let triggers = scaled["spec"]["triggers"].as_array().expect("triggers");
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0]["type"], "cron");
        assert_eq!(triggers[0]["metadata"]["timezone"], "UTC");
        assert_eq!(triggers[0]["metadata"]["start"], "0 8 * * *");
        assert_eq!(triggers[0]["metadata"]["end"], "0 18 * * *");
        assert_eq!(triggers[0]["metadata"]["desiredReplicas"], "3");
    }

    #[test]
    fn test_one_trigger_per_window_in_order() {
        let window = |name: &str, replicas: u32| TimeWindow {
            name: name.to_string(),
            timezone: "Europe/Berlin".to_string(),
            start: "0 6 * * 1-5".to_string(),
            end: "0 20 * * 1-5".to_string(),
            replicas,
        };
        let scaled = generate(ScalingConfig {
            kind: ScalingKind::TimeWindowAutoscale,
            min: 1,
            max: 6,
            windows: vec![window("weekday", 4), window("peak", 6)],
            ..Default::default()
        });
        let triggers = scaled["spec"]["triggers"].as_array().expect("triggers");
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[1]["metadata"]["desiredReplicas"], "6");
        assert_eq!(scaled["spec"]["minReplicaCount"], 1);
        assert_eq!(scaled["spec"]["maxReplicaCount"], 6);
        assert!(scaled["spec"].get("cooldownPeriod").is_none());
    }
}
