//! Scaling generators
//!
//! Exactly one scaling generator is active per workload, picked by the
//! resolved [`ScalingPolicy`]:
//!
//! | Policy | Objects |
//! |--------|---------|
//! | none | nothing (the Deployment carries `replicas`) |
//! | fixed-replica | `HorizontalPodAutoscaler` `<n>` |
//! | request-rate | `HTTPScaledObject` `<n>-http` |
//! | queue-depth | `TriggerAuthentication` `<n>-queue-auth`, `ScaledObject` `<n>-queue` |
//! | time-window | `ScaledObject` `<n>-cron` |
//!
//! Each generator also checks the policy in `should_generate`, so a plan
//! built for one policy never emits objects for another.

pub mod cron;
pub mod hpa;
pub mod http;
pub mod queue;

use stackgen_config::ScalingPolicy;

use crate::generator::ManifestGenerator;

pub use cron::CronScaling;
pub use hpa::HpaScaling;
pub use http::HttpScaling;
pub use queue::QueueScaling;

/// Scaling generator for `policy`; `None` for static replicas
pub fn for_policy(policy: &ScalingPolicy) -> Option<Box<dyn ManifestGenerator>> {
    match policy {
        ScalingPolicy::None { .. } => None,
        ScalingPolicy::FixedReplica(_) => Some(Box::new(HpaScaling)),
        ScalingPolicy::RequestRate(_) => Some(Box::new(HttpScaling)),
        ScalingPolicy::QueueDepth(_) => Some(Box::new(QueueScaling)),
        ScalingPolicy::TimeWindow(_) => Some(Box::new(CronScaling)),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use stackgen_config::model::{ScalingConfig, ScalingKind};
    use stackgen_config::{AppSpec, EnvironmentProfile};

    use super::*;
    use crate::context::GenerationContext;

    fn make_app(kind: ScalingKind) -> AppSpec {
        let mut app = AppSpec::new("worker", "services/worker");
        app.scaling = ScalingConfig {
            kind,
            queue_name: Some("jobs".to_string()),
            ..Default::default()
        };
        app
    }

    // =========================================================================
    // Story: One autoscaling object per autoscaled policy
    // =========================================================================

    #[rstest]
    #[case(ScalingKind::None, &[])]
    #[case(ScalingKind::FixedReplicaAutoscale, &["HorizontalPodAutoscaler"])]
    #[case(ScalingKind::RequestRateAutoscale, &["HTTPScaledObject"])]
    #[case(ScalingKind::QueueDepthAutoscale, &["TriggerAuthentication", "ScaledObject"])]
    #[case(ScalingKind::TimeWindowAutoscale, &["ScaledObject"])]
    fn test_policy_selects_generator(#[case] kind: ScalingKind, #[case] expected: &[&str]) {
        let app = make_app(kind);
        let profile = EnvironmentProfile::dev();
        let ctx = GenerationContext::new(&app, &profile, "dev").expect("valid context");

        let kinds: Vec<String> = match for_policy(&ctx.scaling) {
            Some(generator) => {
                assert!(generator.should_generate(&ctx));
                generator
                    .generate(&ctx)
                    .iter()
                    .map(|m| m.kind().to_string())
                    .collect()
            }
            None => Vec::new(),
        };
        assert_eq!(kinds, expected);
    }

    #[test]
    fn test_generators_ignore_other_policies() {
        let app = make_app(ScalingKind::None);
        let profile = EnvironmentProfile::dev();
        let ctx = GenerationContext::new(&app, &profile, "dev").expect("valid context");

        assert!(!HpaScaling.should_generate(&ctx));
        assert!(!HttpScaling.should_generate(&ctx));
        assert!(!QueueScaling.should_generate(&ctx));
        assert!(!CronScaling.should_generate(&ctx));
    }
}
