//! HorizontalPodAutoscaler for fixed-replica autoscaling

use stackgen_common::k8s::autoscaling::{
    HorizontalPodAutoscaler, HpaBehavior, HpaSpec, MetricSpec, ScalingRules,
};
use stackgen_common::k8s::keda::ScaleTargetRef;
use stackgen_common::k8s::Manifest;
use stackgen_config::ScalingPolicy;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;

/// HorizontalPodAutoscaler `<n>` on CPU (and optionally memory) utilization
///
/// An HPA cannot scale to zero, so the minimum is raised to 1.
pub struct HpaScaling;

impl ManifestGenerator for HpaScaling {
    fn name(&self) -> &'static str {
        "hpa"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        matches!(ctx.scaling, ScalingPolicy::FixedReplica(_))
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let ScalingPolicy::FixedReplica(policy) = &ctx.scaling else {
            return Vec::new();
        };

        let min_replicas = policy.min.max(1);
        let mut metrics = vec![MetricSpec::utilization("cpu", policy.target_cpu_utilization)];
        if let Some(memory) = policy.target_memory_utilization {
            metrics.push(MetricSpec::utilization("memory", memory));
        }

        let hpa = HorizontalPodAutoscaler::new(
            ctx.metadata(ctx.name()),
            HpaSpec {
                scale_target_ref: ScaleTargetRef::deployment(ctx.name()),
                min_replicas,
                max_replicas: policy.max.max(min_replicas),
                metrics,
                behavior: Some(HpaBehavior {
                    scale_up: ScalingRules {
                        stabilization_window_seconds: policy.scale_up_stabilization,
                    },
                    scale_down: ScalingRules {
                        stabilization_window_seconds: policy.scale_down_stabilization,
                    },
                }),
            },
        );
        vec![hpa.into()]
    }
}
