//! Queue-depth autoscaling on a Redis-protocol list

use stackgen_common::k8s::keda::{
    AuthenticationRef, ScaleTargetRef, ScaledObject, ScaledObjectSpec, ScaledObjectTrigger,
    TriggerAuthentication,
};
use stackgen_common::k8s::Manifest;
use stackgen_config::ScalingPolicy;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;

/// Scaler parameter the queue password is bound to
const PASSWORD_PARAMETER: &str = "password";

/// TriggerAuthentication `<n>-queue-auth` and ScaledObject `<n>-queue`
pub struct QueueScaling;

impl ManifestGenerator for QueueScaling {
    fn name(&self) -> &'static str {
        "queue-scaler"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        matches!(ctx.scaling, ScalingPolicy::QueueDepth(_))
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let ScalingPolicy::QueueDepth(policy) = &ctx.scaling else {
            return Vec::new();
        };

        let auth_name = ctx.naming.object("queue-auth");
        let auth = TriggerAuthentication::from_secret(
            ctx.metadata(auth_name.clone()),
            PASSWORD_PARAMETER,
            policy.auth_secret.clone(),
            policy.auth_secret_key.clone(),
        );

        let metadata = [
            ("address", policy.address.clone()),
            ("listName", policy.queue_name.clone()),
            ("listLength", policy.target_depth.to_string()),
            ("enableTLS", "false".to_string()),
            ("databaseIndex", "0".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let scaled = ScaledObject::new(
            ctx.metadata(ctx.naming.object("queue")),
            ScaledObjectSpec {
                scale_target_ref: ScaleTargetRef::deployment(ctx.name()),
                min_replica_count: policy.min,
                max_replica_count: policy.max,
                polling_interval: Some(policy.polling_interval),
                cooldown_period: Some(policy.cooldown_period),
                triggers: vec![ScaledObjectTrigger {
                    type_: "redis".to_string(),
                    metadata,
                    authentication_ref: Some(AuthenticationRef { name: auth_name }),
                }],
            },
        );

        vec![auth.into(), scaled.into()]
    }
}
