//! HTTPScaledObject for request-rate autoscaling (KEDA HTTP add-on)

use stackgen_common::k8s::keda::{
    HttpScaleTargetRef, HttpScaledObject, HttpScaledObjectSpec, HttpScalingMetric,
    ReplicaBounds, RequestRateMetric,
};
use stackgen_common::k8s::Manifest;
use stackgen_config::ScalingPolicy;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;
use crate::ingress::route::routing_host;

/// Bucket the interceptor counts requests in
const GRANULARITY: &str = "1s";

/// Window the request rate is averaged over
const WINDOW: &str = "1m";

/// HTTPScaledObject `<n>-http`
///
/// The interceptor claims the routing host `<n>.<namespace>` and forwards to
/// the app's Service on its primary port.
pub struct HttpScaling;

impl ManifestGenerator for HttpScaling {
    fn name(&self) -> &'static str {
        "http-scaler"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        matches!(ctx.scaling, ScalingPolicy::RequestRate(_))
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let ScalingPolicy::RequestRate(policy) = &ctx.scaling else {
            return Vec::new();
        };

        let path_prefix = if ctx.app.ingress.enabled {
            ctx.app.ingress.path.clone()
        } else {
            "/".to_string()
        };

        let scaled = HttpScaledObject::new(
            ctx.metadata(ctx.naming.object("http")),
            HttpScaledObjectSpec {
                hosts: vec![routing_host(ctx)],
                path_prefixes: vec![path_prefix],
                scale_target_ref: HttpScaleTargetRef {
                    name: ctx.name().to_string(),
                    kind: "Deployment".to_string(),
                    api_version: "apps/v1".to_string(),
                    service: ctx.name().to_string(),
                    port: ctx.primary_port().service_port,
                },
                replicas: ReplicaBounds {
                    min: policy.min,
                    max: policy.max,
                },
                scaling_metric: HttpScalingMetric {
                    request_rate: RequestRateMetric {
                        granularity: GRANULARITY.to_string(),
                        target_value: policy.target_pending_requests,
                        window: WINDOW.to_string(),
                    },
                },
                scaledown_period: Some(policy.cooldown_period),
            },
        );
        vec![scaled.into()]
    }
}
