//! Function apps (`functions:` section)
//!
//! Each function runs as its own workload built from the app image. The
//! function's trigger decides the shape:
//!
//! - `http`: Deployment + Service, request-rate scaled, routed at the
//!   function route when the function is public
//! - `queue`: Deployment scaled on queue depth, no Service
//! - `schedule`: CronJob only
//!
//! The ServiceAccount and ExternalSecret are shared by all functions and are
//! emitted once, ahead of the first function.

use std::collections::BTreeMap;
use std::sync::Arc;

use stackgen_config::model::{
    PortConfig, ProbeConfig, ProbesConfig, ScalingKind, TriggerKind, FUNCTIONS_SECTION,
};
use stackgen_config::{AppSpec, EnvValue, FunctionSpec, Visibility};

use super::{shared_plan, workload_plan};
use crate::context::{CronSchedule, GenerationContext, WorkloadScope, WorkloadShape};
use crate::generator::{self, AppGenerator, ManifestGenerator};
use crate::Result;

/// Container name of every function workload
pub const FUNCTION_CONTAINER: &str = "function";

/// Port the function runtime listens on
pub const FUNCTION_PORT: u16 = 8080;

/// Env var carrying the function name
pub const FUNCTION_ENV: &str = "STACKGEN_FUNCTION";

/// Queue messages per replica for each message of a batch
const QUEUE_DEPTH_PER_BATCH: u32 = 5;

/// One workload per function, sharing image, ServiceAccount and secrets
pub struct FunctionApp;

impl FunctionApp {
    /// Shared scope: the app itself, with every function's secret references
    /// folded into its environment so one ExternalSecret serves them all.
    fn shared_scope(ctx: &GenerationContext<'_>) -> Result<WorkloadScope> {
        let mut app = ctx.app.clone();
        for (i, function) in ctx.app.functions.iter().enumerate() {
            for (var, value) in &function.environment {
                let Some(secret) = value.as_secret() else {
                    continue;
                };
                match app.environment.get(var).and_then(EnvValue::as_secret) {
                    Some(existing) if existing != secret => {
                        return Err(ctx.unsupported(
                            format!("functions[{}].environment.{}", i, var),
                            format!(
                                "secret '{}' conflicts with '{}' used by another function",
                                secret.secret, existing.secret
                            ),
                        ));
                    }
                    _ => {
                        app.environment.insert(var.clone(), value.clone());
                    }
                }
            }
        }
        ctx.scope(
            FUNCTIONS_SECTION,
            app,
            ctx.naming.clone(),
            ctx.shape.clone(),
        )
    }

    /// Child workload for the function at `index`
    fn function_scope(
        ctx: &GenerationContext<'_>,
        index: usize,
        function: &FunctionSpec,
    ) -> Result<WorkloadScope> {
        let field = format!("functions[{}]", index);
        let naming = ctx.naming.child(&function.name);

        let mut app: AppSpec = ctx.app.clone();
        app.name = naming.base().to_string();
        app.functions = Vec::new();

        if let Some(resources) = &function.resources {
            app.resources = resources.clone();
        }
        if let Some(visibility) = function.visibility {
            app.security.visibility = visibility;
        }
        app.environment.extend(
            function
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        app.environment.insert(
            FUNCTION_ENV.to_string(),
            EnvValue::literal(function.name.clone()),
        );
        app.environment.insert(
            "PORT".to_string(),
            EnvValue::literal(FUNCTION_PORT.to_string()),
        );

        app.container.ports = vec![PortConfig {
            container_port: FUNCTION_PORT,
            ..PortConfig::default()
        }];
        app.probes = function_probes();

        let http = function.trigger == TriggerKind::Http;
        app.ingress.enabled =
            http && ctx.app.ingress.enabled && app.security.visibility == Visibility::Public;
        app.ingress.path = function.route();

        let mut shape = WorkloadShape::deployment(FUNCTION_CONTAINER, ctx.shape.image.clone());
        shape.service = http;

        if let Some(scaling) = &function.scaling {
            app.scaling = scaling.clone();
        }
        match function.trigger {
            TriggerKind::Http => {}
            TriggerKind::Queue => {
                if function.scaling.is_none() {
                    app.scaling.kind = ScalingKind::QueueDepthAutoscale;
                    app.scaling.queue_name = function.queue.clone();
                    app.scaling.target_depth =
                        function.batch_size.saturating_mul(QUEUE_DEPTH_PER_BATCH);
                }
            }
            TriggerKind::Schedule => {
                let Some(schedule) = &function.schedule else {
                    return Err(ctx.unsupported(
                        format!("{}.schedule", field),
                        "required when trigger=schedule",
                    ));
                };
                app.scaling.kind = ScalingKind::None;
                app.scaling.replicas = 1;
                app.pdb = None;
                shape.schedule = Some(CronSchedule {
                    schedule: schedule.clone(),
                    timezone: function.timezone.clone(),
                });
            }
        }

        ctx.scope(&field, app, naming, shape)
    }
}

fn function_probes() -> ProbesConfig {
    let ready = ProbeConfig {
        path: "/ready".to_string(),
        ..ProbeConfig::default()
    };
    ProbesConfig {
        startup: Some(ProbeConfig {
            period: 2,
            failure_threshold: 30,
            ..ready.clone()
        }),
        readiness: Some(ready),
        liveness: Some(ProbeConfig {
            path: "/live".to_string(),
            ..ProbeConfig::default()
        }),
    }
}

impl AppGenerator for FunctionApp {
    fn app_type(&self) -> &'static str {
        FUNCTIONS_SECTION
    }

    fn plan(&self, ctx: &GenerationContext<'_>) -> Result<Vec<Box<dyn ManifestGenerator>>> {
        if ctx.app.functions.is_empty() {
            return Err(ctx.unsupported("functions", "at least one function is required"));
        }

        let shared = Arc::new(Self::shared_scope(ctx)?);
        let mut plan = generator::scoped(&shared, shared_plan(&ctx.scoped(&shared))?);

        let mut seen = BTreeMap::new();
        for (i, function) in ctx.app.functions.iter().enumerate() {
            let scope = Self::function_scope(ctx, i, function)?;
            if let Some(first) = seen.insert(scope.naming.base().to_string(), i) {
                return Err(ctx.unsupported(
                    format!("functions[{}].name", i),
                    format!(
                        "'{}' collides with functions[{}]",
                        scope.naming.base(),
                        first
                    ),
                ));
            }
            let scope = Arc::new(scope);
            plan.extend(generator::scoped(
                &scope,
                workload_plan(&ctx.scoped(&scope))?,
            ));
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use stackgen_common::k8s::Manifest;
    use stackgen_config::model::ScalingConfig;
    use stackgen_config::{EnvironmentProfile, SecretRef};

    use super::*;
    use crate::GenerateError;

    fn function(name: &str, trigger: TriggerKind) -> FunctionSpec {
        serde_yaml::from_str::<FunctionSpec>(&format!("name: {}", name))
            .map(|mut f| {
                f.trigger = trigger;
                f
            })
            .expect("valid function")
    }

    fn make_app(functions: Vec<FunctionSpec>) -> AppSpec {
        let mut app = AppSpec::new("billing", "functions/billing");
        app.app_type = FUNCTIONS_SECTION.to_string();
        app.functions = functions;
        app
    }

    fn generate(app: &AppSpec) -> Vec<Manifest> {
        let profile = EnvironmentProfile::dev();
        let ctx = GenerationContext::new(app, &profile, "dev").expect("valid context");
        FunctionApp.generate(&ctx).expect("generation succeeds")
    }

    fn find(manifests: &[Manifest], key: &str) -> serde_json::Value {
        manifests
            .iter()
            .find(|m| m.key() == key)
            .unwrap_or_else(|| panic!("{} not generated", key))
            .to_value()
            .expect("serializable")
    }

    fn keys(manifests: &[Manifest]) -> Vec<String> {
        manifests.iter().map(Manifest::key).collect()
    }

    // =========================================================================
    // Story: Triggers shape each function's workload
    // =========================================================================

    #[test]
    fn test_http_function_workload() {
        let manifests = generate(&make_app(vec![function("charge", TriggerKind::Http)]));
        assert_eq!(
            keys(&manifests),
            vec![
                "Deployment/billing-charge",
                "Service/billing-charge",
                "HTTPScaledObject/billing-charge-http",
                "NetworkPolicy/billing-charge-policy",
            ]
        );

        let deployment = find(&manifests, "Deployment/billing-charge");
        let container = &deployment["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["name"], "function");
        assert_eq!(container["image"], "billing:latest");
        assert_eq!(container["ports"][0]["containerPort"], 8080);
        assert_eq!(container["startupProbe"]["httpGet"]["path"], "/ready");
        assert_eq!(container["startupProbe"]["failureThreshold"], 30);
        assert_eq!(container["livenessProbe"]["httpGet"]["path"], "/live");

        let env = container["env"].as_array().expect("env list");
        assert!(env
            .iter()
            .any(|e| e["name"] == "STACKGEN_FUNCTION" && e["value"] == "charge"));
        assert!(env.iter().any(|e| e["name"] == "PORT" && e["value"] == "8080"));

        let service = find(&manifests, "Service/billing-charge");
        assert_eq!(service["spec"]["ports"][0]["port"], 80);
        assert_eq!(service["spec"]["ports"][0]["targetPort"], 8080);
    }

    #[test]
    fn test_queue_function_scales_on_batch_depth() {
        let mut worker = function("settle", TriggerKind::Queue);
        worker.queue = Some("settlements".to_string());
        worker.batch_size = 4;
        let manifests = generate(&make_app(vec![worker]));

        assert!(!manifests.iter().any(|m| m.kind() == "Service"));
        let scaled = find(&manifests, "ScaledObject/billing-settle-queue");
        let metadata = &scaled["spec"]["triggers"][0]["metadata"];
        assert_eq!(metadata["listName"], "settlements");
        assert_eq!(metadata["listLength"], "20");
    }

    #[test]
    fn test_schedule_function_is_cron_job() {
        let mut nightly = function("invoice", TriggerKind::Schedule);
        nightly.schedule = Some("0 2 * * *".to_string());
        nightly.timezone = "Europe/Paris".to_string();
        let manifests = generate(&make_app(vec![nightly]));

        assert_eq!(
            keys(&manifests),
            vec![
                "CronJob/billing-invoice",
                "NetworkPolicy/billing-invoice-policy",
            ]
        );
        let cron = find(&manifests, "CronJob/billing-invoice");
        assert_eq!(cron["spec"]["schedule"], "0 2 * * *");
        assert_eq!(cron["spec"]["timeZone"], "Europe/Paris");
    }

    #[test]
    fn test_function_scaling_override_wins() {
        let mut worker = function("settle", TriggerKind::Queue);
        worker.queue = Some("settlements".to_string());
        worker.scaling = Some(ScalingConfig {
            kind: ScalingKind::None,
            replicas: 2,
            ..ScalingConfig::default()
        });
        let manifests = generate(&make_app(vec![worker]));

        assert!(!manifests.iter().any(|m| m.kind() == "ScaledObject"));
        let deployment = find(&manifests, "Deployment/billing-settle");
        assert_eq!(deployment["spec"]["replicas"], 2);
    }

    // =========================================================================
    // Story: Only public HTTP functions are routed
    // =========================================================================

    #[test]
    fn test_ingress_follows_visibility_and_trigger() {
        let mut public = function("charge", TriggerKind::Http);
        public.visibility = Some(Visibility::Public);
        public.route = Some("/v1/charge".to_string());
        let private = function("refund", TriggerKind::Http);
        let mut app = make_app(vec![public, private]);
        app.ingress.enabled = true;

        let manifests = generate(&app);
        let route = find(&manifests, "IngressRoute/billing-charge");
        let rule = route["spec"]["routes"][0]["match"]
            .as_str()
            .expect("match rule");
        assert!(rule.contains("PathRegexp(`^/v1/charge(/|$)`)"));
        assert!(!manifests.iter().any(|m| m.key() == "IngressRoute/billing-refund"));
    }

    // =========================================================================
    // Story: Shared objects are emitted once
    // =========================================================================

    #[test]
    fn test_shared_objects_emitted_once() {
        let mut charge = function("charge", TriggerKind::Http);
        charge.environment.insert(
            "STRIPE_KEY".to_string(),
            EnvValue::Secret(SecretRef::new("stripe-key")),
        );
        let mut refund = function("refund", TriggerKind::Http);
        refund.environment.insert(
            "STRIPE_KEY".to_string(),
            EnvValue::Secret(SecretRef::new("stripe-key")),
        );
        let mut app = make_app(vec![charge, refund]);
        app.security.create_service_account = true;

        let manifests = generate(&app);
        let shared: Vec<String> = keys(&manifests)
            .into_iter()
            .filter(|k| k.starts_with("ServiceAccount/") || k.starts_with("ExternalSecret/"))
            .collect();
        assert_eq!(shared, vec!["ServiceAccount/billing", "ExternalSecret/billing-secrets"]);
        assert_eq!(keys(&manifests)[0], "ServiceAccount/billing");

        let secret = find(&manifests, "ExternalSecret/billing-secrets");
        assert_eq!(secret["spec"]["data"][0]["secretKey"], "STRIPE_KEY");

        let deployment = find(&manifests, "Deployment/billing-refund");
        assert_eq!(
            deployment["spec"]["template"]["spec"]["serviceAccountName"],
            "billing"
        );
    }

    // =========================================================================
    // Story: Invalid function sets fail the app
    // =========================================================================

    #[test]
    fn test_conflicting_function_secrets_rejected() {
        let mut charge = function("charge", TriggerKind::Http);
        charge.environment.insert(
            "API_KEY".to_string(),
            EnvValue::Secret(SecretRef::new("charge-key")),
        );
        let mut refund = function("refund", TriggerKind::Http);
        refund.environment.insert(
            "API_KEY".to_string(),
            EnvValue::Secret(SecretRef::new("refund-key")),
        );
        let app = make_app(vec![charge, refund]);
        let profile = EnvironmentProfile::dev();
        let ctx = GenerationContext::new(&app, &profile, "dev").expect("valid context");

        let err = FunctionApp.plan(&ctx).err().expect("conflict rejected");
        match err {
            GenerateError::UnsupportedCombination { field, .. } => {
                assert_eq!(field, "functions[1].environment.API_KEY");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_app_without_functions_rejected() {
        let app = make_app(Vec::new());
        let profile = EnvironmentProfile::dev();
        let ctx = GenerationContext::new(&app, &profile, "dev").expect("valid context");
        assert!(matches!(
            FunctionApp.plan(&ctx).err(),
            Some(GenerateError::UnsupportedCombination { .. })
        ));
    }
}
