//! HAProxy backend: a `networking.k8s.io/v1` Ingress tuned with
//! haproxy-ingress annotations

use std::collections::BTreeMap;

use stackgen_common::k8s::networking::{
    HttpIngressPath, HttpIngressRuleValue, Ingress, IngressBackend as BackendRef, IngressRule,
    IngressSpec, IngressTls,
};
use stackgen_common::k8s::Manifest;
use stackgen_common::kube_utils::ObjectMeta;
use stackgen_common::LABEL_INGRESS;
use stackgen_config::model::TimeoutConfig;
use stackgen_config::IngressBackend;

use super::route::{interceptor_service, Route};
use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;

const ANNOTATION_PREFIX: &str = "haproxy-ingress.github.io";

/// Conditions on which haproxy retries a request against another endpoint
const RETRY_ON: &str = "conn-failure,empty-response,response-timeout";

const RETRIES: &str = "3";

pub(crate) fn annotation(key: &str) -> String {
    format!("{}/{}", ANNOTATION_PREFIX, key)
}

/// Ingress `<n>` with class `haproxy`
pub struct HaproxyIngress;

impl HaproxyIngress {
    /// Generated annotations followed by the user overlay
    pub(crate) fn annotations(timeouts: &TimeoutConfig, route: &Route) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        annotations.insert(annotation("timeout-connect"), timeouts.connect.clone());
        annotations.insert(annotation("timeout-server"), timeouts.server.clone());
        annotations.insert(annotation("timeout-client"), timeouts.client.clone());
        annotations.insert(annotation("timeout-queue"), timeouts.queue.clone());
        annotations.insert(annotation("retry-on"), RETRY_ON.to_string());
        annotations.insert(annotation("retries"), RETRIES.to_string());

        let config_backend = Self::config_backend(route);
        if !config_backend.is_empty() {
            annotations.insert(annotation("config-backend"), config_backend);
        }

        annotations.extend(route.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        annotations
    }

    /// Backend snippet rewriting Host and path
    pub(crate) fn config_backend(route: &Route) -> String {
        let mut snippet = String::new();
        if let Some(host) = route.rewrite_host() {
            snippet.push_str(&format!("http-request set-header Host {}\n", host));
        }
        if route.strip_prefix {
            let path = route.strip_path();
            let prefix = route.rewrite_prefix();
            let bare = if prefix.is_empty() { "/" } else { prefix };
            snippet.push_str(&format!(
                "http-request set-path %[path,regsub(^{path}/,{prefix}/),regsub(^{path}$,{bare})]\n"
            ));
        }
        snippet
    }

    /// Ingress for `route`, one rule per host
    pub(crate) fn ingress(metadata: ObjectMeta, route: &Route) -> Ingress {
        let (backend, port) = route.backend();
        let http = HttpIngressRuleValue {
            paths: vec![HttpIngressPath {
                path: route.path.clone(),
                path_type: route.path_type.as_str().to_string(),
                backend: BackendRef::service(backend, port),
            }],
        };

        let rules = if route.hosts.is_empty() {
            vec![IngressRule { host: None, http }]
        } else {
            route
                .hosts
                .iter()
                .map(|host| IngressRule {
                    host: Some(host.clone()),
                    http: http.clone(),
                })
                .collect()
        };

        let tls = route
            .tls
            .iter()
            .map(|tls| IngressTls {
                hosts: tls.hosts.clone(),
                secret_name: Some(tls.secret.clone()),
            })
            .collect();

        Ingress::new(
            metadata.with_label(LABEL_INGRESS, IngressBackend::Haproxy.as_str()),
            IngressSpec {
                ingress_class_name: Some(IngressBackend::Haproxy.as_str().to_string()),
                rules,
                tls,
            },
        )
    }
}

impl ManifestGenerator for HaproxyIngress {
    fn name(&self) -> &'static str {
        "ingress"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.app.ingress.enabled
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let route = Route::compile(ctx);
        let mut manifests: Vec<Manifest> = Vec::new();

        if let Some(service) = interceptor_service(ctx, &route) {
            manifests.push(service.into());
        }

        let ingress = Self::ingress(
            ctx.metadata(ctx.name())
                .with_annotations(&Self::annotations(&ctx.app.ingress.timeouts, &route)),
            &route,
        );
        manifests.push(ingress.into());
        manifests
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use stackgen_config::model::{AppOverride, ScalingKind};
    use stackgen_config::{AppSpec, EnvironmentProfile};

    use super::*;

    fn make_app(name: &str) -> AppSpec {
        let mut app = AppSpec::new(name, format!("services/{}", name));
        app.ingress.enabled = true;
        app
    }

    fn generate(app: &AppSpec) -> Vec<serde_json::Value> {
        let profile = EnvironmentProfile::gcp();
        let ctx = GenerationContext::new(app, &profile, "gcp").expect("valid context");
        HaproxyIngress
            .generate(&ctx)
            .iter()
            .map(|m| m.to_value().expect("serializable"))
            .collect()
    }

    fn ingress(manifests: &[serde_json::Value]) -> &serde_json::Value {
        manifests
            .iter()
            .find(|m| m["kind"] == "Ingress")
            .expect("ingress generated")
    }

    // =========================================================================
    // Story: Generated annotations tune the proxy
    // =========================================================================

    #[rstest]
    #[case("timeout-connect", "10s")]
    #[case("timeout-server", "180s")]
    #[case("timeout-client", "180s")]
    #[case("timeout-queue", "180s")]
    #[case("retry-on", "conn-failure,empty-response,response-timeout")]
    #[case("retries", "3")]
    fn test_default_annotations(#[case] key: &str, #[case] expected: &str) {
        let manifests = generate(&make_app("api"));
        let annotations = &ingress(&manifests)["metadata"]["annotations"];
        assert_eq!(annotations[annotation(key)], expected);
    }

    #[test]
    fn test_config_backend_rewrites_host_and_strips_path() {
        let mut app = make_app("api");
        app.ingress.path = "/api/".to_string();
        app.ingress.strip_prefix = true;
        let manifests = generate(&app);
        let snippet = ingress(&manifests)["metadata"]["annotations"][annotation("config-backend")]
            .as_str()
            .expect("config-backend set")
            .to_string();
        assert_eq!(
            snippet,
            "http-request set-header Host api.apps\n\
             http-request set-path %[path,regsub(^/api/,/),regsub(^/api$,/)]\n"
        );
    }

    #[test]
    fn test_direct_route_has_no_config_backend() {
        let mut app = make_app("api");
        app.scaling.kind = ScalingKind::FixedReplicaAutoscale;
        let manifests = generate(&app);
        assert_eq!(manifests.len(), 1);
        let ing = ingress(&manifests);
        assert!(ing["metadata"]["annotations"].get(annotation("config-backend")).is_none());
        let backend = &ing["spec"]["rules"][0]["http"]["paths"][0]["backend"]["service"];
        assert_eq!(backend["name"], "api");
        assert_eq!(backend["port"]["number"], 80);
    }

    #[test]
    fn test_override_annotations_win_over_generated() {
        let mut app = make_app("api");
        let mut delta = AppOverride::default();
        delta
            .ingress_annotations
            .insert(annotation("timeout-server"), "600s".to_string());
        app.overrides.insert("gcp".to_string(), delta);
        let manifests = generate(&app);
        assert_eq!(
            ingress(&manifests)["metadata"]["annotations"][annotation("timeout-server")],
            "600s"
        );
    }

    // =========================================================================
    // Story: Rules and TLS
    // =========================================================================

    #[test]
    fn test_one_rule_per_host_with_policy_path_type() {
        let mut app = make_app("api");
        app.ingress.path = "/api".to_string();
        app.ingress.hosts = vec!["a.example.com".to_string(), "b.example.com".to_string()];
        let manifests = generate(&app);
        let ing = ingress(&manifests);

        assert_eq!(ing["spec"]["ingressClassName"], "haproxy");
        let rules = ing["spec"]["rules"].as_array().expect("rules");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1]["host"], "b.example.com");
        assert_eq!(rules[0]["http"]["paths"][0]["path"], "/api");
        assert_eq!(rules[0]["http"]["paths"][0]["pathType"], "Prefix");
        assert!(ing["spec"].get("tls").is_none());
    }

    #[test]
    fn test_interceptor_service_precedes_ingress() {
        let manifests = generate(&make_app("api"));
        assert_eq!(manifests[0]["kind"], "Service");
        assert_eq!(manifests[0]["metadata"]["name"], "api-interceptor");
        assert_eq!(manifests[1]["kind"], "Ingress");
    }
}
