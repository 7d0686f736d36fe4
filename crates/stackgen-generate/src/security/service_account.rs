//! ServiceAccount generation

use stackgen_common::k8s::apps::ServiceAccount;
use stackgen_common::k8s::Manifest;
use tracing::debug;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;

/// Annotation binding a Kubernetes ServiceAccount to a GCP service account
pub const GKE_WORKLOAD_IDENTITY_ANNOTATION: &str = "iam.gke.io/gcp-service-account";

/// ServiceAccount named by `security.service_account`, else `<app>`
pub struct ServiceAccountGenerator;

impl ManifestGenerator for ServiceAccountGenerator {
    fn name(&self) -> &'static str {
        "service-account"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        ctx.app.security.create_service_account
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let security = &ctx.app.security;
        let Some(name) = ctx.service_account() else {
            return Vec::new();
        };

        let mut meta = ctx
            .metadata(name)
            .with_annotations(&security.service_account_annotations);

        match &security.workload_identity {
            Some(identity) if ctx.profile.workload_identity => {
                meta = meta.with_annotation(GKE_WORKLOAD_IDENTITY_ANNOTATION, identity.clone());
            }
            Some(_) => {
                debug!(
                    app = %ctx.naming.app(),
                    env = %ctx.env,
                    "workload identity not available, binding skipped"
                );
            }
            None => {}
        }

        vec![ServiceAccount::new(meta).into()]
    }
}
