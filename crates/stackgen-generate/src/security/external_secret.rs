//! ExternalSecret generation
//!
//! When the environment runs the External Secrets Operator, every secret
//! reference in the app's environment is synced into one Secret
//! `<app>-secrets`, keyed by the env var name. Without the operator nothing is
//! emitted and the pod template points at operator-provided Secrets instead.

use stackgen_common::k8s::eso::{
    ExternalSecret, ExternalSecretData, ExternalSecretSpec, ExternalSecretTarget, RemoteRef,
    SecretStoreRef,
};
use stackgen_common::k8s::Manifest;
use tracing::debug;

use crate::context::GenerationContext;
use crate::generator::ManifestGenerator;
use crate::Result;

const REFRESH_INTERVAL: &str = "1h";

/// ExternalSecret `<app>-secrets`
pub struct ExternalSecretGenerator;

impl ExternalSecretGenerator {
    /// Reject secret references the environment's store cannot serve.
    ///
    /// Only checked when sync is active; without sync references resolve to
    /// operator-provided Secrets whatever their provider.
    pub fn check_providers(ctx: &GenerationContext<'_>) -> Result<()> {
        if !ctx.secret_sync() {
            return Ok(());
        }
        for (var, secret) in ctx.app.secret_env() {
            if secret.provider != ctx.profile.secret_provider {
                return Err(ctx.unsupported(
                    format!("environment.{}.provider", var),
                    format!(
                        "provider '{}' is not served by secret store '{}' ({})",
                        secret.provider, ctx.profile.secret_store, ctx.profile.secret_provider
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl ManifestGenerator for ExternalSecretGenerator {
    fn name(&self) -> &'static str {
        "external-secret"
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        if ctx.secret_sync() {
            return true;
        }
        if ctx.app.secret_env().next().is_some() {
            debug!(
                app = %ctx.naming.app(),
                env = %ctx.env,
                "secret sync unavailable, expecting operator-provided secrets"
            );
        }
        false
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        let data = ctx
            .app
            .secret_env()
            .map(|(var, secret)| ExternalSecretData {
                secret_key: var.to_string(),
                remote_ref: RemoteRef {
                    key: secret.secret.clone(),
                    version: secret.is_pinned().then(|| secret.version.clone()),
                    property: secret.key.clone(),
                },
            })
            .collect();

        let name = ctx.secrets_name();
        let external_secret = ExternalSecret::new(
            ctx.metadata(name.clone()),
            ExternalSecretSpec {
                refresh_interval: REFRESH_INTERVAL.to_string(),
                secret_store_ref: SecretStoreRef::cluster_secret_store(
                    ctx.profile.secret_store.clone(),
                ),
                target: ExternalSecretTarget {
                    name,
                    creation_policy: "Owner".to_string(),
                },
                data,
            },
        );
        vec![external_secret.into()]
    }
}
