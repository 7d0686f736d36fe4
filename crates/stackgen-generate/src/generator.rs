//! Generator traits
//!
//! A [`ManifestGenerator`] emits one family of objects for one workload. An
//! [`AppGenerator`] plans which manifest generators run for an app, in which
//! order, and rejects combinations the environment cannot serve before any
//! manifest is produced.
//!
//! # Example
//!
//! ```ignore
//! struct PdbGenerator;
//!
//! impl ManifestGenerator for PdbGenerator {
//!     fn name(&self) -> &'static str { "pdb" }
//!
//!     fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
//!         ctx.app.pdb.is_some()
//!     }
//!
//!     fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
//!         vec![build_pdb(ctx).into()]
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use stackgen_common::k8s::Manifest;
use tracing::debug;

use crate::context::{GenerationContext, WorkloadScope};
use crate::Result;

// =============================================================================
// ManifestGenerator
// =============================================================================

/// Emits one family of manifests for a workload
pub trait ManifestGenerator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether this generator applies to the workload.
    ///
    /// Generators are only invoked when this returns true; returning an empty
    /// list from [`generate`](Self::generate) is also allowed.
    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool;

    /// Build the manifests
    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest>;
}

// =============================================================================
// AppGenerator
// =============================================================================

/// Turns one app type into manifests
pub trait AppGenerator: Send + Sync {
    /// Section key this generator handles (`apps`, `functions`, `compose`)
    fn app_type(&self) -> &'static str;

    /// Ordered manifest generators for the app.
    ///
    /// Fails with [`UnsupportedCombination`](crate::GenerateError::UnsupportedCombination)
    /// when the app asks for something the environment cannot provide.
    fn plan(&self, ctx: &GenerationContext<'_>) -> Result<Vec<Box<dyn ManifestGenerator>>>;

    /// Plan and run the generators
    fn generate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<Manifest>> {
        let plan = self.plan(ctx)?;
        run_plan(ctx, &plan)
    }
}

/// Run generators in order and collect their output.
///
/// Generators whose predicate is false are skipped. A manifest whose
/// (kind, namespace, name) was already emitted is dropped when identical and
/// rejected when it differs.
pub fn run_plan(
    ctx: &GenerationContext<'_>,
    plan: &[Box<dyn ManifestGenerator>],
) -> Result<Vec<Manifest>> {
    let mut manifests: Vec<Manifest> = Vec::new();
    let mut seen: BTreeMap<(String, String, String), usize> = BTreeMap::new();

    for generator in plan {
        if !generator.should_generate(ctx) {
            debug!(app = %ctx.naming.app(), generator = generator.name(), "skipped");
            continue;
        }

        for manifest in generator.generate(ctx) {
            let key = (
                manifest.kind().to_string(),
                manifest.namespace().to_string(),
                manifest.name().to_string(),
            );
            match seen.get(&key) {
                Some(&index) if manifests[index] == manifest => {
                    debug!(object = %manifest.key(), "dropping identical duplicate");
                }
                Some(_) => {
                    return Err(ctx.unsupported(
                        generator.name(),
                        format!("{} is generated twice with different content", manifest.key()),
                    ));
                }
                None => {
                    debug!(generator = generator.name(), object = %manifest.key(), "generated");
                    seen.insert(key, manifests.len());
                    manifests.push(manifest);
                }
            }
        }
    }

    Ok(manifests)
}

// =============================================================================
// Scoped
// =============================================================================

/// Runs a generator against a child workload instead of the app itself
pub struct Scoped {
    scope: Arc<WorkloadScope>,
    inner: Box<dyn ManifestGenerator>,
}

impl Scoped {
    /// Wrap `inner` so it sees the context of `scope`
    pub fn new(scope: Arc<WorkloadScope>, inner: Box<dyn ManifestGenerator>) -> Self {
        Self { scope, inner }
    }
}

impl ManifestGenerator for Scoped {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn should_generate(&self, ctx: &GenerationContext<'_>) -> bool {
        self.inner.should_generate(&ctx.scoped(&self.scope))
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<Manifest> {
        self.inner.generate(&ctx.scoped(&self.scope))
    }
}

/// Box every generator in `generators` into a [`Scoped`] for `scope`
pub fn scoped(
    scope: &Arc<WorkloadScope>,
    generators: Vec<Box<dyn ManifestGenerator>>,
) -> Vec<Box<dyn ManifestGenerator>> {
    generators
        .into_iter()
        .map(|inner| Box::new(Scoped::new(Arc::clone(scope), inner)) as Box<dyn ManifestGenerator>)
        .collect()
}
