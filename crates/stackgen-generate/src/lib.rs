//! Manifest generation for stackgen
//!
//! An app is turned into manifests in three layers:
//!
//! - [`ManifestGenerator`]s each emit one family of objects (Deployment,
//!   autoscaler, ingress, NetworkPolicy, ...) from a [`GenerationContext`].
//! - [`AppGenerator`]s pick and order the manifest generators for one app type
//!   (`apps`, `functions`, `compose`) and reject combinations the target
//!   environment cannot serve.
//! - The [`Registry`] maps app-type discriminants to app generators and the
//!   [`Driver`] runs every selected app of a configuration.
//!
//! The shared `gateway` section is rendered apart from the apps by the
//! [`gateway`] generators and written as its own output.
//!
//! Generation is pure: nothing here reads files or talks to a cluster.

#![deny(missing_docs)]

pub mod apps;
pub mod context;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod generator;
pub mod ingress;
pub mod registry;
pub mod scaling;
pub mod security;
pub mod storage;
pub mod workload;

pub use context::{GenerationContext, Naming, WorkloadScope, WorkloadShape};
pub use driver::{AppFailure, AppOutput, Driver, OutputFormat, RunOptions, RunReport};
pub use error::GenerateError;
pub use generator::{AppGenerator, ManifestGenerator};
pub use registry::Registry;

/// Result type for generation
pub type Result<T> = std::result::Result<T, GenerateError>;
