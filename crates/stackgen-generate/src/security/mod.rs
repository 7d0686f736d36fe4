//! Security generators: NetworkPolicy, ServiceAccount and ExternalSecret
//!
//! The pod-side half of secret handling (how env vars reference the synced
//! or operator-provided Secret) lives in the pod template compiler.

pub mod external_secret;
pub mod network_policy;
pub mod service_account;

pub use external_secret::ExternalSecretGenerator;
pub use network_policy::NetworkPolicyGenerator;
pub use service_account::ServiceAccountGenerator;
