//! Common types for stackgen: Kubernetes resource types, metadata helpers and errors

#![deny(missing_docs)]

pub mod error;
pub mod k8s;
pub mod kube_utils;
pub mod quantity;

pub use error::Error;
pub use k8s::Manifest;

/// Result with [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Standard Kubernetes name label
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Label naming the logical app a resource belongs to
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";

/// Standard Kubernetes managed-by label
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label for everything stackgen emits
pub const LABEL_MANAGED_BY_STACKGEN: &str = "stackgen";

/// Selector label shared by a workload, its Service and its policies
pub const LABEL_APP: &str = "app";

/// Label recording which environment a manifest was generated for
pub const LABEL_ENVIRONMENT: &str = "stackgen.io/environment";

/// Label recording the visibility level on network policies
pub const LABEL_VISIBILITY: &str = "stackgen.io/visibility";

/// Label on ingress objects naming the backend that renders them
pub const LABEL_INGRESS: &str = "stackgen.io/ingress";

/// Label on gateway objects naming the route they serve
pub const LABEL_GATEWAY_ROUTE: &str = "stackgen.io/gateway-route";

/// Label used by Kubernetes to expose a namespace's own name
pub const LABEL_NAMESPACE_NAME: &str = "kubernetes.io/metadata.name";

/// Maximum length of a DNS-1123 label
pub const MAX_NAME_LEN: usize = 63;
