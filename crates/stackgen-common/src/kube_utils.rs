//! Metadata and API identity helpers shared by every generated resource

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// ObjectMeta - Canonical Kubernetes metadata for all generated resources
// =============================================================================

/// Standard Kubernetes ObjectMeta for generated resources.
///
/// Used by all resource types (workloads, policies, ingress, autoscalers)
/// as the unified metadata representation. Automatically adds the
/// managed-by label so generated objects can be told apart from hand-written ones.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create new metadata with the managed-by label
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_STACKGEN.to_string(),
        );
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels,
            annotations: BTreeMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Merge a set of labels, later values winning
    pub fn with_labels(mut self, labels: &BTreeMap<String, String>) -> Self {
        self.labels
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Merge a set of annotations, later values winning
    pub fn with_annotations(mut self, annotations: &BTreeMap<String, String>) -> Self {
        self.annotations
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

// =============================================================================
// Names
// =============================================================================

/// Normalize a logical name into a DNS-1123 label.
///
/// Lowercases, maps `_` and any other invalid character to `-`, collapses
/// repeated hyphens, trims leading/trailing hyphens and truncates to 63 chars.
/// Returns an empty string when nothing usable remains.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        let mapped = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(mapped);
    }

    out.truncate(crate::MAX_NAME_LEN);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Join `base` and `suffix` into one DNS label.
///
/// When the result would exceed 63 characters the base is shortened, never the
/// suffix, so names that differ only by suffix stay distinct.
pub fn suffixed_name(base: &str, suffix: &str) -> String {
    let suffix = sanitize_name(suffix);
    let mut head = sanitize_name(base);
    if suffix.is_empty() {
        return head;
    }

    head.truncate(crate::MAX_NAME_LEN.saturating_sub(suffix.len() + 1));
    while head.ends_with('-') {
        head.pop();
    }
    if head.is_empty() {
        suffix
    } else {
        format!("{}-{}", head, suffix)
    }
}

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Static apiVersion/kind of a typed manifest
///
/// Every generated resource implements this so the `apiVersion`/`kind` pair
/// written to the manifest comes from one constant instead of string literals
/// scattered through the generators.
///
/// # Example
/// ```ignore
/// impl HasApiResource for ScaledObject {
///     const API_VERSION: &'static str = "keda.sh/v1alpha1";
///     const KIND: &'static str = "ScaledObject";
/// }
/// ```
pub trait HasApiResource {
    /// The full apiVersion (e.g. "apps/v1")
    const API_VERSION: &'static str;
    /// The resource kind (e.g. "Deployment")
    const KIND: &'static str;

    /// The API group, empty for the core group
    fn group() -> &'static str {
        match Self::API_VERSION.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }
}
