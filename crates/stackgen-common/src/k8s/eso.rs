//! External Secrets Operator types

use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

/// ExternalSecret syncs values from a secret backend into a Kubernetes Secret
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecret {
    /// API version
    #[serde(default = "ExternalSecret::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "ExternalSecret::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: ExternalSecretSpec,
}

impl HasApiResource for ExternalSecret {
    const API_VERSION: &'static str = "external-secrets.io/v1beta1";
    const KIND: &'static str = "ExternalSecret";
}

impl_api_defaults!(ExternalSecret);

impl ExternalSecret {
    /// Create a new ExternalSecret
    pub fn new(metadata: ObjectMeta, spec: ExternalSecretSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// ExternalSecret spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretSpec {
    /// How often to re-sync
    pub refresh_interval: String,
    /// Store to read from
    pub secret_store_ref: SecretStoreRef,
    /// Secret to write
    pub target: ExternalSecretTarget,
    /// Individual key mappings
    pub data: Vec<ExternalSecretData>,
}

/// Store the secret is read from
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SecretStoreRef {
    /// Store name
    pub name: String,
    /// Store kind
    pub kind: String,
}

impl SecretStoreRef {
    /// Reference to a ClusterSecretStore
    pub fn cluster_secret_store(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "ClusterSecretStore".to_string(),
        }
    }
}

/// Target Secret settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretTarget {
    /// Secret name
    pub name: String,
    /// Owner, Orphan, Merge or None
    pub creation_policy: String,
}

/// One key synced from the backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretData {
    /// Key in the generated Secret
    pub secret_key: String,
    /// Where the value lives in the backend
    pub remote_ref: RemoteRef,
}

/// Backend location of a value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RemoteRef {
    /// Remote secret name
    pub key: String,
    /// Version (latest when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// JSON property within the secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_ref_omits_unset_fields() {
        let data = ExternalSecretData {
            secret_key: "DB_PASSWORD".to_string(),
            remote_ref: RemoteRef {
                key: "db-password".to_string(),
                version: None,
                property: None,
            },
        };
        let json = serde_json::to_value(&data).expect("serializable");
        assert_eq!(json["secretKey"], "DB_PASSWORD");
        assert_eq!(json["remoteRef"], serde_json::json!({"key": "db-password"}));
    }

    #[test]
    fn cluster_store_ref_kind() {
        let store = SecretStoreRef::cluster_secret_store("gcp-secret-manager");
        assert_eq!(store.kind, "ClusterSecretStore");
    }
}
