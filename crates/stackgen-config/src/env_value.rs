//! Environment variable values: literals and secret references
//!
//! An `environment` entry is either a scalar (string, number or bool, kept as
//! a string) or a mapping naming a secret in the external secret manager:
//!
//! ```yaml
//! environment:
//!   LOG_LEVEL: info
//!   DATABASE_URL: ${DATABASE_URL:-postgres://localhost/app}
//!   API_KEY:
//!     secret: api-key
//!     version: "3"
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use stackgen_common::kube_utils::sanitize_name;

/// Provider assumed when a secret reference does not name one
pub const DEFAULT_SECRET_PROVIDER: &str = "gcp";

/// Version assumed when a secret reference does not pin one
pub const DEFAULT_SECRET_VERSION: &str = "latest";

/// Lookup used for `${VAR}` substitution
pub type EnvLookup = dyn Fn(&str) -> Option<String>;

// =============================================================================
// EnvValue
// =============================================================================

/// Value of one environment variable
#[derive(Clone, Debug, PartialEq)]
pub enum EnvValue {
    /// Plain value, after `${VAR}` substitution
    Literal(String),
    /// Value synced from the secret manager
    Secret(SecretRef),
}

impl EnvValue {
    /// Literal value
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// The secret reference, if this is one
    pub fn as_secret(&self) -> Option<&SecretRef> {
        match self {
            Self::Secret(secret) => Some(secret),
            Self::Literal(_) => None,
        }
    }

    /// Apply `${VAR}` substitution to literal values; secrets are untouched
    pub fn substituted(self, lookup: &EnvLookup) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(substitute(&value, lookup)),
            secret => secret,
        }
    }
}

impl<'de> Deserialize<'de> for EnvValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        match value {
            serde_yaml::Value::String(s) => Ok(Self::Literal(s)),
            serde_yaml::Value::Number(n) => Ok(Self::Literal(n.to_string())),
            serde_yaml::Value::Bool(b) => Ok(Self::Literal(b.to_string())),
            serde_yaml::Value::Mapping(_) => serde_yaml::from_value::<SecretRef>(value)
                .map(Self::Secret)
                .map_err(D::Error::custom),
            serde_yaml::Value::Null => Err(D::Error::custom(
                "environment value is empty; use \"\" for an empty string",
            )),
            _ => Err(D::Error::custom(
                "expected a string, number, bool or secret reference",
            )),
        }
    }
}

// =============================================================================
// SecretRef
// =============================================================================

/// Reference to a secret in the external secret manager
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SecretRef {
    /// Secret name in the manager
    pub secret: String,
    /// Provider that stores the secret
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Secret version
    #[serde(default = "default_version")]
    pub version: String,
    /// Property inside a structured secret
    #[serde(default)]
    pub key: Option<String>,
}

fn default_provider() -> String {
    DEFAULT_SECRET_PROVIDER.to_string()
}

fn default_version() -> String {
    DEFAULT_SECRET_VERSION.to_string()
}

impl SecretRef {
    /// Reference to the latest version of a secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            provider: default_provider(),
            version: default_version(),
            key: None,
        }
    }

    /// Whether the reference pins a specific version
    pub fn is_pinned(&self) -> bool {
        self.version != DEFAULT_SECRET_VERSION
    }

    /// Name of a cluster Secret holding this value when nothing syncs it
    pub fn cluster_secret_name(&self) -> String {
        sanitize_name(&self.secret)
    }

    /// Key inside the cluster Secret when nothing syncs it
    pub fn cluster_secret_key<'a>(&'a self, var: &'a str) -> &'a str {
        self.key.as_deref().unwrap_or(var)
    }
}

// =============================================================================
// Substitution
// =============================================================================

/// Expand `${VAR}` and `${VAR:-default}` references.
///
/// Unset variables without a default expand to the empty string. Text that
/// does not form a valid reference (including `$VAR` without braces) is kept
/// as is.
pub fn substitute(input: &str, lookup: &EnvLookup) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, default) = match body.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };

        if is_var_name(name) {
            match lookup(name) {
                Some(value) => out.push_str(&value),
                None => out.push_str(default.unwrap_or_default()),
            }
        } else {
            out.push_str(&rest[start..start + 2 + end + 1]);
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    // =========================================================================
    // Deserialization
    // =========================================================================

    #[test]
    fn scalars_become_literals() {
        let env: BTreeMap<String, EnvValue> =
            serde_yaml::from_str("A: text\nB: 8080\nC: true\n").expect("valid yaml");
        assert_eq!(env["A"], EnvValue::literal("text"));
        assert_eq!(env["B"], EnvValue::literal("8080"));
        assert_eq!(env["C"], EnvValue::literal("true"));
    }

    #[test]
    fn mapping_becomes_secret_with_defaults() {
        let value: EnvValue = serde_yaml::from_str("secret: api-key\n").expect("valid yaml");
        let secret = value.as_secret().expect("secret reference");
        assert_eq!(secret.secret, "api-key");
        assert_eq!(secret.provider, "gcp");
        assert_eq!(secret.version, "latest");
        assert!(!secret.is_pinned());
    }

    #[test]
    fn unknown_secret_field_is_rejected() {
        let result: Result<EnvValue, _> = serde_yaml::from_str("secret: a\nvault: b\n");
        assert!(result.is_err());
    }

    #[test]
    fn null_value_is_rejected() {
        let result: Result<BTreeMap<String, EnvValue>, _> = serde_yaml::from_str("A:\n");
        assert!(result.is_err());
    }

    #[test]
    fn cluster_secret_fallbacks() {
        let mut secret = SecretRef::new("Stripe_Key");
        assert_eq!(secret.cluster_secret_name(), "stripe-key");
        assert_eq!(secret.cluster_secret_key("STRIPE"), "STRIPE");
        secret.key = Some("token".to_string());
        assert_eq!(secret.cluster_secret_key("STRIPE"), "token");
    }

    // =========================================================================
    // Substitution
    // =========================================================================

    #[test]
    fn substitutes_set_variables() {
        let lookup = lookup_from(&[("HOST", "db"), ("PORT", "5432")]);
        assert_eq!(substitute("postgres://${HOST}:${PORT}/app", &lookup), "postgres://db:5432/app");
    }

    #[test]
    fn default_applies_only_when_unset() {
        let lookup = lookup_from(&[("SET", "yes")]);
        assert_eq!(substitute("${SET:-no}", &lookup), "yes");
        assert_eq!(substitute("${UNSET:-fallback}", &lookup), "fallback");
        assert_eq!(substitute("${UNSET}", &lookup), "");
    }

    #[test]
    fn malformed_references_are_kept() {
        let lookup = lookup_from(&[]);
        assert_eq!(substitute("$HOME and ${1BAD} and ${open", &lookup), "$HOME and ${1BAD} and ${open");
    }

    #[test]
    fn secrets_are_not_substituted() {
        let lookup = lookup_from(&[("X", "y")]);
        let value = EnvValue::Secret(SecretRef::new("${X}")).substituted(&lookup);
        assert_eq!(value.as_secret().map(|s| s.secret.as_str()), Some("${X}"));
    }
}
