//! Replica and autoscaling configuration.
//!
//! The YAML form is flat: a `kind` tag plus every field any kind might use.
//! [`ScalingConfig::resolve`] validates the fields the active kind needs and
//! produces a [`ScalingPolicy`], which carries only those fields. Fields that
//! belong to other kinds are ignored rather than rejected, so switching the
//! tag in an override does not require deleting unrelated settings.

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::Result;

/// Redis/Valkey endpoint used by queue scalers unless overridden
pub const DEFAULT_QUEUE_ADDRESS: &str = "valkey-master.valkey.svc.cluster.local:6379";

/// Secret holding the queue password unless overridden
pub const DEFAULT_QUEUE_AUTH_SECRET: &str = "valkey-secret";

/// Key of the queue password inside [`DEFAULT_QUEUE_AUTH_SECRET`]
pub const DEFAULT_QUEUE_AUTH_SECRET_KEY: &str = "password";

/// Name of the window used when a time-window policy lists none
pub const BUSINESS_HOURS_WINDOW: &str = "business-hours";

// =============================================================================
// ScalingKind
// =============================================================================

/// Scaling mechanism tag
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingKind {
    /// Static replica count, no autoscaler
    None,
    /// CPU/memory utilization autoscaling
    #[serde(alias = "hpa")]
    FixedReplicaAutoscale,
    /// Request-rate autoscaling with scale to zero
    #[default]
    #[serde(alias = "keda-http")]
    RequestRateAutoscale,
    /// Queue length autoscaling
    #[serde(alias = "keda-queue")]
    QueueDepthAutoscale,
    /// Scheduled replica windows
    #[serde(alias = "keda-cron")]
    TimeWindowAutoscale,
}

impl ScalingKind {
    /// Canonical tag as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FixedReplicaAutoscale => "fixed-replica-autoscale",
            Self::RequestRateAutoscale => "request-rate-autoscale",
            Self::QueueDepthAutoscale => "queue-depth-autoscale",
            Self::TimeWindowAutoscale => "time-window-autoscale",
        }
    }

    /// Whether an autoscaler owns the replica count
    pub fn is_autoscaled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ScalingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ScalingConfig (raw)
// =============================================================================

/// Scaling section as written in configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScalingConfig {
    /// Mechanism
    #[serde(alias = "type")]
    pub kind: ScalingKind,
    /// Static replica count for `none`
    pub replicas: u32,
    /// Lower replica bound
    #[serde(alias = "min_instances")]
    pub min: u32,
    /// Upper replica bound
    #[serde(alias = "max_instances")]
    pub max: u32,
    /// CPU utilization target (percent)
    pub target_cpu_utilization: u32,
    /// Memory utilization target (percent)
    pub target_memory_utilization: Option<u32>,
    /// Scale-up stabilization window (seconds)
    pub scale_up_stabilization: u32,
    /// Scale-down stabilization window (seconds)
    pub scale_down_stabilization: u32,
    /// Pending requests per replica before scaling out
    pub target_pending_requests: u32,
    /// Idle seconds before scaling back down
    pub cooldown_period: u32,
    /// Queue (list) to watch
    pub queue_name: Option<String>,
    /// Queue length per replica
    pub target_depth: u32,
    /// Queue endpoint
    pub address: String,
    /// Secret holding the queue password
    pub auth_secret: String,
    /// Key inside `auth_secret`
    pub auth_secret_key: String,
    /// Seconds between queue checks
    pub polling_interval: u32,
    /// Scheduled windows
    pub windows: Vec<TimeWindow>,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            kind: ScalingKind::default(),
            replicas: 1,
            min: 0,
            max: 10,
            target_cpu_utilization: 80,
            target_memory_utilization: None,
            scale_up_stabilization: 0,
            scale_down_stabilization: 300,
            target_pending_requests: 100,
            cooldown_period: 300,
            queue_name: None,
            target_depth: 5,
            address: DEFAULT_QUEUE_ADDRESS.to_string(),
            auth_secret: DEFAULT_QUEUE_AUTH_SECRET.to_string(),
            auth_secret_key: DEFAULT_QUEUE_AUTH_SECRET_KEY.to_string(),
            polling_interval: 15,
            windows: Vec::new(),
        }
    }
}

/// One scheduled replica window
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TimeWindow {
    /// Window name, unique within the policy
    pub name: String,
    /// IANA timezone for `start`/`end`
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Cron expression opening the window
    pub start: String,
    /// Cron expression closing the window
    pub end: String,
    /// Replicas while the window is open
    pub replicas: u32,
}

pub(crate) fn default_timezone() -> String {
    "UTC".to_string()
}

/// Whether `expr` has the five fields of a standard cron expression
pub(crate) fn is_cron_expression(expr: &str) -> bool {
    expr.split_whitespace().count() == 5
}

// =============================================================================
// ScalingPolicy (resolved)
// =============================================================================

/// Validated scaling policy, one variant per mechanism
#[derive(Clone, Debug, PartialEq)]
pub enum ScalingPolicy {
    /// Static replica count
    None {
        /// Replicas (at least 1)
        replicas: u32,
    },
    /// CPU/memory utilization autoscaling
    FixedReplica(UtilizationScaling),
    /// Request-rate autoscaling
    RequestRate(RequestRateScaling),
    /// Queue length autoscaling
    QueueDepth(QueueDepthScaling),
    /// Scheduled windows
    TimeWindow(TimeWindowScaling),
}

impl ScalingPolicy {
    /// The tag this policy was resolved from
    pub fn kind(&self) -> ScalingKind {
        match self {
            Self::None { .. } => ScalingKind::None,
            Self::FixedReplica(_) => ScalingKind::FixedReplicaAutoscale,
            Self::RequestRate(_) => ScalingKind::RequestRateAutoscale,
            Self::QueueDepth(_) => ScalingKind::QueueDepthAutoscale,
            Self::TimeWindow(_) => ScalingKind::TimeWindowAutoscale,
        }
    }

    /// Replica count to write into the Deployment; `None` when an autoscaler owns it
    pub fn static_replicas(&self) -> Option<u32> {
        match self {
            Self::None { replicas } => Some(*replicas),
            _ => None,
        }
    }
}

/// Utilization autoscaler settings
#[derive(Clone, Debug, PartialEq)]
pub struct UtilizationScaling {
    /// Minimum replicas
    pub min: u32,
    /// Maximum replicas
    pub max: u32,
    /// CPU target percent
    pub target_cpu_utilization: u32,
    /// Memory target percent
    pub target_memory_utilization: Option<u32>,
    /// Scale-up stabilization seconds
    pub scale_up_stabilization: u32,
    /// Scale-down stabilization seconds
    pub scale_down_stabilization: u32,
}

/// Request-rate autoscaler settings
#[derive(Clone, Debug, PartialEq)]
pub struct RequestRateScaling {
    /// Minimum replicas (0 enables scale to zero)
    pub min: u32,
    /// Maximum replicas
    pub max: u32,
    /// Requests per replica
    pub target_pending_requests: u32,
    /// Idle seconds before scaling down
    pub cooldown_period: u32,
}

/// Queue autoscaler settings
#[derive(Clone, Debug, PartialEq)]
pub struct QueueDepthScaling {
    /// Minimum replicas
    pub min: u32,
    /// Maximum replicas
    pub max: u32,
    /// List to watch
    pub queue_name: String,
    /// List length per replica
    pub target_depth: u32,
    /// Queue endpoint
    pub address: String,
    /// Secret with the queue password
    pub auth_secret: String,
    /// Key inside `auth_secret`
    pub auth_secret_key: String,
    /// Seconds between checks
    pub polling_interval: u32,
    /// Idle seconds before scaling down
    pub cooldown_period: u32,
}

/// Scheduled window settings
#[derive(Clone, Debug, PartialEq)]
pub struct TimeWindowScaling {
    /// Replicas outside every window
    pub min: u32,
    /// Upper bound for any window
    pub max: u32,
    /// Windows, never empty
    pub windows: Vec<TimeWindow>,
}

// =============================================================================
// Resolution
// =============================================================================

impl ScalingConfig {
    /// Validate the fields the active kind needs and build its policy.
    ///
    /// Error paths are relative to the scaling section (`queue_name`,
    /// `windows[1].replicas`, ...).
    pub fn resolve(&self) -> Result<ScalingPolicy> {
        match self.kind {
            ScalingKind::None => {
                if self.replicas == 0 {
                    return Err(ConfigError::validation(
                        "replicas",
                        "must be at least 1 when kind=none",
                    ));
                }
                Ok(ScalingPolicy::None {
                    replicas: self.replicas,
                })
            }
            ScalingKind::FixedReplicaAutoscale => {
                self.validate_bounds()?;
                validate_percent("target_cpu_utilization", self.target_cpu_utilization)?;
                if let Some(memory) = self.target_memory_utilization {
                    validate_percent("target_memory_utilization", memory)?;
                }
                Ok(ScalingPolicy::FixedReplica(UtilizationScaling {
                    min: self.min,
                    max: self.max,
                    target_cpu_utilization: self.target_cpu_utilization,
                    target_memory_utilization: self.target_memory_utilization,
                    scale_up_stabilization: self.scale_up_stabilization,
                    scale_down_stabilization: self.scale_down_stabilization,
                }))
            }
            ScalingKind::RequestRateAutoscale => {
                self.validate_bounds()?;
                if self.target_pending_requests == 0 {
                    return Err(ConfigError::validation(
                        "target_pending_requests",
                        "must be greater than 0",
                    ));
                }
                Ok(ScalingPolicy::RequestRate(RequestRateScaling {
                    min: self.min,
                    max: self.max,
                    target_pending_requests: self.target_pending_requests,
                    cooldown_period: self.cooldown_period,
                }))
            }
            ScalingKind::QueueDepthAutoscale => {
                self.validate_bounds()?;
                let queue_name = match self.queue_name.as_deref().map(str::trim) {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => {
                        return Err(ConfigError::validation(
                            "queue_name",
                            format!("required when kind={}", self.kind),
                        ))
                    }
                };
                if self.target_depth == 0 {
                    return Err(ConfigError::validation("target_depth", "must be greater than 0"));
                }
                if self.address.trim().is_empty() {
                    return Err(ConfigError::validation(
                        "address",
                        format!("required when kind={}", self.kind),
                    ));
                }
                Ok(ScalingPolicy::QueueDepth(QueueDepthScaling {
                    min: self.min,
                    max: self.max,
                    queue_name,
                    target_depth: self.target_depth,
                    address: self.address.clone(),
                    auth_secret: self.auth_secret.clone(),
                    auth_secret_key: self.auth_secret_key.clone(),
                    polling_interval: self.polling_interval,
                    cooldown_period: self.cooldown_period,
                }))
            }
            ScalingKind::TimeWindowAutoscale => {
                self.validate_bounds()?;
                let windows = if self.windows.is_empty() {
                    vec![TimeWindow {
                        name: BUSINESS_HOURS_WINDOW.to_string(),
                        timezone: default_timezone(),
                        start: "0 8 * * *".to_string(),
                        end: "0 18 * * *".to_string(),
                        replicas: self.max,
                    }]
                } else {
                    self.validate_windows()?;
                    self.windows.clone()
                };
                Ok(ScalingPolicy::TimeWindow(TimeWindowScaling {
                    min: self.min,
                    max: self.max,
                    windows,
                }))
            }
        }
    }

    fn validate_bounds(&self) -> Result<()> {
        if self.max == 0 {
            return Err(ConfigError::validation("max", "must be at least 1"));
        }
        if self.min > self.max {
            return Err(ConfigError::validation(
                "min",
                format!("must not exceed max (min={}, max={})", self.min, self.max),
            ));
        }
        Ok(())
    }

    fn validate_windows(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (i, window) in self.windows.iter().enumerate() {
            let path = |field: &str| format!("windows[{}].{}", i, field);

            if window.name.trim().is_empty() {
                return Err(ConfigError::validation(path("name"), "must not be empty"));
            }
            if !seen.insert(window.name.as_str()) {
                return Err(ConfigError::validation(
                    path("name"),
                    format!("duplicate window name '{}'", window.name),
                ));
            }
            for (field, expr) in [("start", &window.start), ("end", &window.end)] {
                if !is_cron_expression(expr) {
                    return Err(ConfigError::validation(
                        path(field),
                        format!("'{}' is not a five-field cron expression", expr),
                    ));
                }
            }
            if window.replicas < self.min || window.replicas > self.max {
                return Err(ConfigError::validation(
                    path("replicas"),
                    format!(
                        "{} is outside the replica bounds [{}, {}]",
                        window.replicas, self.min, self.max
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn validate_percent(field: &str, value: u32) -> Result<()> {
    if value == 0 || value > 100 {
        return Err(ConfigError::validation(
            field,
            format!("must be between 1 and 100, got {}", value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn parse(yaml: &str) -> ScalingConfig {
        serde_yaml::from_str(yaml).expect("valid scaling yaml")
    }

    fn error_path(result: Result<ScalingPolicy>) -> String {
        match result {
            Err(ConfigError::Validation { path, .. }) => path,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    // =========================================================================
    // Tags and defaults
    // =========================================================================

    #[test]
    fn test_default_kind_is_request_rate() {
        let config = ScalingConfig::default();
        assert_eq!(config.kind, ScalingKind::RequestRateAutoscale);
        assert_eq!((config.min, config.max), (0, 10));
    }

    #[rstest]
    #[case("none", ScalingKind::None)]
    #[case("hpa", ScalingKind::FixedReplicaAutoscale)]
    #[case("fixed-replica-autoscale", ScalingKind::FixedReplicaAutoscale)]
    #[case("keda-http", ScalingKind::RequestRateAutoscale)]
    #[case("keda-queue", ScalingKind::QueueDepthAutoscale)]
    #[case("keda-cron", ScalingKind::TimeWindowAutoscale)]
    #[case("time-window-autoscale", ScalingKind::TimeWindowAutoscale)]
    fn test_kind_aliases(#[case] tag: &str, #[case] expected: ScalingKind) {
        let config = parse(&format!("kind: {tag}\nqueue_name: jobs\n"));
        assert_eq!(config.kind, expected);
        let policy = config.resolve().expect("valid policy");
        assert_eq!(policy.kind(), expected);
    }

    #[test]
    fn test_type_is_accepted_for_kind() {
        let config = parse("type: hpa\nmin_instances: 2\nmax_instances: 4\n");
        assert_eq!(config.kind, ScalingKind::FixedReplicaAutoscale);
        assert_eq!((config.min, config.max), (2, 4));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<ScalingConfig, _> = serde_yaml::from_str("kind: none\nbogus: 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_irrelevant_fields_are_ignored() {
        let config = parse("kind: none\nreplicas: 2\nqueue_name: jobs\nwindows: []\nmin: 9\nmax: 1\n");
        assert_eq!(
            config.resolve().expect("fields of other kinds are ignored"),
            ScalingPolicy::None { replicas: 2 }
        );
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn test_none_requires_positive_replicas() {
        let config = parse("kind: none\nreplicas: 0\n");
        assert_eq!(error_path(config.resolve()), "replicas");
    }

    #[rstest]
    #[case("fixed-replica-autoscale")]
    #[case("request-rate-autoscale")]
    #[case("time-window-autoscale")]
    fn test_min_above_max_rejected(#[case] tag: &str) {
        let config = parse(&format!("kind: {tag}\nmin: 5\nmax: 2\n"));
        assert_eq!(error_path(config.resolve()), "min");
    }

    #[test]
    fn test_queue_name_required() {
        let config = parse("kind: queue-depth-autoscale\n");
        let err = config.resolve().expect_err("queue name missing");
        assert_eq!(
            err.to_string(),
            "queue_name: required when kind=queue-depth-autoscale"
        );
    }

    #[test]
    fn test_cpu_target_must_be_a_percentage() {
        let config = parse("kind: hpa\ntarget_cpu_utilization: 150\n");
        assert_eq!(error_path(config.resolve()), "target_cpu_utilization");
    }

    #[test]
    fn test_window_replicas_must_be_within_bounds() {
        let config = parse(
            "kind: keda-cron\nmin: 1\nmax: 3\nwindows:\n  - name: peak\n    start: 0 9 * * 1-5\n    end: 0 17 * * 1-5\n    replicas: 5\n",
        );
        assert_eq!(error_path(config.resolve()), "windows[0].replicas");
    }

    #[test]
    fn test_window_names_unique() {
        let window = "  - name: peak\n    start: 0 9 * * *\n    end: 0 17 * * *\n    replicas: 2\n";
        let config = parse(&format!("kind: keda-cron\nwindows:\n{window}{window}"));
        assert_eq!(error_path(config.resolve()), "windows[1].name");
    }

    #[test]
    fn test_window_requires_cron_expressions() {
        let config = parse(
            "kind: keda-cron\nwindows:\n  - name: peak\n    start: at nine\n    end: 0 17 * * *\n    replicas: 2\n",
        );
        assert_eq!(error_path(config.resolve()), "windows[0].start");
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    #[test]
    fn test_empty_windows_fall_back_to_business_hours() {
        let config = parse("kind: time-window-autoscale\nmin: 1\nmax: 4\n");
        let ScalingPolicy::TimeWindow(policy) = config.resolve().expect("valid") else {
            panic!("expected time window policy");
        };
        assert_eq!(policy.windows.len(), 1);
        let window = &policy.windows[0];
        assert_eq!(window.name, BUSINESS_HOURS_WINDOW);
        assert_eq!(window.start, "0 8 * * *");
        assert_eq!(window.end, "0 18 * * *");
        assert_eq!(window.timezone, "UTC");
        assert_eq!(window.replicas, 4);
    }

    #[test]
    fn test_queue_defaults() {
        let config = parse("kind: keda-queue\nqueue_name: jobs\n");
        let ScalingPolicy::QueueDepth(policy) = config.resolve().expect("valid") else {
            panic!("expected queue policy");
        };
        assert_eq!(policy.queue_name, "jobs");
        assert_eq!(policy.target_depth, 5);
        assert_eq!(policy.address, DEFAULT_QUEUE_ADDRESS);
        assert_eq!(policy.auth_secret, "valkey-secret");
        assert_eq!(policy.polling_interval, 15);
    }

    #[rstest]
    #[case("none", Some(1))]
    #[case("hpa", None)]
    #[case("keda-http", None)]
    #[case("keda-cron", None)]
    fn test_static_replicas_only_without_autoscaler(#[case] tag: &str, #[case] expected: Option<u32>) {
        let policy = parse(&format!("kind: {tag}\n")).resolve().expect("valid");
        assert_eq!(policy.static_replicas(), expected);
    }
}
