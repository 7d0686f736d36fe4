//! Compose file parsing.
//!
//! Reads the subset of the compose format that maps onto Kubernetes objects:
//! images, commands, environment, ports, volumes, healthchecks, deploy
//! replicas/resources and the run-as user. Keys outside that subset
//! (`restart`, `depends_on`, `networks`, ...) are ignored. Services keep
//! their document order so the first service exposing a port is stable.
//!
//! Parsing is pure: `env_file` contents are supplied by the caller.

use std::collections::BTreeMap;

use serde::Deserialize;
use stackgen_common::quantity::parse_quantity;
use tracing::debug;

use crate::env_value::{substitute, EnvLookup};
use crate::error::ConfigError;
use crate::Result;

// =============================================================================
// Parsed model
// =============================================================================

/// A parsed compose file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComposeProject {
    /// Services in document order
    pub services: Vec<ComposeService>,
    /// Top-level named volumes
    pub volumes: BTreeMap<String, ComposeVolume>,
}

/// Top-level named volume
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComposeVolume {
    /// Managed outside the project; no claim is generated
    pub external: bool,
}

/// One compose service
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComposeService {
    /// Service key
    pub name: String,
    /// Image, when not built locally
    pub image: Option<String>,
    /// Whether the service has a `build` section
    pub build: bool,
    /// Command override
    pub command: Option<Vec<String>>,
    /// Entrypoint override
    pub entrypoint: Option<Vec<String>>,
    /// Environment, env files first and `environment` on top
    pub environment: BTreeMap<String, String>,
    /// Ports, published ones first in document order
    pub ports: Vec<ComposePort>,
    /// Volume mounts
    pub volumes: Vec<ComposeMount>,
    /// Healthcheck, `None` when absent or disabled
    pub healthcheck: Option<Healthcheck>,
    /// `deploy.replicas`
    pub replicas: Option<u32>,
    /// `deploy.resources.limits`
    pub limits: ComposeResources,
    /// `deploy.resources.reservations`
    pub reservations: ComposeResources,
    /// Numeric run-as user
    pub user: Option<ComposeUser>,
}

impl ComposeService {
    /// Whether the service listens on any port
    pub fn exposes_ports(&self) -> bool {
        !self.ports.is_empty()
    }
}

impl ComposeProject {
    /// Index of the first service exposing a port
    pub fn primary_index(&self) -> Option<usize> {
        self.services.iter().position(ComposeService::exposes_ports)
    }

    /// Whether a named volume is managed outside the project
    pub fn is_external_volume(&self, name: &str) -> bool {
        self.volumes.get(name).is_some_and(|v| v.external)
    }
}

/// Container port with its optional published port
#[derive(Clone, Debug, PartialEq)]
pub struct ComposePort {
    /// Port inside the container
    pub container_port: u16,
    /// Published host port
    pub host_port: Option<u16>,
    /// `TCP` or `UDP`
    pub protocol: String,
}

impl ComposePort {
    /// Port the Kubernetes Service exposes
    pub fn service_port(&self) -> u16 {
        self.host_port.unwrap_or(self.container_port)
    }
}

/// Mount source type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountKind {
    /// Named or anonymous volume
    Volume,
    /// Host directory
    Bind,
    /// In-memory filesystem
    Tmpfs,
}

/// One mount
#[derive(Clone, Debug, PartialEq)]
pub struct ComposeMount {
    /// Source type
    pub kind: MountKind,
    /// Volume name or host path; `None` for anonymous volumes and tmpfs
    pub source: Option<String>,
    /// Path inside the container
    pub target: String,
    /// Mount read-only
    pub read_only: bool,
}

/// Exec healthcheck
#[derive(Clone, Debug, PartialEq)]
pub struct Healthcheck {
    /// Command run inside the container
    pub command: Vec<String>,
    /// Seconds between checks
    pub interval: Option<u32>,
    /// Seconds before a check times out
    pub timeout: Option<u32>,
    /// Failures before unhealthy
    pub retries: Option<u32>,
    /// Grace period before failures count
    pub start_period: Option<u32>,
}

/// Compose resource block, converted to Kubernetes quantities
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComposeResources {
    /// CPU quantity (`500m`)
    pub cpu: Option<String>,
    /// Memory quantity (`512Mi`)
    pub memory: Option<String>,
}

/// `user: uid[:gid]`
#[derive(Clone, Debug, PartialEq)]
pub struct ComposeUser {
    /// UID
    pub uid: i64,
    /// GID
    pub gid: Option<i64>,
}

// =============================================================================
// Raw shapes
// =============================================================================

#[derive(Deserialize)]
struct RawCompose {
    #[serde(default)]
    services: serde_yaml::Mapping,
    #[serde(default)]
    volumes: serde_yaml::Mapping,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawService {
    image: Option<String>,
    build: Option<serde_yaml::Value>,
    command: Option<StringOrList>,
    entrypoint: Option<StringOrList>,
    environment: Option<ListOrMap>,
    env_file: Option<StringOrList>,
    ports: Vec<Scalar>,
    expose: Vec<Scalar>,
    volumes: Vec<RawMount>,
    tmpfs: Option<StringOrList>,
    healthcheck: Option<RawHealthcheck>,
    deploy: Option<RawDeploy>,
    user: Option<Scalar>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    String(String),
    List(Vec<String>),
}

impl StringOrList {
    fn into_words(self) -> Vec<String> {
        match self {
            Self::String(s) => s.split_whitespace().map(str::to_string).collect(),
            Self::List(list) => list,
        }
    }

    fn into_list(self) -> Vec<String> {
        match self {
            Self::String(s) => vec![s],
            Self::List(list) => list,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrMap {
    List(Vec<String>),
    Map(BTreeMap<String, Option<Scalar>>),
}

#[derive(Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn render(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMount {
    Short(String),
    Long {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        source: Option<String>,
        target: String,
        #[serde(default)]
        read_only: bool,
    },
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawHealthcheck {
    test: Option<StringOrList>,
    interval: Option<String>,
    timeout: Option<String>,
    retries: Option<u32>,
    start_period: Option<String>,
    disable: bool,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawDeploy {
    replicas: Option<u32>,
    resources: RawDeployResources,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawDeployResources {
    limits: RawResourceBlock,
    reservations: RawResourceBlock,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawResourceBlock {
    cpus: Option<Scalar>,
    memory: Option<Scalar>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawVolume {
    external: ExternalFlag,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExternalFlag {
    Flag(bool),
    Named(serde_yaml::Mapping),
}

impl Default for ExternalFlag {
    fn default() -> Self {
        Self::Flag(false)
    }
}

// =============================================================================
// Parsing
// =============================================================================

impl ComposeProject {
    /// Parse compose YAML.
    ///
    /// `read_env_file` returns the contents of an `env_file` entry; `lookup`
    /// expands `${VAR}` in environment values. Error paths are relative to
    /// the document (`services.web.ports[0]`).
    pub fn parse(
        text: &str,
        read_env_file: &dyn Fn(&str) -> Result<String>,
        lookup: &EnvLookup,
    ) -> Result<Self> {
        let raw: RawCompose =
            serde_yaml::from_str(text).map_err(|e| ConfigError::parse("", e.to_string()))?;

        let mut volumes = BTreeMap::new();
        for (key, value) in raw.volumes {
            let name = mapping_key(&key, "volumes")?;
            let volume: RawVolume = if value.is_null() {
                RawVolume::default()
            } else {
                serde_yaml::from_value(value)
                    .map_err(|e| ConfigError::parse(format!("volumes.{}", name), e.to_string()))?
            };
            let external = match volume.external {
                ExternalFlag::Flag(flag) => flag,
                ExternalFlag::Named(_) => true,
            };
            volumes.insert(name, ComposeVolume { external });
        }

        let mut services = Vec::new();
        for (key, value) in raw.services {
            let name = mapping_key(&key, "services")?;
            let path = format!("services.{}", name);
            let raw: RawService = serde_yaml::from_value(value)
                .map_err(|e| ConfigError::parse(path.clone(), e.to_string()))?;
            let service = convert_service(name, raw, read_env_file, lookup)
                .map_err(|e| e.within(&path))?;
            services.push(service);
        }

        if services.is_empty() {
            return Err(ConfigError::validation("services", "at least one service is required"));
        }

        Ok(Self { services, volumes })
    }
}

fn mapping_key(key: &serde_yaml::Value, section: &str) -> Result<String> {
    key.as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::parse(section, "keys must be strings"))
}

fn convert_service(
    name: String,
    raw: RawService,
    read_env_file: &dyn Fn(&str) -> Result<String>,
    lookup: &EnvLookup,
) -> Result<ComposeService> {
    if raw.image.is_none() && raw.build.is_none() {
        return Err(ConfigError::validation("", "needs either image or build"));
    }

    let mut environment = BTreeMap::new();
    for file in raw.env_file.map(StringOrList::into_list).unwrap_or_default() {
        let contents = read_env_file(&file)?;
        environment.extend(parse_env_file(&contents));
    }
    match raw.environment {
        Some(ListOrMap::List(entries)) => {
            for entry in entries {
                let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
                environment.insert(key.to_string(), value.to_string());
            }
        }
        Some(ListOrMap::Map(entries)) => {
            for (key, value) in entries {
                environment.insert(key, value.map(|v| v.render()).unwrap_or_default());
            }
        }
        None => {}
    }
    let environment = environment
        .into_iter()
        .map(|(k, v)| {
            let value = substitute(&v, lookup);
            (k, value)
        })
        .collect();

    let mut ports = Vec::new();
    for (i, entry) in raw.ports.iter().enumerate() {
        let port = parse_port(&entry.render())
            .map_err(|msg| ConfigError::validation(format!("ports[{}]", i), msg))?;
        ports.push(port);
    }
    for (i, entry) in raw.expose.iter().enumerate() {
        let mut port = parse_port(&entry.render())
            .map_err(|msg| ConfigError::validation(format!("expose[{}]", i), msg))?;
        port.host_port = None;
        if !ports.iter().any(|p: &ComposePort| p.container_port == port.container_port) {
            ports.push(port);
        }
    }

    let mut volumes = Vec::new();
    for (i, entry) in raw.volumes.into_iter().enumerate() {
        let mount = parse_mount(entry)
            .map_err(|msg| ConfigError::validation(format!("volumes[{}]", i), msg))?;
        volumes.push(mount);
    }
    for target in raw.tmpfs.map(StringOrList::into_list).unwrap_or_default() {
        let target = target.split(':').next().unwrap_or_default().to_string();
        volumes.push(ComposeMount {
            kind: MountKind::Tmpfs,
            source: None,
            target,
            read_only: false,
        });
    }

    let healthcheck = match raw.healthcheck {
        Some(check) => parse_healthcheck(check).map_err(|e| e.within("healthcheck"))?,
        None => None,
    };

    let deploy = raw.deploy.unwrap_or_default();
    let limits = convert_resources(&deploy.resources.limits)
        .map_err(|e| e.within("deploy.resources.limits"))?;
    let reservations = convert_resources(&deploy.resources.reservations)
        .map_err(|e| e.within("deploy.resources.reservations"))?;

    let user = raw.user.as_ref().and_then(|u| parse_user(&u.render()));
    if user.is_none() {
        if let Some(u) = &raw.user {
            debug!(service = %name, user = %u.render(), "non-numeric compose user ignored");
        }
    }

    Ok(ComposeService {
        name,
        image: raw.image,
        build: raw.build.is_some(),
        command: raw.command.map(StringOrList::into_words),
        entrypoint: raw.entrypoint.map(StringOrList::into_words),
        environment,
        ports,
        volumes,
        healthcheck,
        replicas: deploy.replicas,
        limits,
        reservations,
        user,
    })
}

/// Parse `KEY=VALUE` lines, skipping blanks and comments
pub fn parse_env_file(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Parse `[ip:][host:]container[/proto]`
fn parse_port(spec: &str) -> std::result::Result<ComposePort, String> {
    let (ports, protocol) = match spec.split_once('/') {
        Some((ports, proto)) => (ports, proto.to_ascii_uppercase()),
        None => (spec, "TCP".to_string()),
    };
    if protocol != "TCP" && protocol != "UDP" {
        return Err(format!("unsupported protocol in '{}'", spec));
    }

    let parts: Vec<&str> = ports.split(':').collect();
    let number = |s: &str| -> std::result::Result<u16, String> {
        match s.parse::<u16>() {
            Ok(0) | Err(_) => Err(format!("invalid port '{}'", spec)),
            Ok(n) => Ok(n),
        }
    };

    let container_port = number(parts[parts.len() - 1])?;
    let host_port = match parts.len() {
        1 => None,
        _ if parts[parts.len() - 2].is_empty() => None,
        _ => Some(number(parts[parts.len() - 2])?),
    };

    Ok(ComposePort {
        container_port,
        host_port,
        protocol,
    })
}

fn parse_mount(raw: RawMount) -> std::result::Result<ComposeMount, String> {
    match raw {
        RawMount::Short(spec) => {
            let parts: Vec<&str> = spec.split(':').collect();
            let (source, target, mode) = match parts.as_slice() {
                [target] => (None, *target, None),
                [source, target] => (Some(*source), *target, None),
                [source, target, mode] => (Some(*source), *target, Some(*mode)),
                _ => return Err(format!("invalid volume '{}'", spec)),
            };
            if !target.starts_with('/') {
                return Err(format!("mount target '{}' must be absolute", target));
            }
            let kind = match source {
                Some(s) if is_host_path(s) => MountKind::Bind,
                _ => MountKind::Volume,
            };
            Ok(ComposeMount {
                kind,
                source: source.map(str::to_string),
                target: target.to_string(),
                read_only: mode.is_some_and(|m| m.split(',').any(|flag| flag == "ro")),
            })
        }
        RawMount::Long {
            kind,
            source,
            target,
            read_only,
        } => {
            let kind = match kind.as_deref() {
                Some("bind") => MountKind::Bind,
                Some("tmpfs") => MountKind::Tmpfs,
                Some("volume") => MountKind::Volume,
                None => match &source {
                    Some(s) if is_host_path(s) => MountKind::Bind,
                    _ => MountKind::Volume,
                },
                Some(other) => return Err(format!("unsupported mount type '{}'", other)),
            };
            if !target.starts_with('/') {
                return Err(format!("mount target '{}' must be absolute", target));
            }
            Ok(ComposeMount {
                kind,
                source,
                target,
                read_only,
            })
        }
    }
}

fn is_host_path(source: &str) -> bool {
    source.starts_with('.') || source.starts_with('/') || source.starts_with('~')
}

fn parse_healthcheck(raw: RawHealthcheck) -> Result<Option<Healthcheck>> {
    if raw.disable {
        return Ok(None);
    }
    let Some(test) = raw.test else {
        return Ok(None);
    };

    let command = match test {
        StringOrList::String(cmd) => vec!["sh".to_string(), "-c".to_string(), cmd],
        StringOrList::List(list) => match list.first().map(String::as_str) {
            Some("NONE") => return Ok(None),
            Some("CMD") => list[1..].to_vec(),
            Some("CMD-SHELL") => vec!["sh".to_string(), "-c".to_string(), list[1..].join(" ")],
            _ => list,
        },
    };
    if command.is_empty() {
        return Err(ConfigError::validation("test", "command is empty"));
    }

    let seconds = |field: &str, value: Option<String>| -> Result<Option<u32>> {
        value
            .map(|v| parse_duration(&v).map_err(|msg| ConfigError::validation(field, msg)))
            .transpose()
    };

    Ok(Some(Healthcheck {
        command,
        interval: seconds("interval", raw.interval)?,
        timeout: seconds("timeout", raw.timeout)?,
        retries: raw.retries,
        start_period: seconds("start_period", raw.start_period)?,
    }))
}

/// Parse a compose duration (`30s`, `1m30s`, `1h`, `500ms`) into whole seconds
pub fn parse_duration(value: &str) -> std::result::Result<u32, String> {
    let mut total_ms: u64 = 0;
    let mut digits = String::new();
    let mut chars = value.trim().chars().peekable();

    if value.trim().is_empty() {
        return Err("empty duration".to_string());
    }

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit_ms: u64 = match c {
            'h' => 3_600_000,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            'm' => 60_000,
            's' => 1_000,
            _ => return Err(format!("invalid duration '{}'", value)),
        };
        total_ms = add_duration_part(total_ms, &digits, unit_ms, value)?;
        digits.clear();
    }

    if !digits.is_empty() {
        total_ms = add_duration_part(total_ms, &digits, 1_000, value)?;
    }

    u32::try_from(total_ms.div_ceil(1_000)).map_err(|_| too_long(value))
}

fn add_duration_part(
    total_ms: u64,
    digits: &str,
    unit_ms: u64,
    value: &str,
) -> std::result::Result<u64, String> {
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", value))?;
    amount
        .checked_mul(unit_ms)
        .and_then(|ms| total_ms.checked_add(ms))
        .ok_or_else(|| too_long(value))
}

fn too_long(value: &str) -> String {
    format!("duration '{}' is too long", value)
}

fn convert_resources(raw: &RawResourceBlock) -> Result<ComposeResources> {
    let cpu = raw
        .cpus
        .as_ref()
        .map(|v| compose_cpus(&v.render()).map_err(|msg| ConfigError::validation("cpus", msg)))
        .transpose()?;
    let memory = raw
        .memory
        .as_ref()
        .map(|v| compose_memory(&v.render()).map_err(|msg| ConfigError::validation("memory", msg)))
        .transpose()?;
    Ok(ComposeResources { cpu, memory })
}

/// Largest `cpus` value accepted from a compose file
const MAX_COMPOSE_CPUS: f64 = 1_000_000.0;

/// Convert compose `cpus` (`0.5`) into a Kubernetes quantity (`500m`)
pub fn compose_cpus(value: &str) -> std::result::Result<String, String> {
    let cores: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid cpus '{}'", value))?;
    if cores.is_nan() || cores <= 0.0 {
        return Err(format!("cpus must be positive, got '{}'", value));
    }
    if !cores.is_finite() || cores > MAX_COMPOSE_CPUS {
        return Err(format!("cpus '{}' exceeds {} cores", value, MAX_COMPOSE_CPUS));
    }
    let millis = (cores * 1000.0).round() as u64;
    if millis == 0 {
        return Err(format!("cpus '{}' is below one millicore", value));
    }
    if millis % 1000 == 0 {
        Ok((millis / 1000).to_string())
    } else {
        Ok(format!("{}m", millis))
    }
}

/// Convert compose memory (`512m`, `1g`, `1gb`) into a Kubernetes quantity (`512Mi`, `1Gi`)
pub fn compose_memory(value: &str) -> std::result::Result<String, String> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(format!("invalid memory '{}'", value));
    }

    let suffix = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => "",
        "k" | "kb" | "ki" => "Ki",
        "m" | "mb" | "mi" => "Mi",
        "g" | "gb" | "gi" => "Gi",
        "t" | "tb" | "ti" => "Ti",
        _ => return Err(format!("invalid memory unit in '{}'", value)),
    };
    let quantity = format!("{}{}", number, suffix);
    parse_quantity(&quantity).map_err(|e| e.to_string())?;
    Ok(quantity)
}

fn parse_user(user: &str) -> Option<ComposeUser> {
    let (uid, gid) = match user.split_once(':') {
        Some((uid, gid)) => (uid, Some(gid)),
        None => (user, None),
    };
    let uid = uid.parse().ok()?;
    let gid = match gid {
        Some(g) => Some(g.parse().ok()?),
        None => None,
    };
    Some(ComposeUser { uid, gid })
}
