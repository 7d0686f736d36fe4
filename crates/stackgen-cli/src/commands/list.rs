//! `stackgen list`

use clap::{Args, ValueEnum};
use serde::Serialize;
use stackgen_config::{AppSpec, Config, EnvironmentProfile};

use super::format::print_table;
use crate::Result;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Apply this environment's overrides
    #[arg(short, long)]
    pub env: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: ListFormat,
}

/// Output format
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum ListFormat {
    /// Aligned columns
    #[default]
    Table,
    /// JSON
    Json,
}

const HEADERS: [&str; 7] = [
    "NAME", "TYPE", "NAMESPACE", "PATH", "SCALING", "INGRESS", "ENABLED",
];

/// One listed app
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppRow {
    pub name: String,
    #[serde(rename = "type")]
    pub app_type: String,
    pub namespace: String,
    pub path: String,
    pub scaling: String,
    pub ingress: String,
    pub enabled: bool,
}

impl AppRow {
    /// Row for `app`, with overrides and the default backend of `env` applied
    pub fn new(app: &AppSpec, env: Option<(&str, &EnvironmentProfile)>) -> Self {
        let spec = match env {
            Some((name, _)) => app.effective(name),
            None => app.clone(),
        };
        let ingress = match (spec.ingress.enabled, spec.ingress.class, env) {
            (false, _, _) => "-".to_string(),
            (true, Some(class), _) => class.to_string(),
            (true, None, Some((_, profile))) => profile.ingress.to_string(),
            (true, None, None) => "default".to_string(),
        };
        Self {
            name: spec.name.clone(),
            app_type: spec.app_type.clone(),
            namespace: spec.namespace.clone(),
            path: spec.path.clone(),
            scaling: spec.scaling.kind.to_string(),
            ingress,
            enabled: spec.enabled,
        }
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.app_type.clone(),
            self.namespace.clone(),
            self.path.clone(),
            self.scaling.clone(),
            self.ingress.clone(),
            self.enabled.to_string(),
        ]
    }
}

/// Rows for every app in configuration order
pub fn rows(config: &Config, env: Option<&str>) -> Result<Vec<AppRow>> {
    let profile = match env {
        Some(name) => Some((name, config.profile(name)?)),
        None => None,
    };
    Ok(config.apps.iter().map(|app| AppRow::new(app, profile)).collect())
}

pub fn run(args: ListArgs, config: &Config) -> Result<()> {
    let rows = rows(config, args.env.as_deref())?;
    match args.output {
        ListFormat::Table => {
            let cells: Vec<Vec<String>> = rows.iter().map(AppRow::cells).collect();
            print_table(&HEADERS, &cells);
        }
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }
    Ok(())
}
