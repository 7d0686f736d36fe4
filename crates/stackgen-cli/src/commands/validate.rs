//! `stackgen validate`

use clap::Args;
use stackgen_config::Config;
use stackgen_generate::{Driver, Registry, RunOptions};

use super::check_report;
use crate::Result;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also plan every app for this environment
    #[arg(short, long)]
    pub env: Option<String>,
}

pub fn run(args: ValidateArgs, config: &Config, registry: Registry) -> Result<()> {
    if let Some(env) = &args.env {
        let options = RunOptions {
            include_disabled: true,
            ..RunOptions::for_env(env.clone())
        };
        let report = Driver::new(registry).run(config, &options)?;
        check_report(&report)?;
    }

    println!("configuration valid");
    for line in summary(config) {
        println!("  {}", line);
    }
    Ok(())
}

/// `<type>: <count>` per section, in declaration order, then gateway routes
pub fn summary(config: &Config) -> Vec<String> {
    let mut lines: Vec<String> = config
        .app_types()
        .into_iter()
        .map(|app_type| format!("{}: {}", app_type, config.apps_of_type(app_type).count()))
        .collect();
    if config.gateway.has_routes() {
        lines.push(format!("gateway routes: {}", config.gateway.routes.len()));
    }
    lines
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use stackgen_config::ConfigLoader;

    use super::*;

    #[test]
    fn test_summary_counts_per_section() {
        let yaml = r#"
apps:
  - name: api
    path: services/api
  - name: web
    path: services/web
functions:
  - name: billing
    path: functions/billing
    functions:
      - name: charge
"#;
        let config = ConfigLoader::new(Registry::builtin().discriminants())
            .load_str(yaml, Path::new("."))
            .expect("valid configuration");
        assert_eq!(summary(&config), vec!["apps: 2", "functions: 1"]);
    }

    #[test]
    fn test_summary_counts_gateway_routes() {
        let yaml = r#"
apps:
  - name: api
    path: services/api
gateway:
  routes:
    - path: /users
      service: users
    - path: /orders
      service: orders
"#;
        let config = ConfigLoader::new(Registry::builtin().discriminants())
            .load_str(yaml, Path::new("."))
            .expect("valid configuration");
        assert_eq!(summary(&config), vec!["apps: 1", "gateway routes: 2"]);
    }
}
