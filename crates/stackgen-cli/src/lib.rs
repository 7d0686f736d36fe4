//! stackgen CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use stackgen_config::{Config, ConfigLoader};
use stackgen_generate::Registry;

/// stackgen - Kubernetes manifests from one apps.yaml
#[derive(Parser, Debug)]
#[command(name = "stackgen")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "apps.yaml", env = "STACKGEN_CONFIG", global = true)]
    pub file: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate manifests for an environment
    Generate(commands::generate::GenerateArgs),
    /// Check the configuration, optionally planning every app for an environment
    Validate(commands::validate::ValidateArgs),
    /// List configured apps
    List(commands::list::ListArgs),
}

impl Cli {
    /// Default log filter for the chosen verbosity
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Load the configuration and dispatch the subcommand
    pub fn run(self) -> Result<()> {
        let registry = Registry::builtin();
        let config = load_config(&self.file, &registry)?;
        match self.command {
            Commands::Generate(args) => commands::generate::run(args, &config, registry),
            Commands::Validate(args) => commands::validate::run(args, &config, registry),
            Commands::List(args) => commands::list::run(args, &config),
        }
    }
}

/// Load and validate `path`, accepting the sections `registry` knows
pub fn load_config(path: &Path, registry: &Registry) -> Result<Config> {
    let config = ConfigLoader::new(registry.discriminants()).load_file(path)?;
    Ok(config)
}
