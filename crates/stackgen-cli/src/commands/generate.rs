//! `stackgen generate`

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use stackgen_config::Config;
use stackgen_generate::{AppOutput, Driver, OutputFormat, Registry, RunOptions};
use tracing::info;

use super::check_report;
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Target environment
    #[arg(short, long)]
    pub env: String,

    /// Output directory (default: manifests/<env>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Generate a single app
    #[arg(short, long)]
    pub app: Option<String>,

    /// Print manifests to stdout instead of writing files
    #[arg(long)]
    pub dry_run: bool,

    /// Manifest format
    #[arg(long, default_value = "yaml")]
    pub format: FormatArg,

    /// Image tag for every app
    #[arg(long)]
    pub tag: Option<String>,

    /// Also generate apps disabled for the environment
    #[arg(long)]
    pub include_disabled: bool,
}

/// Manifest format
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum FormatArg {
    /// Multi-document YAML (default)
    #[default]
    Yaml,
    /// JSON array
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Yaml => OutputFormat::Yaml,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

impl GenerateArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            env: self.env.clone(),
            app: self.app.clone(),
            include_disabled: self.include_disabled,
            tag: self.tag.clone(),
            format: self.format.into(),
        }
    }

    fn output_dir(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| Path::new("manifests").join(&self.env))
    }
}

pub fn run(args: GenerateArgs, config: &Config, registry: Registry) -> Result<()> {
    let report = Driver::new(registry).run(config, &args.options())?;

    if args.dry_run {
        print!("{}", dry_run_text(args.format, &report.outputs)?);
    } else {
        let dir = args.output_dir();
        let written = write_outputs(&dir, &report.outputs)?;
        info!(
            env = %args.env,
            dir = %dir.display(),
            files = written.len(),
            "manifests written"
        );
    }

    check_report(&report)
}

/// Every app's manifests as one stream: YAML documents joined by `---`, or a
/// single JSON array
pub fn dry_run_text(format: FormatArg, outputs: &[AppOutput]) -> Result<String> {
    match format {
        FormatArg::Yaml => Ok(outputs
            .iter()
            .map(|output| output.rendered.as_str())
            .collect::<Vec<_>>()
            .join("---\n")),
        FormatArg::Json => {
            let mut merged = Vec::new();
            for output in outputs {
                let objects: Vec<serde_json::Value> = serde_json::from_str(&output.rendered)?;
                merged.extend(objects);
            }
            let mut text = serde_json::to_string_pretty(&merged)?;
            text.push('\n');
            Ok(text)
        }
    }
}

/// Write each app's document to `<dir>/<file_name>`, creating `dir` if needed
pub fn write_outputs(dir: &Path, outputs: &[AppOutput]) -> Result<Vec<PathBuf>> {
    if outputs.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir).map_err(|e| Error::write(dir, e))?;

    let mut written = Vec::with_capacity(outputs.len());
    for output in outputs {
        let path = dir.join(&output.file_name);
        fs::write(&path, &output.rendered).map_err(|e| Error::write(&path, e))?;
        info!(app = %output.app, objects = output.objects, path = %path.display(), "written");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(app: &str, rendered: &str) -> AppOutput {
        AppOutput {
            app: app.to_string(),
            file_name: format!("{}.yaml", app),
            objects: 1,
            rendered: rendered.to_string(),
        }
    }

    #[test]
    fn test_write_outputs_creates_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("manifests/dev");

        let written = write_outputs(
            &target,
            &[output("api", "kind: Deployment\n"), output("web", "kind: Service\n")],
        )
        .expect("written");

        assert_eq!(written, vec![target.join("api.yaml"), target.join("web.yaml")]);
        let contents = fs::read_to_string(target.join("api.yaml")).expect("readable");
        assert_eq!(contents, "kind: Deployment\n");
    }

    #[test]
    fn test_nothing_written_without_outputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("empty");
        assert!(write_outputs(&target, &[]).expect("no-op").is_empty());
        assert!(!target.exists());
    }

    // =========================================================================
    // Dry runs
    // =========================================================================

    #[test]
    fn test_json_dry_run_is_one_array() {
        let text = dry_run_text(
            FormatArg::Json,
            &[
                output("api", "[\n  {\"kind\": \"Deployment\"}\n]\n"),
                output("web", "[\n  {\"kind\": \"Service\"},\n  {\"kind\": \"Ingress\"}\n]\n"),
            ],
        )
        .expect("valid json");

        let parsed: Vec<serde_json::Value> = serde_json::from_str(&text).expect("one array");
        let kinds: Vec<_> = parsed.iter().map(|v| v["kind"].as_str().unwrap_or_default()).collect();
        assert_eq!(kinds, vec!["Deployment", "Service", "Ingress"]);
        assert!(text.ends_with("]\n"));
    }

    #[test]
    fn test_json_dry_run_without_outputs_is_empty_array() {
        let text = dry_run_text(FormatArg::Json, &[]).expect("valid json");
        assert_eq!(text, "[]\n");
    }

    #[test]
    fn test_yaml_dry_run_joins_documents() {
        let text = dry_run_text(
            FormatArg::Yaml,
            &[output("api", "kind: Deployment\n"), output("web", "kind: Service\n")],
        )
        .expect("yaml");
        assert_eq!(text, "kind: Deployment\n---\nkind: Service\n");
    }

    #[test]
    fn test_default_output_dir_per_env() {
        let args = GenerateArgs {
            env: "gcp".to_string(),
            output: None,
            app: None,
            dry_run: false,
            format: FormatArg::Yaml,
            tag: None,
            include_disabled: false,
        };
        assert_eq!(args.output_dir(), PathBuf::from("manifests/gcp"));
    }
}
