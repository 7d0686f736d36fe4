//! Subcommand implementations

pub mod format;
pub mod generate;
pub mod list;
pub mod validate;

use stackgen_generate::RunReport;

use crate::{Error, Result};

/// Print every failure of a run and fail when there was any
pub fn check_report(report: &RunReport) -> Result<()> {
    for failure in &report.failures {
        eprintln!("error: {}", failure.error);
    }
    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(Error::AppsFailed {
            failed: report.failures.len(),
            total: report.failures.len() + report.outputs.len(),
        })
    }
}
