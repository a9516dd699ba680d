//! `blockphase validate`
//!
//! Loads each machine file through the full pipeline and reports every
//! issue. Arguments containing `*`, `?` or `[` are expanded as glob
//! patterns. The command fails with [`ConfigError::ValidationFailed`] if any
//! file fails (in `--strict` mode, a warning counts as a failure).

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::{LoadWarning, LoaderOptions, MachineLoader};
use crate::error::{BlockPhaseError, ConfigError, ValidationIssue};

/// Outcome for one file.
#[derive(Debug)]
struct Report {
    file: PathBuf,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Report {
    fn failed(&self, strict: bool) -> bool {
        !self.errors.is_empty() || (strict && !self.warnings.is_empty())
    }
}

/// Validates every file named on the command line.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationFailed`] with the number of failing
/// files.
#[allow(clippy::unused_async)]
pub async fn run(args: &ValidateArgs) -> Result<(), BlockPhaseError> {
    let mut reports = Vec::new();
    for pattern in &args.files {
        match expand(pattern) {
            Ok(files) => {
                for file in files {
                    reports.push(check(&file, args));
                }
            }
            Err(message) => reports.push(Report {
                file: PathBuf::from(pattern),
                errors: vec![message],
                warnings: Vec::new(),
            }),
        }
    }

    match args.format {
        OutputFormat::Human => print_human(&reports, args.strict),
        OutputFormat::Json => print_json(&reports, args.strict)?,
    }

    let count = reports.iter().filter(|r| r.failed(args.strict)).count();
    if count > 0 {
        return Err(ConfigError::ValidationFailed { count }.into());
    }
    Ok(())
}

/// Expands a glob pattern; plain paths pass through unchanged.
fn expand(pattern: &str) -> Result<Vec<PathBuf>, String> {
    if !pattern.contains(['*', '?', '[']) {
        return Ok(vec![PathBuf::from(pattern)]);
    }
    let paths = glob::glob(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
    let mut files: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
    if files.is_empty() {
        return Err(format!("no files match '{pattern}'"));
    }
    files.sort();
    Ok(files)
}

fn check(file: &Path, args: &ValidateArgs) -> Report {
    tracing::info!(file = %file.display(), "validating machine");
    let mut loader = MachineLoader::new(LoaderOptions {
        include_root: args.include_root.clone(),
        ..LoaderOptions::default()
    });
    match loader.load(file) {
        Ok(loaded) => Report {
            file: file.to_path_buf(),
            errors: Vec::new(),
            warnings: loaded.warnings.iter().map(LoadWarning::to_string).collect(),
        },
        Err(ConfigError::ValidationError { errors, .. }) => Report {
            file: file.to_path_buf(),
            errors: errors.iter().map(describe).collect(),
            warnings: Vec::new(),
        },
        Err(e) => Report {
            file: file.to_path_buf(),
            errors: vec![e.to_string()],
            warnings: Vec::new(),
        },
    }
}

fn describe(issue: &ValidationIssue) -> String {
    format!("{}: {}", issue.path, issue.message)
}

fn print_human(reports: &[Report], strict: bool) {
    for report in reports {
        let mark = if report.failed(strict) { "FAIL" } else { "ok" };
        println!("{mark:>4}  {}", report.file.display());
        for error in &report.errors {
            println!("      error: {error}");
        }
        for warning in &report.warnings {
            println!("      warning: {warning}");
        }
    }
}

fn print_json(reports: &[Report], strict: bool) -> Result<(), BlockPhaseError> {
    let value: Vec<_> = reports
        .iter()
        .map(|r| {
            json!({
                "file": r.file.display().to_string(),
                "valid": !r.failed(strict),
                "errors": r.errors,
                "warnings": r.warnings,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
