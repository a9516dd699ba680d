//! Machine file loader
//!
//! Pipeline from a file on disk to a validated, frozen [`MachineConfig`]:
//!
//! 1. Size check against [`ConfigLimits::max_config_size`]
//! 2. Environment variable expansion on the raw text
//! 3. YAML parsing (JSON machine files parse as YAML too)
//! 4. `$include` resolution
//! 5. Deserialization to [`MachineConfig`]
//! 6. Validation, which also builds and compiles every graph
//! 7. Freeze with `Arc`
//!
//! # Environment variables
//!
//! | form | meaning |
//! |------|---------|
//! | `${VAR}` | value of `VAR`; empty with a warning if unset |
//! | `${VAR:-default}` | value of `VAR`, or `default` if unset |
//! | `${VAR:?message}` | value of `VAR`; loading fails if unset |
//! | `$$` | a literal `$` |
//!
//! # Includes
//!
//! A mapping of the form `{ $include: path }` is replaced by the contents of
//! `path`, so a guard shared by several transitions can live in its own
//! file. Other keys next to `$include` override top-level keys of the
//! included mapping. Relative paths resolve against
//! [`LoaderOptions::include_root`], or the including file's directory when
//! that is unset. Paths containing `..` are rejected.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::Value;
use tracing::{debug, warn};

use blockphase_core::config::schema::MachineConfig;

use crate::config::validation::Validator;
use crate::error::ConfigError;

const INCLUDE_KEY: &str = "$include";

// ============================================================================
// Public API
// ============================================================================

/// Options for the machine loader.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Base directory for relative `$include` paths. Defaults to the
    /// directory of the file containing the directive.
    pub include_root: Option<PathBuf>,

    /// Size limits.
    pub config_limits: ConfigLimits,
}

/// Limits that keep a machine file from exhausting resources.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum number of phases.
    pub max_phases: usize,

    /// Maximum number of transitions.
    pub max_transitions: usize,

    /// Maximum `$include` nesting depth.
    pub max_include_depth: usize,

    /// Maximum machine file size in bytes.
    pub max_config_size: usize,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_phases: env_or("BLOCKPHASE_MAX_PHASES", 1000),
            max_transitions: env_or("BLOCKPHASE_MAX_TRANSITIONS", 10_000),
            max_include_depth: env_or("BLOCKPHASE_MAX_INCLUDE_DEPTH", 10),
            max_config_size: env_or("BLOCKPHASE_MAX_CONFIG_SIZE", 10 * 1024 * 1024),
        }
    }
}

/// Result of loading a machine file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated machine.
    pub config: Arc<MachineConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during machine loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Where the warning applies.
    pub location: Option<String>,
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} at {location}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Machine file loader.
#[derive(Debug, Default)]
pub struct MachineLoader {
    options: LoaderOptions,
    include_cache: HashMap<PathBuf, Value>,
}

impl MachineLoader {
    /// Creates a loader with the given options.
    #[must_use]
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            options,
            include_cache: HashMap::new(),
        }
    }

    /// Creates a loader with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Loads and validates a machine file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or too large, if an
    /// environment variable marked required is unset, if parsing or
    /// `$include` resolution fails, or if validation finds errors.
    pub fn load(&mut self, path: &Path) -> Result<LoadResult, ConfigError> {
        let limit = self.options.config_limits.max_config_size;
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if size > limit {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{size} bytes"),
                expected: format!("at most {limit} bytes"),
            });
        }

        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        self.load_str(&text, path)
    }

    /// Runs the pipeline on text already in memory. `origin` names the text
    /// in diagnostics and anchors relative `$include` paths.
    ///
    /// # Errors
    ///
    /// As [`MachineLoader::load`], minus the file checks.
    pub fn load_str(&mut self, text: &str, origin: &Path) -> Result<LoadResult, ConfigError> {
        debug!(path = %origin.display(), "loading machine");
        let mut warnings = Vec::new();

        let mut root = parse_text(text, origin, &mut warnings)?;
        if root.is_null() {
            return Err(ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: None,
                message: "machine file is empty".to_string(),
            });
        }

        let mut includes = IncludeResolver {
            root: self.options.include_root.clone(),
            max_depth: self.options.config_limits.max_include_depth,
            stack: Vec::new(),
            cache: &mut self.include_cache,
            warnings: &mut warnings,
        };
        includes.resolve(&mut root, origin)?;

        let config: MachineConfig =
            serde_yaml::from_value(root).map_err(|e| ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: None,
                message: format!("invalid machine: {e}"),
            })?;

        let result = Validator::new().validate(&config, &self.options.config_limits);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: origin.display().to_string(),
                errors: result.errors,
            });
        }
        warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        for warning in &warnings {
            warn!(path = %origin.display(), "{warning}");
        }

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

/// Parses an environment variable, falling back to `default` when it is
/// unset or malformed.
pub fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// BOM strip, environment expansion and YAML parse.
fn parse_text(
    text: &str,
    origin: &Path,
    warnings: &mut Vec<LoadWarning>,
) -> Result<Value, ConfigError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let expanded = expand_env(text, origin, warnings)?;
    serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
        path: origin.to_path_buf(),
        line: e.location().map(|l| l.line()),
        message: e.to_string(),
    })
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expands `${...}` references in raw text, before YAML parsing so that an
/// expanded number still reads as a number.
fn expand_env(
    text: &str,
    origin: &Path,
    warnings: &mut Vec<LoadWarning>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(at) = rest.find('$') {
        out.push_str(&rest[..at]);
        let tail = &rest[at + 1..];
        if let Some(after) = tail.strip_prefix('$') {
            out.push('$');
            rest = after;
        } else if let Some(body) = tail.strip_prefix('{') {
            let end = closing_brace(body).ok_or_else(|| ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: Some(text[..text.len() - rest.len() + at].lines().count().max(1)),
                message: "unclosed environment variable reference".to_string(),
            })?;
            expand_reference(&body[..end], origin, warnings, &mut out)?;
            rest = &body[end + 1..];
        } else {
            out.push('$');
            rest = tail;
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Index of the `}` closing a reference whose `{` was just consumed.
fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 1_usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn expand_reference(
    reference: &str,
    origin: &Path,
    warnings: &mut Vec<LoadWarning>,
    out: &mut String,
) -> Result<(), ConfigError> {
    let (name, operator) = match reference.find(':') {
        Some(i) if matches!(reference[i + 1..].chars().next(), Some('-' | '?')) => {
            (&reference[..i], Some(&reference[i + 1..]))
        }
        _ => (reference, None),
    };

    if let Ok(value) = std::env::var(name) {
        out.push_str(&value);
        return Ok(());
    }

    match operator {
        Some(op) if op.starts_with('-') => out.push_str(&op[1..]),
        Some(op) => {
            let message = &op[1..];
            return Err(ConfigError::EnvVarNotSet {
                var: name.to_string(),
                location: if message.is_empty() {
                    origin.display().to_string()
                } else {
                    format!("{}: {message}", origin.display())
                },
            });
        }
        None => warnings.push(LoadWarning {
            message: format!("environment variable '{name}' is not set, using empty string"),
            location: Some(origin.display().to_string()),
        }),
    }
    Ok(())
}

// ============================================================================
// Include Resolution
// ============================================================================

struct IncludeResolver<'a> {
    root: Option<PathBuf>,
    max_depth: usize,
    stack: Vec<PathBuf>,
    cache: &'a mut HashMap<PathBuf, Value>,
    warnings: &'a mut Vec<LoadWarning>,
}

impl IncludeResolver<'_> {
    /// Replaces every `$include` mapping under `value`. `current` is the
    /// file `value` was read from.
    fn resolve(&mut self, value: &mut Value, current: &Path) -> Result<(), ConfigError> {
        match value {
            Value::Mapping(map) => {
                let key = Value::String(INCLUDE_KEY.to_string());
                if let Some(target) = map.remove(&key) {
                    let path = self.resolve_path(&target, current)?;

                    if self.stack.contains(&path) {
                        let mut cycle = self.stack.clone();
                        cycle.push(path);
                        return Err(ConfigError::CircularInclude { cycle });
                    }
                    if self.stack.len() >= self.max_depth {
                        return Err(ConfigError::InvalidValue {
                            field: "$include depth".to_string(),
                            value: (self.stack.len() + 1).to_string(),
                            expected: format!("at most {} levels", self.max_depth),
                        });
                    }

                    let mut included = self.load_cached(&path)?;
                    self.stack.push(path.clone());
                    self.resolve(&mut included, &path)?;
                    self.stack.pop();

                    let overrides = std::mem::take(map);
                    if let Value::Mapping(base) = &mut included {
                        for (k, v) in overrides {
                            base.insert(k, v);
                        }
                    } else if !overrides.is_empty() {
                        return Err(ConfigError::InvalidValue {
                            field: INCLUDE_KEY.to_string(),
                            value: path.display().to_string(),
                            expected: "a mapping when sibling keys are given".to_string(),
                        });
                    }
                    *value = included;
                    // Sibling keys may carry includes of their own.
                    if let Value::Mapping(map) = value {
                        for (_, v) in map.iter_mut() {
                            self.resolve(v, current)?;
                        }
                    }
                } else {
                    for (_, v) in map.iter_mut() {
                        self.resolve(v, current)?;
                    }
                }
            }
            Value::Sequence(items) => {
                for item in items {
                    self.resolve(item, current)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn resolve_path(&self, target: &Value, current: &Path) -> Result<PathBuf, ConfigError> {
        let text = target.as_str().ok_or_else(|| ConfigError::InvalidValue {
            field: INCLUDE_KEY.to_string(),
            value: format!("{target:?}"),
            expected: "string path".to_string(),
        })?;
        if text.contains("..") {
            return Err(ConfigError::InvalidValue {
                field: INCLUDE_KEY.to_string(),
                value: text.to_string(),
                expected: "path without '..' traversal".to_string(),
            });
        }

        let path = Path::new(text);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            let base = self.root.clone().unwrap_or_else(|| {
                current
                    .parent()
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
            });
            base.join(path)
        };
        if !resolved.exists() {
            return Err(ConfigError::MissingFile { path: resolved });
        }
        Ok(resolved)
    }

    fn load_cached(&mut self, path: &Path) -> Result<Value, ConfigError> {
        if let Some(value) = self.cache.get(path) {
            return Ok(value.clone());
        }
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        let value = parse_text(&text, path, self.warnings)?;
        self.cache.insert(path.to_path_buf(), value.clone());
        Ok(value)
    }
}
