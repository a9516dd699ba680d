//! Error types for `blockphase`
//!
//! Runtime errors (evaluation, phase machine, session) plus the top-level
//! aggregate used by the CLI. Structural, compile and configuration errors
//! come from `blockphase-core` and are re-exported here.

use thiserror::Error;

pub use blockphase_core::error::{
    CompileError, CompileFailure, ConfigError, CyclicDataDependency, DocumentError, Severity,
    StructuralError, ValidationIssue,
};

use crate::phase::TransitionId;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `blockphase` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Machine file error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// A block graph failed to load or compile
    pub const COMPILE_ERROR: i32 = 4;

    /// Phase machine error (evaluation failure, unknown phase)
    pub const PHASE_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `blockphase` operations.
#[derive(Debug, Error)]
pub enum BlockPhaseError {
    /// Machine file loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Graph compilation error
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Graph document could not be read
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Phase machine error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BlockPhaseError {
    /// Returns the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Compile(_) | Self::Document(_) => ExitCode::COMPILE_ERROR,
            Self::Phase(_) => ExitCode::PHASE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Evaluation Errors
// ============================================================================

/// Failure reported by a script evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    /// Evaluator diagnostic
    pub message: String,
}

impl EvalError {
    /// Creates an evaluation error from a diagnostic message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Which of a transition's graphs failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphRole {
    /// The condition deciding whether the transition fires
    Guard,
    /// The side effect run when it fires
    Exec,
}

impl std::fmt::Display for GraphRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guard => f.write_str("guard"),
            Self::Exec => f.write_str("exec"),
        }
    }
}

/// Why a guard or exec graph could not be run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationFailure {
    /// The graph did not compile
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The evaluator rejected the script
    #[error("evaluation failed: {0}")]
    Runtime(#[from] EvalError),
}

/// A guard or exec graph failed while an event was processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{role} of transition {transition} ({from} -> {to}) on event '{event}': {failure}")]
pub struct EvaluationError {
    /// Failing graph
    pub role: GraphRole,
    /// Transition the graph belongs to
    pub transition: TransitionId,
    /// Source phase name
    pub from: String,
    /// Target phase name
    pub to: String,
    /// Event being processed
    pub event: String,
    /// Underlying cause
    #[source]
    pub failure: EvaluationFailure,
}

// ============================================================================
// Phase Machine Errors
// ============================================================================

/// Phase machine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    /// A guard or exec graph failed; the current phase is unchanged
    #[error(transparent)]
    Evaluation(#[from] Box<EvaluationError>),

    /// Referenced phase does not exist
    #[error("phase not found: {0}")]
    UnknownPhase(String),

    /// Referenced transition does not exist
    #[error("transition not found: {0}")]
    UnknownTransition(TransitionId),

    /// Phase names must be unique
    #[error("phase '{0}' already exists")]
    DuplicatePhase(String),

    /// The phase the machine is in cannot be removed
    #[error("phase '{0}' is the current phase and cannot be removed")]
    CurrentPhaseRemoval(String),

    /// The session loop is no longer running
    #[error("session closed")]
    SessionClosed,
}

impl From<EvaluationError> for PhaseError {
    fn from(err: EvaluationError) -> Self {
        Self::Evaluation(Box::new(err))
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `blockphase` operations.
pub type Result<T> = std::result::Result<T, BlockPhaseError>;

// ============================================================================
// Tests
// ============================================================================
