//! Core error types for `blockphase`
//!
//! Structural, compilation and configuration errors shared across the
//! workspace. Every variant carries enough identity (graph name, block
//! handle, port) to point an author at the offending content.

use std::path::PathBuf;
use thiserror::Error;

use crate::block::Port;
use crate::graph::NodeId;

// ============================================================================
// Structural Errors
// ============================================================================

/// Why a connection between two ports was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionViolation {
    /// One of the endpoint blocks does not exist
    UnknownBlock,
    /// The block kind has no such port
    UnknownPort,
    /// Only `FLOW_OUT -> FLOW_IN` and `DATA_OUT -> DATA_IN` are allowed
    PortKindMismatch,
    /// A `FLOW_OUT` port already has a successor
    FlowOutTaken,
    /// A `DATA_IN` port already has a producer
    DataInTaken,
    /// A block cannot be wired to itself
    SelfLoop,
}

impl std::fmt::Display for ConnectionViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::UnknownBlock => "unknown block",
            Self::UnknownPort => "block has no such port",
            Self::PortKindMismatch => "port kinds do not match",
            Self::FlowOutTaken => "flow output already connected",
            Self::DataInTaken => "data input already connected",
            Self::SelfLoop => "block connected to itself",
        };
        f.write_str(text)
    }
}

/// Malformed block graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// The graph has no `Source` block
    #[error("graph has no source block")]
    MissingSource,

    /// The graph has more than one `Source` block
    #[error("graph has {} source blocks: {blocks:?}", blocks.len())]
    DuplicateSource {
        /// Every source block found
        blocks: Vec<NodeId>,
    },

    /// A port that must be connected is not
    #[error("port '{port}' of block {block} is not connected")]
    DanglingPort {
        /// Block owning the port
        block: NodeId,
        /// The unconnected port
        port: Port,
    },

    /// An edge was refused
    #[error("cannot connect {from}.{from_port} -> {to}.{to_port}: {reason}")]
    InvalidConnection {
        /// Producer block
        from: NodeId,
        /// Producer port
        from_port: Port,
        /// Consumer block
        to: NodeId,
        /// Consumer port
        to_port: Port,
        /// What rule the edge breaks
        reason: ConnectionViolation,
    },

    /// A handle does not name a block of this graph
    #[error("unknown block {0}")]
    UnknownBlock(NodeId),

    /// Kind-specific block data is unusable
    #[error("invalid {kind} block: {reason}")]
    InvalidBlock {
        /// Kind name
        kind: &'static str,
        /// What is wrong
        reason: String,
    },

    /// The source block cannot be removed
    #[error("the source block cannot be removed")]
    SourceRemoval,

    /// Control flow returns to a block without passing through a loop body
    #[error("control flow cycles back to block {block} outside of a loop")]
    FlowCycle {
        /// First block seen twice on the path
        block: NodeId,
    },

    /// Control reaches a block that structured `if`/`while` cannot jump to
    /// from where it is, such as the header of an outer loop or the join
    /// of an enclosing branch that an inner construct would skip
    #[error("control flow reaching block {block} cannot be expressed with if/while")]
    UnstructuredFlow {
        /// Block control jumps to
        block: NodeId,
    },

    /// Branches and loops are nested deeper than the compiler emits
    #[error("block {block} is nested deeper than {limit} levels")]
    NestingTooDeep {
        /// Construct that would exceed the limit
        block: NodeId,
        /// Deepest nesting accepted
        limit: usize,
    },

    /// Two blocks of a saved graph share a handle
    #[error("duplicate block id {0}")]
    DuplicateBlockId(NodeId),

    /// A port lookup did not resolve to a block
    #[error("port '{port}' of block {block} points at a missing block")]
    BrokenEdge {
        /// Block owning the port
        block: NodeId,
        /// Port whose edge is broken
        port: Port,
    },
}

/// The data edges of a graph form a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("data dependency cycle through blocks {cycle:?}")]
pub struct CyclicDataDependency {
    /// Blocks on the cycle, in dependency order
    pub cycle: Vec<NodeId>,
}

// ============================================================================
// Compile Errors
// ============================================================================

/// Cause of a failed compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileFailure {
    /// The graph is malformed
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// Data edges form a cycle
    #[error(transparent)]
    CyclicData(#[from] CyclicDataDependency),
}

/// A block graph could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot compile graph '{graph}': {cause}")]
pub struct CompileError {
    /// Name of the graph being compiled
    pub graph: String,
    /// What went wrong
    #[source]
    pub cause: CompileFailure,
}

impl CompileError {
    /// Wraps a failure with the name of the graph it occurred in.
    pub fn new(graph: impl Into<String>, cause: impl Into<CompileFailure>) -> Self {
        Self {
            graph: graph.into(),
            cause: cause.into(),
        }
    }

    /// Returns the block the failure points at, if any.
    #[must_use]
    pub fn block(&self) -> Option<NodeId> {
        match &self.cause {
            CompileFailure::Structural(
                StructuralError::DanglingPort { block, .. }
                | StructuralError::FlowCycle { block }
                | StructuralError::UnstructuredFlow { block }
                | StructuralError::NestingTooDeep { block, .. }
                | StructuralError::BrokenEdge { block, .. }
                | StructuralError::UnknownBlock(block),
            ) => Some(*block),
            CompileFailure::CyclicData(c) => c.cycle.first().copied(),
            CompileFailure::Structural(_) => None,
        }
    }
}

// ============================================================================
// Document Errors
// ============================================================================

/// A saved block graph could not be read back.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The text is not a well-formed graph document
    #[error("malformed graph document: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The document describes a graph that breaks the block graph rules
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Machine file loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}{}: {message}", line.map_or_else(String::new, |l| format!(" (line {l})")))]
    ParseError {
        /// Path to the machine file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Machine validation failed
    #[error("validation failed for {path}: {}", errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    ValidationError {
        /// Path to the machine file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// `$include` directives form a cycle
    #[error("circular include detected: {cycle:?}")]
    CircularInclude {
        /// Files forming the cycle, the repeated file last
        cycle: Vec<PathBuf>,
    },

    /// Referenced file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in the machine file is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the file where it was referenced
        location: String,
    },

    /// One or more files failed validation.
    #[error("{count} file(s) failed validation")]
    ValidationFailed {
        /// Number of files that failed validation.
        count: usize,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during machine validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "transitions[2].guard")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - prevents the machine from being used
    Error,
    /// Warning - reported but does not prevent loading
    Warning,
}
