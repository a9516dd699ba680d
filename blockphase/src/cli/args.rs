//! CLI argument definitions

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

// ============================================================================
// Root CLI
// ============================================================================

/// Compile block graphs and check phase machines.
#[derive(Parser, Debug)]
#[command(name = "blockphase", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "BLOCKPHASE_COLOR")]
    pub color: ColorChoice,

    /// Log output format.
    #[arg(long, default_value = "human", global = true, env = "BLOCKPHASE_LOG_FORMAT")]
    pub log_format: OutputFormat,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a block graph file to script text.
    Compile(CompileArgs),

    /// Validate machine files.
    Validate(ValidateArgs),

    /// Render a machine as a Mermaid state diagram.
    Diagram(DiagramArgs),

    /// Generate shell completion scripts.
    Completions(CompletionsArgs),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Commands
// ============================================================================

/// Arguments for `compile`.
#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Graph document (YAML or JSON).
    pub graph: PathBuf,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Write the script here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Machine files or glob patterns.
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,

    /// Base directory for `$include` paths.
    #[arg(long, env = "BLOCKPHASE_INCLUDE_ROOT")]
    pub include_root: Option<PathBuf>,
}

/// Arguments for `diagram`.
#[derive(Args, Debug)]
pub struct DiagramArgs {
    /// Machine file.
    pub machine: PathBuf,

    /// Write the diagram here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Base directory for `$include` paths.
    #[arg(long, env = "BLOCKPHASE_INCLUDE_ROOT")]
    pub include_root: Option<PathBuf>,
}

/// Arguments for shell completion generation.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script.
    pub shell: Shell,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

/// Shell type for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// `PowerShell`.
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell.
    Elvish,
}
