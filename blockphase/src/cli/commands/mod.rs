//! CLI command dispatch
//!
//! Routes parsed CLI arguments to the matching command handler.

pub mod compile;
pub mod completions;
pub mod diagram;
pub mod validate;
pub mod version;

use crate::cli::args::{Cli, Commands};
use crate::error::BlockPhaseError;

/// Runs the command selected on the command line.
///
/// # Errors
///
/// Returns the error of the command handler.
pub async fn dispatch(cli: Cli) -> Result<(), BlockPhaseError> {
    match cli.command {
        Commands::Compile(args) => compile::run(&args).await,
        Commands::Validate(args) => validate::run(&args).await,
        Commands::Diagram(args) => diagram::run(&args).await,
        Commands::Completions(args) => {
            completions::run(&args);
            Ok(())
        }
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}
