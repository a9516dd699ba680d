//! `blockphase diagram`

use crate::cli::args::DiagramArgs;
use crate::config::{LoaderOptions, MachineLoader};
use crate::diagram::render;
use crate::error::BlockPhaseError;

/// Loads a machine and prints it as a Mermaid state diagram.
///
/// # Errors
///
/// Returns a config error if the machine does not load, or an I/O error if
/// the output cannot be written.
#[allow(clippy::unused_async)]
pub async fn run(args: &DiagramArgs) -> Result<(), BlockPhaseError> {
    let mut loader = MachineLoader::new(LoaderOptions {
        include_root: args.include_root.clone(),
        ..LoaderOptions::default()
    });
    let loaded = loader.load(&args.machine)?;
    let diagram = render(&loaded.config);

    match &args.output {
        Some(path) => std::fs::write(path, diagram)?,
        None => print!("{diagram}"),
    }
    Ok(())
}
