//! `blockphase compile`
//!
//! Reads a graph document and prints the script it compiles to. With
//! `--format json` the result is a single object:
//!
//! ```json
//! {"name":"deal","blocks":3,"script":"dealCards(5)\n"}
//! ```

use blockphase_core::{BlockGraph, compile};

use crate::cli::args::{CompileArgs, OutputFormat};
use crate::error::BlockPhaseError;

/// Compiles one graph file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read or the output written,
/// a document error if it is not a valid graph, and a compile error if the
/// graph does not compile.
#[allow(clippy::unused_async)]
pub async fn run(args: &CompileArgs) -> Result<(), BlockPhaseError> {
    let text = std::fs::read_to_string(&args.graph)?;
    let graph = BlockGraph::from_text(&text)?;
    tracing::info!(
        file = %args.graph.display(),
        graph = graph.name(),
        blocks = graph.block_count(),
        "compiling graph"
    );
    let script = compile(&graph)?;

    let rendered = match args.format {
        OutputFormat::Human => script,
        OutputFormat::Json => {
            let mut line = serde_json::to_string(&serde_json::json!({
                "name": graph.name(),
                "blocks": graph.block_count(),
                "script": script,
            }))?;
            line.push('\n');
            line
        }
    };

    match &args.output {
        Some(path) => std::fs::write(path, rendered)?,
        None => print!("{rendered}"),
    }
    Ok(())
}
