//! Block graph compiler
//!
//! Turns a [`BlockGraph`] into script text. Compilation runs in three
//! phases:
//!
//! 1. **Validate**: exactly one `Source`, no data-dependency cycle.
//! 2. **Walk**: follow control flow from the source, emitting one statement
//!    per statement block and a nested construct per `Branch`/`Loop`.
//!    Jumps back to the innermost loop become `continue`/`break`.
//! 3. **Assemble**: join the emitted lines.
//!
//! Expressions are resolved on demand through `DATA_IN` ports and inlined
//! at their point of use. A block unreachable from the source contributes
//! nothing.
//!
//! The output is a pure function of the graph: blocks and edges are
//! visited in insertion order and nothing else feeds the emitter.
//!
//! # Output format
//!
//! ```text
//! dealCards(5)
//! if (score > 10) {
//!     announce('winner')
//! } else {
//!     drawCard()
//! }
//! return true
//! ```
//!
//! Four spaces of indentation per nesting level, one statement per line and
//! a trailing newline whenever the text is non-empty. A graph whose source
//! has no successor compiles to the empty string.

mod emit;
mod expr;

use tracing::{debug, trace};

use crate::block_graph::BlockGraph;
use crate::error::CompileError;

use emit::Emitter;
pub use emit::MAX_NESTING;

/// Compiles a block graph to script text.
///
/// # Errors
///
/// Returns [`CompileError`] carrying the graph name and one of:
///
/// - a [`crate::StructuralError`] (missing or duplicate source, an unbound
///   input on a reachable block, a control-flow cycle outside a loop body,
///   a jump `if`/`while` cannot express, nesting beyond
///   [`MAX_NESTING`]);
/// - a [`crate::CyclicDataDependency`].
///
/// # Examples
///
/// ```
/// use blockphase_core::{compile, BlockGraph};
///
/// assert_eq!(compile(&BlockGraph::new("empty")).unwrap(), "");
/// assert_eq!(compile(&BlockGraph::always_true("guard")).unwrap(), "return true\n");
/// ```
pub fn compile(graph: &BlockGraph) -> Result<String, CompileError> {
    let fail = |cause| CompileError::new(graph.name(), cause);

    trace!(
        graph = graph.name(),
        blocks = graph.block_count(),
        edges = graph.edge_count(),
        "validating block graph"
    );
    graph.validate().map_err(fail)?;

    let mut emitter = Emitter::new(graph);
    emitter.run().map_err(fail)?;
    let text = emitter.finish();

    debug!(
        graph = graph.name(),
        revision = graph.revision(),
        lines = text.lines().count(),
        "block graph compiled"
    );
    Ok(text)
}
