//! Transitions and their graphs

use blockphase_core::{BlockGraph, CompileError, EdgeId, compile};

use super::event::GameEvent;

/// Handle of a transition inside a [`super::PhaseDb`].
pub type TransitionId = EdgeId;

/// A block graph together with its last successful compilation.
///
/// The cached text is keyed by the graph's revision and dropped whenever
/// mutable access to the graph is handed out, so a stale script is never
/// returned.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    graph: BlockGraph,
    cache: Option<(u64, String)>,
}

impl CompiledGraph {
    /// Wraps a graph; nothing is compiled yet.
    #[must_use]
    pub const fn new(graph: BlockGraph) -> Self {
        Self { graph, cache: None }
    }

    /// The graph.
    #[must_use]
    pub const fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    /// Mutable access to the graph. Invalidates the cached script.
    pub fn graph_mut(&mut self) -> &mut BlockGraph {
        self.cache = None;
        &mut self.graph
    }

    /// Swaps in a new graph, returning the old one.
    pub fn replace(&mut self, graph: BlockGraph) -> BlockGraph {
        self.cache = None;
        std::mem::replace(&mut self.graph, graph)
    }

    /// Returns `true` if a script for the current revision is cached.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|(revision, _)| *revision == self.graph.revision())
    }

    /// Returns the compiled script, compiling only if the graph changed
    /// since the last call.
    ///
    /// # Errors
    ///
    /// Returns the [`CompileError`] of a graph that does not compile. A
    /// failed compilation is not cached.
    pub fn script(&mut self) -> Result<String, CompileError> {
        let revision = self.graph.revision();
        if let Some((cached, text)) = &self.cache {
            if *cached == revision {
                return Ok(text.clone());
            }
        }
        let text = compile(&self.graph)?;
        self.cache = Some((revision, text.clone()));
        Ok(text)
    }
}

/// Edge of the phase graph: fires on `trigger` when `guard` passes, running
/// `exec`.
///
/// The endpoints belong to the phase graph and never change once the
/// transition is added; the trigger is fixed at construction. Only the two
/// graphs and the `enabled` flag are mutable.
#[derive(Debug, Clone)]
pub struct Transition {
    trigger: GameEvent,
    guard: CompiledGraph,
    exec: CompiledGraph,
    enabled: bool,
}

impl Transition {
    /// Creates an enabled transition with an always-true guard and an empty
    /// exec graph.
    pub fn new(trigger: impl Into<GameEvent>) -> Self {
        Self {
            trigger: trigger.into(),
            guard: CompiledGraph::new(BlockGraph::always_true("guard")),
            exec: CompiledGraph::new(BlockGraph::new("exec")),
            enabled: true,
        }
    }

    /// Replaces the guard graph.
    #[must_use]
    pub fn with_guard(mut self, guard: BlockGraph) -> Self {
        self.guard.replace(guard);
        self
    }

    /// Replaces the exec graph.
    #[must_use]
    pub fn with_exec(mut self, exec: BlockGraph) -> Self {
        self.exec.replace(exec);
        self
    }

    /// Sets the `enabled` flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Event that triggers this transition.
    #[must_use]
    pub const fn trigger(&self) -> &GameEvent {
        &self.trigger
    }

    /// Guard graph.
    #[must_use]
    pub const fn guard(&self) -> &BlockGraph {
        self.guard.graph()
    }

    /// Mutable guard graph.
    pub fn guard_mut(&mut self) -> &mut BlockGraph {
        self.guard.graph_mut()
    }

    /// Exec graph.
    #[must_use]
    pub const fn exec(&self) -> &BlockGraph {
        self.exec.graph()
    }

    /// Mutable exec graph.
    pub fn exec_mut(&mut self) -> &mut BlockGraph {
        self.exec.graph_mut()
    }

    /// Whether the transition is considered when its trigger arrives.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the transition.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn guard_script(&mut self) -> Result<String, CompileError> {
        self.guard.script()
    }

    pub(crate) fn exec_script(&mut self) -> Result<String, CompileError> {
        self.exec.script()
    }

    /// Returns `true` if both graphs have an up-to-date compiled script.
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.guard.is_cached() && self.exec.is_cached()
    }
}
