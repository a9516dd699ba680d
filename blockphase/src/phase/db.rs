//! Phase database
//!
//! The runtime owner of phases, transitions, the current phase and the game
//! state. Phases are the nodes of a [`Graph`] and transitions its edges, so
//! "transitions leaving the current phase" is an adjacency query in
//! insertion order.
//!
//! # Event processing
//!
//! For an event `E` received in phase `P`:
//!
//! 1. Candidates are the enabled transitions leaving `P` with trigger `E`,
//!    in the order they were added.
//! 2. Each candidate's guard is compiled (or taken from cache) and
//!    evaluated. The first truthy result selects that transition and the
//!    remaining guards are not evaluated.
//! 3. If no guard passes, nothing changes.
//! 4. The selected transition's exec script is evaluated, then the current
//!    phase becomes its target.
//!
//! A compile or evaluation failure in step 2 or 4 aborts processing with
//! [`PhaseError::Evaluation`]. The current phase and the game state are left
//! exactly as they were before the event.

use blockphase_core::Graph;
use blockphase_core::config::schema::{
    MachineConfig, MachineMetadata, PhaseConfig, TransitionConfig,
};
use blockphase_core::{BlockGraph, NodeId};
use tracing::{debug, info};

use crate::error::{
    ConfigError, EvaluationError, EvaluationFailure, GraphRole, PhaseError, Severity,
    ValidationIssue,
};
use crate::evaluator::{GameState, ScriptEvaluator, is_truthy};

use super::event::{GameEvent, Phase};
use super::transition::{Transition, TransitionId};

/// Handle of a phase inside a [`PhaseDb`].
pub type PhaseId = NodeId;

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A transition fired.
    Fired {
        /// The transition taken
        transition: TransitionId,
        /// Phase left
        from: String,
        /// Phase entered
        to: String,
    },
    /// No transition fired; the phase is unchanged.
    Ignored {
        /// Number of guards evaluated
        candidates: usize,
    },
}

impl Outcome {
    /// Returns `true` if a transition fired.
    #[must_use]
    pub const fn fired(&self) -> bool {
        matches!(self, Self::Fired { .. })
    }
}

/// Phases, transitions, current phase and game state of one game.
#[derive(Debug, Clone)]
pub struct PhaseDb {
    name: String,
    graph: Graph<Phase, Transition>,
    initial: PhaseId,
    current: PhaseId,
    state: GameState,
}

impl PhaseDb {
    /// Creates a database holding a single phase, which is both the initial
    /// and the current phase.
    pub fn new(name: impl Into<String>, initial: Phase) -> Self {
        let mut graph = Graph::new();
        let id = graph.add_node(initial);
        Self {
            name: name.into(),
            graph,
            initial: id,
            current: id,
            state: GameState::new(),
        }
    }

    /// Machine name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Phases
    // ========================================================================

    /// Adds a phase.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::DuplicatePhase`] if the name is taken.
    pub fn add_phase(&mut self, phase: Phase) -> Result<PhaseId, PhaseError> {
        if self.phase_by_name(phase.name()).is_some() {
            return Err(PhaseError::DuplicatePhase(phase.name().to_string()));
        }
        Ok(self.graph.add_node(phase))
    }

    /// Removes a phase and every transition touching it.
    ///
    /// If the removed phase was the initial phase, the current phase becomes
    /// the initial phase.
    ///
    /// # Errors
    ///
    /// Fails for an unknown handle or for the current phase.
    pub fn remove_phase(&mut self, id: PhaseId) -> Result<Phase, PhaseError> {
        if id == self.current {
            return Err(PhaseError::CurrentPhaseRemoval(
                self.current_name().to_string(),
            ));
        }
        let (phase, dropped) = self
            .graph
            .remove_node(id)
            .ok_or_else(|| PhaseError::UnknownPhase(id.to_string()))?;
        if id == self.initial {
            self.initial = self.current;
        }
        debug!(
            phase = phase.name(),
            transitions = dropped.len(),
            "phase removed"
        );
        Ok(phase)
    }

    /// Returns a phase.
    #[must_use]
    pub fn phase(&self, id: PhaseId) -> Option<&Phase> {
        self.graph.node(id)
    }

    /// Looks a phase up by name.
    #[must_use]
    pub fn phase_by_name(&self, name: &str) -> Option<PhaseId> {
        self.graph
            .nodes()
            .find(|(_, p)| p.name() == name)
            .map(|(id, _)| id)
    }

    /// Iterates over phases in insertion order.
    pub fn phases(&self) -> impl Iterator<Item = (PhaseId, &Phase)> {
        self.graph.nodes()
    }

    /// Current phase.
    #[must_use]
    pub const fn current(&self) -> PhaseId {
        self.current
    }

    /// Name of the current phase.
    #[must_use]
    pub fn current_name(&self) -> &str {
        self.phase_name(self.current)
    }

    /// Phase the machine starts in.
    #[must_use]
    pub const fn initial(&self) -> PhaseId {
        self.initial
    }

    /// Moves the machine to `phase` without running any graph.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::UnknownPhase`] for an unknown handle.
    pub fn reset(&mut self, phase: PhaseId) -> Result<(), PhaseError> {
        if !self.graph.contains_node(phase) {
            return Err(PhaseError::UnknownPhase(phase.to_string()));
        }
        self.current = phase;
        info!(phase = self.current_name(), "phase reset");
        Ok(())
    }

    fn phase_name(&self, id: PhaseId) -> &str {
        self.graph.node(id).map_or("", Phase::name)
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Adds a transition between two existing phases. It takes part in event
    /// processing immediately (if enabled).
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::UnknownPhase`] if either endpoint is unknown.
    pub fn add_transition(
        &mut self,
        from: PhaseId,
        to: PhaseId,
        transition: Transition,
    ) -> Result<TransitionId, PhaseError> {
        for id in [from, to] {
            if !self.graph.contains_node(id) {
                return Err(PhaseError::UnknownPhase(id.to_string()));
            }
        }
        self.graph
            .add_edge(from, to, transition)
            .ok_or_else(|| PhaseError::UnknownPhase(from.to_string()))
    }

    /// Removes a transition.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::UnknownTransition`] for an unknown handle.
    pub fn remove_transition(&mut self, id: TransitionId) -> Result<Transition, PhaseError> {
        self.graph
            .remove_edge(id)
            .map(|edge| edge.label)
            .ok_or(PhaseError::UnknownTransition(id))
    }

    /// Returns a transition.
    #[must_use]
    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.graph.edge(id).map(|e| &e.label)
    }

    /// Returns a transition mutably, for editing its graphs.
    pub fn transition_mut(&mut self, id: TransitionId) -> Option<&mut Transition> {
        self.graph.edge_mut(id).map(|e| &mut e.label)
    }

    /// Source and target phase of a transition.
    #[must_use]
    pub fn endpoints(&self, id: TransitionId) -> Option<(PhaseId, PhaseId)> {
        self.graph.edge(id).map(|e| (e.from, e.to))
    }

    /// Transitions leaving `phase`, in insertion order.
    pub fn transitions_from(
        &self,
        phase: PhaseId,
    ) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.graph.outgoing(phase).map(|(id, e)| (id, &e.label))
    }

    /// Every transition with its endpoints, in insertion order.
    pub fn transitions(
        &self,
    ) -> impl Iterator<Item = (TransitionId, PhaseId, PhaseId, &Transition)> {
        self.graph.edges().map(|(id, e)| (id, e.from, e.to, &e.label))
    }

    // ========================================================================
    // Game state
    // ========================================================================

    /// Game state handed to the evaluator.
    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutable game state.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    // ========================================================================
    // Event processing
    // ========================================================================

    /// Processes one event.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::Evaluation`] if a guard or exec graph fails to
    /// compile or evaluate. The database is then unchanged.
    pub fn process<E>(
        &mut self,
        event: &GameEvent,
        evaluator: &mut E,
    ) -> Result<Outcome, PhaseError>
    where
        E: ScriptEvaluator + ?Sized,
    {
        let candidates: Vec<TransitionId> = self
            .graph
            .outgoing(self.current)
            .filter(|(_, e)| e.label.is_enabled() && e.label.trigger() == event)
            .map(|(id, _)| id)
            .collect();

        if candidates.is_empty() {
            debug!(phase = self.current_name(), %event, "no transition for event");
            return Ok(Outcome::Ignored { candidates: 0 });
        }

        let snapshot = self.state.clone();
        match self.select_and_fire(&candidates, event, evaluator) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.state = snapshot;
                Err(err)
            }
        }
    }

    fn select_and_fire<E>(
        &mut self,
        candidates: &[TransitionId],
        event: &GameEvent,
        evaluator: &mut E,
    ) -> Result<Outcome, PhaseError>
    where
        E: ScriptEvaluator + ?Sized,
    {
        for &id in candidates {
            let Some(edge) = self.graph.edge_mut(id) else {
                continue;
            };
            let to = edge.to;
            let guard = edge
                .label
                .guard_script()
                .map_err(|e| self.failure(GraphRole::Guard, id, event, e.into()))?;
            let verdict = evaluator
                .evaluate(&guard, &mut self.state)
                .map_err(|e| self.failure(GraphRole::Guard, id, event, e.into()))?;
            let passed = is_truthy(&verdict);
            debug!(transition = %id, %event, result = %verdict, passed, "guard evaluated");
            if !passed {
                continue;
            }

            let Some(edge) = self.graph.edge_mut(id) else {
                continue;
            };
            let exec = edge
                .label
                .exec_script()
                .map_err(|e| self.failure(GraphRole::Exec, id, event, e.into()))?;
            evaluator
                .evaluate(&exec, &mut self.state)
                .map_err(|e| self.failure(GraphRole::Exec, id, event, e.into()))?;

            let from = self.current_name().to_string();
            self.current = to;
            let to = self.current_name().to_string();
            info!(transition = %id, %event, from = %from, to = %to, "phase transition");
            return Ok(Outcome::Fired {
                transition: id,
                from,
                to,
            });
        }

        debug!(
            phase = self.current_name(),
            %event,
            candidates = candidates.len(),
            "no guard passed"
        );
        Ok(Outcome::Ignored {
            candidates: candidates.len(),
        })
    }

    fn failure(
        &self,
        role: GraphRole,
        transition: TransitionId,
        event: &GameEvent,
        failure: EvaluationFailure,
    ) -> PhaseError {
        let (from, to) = self
            .endpoints(transition)
            .map(|(from, to)| (self.phase_name(from), self.phase_name(to)))
            .unwrap_or_default();
        EvaluationError {
            role,
            transition,
            from: from.to_string(),
            to: to.to_string(),
            event: event.name().to_string(),
            failure,
        }
        .into()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Snapshot of the database as a machine file.
    ///
    /// The current phase is saved as the initial phase, so a reloaded machine
    /// resumes where this one stands. Default guard and exec graphs are left
    /// out.
    #[must_use]
    pub fn to_config(&self) -> MachineConfig {
        MachineConfig {
            machine: MachineMetadata {
                name: self.name.clone(),
                initial: self.current_name().to_string(),
                description: None,
            },
            phases: self
                .phases()
                .map(|(_, p)| match p.description() {
                    Some(description) => PhaseConfig::Detailed {
                        name: p.name().to_string(),
                        description: Some(description.to_string()),
                    },
                    None => PhaseConfig::Name(p.name().to_string()),
                })
                .collect(),
            transitions: self
                .transitions()
                .map(|(_, from, to, t)| TransitionConfig {
                    from: self.phase_name(from).to_string(),
                    on: t.trigger().name().to_string(),
                    to: self.phase_name(to).to_string(),
                    enabled: t.is_enabled(),
                    guard: (*t.guard() != BlockGraph::always_true("guard"))
                        .then(|| t.guard().to_document()),
                    exec: (*t.exec() != BlockGraph::new("exec")).then(|| t.exec().to_document()),
                })
                .collect(),
            state: self.state.clone().into_inner(),
        }
    }

    /// Builds a database from a machine file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] listing every duplicate
    /// phase, unknown phase reference and unloadable graph.
    pub fn from_config(config: &MachineConfig) -> Result<Self, ConfigError> {
        let mut issues = Vec::new();
        let mut error = |path: String, message: String| {
            issues.push(ValidationIssue {
                path,
                message,
                severity: Severity::Error,
            });
        };

        let mut graph: Graph<Phase, Transition> = Graph::new();
        for (i, entry) in config.phases.iter().enumerate() {
            if graph.nodes().any(|(_, p)| p.name() == entry.name()) {
                error(
                    format!("phases[{i}]"),
                    format!("duplicate phase '{}'", entry.name()),
                );
                continue;
            }
            let mut phase = Phase::new(entry.name());
            if let Some(description) = entry.description() {
                phase = phase.with_description(description);
            }
            graph.add_node(phase);
        }
        let lookup = |graph: &Graph<Phase, Transition>, name: &str| {
            graph
                .nodes()
                .find(|(_, p)| p.name() == name)
                .map(|(id, _)| id)
        };

        let initial = lookup(&graph, &config.machine.initial);
        if initial.is_none() {
            error(
                "machine.initial".to_string(),
                format!("unknown phase '{}'", config.machine.initial),
            );
        }

        for (i, tc) in config.transitions.iter().enumerate() {
            let from = lookup(&graph, &tc.from);
            let to = lookup(&graph, &tc.to);
            if from.is_none() {
                error(
                    format!("transitions[{i}].from"),
                    format!("unknown phase '{}'", tc.from),
                );
            }
            if to.is_none() {
                error(
                    format!("transitions[{i}].to"),
                    format!("unknown phase '{}'", tc.to),
                );
            }
            let guard = tc
                .guard
                .clone()
                .map(|doc| load_graph(doc, "guard"))
                .transpose()
                .map_err(|e| error(format!("transitions[{i}].guard"), e.to_string()));
            let exec = tc
                .exec
                .clone()
                .map(|doc| load_graph(doc, "exec"))
                .transpose()
                .map_err(|e| error(format!("transitions[{i}].exec"), e.to_string()));

            if let (Some(from), Some(to), Ok(guard), Ok(exec)) = (from, to, guard, exec) {
                let mut transition = Transition::new(tc.on.as_str()).with_enabled(tc.enabled);
                if let Some(guard) = guard {
                    transition = transition.with_guard(guard);
                }
                if let Some(exec) = exec {
                    transition = transition.with_exec(exec);
                }
                graph.add_edge(from, to, transition);
            }
        }

        match initial {
            Some(initial) if issues.is_empty() => Ok(Self {
                name: config.machine.name.clone(),
                graph,
                initial,
                current: initial,
                state: GameState::from(config.state.clone()),
            }),
            _ => Err(ConfigError::ValidationError {
                path: config.machine.name.clone(),
                errors: issues,
            }),
        }
    }
}

/// Rebuilds a graph from a machine file document, naming it after its role
/// when the document leaves the name empty.
fn load_graph(
    mut document: blockphase_core::GraphDocument,
    role: &str,
) -> Result<BlockGraph, blockphase_core::StructuralError> {
    if document.name.is_empty() {
        document.name = role.to_string();
    }
    BlockGraph::from_document(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use blockphase_core::{Block, Port};
    use serde_json::{Value, json};

    /// Guard graph `return <variable>`.
    fn guard_on(variable: &str) -> BlockGraph {
        let mut g = BlockGraph::new("guard");
        let ret = g.add_block(Block::ret()).unwrap();
        let var = g.add_block(Block::variable(variable)).unwrap();
        let src = g.source();
        g.connect(src, Port::Next, ret, Port::FlowIn).unwrap();
        g.connect(var, Port::Out, ret, Port::Arg(0)).unwrap();
        g
    }

    /// Exec graph calling a zero-argument action.
    fn exec_calling(action: &str) -> BlockGraph {
        let mut g = BlockGraph::new("exec");
        let act = g.add_block(Block::action(action, 0)).unwrap();
        let src = g.source();
        g.connect(src, Port::Next, act, Port::FlowIn).unwrap();
        g
    }

    /// Evaluator understanding `return <var>` and `<action>()`; actions are
    /// recorded in the `log` state variable.
    fn toy(source: &str, state: &mut GameState) -> Result<Value, EvalError> {
        let line = source.trim_end();
        if line.is_empty() {
            return Ok(Value::Null);
        }
        if let Some(var) = line.strip_prefix("return ") {
            if var == "true" {
                return Ok(json!(true));
            }
            return state
                .get(var)
                .cloned()
                .ok_or_else(|| EvalError::new(format!("no such property: {var}")));
        }
        if let Some(action) = line.strip_suffix("()") {
            if action == "explode" {
                state.set("log", json!("clobbered"));
                return Err(EvalError::new("boom"));
            }
            let mut log = state.get("log").cloned().unwrap_or_else(|| json!([]));
            if let Some(items) = log.as_array_mut() {
                items.push(json!(action));
            }
            state.set("log", log);
            return Ok(Value::Null);
        }
        Err(EvalError::new(format!("cannot parse: {line}")))
    }

    fn card_game() -> (PhaseDb, PhaseId, PhaseId, PhaseId) {
        let mut db = PhaseDb::new("cards", Phase::new("lobby"));
        let lobby = db.current();
        let dealing = db.add_phase(Phase::new("dealing")).unwrap();
        let playing = db.add_phase(Phase::new("playing")).unwrap();
        (db, lobby, dealing, playing)
    }

    #[test]
    fn test_new_starts_in_initial_phase() {
        let db = PhaseDb::new("cards", Phase::new("lobby"));
        assert_eq!(db.current(), db.initial());
        assert_eq!(db.current_name(), "lobby");
        assert_eq!(db.name(), "cards");
        assert!(db.state().is_empty());
    }

    #[test]
    fn test_duplicate_phase_rejected() {
        let (mut db, ..) = card_game();
        assert_eq!(
            db.add_phase(Phase::new("dealing")),
            Err(PhaseError::DuplicatePhase("dealing".into()))
        );
    }

    #[test]
    fn test_default_transition_fires() {
        let (mut db, lobby, dealing, _) = card_game();
        let t = db
            .add_transition(lobby, dealing, Transition::new("start"))
            .unwrap();
        let outcome = db.process(&"start".into(), &mut toy).unwrap();
        assert_eq!(
            outcome,
            Outcome::Fired {
                transition: t,
                from: "lobby".into(),
                to: "dealing".into(),
            }
        );
        assert_eq!(db.current(), dealing);
    }

    #[test]
    fn test_unmatched_event_is_ignored() {
        let (mut db, lobby, dealing, _) = card_game();
        db.add_transition(lobby, dealing, Transition::new("start"))
            .unwrap();
        let outcome = db.process(&"quit".into(), &mut toy).unwrap();
        assert_eq!(outcome, Outcome::Ignored { candidates: 0 });
        assert_eq!(db.current(), lobby);
    }

    #[test]
    fn test_first_passing_guard_wins_and_short_circuits() {
        let (mut db, lobby, dealing, playing) = card_game();
        db.add_transition(
            lobby,
            dealing,
            Transition::new("start").with_guard(guard_on("closed")),
        )
        .unwrap();
        let second = db
            .add_transition(
                lobby,
                playing,
                Transition::new("start").with_exec(exec_calling("skip")),
            )
            .unwrap();
        // Never reached: evaluating it would fail on the unknown variable.
        db.add_transition(
            lobby,
            dealing,
            Transition::new("start").with_guard(guard_on("missing")),
        )
        .unwrap();
        db.state_mut().set("closed", json!(false));

        let outcome = db.process(&"start".into(), &mut toy).unwrap();
        assert_eq!(
            outcome,
            Outcome::Fired {
                transition: second,
                from: "lobby".into(),
                to: "playing".into(),
            }
        );
        assert_eq!(db.state().get("log"), Some(&json!(["skip"])));
    }

    #[test]
    fn test_passing_first_guard_skips_failing_second_guard() {
        let (mut db, lobby, dealing, playing) = card_game();
        let first = db
            .add_transition(
                lobby,
                dealing,
                Transition::new("start").with_guard(guard_on("ready")),
            )
            .unwrap();
        db.add_transition(
            lobby,
            playing,
            Transition::new("start").with_guard(guard_on("missing")),
        )
        .unwrap();
        db.state_mut().set("ready", json!(true));

        let mut seen = Vec::new();
        let mut counting = |source: &str, state: &mut GameState| {
            seen.push(source.to_string());
            toy(source, state)
        };
        let outcome = db.process(&"start".into(), &mut counting).unwrap();

        assert_eq!(
            outcome,
            Outcome::Fired {
                transition: first,
                from: "lobby".into(),
                to: "dealing".into(),
            }
        );
        // One guard evaluation, then the (empty) exec script.
        assert_eq!(seen, vec!["return ready\n".to_string(), String::new()]);
    }

    #[test]
    fn test_all_guards_false() {
        let (mut db, lobby, dealing, _) = card_game();
        db.add_transition(
            lobby,
            dealing,
            Transition::new("start").with_guard(guard_on("ready")),
        )
        .unwrap();
        db.state_mut().set("ready", json!(0));
        let outcome = db.process(&"start".into(), &mut toy).unwrap();
        assert_eq!(outcome, Outcome::Ignored { candidates: 1 });
        assert!(!outcome.fired());
        assert_eq!(db.current(), lobby);
    }

    #[test]
    fn test_disabled_transition_is_skipped() {
        let (mut db, lobby, dealing, playing) = card_game();
        let first = db
            .add_transition(lobby, dealing, Transition::new("start"))
            .unwrap();
        db.add_transition(lobby, playing, Transition::new("start"))
            .unwrap();
        db.transition_mut(first).unwrap().set_enabled(false);
        db.process(&"start".into(), &mut toy).unwrap();
        assert_eq!(db.current(), playing);
    }

    #[test]
    fn test_only_current_phase_transitions_considered() {
        let (mut db, _, dealing, playing) = card_game();
        db.add_transition(dealing, playing, Transition::new("dealt"))
            .unwrap();
        let outcome = db.process(&"dealt".into(), &mut toy).unwrap();
        assert_eq!(outcome, Outcome::Ignored { candidates: 0 });
    }

    #[test]
    fn test_guard_failure_leaves_db_unchanged() {
        let (mut db, lobby, dealing, _) = card_game();
        let t = db
            .add_transition(
                lobby,
                dealing,
                Transition::new("start").with_guard(guard_on("ready")),
            )
            .unwrap();
        let err = db.process(&"start".into(), &mut toy).unwrap_err();
        let PhaseError::Evaluation(err) = err else {
            panic!("expected evaluation error");
        };
        assert_eq!(err.role, GraphRole::Guard);
        assert_eq!(err.transition, t);
        assert_eq!(err.from, "lobby");
        assert_eq!(err.to, "dealing");
        assert_eq!(err.event, "start");
        assert!(matches!(err.failure, EvaluationFailure::Runtime(_)));
        assert_eq!(db.current(), lobby);
    }

    #[test]
    fn test_exec_failure_restores_state() {
        let (mut db, lobby, dealing, _) = card_game();
        db.add_transition(
            lobby,
            dealing,
            Transition::new("start").with_exec(exec_calling("explode")),
        )
        .unwrap();
        db.state_mut().set("log", json!(["before"]));
        let err = db.process(&"start".into(), &mut toy).unwrap_err();
        assert!(matches!(
            &err,
            PhaseError::Evaluation(e) if e.role == GraphRole::Exec
        ));
        assert_eq!(db.current(), lobby);
        assert_eq!(db.state().get("log"), Some(&json!(["before"])));
    }

    #[test]
    fn test_compile_failure_is_reported() {
        let (mut db, lobby, dealing, _) = card_game();
        let t = db
            .add_transition(lobby, dealing, Transition::new("start"))
            .unwrap();
        let guard = db.transition_mut(t).unwrap().guard_mut();
        let src = guard.source();
        guard.disconnect_port(src, Port::Next);
        let assign = guard.add_block(Block::assign("x")).unwrap();
        guard.connect(src, Port::Next, assign, Port::FlowIn).unwrap();

        let err = db.process(&"start".into(), &mut toy).unwrap_err();
        assert!(matches!(
            &err,
            PhaseError::Evaluation(e) if matches!(e.failure, EvaluationFailure::Compile(_))
        ));
        assert_eq!(db.current(), lobby);
    }

    #[test]
    fn test_edit_after_compile_takes_effect() {
        let (mut db, lobby, dealing, _) = card_game();
        let t = db
            .add_transition(lobby, dealing, Transition::new("start"))
            .unwrap();
        db.process(&"start".into(), &mut toy).unwrap();
        assert!(db.transition(t).unwrap().is_compiled());

        db.reset(lobby).unwrap();
        *db.transition_mut(t).unwrap().guard_mut() = guard_on("ready");
        db.state_mut().set("ready", json!(false));
        let outcome = db.process(&"start".into(), &mut toy).unwrap();
        assert_eq!(outcome, Outcome::Ignored { candidates: 1 });
    }

    #[test]
    fn test_self_transition() {
        let (mut db, lobby, ..) = card_game();
        db.add_transition(
            lobby,
            lobby,
            Transition::new("tick").with_exec(exec_calling("tock")),
        )
        .unwrap();
        db.process(&"tick".into(), &mut toy).unwrap();
        db.process(&"tick".into(), &mut toy).unwrap();
        assert_eq!(db.current(), lobby);
        assert_eq!(db.state().get("log"), Some(&json!(["tock", "tock"])));
    }

    #[test]
    fn test_remove_phase_drops_transitions() {
        let (mut db, lobby, dealing, playing) = card_game();
        db.add_transition(lobby, dealing, Transition::new("start"))
            .unwrap();
        db.add_transition(dealing, playing, Transition::new("dealt"))
            .unwrap();
        db.add_transition(lobby, playing, Transition::new("skip"))
            .unwrap();
        db.remove_phase(dealing).unwrap();
        assert_eq!(db.transitions().count(), 1);
        assert!(db.phase_by_name("dealing").is_none());
        assert_eq!(
            db.remove_phase(lobby),
            Err(PhaseError::CurrentPhaseRemoval("lobby".into()))
        );
        assert!(matches!(
            db.remove_phase(dealing),
            Err(PhaseError::UnknownPhase(_))
        ));
    }

    #[test]
    fn test_remove_initial_phase_repoints_initial() {
        let (mut db, lobby, dealing, _) = card_game();
        db.reset(dealing).unwrap();
        db.remove_phase(lobby).unwrap();
        assert_eq!(db.initial(), dealing);
    }

    #[test]
    fn test_transition_to_unknown_phase_rejected() {
        let (mut db, lobby, dealing, _) = card_game();
        db.remove_phase(dealing).unwrap();
        assert!(matches!(
            db.add_transition(lobby, dealing, Transition::new("start")),
            Err(PhaseError::UnknownPhase(_))
        ));
        let t = db
            .add_transition(lobby, lobby, Transition::new("noop"))
            .unwrap();
        db.remove_transition(t).unwrap();
        assert_eq!(
            db.remove_transition(t).map(|_| ()),
            Err(PhaseError::UnknownTransition(t))
        );
    }

    #[test]
    fn test_config_round_trip() {
        let (mut db, lobby, dealing, playing) = card_game();
        db.add_transition(
            lobby,
            dealing,
            Transition::new("start").with_guard(guard_on("ready")),
        )
        .unwrap();
        db.add_transition(
            dealing,
            playing,
            Transition::new("dealt")
                .with_exec(exec_calling("shuffle"))
                .with_enabled(false),
        )
        .unwrap();
        db.state_mut().set("ready", json!(true));

        let config = db.to_config();
        assert_eq!(config.machine.initial, "lobby");
        assert!(!config.transitions[1].enabled);

        let text = serde_yaml::to_string(&config).unwrap();
        let reparsed: MachineConfig = serde_yaml::from_str(&text).unwrap();
        let mut restored = PhaseDb::from_config(&reparsed).unwrap();
        assert_eq!(restored.current_name(), "lobby");
        assert_eq!(restored.phases().count(), 3);
        assert_eq!(restored.state().get("ready"), Some(&json!(true)));
        let (_, _, _, t) = restored.transitions().next().unwrap();
        assert_eq!(t.guard(), &guard_on("ready"));

        let outcome = restored.process(&"start".into(), &mut toy).unwrap();
        assert!(outcome.fired());
        assert_eq!(restored.current_name(), "dealing");
    }

    #[test]
    fn test_from_config_collects_every_issue() {
        let config: MachineConfig = serde_yaml::from_str(
            r"
machine: { name: broken, initial: nowhere }
phases: [lobby, lobby]
transitions:
  - { from: lobby, on: start, to: playing }
  - from: lobby
    on: go
    to: lobby
    guard:
      blocks: [{ id: 1, kind: return }]
",
        )
        .unwrap();
        let Err(ConfigError::ValidationError { errors, .. }) = PhaseDb::from_config(&config)
        else {
            panic!("expected validation error");
        };
        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "phases[1]",
                "machine.initial",
                "transitions[0].to",
                "transitions[1].guard",
            ]
        );
    }

    #[test]
    fn test_missing_graphs_get_defaults() {
        let config: MachineConfig = serde_yaml::from_str(
            r"
machine: { name: m, initial: a }
phases: [a, b]
transitions:
  - { from: a, on: go, to: b }
",
        )
        .unwrap();
        let db = PhaseDb::from_config(&config).unwrap();
        let (_, _, _, t) = db.transitions().next().unwrap();
        assert_eq!(t.guard(), &BlockGraph::always_true("guard"));
        assert_eq!(t.exec(), &BlockGraph::new("exec"));
    }
}
