//! Machine file validation
//!
//! Runs on a deserialized [`MachineConfig`] and collects every problem
//! rather than stopping at the first one, so `blockphase validate` can
//! report a whole file at once. Graphs are built and compiled here, which
//! means a machine that validates cleanly will also load into a
//! [`crate::phase::PhaseDb`] and never hit a compile error at runtime.

use std::collections::{HashMap, HashSet, VecDeque};

use blockphase_core::config::schema::{MachineConfig, TransitionConfig};
use blockphase_core::{BlockGraph, GraphDocument, compile};

use crate::config::loader::ConfigLimits;
use crate::error::{Severity, ValidationIssue};

// ============================================================================
// Public API
// ============================================================================

/// Result of machine validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Machine validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a machine and returns every issue found.
    pub fn validate(&mut self, config: &MachineConfig, limits: &ConfigLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_metadata(config);
        let phases = self.validate_phases(config);
        self.validate_initial(config, &phases);
        for (i, transition) in config.transitions.iter().enumerate() {
            self.validate_transition(i, transition, &phases);
        }
        self.check_shadowed(config);
        self.check_reachability(config, &phases);
        self.validate_limits(config, limits);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Schema Validation
    // ========================================================================

    fn validate_metadata(&mut self, config: &MachineConfig) {
        if config.machine.name.trim().is_empty() {
            self.add_error("machine.name", "machine name is required and cannot be empty");
        }
    }

    /// Checks phase declarations and returns the set of declared names.
    fn validate_phases<'a>(&mut self, config: &'a MachineConfig) -> Vec<&'a str> {
        if config.phases.is_empty() {
            self.add_error("phases", "machine declares no phases");
        }

        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(config.phases.len());
        for (i, phase) in config.phases.iter().enumerate() {
            let name = phase.name();
            if name.trim().is_empty() {
                self.add_error(&format!("phases[{i}]"), "phase name cannot be empty");
                continue;
            }
            if !seen.insert(name) {
                self.add_error(&format!("phases[{i}]"), &format!("duplicate phase '{name}'"));
                continue;
            }
            names.push(name);
        }
        names
    }

    fn validate_initial(&mut self, config: &MachineConfig, phases: &[&str]) {
        let initial = &config.machine.initial;
        if !phases.contains(&initial.as_str()) {
            self.add_error(
                "machine.initial",
                &unknown_phase_message(initial, phases),
            );
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn validate_transition(&mut self, i: usize, transition: &TransitionConfig, phases: &[&str]) {
        let path = format!("transitions[{i}]");
        for (field, name) in [("from", &transition.from), ("to", &transition.to)] {
            if !phases.contains(&name.as_str()) {
                self.add_error(&format!("{path}.{field}"), &unknown_phase_message(name, phases));
            }
        }
        if transition.on.trim().is_empty() {
            self.add_error(&format!("{path}.on"), "event name cannot be empty");
        }
        if let Some(guard) = &transition.guard {
            self.validate_graph(&format!("{path}.guard"), guard, "guard");
        }
        if let Some(exec) = &transition.exec {
            self.validate_graph(&format!("{path}.exec"), exec, "exec");
        }
    }

    /// Builds and compiles one graph.
    fn validate_graph(&mut self, path: &str, document: &GraphDocument, role: &str) {
        let mut document = document.clone();
        if document.name.is_empty() {
            document.name = role.to_string();
        }
        match BlockGraph::from_document(document) {
            Ok(graph) => {
                if let Err(e) = compile(&graph) {
                    self.add_error(path, &e.to_string());
                }
            }
            Err(e) => self.add_error(path, &e.to_string()),
        }
    }

    /// Warns about transitions that can never fire because an earlier
    /// unguarded transition with the same source and event always wins.
    fn check_shadowed(&mut self, config: &MachineConfig) {
        let mut unguarded: HashMap<(&str, &str), usize> = HashMap::new();
        for (i, t) in config.transitions.iter().enumerate() {
            if !t.enabled {
                continue;
            }
            let key = (t.from.as_str(), t.on.as_str());
            if let Some(&winner) = unguarded.get(&key) {
                self.add_warning(
                    &format!("transitions[{i}]"),
                    &format!(
                        "never fires: transitions[{winner}] has no guard and handles '{}' in '{}' first",
                        t.on, t.from
                    ),
                );
            } else if t.guard.is_none() {
                unguarded.insert(key, i);
            }
        }
    }

    /// Warns about phases that no enabled transition path reaches.
    fn check_reachability(&mut self, config: &MachineConfig, phases: &[&str]) {
        if !phases.contains(&config.machine.initial.as_str()) {
            return;
        }
        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([config.machine.initial.as_str()]);
        while let Some(phase) = queue.pop_front() {
            if !reached.insert(phase) {
                continue;
            }
            queue.extend(
                config
                    .transitions
                    .iter()
                    .filter(|t| t.enabled && t.from == phase)
                    .map(|t| t.to.as_str()),
            );
        }
        for (i, phase) in config.phases.iter().enumerate() {
            if phases.contains(&phase.name()) && !reached.contains(phase.name()) {
                self.add_warning(
                    &format!("phases[{i}]"),
                    &format!("phase '{}' is unreachable from '{}'", phase.name(), config.machine.initial),
                );
            }
        }
    }

    // ========================================================================
    // Limits Validation
    // ========================================================================

    fn validate_limits(&mut self, config: &MachineConfig, limits: &ConfigLimits) {
        if config.phases.len() > limits.max_phases {
            self.add_error(
                "phases",
                &format!(
                    "too many phases: {} (max {})",
                    config.phases.len(),
                    limits.max_phases
                ),
            );
        }
        if config.transitions.len() > limits.max_transitions {
            self.add_error(
                "transitions",
                &format!(
                    "too many transitions: {} (max {})",
                    config.transitions.len(),
                    limits.max_transitions
                ),
            );
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

/// Closest declared phase name, if any is within edit distance 3.
#[must_use]
pub fn suggest_phase<'a>(input: &str, phases: &[&'a str]) -> Option<&'a str> {
    phases
        .iter()
        .map(|p| (*p, strsim::damerau_levenshtein(input, p)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(name, _)| name)
}

fn unknown_phase_message(name: &str, phases: &[&str]) -> String {
    suggest_phase(name, phases).map_or_else(
        || format!("unknown phase '{name}'"),
        |s| format!("unknown phase '{name}' (did you mean '{s}'?)"),
    )
}
