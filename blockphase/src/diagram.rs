//! Mermaid state diagrams
//!
//! Renders a machine as a `stateDiagram-v2` block. Phases get stable ids
//! (`s0`, `s1`, ...) in declaration order with their names as display
//! text, so names containing spaces or punctuation still render. Guarded
//! transitions are marked `[guard]`; disabled ones are drawn with a
//! `(disabled)` suffix.

use std::collections::HashMap;
use std::fmt::Write;

use blockphase_core::config::schema::MachineConfig;

use crate::phase::PhaseDb;

/// Renders a machine file as Mermaid source.
#[must_use]
pub fn render(config: &MachineConfig) -> String {
    let mut out = String::from("stateDiagram-v2\n");
    let mut ids = HashMap::new();

    for (i, phase) in config.phases.iter().enumerate() {
        let id = format!("s{i}");
        let _ = writeln!(out, "    state \"{}\" as {id}", escape(phase.name()));
        if let Some(description) = phase.description() {
            let _ = writeln!(out, "    {id} : {}", escape(description));
        }
        ids.entry(phase.name()).or_insert(id);
    }

    if let Some(initial) = ids.get(config.machine.initial.as_str()) {
        let _ = writeln!(out, "    [*] --> {initial}");
    }

    for transition in &config.transitions {
        let (Some(from), Some(to)) = (
            ids.get(transition.from.as_str()),
            ids.get(transition.to.as_str()),
        ) else {
            continue;
        };
        let mut label = escape(&transition.on);
        if transition.guard.is_some() {
            label.push_str(" [guard]");
        }
        if !transition.enabled {
            label.push_str(" (disabled)");
        }
        let _ = writeln!(out, "    {from} --> {to} : {label}");
    }
    out
}

impl PhaseDb {
    /// Mermaid source for the current shape of the machine, starting from
    /// the current phase.
    #[must_use]
    pub fn diagram(&self) -> String {
        render(&self.to_config())
    }
}

/// Mermaid treats `"` and `:` specially in labels.
fn escape(text: &str) -> String {
    text.replace('"', "#quot;").replace(':', "#58;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Phase, Transition};

    fn machine(yaml: &str) -> MachineConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_render_machine() {
        let config = machine(
            r"
machine: { name: cards, initial: lobby }
phases:
  - lobby
  - { name: dealing, description: 'Cards: handed out' }
  - game over
transitions:
  - { from: lobby, on: start, to: dealing }
  - from: dealing
    on: dealt
    to: game over
    guard: { blocks: [{ id: 0, kind: source }] }
  - { from: game over, on: again, to: lobby, enabled: false }
",
        );
        assert_eq!(
            render(&config),
            "stateDiagram-v2\n\
             \x20   state \"lobby\" as s0\n\
             \x20   state \"dealing\" as s1\n\
             \x20   s1 : Cards#58; handed out\n\
             \x20   state \"game over\" as s2\n\
             \x20   [*] --> s0\n\
             \x20   s0 --> s1 : start\n\
             \x20   s1 --> s2 : dealt [guard]\n\
             \x20   s2 --> s0 : again (disabled)\n"
        );
    }

    #[test]
    fn test_unknown_endpoints_are_skipped() {
        let config = machine(
            r"
machine: { name: m, initial: nowhere }
phases: [a]
transitions:
  - { from: a, on: go, to: b }
",
        );
        assert_eq!(render(&config), "stateDiagram-v2\n    state \"a\" as s0\n");
    }

    #[test]
    fn test_db_diagram_starts_at_current_phase() {
        let mut db = PhaseDb::new("m", Phase::new("a"));
        let a = db.current();
        let b = db.add_phase(Phase::new("b")).unwrap();
        db.add_transition(a, b, Transition::new("go")).unwrap();
        db.reset(b).unwrap();
        let text = db.diagram();
        assert!(text.contains("[*] --> s1\n"));
        assert!(text.contains("s0 --> s1 : go\n"));
    }
}
