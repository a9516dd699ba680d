//! Machine file schema
//!
//! A machine file describes a complete phase machine:
//!
//! ```yaml
//! machine:
//!   name: card-game
//!   initial: lobby
//!
//! phases:
//!   - lobby
//!   - name: dealing
//!     description: Cards are being handed out
//!   - playing
//!
//! transitions:
//!   - from: lobby
//!     on: start
//!     to: dealing
//!   - from: dealing
//!     on: dealt
//!     to: playing
//!     exec:
//!       blocks:
//!         - { id: 0, kind: source }
//!         - { id: 1, kind: action, name: shuffle, arity: 0 }
//!       edges:
//!         - { from: 0.next, to: 1.flow_in }
//!
//! state:
//!   round: 0
//! ```
//!
//! A transition without `guard` always passes; one without `exec` does
//! nothing when it fires.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::document::GraphDocument;

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root of a machine file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineConfig {
    /// Machine metadata (required)
    pub machine: MachineMetadata,

    /// Phase declarations, in order
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,

    /// Transition declarations, in priority order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionConfig>,

    /// Initial game state handed to the evaluator
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub state: IndexMap<String, serde_json::Value>,
}

/// Machine identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineMetadata {
    /// Machine name (required)
    pub name: String,

    /// Phase the machine starts in (required)
    pub initial: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// Phases
// ============================================================================

/// A phase declaration: either a bare name or a name with a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhaseConfig {
    /// `- lobby`
    Name(String),
    /// `- { name: lobby, description: ... }`
    Detailed {
        /// Phase name
        name: String,
        /// Free-form description
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl PhaseConfig {
    /// Phase name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Detailed { name, .. } => name,
        }
    }

    /// Phase description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Detailed { description, .. } => description.as_deref(),
        }
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// A transition declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionConfig {
    /// Source phase
    pub from: String,

    /// Triggering event name
    pub on: String,

    /// Target phase
    pub to: String,

    /// Disabled transitions are never candidates
    #[serde(default = "default_enabled", skip_serializing_if = "is_true")]
    pub enabled: bool,

    /// Guard graph; absent means always true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<GraphDocument>,

    /// Exec graph; absent means no-op
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<GraphDocument>,
}

const fn default_enabled() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_true(value: &bool) -> bool {
    *value
}

#[cfg(test)]
mod tests {
    use super::*;

    const MACHINE: &str = r"
machine:
  name: card-game
  initial: lobby
phases:
  - lobby
  - name: playing
    description: Main loop
transitions:
  - from: lobby
    on: start
    to: playing
  - from: playing
    on: quit
    to: lobby
    enabled: false
    guard:
      blocks:
        - { id: 0, kind: source }
        - { id: 1, kind: return }
        - { id: 2, kind: variable, name: allowed }
      edges:
        - { from: 0.next, to: 1.flow_in }
        - { from: 2.out, to: 1.arg0 }
state:
  round: 0
  players: []
";

    #[test]
    fn test_parse_machine() {
        let config: MachineConfig = serde_yaml::from_str(MACHINE).unwrap();
        assert_eq!(config.machine.name, "card-game");
        assert_eq!(config.machine.initial, "lobby");
        assert_eq!(config.phases.len(), 2);
        assert_eq!(config.phases[0].name(), "lobby");
        assert_eq!(config.phases[1].description(), Some("Main loop"));
        assert!(config.transitions[0].enabled);
        assert!(config.transitions[0].guard.is_none());
        assert!(!config.transitions[1].enabled);
        let guard = config.transitions[1].guard.as_ref().unwrap();
        assert_eq!(guard.blocks.len(), 3);
        assert_eq!(guard.name, "");
        assert_eq!(config.state["round"], serde_json::json!(0));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let text = MACHINE.replace("initial: lobby", "initial: lobby\n  colour: red");
        assert!(serde_yaml::from_str::<MachineConfig>(&text).is_err());
    }

    #[test]
    fn test_enabled_omitted_when_true() {
        let transition = TransitionConfig {
            from: "a".into(),
            on: "go".into(),
            to: "b".into(),
            enabled: true,
            guard: None,
            exec: None,
        };
        let text = serde_yaml::to_string(&transition).unwrap();
        assert!(!text.contains("enabled"));
    }

    #[test]
    fn test_json_machine() {
        let json = r#"{"machine":{"name":"m","initial":"a"},"phases":["a"]}"#;
        let config: MachineConfig = serde_json::from_str(json).unwrap();
        assert!(config.transitions.is_empty());
        assert!(config.state.is_empty());
    }
}
