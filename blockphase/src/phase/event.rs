//! Game events and phases

use std::fmt;

use serde::{Deserialize, Serialize};

/// A discrete occurrence that can trigger transitions.
///
/// Events are identified by name alone; two events with the same name are
/// the same event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameEvent(String);

impl GameEvent {
    /// Creates an event token.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_string())
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameEvent {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for GameEvent {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A named state of the top-level game flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    name: String,
    description: Option<String>,
}

impl Phase {
    /// Creates a phase.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    /// Attaches a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Phase name, unique within its database.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_compare_by_name() {
        assert_eq!(GameEvent::new("start"), GameEvent::from("start".to_string()));
        assert_ne!(GameEvent::new("start"), GameEvent::new("stop"));
        assert_eq!(GameEvent::new("dealt").to_string(), "dealt");
    }

    #[test]
    fn test_event_serializes_as_string() {
        let json = serde_json::to_string(&GameEvent::new("roll")).unwrap();
        assert_eq!(json, r#""roll""#);
    }
}
