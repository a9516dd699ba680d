//! Phase machine
//!
//! Phases, the transitions between them, and the database that routes game
//! events through guard and exec graphs.

mod db;
mod event;
mod transition;

pub use db::{Outcome, PhaseDb, PhaseId};
pub use event::{GameEvent, Phase};
pub use transition::{CompiledGraph, Transition, TransitionId};
