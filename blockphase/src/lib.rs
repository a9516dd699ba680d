//! `blockphase` - phase machines driven by compiled block graphs
//!
//! A game's top-level flow is a set of named phases joined by transitions.
//! Each transition fires on a game event when its guard graph passes and
//! then runs its exec graph. Graphs are authored as blocks (see
//! `blockphase-core`) and compiled to script text, which an embedder's
//! [`evaluator::ScriptEvaluator`] runs against the game state.
//!
//! - [`phase`]: phases, transitions and the [`phase::PhaseDb`]
//! - [`session`]: a FIFO event loop owning a database
//! - [`config`]: machine file loading and validation
//! - [`diagram`]: Mermaid rendering
//! - [`observability`]: logging and the session journal

pub mod cli;
pub mod config;
pub mod diagram;
pub mod error;
pub mod evaluator;
pub mod observability;
pub mod phase;
pub mod session;
