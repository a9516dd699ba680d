//! Machine file loading
//!
//! The schema itself lives in `blockphase-core` so that tools which only
//! read or write machine files do not need the runtime.

pub mod loader;
pub mod validation;

pub use blockphase_core::config::schema;
pub use loader::{ConfigLimits, LoadResult, LoadWarning, LoaderOptions, MachineLoader};
pub use validation::{ValidationResult, Validator};
