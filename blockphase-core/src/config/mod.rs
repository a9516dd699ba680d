//! Machine file schema
//!
//! Types deserialized from machine files. Loading, environment substitution
//! and validation live in the `blockphase` crate.

pub mod schema;
