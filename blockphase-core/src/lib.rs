//! `blockphase` Core — block graphs and their compiler
//!
//! This crate provides the visual-program data model (blocks, ports and
//! the graphs that connect them), the compiler that turns a block graph into
//! script text, and the persistence and configuration types shared with
//! `blockphase` (runtime and CLI).

pub mod block;
pub mod block_graph;
pub mod compiler;
pub mod config;
pub mod document;
pub mod error;
pub mod graph;

pub use block::{BinaryOp, Block, BlockId, BlockKind, Literal, Port, PortKind, UnaryOp};
pub use block_graph::{BlockEdge, BlockGraph};
pub use compiler::compile;
pub use document::GraphDocument;
pub use error::{
    CompileError, CompileFailure, CyclicDataDependency, DocumentError, StructuralError,
};
pub use graph::{EdgeId, Graph, NodeId};
