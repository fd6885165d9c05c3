//! Dataflow graph model.
//!
//! A [`FlowGraph`] is a grid of typed nodes joined by read/write edges:
//! - Statement nodes compute over an iteration domain
//! - Data, temporary and struct nodes hold values
//! - Iterator nodes document an index mapping and emit no code
//!
//! The symbol table resolves labels to nodes, uninterpreted functions,
//! constants and parameters.

pub mod node;
pub mod flow;

pub use flow::{Edge, FlowGraph, Symbol};
pub use node::{DataNode, IterNode, MemAlloc, Node, NodeId, NodeKind, StmtNode, StructNode};
