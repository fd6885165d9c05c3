//! # pdfg - Polyhedral Dataflow Graph Compiler
//!
//! Lowers a dataflow graph of statements and arrays over integer iteration
//! domains into imperative C:
//! - Declarative graph specifications and ready-made kernels
//! - Textual set algebra with relation application and composition
//! - Schedule transformations (skewing, fusion, tiling)
//! - Scan code from an external set calculator, with uninterpreted
//!   functions and constants encoded around the query
//! - Inspector/executor generation for sparse format conversion
//! - C, LaTeX, solver script, JSON and DOT output
//!
//! ## Architecture
//!
//! ```text
//! Spec → Frontend → FlowGraph → Visitor ⇄ Scanner ⇄ Solver → Output
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use pdfg::prelude::*;
//!
//! let spec = r#"
//!     N := 1024;
//!     S := {[i] : 0 <= i < N};
//!     statement(S) := "y[i] = 2*x[i]";
//! "#;
//!
//! let graph = pdfg::parse_spec("scale", spec)?;
//! let mut scanner = pdfg::scanner(&PipelineConfig::default());
//! let code = pdfg::emit(&graph, Emit::Code, &mut scanner, &PipelineConfig::default())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod polyhedral;
pub mod transform;
pub mod solver;
pub mod graph;
pub mod frontend;
pub mod inspector;
pub mod samples;
pub mod codegen;
pub mod schedule;
pub mod utils;

// Re-export commonly used types
/// Common imports.
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::codegen::{
        CodeGenVisitor, Emit, GraphVisitor, InspExecEmitter, LatexVisitor, OmegaVisitor,
    };
    pub use crate::frontend::PdfgParser;
    pub use crate::graph::{Edge, FlowGraph, MemAlloc, Node, NodeKind};
    pub use crate::inspector::{CsrToBsr, Decomposition, InspExecGraph};
    pub use crate::polyhedral::{Constant, Domain, Formula, Function, Set, SetLibrary, Var};
    pub use crate::schedule::{ScheduleKind, ScheduleTree};
    pub use crate::solver::{Dialect, ProcessSolver, ReplaySolver, Scanner, Solver};
    pub use crate::transform::{Fuse, Skew, Tile, Transform};
    pub use crate::utils::errors::*;
    pub use crate::PipelineConfig;
}

use std::path::{Path, PathBuf};

use anyhow::Result;

use codegen::{Emit, GraphVisitor};
use graph::FlowGraph;
use inspector::InspExecGraph;
use solver::{Dialect, ProcessSolver, Scanner};

/// Configuration for a compilation run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Set calculator executable
    pub solver_path: String,
    /// Query language of the calculator
    pub dialect: Dialect,
    /// Drop a guard wrapping the whole scan
    pub skip_guard: bool,
    /// Emit timing instrumentation
    pub profile: bool,
    /// Output language, also the code file extension
    pub lang: String,
    /// Output file (defaults to `<graph>.<ext>`)
    pub output: Option<PathBuf>,
    /// Verbosity level (0-3)
    pub verbosity: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            solver_path: solver::DEFAULT_SOLVER.to_string(),
            dialect: Dialect::Omega,
            skip_guard: true,
            profile: true,
            lang: "c".to_string(),
            output: None,
            verbosity: 1,
        }
    }
}

impl PipelineConfig {
    /// Use the calculator at `path`.
    pub fn with_solver(mut self, path: &str) -> Self {
        self.solver_path = path.to_string();
        self
    }

    /// Set the query language.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Keep or drop whole-scan guards.
    pub fn with_skip_guard(mut self, skip_guard: bool) -> Self {
        self.skip_guard = skip_guard;
        self
    }

    /// Enable or disable timing instrumentation.
    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    /// Set the output language.
    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = lang.to_string();
        self
    }

    /// Write output to `path`.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Set the verbosity level.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Where output for `name` goes: the configured path, else `<name>.<ext>`.
    pub fn output_path(&self, name: &str, emit: Emit) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.{}", name, emit.extension(&self.lang))))
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse specification text into a graph.
pub fn parse_spec(name: &str, spec: &str) -> Result<FlowGraph> {
    Ok(frontend::parse(name, spec)?)
}

/// Parse a specification file; the graph is named after the file stem.
pub fn parse_file(path: &Path) -> Result<FlowGraph> {
    Ok(frontend::PdfgParser::parse_file(path)?)
}

/// Scanner over the configured calculator.
pub fn scanner(config: &PipelineConfig) -> Scanner {
    let solver = ProcessSolver::from_config(config);
    log::debug!("Using solver '{}' ({:?})", solver.path, solver.dialect);
    Scanner::new(Box::new(solver)).with_skip_guard(config.skip_guard)
}

/// Render `graph` in the requested format.
///
/// Only [`Emit::Code`] queries the solver.
pub fn emit(graph: &FlowGraph, emit: Emit, scanner: &mut Scanner, config: &PipelineConfig) -> Result<String> {
    log::info!("Emitting {:?} for '{}'", emit, graph.name);
    let out = match emit {
        Emit::Code => {
            let mut visitor = codegen::CodeGenVisitor::new(scanner).with_profile(config.profile);
            visitor.walk(graph)?;
            visitor.code()
        }
        Emit::Latex => {
            let mut visitor = codegen::LatexVisitor::new();
            visitor.walk(graph)?;
            visitor.document()
        }
        Emit::Omega => {
            let mut visitor = codegen::OmegaVisitor::new();
            visitor.walk(graph)?;
            visitor.script()
        }
        Emit::Json => graph.to_json()?,
        Emit::Dot => graph.to_dot(),
    };
    log::debug!("Emitted {} bytes", out.len());
    Ok(out)
}

/// Render an inspector/executor umbrella.
///
/// Code is one program holding all three stages. The other formats
/// concatenate the stages in order.
pub fn emit_inspector(
    ie: &InspExecGraph,
    emit: Emit,
    scanner: &mut Scanner,
    config: &PipelineConfig,
) -> Result<String> {
    match emit {
        Emit::Code => Ok(codegen::InspExecEmitter::new(scanner)
            .with_profile(config.profile)
            .emit(ie)?),
        Emit::Json => {
            let stages = [&ie.setup, &ie.inspector, &ie.executor];
            Ok(serde_json::to_string_pretty(&stages)?)
        }
        _ => {
            let mut parts = Vec::new();
            for stage in [&ie.setup, &ie.inspector, &ie.executor] {
                parts.push(self::emit(stage, emit, scanner, config)?);
            }
            Ok(parts.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_config_builders() {
        let config = PipelineConfig::default()
            .with_solver("/opt/iscc")
            .with_dialect(Dialect::Isl)
            .with_profile(false);
        assert_eq!(config.solver_path, "/opt/iscc");
        assert_eq!(config.dialect, Dialect::Isl);
        assert!(config.skip_guard);
        assert!(!config.profile);
    }

    #[test]
    fn test_output_path() {
        let config = PipelineConfig::default();
        assert_eq!(config.output_path("jacobi1d", Emit::Code), PathBuf::from("jacobi1d.c"));
        assert_eq!(config.output_path("jacobi1d", Emit::Latex), PathBuf::from("jacobi1d.tex"));
        let config = config.with_output("out.c");
        assert_eq!(config.output_path("jacobi1d", Emit::Dot), PathBuf::from("out.c"));
    }

    #[test]
    fn test_emit_without_solver() {
        let graph = samples::jacobi1d(4, 5).unwrap();
        let config = PipelineConfig::default();
        let mut scanner = scanner(&config);
        let dot = emit(&graph, Emit::Dot, &mut scanner, &config).unwrap();
        assert!(dot.starts_with("digraph"));
        let json = emit(&graph, Emit::Json, &mut scanner, &config).unwrap();
        assert_eq!(FlowGraph::from_json(&json).unwrap().name, "jacobi1d");
        let script = emit(&graph, Emit::Omega, &mut scanner, &config).unwrap();
        assert!(script.contains("symbolic N,T;"));
    }
}
