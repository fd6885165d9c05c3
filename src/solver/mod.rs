//! External polyhedral solver integration.
//!
//! Scan code (nested loops with guards) comes from an external set
//! calculator. Two dialects are supported:
//! - Omega+ style calculators (`oc`), which take `symbolic` declarations,
//!   an assignment and a `codegen(...) given {...}` directive
//! - ISL's `iscc`, which takes a parameterised set and a schedule map
//!
//! The calculator is run as a blocking subprocess with the query piped to
//! its standard input. [`ReplaySolver`] serves recorded responses instead,
//! so the whole pipeline can run without a solver installed.

pub mod subst;
pub mod query;
pub mod scan;

pub use query::{IslQuery, OmegaQuery};
pub use scan::Scanner;
pub use subst::{RestoreStyle, SubstitutionContext, UfEntry};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use thiserror::Error;

use crate::PipelineConfig;

/// Default location of the Omega+ calculator.
pub const DEFAULT_SOLVER: &str = "/usr/local/bin/oc";

/// Environment variable overriding the solver path.
pub const SOLVER_ENV: &str = "PDFG_SOLVER";

/// Marker a solver puts in front of error messages.
pub const ERROR_MARKER: &str = "ERROR:";

/// Errors from running a solver.
#[derive(Error, Debug)]
pub enum SolverError {
    /// No executable at the configured path
    #[error("Solver not found at '{0}'. Set PDFG_SOLVER or pass --solver")]
    NotFound(String),

    /// Non-zero exit, stderr output or a failed write
    #[error("Solver command failed: {0}")]
    CommandFailed(String),

    /// An `ERROR:` line in the response
    #[error("Solver reported: {0}")]
    Reported(String),

    /// Malformed input or transcript
    #[error("Invalid solver expression: {0}")]
    InvalidExpression(String),

    /// Pipe or file failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type using SolverError.
pub type SolverResult<T> = Result<T, SolverError>;

/// Query language of a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// Omega+ calculator
    #[default]
    Omega,
    /// ISL calculator
    Isl,
}

/// A set calculator that turns a textual query into scan code.
pub trait Solver {
    /// Query language this solver understands.
    fn dialect(&self) -> Dialect;

    /// Run one query to completion and return standard output.
    fn run(&mut self, query: &str) -> SolverResult<String>;
}

/// Check if a solver executable exists at `path`.
pub fn is_solver_available(path: &str) -> bool {
    Path::new(path).is_file()
}

/// Turn an `ERROR:`-marked response into an error carrying the rest of the message.
pub fn check_response(response: &str) -> SolverResult<&str> {
    match response.find(ERROR_MARKER) {
        Some(pos) => Err(SolverError::Reported(
            response[pos + ERROR_MARKER.len()..].trim().to_string(),
        )),
        None => Ok(response),
    }
}

/// Name assigned by the first `name := ...` line of a query.
pub fn query_target(query: &str) -> Option<&str> {
    query
        .lines()
        .find_map(|line| line.split_once(":=").map(|(lhs, _)| lhs.trim()))
        .filter(|name| !name.is_empty())
}

/// A solver run as a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    /// Executable path
    pub path: String,
    /// Query language
    pub dialect: Dialect,
}

impl ProcessSolver {
    /// Solver at `path` speaking `dialect`.
    pub fn new(path: &str, dialect: Dialect) -> Self {
        Self {
            path: path.to_string(),
            dialect,
        }
    }

    /// Build from configuration; `PDFG_SOLVER` overrides the configured path.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let path = std::env::var(SOLVER_ENV).unwrap_or_else(|_| config.solver_path.clone());
        Self::new(&path, config.dialect)
    }
}

impl Solver for ProcessSolver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn run(&mut self, query: &str) -> SolverResult<String> {
        if !is_solver_available(&self.path) {
            return Err(SolverError::NotFound(self.path.clone()));
        }
        log::debug!("Running {} with query:\n{}", self.path, query);

        let mut child = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // stdout is drained while the query is still being written
        let writer = child.stdin.take().map(|mut stdin| {
            let query = query.to_string();
            thread::spawn(move || stdin.write_all(query.as_bytes()))
        });

        let output = child.wait_with_output()?;
        let written = match writer.map(|w| w.join()) {
            Some(Err(_)) => Err(SolverError::CommandFailed(format!(
                "Writing the query to {} failed",
                self.path
            ))),
            Some(Ok(result)) => result.map_err(SolverError::from),
            None => Ok(()),
        };
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(SolverError::CommandFailed(stderr.trim().to_string()));
        }
        if !output.status.success() {
            return Err(SolverError::CommandFailed(format!(
                "{} exited with {}",
                self.path, output.status
            )));
        }

        written?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        log::debug!("Solver response:\n{}", stdout);
        Ok(stdout)
    }
}

/// A solver that serves recorded responses keyed by query target.
#[derive(Debug, Clone, Default)]
pub struct ReplaySolver {
    dialect: Dialect,
    responses: BTreeMap<String, String>,
    queries: Vec<String>,
}

impl ReplaySolver {
    /// Replay solver with no recorded responses.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Add a recorded response for the set assigned as `target`.
    pub fn with_response(mut self, target: &str, response: &str) -> Self {
        self.responses.insert(target.to_string(), response.to_string());
        self
    }

    /// Load a JSON object mapping targets to responses.
    pub fn from_json(dialect: Dialect, json: &str) -> SolverResult<Self> {
        let responses: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| SolverError::InvalidExpression(format!("Bad replay transcript: {}", e)))?;
        Ok(Self {
            dialect,
            responses,
            queries: Vec::new(),
        })
    }

    /// Load a JSON transcript from `path`.
    pub fn from_file(dialect: Dialect, path: &Path) -> SolverResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(dialect, &json)
    }

    /// Queries received so far.
    pub fn queries(&self) -> &[String] {
        &self.queries
    }
}

impl Solver for ReplaySolver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn run(&mut self, query: &str) -> SolverResult<String> {
        self.queries.push(query.to_string());
        let target = query_target(query)
            .ok_or_else(|| SolverError::InvalidExpression(query.to_string()))?;
        self.responses
            .get(target)
            .cloned()
            .ok_or_else(|| SolverError::CommandFailed(format!("No recorded response for '{}'", target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_response() {
        assert_eq!(check_response("for(t1 = 0;;)").unwrap(), "for(t1 = 0;;)");
        match check_response("ERROR: syntax error near ';'") {
            Err(SolverError::Reported(msg)) => assert_eq!(msg, "syntax error near ';'"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_query_target() {
        let q = "symbolic N;\nspmv := {[i] : 0 <= i < N};\ncodegen(spmv);";
        assert_eq!(query_target(q), Some("spmv"));
        assert_eq!(query_target("codegen(x);"), None);
    }

    #[test]
    fn test_replay_records_queries() {
        let mut solver = ReplaySolver::new(Dialect::Omega).with_response("S", "s0();");
        assert_eq!(solver.run("S := {[i]};").unwrap(), "s0();");
        assert!(solver.run("T := {[i]};").is_err());
        assert_eq!(solver.queries().len(), 2);
    }

    #[test]
    fn test_replay_from_json() {
        let solver = ReplaySolver::from_json(Dialect::Isl, r#"{"jacobi": "jacobi(c0);"}"#).unwrap();
        assert_eq!(solver.dialect(), Dialect::Isl);
        assert!(ReplaySolver::from_json(Dialect::Isl, "[1,2]").is_err());
    }

    #[test]
    fn test_missing_solver() {
        let mut solver = ProcessSolver::new("/nonexistent/oc", Dialect::Omega);
        assert!(matches!(solver.run("x"), Err(SolverError::NotFound(_))));
    }

    #[test]
    fn test_process_solver_roundtrip() {
        // `cat` echoes the query back
        if !is_solver_available("/bin/cat") {
            return;
        }
        let mut solver = ProcessSolver::new("/bin/cat", Dialect::Omega);
        assert_eq!(solver.run("S := {[i]};").unwrap(), "S := {[i]};");
    }

    #[test]
    fn test_process_solver_large_query() {
        if !is_solver_available("/bin/cat") {
            return;
        }
        // several times a pipe buffer in both directions
        let query = "S := {[i,j] : 0 <= i < N && 0 <= j < M};\n".repeat(20_000);
        let mut solver = ProcessSolver::new("/bin/cat", Dialect::Omega);
        let response = solver.run(&query).unwrap();
        assert_eq!(response.len(), query.len());
        assert_eq!(response, query);
    }
}
