//! Error types for the flow-graph compiler.
//!
//! Errors are grouped by the phase that raises them. Every phase error
//! converts into [`PdfgError`], so pipeline code can propagate with `?`.

use thiserror::Error;
use std::fmt;

use crate::solver::SolverError;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum PdfgError {
    /// Malformed specification text
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A name did not resolve in a symbol table or graph
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Flow graph construction or persistence failed
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// The external solver failed or reported an error
    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    /// Schedule tree construction failed
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error while reading a specification, constraint or formula.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// 1-based source line, when the text came from a line stream
    pub line: Option<usize>,
    /// The kind of parse error
    pub kind: ParseErrorKind,
}

impl ParseError {
    /// Create a parse error without line information.
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            kind,
        }
    }

    /// Attach a source line, keeping an existing one.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} at line {}", self.message, line),
            None => write!(f, "{}", self.message),
        }
    }
}

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// General syntax problem
    Syntax,
    /// Iterator used in a relation but bound nowhere
    UndefinedIterator,
    /// Constraint that is not `lo OP name OP hi` or `name OP value`
    MalformedConstraint,
    /// Function-style directive that is not recognised
    UnsupportedDirective,
    /// Statement refers to a set that was never declared
    UnknownSet,
    /// Subscript with more dimensions than the offset helpers cover
    UnsupportedRank,
}

/// A name that failed to resolve.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct LookupError {
    /// The missing name
    pub name: String,
    /// Where the lookup happened
    pub context: String,
}

impl LookupError {
    /// `name` missing from `context`.
    pub fn new(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: context.into(),
        }
    }
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown symbol '{}' in {}", self.name, self.context)
    }
}

/// Flow graph construction and persistence errors.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Edge endpoint missing from the graph and its input graph
    #[error("Edge endpoint '{label}' is not a node of graph '{graph}' or its input graph")]
    UnknownEndpoint {
        /// Label of the missing endpoint
        label: String,
        /// Graph that rejected the edge
        graph: String,
    },

    /// A node label was added twice
    #[error("Duplicate node label '{label}' in graph '{graph}'")]
    DuplicateLabel {
        /// The repeated label
        label: String,
        /// Graph that rejected the node
        graph: String,
    },

    /// A symbol of the wrong kind was used where a node was required
    #[error("Invalid FlowGraph object: {0}")]
    InvalidObject(String),

    /// JSON persistence failed
    #[error("Failed to persist graph: {0}")]
    Persist(#[from] serde_json::Error),
}

/// Schedule tree construction error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ScheduleError {
    /// The error message
    pub message: String,
    /// The kind of schedule error
    pub kind: ScheduleErrorKind,
}

impl ScheduleError {
    /// Create a schedule error
    pub fn new(kind: ScheduleErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// What went wrong while building a schedule tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleErrorKind {
    /// A node received more children than its kind allows
    ChildLimit,
    /// A line could not be read as `key: value`
    Syntax,
}

/// Result type using PdfgError.
pub type PdfgResult<T> = Result<T, PdfgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(
            ParseErrorKind::UndefinedIterator,
            "Undefined iterator 'k' in expression '{[k]}'",
        )
        .at_line(7);
        let s = format!("{}", err);
        assert!(s.contains("Undefined iterator 'k'"));
        assert!(s.ends_with("at line 7"));
    }

    #[test]
    fn test_at_line_keeps_first() {
        let err = ParseError::new(ParseErrorKind::Syntax, "bad").at_line(3).at_line(9);
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_lookup_error_converts() {
        let err: PdfgError = LookupError::new("csr", "struct members").into();
        assert!(format!("{}", err).contains("Unknown symbol 'csr'"));
    }
}
