//! Frontend: the declarative flow graph specification language.
//!
//! [`PdfgParser`] reads a specification line by line into a
//! [`FlowGraph`](crate::graph::FlowGraph). The [`access`] helpers scan
//! statement text for array accesses and flatten multi-dimensional
//! subscripts into row-major offsets.

pub mod access;
pub mod parser;

pub use access::{accesses, base_name, flatten, split_assignment, Assignment};
pub use parser::{flatten_accesses, PdfgParser};
pub use crate::utils::errors::ParseError;

use crate::graph::FlowGraph;
use crate::utils::errors::PdfgResult;

/// Parse specification text into a graph named `name`.
pub fn parse(name: &str, spec: &str) -> PdfgResult<FlowGraph> {
    PdfgParser::new(name).parse(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let spec = r#"
            S := {[i] : 0 <= i < N};
            statement(S) := "y[i] = 2*x[i]";
        "#;
        let graph = parse("simple", spec).unwrap();
        assert_eq!(graph.statements().len(), 1);
        assert_eq!(graph.nodes().len(), 3);
    }
}
