//! Code emission from flow graphs.
//!
//! Every emitter is a [`GraphVisitor`]: `setup` once, `enter` for each
//! node in emission order, then `finish`. The visitors here produce:
//! - C source ([`CodeGenVisitor`], [`InspExecEmitter`] for umbrellas)
//! - A LaTeX summary ([`LatexVisitor`])
//! - A whole-graph solver script ([`OmegaVisitor`])

pub mod c;
pub mod inspexec;
pub mod latex;
pub mod omega;

pub use c::CodeGenVisitor;
pub use inspexec::InspExecEmitter;
pub use latex::LatexVisitor;
pub use omega::OmegaVisitor;

use crate::graph::{FlowGraph, Node};
use crate::polyhedral::Var;
use crate::utils::errors::PdfgResult;

/// Output format of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    /// Generated source code
    Code,
    /// LaTeX document
    Latex,
    /// Omega calculator script
    Omega,
    /// Persisted graph
    Json,
    /// Graphviz layout
    Dot,
}

impl Emit {
    /// File extension of the output, `lang` for code.
    pub fn extension<'a>(&self, lang: &'a str) -> &'a str {
        match self {
            Emit::Code => lang,
            Emit::Latex => "tex",
            Emit::Omega => "in",
            Emit::Json => "json",
            Emit::Dot => "dot",
        }
    }
}

/// Traversal driver shared by all emitters.
pub trait GraphVisitor {
    /// Called once before any node.
    fn setup(&mut self, _graph: &FlowGraph) -> PdfgResult<()> {
        Ok(())
    }

    /// Called for each node, in emission order.
    fn enter(&mut self, node: &Node, graph: &FlowGraph) -> PdfgResult<()>;

    /// Called once after the last node.
    fn finish(&mut self, _graph: &FlowGraph) -> PdfgResult<()> {
        Ok(())
    }

    /// Visit the whole graph.
    fn walk(&mut self, graph: &FlowGraph) -> PdfgResult<()> {
        self.setup(graph)?;
        for node in graph.ordered_nodes() {
            self.enter(node, graph)?;
        }
        self.finish(graph)
    }
}

/// `ret name(type param, ...)`
pub fn function_decl(ret: &str, name: &str, params: &[Var]) -> String {
    let params = params
        .iter()
        .map(|p| format!("{} {}", p.ty, p.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} {}({})", ret, name, params)
}

/// Command line argument `n` converted to a parameter of type `ty`.
pub fn argv_value(ty: &str, n: usize) -> String {
    let arg = format!("argv[{}]", n);
    if ty.contains("char") {
        arg
    } else if ty.contains("float") || ty.contains("double") || ty == "real" {
        format!("atof({})", arg)
    } else {
        format!("atoi({})", arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_decl() {
        let params = vec![
            Var::new("csr", "", "").with_type("csr_data_t*"),
            Var::new("R", "", ""),
        ];
        assert_eq!(
            function_decl("bsr_data_t*", "csr_bsr_insp", &params),
            "bsr_data_t* csr_bsr_insp(csr_data_t* csr, int R)"
        );
        assert_eq!(function_decl("void", "f", &[]), "void f()");
    }

    #[test]
    fn test_argv_value() {
        assert_eq!(argv_value("const char*", 1), "argv[1]");
        assert_eq!(argv_value("int", 2), "atoi(argv[2])");
        assert_eq!(argv_value("float", 3), "atof(argv[3])");
    }

    #[test]
    fn test_extension() {
        assert_eq!(Emit::Code.extension("c"), "c");
        assert_eq!(Emit::Latex.extension("c"), "tex");
    }
}
