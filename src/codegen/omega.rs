//! Whole-graph Omega calculator script.
//!
//! ```text
//! symbolic N,T;
//! A := {[t,i] : 0 <= t <= T && 0 <= i <= N+1};
//! jacobi := {[t,i] : 1 <= t <= T && 1 <= i <= N};
//! codegen(jacobi);
//! ```

use super::GraphVisitor;
use crate::graph::{FlowGraph, Node};
use crate::polyhedral::Formula;
use crate::utils::errors::PdfgResult;

/// Collects node domains into a solver script.
#[derive(Debug, Default)]
pub struct OmegaVisitor {
    items: Vec<String>,
    statements: Vec<String>,
}

impl OmegaVisitor {
    /// Visitor with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// The whole script, one item per line.
    pub fn script(&self) -> String {
        let mut script = self.items.join("\n");
        script.push('\n');
        script
    }
}

impl GraphVisitor for OmegaVisitor {
    fn setup(&mut self, graph: &FlowGraph) -> PdfgResult<()> {
        let mut symbols = graph.constant_names();
        for function in graph.functions() {
            if !symbols.contains(&function.name) {
                symbols.push(format!("{}({})", function.name, function.arity()));
            }
        }
        if !symbols.is_empty() {
            self.items.push(format!("symbolic {};", symbols.join(",")));
        }
        Ok(())
    }

    fn enter(&mut self, node: &Node, _graph: &FlowGraph) -> PdfgResult<()> {
        if !Formula::is_formula(&node.domain) {
            log::debug!("No set for '{}' in solver script", node.label);
            return Ok(());
        }
        let name = node.var_name();
        self.items.push(format!("{} := {};", name, node.domain));
        if node.is_stmt() {
            self.statements.push(name);
        }
        Ok(())
    }

    fn finish(&mut self, _graph: &FlowGraph) -> PdfgResult<()> {
        let target = match self.statements.as_slice() {
            [] => return Ok(()),
            [single] => single.clone(),
            many => {
                self.items.push(format!("union := {};", many.join(" union ")));
                "union".to_string()
            }
        };
        self.items.push(format!("codegen({});", target));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::{csr_spmv, jacobi1d};

    #[test]
    fn test_omega_script() {
        let graph = jacobi1d(4, 8).unwrap();
        let mut visitor = OmegaVisitor::new();
        visitor.walk(&graph).unwrap();
        let script = visitor.script();
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "symbolic N,T;");
        assert!(lines.contains(&"jacobi := {[t,i] : 1 <= t <= T && 1 <= i <= N};"));
        assert!(lines.contains(&"A_prime := {[i] : 0 <= i <= N+1};"));
        assert!(lines.contains(&"output := {[i] : 0 <= i <= N+1};"));
        assert!(lines.contains(&"union := jacobi union output;"));
        assert_eq!(lines.last(), Some(&"codegen(union);"));
    }

    #[test]
    fn test_omega_declares_functions() {
        let graph = csr_spmv(4, 7).unwrap();
        let mut visitor = OmegaVisitor::new();
        visitor.walk(&graph).unwrap();
        let script = visitor.script();
        assert!(script.starts_with("symbolic N_R,N_C,NNZ,index(1);"));
        assert!(script.contains("codegen(spmv);"));
    }
}
