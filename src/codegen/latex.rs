//! LaTeX summary of a flow graph.

use super::GraphVisitor;
use crate::graph::{FlowGraph, Node, NodeKind};
use crate::utils::errors::PdfgResult;
use crate::utils::latex::latex_format;

const HEADER: [&str; 4] = [
    "\\documentclass{article}",
    "\\usepackage{amsmath}",
    "\\usepackage{amssymb}",
    "\\begin{document}",
];

/// Renders one `align*` block per node.
#[derive(Debug, Default)]
pub struct LatexVisitor {
    items: Vec<String>,
}

impl LatexVisitor {
    /// Visitor with an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// The complete document.
    pub fn document(&self) -> String {
        let mut lines: Vec<String> = HEADER.iter().map(|s| s.to_string()).collect();
        for item in &self.items {
            lines.push("\\begin{align*}".to_string());
            lines.push(item.clone());
            lines.push("\\end{align*}".to_string());
        }
        lines.push("\\end{document}".to_string());
        lines.join("\n")
    }
}

fn row(name: &str, value: &str) -> String {
    format!("\\mathbf{{{}}}:\\;&{} \\\\", name, latex_format(value))
}

fn listing(items: &[String]) -> String {
    items.join("; \\\\\n&")
}

impl GraphVisitor for LatexVisitor {
    fn enter(&mut self, node: &Node, _graph: &FlowGraph) -> PdfgResult<()> {
        let mut rows = vec![row("Label", &node.label)];
        match &node.kind {
            NodeKind::Stmt(stmt) => {
                rows.push(row("Iteration", &node.domain));
                if !stmt.statements.is_empty() {
                    rows.push(row("Statements", &listing(&stmt.statements)));
                }
                if !stmt.datamap.is_empty() {
                    rows.push(row("DataMap", &stmt.datamap));
                }
                if !stmt.reads.is_empty() {
                    rows.push(row("Reads", &listing(&stmt.reads)));
                }
                if !stmt.writes.is_empty() {
                    rows.push(row("Writes", &listing(&stmt.writes)));
                }
            }
            NodeKind::Data(data) | NodeKind::Temp(data) => {
                rows.push(row("Domain", &node.domain));
                rows.push(row("Range", &data.range));
                rows.push(row("Size", &data.size));
            }
            NodeKind::Struct(s) => {
                rows.push(row("Domain", &node.domain));
                rows.push(row("Range", &s.data.range));
                rows.push(row("Size", &s.data.size));
            }
            NodeKind::Iter(iter) => {
                rows = vec![format!(
                    "{} = &{}",
                    latex_format(&node.label),
                    latex_format(&iter.relation)
                )];
            }
        }
        self.items.push(rows.join("\n"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::csr_spmv;

    #[test]
    fn test_latex_document() {
        let graph = csr_spmv(4, 7).unwrap();
        let mut visitor = LatexVisitor::new();
        visitor.walk(&graph).unwrap();
        let doc = visitor.document();

        assert!(doc.starts_with("\\documentclass{article}"));
        assert!(doc.ends_with("\\end{document}"));
        assert_eq!(doc.matches("\\begin{align*}").count(), graph.nodes().len());
        assert!(doc.contains("\\mathbf{Label}:\\;&spmv \\\\"));
        assert!(doc.contains("\\mathbf{Size}:\\;&N_{R} \\\\"));
        assert!(doc.contains("\\mathbf{Range}:\\;&\\mathbb{R} \\\\"));
        assert!(doc.contains("\\leq"));
    }
}
