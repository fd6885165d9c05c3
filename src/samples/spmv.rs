//! Sparse matrix-vector product over CSR storage.

use crate::frontend::flatten_accesses;
use crate::graph::{FlowGraph, MemAlloc, Node};
use crate::polyhedral::Constant;
use crate::utils::errors::PdfgResult;

/// Iteration space of a CSR traversal, `index` and `col` uninterpreted.
pub const CSR_DOMAIN: &str = "{[i,j] : 0 <= i < N_R && index(i) <= j < index(i+1) && index(i) >= 0 && NNZ > 0 && NNZ >= index(i+1)}";

/// `y += A*x` with `A` in CSR form (`A`, `col`, `index`).
pub fn csr_spmv(n: u64, nnz: u64) -> PdfgResult<FlowGraph> {
    let mut graph = FlowGraph::new("csr_spmv").with_constants(vec![
        Constant::new("N_R", &n.to_string()),
        Constant::new("N_C", &n.to_string()),
        Constant::new("NNZ", &nnz.to_string()),
    ]);

    graph.add_node(
        Node::temp("A")
            .with_domain("{[j] : 0 <= j < NNZ}")
            .with_size("NNZ"),
    )?;
    graph.add_node(
        Node::temp("col")
            .with_domain("{[j] : 0 <= j < NNZ}")
            .with_range("{[k] : 0 <= k < N_C}")
            .with_size("NNZ")
            .with_type("itype"),
    )?;
    graph.add_node(
        Node::temp("index")
            .with_domain("{[i] : 0 <= i <= N_R}")
            .with_range("{[j] : 0 <= j <= NNZ}")
            .with_size("N_R+1")
            .with_type("itype"),
    )?;
    graph.add_node(Node::data("x").with_domain("{[k] : 0 <= k < N_C}").with_size("N_C"))?;
    graph.newrow();

    graph.add_node(
        Node::stmt("spmv")
            .with_domain(CSR_DOMAIN)
            .with_statements(&["y[i]+=A[j]*x[col[j]]"])
            .with_datamap("{[i] : 0 <= i < N_R}")
            .with_reads(&["y[i]", "A[j]", "col[j]", "x[col[j]]"])
            .with_writes(&["y[i]"]),
    )?;
    graph.newrow();

    graph.add_node(Node::data("y").with_domain("{[i] : 0 <= i < N_R}").with_size("N_R"))?;
    graph.newrow();

    for src in ["index", "col", "A", "x"] {
        graph.add_edge(src, "spmv")?;
    }
    graph.add_edge("spmv", "y")?;
    flatten_accesses(&mut graph)?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, Symbol};

    #[test]
    fn test_csr_spmv_graph() {
        let graph = csr_spmv(4, 7).unwrap();
        assert_eq!(graph.nodes().len(), 6);
        assert!(matches!(graph.get("col").unwrap().kind, NodeKind::Temp(_)));
        assert_eq!(graph.get("A").unwrap().as_data().unwrap().alloc, MemAlloc::Dynamic);
        assert_eq!(graph.predecessors("spmv").len(), 4);

        // `index` labels a node, so it shadows the function symbol
        assert!(matches!(graph.symbol("index"), Some(Symbol::Node(_))));
        let names: Vec<String> = graph.functions().into_iter().map(|f| f.name).collect();
        assert!(names.contains(&"index".to_string()));
    }

    #[test]
    fn test_csr_spmv_unflattened() {
        let graph = csr_spmv(4, 7).unwrap();
        let stmt = graph.get("spmv").unwrap().as_stmt().unwrap();
        assert_eq!(stmt.statements[0], "y[i]+=A[j]*x[col[j]]");
    }
}
