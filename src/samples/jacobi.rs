//! Jacobi stencils in one and two dimensions.

use crate::frontend::flatten_accesses;
use crate::graph::{FlowGraph, MemAlloc, Node};
use crate::polyhedral::Constant;
use crate::utils::errors::PdfgResult;

/// Three-point Jacobi over `T` time steps of an `N+2` element row.
///
/// Every time step is stored, so `A` holds `T+1` rows. The update is
/// labelled `jacobi`; `output` copies row `T` into `A'`, which the generated
/// function returns. With `T=0` the initial row passes straight through.
pub fn jacobi1d(t: u64, n: u64) -> PdfgResult<FlowGraph> {
    const A_DOMAIN: &str = "{[t,i] : 0 <= t <= T && 0 <= i <= N+1}";
    const ROW: &str = "{[i] : 0 <= i <= N+1}";

    let mut graph = FlowGraph::new("jacobi1d").with_constants(vec![
        Constant::new("N", &n.to_string()),
        Constant::new("T", &t.to_string()),
    ]);
    graph.return_type = "real*".to_string();

    graph.add_node(
        Node::data("A")
            .with_domain(A_DOMAIN)
            .with_size("(T+1)*(N+2)")
            .with_alloc(MemAlloc::Dynamic),
    )?;
    graph.newrow();

    graph.add_node(
        Node::stmt("jacobi")
            .with_domain("{[t,i] : 1 <= t <= T && 1 <= i <= N}")
            .with_statements(&["A[t,i] = (A[t-1,i-1] + A[t-1,i] + A[t-1,i+1]) / 3.0"])
            .with_datamap(A_DOMAIN)
            .with_reads(&["A[t-1,i-1]", "A[t-1,i]", "A[t-1,i+1]"])
            .with_writes(&["A[t,i]"]),
    )?;
    graph.newrow();

    graph.add_node(
        Node::stmt("output")
            .with_domain(ROW)
            .with_statements(&["A_prime[i] = A[T,i]"])
            .with_reads(&["A[T,i]"])
            .with_writes(&["A_prime[i]"]),
    )?;
    graph.newrow();

    graph.add_node(
        Node::data("A'")
            .with_domain(ROW)
            .with_size("N+2")
            .with_alloc(MemAlloc::Dynamic),
    )?;
    graph.newrow();

    graph.add_edge("A", "jacobi")?;
    graph.add_edge("jacobi", "output")?;
    graph.add_edge("output", "A'")?;
    flatten_accesses(&mut graph)?;
    Ok(graph)
}

/// Five-point Jacobi on an `(M+2)x(N+2)` grid, keeping two time planes.
///
/// The plane written at step `T` is copied into the returned `out`.
pub fn jacobi2d(t: u64, m: u64, n: u64) -> PdfgResult<FlowGraph> {
    const GRID: &str = "{[i,j] : 0 <= i <= M+1 && 0 <= j <= N+1}";
    const A_DOMAIN: &str = "{[t,i,j] : 0 <= t <= 1 && 0 <= i <= M+1 && 0 <= j <= N+1}";
    const READS: [&str; 5] = [
        "A[(t-1)&1,i,j-1]",
        "A[(t-1)&1,i,j]",
        "A[(t-1)&1,i,j+1]",
        "A[(t-1)&1,i-1,j]",
        "A[(t-1)&1,i+1,j]",
    ];

    let mut graph = FlowGraph::new("jacobi2d").with_constants(vec![
        Constant::new("M", &m.to_string()),
        Constant::new("N", &n.to_string()),
        Constant::new("T", &t.to_string()),
    ]);
    graph.return_type = "real*".to_string();

    graph.add_node(
        Node::data("A")
            .with_domain(A_DOMAIN)
            .with_size("2*(M+2)*(N+2)")
            .with_alloc(MemAlloc::Dynamic),
    )?;
    graph.newrow();

    let body = format!("A[t&1,i,j] = ({}) * 0.2", READS.join(" + "));
    graph.add_node(
        Node::stmt("stencil")
            .with_domain("{[t,i,j] : 1 <= t <= T && 1 <= i <= M && 1 <= j <= N}")
            .with_statements(&[body.as_str()])
            .with_datamap(A_DOMAIN)
            .with_reads(&READS)
            .with_writes(&["A[t&1,i,j]"]),
    )?;
    graph.newrow();

    graph.add_node(
        Node::stmt("output")
            .with_domain(GRID)
            .with_statements(&["out[i,j] = A[T&1,i,j]"])
            .with_reads(&["A[T&1,i,j]"])
            .with_writes(&["out[i,j]"]),
    )?;
    graph.newrow();

    graph.add_node(
        Node::data("out")
            .with_domain(GRID)
            .with_size("(M+2)*(N+2)")
            .with_alloc(MemAlloc::Dynamic),
    )?;
    graph.newrow();

    graph.add_edge("A", "stencil")?;
    graph.add_edge("stencil", "output")?;
    graph.add_edge("output", "out")?;
    flatten_accesses(&mut graph)?;
    Ok(graph)
}
