//! CSR to block-CSR (BSR) conversion.
//!
//! The inspector walks the tiled CSR space `[ii,kk,i,k,j]` four times:
//! 1. `count` marks each non-empty `R x C` block in `bset` and counts them
//! 2. `offsets` records the running block count per row block in `b_index`
//!    (`fill` then carries counts over row blocks without blocks)
//! 3. `extract` records the block column of each block in `b_col`
//! 4. `copy` scatters every nonzero into its dense block of `A_prime`
//!
//! The executor multiplies block by block over the BSR space, reading `x`
//! and accumulating into `y`, both owned by the caller.

use super::{Decomposition, InspExecGraph};
use crate::graph::{FlowGraph, MemAlloc, Node};
use crate::polyhedral::{Constant, Var};
use crate::samples::csr_spmv;
use crate::transform::Tile;
use crate::utils::errors::PdfgResult;

/// Block index of the nonzero at row `i`, column `k`.
const BLOCK: &str = "bset[ii*(N_C/C)+(k/C)]";

/// Upper bound on the number of blocks.
const MAX_BLOCKS: &str = "N_R/R*N_C/C";

/// CSR to BSR with `R x C` blocks.
#[derive(Debug, Clone)]
pub struct CsrToBsr {
    /// Rows per block
    pub rows: u64,
    /// Columns per block
    pub cols: u64,
    /// Matrix order of the CSR input
    pub n: u64,
    /// Nonzeros of the CSR input
    pub nnz: u64,
}

impl CsrToBsr {
    /// Square `block x block` blocks over a small default matrix.
    pub fn new(block: u64) -> Self {
        Self {
            rows: block,
            cols: block,
            n: 4,
            nnz: 7,
        }
    }

    /// Input dimensions.
    pub fn with_matrix(mut self, n: u64, nnz: u64) -> Self {
        self.n = n;
        self.nnz = nnz;
        self
    }

    /// Non-square blocks.
    pub fn with_block(mut self, rows: u64, cols: u64) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }
}

impl Default for CsrToBsr {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Decomposition for CsrToBsr {
    fn name(&self) -> &str {
        "csr_bsr"
    }

    fn constants(&self) -> Vec<Constant> {
        vec![
            Constant::new("R", &self.rows.to_string()),
            Constant::new("C", &self.cols.to_string()),
        ]
    }

    fn input(&self) -> PdfgResult<FlowGraph> {
        csr_spmv(self.n, self.nnz)
    }

    fn expressions(&self) -> PdfgResult<Vec<String>> {
        let tile = Tile::new("Ttile")
            .dim_named("i", "R", "ii", "ri")
            .dim_named("k", "C", "kk", "ck")
            .relation(&["i", "k", "j"])?;
        Ok(vec![
            "Icsr := {[i,j] : 0 <= i < N_R && index(i) <= j < index(i+1) && index(i) >= 0 && index(i+1) <= NNZ && NNZ > 0 && col(j) >= 0 && N_C > 0}".to_string(),
            "Tdense := {[i,j] -> [i,k,j] : 0 <= k < N_C && k = col(j)}".to_string(),
            format!("Ttile := {}", tile),
            "Tcomp := {[ii,kk,i,k,j] -> [ii,kk,i,k,j] : k = col(j)}".to_string(),
            "Idense := Tdense * Icsr".to_string(),
            "Itile := Ttile * Idense".to_string(),
            "Icomp := Tcomp * Itile".to_string(),
            "Iexec := {[ii,jj,ri,ck] : 0 <= ii && ii*R < N_R && b_index(ii) <= jj < b_index(ii+1) && 0 <= ri < R && 0 <= ck < C}".to_string(),
        ])
    }

    fn build_setup(&self, ie: &InspExecGraph) -> PdfgResult<FlowGraph> {
        let mut setup = ie.setup.clone();
        let (source, _) = ie.struct_names();
        let ty = InspExecGraph::struct_type(source);

        setup.add_param(Var::new("path", "", "").with_type("const char*"));
        setup.add_node(
            Node::structure(source, ie.input.struct_members())
                .with_size("1")
                .with_type(&ty)
                .with_alloc(MemAlloc::Dynamic),
        )?;
        setup.add_node(
            Node::stmt("read")
                .with_domain("1")
                .with_statements(&[&format!("{}_read(path,{})", source, source)])
                .with_datamap("[0]"),
        )?;
        setup.add_edge(source, "read")?;
        setup.newrow();

        setup.return_type = format!("{}*", ty);
        Ok(setup)
    }

    fn build_inspector(&self, ie: &InspExecGraph) -> PdfgResult<FlowGraph> {
        let mut insp = ie.inspector.clone();
        let (source, target) = ie.struct_names();

        insp.return_type = format!("{}*", InspExecGraph::struct_type(target));
        insp.add_param(Var::new(source, "", "").with_type(&format!("{}*", InspExecGraph::struct_type(source))));
        for constant in insp.constants().to_vec() {
            insp.add_param(Var::new(&constant.name, "", "").with_type(&constant.ty));
        }
        // Matrix extents travel into the target struct
        insp.add_constant(Constant::symbolic("N_R"));
        insp.add_constant(Constant::symbolic("N_C"));
        for function in ie.graph.functions() {
            insp.add_function(function);
        }

        let guard = format!("!{}", BLOCK);
        let block_set = format!("{{[b] : 0 <= b < {}}}", MAX_BLOCKS);

        insp.add_node(
            Node::temp("bset")
                .with_domain(&block_set)
                .with_range("{[v] : 0 <= v <= 1}")
                .with_size(MAX_BLOCKS)
                .with_type("itype"),
        )?;
        insp.add_node(
            Node::stmt("count")
                .with_domain(&ie.stage_domain("Icomp", "count")?)
                .with_condition(&guard)
                .with_statements(&[&format!("{}=++nb", BLOCK)])
                .with_datamap("[0]")
                .with_writes(&["bset", "nb"]),
        )?;
        insp.add_node(
            Node::temp("nb")
                .with_range(&format!("{{[v] : 0 <= v <= {}}}", MAX_BLOCKS))
                .with_size("1")
                .with_type("itype"),
        )?;
        insp.add_edge("bset", "count")?;
        insp.add_edge("count", "nb")?;
        insp.newrow();

        insp.add_node(
            Node::stmt("offsets")
                .with_domain(&ie.stage_domain("Icomp", "offsets")?)
                .with_condition(&guard)
                .with_statements(&["b_index[ii+1] = ++nb", &format!("{}=nb", BLOCK)])
                .with_datamap("b_index(ii+1)")
                .with_reads(&["bset", "nb"])
                .with_writes(&["bset", "nb", "b_index"]),
        )?;
        insp.add_node(
            Node::stmt("fill")
                .with_domain("{fill[ii] : 0 <= ii && ii*R < N_R}")
                .with_statements(&["b_index[ii+1] = max(b_index[ii+1],b_index[ii])"])
                .with_datamap("b_index(ii+1)")
                .with_reads(&["b_index[ii]"])
                .with_writes(&["b_index[ii+1]"]),
        )?;
        insp.add_node(
            Node::temp("b_index")
                .with_domain("{[b] : 0 <= b <= N_R/R}")
                .with_range(&format!("{{[v] : 0 <= v <= {}}}", MAX_BLOCKS))
                .with_size("N_R/R+1")
                .with_type("itype"),
        )?;
        insp.add_edge("bset", "offsets")?;
        insp.add_edge("nb", "offsets")?;
        insp.add_edge("offsets", "b_index")?;
        insp.add_edge("offsets", "fill")?;
        insp.add_edge("fill", "b_index")?;
        insp.newrow();

        insp.add_node(
            Node::stmt("extract")
                .with_domain(&ie.stage_domain("Icomp", "extract")?)
                .with_condition(&guard)
                .with_statements(&["b_col[nb++] = k/C", &format!("{}=nb", BLOCK)])
                .with_reads(&["bset", "nb"])
                .with_writes(&["nb", "bset", "b_col"]),
        )?;
        insp.add_node(
            Node::temp("b_col")
                .with_domain(&block_set)
                .with_range("{[kk] : 0 <= kk < N_C/C}")
                .with_size(MAX_BLOCKS)
                .with_type("itype"),
        )?;
        insp.add_edge("bset", "extract")?;
        insp.add_edge("nb", "extract")?;
        insp.add_edge("fill", "extract")?;
        insp.add_edge("extract", "b_col")?;
        insp.newrow();

        insp.add_node(Node::iter("R_A->A").with_relation(
            "{[i,j] -> [b,ri,ck] : ri = i-ii*R && ck = k-(k/C)*C && A_prime(b,ri,ck) = A(j)}",
        ))?;
        insp.add_node(
            Node::stmt("copy")
                .with_domain(&ie.stage_domain("Icomp", "copy")?)
                .with_statements(&[&format!(
                    "A_prime[offset3({}-1,(i-ii*R),(k-(k/C)*C),R,C)] = A[j]",
                    BLOCK
                )])
                .with_datamap("{[b,ri,ck] : 0 <= b < nb && 0 <= ri < R && 0 <= ck < C}")
                .with_reads(&["A[j]", "bset"])
                .with_writes(&["A_prime"]),
        )?;
        insp.add_node(
            Node::temp("A_prime")
                .with_domain(&format!(
                    "{{[b,ri,ck] : 0 <= b < {} && 0 <= ri < R && 0 <= ck < C}}",
                    MAX_BLOCKS
                ))
                .with_size(&format!("{}*R*C", MAX_BLOCKS)),
        )?;
        insp.add_edge("R_A->A", "copy")?;
        insp.add_edge("extract", "copy")?;
        insp.add_edge_with_input("A", "copy", &ie.input)?;
        insp.add_edge("copy", "A_prime")?;
        insp.newrow();

        Ok(insp)
    }

    fn build_executor(&self, ie: &InspExecGraph) -> PdfgResult<FlowGraph> {
        let mut exec = ie.executor.clone();
        let (_, target) = ie.struct_names();

        exec.add_param(Var::new(target, "", "").with_type(&format!("{}*", InspExecGraph::struct_type(target))));
        exec.add_param(Var::new("x", "", "").with_type("real*"));
        exec.add_param(Var::new("y", "", "").with_type("real*"));
        for function in ie.graph.functions() {
            exec.add_function(function);
        }

        // Blocks are filled by the inspector and reached through the struct
        let blocks = ie.inspector.get("A_prime")?;
        let size = blocks.as_data().map(|d| d.size.clone()).unwrap_or_default();
        exec.add_node(
            Node::data("A_prime")
                .with_domain(&blocks.domain)
                .with_size(&size)
                .with_alloc(MemAlloc::None),
        )?;
        exec.add_node(
            Node::data("x")
                .with_domain("{[k] : 0 <= k < N_C}")
                .with_size("N_C")
                .with_defval("1.0")
                .with_alloc(MemAlloc::None),
        )?;
        exec.newrow();

        exec.add_node(
            Node::stmt("spmv")
                .with_domain(&ie.stage_domain("Iexec", "spmv")?)
                .with_statements(&["y[ii*R+ri]+=A_prime[offset3(jj,ri,ck,R,C)]*x[b_col[jj]*C+ck]"])
                .with_datamap("{[i] : 0 <= i < N_R}")
                .with_reads(&["y[ii*R+ri]", "A_prime[offset3(jj,ri,ck,R,C)]", "x[b_col[jj]*C+ck]"])
                .with_writes(&["y[ii*R+ri]"]),
        )?;
        exec.newrow();

        exec.add_node(
            Node::data("y")
                .with_domain("{[i] : 0 <= i < N_R}")
                .with_size("N_R")
                .with_alloc(MemAlloc::None),
        )?;
        exec.newrow();

        exec.add_edge("A_prime", "spmv")?;
        exec.add_edge("x", "spmv")?;
        exec.add_edge("spmv", "y")?;
        Ok(exec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn generate() -> InspExecGraph {
        InspExecGraph::generate(&CsrToBsr::new(2)).unwrap()
    }

    #[test]
    fn test_umbrella_layout() {
        let ie = generate();
        assert_eq!(ie.graph.name, "csr_bsr");
        assert_eq!(ie.struct_names(), ("csr", "bsr"));
        assert_eq!(ie.graph.subgraphs, vec!["csr_bsr_setup", "csr_bsr_insp", "csr_bsr_exec"]);
        assert_eq!(ie.inspector.parent.as_deref(), Some("csr_bsr"));
        assert!(ie.insp_items.contains(&"b_index".to_string()));
    }

    #[test]
    fn test_composed_domains() {
        let ie = generate();
        let icomp = ie.library.get("Icomp").unwrap();
        assert_eq!(icomp.input, vec!["ii", "kk", "i", "k", "j"]);
        assert!(icomp.conditions.iter().any(|c| c.starts_with("exists(ri,ck")));

        let count = ie.inspector.get("count").unwrap();
        assert!(count.domain.starts_with("{count[ii,kk,i,k,j] :"));
        assert_eq!(count.as_stmt().unwrap().condition, "!bset[ii*(N_C/C)+(k/C)]");
    }

    #[test]
    fn test_setup_reads_struct() {
        let ie = generate();
        let csr = ie.setup.get("csr").unwrap();
        match &csr.kind {
            NodeKind::Struct(s) => {
                let names: Vec<&str> = s.members.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["A", "col", "index", "N_R", "N_C", "NNZ"]);
            }
            other => panic!("expected a struct node, found {:?}", other),
        }
        assert_eq!(ie.setup.return_type, "csr_data_t*");
        assert_eq!(ie.setup.get("read").unwrap().statement(), "csr_read(path,csr)");
    }

    #[test]
    fn test_inspector_stages() {
        let ie = generate();
        let insp = &ie.inspector;
        assert_eq!(insp.return_type, "bsr_data_t*");
        assert_eq!(
            insp.params().iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["csr", "R", "C"]
        );
        assert_eq!(insp.constant_names(), vec!["R", "C", "N_R", "N_C"]);

        let members: Vec<String> = insp.struct_members().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            members,
            vec!["bset", "nb", "b_index", "b_col", "A_prime", "R", "C", "N_R", "N_C"]
        );
        assert_eq!(insp.predecessors("copy"), vec!["R_A->A", "extract", "A"]);

        let order: Vec<&str> = insp
            .ordered_nodes()
            .into_iter()
            .filter(|n| n.is_stmt())
            .map(|n| n.label.as_str())
            .collect();
        assert_eq!(order, vec!["count", "offsets", "fill", "extract", "copy"]);
    }

    #[test]
    fn test_executor_over_blocks() {
        let ie = generate();
        let exec = &ie.executor;
        assert_eq!(exec.get("A_prime").unwrap().as_data().unwrap().alloc, MemAlloc::None);
        assert_eq!(exec.get("x").unwrap().as_data().unwrap().defval, "1.0");
        assert_eq!(exec.get("y").unwrap().as_data().unwrap().alloc, MemAlloc::None);
        assert_eq!(
            exec.params().iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["bsr", "x", "y"]
        );
        let spmv = exec.get("spmv").unwrap();
        assert!(spmv.domain.starts_with("{spmv[ii,jj,ri,ck] :"));
        assert!(spmv.domain.contains("b_index(ii) <= jj < b_index(ii+1)"));
    }
}
