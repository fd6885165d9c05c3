//! Emission of an inspector/executor umbrella as one C file.
//!
//! Stages are emitted by separate visitors sharing one [`Scanner`]:
//! - setup, whose struct node describes the source format
//! - inspector, with the source struct unrolled into locals and a target
//!   struct built from its temporaries on return
//! - executor, with the target struct unrolled
//!
//! The umbrella visitor then writes the header (with both struct typedefs)
//! and a `main` that chains the three calls and frees what they returned.

use super::c::{CodeGenVisitor, StructDef};
use super::{argv_value, GraphVisitor};
use crate::graph::{FlowGraph, NodeKind};
use crate::inspector::InspExecGraph;
use crate::polyhedral::text::{rewrite_tokens, TokenKind};
use crate::solver::Scanner;
use crate::utils::errors::{LookupError, PdfgResult};
use crate::utils::pretty::CodeFormatter;

/// Writes the setup, inspector and executor of an umbrella graph.
pub struct InspExecEmitter<'s> {
    scanner: &'s mut Scanner,
    profile: bool,
}

impl<'s> InspExecEmitter<'s> {
    /// Emitter sharing `scanner` across all stages.
    pub fn new(scanner: &'s mut Scanner) -> Self {
        Self {
            scanner,
            profile: true,
        }
    }

    /// Enable or disable timing of the stage calls.
    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    /// Generate the whole program.
    pub fn emit(&mut self, ie: &InspExecGraph) -> PdfgResult<String> {
        let (source, target) = ie.struct_names();

        let setup_struct = match ie.setup.get(source).map(|n| &n.kind) {
            Ok(NodeKind::Struct(s)) => s.members.clone(),
            _ => {
                return Err(LookupError::new(source, format!("struct nodes of '{}'", ie.setup.name)).into())
            }
        };

        let mut setup = CodeGenVisitor::new(&mut *self.scanner).with_struct_name(source);
        setup.walk(&ie.setup)?;
        let mut structs: Vec<StructDef> = setup.structs().to_vec();
        let setup_lines = setup.into_lines();

        let mut insp = CodeGenVisitor::new(&mut *self.scanner)
            .with_struct_name(target)
            .with_unroll(source, setup_struct.clone())
            .with_struct_init(target);
        insp.walk(&ie.inspector)?;
        let target_struct = insp
            .struct_members(target)
            .map(<[_]>::to_vec)
            .ok_or_else(|| LookupError::new(target, format!("structs of '{}'", ie.inspector.name)))?;
        structs.extend(insp.structs().iter().cloned());
        let insp_lines = insp.into_lines();

        let mut exec = CodeGenVisitor::new(&mut *self.scanner).with_unroll(target, target_struct.clone());
        exec.walk(&ie.executor)?;
        let exec_lines = exec.into_lines();

        let main = self.main_function(ie, (source, &setup_struct), (target, &target_struct));

        // constants are passed on the command line, not defined
        let mut umbrella = ie.graph.clone();
        umbrella.set_constants(Vec::new());
        let mut top = CodeGenVisitor::new(&mut *self.scanner)
            .with_profile(self.profile)
            .with_typedef("uint_fast32_t", "itype")
            .with_structs(&structs);
        top.setup(&umbrella)?;
        top.extend_lines(setup_lines);
        top.extend_lines(insp_lines);
        top.extend_lines(exec_lines);
        top.extend_lines(main);

        log::info!("Emitted inspector/executor '{}'", ie.graph.name);
        Ok(top.code())
    }

    /// Driver chaining the stages.
    ///
    /// Executor parameters after the struct are buffers sized from the
    /// target struct and filled with their default value. Everything the
    /// driver holds is freed before it returns.
    fn main_function(&self, ie: &InspExecGraph, source: StructRef, target: StructRef) -> Vec<String> {
        let setup = &ie.setup;
        let insp = &ie.inspector;
        let exec = &ie.executor;
        let (source, source_members) = source;
        let (target, target_members) = target;

        let setup_args: Vec<String> = setup
            .params()
            .iter()
            .enumerate()
            .map(|(n, p)| argv_value(&p.ty, n + 1))
            .collect();
        // the inspector takes the source struct, then command line values
        let mut insp_args = vec![source.to_string()];
        for (n, p) in insp.params().iter().enumerate().skip(1) {
            insp_args.push(argv_value(&p.ty, setup_args.len() + n));
        }
        let usage: Vec<&str> = setup
            .params()
            .iter()
            .chain(insp.params().iter().skip(1))
            .map(|p| p.name.as_str())
            .collect();

        let mut exec_args = vec![target.to_string()];
        let mut buffers: Vec<(String, String, String, String)> = Vec::new();
        for param in exec.params().iter().skip(1) {
            exec_args.push(param.name.clone());
            let Some(data) = exec.node(&param.name).and_then(|n| n.as_data()) else {
                log::warn!("Executor parameter '{}' has no data node", param.name);
                continue;
            };
            let ty = param.ty.trim_end_matches('*').trim().to_string();
            let size = member_access(&data.size, target, target_members);
            buffers.push((param.name.clone(), ty, size, data.defval.clone()));
        }
        let profile = self.profile;

        let mut f = CodeFormatter::new("  ");
        f.block("int main(int argc, const char **argv)", "}  // main", |f| {
            f.writeln(&format!("if (argc < {}) {{", usage.len() + 1));
            f.writeln(&format!(
                "  fprintf(stderr, \"usage: %s {}\\n\", argv[0]);",
                usage.join(" ")
            ));
            f.writeln("  return 1;");
            f.writeln("}");
            if profile {
                f.writeln("double tstart = get_time();");
            }
            f.writeln("");

            f.writeln("// 1) Call the setup function");
            f.writeln(&call(setup, source, &setup_args));
            f.writeln("");

            f.writeln("// 2) Call the inspector");
            timed(f, profile, "tinsp", &insp.name, &call(insp, target, &insp_args));
            f.writeln("");

            f.writeln("// 3) Call the executor");
            for (var, ty, size, defval) in &buffers {
                f.writeln(&format!("{ty}* {var} = calloc({size}, sizeof({ty}));"));
                if defval.parse::<f64>().map_or(true, |v| v != 0.0) {
                    f.writeln(&format!("array_init({var}, {defval}, {size});"));
                }
            }
            timed(f, profile, "texec", &exec.name, &call(exec, "", &exec_args));
            if profile {
                f.writeln(&format!(
                    "fprintf(stderr,\"{}::%.6lf seconds elapsed\\n\", (get_time() - tstart));",
                    ie.graph.name
                ));
            }
            f.writeln("");

            for (var, ..) in buffers.iter().rev() {
                f.writeln(&format!("free({});", var));
            }
            free_struct(f, target, target_members);
            free_struct(f, source, source_members);
            f.writeln("return 0;");
        });
        f.into_lines()
    }
}

/// Struct variable name and its `(member, type)` list.
type StructRef<'a> = (&'a str, &'a [(String, String)]);

/// Rewrite struct members in `expr` as `owner->member`.
fn member_access(expr: &str, owner: &str, members: &[(String, String)]) -> String {
    rewrite_tokens(expr, |t| {
        (t.kind == TokenKind::Ident && members.iter().any(|(m, _)| m == t.text))
            .then(|| format!("{}->{}", owner, t.text))
    })
}

/// Free the array members of a struct, then the struct.
fn free_struct(f: &mut CodeFormatter, owner: &str, members: &[(String, String)]) {
    for (member, _) in members.iter().filter(|(_, ty)| ty.ends_with('*')) {
        f.writeln(&format!("free({}->{});", owner, member));
    }
    f.writeln(&format!("free({});", owner));
}

/// `ret var = name(args);`, without the assignment for `void` or no `var`.
fn call(graph: &FlowGraph, var: &str, args: &[String]) -> String {
    let invocation = format!("{}({});", graph.name, args.join(", "));
    if graph.return_type == "void" || var.is_empty() {
        invocation
    } else {
        format!("{} {} = {}", graph.return_type, var, invocation)
    }
}

fn timed(f: &mut CodeFormatter, profile: bool, clock: &str, name: &str, stmt: &str) {
    if profile {
        f.writeln(&format!("double {} = get_time();", clock));
    }
    f.writeln(stmt);
    if profile {
        f.writeln(&format!(
            "fprintf(stderr,\"{}::%.6lf seconds elapsed\\n\", (get_time() - {}));",
            name, clock
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::CsrToBsr;
    use crate::solver::{Dialect, ReplaySolver};

    const INSP_SCAN: &str = "for(t1 = 0; t1 <= 1; t1++) {\n  s0(t1,0,0,0,0);\n}\n";

    fn replay() -> ReplaySolver {
        let mut solver = ReplaySolver::new(Dialect::Omega);
        for label in ["count", "offsets", "extract", "copy"] {
            solver = solver.with_response(label, INSP_SCAN);
        }
        solver
            .with_response("fill", "for(t1 = 0; t1 <= 1; t1++) {\n  s0(t1);\n}\n")
            .with_response("spmv", "for(t1 = 0; t1 <= 1; t1++) {\n  s0(t1,0,0,0);\n}\n")
    }

    fn emit(profile: bool) -> String {
        let ie = InspExecGraph::generate(&CsrToBsr::new(2)).unwrap();
        let mut scanner = Scanner::new(Box::new(replay()));
        InspExecEmitter::new(&mut scanner)
            .with_profile(profile)
            .emit(&ie)
            .unwrap()
    }

    fn position(code: &str, needle: &str) -> usize {
        code.find(needle).unwrap_or_else(|| panic!("missing '{}'", needle))
    }

    #[test]
    fn test_header_and_structs() {
        let code = emit(true);
        assert!(code.contains("typedef uint_fast32_t itype;"));
        assert!(!code.contains("typedef unsigned itype;"));
        assert!(code.contains("#include \"iegen_util.h\""));
        assert!(code.contains("} csr_data_t;"));
        assert!(code.contains("} bsr_data_t;"));
        assert!(code.contains("  itype* b_index;"));
        assert!(!code.contains("#define R 2"));
        assert!(position(code.as_str(), "} bsr_data_t;") < position(code.as_str(), "inline csr_data_t* csr_bsr_setup"));
    }

    #[test]
    fn test_stage_functions() {
        let code = emit(true);
        assert!(code.contains("inline csr_data_t* csr_bsr_setup(const char* path) {"));
        assert!(code.contains("  return csr;\n}  // csr_bsr_setup"));
        assert!(code.contains("inline bsr_data_t* csr_bsr_insp(csr_data_t* csr, int R, int C) {"));
        assert!(code.contains("  itype* restrict index = csr->index;"));
        assert!(code.contains("  bsr->b_index = b_index;"));
        assert!(code.contains("inline void csr_bsr_exec(bsr_data_t* bsr, real* x, real* y) {"));
        assert!(code.contains("  real* restrict A_prime = bsr->A_prime;"));
        assert!(!code.contains("real x[N_C];"));
        assert!(!code.contains("real y[N_R];"));
        assert_eq!(code.matches("array_init(y, 0, N_R);").count(), 1);
    }

    #[test]
    fn test_driver_chains_stages() {
        let code = emit(true);
        let setup = position(&code, "csr_data_t* csr = csr_bsr_setup(argv[1]);");
        let insp = position(&code, "bsr_data_t* bsr = csr_bsr_insp(csr, atoi(argv[2]), atoi(argv[3]));");
        let exec = position(&code, "  csr_bsr_exec(bsr, x, y);");
        assert!(setup < insp && insp < exec);
        assert!(code.contains("csr_bsr_insp::%.6lf seconds elapsed"));
        assert!(code.contains("usage: %s path R C"));
        assert!(!emit(false).contains("get_time"));
    }

    #[test]
    fn test_driver_owns_buffers_and_frees() {
        let code = emit(false);
        let x = position(&code, "  real* x = calloc(bsr->N_C, sizeof(real));\n  array_init(x, 1.0, bsr->N_C);");
        let y = position(&code, "  real* y = calloc(bsr->N_R, sizeof(real));\n  csr_bsr_exec(bsr, x, y);");
        assert!(position(&code, "csr_bsr_insp(csr,") < x && x < y);

        let freed = position(&code, "  free(y);\n  free(x);\n  free(bsr->bset);");
        assert!(y < freed);
        for member in ["b_index", "b_col", "A_prime"] {
            assert!(code.contains(&format!("  free(bsr->{});", member)));
        }
        assert!(!code.contains("free(bsr->nb)"));
        assert!(!code.contains("free(bsr->R)"));
        let bsr = position(&code, "  free(bsr);");
        let csr = position(&code, "  free(csr);\n  return 0;");
        assert!(position(&code, "  free(csr->index);") < csr);
        assert!(position(&code, "  free(csr->A);") < csr);
        assert!(bsr < csr);
    }
}
