//! Benchmarks for the flow graph pipeline.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pdfg::polyhedral::{Constant, Set};
use pdfg::solver::SubstitutionContext;

/// Benchmark specification parsing.
fn bench_parsing(c: &mut Criterion) {
    let spec = r#"
        name("jacobi2d");
        T := 100; M := 256; N := 256;
        A := {[t,i,j] : 0 <= t <= 1 && 0 <= i <= M+1 && 0 <= j <= N+1};
        jacobi := {[t,i,j] : 1 <= t <= T && 1 <= i <= M && 1 <= j <= N};
        statement(jacobi) := "A[t&1,i,j] = (A[(t-1)&1,i,j] + A[(t-1)&1,i-1,j] + A[(t-1)&1,i+1,j] + A[(t-1)&1,i,j-1] + A[(t-1)&1,i,j+1]) / 5.0";
    "#;

    c.bench_function("parse_jacobi2d", |b| {
        b.iter(|| pdfg::parse_spec("bench", black_box(spec)).unwrap())
    });

    c.bench_function("build_csr_bsr", |b| {
        b.iter(|| {
            pdfg::inspector::InspExecGraph::generate(&pdfg::inspector::CsrToBsr::new(black_box(8)))
                .unwrap()
        })
    });
}

/// Benchmark symbolic set sizes.
fn bench_set_size(c: &mut Criterion) {
    let text = "{[t,i,j] : 0 <= t <= T && 0 <= i <= M+1 && 0 <= j < N && index(i) <= j < index(i+1)}";

    c.bench_function("set_from_expr", |b| {
        b.iter(|| Set::from_expr(black_box(text)).unwrap())
    });

    let set = Set::from_expr(text).unwrap();
    c.bench_function("set_size", |b| b.iter(|| black_box(&set).size().to_string()));
}

/// Benchmark function and constant substitution.
fn bench_substitution(c: &mut Criterion) {
    let formula = "{[ii,kk,i,k,j] : 0 <= i < N_R && index(i) <= j < index(i+1) && k = col(j)}";
    let iters: Vec<String> = ["ii", "kk", "i", "k", "j"].iter().map(|s| s.to_string()).collect();

    c.bench_function("encode_calls", |b| {
        b.iter(|| {
            let mut ctx = SubstitutionContext::new().with_functions(&["index", "col"]);
            ctx.encode(black_box(formula))
        })
    });

    c.bench_function("declare_and_restore_calls", |b| {
        b.iter(|| {
            let mut ctx = SubstitutionContext::new().with_functions(&["index", "col"]);
            ctx.declare_calls(black_box(formula), &iters);
            ctx.restore_calls("for(itype j = index(ii,kk,i); j <= index1(ii,kk,i)-1; j++) {")
        })
    });

    let ctx = SubstitutionContext::new().with_constants(vec![
        Constant::new("N", "1024"),
        Constant::new("M", "512"),
        Constant::new("R", "8"),
    ]);
    let scan = "for(t1 = 0; t1 <= 1023; t1++) {\n  for(t2 = 0; t2 <= 511; t2 += 8) {\n    s0(t1,t2);\n  }\n}";
    c.bench_function("restore_consts", |b| {
        b.iter(|| ctx.restore_consts(black_box(scan)))
    });
}

criterion_group!(benches, bench_parsing, bench_set_size, bench_substitution);
criterion_main!(benches);
