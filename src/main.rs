//! pdfg Command Line Interface
//!
//! Usage:
//!   pdfg [OPTIONS] <spec>
//!   pdfg [OPTIONS] --sample <name>
//!   pdfg --help
//!
//! Examples:
//!   pdfg jacobi.pdfg                          # C code via the installed solver
//!   pdfg --emit=latex jacobi.pdfg             # LaTeX summary, no solver needed
//!   pdfg --replay scans.json jacobi.pdfg      # C code from recorded solver output
//!   pdfg --sample csr-bsr -o csr_bsr.c        # CSR to BSR inspector/executor

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use pdfg::codegen::Emit;
use pdfg::inspector::{CsrToBsr, InspExecGraph};
use pdfg::solver::{Dialect, ReplaySolver, Scanner};
use pdfg::PipelineConfig;
use std::fs;
use std::path::PathBuf;

/// pdfg - Polyhedral Dataflow Graph Compiler
#[derive(Parser, Debug)]
#[command(name = "pdfg")]
#[command(author = "pdfg Contributors")]
#[command(version)]
#[command(about = "Compiles polyhedral dataflow graphs to C", long_about = None)]
struct Cli {
    /// Flow graph specification
    #[arg(value_name = "SPEC", required_unless_present = "sample")]
    spec: Option<PathBuf>,

    /// Compile a built-in kernel instead of a specification
    #[arg(long, conflicts_with = "spec")]
    sample: Option<SampleArg>,

    /// Output file (defaults to <graph>.<ext>)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// What to emit
    #[arg(long, default_value = "code")]
    emit: EmitArg,

    /// Set calculator executable
    #[arg(long, value_name = "PATH", default_value = pdfg::solver::DEFAULT_SOLVER)]
    solver: String,

    /// Query language of the calculator
    #[arg(long, default_value = "omega")]
    dialect: DialectArg,

    /// Serve recorded solver output from a JSON file
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Keep guards wrapping a whole scan
    #[arg(long)]
    keep_guard: bool,

    /// Omit timing instrumentation
    #[arg(long)]
    no_profile: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitArg {
    /// Generated source code
    Code,
    /// LaTeX document
    Latex,
    /// Solver script
    Omega,
    /// Persisted graph
    Json,
    /// Graphviz layout
    Dot,
}

impl From<EmitArg> for Emit {
    fn from(arg: EmitArg) -> Self {
        match arg {
            EmitArg::Code => Emit::Code,
            EmitArg::Latex => Emit::Latex,
            EmitArg::Omega => Emit::Omega,
            EmitArg::Json => Emit::Json,
            EmitArg::Dot => Emit::Dot,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DialectArg {
    /// Omega+ calculator
    Omega,
    /// ISL calculator
    Isl,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Omega => Dialect::Omega,
            DialectArg::Isl => Dialect::Isl,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SampleArg {
    /// Three-point Jacobi, T=100, N=1000
    Jacobi1d,
    /// Five-point Jacobi, T=100, M=N=256
    Jacobi2d,
    /// CSR sparse matrix-vector product
    Spmv,
    /// CSR to BSR inspector/executor, 8x8 blocks
    CsrBsr,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("pdfg v{}", pdfg::VERSION);

    let config = build_config(&cli);
    debug!("Pipeline config: {:?}", config);
    let emit: Emit = cli.emit.into();
    let mut scanner = build_scanner(&cli, &config)?;

    let (name, output) = match cli.sample {
        Some(SampleArg::CsrBsr) => {
            let ie = InspExecGraph::generate(&CsrToBsr::default())
                .with_context(|| "Failed to generate inspector/executor")?;
            let out = pdfg::emit_inspector(&ie, emit, &mut scanner, &config)
                .with_context(|| format!("Failed to emit '{}'", ie.graph.name))?;
            (ie.graph.name.clone(), out)
        }
        sample => {
            let graph = match (sample, &cli.spec) {
                (Some(SampleArg::Jacobi1d), _) => pdfg::samples::jacobi1d(100, 1000)?,
                (Some(SampleArg::Jacobi2d), _) => pdfg::samples::jacobi2d(100, 256, 256)?,
                (Some(_), _) => pdfg::samples::csr_spmv(1024, 8192)?,
                (None, Some(path)) => {
                    debug!("Input file: {:?}", path);
                    pdfg::parse_file(path)
                        .with_context(|| format!("Failed to parse specification: {:?}", path))?
                }
                (None, None) => anyhow::bail!("No specification given"),
            };
            let out = pdfg::emit(&graph, emit, &mut scanner, &config)
                .with_context(|| format!("Failed to emit '{}'", graph.name))?;
            (graph.name, out)
        }
    };

    let path = config.output_path(&name, emit);
    fs::write(&path, output).with_context(|| format!("Failed to write output file: {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(())
}

fn build_config(cli: &Cli) -> PipelineConfig {
    let mut config = PipelineConfig::default()
        .with_solver(&cli.solver)
        .with_dialect(cli.dialect.into())
        .with_skip_guard(!cli.keep_guard)
        .with_profile(!cli.no_profile)
        .with_verbosity(cli.verbose);
    if let Some(ref output) = cli.output {
        config = config.with_output(output.clone());
    }
    config
}

fn build_scanner(cli: &Cli, config: &PipelineConfig) -> Result<Scanner> {
    match cli.replay {
        Some(ref path) => {
            let solver = ReplaySolver::from_file(config.dialect, path)
                .with_context(|| format!("Failed to load solver transcript: {:?}", path))?;
            info!("Replaying solver output from {:?}", path);
            Ok(Scanner::new(Box::new(solver)).with_skip_guard(config.skip_guard))
        }
        None => Ok(pdfg::scanner(config)),
    }
}
