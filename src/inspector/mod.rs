//! Inspector/executor decomposition.
//!
//! A sparse format conversion is lowered into three graphs under one
//! umbrella:
//! - **setup** reads the input format into a struct
//! - **inspector** discovers the output structure and fills a new struct
//! - **executor** runs the computation on the new format
//!
//! Stage domains come from a shared set of named relations, composed once
//! in a [`SetLibrary`] and instantiated per stage by tuple name.

pub mod csr_bsr;

pub use csr_bsr::CsrToBsr;

use crate::graph::{FlowGraph, StructNode};
use crate::polyhedral::text::{function_calls, identifiers, is_keyword};
use crate::polyhedral::{Constant, Function, SetLibrary};
use crate::utils::errors::{LookupError, ParseError, ParseErrorKind, PdfgResult};

/// A conversion that knows how to build its three stages.
pub trait Decomposition {
    /// Umbrella name, `<source>_<target>` (`csr_bsr`).
    fn name(&self) -> &str;

    /// Constants shared by the umbrella and the inspector.
    fn constants(&self) -> Vec<Constant>;

    /// Graph computing over the source format.
    fn input(&self) -> PdfgResult<FlowGraph>;

    /// Set and relation definitions: `name := {...}` or `name := rel * set`.
    fn expressions(&self) -> PdfgResult<Vec<String>>;

    /// Setup stage: read the source format into a struct.
    fn build_setup(&self, ie: &InspExecGraph) -> PdfgResult<FlowGraph>;

    /// Inspector stage: fill the target struct.
    fn build_inspector(&self, ie: &InspExecGraph) -> PdfgResult<FlowGraph>;

    /// Executor stage over the target struct.
    fn build_executor(&self, ie: &InspExecGraph) -> PdfgResult<FlowGraph>;
}

/// The umbrella graph and its three stages.
#[derive(Debug, Clone)]
pub struct InspExecGraph {
    /// Umbrella graph; dispatches to the stages
    pub graph: FlowGraph,
    /// Computation over the source format
    pub input: FlowGraph,
    /// Named sets and relations
    pub library: SetLibrary,
    /// Names the inspector has to produce
    pub insp_items: Vec<String>,
    /// Reads the source format
    pub setup: FlowGraph,
    /// Builds the target format
    pub inspector: FlowGraph,
    /// Computes over the target format
    pub executor: FlowGraph,
}

impl InspExecGraph {
    /// Empty stages named `<name>_setup`, `<name>_insp` and `<name>_exec`.
    pub fn new(name: &str, constants: Vec<Constant>, input: FlowGraph) -> Self {
        let setup = FlowGraph::new(&format!("{}_setup", name)).with_parent(name);
        let inspector = FlowGraph::new(&format!("{}_insp", name))
            .with_parent(name)
            .with_constants(constants.clone());
        let executor = FlowGraph::new(&format!("{}_exec", name)).with_parent(name);

        let mut graph = FlowGraph::new(name).with_constants(constants);
        // struct readers used by the setup stage
        graph.includes.push("iegen_util".to_string());
        graph.subgraphs = vec![
            setup.name.clone(),
            inspector.name.clone(),
            executor.name.clone(),
        ];

        Self {
            graph,
            input,
            library: SetLibrary::new(),
            insp_items: Vec::new(),
            setup,
            inspector,
            executor,
        }
    }

    /// Build sets and all three stages.
    pub fn generate(decomposition: &dyn Decomposition) -> PdfgResult<Self> {
        let mut ie = Self::new(
            decomposition.name(),
            decomposition.constants(),
            decomposition.input()?,
        );
        ie.build_sets(&decomposition.expressions()?)?;
        ie.setup = decomposition.build_setup(&ie)?;
        ie.inspector = decomposition.build_inspector(&ie)?;
        ie.executor = decomposition.build_executor(&ie)?;
        log::info!(
            "Decomposed '{}': setup {} nodes, inspector {} nodes, executor {} nodes",
            ie.graph.name,
            ie.setup.nodes().len(),
            ie.inspector.nodes().len(),
            ie.executor.nodes().len()
        );
        Ok(ie)
    }

    /// Source and target struct names, from the umbrella name.
    pub fn struct_names(&self) -> (&str, &str) {
        let name = self.graph.name.as_str();
        name.split_once('_').unwrap_or((name, name))
    }

    /// C type of a struct by short name (`csr` gives `csr_data_t`).
    pub fn struct_type(name: &str) -> String {
        format!("{}{}", name, StructNode::SUFFIX)
    }

    /// Stage domain: the named set with the stage label as tuple name.
    pub fn stage_domain(&self, set: &str, label: &str) -> PdfgResult<String> {
        let formula = self
            .library
            .get(set)
            .ok_or_else(|| LookupError::new(set, format!("sets of '{}'", self.graph.name)))?;
        Ok(formula.with_tuple_name(label).to_string())
    }

    /// Define every expression in order.
    pub fn build_sets(&mut self, expressions: &[String]) -> PdfgResult<()> {
        for (n, expr) in expressions.iter().enumerate() {
            let expr = expr.trim().trim_end_matches(';').trim();
            if expr.is_empty() || expr.starts_with('#') {
                continue;
            }
            let (name, body) = match expr.split_once(":=") {
                Some((name, body)) => (Some(name.trim()), body.trim()),
                None => (None, expr),
            };

            if body.starts_with('{') || body.starts_with('[') {
                let name = self.library.add(body, name).map_err(|e| e.at_line(n + 1))?;
                self.register_symbols(&name);
            } else if let Some((relation, set)) = body.split_once('*') {
                let result = name.ok_or_else(|| {
                    ParseError::new(
                        ParseErrorKind::Syntax,
                        format!("Composition '{}' needs a name", body),
                    )
                    .at_line(n + 1)
                })?;
                self.library.apply(relation.trim(), set.trim(), result)?;
            } else {
                return Err(ParseError::new(
                    ParseErrorKind::Syntax,
                    format!("Expected a set, relation or composition, found '{}'", body),
                )
                .at_line(n + 1)
                .into());
            }
        }
        Ok(())
    }

    /// Register calls as functions and note names the input cannot provide.
    fn register_symbols(&mut self, name: &str) {
        let Some(formula) = self.library.get(name) else {
            return;
        };
        let mut bound: Vec<String> = formula.input.clone();
        bound.extend(formula.output.iter().flatten().cloned());
        bound.extend(formula.exists_vars());

        let mut functions: Vec<Function> = Vec::new();
        let mut items: Vec<String> = Vec::new();
        for cond in &formula.conditions {
            for site in function_calls(cond) {
                if is_keyword(&site.name) || functions.iter().any(|f| f.name == site.name) {
                    continue;
                }
                if !self.input.contains(&site.name) && !items.contains(&site.name) {
                    items.push(site.name.clone());
                }
                let args = site.arg_list();
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                functions.push(Function::uninterpreted(&site.name, &args));
            }
            for (ident, is_call) in identifiers(cond) {
                if is_call
                    || bound.contains(&ident)
                    || is_keyword(&ident)
                    || self.graph.contains(&ident)
                    || self.input.contains(&ident)
                    || items.contains(&ident)
                {
                    continue;
                }
                items.push(ident);
            }
        }

        for function in functions {
            self.graph.add_function(function);
        }
        for item in items {
            if !self.insp_items.contains(&item) && !self.graph.contains(&item) {
                log::debug!("Inspector must produce '{}'", item);
                self.insp_items.push(item);
            }
        }
    }
}
