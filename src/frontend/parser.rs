//! Line-oriented parser for flow graph specifications.
//!
//! A specification is a sequence of `;`-separated lines:
//!
//! ```text
//! # Jacobi 1-D
//! name("jacobi1d");
//! [T,N] -> {A[t,i] : 0 <= t <= T && 0 <= i <= N+1};
//! jacobi := {[t,i] : 1 <= t <= T && 1 <= i <= N};
//! statement(jacobi) := "A[t,i] = (A[t-1,i-1] + A[t-1,i] + A[t-1,i+1]) / 3.0";
//! ```
//!
//! Sets and relations go to a [`SetLibrary`]; statements become statement
//! nodes whose accesses create data nodes and edges. Multi-dimensional
//! subscripts are flattened once the whole specification is read.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use super::access::{accesses, base_name, flatten, nested_accesses, split_assignment, top_level_accesses};
use crate::graph::{FlowGraph, Node, Symbol};
use crate::polyhedral::text::{is_identifier, matching_close, split_top_level};
use crate::polyhedral::{Constant, Formula, Set, SetLibrary, Var};
use crate::utils::errors::{ParseError, ParseErrorKind, PdfgError, PdfgResult};

/// Builds a [`FlowGraph`] from specification text.
pub struct PdfgParser {
    graph: FlowGraph,
    library: SetLibrary,
    iters: BTreeMap<String, Var>,
    lineno: usize,
}

impl PdfgParser {
    /// Parser building a graph called `name`.
    pub fn new(name: &str) -> Self {
        Self {
            graph: FlowGraph::new(name),
            library: SetLibrary::new(),
            iters: BTreeMap::new(),
            lineno: 0,
        }
    }

    /// Parse a specification file; the graph is named after the file stem.
    pub fn parse_file(path: &Path) -> PdfgResult<FlowGraph> {
        let spec = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("pdfg");
        Self::new(name).parse(&spec)
    }

    /// Sets and relations defined so far.
    pub fn library(&self) -> &SetLibrary {
        &self.library
    }

    /// Parse a whole specification. No graph is returned on error.
    pub fn parse(&mut self, spec: &str) -> PdfgResult<FlowGraph> {
        for line in spec.lines() {
            self.lineno += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            for part in split_statements(line) {
                let lineno = self.lineno;
                self.line(&part).map_err(|e| match e {
                    PdfgError::Parse(e) => PdfgError::Parse(e.at_line(lineno)),
                    other => other,
                })?;
            }
        }
        flatten_accesses(&mut self.graph)?;
        log::info!(
            "Parsed '{}': {} nodes, {} edges, {} sets",
            self.graph.name,
            self.graph.nodes().len(),
            self.graph.edges().len(),
            self.library.len()
        );
        Ok(self.graph.clone())
    }

    fn line(&mut self, line: &str) -> PdfgResult<()> {
        match line.find(":=") {
            Some(pos) => self.assign(line[..pos].trim(), line[pos + 2..].trim(), line),
            None => self.expression(line),
        }
    }

    fn assign(&mut self, lhs: &str, rhs: &str, line: &str) -> PdfgResult<()> {
        if let Some((keyword, args)) = directive(lhs) {
            return match keyword {
                "statement" | "stmt" => self.statement(unquote(&args), unquote(rhs)),
                _ => Err(ParseError::new(
                    ParseErrorKind::UnsupportedDirective,
                    format!("Function '{}' is not supported", keyword),
                )
                .into()),
            };
        }
        if rhs.starts_with('[') || rhs.starts_with('{') {
            self.relation(Some(lhs), rhs)?;
            return Ok(());
        }
        let constant = Constant::parse(line)?;
        self.define(constant);
        Ok(())
    }

    fn expression(&mut self, line: &str) -> PdfgResult<()> {
        if line.starts_with('[') || line.starts_with('{') {
            self.relation(None, line)?;
            return Ok(());
        }
        let (keyword, args) = directive(line).ok_or_else(|| {
            ParseError::new(ParseErrorKind::Syntax, format!("Unexpected '{}'", line))
        })?;
        let arg = unquote(&args).to_string();
        match keyword {
            "name" => self.graph.name = arg,
            "include" => self.graph.includes.push(arg),
            "return" => self.graph.return_type = arg,
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::UnsupportedDirective,
                    format!("Function '{}' is not supported", keyword),
                )
                .into())
            }
        }
        Ok(())
    }

    /// Define a constant, replacing the value of one already declared.
    fn define(&mut self, constant: Constant) {
        if self.graph.constants().iter().any(|c| c.name == constant.name) {
            let constants = self
                .graph
                .constants()
                .iter()
                .map(|c| if c.name == constant.name { constant.clone() } else { c.clone() })
                .collect();
            self.graph.set_constants(constants);
        } else {
            self.graph.add_constant(constant);
        }
    }

    /// Store a set or relation, splicing in bounds of iterators defined
    /// on earlier lines.
    fn relation(&mut self, name: Option<&str>, text: &str) -> Result<String, ParseError> {
        let mut formula = Formula::parse(text)?;
        let tuple: Vec<String> = formula
            .input
            .iter()
            .chain(formula.output.iter().flatten())
            .cloned()
            .collect();

        let mut defs: BTreeMap<String, Var> = BTreeMap::new();
        for cond in &formula.conditions {
            if cond.trim_start().starts_with("exists") {
                continue;
            }
            let var = Var::from_expression(cond)?;
            if tuple.contains(&var.name) {
                match defs.get_mut(&var.name) {
                    Some(def) => {
                        def.merge(&var);
                    }
                    None => {
                        defs.insert(var.name.clone(), var);
                    }
                }
            }
        }

        for param in &formula.params {
            if is_identifier(param) && !self.graph.contains(param) {
                self.graph.add_constant(Constant::symbolic(param));
            }
        }
        for symbol in formula.symbolic_names() {
            if !self.iters.contains_key(&symbol) && !self.graph.contains(&symbol) {
                log::trace!("Declaring symbolic constant '{}'", symbol);
                self.graph.add_constant(Constant::symbolic(&symbol));
            }
        }

        for itr in formula.input.clone() {
            if !is_identifier(&itr) {
                continue;
            }
            if let Some(def) = defs.get(&itr) {
                self.iters.insert(itr, def.clone());
            } else if let Some(known) = self.iters.get(&itr) {
                log::debug!("Carrying bound '{}' into '{}'", known, text);
                formula.conditions.push(known.to_string());
            } else {
                return Err(ParseError::new(
                    ParseErrorKind::UndefinedIterator,
                    format!("Undefined iterator '{}' in expression '{}'", itr, text),
                ));
            }
        }

        match name {
            Some(name) => {
                self.library.insert(name, formula);
                Ok(name.to_string())
            }
            None => self.library.add(&formula.to_string(), None),
        }
    }

    fn statement(&mut self, name: &str, text: &str) -> PdfgResult<()> {
        let existing = self.graph.node(name).map(|n| n.domain.clone());
        let domain = match &existing {
            Some(domain) => domain.clone(),
            None => self
                .library
                .get(name)
                .map(|f| f.to_string())
                .ok_or_else(|| {
                    ParseError::new(
                        ParseErrorKind::UnknownSet,
                        format!("No domain defined for statement '{}'", name),
                    )
                })?,
        };

        let mut excluded: BTreeSet<String> = self.graph.constant_names().into_iter().collect();
        if let Ok(formula) = Formula::parse(&domain) {
            excluded.extend(formula.input.iter().cloned());
        }
        for (sym, entry) in self.graph.symtable() {
            if matches!(entry, Symbol::Function(_) | Symbol::Param(_)) {
                excluded.insert(sym.clone());
            }
        }

        let mut reads = Vec::new();
        let mut writes = Vec::new();
        if let Some(assign) = split_assignment(text) {
            for target in top_level_accesses(&assign.lhs) {
                reads.extend(nested_accesses(&target));
                if assign.compound {
                    reads.push(target.clone());
                }
                writes.push(target);
            }
            reads.extend(accesses(&assign.rhs));
        }
        reads.retain(|a| !excluded.contains(base_name(a)));
        writes.retain(|a| !excluded.contains(base_name(a)));

        let read_labels = self.data_nodes(&reads, &domain)?;
        self.graph.newrow();
        if existing.is_none() {
            self.graph.add_node(Node::stmt(name).with_domain(&domain))?;
        }
        self.graph.newrow();
        let write_labels = self.data_nodes(&writes, &domain)?;
        self.graph.newrow();

        for label in &read_labels {
            self.connect(label, name)?;
        }
        for label in &write_labels {
            self.connect(name, label)?;
        }

        let datamap = write_labels
            .first()
            .and_then(|w| self.graph.node(w))
            .map(|n| n.domain.clone())
            .unwrap_or_default();
        let stmt = self
            .graph
            .node_mut(name)
            .and_then(|n| n.as_stmt_mut())
            .ok_or_else(|| {
                ParseError::new(ParseErrorKind::Syntax, format!("'{}' is not a statement", name))
            })?;
        stmt.statements.push(text.to_string());
        stmt.reads.extend(reads);
        stmt.writes.extend(writes);
        if stmt.datamap.is_empty() {
            stmt.datamap = datamap;
        }
        log::debug!("Statement '{}': {}", name, text);
        Ok(())
    }

    /// Data node labels for the accesses, creating missing nodes.
    fn data_nodes(&mut self, accesses: &[String], domain: &str) -> PdfgResult<Vec<String>> {
        let mut labels: Vec<String> = Vec::new();
        for access in accesses {
            let id = base_name(access);
            if labels.iter().any(|l| l == id) {
                continue;
            }
            labels.push(id.to_string());
            if self.graph.node(id).is_some() {
                continue;
            }
            let node = match self.library.get(id) {
                Some(formula) => Node::data(id).with_domain(&formula.to_string()),
                None if access.contains('[') => Node::data(id).with_domain(domain),
                None => Node::data(id),
            };
            self.graph.add_node(node)?;
        }
        Ok(labels)
    }

    /// One edge per distinct base name in a statement line. Repeated
    /// lines over the same data add their own edges.
    fn connect(&mut self, src: &str, dest: &str) -> PdfgResult<()> {
        if src == dest {
            return Ok(());
        }
        self.graph.add_edge(src, dest)
    }
}

/// Rewrite multi-dimensional subscripts in every statement node.
///
/// Extents come from the size of the accessed data node when it is a
/// product, otherwise from its domain.
pub fn flatten_accesses(graph: &mut FlowGraph) -> Result<(), ParseError> {
    let extents: BTreeMap<String, Vec<String>> = graph
        .nodes()
        .iter()
        .filter_map(|n| n.as_data().map(|d| (n.var_name(), data_extents(&n.domain, &d.size))))
        .collect();
    let lookup = |name: &str| extents.get(name).cloned();

    let labels: Vec<String> = graph
        .nodes()
        .iter()
        .filter(|n| n.is_stmt())
        .map(|n| n.label.clone())
        .collect();
    for label in labels {
        let Some(stmt) = graph.node_mut(&label).and_then(|n| n.as_stmt_mut()) else {
            continue;
        };
        for text in stmt.statements.iter_mut() {
            *text = flatten(text, &lookup)?;
        }
        stmt.condition = flatten(&stmt.condition, &lookup)?;
    }
    Ok(())
}

fn data_extents(domain: &str, size: &str) -> Vec<String> {
    let factors = split_top_level(size, "*");
    if factors.len() >= 2 || !Formula::is_formula(domain) {
        return factors;
    }
    match Set::from_expr(domain) {
        Ok(set) => set.extents(),
        Err(_) => factors,
    }
}

/// Split a line on `;` outside quotes and brackets.
fn split_statements(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            '(' | '[' | '{' if !quoted => depth += 1,
            ')' | ']' | '}' if !quoted => depth -= 1,
            ';' if !quoted && depth == 0 => {
                let part = std::mem::take(&mut current);
                if !part.trim().is_empty() {
                    parts.push(part.trim().to_string());
                }
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// `keyword(args)` with nothing after the closing parenthesis.
fn directive(text: &str) -> Option<(&str, String)> {
    let open = text.find('(')?;
    let keyword = text[..open].trim();
    if !is_identifier(keyword) {
        return None;
    }
    let close = matching_close(text, open)?;
    if !text[close + 1..].trim().is_empty() {
        return None;
    }
    Some((keyword, text[open + 1..close].trim().to_string()))
}

fn unquote(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    const JACOBI: &str = r#"
# Jacobi 1-D
name("jacobi1d");
[T,N] -> {[t,i] : 0 <= t <= T && 0 <= i <= N+1};
A := {[t,i] : 0 <= t <= T && 0 <= i <= N+1};
jacobi := {[t,i] : 1 <= t <= T && 1 <= i <= N};
statement(jacobi) := "A[t,i] = (A[t-1,i-1] + A[t-1,i] + A[t-1,i+1]) / 3.0";
"#;

    #[test]
    fn test_parse_jacobi() {
        let graph = PdfgParser::new("spec").parse(JACOBI).unwrap();
        assert_eq!(graph.name, "jacobi1d");
        assert_eq!(graph.constant_names(), vec!["T", "N"]);

        let stmt = graph.get("jacobi").unwrap().as_stmt().unwrap().clone();
        assert_eq!(stmt.reads, vec!["A[t-1,i-1]", "A[t-1,i]", "A[t-1,i+1]"]);
        assert_eq!(stmt.writes, vec!["A[t,i]"]);
        assert_eq!(
            stmt.statements[0],
            "A[offset2(t,i,(N+2))] = (A[offset2(t-1,i-1,(N+2))] + A[offset2(t-1,i,(N+2))] + A[offset2(t-1,i+1,(N+2))]) / 3.0"
        );

        let a = graph.get("A").unwrap();
        assert_eq!(a.row, 0);
        assert_eq!(graph.get("jacobi").unwrap().row, 1);
        assert_eq!(graph.edges().len(), 2);
        assert_eq!(graph.predecessors("jacobi"), vec!["A"]);
        assert_eq!(graph.successors("jacobi"), vec!["A"]);
    }

    #[test]
    fn test_parse_compound_assignment() {
        let spec = r#"
spmv := {[i,j] : 0 <= i < N_R && index(i) <= j < index(i+1)};
stmt(spmv) := "y[i] += A[j]*x[col[j]]";
"#;
        let graph = PdfgParser::new("spmv").parse(spec).unwrap();
        let stmt = graph.get("spmv").unwrap().as_stmt().unwrap().clone();
        assert_eq!(stmt.reads, vec!["y[i]", "A[j]", "col[j]", "x[col[j]]"]);
        assert_eq!(stmt.writes, vec!["y[i]"]);
        for label in ["y", "A", "col", "x"] {
            assert!(matches!(graph.get(label).unwrap().kind, NodeKind::Data(_)));
        }
        assert!(graph.contains("N_R"));
        assert!(!graph.constant_names().contains(&"index".to_string()));
    }

    #[test]
    fn test_carried_iterator_bound() {
        let spec = "outer := {[t] : 0 <= t < T};\ninner := {[t,i] : 0 <= i < N};";
        let mut parser = PdfgParser::new("carry");
        parser.parse(spec).unwrap();
        let inner = parser.library().get("inner").unwrap();
        assert_eq!(inner.conditions, vec!["0 <= i < N", "0 <= t < T"]);
    }

    #[test]
    fn test_undefined_iterator_reports_line() {
        let spec = "# header\nS := {[i,j] : 0 <= i < N};";
        let err = PdfgParser::new("bad").parse(spec).unwrap_err();
        match err {
            PdfgError::Parse(e) => {
                assert_eq!(e.kind, ParseErrorKind::UndefinedIterator);
                assert_eq!(e.line, Some(2));
                assert!(e.message.contains("'j'"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_constants_and_directives() {
        let spec = r#"
S := [N] -> {[i] : 0 <= i < N};
N := 128;
include("util.h"); return("real*")
"#;
        let graph = PdfgParser::new("consts").parse(spec).unwrap();
        assert_eq!(graph.constants().len(), 1);
        assert_eq!(graph.constants()[0].value, "128");
        assert_eq!(graph.includes, vec!["util.h"]);
        assert_eq!(graph.return_type, "real*");
    }

    #[test]
    fn test_unsupported_and_unknown() {
        let err = PdfgParser::new("x").parse("kernel(S) := \"a = b\";").unwrap_err();
        assert!(matches!(err, PdfgError::Parse(ref e) if e.kind == ParseErrorKind::UnsupportedDirective));

        let err = PdfgParser::new("x").parse("stmt(S) := \"a = b\";").unwrap_err();
        assert!(matches!(err, PdfgError::Parse(ref e) if e.kind == ParseErrorKind::UnknownSet));
    }

    #[test]
    fn test_malformed_constraint() {
        let err = PdfgParser::new("x").parse("S := {[i] : 0 <= i < N < M};").unwrap_err();
        assert!(matches!(err, PdfgError::Parse(ref e) if e.kind == ParseErrorKind::MalformedConstraint && e.line == Some(1)));
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(
            split_statements(r#"stmt(s) := "a = b; c = d"; N := 4"#),
            vec![r#"stmt(s) := "a = b; c = d""#, "N := 4"]
        );
    }

    #[test]
    fn test_repeated_reads_keep_edges() {
        let spec = r#"
S := {[i] : 0 <= i < N};
statement(S) := "B[i] = A[i]";
statement(S) := "C[i] = A[i]";
"#;
        let graph = PdfgParser::new("copy").parse(spec).unwrap();
        assert_eq!(graph.predecessors("S"), vec!["A", "A"]);
        assert_eq!(graph.successors("S"), vec!["B", "C"]);

        let stmt = graph.get("S").unwrap().as_stmt().unwrap();
        assert_eq!(stmt.statements, vec!["B[i] = A[i]", "C[i] = A[i]"]);
        assert_eq!(stmt.reads, vec!["A[i]", "A[i]"]);
        assert_eq!(graph.statements().len(), 1);
    }

    #[test]
    fn test_one_edge_per_base_in_a_line() {
        let spec = "S := {[i] : 1 <= i < N};\nstatement(S) := \"B[i] = A[i-1] + A[i]\";";
        let graph = PdfgParser::new("pair").parse(spec).unwrap();
        assert_eq!(graph.predecessors("S"), vec!["A"]);
        let stmt = graph.get("S").unwrap().as_stmt().unwrap();
        assert_eq!(stmt.reads, vec!["A[i-1]", "A[i]"]);
    }
}
