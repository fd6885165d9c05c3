//! The flow graph container.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::node::{Node, NodeId, NodeKind};
use crate::polyhedral::text::function_calls;
use crate::polyhedral::{Constant, Function, Var};
use crate::utils::errors::{GraphError, LookupError, PdfgResult};
use crate::utils::latex::dot_label;

/// A directed dependence between two nodes, by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node label
    pub src: String,
    /// Destination node label
    pub dest: String,
    /// Rendering attributes
    pub attrs: BTreeMap<String, String>,
}

impl Edge {
    /// Edge from `src` to `dest`.
    pub fn new(src: &str, dest: &str) -> Self {
        Self {
            src: src.to_string(),
            dest: dest.to_string(),
            attrs: BTreeMap::new(),
        }
    }
}

/// A symbol table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Symbol {
    /// A node of this graph
    Node(NodeId),
    /// An uninterpreted function
    Function(Function),
    /// A named constant
    Constant(Constant),
    /// Function parameter of the emitted code
    Param(Var),
}

/// A dataflow graph laid out on a grid.
///
/// Construction is append-only: nodes and edges are added, never removed.
/// The grid position of a node only matters for rendering; emission order
/// comes from the edges (see [`FlowGraph::emission_order`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    /// Graph name, also the emitted function name
    pub name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    symtable: BTreeMap<String, Symbol>,
    constants: Vec<Constant>,
    params: Vec<Var>,
    /// Extra headers included by the generated file
    pub includes: Vec<String>,
    /// Return type of the emitted function
    pub return_type: String,
    /// Name of the enclosing graph
    pub parent: Option<String>,
    /// Names of the graphs this one dispatches to
    pub subgraphs: Vec<String>,
    row: usize,
    col: usize,
    nrows: usize,
    ncols: usize,
}

impl FlowGraph {
    /// Empty graph returning `void`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            symtable: BTreeMap::new(),
            constants: Vec::new(),
            params: Vec::new(),
            includes: Vec::new(),
            return_type: "void".to_string(),
            parent: None,
            subgraphs: Vec::new(),
            row: 0,
            col: 0,
            nrows: 0,
            ncols: 0,
        }
    }

    /// Register every constant in order.
    pub fn with_constants(mut self, constants: Vec<Constant>) -> Self {
        self.set_constants(constants);
        self
    }

    /// Mark this graph as a stage of `parent`.
    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// True for a graph that is not nested in another.
    pub fn is_parent(&self) -> bool {
        self.parent.is_none()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Edges in insertion order, duplicates included.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Every name the graph defines.
    pub fn symtable(&self) -> &BTreeMap<String, Symbol> {
        &self.symtable
    }

    /// Constants in definition order.
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Parameters of the generated function.
    pub fn params(&self) -> &[Var] {
        &self.params
    }

    /// Layout rows used by the DOT output.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Widest layout row.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Add or replace a constant by name.
    pub fn add_constant(&mut self, constant: Constant) {
        self.symtable
            .insert(constant.name.clone(), Symbol::Constant(constant.clone()));
        self.constants.push(constant);
    }

    /// Replace the constant list.
    pub fn set_constants(&mut self, constants: Vec<Constant>) {
        for old in std::mem::take(&mut self.constants) {
            if matches!(self.symtable.get(&old.name), Some(Symbol::Constant(_))) {
                self.symtable.remove(&old.name);
            }
        }
        for constant in constants {
            self.add_constant(constant);
        }
    }

    /// Constant names in definition order.
    pub fn constant_names(&self) -> Vec<String> {
        self.constants.iter().map(|c| c.name.clone()).collect()
    }

    /// Members of the aggregate built from this graph: temporaries in
    /// insertion order, then constants.
    pub fn struct_members(&self) -> Vec<(String, String)> {
        let mut members = Vec::new();
        for node in &self.nodes {
            if let NodeKind::Temp(data) = &node.kind {
                let ty = if node.is_scalar() {
                    data.ty.clone()
                } else {
                    format!("{}*", data.ty)
                };
                members.push((node.var_name(), ty));
            }
        }
        for constant in &self.constants {
            members.push((constant.name.clone(), constant.ty.clone()));
        }
        members
    }

    /// Append a function parameter and register its symbol.
    pub fn add_param(&mut self, param: Var) {
        self.symtable.insert(param.name.clone(), Symbol::Param(param.clone()));
        self.params.push(param);
    }

    /// Register a function symbol unless the name is already bound.
    pub fn add_function(&mut self, function: Function) {
        self.symtable
            .entry(function.name.clone())
            .or_insert(Symbol::Function(function));
    }

    /// Uninterpreted functions: registered symbols plus every call in a
    /// node domain, with the largest argument count seen.
    pub fn functions(&self) -> Vec<Function> {
        let mut arity: BTreeMap<String, usize> = BTreeMap::new();
        for symbol in self.symtable.values() {
            if let Symbol::Function(f) = symbol {
                let n = arity.entry(f.name.clone()).or_insert(0);
                *n = (*n).max(f.arity());
            }
        }
        for node in &self.nodes {
            for site in function_calls(&node.domain) {
                let n = arity.entry(site.name.clone()).or_insert(0);
                *n = (*n).max(site.arg_list().len());
            }
        }
        arity
            .into_iter()
            .map(|(name, n)| {
                let args: Vec<String> = (0..n.max(1)).map(|_| String::new()).collect();
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                Function::uninterpreted(&name, &args)
            })
            .collect()
    }

    /// Look up any symbol by name.
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symtable.get(name)
    }

    /// Whether `name` is any known symbol.
    pub fn contains(&self, name: &str) -> bool {
        self.symtable.contains_key(name)
    }

    /// Id of the node labelled `label`.
    pub fn node_id(&self, label: &str) -> Option<NodeId> {
        match self.symtable.get(label) {
            Some(Symbol::Node(id)) => Some(*id),
            _ => None,
        }
    }

    /// Node by label.
    pub fn node(&self, label: &str) -> Option<&Node> {
        self.node_id(label).map(|id| &self.nodes[id.0])
    }

    /// Mutable node by label.
    pub fn node_mut(&mut self, label: &str) -> Option<&mut Node> {
        self.node_id(label).map(move |id| &mut self.nodes[id.0])
    }

    /// Node lookup that fails with a lookup error.
    pub fn get(&self, label: &str) -> Result<&Node, LookupError> {
        self.node(label)
            .ok_or_else(|| LookupError::new(label, format!("graph '{}'", self.name)))
    }

    /// Node for an id handed out by this graph.
    pub fn by_id(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Node placed at a grid cell.
    pub fn node_at(&self, row: usize, col: usize) -> Option<&Node> {
        self.nodes.iter().find(|n| n.row == row && n.col == col)
    }

    /// Add a node at the current grid cell and advance the column.
    ///
    /// Calls in the node's domain register uninterpreted functions.
    pub fn add_node(&mut self, mut node: Node) -> PdfgResult<NodeId> {
        if self.node_id(&node.label).is_some() {
            return Err(GraphError::DuplicateLabel {
                label: node.label,
                graph: self.name.clone(),
            }
            .into());
        }

        node.row = self.row;
        node.col = self.col;
        self.col += 1;
        self.ncols = self.ncols.max(self.col);
        self.nrows = self.nrows.max(self.row + 1);

        let id = NodeId(self.nodes.len());
        for site in function_calls(&node.domain) {
            if site.name != node.label {
                let args = site.arg_list();
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                self.add_function(Function::uninterpreted(&site.name, &args));
            }
        }
        log::trace!("Adding {} to '{}' at ({},{})", node, self.name, node.row, node.col);
        self.symtable.insert(node.label.clone(), Symbol::Node(id));
        self.nodes.push(node);
        Ok(id)
    }

    /// Add an edge between two nodes of this graph.
    pub fn add_edge(&mut self, src: &str, dest: &str) -> PdfgResult<()> {
        self.insert_edge(Edge::new(src, dest), None)
    }

    /// Add an edge whose endpoints may also live in `input`.
    pub fn add_edge_with_input(&mut self, src: &str, dest: &str, input: &FlowGraph) -> PdfgResult<()> {
        self.insert_edge(Edge::new(src, dest), Some(input))
    }

    fn insert_edge(&mut self, edge: Edge, input: Option<&FlowGraph>) -> PdfgResult<()> {
        for label in [&edge.src, &edge.dest] {
            let known = self.node_id(label).is_some()
                || input.map(|g| g.node_id(label).is_some()).unwrap_or(false);
            if !known {
                return Err(GraphError::UnknownEndpoint {
                    label: label.clone(),
                    graph: self.name.clone(),
                }
                .into());
            }
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Start a new layout row.
    pub fn newrow(&mut self) {
        self.row += 1;
        self.nrows = self.nrows.max(self.row);
        self.ncols = self.ncols.max(self.col);
        self.col = 0;
    }

    /// Relabel a node, keeping the symbol table and edges consistent.
    pub fn rename(&mut self, old: &str, new: &str) -> PdfgResult<()> {
        let id = self
            .node_id(old)
            .ok_or_else(|| LookupError::new(old, format!("graph '{}'", self.name)))?;
        if old == new {
            return Ok(());
        }
        if self.symtable.contains_key(new) {
            return Err(GraphError::DuplicateLabel {
                label: new.to_string(),
                graph: self.name.clone(),
            }
            .into());
        }

        self.symtable.remove(old);
        self.symtable.insert(new.to_string(), Symbol::Node(id));
        self.nodes[id.0].label = new.to_string();
        for edge in &mut self.edges {
            if edge.src == old {
                edge.src = new.to_string();
            }
            if edge.dest == old {
                edge.dest = new.to_string();
            }
        }
        Ok(())
    }

    /// Labels of the nodes with an edge into `label`.
    pub fn predecessors(&self, label: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.dest == label)
            .map(|e| e.src.as_str())
            .collect()
    }

    /// Targets of outgoing edges, one per edge.
    pub fn successors(&self, label: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.src == label)
            .map(|e| e.dest.as_str())
            .collect()
    }

    /// Node visiting order for emission.
    ///
    /// Topological order of the edges, ties broken by insertion order.
    /// Edges to nodes outside this graph and self loops are ignored. A
    /// cycle is broken at its earliest inserted node.
    pub fn emission_order(&self) -> Vec<NodeId> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in &self.edges {
            if let (Some(s), Some(d)) = (self.node_id(&edge.src), self.node_id(&edge.dest)) {
                if s != d {
                    in_degree[d.0] += 1;
                    succs[s.0].push(d.0);
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while order.len() < n {
            let next = match ready.iter().next().copied() {
                Some(i) => {
                    ready.remove(&i);
                    i
                }
                None => {
                    let Some(i) = (0..n).find(|&i| !visited[i]) else { break };
                    log::warn!(
                        "Cycle in graph '{}', emitting '{}' first",
                        self.name,
                        self.nodes[i].label
                    );
                    i
                }
            };
            if visited[next] {
                continue;
            }
            visited[next] = true;
            order.push(NodeId(next));
            for &succ in &succs[next] {
                in_degree[succ] = in_degree[succ].saturating_sub(1);
                if in_degree[succ] == 0 && !visited[succ] {
                    ready.insert(succ);
                }
            }
        }
        order
    }

    /// Nodes in emission order.
    pub fn ordered_nodes(&self) -> Vec<&Node> {
        self.emission_order().into_iter().map(|id| self.by_id(id)).collect()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rebuild a graph from [`FlowGraph::to_json`] output.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let graph: FlowGraph = serde_json::from_str(json)?;
        for (i, node) in graph.nodes.iter().enumerate() {
            if graph.node_id(&node.label) != Some(NodeId(i)) {
                return Err(GraphError::InvalidObject(format!(
                    "node '{}' is not indexed by the symbol table",
                    node.label
                )));
            }
        }
        Ok(graph)
    }

    /// Write the graph as JSON; the default path is `<name>.json`.
    pub fn to_file(&self, path: Option<&Path>) -> PdfgResult<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(format!("{}.json", self.name)));
        std::fs::write(&path, self.to_json()?)?;
        Ok(path)
    }

    /// Load a graph saved by [`FlowGraph::to_file`].
    pub fn from_file(path: &Path) -> PdfgResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    /// Graphviz rendering, one cluster per layout row.
    ///
    /// Nodes are named by their row-major index.
    pub fn to_dot(&self) -> String {
        let mut ids: BTreeMap<&str, usize> = BTreeMap::new();
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", self.name);
        let _ = writeln!(out, "  graph [forcelabels=true];");

        let mut index = 0;
        for row in 0..self.nrows {
            let mut cells: Vec<&Node> = self.nodes.iter().filter(|n| n.row == row).collect();
            if cells.is_empty() {
                continue;
            }
            cells.sort_by_key(|n| n.col);
            let _ = writeln!(out, "  subgraph cluster{} {{", row);
            let _ = writeln!(out, "    graph [color=white, style=filled];");
            for node in cells {
                ids.insert(node.label.as_str(), index);
                let mut attrs = vec![format!("label=<{}>", dot_label(&node.label))];
                for (key, value) in &node.attrs {
                    if !value.is_empty() {
                        attrs.push(format!("{}=\"{}\"", key, value));
                    }
                }
                attrs.push(format!("xlabel=\"{}\"", node.xlabel().replace('"', "\\\"")));
                let _ = writeln!(out, "    {} [{}];", index, attrs.join(", "));
                index += 1;
            }
            let _ = writeln!(out, "  }}");
        }

        for edge in &self.edges {
            if let (Some(s), Some(d)) = (ids.get(edge.src.as_str()), ids.get(edge.dest.as_str())) {
                let _ = writeln!(out, "  {} -> {};", s, d);
            }
        }
        out.push_str("}\n");
        out
    }

    /// Statement nodes in emission order.
    pub fn statements(&self) -> Vec<&Node> {
        self.ordered_nodes()
            .into_iter()
            .filter(|n| matches!(n.kind, NodeKind::Stmt(_)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemAlloc;

    fn pipeline() -> FlowGraph {
        let mut g = FlowGraph::new("g");
        g.add_node(Node::data("A")).unwrap();
        g.newrow();
        g.add_node(Node::stmt("S")).unwrap();
        g.newrow();
        g.add_node(Node::data("B")).unwrap();
        g.newrow();
        g.add_edge("A", "S").unwrap();
        g.add_edge("S", "B").unwrap();
        g
    }

    #[test]
    fn test_grid_layout() {
        let g = pipeline();
        assert_eq!(g.nrows(), 3);
        assert_eq!(g.ncols(), 1);
        assert_eq!(g.node_at(1, 0).unwrap().label, "S");
        assert!(g.node_at(0, 1).is_none());
    }

    #[test]
    fn test_edge_to_unknown_node_is_rejected() {
        let mut g = pipeline();
        let before = g.edges().len();
        assert!(g.add_edge("A", "missing").is_err());
        assert!(g.add_edge("missing", "S").is_err());
        assert_eq!(g.edges().len(), before);
    }

    #[test]
    fn test_edge_endpoint_in_input_graph() {
        let mut input = FlowGraph::new("insp");
        input.add_node(Node::temp("A_prime")).unwrap();
        let mut g = pipeline();
        g.add_edge_with_input("A_prime", "S", &input).unwrap();
        assert_eq!(g.edges().len(), 3);
        assert!(g.add_edge_with_input("nope", "S", &input).is_err());
    }

    #[test]
    fn test_edges_keep_multiplicity() {
        let mut g = pipeline();
        g.add_edge("A", "S").unwrap();
        assert_eq!(g.predecessors("S"), vec!["A", "A"]);
    }

    #[test]
    fn test_duplicate_label() {
        let mut g = pipeline();
        assert!(g.add_node(Node::data("A")).is_err());
    }

    #[test]
    fn test_domain_registers_functions() {
        let mut g = FlowGraph::new("csr");
        g.add_node(Node::temp("index")).unwrap();
        g.add_node(
            Node::stmt("spmv").with_domain("{[i,j] : 0 <= i < N_R && index(i) <= j < index(i+1) && col(j) >= 0}"),
        )
        .unwrap();
        assert!(matches!(g.symbol("index"), Some(Symbol::Node(_))));
        assert!(matches!(g.symbol("col"), Some(Symbol::Function(_))));
        let names: Vec<String> = g.functions().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["col", "index"]);
    }

    #[test]
    fn test_emission_order_follows_edges() {
        let mut g = FlowGraph::new("g");
        g.add_node(Node::stmt("S")).unwrap();
        g.add_node(Node::data("B")).unwrap();
        g.add_node(Node::data("A")).unwrap();
        g.add_edge("A", "S").unwrap();
        g.add_edge("S", "B").unwrap();
        let labels: Vec<&str> = g.ordered_nodes().iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "S", "B"]);
    }

    #[test]
    fn test_emission_order_breaks_cycles() {
        let mut g = FlowGraph::new("g");
        g.add_node(Node::stmt("S")).unwrap();
        g.add_node(Node::stmt("T")).unwrap();
        g.add_node(Node::data("x")).unwrap();
        g.add_edge("S", "T").unwrap();
        g.add_edge("T", "S").unwrap();
        g.add_edge("S", "S").unwrap();
        let labels: Vec<&str> = g.ordered_nodes().iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["x", "S", "T"]);
    }

    #[test]
    fn test_rename_is_consistent() {
        let mut g = pipeline();
        g.rename("B", "B_cache").unwrap();
        assert!(g.node("B").is_none());
        assert_eq!(g.node("B_cache").unwrap().row, 2);
        assert_eq!(g.successors("S"), vec!["B_cache"]);

        assert!(g.rename("A", "S").is_err());
        assert!(g.node("A").is_some());
        assert!(g.rename("missing", "x").is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut g = pipeline().with_constants(vec![Constant::new("N", "100")]);
        g.add_param(Var::new("path", "", "").with_type("const char*"));
        g.node_mut("B").unwrap().as_data_mut().unwrap().alloc = MemAlloc::Dynamic;
        let json = g.to_json().unwrap();
        let back = FlowGraph::from_json(&json).unwrap();
        assert_eq!(back.nodes(), g.nodes());
        assert_eq!(back.edges(), g.edges());
        assert_eq!(back.constants(), g.constants());
        assert_eq!(back.params()[0].ty, "const char*");
        assert_eq!(back.symtable(), g.symtable());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.json");
        let g = pipeline();
        assert_eq!(g.to_file(Some(&path)).unwrap(), path);
        let back = FlowGraph::from_file(&path).unwrap();
        assert_eq!(back.name, "g");
        assert_eq!(back.edges().len(), 2);
    }

    #[test]
    fn test_dot_clusters() {
        let dot = pipeline().to_dot();
        assert!(dot.starts_with("digraph \"g\" {"));
        assert!(dot.contains("subgraph cluster1 {"));
        assert!(dot.contains("shape=\"invtriangle\""));
        assert!(dot.contains("  0 -> 1;"));
        assert!(dot.contains("  1 -> 2;"));
    }

    #[test]
    fn test_struct_members() {
        let mut g = FlowGraph::new("csr_spmv").with_constants(vec![Constant::new("NNZ", "7")]);
        g.add_node(Node::temp("A").with_size("NNZ")).unwrap();
        g.add_node(Node::temp("nb").with_type("itype")).unwrap();
        g.add_node(Node::data("x").with_size("N")).unwrap();
        assert_eq!(
            g.struct_members(),
            vec![
                ("A".to_string(), "real*".to_string()),
                ("nb".to_string(), "itype".to_string()),
                ("NNZ".to_string(), "int".to_string()),
            ]
        );
    }
}
