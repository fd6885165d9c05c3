//! Flow graph nodes.
//!
//! A [`Node`] carries what every node kind shares (label, domain, grid
//! position, rendering attributes); what differs lives in [`NodeKind`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::polyhedral::{Formula, Set};

/// Index of a node within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// How the storage behind a data node is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MemAlloc {
    /// Not declared (provided by the caller)
    None,
    /// Stack array filled with the default value
    #[default]
    Auto,
    /// Static array
    Static,
    /// Zeroed heap allocation
    Dynamic,
    /// Member of the struct passed as first parameter
    Struct,
}

/// A computation over an iteration domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StmtNode {
    /// Source statements, in order
    pub statements: Vec<String>,
    /// Guard wrapped around the statements
    pub condition: String,
    /// Domain of the statement's result
    pub datamap: String,
    /// Read accesses, duplicates and order preserved
    pub reads: Vec<String>,
    /// Write accesses
    pub writes: Vec<String>,
}

/// Storage for values over a data domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataNode {
    /// Value domain (informational)
    pub range: String,
    /// Element count expression
    pub size: String,
    /// Element type
    pub ty: String,
    /// Initial value
    pub defval: String,
    /// Allocation strategy
    pub alloc: MemAlloc,
}

impl Default for DataNode {
    fn default() -> Self {
        Self {
            range: "R".to_string(),
            size: "1".to_string(),
            ty: "real".to_string(),
            defval: "0".to_string(),
            alloc: MemAlloc::Auto,
        }
    }
}

/// An aggregate of data members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructNode {
    /// Storage of the struct pointer itself
    pub data: DataNode,
    /// Member names and types, in declaration order
    pub members: Vec<(String, String)>,
}

impl StructNode {
    /// Suffix appended to the label to name the struct type.
    pub const SUFFIX: &'static str = "_data_t";
}

/// An abstract index mapping step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterNode {
    /// The mapping relation
    pub relation: String,
}

/// Node variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Computation over a domain
    Stmt(StmtNode),
    /// Array or scalar
    Data(DataNode),
    /// Intermediate data promoted into the struct being built
    Temp(DataNode),
    /// Struct bundling a data format
    Struct(StructNode),
    /// Relation between iteration spaces
    Iter(IterNode),
}

/// A flow graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique key within a graph
    pub label: String,
    /// Rendering alias
    pub name: String,
    /// Iteration domain or data extent
    pub domain: String,
    /// Layout row
    pub row: usize,
    /// Layout column
    pub col: usize,
    /// Rendering attributes (shape, color, ...)
    pub attrs: BTreeMap<String, String>,
    /// Kind-specific payload
    pub kind: NodeKind,
}

impl Node {
    fn with_kind(label: &str, kind: NodeKind, shape: &str, color: &str) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("shape".to_string(), shape.to_string());
        attrs.insert("color".to_string(), color.to_string());
        Self {
            label: label.to_string(),
            name: String::new(),
            domain: String::new(),
            row: 0,
            col: 0,
            attrs,
            kind,
        }
    }

    /// Statement node.
    pub fn stmt(label: &str) -> Self {
        Self::with_kind(label, NodeKind::Stmt(StmtNode::default()), "invtriangle", "white")
    }

    /// Data node, stack allocated unless told otherwise.
    pub fn data(label: &str) -> Self {
        Self::with_kind(label, NodeKind::Data(DataNode::default()), "box", "gray")
    }

    /// Temporary data, always heap allocated.
    pub fn temp(label: &str) -> Self {
        let data = DataNode {
            alloc: MemAlloc::Dynamic,
            ..DataNode::default()
        };
        Self::with_kind(label, NodeKind::Temp(data), "box", "white")
    }

    /// Struct node with `(member, type)` pairs.
    pub fn structure(label: &str, members: Vec<(String, String)>) -> Self {
        let node = StructNode {
            data: DataNode::default(),
            members,
        };
        Self::with_kind(label, NodeKind::Struct(node), "box", "gray")
    }

    /// Iterator node carrying a relation.
    pub fn iter(label: &str) -> Self {
        Self::with_kind(label, NodeKind::Iter(IterNode::default()), "oval", "white")
    }

    /// Set the domain; data nodes recompute their size from a set domain.
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.set_domain(domain);
        self
    }

    /// Replace the domain; data sizes follow set domains.
    pub fn set_domain(&mut self, domain: &str) {
        self.domain = domain.to_string();
        if !Formula::is_formula(domain) {
            return;
        }
        if let Some(data) = self.as_data_mut() {
            match Set::from_expr(domain) {
                Ok(set) => data.size = set.size().to_string(),
                Err(e) => log::warn!("Keeping size '{}' for domain '{}': {}", data.size, domain, e),
            }
        }
    }

    /// Element count of a data node.
    pub fn with_size(mut self, size: &str) -> Self {
        if let Some(data) = self.as_data_mut() {
            data.size = size.to_string();
        }
        self
    }

    /// Element type of a data node.
    pub fn with_type(mut self, ty: &str) -> Self {
        if let Some(data) = self.as_data_mut() {
            data.ty = ty.to_string();
        }
        self
    }

    /// Set of values a data node may hold.
    pub fn with_range(mut self, range: &str) -> Self {
        if let Some(data) = self.as_data_mut() {
            data.range = range.to_string();
        }
        self
    }

    /// Initial value of a data node.
    pub fn with_defval(mut self, defval: &str) -> Self {
        if let Some(data) = self.as_data_mut() {
            data.defval = defval.to_string();
        }
        self
    }

    /// How a data node is declared.
    pub fn with_alloc(mut self, alloc: MemAlloc) -> Self {
        if let Some(data) = self.as_data_mut() {
            data.alloc = alloc;
        }
        self
    }

    /// Statement bodies, emitted in order.
    pub fn with_statements(mut self, statements: &[&str]) -> Self {
        if let NodeKind::Stmt(stmt) = &mut self.kind {
            stmt.statements = statements.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    /// Guard wrapped around the statement body.
    pub fn with_condition(mut self, condition: &str) -> Self {
        if let NodeKind::Stmt(stmt) = &mut self.kind {
            stmt.condition = condition.to_string();
        }
        self
    }

    /// Data space the statement writes.
    pub fn with_datamap(mut self, datamap: &str) -> Self {
        if let NodeKind::Stmt(stmt) = &mut self.kind {
            stmt.datamap = datamap.to_string();
        }
        self
    }

    /// Accesses the statement reads.
    pub fn with_reads(mut self, reads: &[&str]) -> Self {
        if let NodeKind::Stmt(stmt) = &mut self.kind {
            stmt.reads = reads.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    /// Accesses the statement writes.
    pub fn with_writes(mut self, writes: &[&str]) -> Self {
        if let NodeKind::Stmt(stmt) = &mut self.kind {
            stmt.writes = writes.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    /// Relation of an iterator node.
    pub fn with_relation(mut self, relation: &str) -> Self {
        if let NodeKind::Iter(iter) = &mut self.kind {
            iter.relation = relation.to_string();
        }
        self
    }

    /// Statement payload, if any.
    pub fn as_stmt(&self) -> Option<&StmtNode> {
        match &self.kind {
            NodeKind::Stmt(stmt) => Some(stmt),
            _ => None,
        }
    }

    /// Mutable statement payload, if any.
    pub fn as_stmt_mut(&mut self) -> Option<&mut StmtNode> {
        match &mut self.kind {
            NodeKind::Stmt(stmt) => Some(stmt),
            _ => None,
        }
    }

    /// Storage description of data, temp and struct nodes.
    pub fn as_data(&self) -> Option<&DataNode> {
        match &self.kind {
            NodeKind::Data(data) | NodeKind::Temp(data) => Some(data),
            NodeKind::Struct(s) => Some(&s.data),
            _ => None,
        }
    }

    /// Mutable data payload, if any.
    pub fn as_data_mut(&mut self) -> Option<&mut DataNode> {
        match &mut self.kind {
            NodeKind::Data(data) | NodeKind::Temp(data) => Some(data),
            NodeKind::Struct(s) => Some(&mut s.data),
            _ => None,
        }
    }

    /// Whether this is a statement node.
    pub fn is_stmt(&self) -> bool {
        matches!(self.kind, NodeKind::Stmt(_))
    }

    /// Single-element data; structs never are.
    pub fn is_scalar(&self) -> bool {
        match &self.kind {
            NodeKind::Data(data) | NodeKind::Temp(data) => {
                data.size.trim().parse::<i64>().map(|n| n == 1).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Statement label, empty for non-statement nodes.
    pub fn statement(&self) -> &str {
        if self.is_stmt() {
            &self.label
        } else {
            ""
        }
    }

    /// C identifier for the label (`A'` becomes `A_prime`).
    pub fn var_name(&self) -> String {
        self.label.replace('\'', "_prime")
    }

    /// Short kind name, used in messages.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Stmt(_) => "StmtNode",
            NodeKind::Data(_) => "DataNode",
            NodeKind::Temp(_) => "TempNode",
            NodeKind::Struct(_) => "StructNode",
            NodeKind::Iter(_) => "IterNode",
        }
    }

    /// DOT caption listing the node's domain and contents.
    pub fn xlabel(&self) -> String {
        match &self.kind {
            NodeKind::Stmt(stmt) => {
                let mut label = format!(
                    "\\lDomain: {}\\lStatements: {}\\l",
                    self.domain,
                    stmt.statements.join(";\\l")
                );
                if !stmt.reads.is_empty() {
                    label.push_str(&format!("Reads: {}\\l", stmt.reads.join(", ")));
                }
                if !stmt.writes.is_empty() {
                    label.push_str(&format!("Writes: {}\\l", stmt.writes.join(", ")));
                }
                label
            }
            NodeKind::Data(data) | NodeKind::Temp(data) => data_xlabel(&self.domain, data),
            NodeKind::Struct(s) => data_xlabel(&self.domain, &s.data),
            NodeKind::Iter(iter) => format!("Relation: {}\\l", iter.relation),
        }
    }
}

fn data_xlabel(domain: &str, data: &DataNode) -> String {
    let range = if data.range == "R" { "|R" } else { data.range.as_str() };
    format!("Domain: {}\\lRange: {}\\lSize: {}\\l", domain, range, data.size)
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind_name(), self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_defaults() {
        let node = Node::data("x");
        let data = node.as_data().unwrap();
        assert_eq!(data.range, "R");
        assert_eq!(data.ty, "real");
        assert_eq!(data.alloc, MemAlloc::Auto);
        assert!(node.is_scalar());
        assert_eq!(node.attrs["shape"], "box");
    }

    #[test]
    fn test_temp_is_dynamic() {
        let node = Node::temp("bset").with_size("N_R/R*N_C/C");
        assert_eq!(node.as_data().unwrap().alloc, MemAlloc::Dynamic);
        assert!(!node.is_scalar());
    }

    #[test]
    fn test_struct_never_scalar() {
        let node = Node::structure("csr", vec![("N_R".into(), "int".into())]).with_size("1");
        assert!(!node.is_scalar());
        assert_eq!(node.as_data().unwrap().size, "1");
    }

    #[test]
    fn test_domain_sets_size() {
        let node = Node::data("A").with_domain("{[i] : 0 <= i < N}");
        assert_eq!(node.as_data().unwrap().size, "N");

        let interval = Node::temp("b_index").with_size("N_R/R+1").with_domain("[0,N_R/R]");
        assert_eq!(interval.as_data().unwrap().size, "N_R/R+1");
    }

    #[test]
    fn test_stmt_builders_ignore_other_kinds() {
        let node = Node::data("y").with_statements(&["y[i] = 0"]);
        assert!(node.as_stmt().is_none());

        let stmt = Node::stmt("spmv").with_reads(&["A[j]", "x[col[j]]"]).with_writes(&["y[i]"]);
        assert_eq!(stmt.statement(), "spmv");
        assert_eq!(stmt.as_stmt().unwrap().reads.len(), 2);
    }

    #[test]
    fn test_var_name_and_display() {
        let node = Node::data("A'");
        assert_eq!(node.var_name(), "A_prime");
        assert_eq!(node.to_string(), "DataNode(A')");
    }

    #[test]
    fn test_xlabel() {
        let node = Node::data("x").with_domain("{[k] : 0 <= k < N_C}");
        assert_eq!(node.xlabel(), "Domain: {[k] : 0 <= k < N_C}\\lRange: |R\\lSize: N_C\\l");
    }
}
