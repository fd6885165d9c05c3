//! Schedule trees.
//!
//! A schedule tree orders the instances of a program's statements: the
//! root domain names the instances, bands map them to time, and sequence
//! or set nodes split them by filter. Trees are read from the block
//! `key: value` layout solvers dump them in:
//!
//! ```text
//! domain: "{ S[i] : 0 <= i < N; T[i] : 0 <= i < N }"
//! child:
//!   sequence:
//!   - filter: "{ S[i] }"
//!   - filter: "{ T[i] }"
//! ```
//!
//! Nesting follows indentation. Files without indentation nest every
//! node under the previous one.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::errors::{PdfgResult, ScheduleError, ScheduleErrorKind};

/// Index of a node in its tree.
pub type ScheduleNodeId = usize;

/// What a schedule node does with the instances reaching it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleKind {
    /// Instances scheduled by the tree
    Domain(String),
    /// Constraints on the parameters
    Context(String),
    /// Restricts the instances reaching the subtree
    Filter(String),
    /// Condition the generated code may rely on
    Guard(String),
    /// Expands instances into groups
    Expansion(String),
    /// Adds instances not in the domain
    Extension(String),
    /// Children run in order
    Sequence,
    /// Children run in any order
    Set,
    /// Multi-dimensional affine schedule
    Band {
        /// Partial schedule, e.g. `[{ S[i,j] -> [(i)] }]`
        schedule: String,
        /// Whether the band members may be permuted
        permutable: bool,
        /// Per member, whether it carries no dependence
        coincident: Vec<bool>,
        /// AST build options
        options: String,
    },
    /// Named annotation
    Mark {
        /// The key it was read from
        name: String,
        /// Its value
        value: String,
    },
    /// End of a branch
    Leaf,
}

impl ScheduleKind {
    /// Band with only a partial schedule.
    pub fn band(schedule: impl Into<String>) -> Self {
        ScheduleKind::Band {
            schedule: schedule.into(),
            permutable: false,
            coincident: Vec::new(),
            options: String::new(),
        }
    }

    /// The key this kind is written under.
    pub fn key(&self) -> &str {
        match self {
            ScheduleKind::Domain(_) => "domain",
            ScheduleKind::Context(_) => "context",
            ScheduleKind::Filter(_) => "filter",
            ScheduleKind::Guard(_) => "guard",
            ScheduleKind::Expansion(_) => "expansion",
            ScheduleKind::Extension(_) => "extension",
            ScheduleKind::Sequence => "sequence",
            ScheduleKind::Set => "set",
            ScheduleKind::Band { .. } => "schedule",
            ScheduleKind::Mark { name, .. } => name.as_str(),
            ScheduleKind::Leaf => "leaf",
        }
    }

    /// Maximum number of children; `None` is unbounded.
    pub fn child_limit(&self) -> Option<usize> {
        match self {
            ScheduleKind::Sequence | ScheduleKind::Set => None,
            ScheduleKind::Leaf => Some(0),
            _ => Some(1),
        }
    }

    fn value(&self) -> Option<&str> {
        match self {
            ScheduleKind::Domain(v)
            | ScheduleKind::Context(v)
            | ScheduleKind::Filter(v)
            | ScheduleKind::Guard(v)
            | ScheduleKind::Expansion(v)
            | ScheduleKind::Extension(v) => Some(v),
            ScheduleKind::Band { schedule, .. } => Some(schedule),
            ScheduleKind::Mark { value, .. } => Some(value),
            ScheduleKind::Sequence | ScheduleKind::Set | ScheduleKind::Leaf => None,
        }
    }

    fn from_key(key: &str, value: &str) -> Self {
        let value = value.to_string();
        match key {
            "domain" => ScheduleKind::Domain(value),
            "context" => ScheduleKind::Context(value),
            "filter" => ScheduleKind::Filter(value),
            "guard" => ScheduleKind::Guard(value),
            "expansion" => ScheduleKind::Expansion(value),
            "extension" => ScheduleKind::Extension(value),
            "sequence" => ScheduleKind::Sequence,
            "set" => ScheduleKind::Set,
            "leaf" => ScheduleKind::Leaf,
            "schedule" => ScheduleKind::band(value),
            _ => ScheduleKind::Mark {
                name: key.to_string(),
                value,
            },
        }
    }
}

/// A node and its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleNode {
    /// What the node does
    pub kind: ScheduleKind,
    /// Enclosing node, `None` for the root
    pub parent: Option<ScheduleNodeId>,
    /// Nested nodes, in order
    pub children: Vec<ScheduleNodeId>,
}

/// Arena of schedule nodes; the first node is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTree {
    /// Tree name, the file stem when read from disk
    pub name: String,
    nodes: Vec<ScheduleNode>,
}

impl ScheduleTree {
    /// Empty tree.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// First node added.
    pub fn root(&self) -> Option<&ScheduleNode> {
        self.nodes.first()
    }

    /// Node by id.
    pub fn get(&self, id: ScheduleNodeId) -> Option<&ScheduleNode> {
        self.nodes.get(id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `id`, in insertion order.
    pub fn children(&self, id: ScheduleNodeId) -> impl Iterator<Item = &ScheduleNode> {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |c| self.nodes.get(*c))
    }

    /// Add a node under `parent`, or the root when `parent` is `None`.
    pub fn add(
        &mut self,
        parent: Option<ScheduleNodeId>,
        kind: ScheduleKind,
    ) -> Result<ScheduleNodeId, ScheduleError> {
        let id = self.nodes.len();
        match parent {
            None if !self.nodes.is_empty() => {
                return Err(ScheduleError::new(
                    ScheduleErrorKind::Syntax,
                    format!("Schedule tree '{}' already has a root", self.name),
                ));
            }
            None => {}
            Some(p) => {
                let node = self.nodes.get_mut(p).ok_or_else(|| {
                    ScheduleError::new(ScheduleErrorKind::Syntax, format!("No schedule node {}", p))
                })?;
                if let Some(max) = node.kind.child_limit() {
                    if node.children.len() >= max {
                        return Err(ScheduleError::new(
                            ScheduleErrorKind::ChildLimit,
                            format!(
                                "Node type {} has {} children but cannot exceed {}",
                                node.kind.key(),
                                node.children.len() + 1,
                                max
                            ),
                        ));
                    }
                }
                node.children.push(id);
            }
        }
        self.nodes.push(ScheduleNode {
            kind,
            parent,
            children: Vec::new(),
        });
        Ok(id)
    }

    /// Read a tree from `key: value` lines.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, ScheduleError> {
        let mut tree = Self::new(name);
        // (key column, node) of the open nodes, outermost first
        let mut open: Vec<(usize, ScheduleNodeId)> = Vec::new();

        for (n, raw) in text.lines().enumerate() {
            let trimmed = raw.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut column = raw.len() - trimmed.len();
            let mut line = trimmed;
            if let Some(item) = line.strip_prefix('-') {
                let item_trimmed = item.trim_start();
                column += line.len() - item_trimmed.len();
                line = item_trimmed;
                if line.is_empty() {
                    continue;
                }
            }

            let (key, value) = line.split_once(':').ok_or_else(|| {
                ScheduleError::new(
                    ScheduleErrorKind::Syntax,
                    format!("Line {}: expected 'key: value', found '{}'", n + 1, line),
                )
            })?;
            let key = key.trim();
            let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();

            match key {
                "child" => {}
                "permutable" | "coincident" | "options" => {
                    while open.last().map_or(false, |(c, _)| *c > column) {
                        open.pop();
                    }
                    let band = open.last().map(|(_, id)| *id).or_else(|| tree.len().checked_sub(1));
                    match band.and_then(|id| tree.nodes.get_mut(id)).map(|n| &mut n.kind) {
                        Some(ScheduleKind::Band {
                            permutable,
                            coincident,
                            options,
                            ..
                        }) => match key {
                            "permutable" => *permutable = flag(value),
                            "coincident" => {
                                *coincident = value
                                    .trim_matches(|c: char| c == '[' || c == ']')
                                    .split(',')
                                    .map(str::trim)
                                    .filter(|v| !v.is_empty())
                                    .map(flag)
                                    .collect()
                            }
                            _ => *options = value.to_string(),
                        },
                        _ => {
                            return Err(ScheduleError::new(
                                ScheduleErrorKind::Syntax,
                                format!("Line {}: '{}' outside a band", n + 1, key),
                            ))
                        }
                    }
                }
                _ => {
                    while open.last().map_or(false, |(c, _)| *c >= column) {
                        open.pop();
                    }
                    let parent = match open.last() {
                        Some((_, id)) => Some(*id),
                        None => tree.len().checked_sub(1),
                    };
                    let id = tree.add(parent, ScheduleKind::from_key(key, value))?;
                    open.push((column, id));
                }
            }
        }
        log::debug!("Read schedule tree '{}' with {} nodes", tree.name, tree.len());
        Ok(tree)
    }

    /// Read a tree from a file, named after the file stem.
    pub fn from_file(path: &Path) -> PdfgResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::parse(name, &text)?)
    }

    fn render(&self, id: ScheduleNodeId, column: usize, item: bool, out: &mut Vec<String>) {
        let node = match self.nodes.get(id) {
            Some(node) => node,
            None => return,
        };
        let pad = " ".repeat(column);
        let lead = if item {
            format!("{}- ", " ".repeat(column.saturating_sub(2)))
        } else {
            pad.clone()
        };
        match node.kind.value() {
            Some(value) => out.push(format!("{}{}: \"{}\"", lead, node.kind.key(), value)),
            None => out.push(format!("{}{}:", lead, node.kind.key())),
        }
        if let ScheduleKind::Band {
            permutable,
            coincident,
            options,
            ..
        } = &node.kind
        {
            if *permutable {
                out.push(format!("{}permutable: 1", pad));
            }
            if !coincident.is_empty() {
                let flags: Vec<&str> = coincident.iter().map(|c| if *c { "1" } else { "0" }).collect();
                out.push(format!("{}coincident: [ {} ]", pad, flags.join(", ")));
            }
            if !options.is_empty() {
                out.push(format!("{}options: \"{}\"", pad, options));
            }
        }

        match node.kind {
            ScheduleKind::Sequence | ScheduleKind::Set => {
                for child in &node.children {
                    self.render(*child, column + 2, true, out);
                }
            }
            _ => {
                for child in &node.children {
                    out.push(format!("{}child:", pad));
                    self.render(*child, column + 2, false, out);
                }
            }
        }
    }
}

fn flag(value: &str) -> bool {
    matches!(value, "1" | "true")
}

impl fmt::Display for ScheduleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if !self.nodes.is_empty() {
            self.render(0, 0, false, &mut lines);
        }
        for line in lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FUSED: &str = r#"# jacobi with copy-back
domain: "[N] -> { S[t,i] : 1 <= i <= N; C[t,i] : 1 <= i <= N }"
child:
  context: "[N] -> { : N > 0 }"
  child:
    schedule: "[{ S[t,i] -> [(t)]; C[t,i] -> [(t)] }]"
    permutable: 1
    coincident: [ 0 ]
    child:
      sequence:
      - filter: "{ S[t,i] }"
        child:
          schedule: "[{ S[t,i] -> [(i)] }]"
          coincident: [ 1 ]
      - filter: "{ C[t,i] }"
      - filter: "{}"
"#;

    #[test]
    fn test_parse_nested() {
        let tree = ScheduleTree::parse("fused", FUSED).unwrap();
        assert_eq!(tree.len(), 8);
        let root = tree.root().unwrap();
        assert_eq!(
            root.kind,
            ScheduleKind::Domain("[N] -> { S[t,i] : 1 <= i <= N; C[t,i] : 1 <= i <= N }".into())
        );
        assert!(matches!(tree.get(1).unwrap().kind, ScheduleKind::Context(_)));

        match &tree.get(2).unwrap().kind {
            ScheduleKind::Band { permutable, coincident, .. } => {
                assert!(*permutable);
                assert_eq!(coincident, &vec![false]);
            }
            other => panic!("expected band, found {:?}", other),
        }

        let filters: Vec<&ScheduleKind> = tree.children(3).map(|n| &n.kind).collect();
        assert_eq!(
            filters,
            vec![
                &ScheduleKind::Filter("{ S[t,i] }".into()),
                &ScheduleKind::Filter("{ C[t,i] }".into()),
                &ScheduleKind::Filter("{}".into()),
            ]
        );
        let inner = tree.children(4).next().unwrap();
        assert_eq!(inner.parent, Some(4));
        assert!(matches!(&inner.kind, ScheduleKind::Band { coincident, .. } if coincident == &vec![true]));
    }

    #[test]
    fn test_flat_lines_chain() {
        let tree = ScheduleTree::parse("flat", "domain: {S[i]}\nschedule: '[{S[i]->[(i)]}]'\nunroll: 4\n").unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(1).unwrap().parent, Some(0));
        assert_eq!(tree.get(1).unwrap().kind, ScheduleKind::band("[{S[i]->[(i)]}]"));
        assert_eq!(
            tree.get(2).unwrap().kind,
            ScheduleKind::Mark {
                name: "unroll".into(),
                value: "4".into()
            }
        );
    }

    #[test]
    fn test_child_limit() {
        let mut tree = ScheduleTree::new("t");
        let root = tree.add(None, ScheduleKind::Domain("{S[i]}".into())).unwrap();
        tree.add(Some(root), ScheduleKind::Sequence).unwrap();
        let err = tree.add(Some(root), ScheduleKind::Set).unwrap_err();
        assert_eq!(err.kind, ScheduleErrorKind::ChildLimit);
        assert_eq!(err.message, "Node type domain has 2 children but cannot exceed 1");

        let leaf = tree.add(Some(1), ScheduleKind::Leaf).unwrap();
        assert!(tree.add(Some(leaf), ScheduleKind::Leaf).is_err());
        for _ in 0..10 {
            tree.add(Some(1), ScheduleKind::Filter("{}".into())).unwrap();
        }
        assert_eq!(tree.children(1).count(), 11);
    }

    #[test]
    fn test_parse_rejects_second_child() {
        let text = "domain: \"{S[i]}\"\nchild:\n  filter: \"{S[i]}\"\n  guard: \"{:}\"\n";
        let err = ScheduleTree::parse("t", text).unwrap_err();
        assert_eq!(err.kind, ScheduleErrorKind::ChildLimit);
    }

    #[test]
    fn test_parse_errors() {
        let err = ScheduleTree::parse("t", "domain: \"{S[i]}\"\nnot a pair\n").unwrap_err();
        assert_eq!(err.kind, ScheduleErrorKind::Syntax);
        assert!(err.message.starts_with("Line 2"));

        let err = ScheduleTree::parse("t", "domain: \"{S[i]}\"\npermutable: 1\n").unwrap_err();
        assert!(err.message.contains("outside a band"));
    }

    #[test]
    fn test_display_reads_back() {
        let tree = ScheduleTree::parse("fused", FUSED).unwrap();
        let text = tree.to_string();
        assert!(text.starts_with("domain: \"[N] -> {"));
        assert!(text.contains("\n      sequence:\n      - filter: \"{ S[t,i] }\"\n"));
        assert_eq!(ScheduleTree::parse("fused", &text).unwrap(), tree);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jacobi.sched");
        std::fs::write(&path, FUSED).unwrap();
        let tree = ScheduleTree::from_file(&path).unwrap();
        assert_eq!(tree.name, "jacobi");
        assert_eq!(tree.len(), 8);
    }
}
