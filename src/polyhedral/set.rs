//! Named integer sets and domains.
//!
//! A [`Set`] is an ordered list of [`Var`] constraints plus an optional
//! iterator tuple. Its `size` is the product of the extents of its tuple
//! dimensions and is computed once.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::formula::Formula;
use super::text::{identifiers, paren_if_compound, replace_chars, split_conjuncts};
use super::var::Var;
use crate::utils::errors::ParseError;
use crate::utils::latex::latex_format;

/// A named set of integer points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Set {
    /// Set name (tuple name when rendered)
    pub name: String,
    /// Tuple iterators; empty means "every constrained var is a dimension"
    pub iterators: Vec<String>,
    /// Constraints in source order
    pub vars: Vec<Var>,
    /// Constraints kept verbatim (quantified clauses)
    pub clauses: Vec<String>,
    #[serde(skip)]
    size: OnceCell<String>,
}

impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.iterators == other.iterators
            && self.vars == other.vars
            && self.clauses == other.clauses
    }
}

impl Set {
    /// Create a set from constraints; the tuple is the var names.
    pub fn new(name: &str, vars: Vec<Var>) -> Self {
        let mut iterators: Vec<String> = Vec::new();
        for var in &vars {
            if !iterators.contains(&var.name) {
                iterators.push(var.name.clone());
            }
        }
        Self {
            name: name.to_string(),
            iterators,
            vars,
            clauses: Vec::new(),
            size: OnceCell::new(),
        }
    }

    /// Parse `name := {[i,j] : ...}`, `{[i,j] : ...}` or a bare constraint list.
    ///
    /// Single-sided constraints on the same name are merged into one var.
    pub fn from_expr(text: &str) -> Result<Self, ParseError> {
        let (name, body) = match text.find(":=") {
            Some(pos) => (text[..pos].trim().to_string(), text[pos + 2..].trim()),
            None => (String::new(), text.trim()),
        };

        let (tuple_name, iterators, conditions) = if Formula::is_formula(body) {
            let formula = Formula::parse(body)?;
            (formula.name.clone(), formula.input.clone(), formula.conditions)
        } else {
            let conds = match body.find(':') {
                Some(pos) => &body[pos + 1..],
                None => body,
            };
            (String::new(), Vec::new(), split_conjuncts(conds))
        };

        let mut vars: Vec<Var> = Vec::new();
        let mut clauses = Vec::new();
        for cond in conditions {
            if cond.trim_start().starts_with("exists") {
                clauses.push(cond);
                continue;
            }
            let var = Var::from_expression(&cond)?;
            if !vars.iter_mut().any(|v| v.merge(&var)) {
                vars.push(var);
            }
        }

        let name = if name.is_empty() { tuple_name } else { name };
        Ok(Self {
            name,
            iterators,
            vars,
            clauses,
            size: OnceCell::new(),
        })
    }

    /// Vars that span a dimension of the set.
    pub fn dimensions(&self) -> Vec<&Var> {
        if self.iterators.is_empty() {
            return self.vars.iter().collect();
        }
        self.iterators
            .iter()
            .filter_map(|it| self.vars.iter().find(|v| &v.name == it && v.bounded()))
            .collect()
    }

    /// Element count expression, memoized.
    ///
    /// Each dimension contributes `upper-lower`, plus one when the upper
    /// bound is inclusive. A zero lower bound is omitted. Compound bounds
    /// are parenthesised.
    pub fn size(&self) -> &str {
        self.size.get_or_init(|| {
            let extents: Vec<String> = self
                .dimensions()
                .into_iter()
                .filter(|v| v.bounded() && !v.is_fixed())
                .map(extent)
                .collect();
            if extents.is_empty() {
                "1".to_string()
            } else {
                extents.join("*")
            }
        })
    }

    /// Extent of each tuple dimension, outermost first.
    pub fn extents(&self) -> Vec<String> {
        self.dimensions()
            .into_iter()
            .map(|v| if v.is_fixed() { "1".to_string() } else { extent(v) })
            .collect()
    }

    /// Names of the tuple dimensions.
    pub fn tuple(&self) -> Vec<String> {
        if self.iterators.is_empty() {
            let mut names: Vec<String> = Vec::new();
            for var in &self.vars {
                if !names.contains(&var.name) {
                    names.push(var.name.clone());
                }
            }
            names
        } else {
            self.iterators.clone()
        }
    }

    /// Constraint list in solver syntax.
    pub fn constraint_text(&self, conj: &str) -> String {
        self.vars
            .iter()
            .map(|v| v.to_string())
            .chain(self.clauses.iter().cloned())
            .collect::<Vec<_>>()
            .join(conj)
    }

    /// The set as a braced formula.
    pub fn to_formula(&self) -> Formula {
        let mut formula = Formula::set(&[], &[]);
        formula.name = self.name.clone();
        formula.input = self.tuple();
        formula.conditions = self
            .vars
            .iter()
            .map(|v| v.to_string())
            .chain(self.clauses.iter().cloned())
            .collect();
        formula
    }

    /// LaTeX rendering.
    pub fn latex(&self) -> String {
        let vars = self.vars.iter().map(|v| v.latex()).collect::<Vec<_>>();
        format!(
            "{}[{}]\\;|\\;{}",
            latex_format(&self.name),
            self.tuple().join(","),
            vars.join(" \\wedge ")
        )
    }
}

fn extent(var: &Var) -> String {
    let offset = !var.lower.is_empty() && var.lower != "0";
    if var.tightup && !offset {
        if let Some(folded) = fold_increment(&var.upper) {
            return folded;
        }
    }
    let mut size = paren_if_compound(&var.upper);
    if offset {
        size = format!("{}-{}", size, paren_if_compound(&var.lower));
    }
    if var.tightup {
        format!("({}+1)", size)
    } else if offset {
        format!("({})", size)
    } else {
        size
    }
}

/// `X+k` plus one as `(X+(k+1))`, for a plain identifier `X`.
fn fold_increment(upper: &str) -> Option<String> {
    let (base, k) = upper.rsplit_once('+')?;
    let base = base.trim();
    let k: i64 = k.trim().parse().ok()?;
    if !base.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') || base.is_empty() {
        return None;
    }
    Some(format!("({}+{})", base, k + 1))
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] : {}", self.name, self.tuple().join(","), self.constraint_text(" and "))
    }
}

/// Symbolic parameters of a group of sets.
///
/// Every identifier in a bound that is not a tuple iterator is a parameter;
/// uninterpreted calls become their solver-safe mangled name.
pub fn list_vars(sets: &[Set]) -> Vec<String> {
    let mut params: Vec<String> = Vec::new();
    let mut push = |p: String| {
        if !params.contains(&p) {
            params.push(p);
        }
    };
    for set in sets {
        let tuple = set.tuple();
        for var in &set.vars {
            for bound in [&var.lower, &var.upper] {
                for site in super::text::call_sites(bound, None) {
                    push(format!("{}_{}_", site.name, replace_chars(&site.args)));
                }
                let stripped = strip_calls(bound);
                for (ident, is_call) in identifiers(&stripped) {
                    if !is_call && !tuple.contains(&ident) {
                        push(ident);
                    }
                }
            }
        }
    }
    params
}

fn strip_calls(s: &str) -> String {
    let mut out = s.to_string();
    for site in super::text::call_sites(s, None).into_iter().rev() {
        out.replace_range(site.start..site.end, "0");
    }
    out
}

/// A named union of sets sharing one parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Domain name
    pub name: String,
    /// Member sets
    pub sets: Vec<Set>,
    /// Explicit parameters; derived from the sets when empty
    pub params: Vec<String>,
}

impl Domain {
    /// Union of `sets` named `name`.
    pub fn new(name: &str, sets: Vec<Set>) -> Self {
        Self {
            name: name.to_string(),
            sets,
            params: Vec::new(),
        }
    }

    /// Declare symbolic parameters.
    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Parameter list used when rendering.
    pub fn parameters(&self) -> Vec<String> {
        if self.params.is_empty() {
            list_vars(&self.sets)
        } else {
            self.params.clone()
        }
    }

    /// LaTeX rendering.
    pub fn latex(&self) -> String {
        let sets = self.sets.iter().map(|s| s.latex()).collect::<Vec<_>>();
        format!("{} &= \\{{ {} \\}}", latex_format(&self.name), sets.join(" \\cup "))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sets = self.sets.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        write!(
            f,
            "{} := [{}] -> {{ {} }};",
            self.name,
            self.parameters().join(","),
            sets.join(";\n")
        )
    }
}
