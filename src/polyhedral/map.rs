//! Named symbolic mappings.
//!
//! A [`Function`] is either an uninterpreted, data-dependent function such
//! as `index(i)` (no sets, just a name and an argument list) or a
//! transformation mapping each of its sets onto an output tuple.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::set::{list_vars, Set};
use super::text::{call_sites, is_identifier};
use crate::utils::errors::{ParseError, ParseErrorKind};
use crate::utils::latex::latex_format;

/// A named mapping from sets to output tuples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Argument list of an uninterpreted function
    pub args: Vec<String>,
    /// Source sets of a transformation
    pub sets: Vec<Set>,
    /// Output tuple per source set
    pub images: Vec<Vec<String>>,
}

impl Function {
    /// An uninterpreted function with the given arguments.
    pub fn uninterpreted(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            sets: Vec::new(),
            images: Vec::new(),
        }
    }

    /// A transformation applying one mapping to every set.
    pub fn mapping(name: &str, sets: Vec<Set>, mapping: Vec<String>) -> Self {
        let images = sets.iter().map(|_| mapping.clone()).collect();
        Self {
            name: name.to_string(),
            args: Vec::new(),
            sets,
            images,
        }
    }

    /// The identity schedule of a set.
    pub fn identity(name: &str, set: Set) -> Self {
        let tuple = set.tuple();
        Self::mapping(name, vec![set], tuple)
    }

    /// Parse `name(a,b)` or a bare name.
    pub fn from_expr(text: &str) -> Result<Self, ParseError> {
        let text = text.trim();
        if is_identifier(text) {
            return Ok(Self::uninterpreted(text, &[]));
        }
        match call_sites(text, None).first() {
            Some(site) if site.start == 0 && site.end == text.len() => {
                let args = site.arg_list();
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                Ok(Self::uninterpreted(&site.name, &args))
            }
            _ => Err(ParseError::new(
                ParseErrorKind::Syntax,
                format!("Expected a function call, found '{}'", text),
            )),
        }
    }

    /// True when this is an uninterpreted function rather than a mapping.
    pub fn is_uninterpreted(&self) -> bool {
        self.sets.is_empty()
    }

    /// Declared arity (at least one for uninterpreted functions).
    pub fn arity(&self) -> usize {
        if self.is_uninterpreted() {
            self.args.len().max(1)
        } else {
            self.images.first().map_or(0, Vec::len)
        }
    }

    /// The first image, which is the whole mapping for single-set functions.
    pub fn mapping_exprs(&self) -> &[String] {
        self.images.first().map_or(&[], Vec::as_slice)
    }

    /// Symbolic parameters of the relation.
    pub fn parameters(&self) -> Vec<String> {
        list_vars(&self.sets)
    }

    /// LaTeX rendering.
    pub fn latex(&self) -> String {
        if self.is_uninterpreted() {
            return format!("{}({})", latex_format(&self.name), self.args.join(","));
        }
        let maps = self
            .sets
            .iter()
            .zip(&self.images)
            .map(|(s, img)| {
                format!(
                    "{}[{}] \\rightarrow [{}]",
                    latex_format(&s.name),
                    s.tuple().join(","),
                    img.join(",")
                )
            })
            .collect::<Vec<_>>();
        format!("{} &= \\{{ {} \\}}", latex_format(&self.name), maps.join("; "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_uninterpreted() {
            return write!(f, "{}({})", self.name, self.args.join(","));
        }
        let maps = self
            .sets
            .iter()
            .zip(&self.images)
            .map(|(s, img)| format!("{}[{}] -> [{}]", s.name, s.tuple().join(","), img.join(",")))
            .collect::<Vec<_>>();
        write!(
            f,
            "{} := [{}] -> {{ {} }};",
            self.name,
            self.parameters().join(","),
            maps.join("; ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::Var;

    #[test]
    fn test_from_expr() {
        let f = Function::from_expr("index(i+1)").unwrap();
        assert_eq!(f.name, "index");
        assert_eq!(f.args, vec!["i+1"]);
        assert_eq!(f.arity(), 1);
        assert_eq!(f.to_string(), "index(i+1)");

        let bare = Function::from_expr("col").unwrap();
        assert_eq!(bare.arity(), 1);
        assert!(Function::from_expr("f(a) + 1").is_err());
    }

    #[test]
    fn test_identity_display() {
        let set = Set::new("S", vec![Var::new("t", "1", "T"), Var::new("i", "1", "N")]);
        let f = Function::identity("sched", set);
        assert_eq!(f.to_string(), "sched := [T,N] -> { S[t,i] -> [t,i] };");
        assert_eq!(f.arity(), 2);
    }
}
