//! Bounded integer iterators.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::errors::{ParseError, ParseErrorKind};
use crate::utils::latex::latex_format;

/// One bounded integer dimension.
///
/// Either bound may be empty (single-sided constraint) but not both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Var {
    /// Iterator or parameter name
    pub name: String,
    /// Lower bound expression
    pub lower: String,
    /// Upper bound expression
    pub upper: String,
    /// Lower bound is inclusive
    pub tightlow: bool,
    /// Upper bound is inclusive
    pub tightup: bool,
    /// C type used when the var becomes a function parameter
    pub ty: String,
}

impl Var {
    /// Create a var with inclusive bounds on both sides.
    pub fn new(name: &str, lower: &str, upper: &str) -> Self {
        Self {
            name: name.to_string(),
            lower: lower.to_string(),
            upper: upper.to_string(),
            tightlow: true,
            tightup: true,
            ty: "int".to_string(),
        }
    }

    /// Set the inclusiveness of both bounds.
    pub fn with_tightness(mut self, tightlow: bool, tightup: bool) -> Self {
        self.tightlow = tightlow;
        self.tightup = tightup;
        self
    }

    /// Element type of a data node.
    pub fn with_type(mut self, ty: &str) -> Self {
        self.ty = ty.to_string();
        self
    }

    /// Parse `lo OP name OP hi` or `name OP value`.
    ///
    /// Chains written high-to-low (`hi > name >= lo`) are normalised. An
    /// equality sets both bounds. Anything else is a parse error.
    pub fn from_expression(text: &str) -> Result<Self, ParseError> {
        let malformed = || {
            ParseError::new(
                ParseErrorKind::MalformedConstraint,
                format!("Malformed constraint '{}'", text.trim()),
            )
        };

        let parts = split_comparison(text);
        if parts.iter().any(|p| p.is_empty()) {
            return Err(malformed());
        }

        match parts.as_slice() {
            [name, op, value] => {
                let mut var = Var::new(name, "", "");
                match op.as_str() {
                    "<" | "<=" => {
                        var.upper = value.clone();
                        var.tightup = op.ends_with('=');
                    }
                    ">" | ">=" => {
                        var.lower = value.clone();
                        var.tightlow = op.ends_with('=');
                    }
                    "=" | "==" => {
                        var.lower = value.clone();
                        var.upper = value.clone();
                    }
                    _ => return Err(malformed()),
                }
                Ok(var)
            }
            [a, op1, name, op2, b] => {
                let ascending = |op: &str| op == "<" || op == "<=";
                let descending = |op: &str| op == ">" || op == ">=";
                let (lower, upper, tightlow, tightup) = if ascending(op1) && ascending(op2) {
                    (a, b, op1.ends_with('='), op2.ends_with('='))
                } else if descending(op1) && descending(op2) {
                    (b, a, op2.ends_with('='), op1.ends_with('='))
                } else {
                    return Err(malformed());
                };
                Ok(Var::new(name, lower, upper).with_tightness(tightlow, tightup))
            }
            _ => Err(malformed()),
        }
    }

    /// Both bounds present.
    pub fn bounded(&self) -> bool {
        !self.lower.is_empty() && !self.upper.is_empty()
    }

    /// Equality constraint (`name = value`).
    pub fn is_fixed(&self) -> bool {
        self.bounded() && self.lower == self.upper
    }

    /// Merge the missing side of a single-sided constraint on the same name.
    pub fn merge(&mut self, other: &Var) -> bool {
        if other.name != self.name {
            return false;
        }
        if self.lower.is_empty() && !other.lower.is_empty() && other.upper.is_empty() {
            self.lower = other.lower.clone();
            self.tightlow = other.tightlow;
            return true;
        }
        if self.upper.is_empty() && !other.upper.is_empty() && other.lower.is_empty() {
            self.upper = other.upper.clone();
            self.tightup = other.tightup;
            return true;
        }
        false
    }

    /// LaTeX rendering.
    pub fn latex(&self) -> String {
        let name = latex_format(&self.name);
        let le = |tight: bool| if tight { "\\leq" } else { "<" };
        let ge = |tight: bool| if tight { "\\geq" } else { ">" };
        if self.lower.is_empty() {
            format!("{} {} {}", name, le(self.tightup), latex_format(&self.upper))
        } else if self.upper.is_empty() {
            format!("{} {} {}", name, ge(self.tightlow), latex_format(&self.lower))
        } else if self.lower == self.upper {
            format!("{} = {}", name, latex_format(&self.lower))
        } else {
            format!(
                "{} {} {} {} {}",
                latex_format(&self.lower),
                le(self.tightlow),
                name,
                le(self.tightup),
                latex_format(&self.upper)
            )
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let le = |tight: bool| if tight { "<=" } else { "<" };
        let ge = |tight: bool| if tight { ">=" } else { ">" };
        if self.lower.is_empty() {
            write!(f, "{} {} {}", self.name, le(self.tightup), self.upper)
        } else if self.upper.is_empty() {
            write!(f, "{} {} {}", self.name, ge(self.tightlow), self.lower)
        } else if self.lower == self.upper {
            write!(f, "{} = {}", self.name, self.lower)
        } else {
            write!(
                f,
                "{} {} {} {} {}",
                self.lower,
                le(self.tightlow),
                self.name,
                le(self.tightup),
                self.upper
            )
        }
    }
}

/// Split a constraint at top-level comparison operators, keeping the operators.
fn split_comparison(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        let is_cmp = depth == 0 && matches!(c, '<' | '>' | '=' | '!');
        let is_arrow = c == '>' && i > 0 && chars[i - 1] == '-';
        if is_cmp && !is_arrow {
            let mut op = c.to_string();
            if chars.get(i + 1) == Some(&'=') {
                op.push('=');
                i += 1;
            }
            parts.push(current.trim().to_string());
            parts.push(op);
            current.clear();
        } else {
            current.push(c);
        }
        i += 1;
    }
    parts.push(current.trim().to_string());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sided() {
        let v = Var::from_expression("0 <= i < N").unwrap();
        assert_eq!(v.name, "i");
        assert_eq!(v.lower, "0");
        assert_eq!(v.upper, "N");
        assert!(v.tightlow);
        assert!(!v.tightup);
        assert_eq!(v.to_string(), "0 <= i < N");
    }

    #[test]
    fn test_without_spaces_and_calls() {
        let v = Var::from_expression("index(i)<=j<index(i+1)").unwrap();
        assert_eq!(v.name, "j");
        assert_eq!(v.lower, "index(i)");
        assert_eq!(v.upper, "index(i+1)");
    }

    #[test]
    fn test_single_sided() {
        let v = Var::from_expression("N_C > 0").unwrap();
        assert_eq!(v.lower, "0");
        assert!(v.upper.is_empty());
        assert!(!v.tightlow);
        assert_eq!(v.to_string(), "N_C > 0");

        let eq = Var::from_expression("k = col(j)").unwrap();
        assert!(eq.is_fixed());
        assert_eq!(eq.to_string(), "k = col(j)");
    }

    #[test]
    fn test_descending_chain() {
        let v = Var::from_expression("N > i >= 1").unwrap();
        assert_eq!(v.lower, "1");
        assert_eq!(v.upper, "N");
        assert!(v.tightlow);
        assert!(!v.tightup);
    }

    #[test]
    fn test_malformed_is_fatal() {
        assert!(Var::from_expression("0 <= i <").is_err());
        assert!(Var::from_expression("i").is_err());
        assert!(Var::from_expression("0 <= i > N").is_err());
        assert!(Var::from_expression("a < b < c < d").is_err());
        assert!(Var::from_expression("i != 3").is_err());
    }

    #[test]
    fn test_merge_single_sided() {
        let mut v = Var::from_expression("i >= 0").unwrap();
        assert!(v.merge(&Var::from_expression("i < N").unwrap()));
        assert_eq!(v.to_string(), "0 <= i < N");
    }

    #[test]
    fn test_latex() {
        let v = Var::new("i", "0", "N_R").with_tightness(true, false);
        assert_eq!(v.latex(), "0 \\leq i < N_{R}");
    }
}
