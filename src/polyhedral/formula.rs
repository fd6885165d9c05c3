//! Parsed form of set and relation formulas.
//!
//! A formula is `[params] -> { name[in...] -> name[out...] : c1 && c2 }`,
//! where the parameter prefix, tuple names, output tuple and constraint
//! list are all optional. This is the narrow grammar every other module
//! reads and writes formulas through.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::text::{
    identifiers, is_identifier, is_keyword, matching_close, split_conjuncts, split_top_level,
};
use crate::utils::errors::{ParseError, ParseErrorKind};

/// A set (`{[i,j] : ...}`) or relation (`{[i,j] -> [j,i] : ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    /// Declared symbolic parameters
    pub params: Vec<String>,
    /// Tuple name of the (input) tuple, often a statement label
    pub name: String,
    /// Input tuple entries
    pub input: Vec<String>,
    /// Output tuple name, for relations
    pub output_name: String,
    /// Output tuple entries, `Some` for relations
    pub output: Option<Vec<String>>,
    /// Top-level conjuncts
    pub conditions: Vec<String>,
}

fn syntax(message: String) -> ParseError {
    ParseError::new(ParseErrorKind::Syntax, message)
}

/// Read `name[entries]` from the start of `s`, returning the remainder.
fn parse_tuple(s: &str) -> Result<(String, Vec<String>, &str), ParseError> {
    let open = s
        .find('[')
        .ok_or_else(|| syntax(format!("Expected a tuple in '{}'", s)))?;
    let name = s[..open].trim();
    if !name.is_empty() && !is_identifier(name) {
        return Err(syntax(format!("Invalid tuple name '{}'", name)));
    }
    let close = matching_close(s, open)
        .ok_or_else(|| syntax(format!("Unbalanced tuple in '{}'", s)))?;
    let entries = split_top_level(&s[open + 1..close], ",");
    Ok((name.to_string(), entries, &s[close + 1..]))
}

impl Formula {
    /// Create an unnamed set over the given iterators.
    pub fn set(iterators: &[&str], conditions: &[&str]) -> Self {
        Self {
            params: Vec::new(),
            name: String::new(),
            input: iterators.iter().map(|s| s.to_string()).collect(),
            output_name: String::new(),
            output: None,
            conditions: conditions.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Parse formula text.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim().trim_end_matches(';').trim();
        let mut rest = text;
        let mut params = Vec::new();

        if rest.starts_with('[') {
            let close = matching_close(rest, 0)
                .ok_or_else(|| syntax(format!("Unbalanced parameter list in '{}'", text)))?;
            params = split_top_level(&rest[1..close], ",");
            rest = rest[close + 1..]
                .trim_start()
                .strip_prefix("->")
                .ok_or_else(|| syntax(format!("Expected '->' after parameters in '{}'", text)))?
                .trim_start();
        }

        if !rest.starts_with('{') {
            return Err(syntax(format!("Expected '{{' in '{}'", text)));
        }
        let close = matching_close(rest, 0)
            .ok_or_else(|| syntax(format!("Unbalanced braces in '{}'", text)))?;
        if !rest[close + 1..].trim().is_empty() {
            return Err(syntax(format!("Trailing text after '}}' in '{}'", text)));
        }
        let body = rest[1..close].trim();

        let (name, input, after) = parse_tuple(body)?;
        let mut after = after.trim_start();
        let mut output = None;
        let mut output_name = String::new();
        if let Some(stripped) = after.strip_prefix("->") {
            let (oname, entries, remainder) = parse_tuple(stripped.trim_start())?;
            output = Some(entries);
            output_name = oname;
            after = remainder.trim_start();
        }

        let conditions = if let Some(stripped) = after.strip_prefix(':') {
            split_conjuncts(stripped)
        } else if after.is_empty() {
            Vec::new()
        } else {
            return Err(syntax(format!("Unexpected '{}' in '{}'", after, text)));
        };

        Ok(Self {
            params,
            name,
            input,
            output_name,
            output,
            conditions,
        })
    }

    /// True when the text looks like a braced formula.
    pub fn is_formula(text: &str) -> bool {
        text.contains('{') && text.contains('[')
    }

    /// True for relations (an output tuple is present).
    pub fn is_relation(&self) -> bool {
        self.output.is_some()
    }

    /// Iterators of the (input) tuple.
    pub fn iterators(&self) -> &[String] {
        &self.input
    }

    /// Constraints joined back into one `&&` chain.
    pub fn condition_text(&self) -> String {
        self.conditions.join(" && ")
    }

    /// Variables bound by `exists` clauses.
    pub fn exists_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        for cond in &self.conditions {
            let Some(rest) = cond.trim().strip_prefix("exists") else {
                continue;
            };
            let rest = rest.trim_start().trim_start_matches('(');
            let Some(colon) = rest.find(':') else {
                continue;
            };
            for var in rest[..colon].split(',') {
                let var = var.trim();
                if !var.is_empty() && !vars.iter().any(|v| v == var) {
                    vars.push(var.to_string());
                }
            }
        }
        vars
    }

    /// Free symbolic names: not iterators, exists vars, keywords or calls.
    pub fn symbolic_names(&self) -> Vec<String> {
        let exists = self.exists_vars();
        let mut names = Vec::new();
        for cond in &self.conditions {
            for (ident, is_call) in identifiers(cond) {
                let bound = self.input.contains(&ident)
                    || self.output.as_ref().map_or(false, |o| o.contains(&ident))
                    || exists.contains(&ident);
                if is_call || bound || is_keyword(&ident) || names.contains(&ident) {
                    continue;
                }
                names.push(ident);
            }
        }
        names
    }

    /// Copy with a different tuple name (per-stage instantiation of a template).
    pub fn with_tuple_name(&self, name: &str) -> Self {
        let mut f = self.clone();
        f.name = name.to_string();
        f
    }

    /// Copy with an explicit parameter list.
    pub fn with_params(&self, params: Vec<String>) -> Self {
        let mut f = self.clone();
        f.params = params;
        f
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.params.is_empty() {
            write!(f, "[{}] -> ", self.params.join(", "))?;
        }
        write!(f, "{{{}[{}]", self.name, self.input.join(","))?;
        if let Some(ref output) = self.output {
            write!(f, " -> {}[{}]", self.output_name, output.join(","))?;
        }
        if !self.conditions.is_empty() {
            write!(f, " : {}", self.condition_text())?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        let f = Formula::parse("{[t,i] : 1 <= t <= T && 1 <= i <= N}").unwrap();
        assert!(!f.is_relation());
        assert_eq!(f.iterators(), &["t", "i"]);
        assert_eq!(f.conditions, vec!["1 <= t <= T", "1 <= i <= N"]);
        assert_eq!(f.symbolic_names(), vec!["T", "N"]);
        assert_eq!(f.to_string(), "{[t,i] : 1 <= t <= T && 1 <= i <= N}");
    }

    #[test]
    fn test_parse_relation_with_params() {
        let f = Formula::parse("[R, C] -> {[i,k,j] -> [ii,kk,i,k,j]: exists(ri,ck :0 <= ri < R && i = ii*R+ri)}")
            .unwrap();
        assert!(f.is_relation());
        assert_eq!(f.params, vec!["R", "C"]);
        assert_eq!(f.output.as_deref(), Some(&["ii".to_string(), "kk".into(), "i".into(), "k".into(), "j".into()][..]));
        assert_eq!(f.exists_vars(), vec!["ri", "ck"]);
        assert_eq!(f.conditions.len(), 1);
    }

    #[test]
    fn test_named_tuple_template() {
        let f = Formula::parse("{insp[ii,i] : 0 <= ii < N}").unwrap();
        assert_eq!(f.name, "insp");
        assert_eq!(f.with_tuple_name("count").to_string(), "{count[ii,i] : 0 <= ii < N}");
    }

    #[test]
    fn test_symbolic_names_skip_calls() {
        let f = Formula::parse("{[i,j]: index(i) <= j < index(i+1) && NNZ > 0}").unwrap();
        assert_eq!(f.symbolic_names(), vec!["NNZ"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Formula::parse("[N] {[i]}").is_err());
        assert!(Formula::parse("{[i] : i < N").is_err());
        assert!(Formula::parse("{[i] i < N}").is_err());
    }
}
