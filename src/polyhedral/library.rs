//! A named store of sets and relations.
//!
//! Applying a relation to a set is done textually: the set's tuple is
//! renamed onto the relation's input, the two constraint lists are
//! conjoined, and input iterators that do not survive into the output
//! tuple are existentially quantified.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::formula::Formula;
use super::text::{identifiers, is_identifier, rewrite_tokens, TokenKind};
use crate::utils::errors::{LookupError, ParseError, ParseErrorKind, PdfgResult};

/// Sets and relations by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetLibrary {
    formulas: BTreeMap<String, Formula>,
    nsets: usize,
    nrels: usize,
}

impl SetLibrary {
    /// Library with no definitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and store a formula, naming it `S<n>` or `R<n>` when unnamed.
    pub fn add(&mut self, text: &str, name: Option<&str>) -> Result<String, ParseError> {
        let formula = Formula::parse(text)?;
        let name = match name {
            Some(name) => name.to_string(),
            None if formula.is_relation() => {
                self.nrels += 1;
                format!("R{}", self.nrels)
            }
            None => {
                self.nsets += 1;
                format!("S{}", self.nsets)
            }
        };
        self.formulas.insert(name.clone(), formula);
        Ok(name)
    }

    /// Store an already parsed formula.
    pub fn insert(&mut self, name: &str, formula: Formula) {
        self.formulas.insert(name.to_string(), formula);
    }

    /// Formula defined as `name`.
    pub fn get(&self, name: &str) -> Option<&Formula> {
        self.formulas.get(name)
    }

    /// Whether `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.formulas.contains_key(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    /// Whether nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.formulas.keys()
    }

    fn lookup(&self, name: &str) -> PdfgResult<&Formula> {
        self.formulas
            .get(name)
            .ok_or_else(|| LookupError::new(name, "set library").into())
    }

    /// Store `result := relation(set)` and return it.
    pub fn apply(&mut self, relation: &str, set: &str, result: &str) -> PdfgResult<&Formula> {
        let composed = compose(self.lookup(relation)?, self.lookup(set)?)?;
        log::debug!("{} := {} * {} = {}", result, relation, set, composed);
        self.formulas.insert(result.to_string(), composed);
        self.lookup(result)
    }

    /// Store the inverse of a relation under `result`.
    pub fn inverse(&mut self, relation: &str, result: &str) -> PdfgResult<&Formula> {
        let rel = self.lookup(relation)?;
        let output = rel.output.clone().ok_or_else(|| not_relation(relation))?;
        let mut inv = rel.clone();
        inv.output = Some(std::mem::replace(&mut inv.input, output));
        std::mem::swap(&mut inv.name, &mut inv.output_name);
        self.formulas.insert(result.to_string(), inv);
        self.lookup(result)
    }
}

fn not_relation(name: &str) -> ParseError {
    ParseError::new(
        ParseErrorKind::Syntax,
        format!("'{}' is not a relation", name),
    )
}

/// Apply `relation` to `set`, producing a set over the relation's output tuple.
pub fn compose(relation: &Formula, set: &Formula) -> Result<Formula, ParseError> {
    let output = relation
        .output
        .as_ref()
        .ok_or_else(|| not_relation(&relation.to_string()))?;
    if set.is_relation() {
        return Err(ParseError::new(
            ParseErrorKind::Syntax,
            format!("Expected a set, found relation '{}'", set),
        ));
    }
    if relation.input.len() != set.input.len() {
        return Err(ParseError::new(
            ParseErrorKind::Syntax,
            format!(
                "Arity mismatch applying '{}' to '{}' ({} vs {})",
                relation,
                set,
                relation.input.len(),
                set.input.len()
            ),
        ));
    }

    let mut renames: Vec<(&str, &str)> = Vec::new();
    let mut conditions: Vec<String> = Vec::new();
    let mut hidden: Vec<String> = Vec::new();
    let mut bindings: Vec<String> = Vec::new();
    for (s, r) in set.input.iter().zip(&relation.input) {
        if is_identifier(r) {
            if s != r {
                renames.push((s.as_str(), r.as_str()));
            }
        } else {
            bindings.push(format!("{} = {}", s, r));
            hidden.push(s.clone());
        }
    }

    for cond in &set.conditions {
        conditions.push(rewrite_tokens(cond, |t| {
            if t.kind != TokenKind::Ident {
                return None;
            }
            renames
                .iter()
                .find(|(from, _)| *from == t.text)
                .map(|(_, to)| to.to_string())
        }));
    }
    conditions.extend(bindings);
    conditions.extend(relation.conditions.iter().cloned());

    let mut tuple = Vec::with_capacity(output.len());
    for (k, entry) in output.iter().enumerate() {
        if is_identifier(entry) {
            tuple.push(entry.clone());
        } else {
            let fresh = format!("o{}", k);
            conditions.push(format!("{} = {}", fresh, entry));
            tuple.push(fresh);
        }
    }

    let mut projected: Vec<String> = Vec::new();
    for var in relation
        .input
        .iter()
        .filter(|r| is_identifier(r))
        .chain(hidden.iter())
    {
        if !tuple.contains(var) && !projected.contains(var) {
            projected.push(var.clone());
        }
    }

    if !projected.is_empty() {
        let (inner, outer): (Vec<String>, Vec<String>) = conditions.into_iter().partition(|c| {
            identifiers(c)
                .iter()
                .any(|(ident, is_call)| !is_call && projected.contains(ident))
        });
        conditions = outer;
        if !inner.is_empty() {
            conditions.push(format!(
                "exists({} : {})",
                projected.join(","),
                inner.join(" && ")
            ));
        }
    }

    let mut params = set.params.clone();
    for p in &relation.params {
        if !params.contains(p) {
            params.push(p.clone());
        }
    }

    Ok(Formula {
        params,
        name: if relation.output_name.is_empty() {
            set.name.clone()
        } else {
            relation.output_name.clone()
        },
        input: tuple,
        output_name: String::new(),
        output: None,
        conditions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_names() {
        let mut lib = SetLibrary::new();
        assert_eq!(lib.add("{[i] : 0 <= i < N}", None).unwrap(), "S1");
        assert_eq!(lib.add("{[i] -> [i+1]}", None).unwrap(), "R1");
        assert_eq!(lib.add("{[j] : 0 <= j < M}", Some("J")).unwrap(), "J");
        assert!(lib.contains("S1") && lib.contains("R1") && lib.contains("J"));
        assert_eq!(lib.len(), 3);
    }

    #[test]
    fn test_apply_extends_tuple() {
        let mut lib = SetLibrary::new();
        lib.add("{[i,j]: 0 <= i < N_R && index(i) <= j < index(i+1)}", Some("Icsr"))
            .unwrap();
        lib.add("{[i,j] -> [i,k,j]: 0 <= k < N_C && k = col(j)}", Some("Tdense"))
            .unwrap();
        let dense = lib.apply("Tdense", "Icsr", "Idense").unwrap();
        assert_eq!(dense.input, vec!["i", "k", "j"]);
        assert_eq!(
            dense.to_string(),
            "{[i,k,j] : 0 <= i < N_R && index(i) <= j < index(i+1) && 0 <= k < N_C && k = col(j)}"
        );
    }

    #[test]
    fn test_apply_projects_dropped_iterators() {
        let mut lib = SetLibrary::new();
        lib.add("{[a,b]: 0 <= a < N && 0 <= b < M}", Some("S")).unwrap();
        lib.add("{[i,j] -> [i]}", Some("P")).unwrap();
        let projected = lib.apply("P", "S", "Q").unwrap();
        assert_eq!(
            projected.to_string(),
            "{[i] : 0 <= i < N && exists(j : 0 <= j < M)}"
        );
    }

    #[test]
    fn test_apply_expression_outputs() {
        let mut lib = SetLibrary::new();
        lib.add("{[t,i]: 0 <= t < T && 0 <= i < N}", Some("S")).unwrap();
        lib.add("{[t,i] -> [t,i+t]}", Some("Skew")).unwrap();
        let skewed = lib.apply("Skew", "S", "D").unwrap();
        assert_eq!(skewed.input, vec!["t", "o1"]);
        assert!(skewed
            .to_string()
            .ends_with("exists(i : 0 <= i < N && o1 = i+t)}"));
    }

    #[test]
    fn test_apply_errors() {
        let mut lib = SetLibrary::new();
        lib.add("{[i]: 0 <= i < N}", Some("S")).unwrap();
        lib.add("{[i,j] -> [j,i]}", Some("Swap")).unwrap();
        assert!(lib.apply("Missing", "S", "X").is_err());
        assert!(lib.apply("S", "S", "X").is_err());
        assert!(lib.apply("Swap", "S", "X").is_err());
    }

    #[test]
    fn test_inverse() {
        let mut lib = SetLibrary::new();
        lib.add("{[i,j] -> [j,i] : i < j}", Some("Swap")).unwrap();
        let inv = lib.inverse("Swap", "SwapInv").unwrap();
        assert_eq!(inv.input, vec!["j", "i"]);
        assert_eq!(inv.output.as_deref(), Some(&["i".to_string(), "j".to_string()][..]));
    }
}
