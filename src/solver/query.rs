//! Solver query construction and output reformatting.

use std::fmt;

use super::subst::SubstitutionContext;
use crate::polyhedral::formula::Formula;
use crate::polyhedral::text::{identifiers, is_keyword, rewrite_tokens, TokenKind};
use crate::utils::errors::ParseError;

/// An Omega+ codegen script.
///
/// ```text
/// symbolic N_R,NNZ,index(1),index1(1);
/// spmv := {[i,j] : 0 <= i < N_R && index(i) <= j < index1(i)};
/// codegen(spmv) given {[i,j] : NNZ > 0};
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmegaQuery {
    /// Set name, also the codegen target
    pub name: String,
    /// Symbolic constants, then function symbols with their arity
    pub symbols: Vec<String>,
    /// Tuple iterators
    pub iterators: Vec<String>,
    /// Conditions that mention iterators
    pub conditions: Vec<String>,
    /// Conditions on parameters only
    pub given: Vec<String>,
}

impl OmegaQuery {
    /// Build a query, normalising function arities through `context`.
    pub fn new(
        name: &str,
        formula: &Formula,
        context: &mut SubstitutionContext,
    ) -> Result<Self, ParseError> {
        let mut set = formula.clone();
        set.name.clear();
        set.params.clear();
        let iterators = set.input.clone();
        let exists = set.exists_vars();

        let mut constants: Vec<String> = Vec::new();
        for cond in &set.conditions {
            for (ident, is_call) in identifiers(cond) {
                if is_keyword(&ident) {
                    continue;
                }
                if is_call {
                    context.add_function(&ident);
                } else if !iterators.contains(&ident)
                    && !exists.contains(&ident)
                    && !constants.contains(&ident)
                {
                    constants.push(ident);
                }
            }
        }
        constants.retain(|c| !context.functions().contains(c));
        constants.sort();

        let (text, decls) = context.declare_calls(&set.to_string(), &iterators);
        let rewritten = Formula::parse(&text)?;

        let (given, conditions): (Vec<String>, Vec<String>) = rewritten
            .conditions
            .into_iter()
            .partition(|c| is_known(c, &iterators, &exists));

        let mut symbols = constants;
        symbols.extend(decls);

        Ok(Self {
            name: name.to_string(),
            symbols,
            iterators,
            conditions,
            given,
        })
    }

    /// Turn Omega scan output into the iscc-like form the emitter expects.
    ///
    /// `s<k>` becomes the k-th statement label, `intFloor` becomes `floord`
    /// and `t<k>` becomes the k-th iterator, declared `itype` on first use.
    pub fn reformat(&self, code: &str, statements: &[String]) -> String {
        let code = code
            .lines()
            .filter(|line| !line.contains(">>>"))
            .collect::<Vec<_>>()
            .join("\n");

        let mut declared = vec![false; self.iterators.len()];
        rewrite_tokens(&code, |t| {
            if t.kind != TokenKind::Ident {
                return None;
            }
            if t.text == "intFloor" {
                return Some("floord".to_string());
            }
            let (prefix, digits) = t.text.split_at(1);
            let k: usize = digits.parse().ok()?;
            match prefix {
                "s" => statements.get(k).cloned(),
                "t" if k >= 1 && k <= self.iterators.len() => {
                    let name = &self.iterators[k - 1];
                    if declared[k - 1] {
                        Some(name.clone())
                    } else {
                        declared[k - 1] = true;
                        Some(format!("itype {}", name))
                    }
                }
                _ => None,
            }
        })
    }
}

impl fmt::Display for OmegaQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.symbols.is_empty() {
            writeln!(f, "symbolic {};", self.symbols.join(","))?;
        }
        let mut set = Formula::set(&[], &[]);
        set.input = self.iterators.clone();
        set.conditions = self.conditions.clone();
        writeln!(f, "{} := {};", self.name, set)?;
        write!(f, "codegen({})", self.name)?;
        if !self.given.is_empty() {
            set.conditions = self.given.clone();
            write!(f, " given {}", set)?;
        }
        write!(f, ";")
    }
}

/// True when a condition mentions no iterator, existential var or keyword.
fn is_known(cond: &str, iterators: &[String], exists: &[String]) -> bool {
    identifiers(cond)
        .iter()
        .all(|(ident, _)| !iterators.contains(ident) && !exists.contains(ident) && !is_keyword(ident))
}

/// An iscc codegen script.
///
/// ```text
/// jacobi := [T, N] -> {jacobi[t,i] : 1 <= t <= T && 1 <= i <= N};
/// codegen ({ jacobi[t,i] -> [t,i] } * jacobi);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IslQuery {
    /// Set name, also the statement tuple name
    pub name: String,
    /// Parameterised domain with uninterpreted calls mangled
    pub domain: String,
    /// Tuple iterators
    pub iterators: Vec<String>,
}

impl IslQuery {
    /// Query for `formula`, with its calls encoded in `context`.
    pub fn new(name: &str, formula: &Formula, context: &mut SubstitutionContext) -> Self {
        for cond in &formula.conditions {
            for (ident, is_call) in identifiers(cond) {
                if is_call && !is_keyword(&ident) {
                    context.add_function(&ident);
                }
            }
        }

        let mut params = formula.params.clone();
        for sym in formula.symbolic_names() {
            if !params.contains(&sym) {
                params.push(sym);
            }
        }
        let set = formula.with_tuple_name(name).with_params(params);
        let domain = context.encode(&set.to_string());

        Self {
            name: name.to_string(),
            domain,
            iterators: formula.input.clone(),
        }
    }
}

impl fmt::Display for IslQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tuple = self.iterators.join(",");
        writeln!(f, "{} := {};", self.name, self.domain)?;
        write!(
            f,
            "codegen ({{ {}[{}] -> [{}] }} * {});",
            self.name, tuple, tuple, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_omega_query_given_clause() {
        let mut ctx = SubstitutionContext::new();
        let f = Formula::parse("{[i,j] : 0 <= i < N_R && index(i) <= j < index(i+1) && NNZ > 0}").unwrap();
        let q = OmegaQuery::new("spmv", &f, &mut ctx).unwrap();
        assert_eq!(
            q.to_string(),
            "symbolic NNZ,N_R,index(1),index1(1);\n\
             spmv := {[i,j] : 0 <= i < N_R && index(i) <= j < index1(i)};\n\
             codegen(spmv) given {[i,j] : NNZ > 0};"
        );
    }

    #[test]
    fn test_omega_query_keeps_exists_intact() {
        let mut ctx = SubstitutionContext::new();
        let f = Formula::parse("{[ii,i] : 0 <= i < N && exists(ri : 0 <= ri < 4 && i = ii*4+ri)}").unwrap();
        let q = OmegaQuery::new("T", &f, &mut ctx).unwrap();
        assert_eq!(q.symbols, vec!["N"]);
        assert_eq!(q.conditions.len(), 2);
        assert!(q.given.is_empty());
    }

    #[test]
    fn test_reformat_omega() {
        let mut ctx = SubstitutionContext::new();
        let f = Formula::parse("{[t,i] : 1 <= t <= T && 1 <= i <= N}").unwrap();
        let q = OmegaQuery::new("jacobi", &f, &mut ctx).unwrap();
        let raw = ">>> codegen(jacobi);\nfor(t1 = 1; t1 <= T; t1++) {\n  for(t2 = 1; t2 <= intFloor(N,1); t2++) {\n    s0(t1,t2);\n  }\n}";
        assert_eq!(
            q.reformat(raw, &["jacobi".to_string()]),
            "for(itype t = 1; t <= T; t++) {\n  for(itype i = 1; i <= floord(N,1); i++) {\n    jacobi(t,i);\n  }\n}"
        );
    }

    #[test]
    fn test_reformat_leaves_other_names() {
        let mut ctx = SubstitutionContext::new();
        let f = Formula::parse("{[i] : 0 <= i < N}").unwrap();
        let q = OmegaQuery::new("S", &f, &mut ctx).unwrap();
        assert_eq!(q.reformat("t10 + t1 + s3 + tx", &["S".into()]), "t10 + itype i + s3 + tx");
    }

    #[test]
    fn test_isl_query() {
        let mut ctx = SubstitutionContext::new();
        let f = Formula::parse("{[i,j] : 0 <= i < N_R && index(i) <= j < index(i+1)}").unwrap();
        let q = IslQuery::new("spmv", &f, &mut ctx);
        assert_eq!(
            q.to_string(),
            "spmv := [N_R, index_i_, index_ip1_] -> {spmv[i,j] : 0 <= i < N_R && index_i_ <= j < index_ip1_};\n\
             codegen ({ spmv[i,j] -> [i,j] } * spmv);"
        );
    }
}
