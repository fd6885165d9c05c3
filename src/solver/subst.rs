//! Uninterpreted-function and constant substitution.
//!
//! Solvers only understand affine integer-set notation. Before a query is
//! built, calls of known uninterpreted functions are rewritten into
//! solver-safe identifiers, and afterwards the scan code is rewritten back
//! to array subscripts with the original constant names restored.
//!
//! Two encodings are supported:
//! - mangling (`index(i+1)` becomes the parameter `index_ip1_`), used for
//!   `iscc`; a registry remembers every mangled name so decoding is a lookup
//! - arity normalisation for Omega, which accepts function symbols but
//!   requires every call of a symbol to share an argument prefix; calls
//!   with different arguments become distinct symbols (`index1`)

use std::collections::BTreeMap;

use crate::polyhedral::formula::Formula;
use crate::polyhedral::text::{
    call_sites, identifiers, matching_close, paren_if_compound, replace_chars, rewrite_tokens,
    split_top_level, TokenKind,
};
use crate::polyhedral::Constant;

/// How decoded calls are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStyle {
    /// `f[a,b]`, for generated C code
    Subscript,
    /// `f(a,b)`, reproducing the specification text
    Call,
}

/// A mangled call remembered for decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MangledCall {
    name: String,
    args: String,
}

/// Arity bookkeeping for one function symbol declared to Omega.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UfEntry {
    /// Declared symbol name
    pub name: String,
    /// Source name when this entry is a renamed variant
    pub oldname: String,
    /// Tuple prefix the symbol is applied to
    pub args: Vec<String>,
    /// Arguments as written at the call site
    pub oldargs: Vec<String>,
    /// Declared arity
    pub arity: usize,
    /// Arity at the call site
    pub oldarity: usize,
}

impl UfEntry {
    fn new(name: &str, args: Vec<String>, oldargs: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            oldname: String::new(),
            arity: args.len(),
            oldarity: oldargs.len(),
            args,
            oldargs,
        }
    }

    /// Whether this entry stands for a differently named source function.
    pub fn is_renamed(&self) -> bool {
        !self.oldname.is_empty()
    }

    /// Leading tuple iterators added in front of the source arguments.
    pub fn padding(&self) -> usize {
        self.arity.saturating_sub(self.oldarity)
    }

    fn source_name(&self) -> &str {
        if self.is_renamed() {
            &self.oldname
        } else {
            &self.name
        }
    }

    /// Call text as declared to the solver.
    fn new_call(&self) -> String {
        format!("{}({})", self.name, self.args.join(","))
    }

    /// Symbol declaration, `name(arity)`.
    pub fn declaration(&self) -> String {
        format!("{}({})", self.name, self.arity)
    }
}

/// Substitution state for one graph-generation session.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    /// Named constants, restored into scan output
    pub constants: Vec<Constant>,
    functions: Vec<String>,
    registry: BTreeMap<String, MangledCall>,
    ufuncs: Vec<UfEntry>,
}

impl SubstitutionContext {
    /// Context with no functions or constants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the constant list.
    pub fn with_constants(mut self, constants: Vec<Constant>) -> Self {
        self.constants = constants;
        self
    }

    /// Register uninterpreted functions by name.
    pub fn with_functions(mut self, names: &[&str]) -> Self {
        for name in names {
            self.add_function(name);
        }
        self
    }

    /// Register an uninterpreted function name.
    pub fn add_function(&mut self, name: &str) {
        if !self.functions.iter().any(|f| f == name) {
            self.functions.push(name.to_string());
        }
    }

    /// Add or replace a constant by name.
    pub fn add_constant(&mut self, constant: Constant) {
        match self.constants.iter_mut().find(|c| c.name == constant.name) {
            Some(existing) => *existing = constant,
            None => self.constants.push(constant),
        }
    }

    /// Known uninterpreted functions.
    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    /// Arity table from the last Omega declaration.
    pub fn ufuncs(&self) -> &[UfEntry] {
        &self.ufuncs
    }

    fn is_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f == name)
    }

    /// Mangle calls of known functions and declare them as parameters.
    ///
    /// Text without any known call is returned unchanged, so encoding is
    /// idempotent.
    pub fn encode(&mut self, expr: &str) -> String {
        let (mut params, body) = split_params(expr);
        let mut added = Vec::new();
        let mut changed = false;

        let mut out = body.to_string();
        loop {
            let sites: Vec<_> = call_sites(&out, None)
                .into_iter()
                .filter(|s| self.is_function(&s.name))
                .collect();
            let Some(site) = sites.into_iter().next() else {
                break;
            };
            let mangled = format!("{}_{}_", site.name, replace_chars(&site.args));
            log::trace!("Mangled {}({}) as {}", site.name, site.args, mangled);
            self.registry.insert(
                mangled.clone(),
                MangledCall {
                    name: site.name.clone(),
                    args: site.args.clone(),
                },
            );
            if !params.contains(&mangled) && !added.contains(&mangled) {
                added.push(mangled.clone());
            }
            out.replace_range(site.start..site.end, &mangled);
            changed = true;
        }

        if !changed {
            return expr.to_string();
        }
        if !out.trim_start().starts_with('{') {
            return out;
        }
        params.extend(added);
        format!("[{}] -> {}", params.join(", "), out.trim_start())
    }

    /// Replace mangled names with calls or subscripts.
    pub fn decode(&self, expr: &str, style: RestoreStyle) -> String {
        self.decode_with(expr, style, &[])
    }

    /// Decode scan output whose loop variables are `c0, c1, ...`.
    pub fn decode_scan(&self, code: &str, iterators: &[String]) -> String {
        self.decode_with(code, RestoreStyle::Subscript, iterators)
    }

    fn decode_with(&self, expr: &str, style: RestoreStyle, iterators: &[String]) -> String {
        let (params, body) = split_params(expr);
        let body = rewrite_tokens(body, |t| {
            if t.kind != TokenKind::Ident {
                return None;
            }
            let call = self.registry.get(t.text)?;
            let mut args = rewrite_tokens(&call.args, |a| {
                let pos = iterators.iter().position(|it| it == a.text)?;
                (a.kind == TokenKind::Ident).then(|| format!("c{}", pos))
            });
            Some(match style {
                RestoreStyle::Subscript => {
                    args = self.subscript_calls(&args);
                    format!("{}[{}]", call.name, args)
                }
                RestoreStyle::Call => format!("{}({})", call.name, args),
            })
        });

        match style {
            RestoreStyle::Call if expr.trim_start().starts_with('[') => {
                let kept: Vec<String> = params
                    .into_iter()
                    .filter(|p| !self.registry.contains_key(p))
                    .collect();
                if kept.is_empty() {
                    body.trim_start().to_string()
                } else {
                    format!("[{}] -> {}", kept.join(", "), body.trim_start())
                }
            }
            _ if expr.trim_start().starts_with('[') => {
                let prefix_end = expr.len() - split_params(expr).1.len();
                format!("{}{}", &expr[..prefix_end], body)
            }
            _ => body,
        }
    }

    /// Rewrite nested calls of known functions as subscripts.
    fn subscript_calls(&self, text: &str) -> String {
        let mut out = text.to_string();
        loop {
            let site = call_sites(&out, None)
                .into_iter()
                .find(|s| self.is_function(&s.name));
            let Some(site) = site else {
                return out;
            };
            let inner = self.subscript_calls(&site.args);
            out.replace_range(site.start..site.end, &format!("{}[{}]", site.name, inner));
        }
    }

    /// Normalise call arities for an Omega declaration.
    ///
    /// Returns the rewritten formula text and the `name(arity)` symbol list.
    /// Omega applies a symbol of arity `n` to the first `n` tuple
    /// iterators, so every call is rewritten over the tuple prefix ending at
    /// its last iterator argument. Each distinct argument list of a function
    /// after the first gets its own renamed symbol (`index1`), which keeps one
    /// arity per declared symbol.
    pub fn declare_calls(&mut self, formula: &str, iterators: &[String]) -> (String, Vec<String>) {
        let mut entries: Vec<UfEntry> = Vec::new();
        let mut renamed: Vec<UfEntry> = Vec::new();
        let mut rewrites: Vec<(usize, usize, String)> = Vec::new();

        for (name, is_call) in identifiers(formula) {
            if !is_call || !self.is_function(&name) || entries.iter().any(|e| e.name == name) {
                continue;
            }
            let mut variants: Vec<UfEntry> = Vec::new();
            for site in call_sites(formula, Some(name.as_str())) {
                let oldargs = site.arg_list();
                let k = match variants.iter().position(|e| e.oldargs == oldargs) {
                    Some(k) => k,
                    None => {
                        let mut entry = UfEntry::new(&name, tuple_prefix(&oldargs, iterators), oldargs);
                        if let Some(first) = variants.first() {
                            let pos = first_difference(&first.oldargs, &entry.oldargs);
                            let candidate = format!("{}{}", name, pos + 1);
                            entry.name = next_free_name(&candidate, |n| {
                                self.is_function(n)
                                    || entries.iter().chain(&renamed).chain(&variants).any(|e| e.name == n)
                            });
                            entry.oldname = name.clone();
                        }
                        variants.push(entry);
                        variants.len() - 1
                    }
                };
                if variants[k].is_renamed() || variants[k].args != variants[k].oldargs {
                    rewrites.push((site.start, site.end, variants[k].new_call()));
                }
            }
            let mut variants = variants.into_iter();
            entries.extend(variants.next());
            renamed.extend(variants);
        }
        entries.extend(renamed);

        // outermost calls win; nested calls only live on in the source arguments
        rewrites.sort_by_key(|(start, _, _)| *start);
        let mut text = String::with_capacity(formula.len());
        let mut last = 0;
        for (start, end, call) in rewrites {
            if start < last {
                continue;
            }
            text.push_str(&formula[last..start]);
            text.push_str(&call);
            last = end;
        }
        text.push_str(&formula[last..]);

        log::trace!("Declared calls: {:?}", entries);
        let decls = entries.iter().map(UfEntry::declaration).collect();
        self.ufuncs = entries;
        (text, decls)
    }

    /// Rewrite Omega function calls in scan code back to source subscripts.
    ///
    /// The declared tuple prefix is matched positionally against the actual
    /// arguments and substituted into the source argument list, which drops
    /// exactly the padding.
    pub fn restore_calls(&self, code: &str) -> String {
        let mut out = code.to_string();
        for entry in &self.ufuncs {
            loop {
                let Some(site) = call_sites(&out, Some(entry.name.as_str())).into_iter().next() else {
                    break;
                };
                let actual = site.arg_list();
                let args = if actual.len() == entry.arity {
                    entry
                        .oldargs
                        .iter()
                        .map(|old| match entry.args.iter().position(|formal| formal == old.trim()) {
                            Some(pos) => actual[pos].clone(),
                            None => rewrite_tokens(old, |t| {
                                let pos = entry.args.iter().position(|formal| formal == t.text)?;
                                (t.kind == TokenKind::Ident).then(|| paren_if_compound(&actual[pos]))
                            }),
                        })
                        .collect::<Vec<_>>()
                } else {
                    log::warn!(
                        "Call {}({}) does not match declared arity {}",
                        entry.name,
                        site.args,
                        entry.arity
                    );
                    actual
                };
                let args = self.subscript_calls(&args.join(","));
                out.replace_range(site.start..site.end, &format!("{}[{}]", entry.source_name(), args));
            }
        }
        out
    }

    /// Put constant names back in place of their integer values.
    ///
    /// Exact values win; `value-1` becomes `(name-1)`. Values below two are
    /// never rewritten.
    pub fn restore_consts(&self, code: &str) -> String {
        let values: Vec<(&Constant, i64)> = self
            .constants
            .iter()
            .filter_map(|c| c.int_value().map(|v| (c, v)))
            .collect();
        if values.is_empty() {
            return code.to_string();
        }
        rewrite_tokens(code, |t| {
            if t.kind != TokenKind::Number || !t.text.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let n: i64 = t.text.parse().ok()?;
            if n < 2 {
                return None;
            }
            if let Some((c, _)) = values.iter().find(|(_, v)| *v == n) {
                return Some(c.name.clone());
            }
            values
                .iter()
                .find(|(_, v)| v - 1 == n)
                .map(|(c, _)| format!("({}-1)", c.name))
        })
    }

    /// Replace constant names with their values.
    pub fn replace_consts(&self, expr: &str) -> String {
        rewrite_tokens(expr, |t| {
            if t.kind != TokenKind::Ident {
                return None;
            }
            self.constants
                .iter()
                .find(|c| c.name == t.text && c.has_value())
                .map(|c| c.value.clone())
        })
    }
}

/// Split an optional `[params] ->` prefix from a formula.
fn split_params(expr: &str) -> (Vec<String>, &str) {
    let trimmed = expr.trim_start();
    if !trimmed.starts_with('[') || !Formula::is_formula(trimmed) {
        return (Vec::new(), expr);
    }
    let Some(close) = matching_close(trimmed, 0) else {
        return (Vec::new(), expr);
    };
    match trimmed[close + 1..].trim_start().strip_prefix("->") {
        Some(rest) if rest.trim_start().starts_with('{') => {
            (split_top_level(&trimmed[1..close], ","), rest)
        }
        _ => (Vec::new(), expr),
    }
}

fn next_free_name(candidate: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(candidate) {
        return candidate.to_string();
    }
    let mut k = 2;
    loop {
        let name = format!("{}_{}", candidate, k);
        if !taken(&name) {
            return name;
        }
        k += 1;
    }
}

/// Tuple prefix ending at the last iterator an argument list mentions.
///
/// Argument lists without iterators are declared as written.
fn tuple_prefix(args: &[String], iterators: &[String]) -> Vec<String> {
    let last = args
        .iter()
        .flat_map(|arg| identifiers(arg))
        .filter_map(|(word, _)| iterators.iter().position(|it| *it == word))
        .max();
    match last {
        Some(pos) => iterators[..=pos].to_vec(),
        None => args.to_vec(),
    }
}

/// First position where two argument lists differ.
fn first_difference(a: &[String], b: &[String]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SubstitutionContext {
        SubstitutionContext::new().with_functions(&["index", "col", "f"])
    }

    fn iters(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_encode_adds_params() {
        let mut c = ctx();
        let out = c.encode("[N_R] -> {[i,j] : 0 <= i < N_R && index(i) <= j < index(i+1)}");
        assert_eq!(
            out,
            "[N_R, index_i_, index_ip1_] -> {[i,j] : 0 <= i < N_R && index_i_ <= j < index_ip1_}"
        );
    }

    #[test]
    fn test_encode_is_idempotent() {
        let mut c = ctx();
        let once = c.encode("{[i,j] : f(i, j) >= 0 && 0 <= i < N}");
        assert_eq!(once, "[f_icj_] -> {[i,j] : f_icj_ >= 0 && 0 <= i < N}");
        assert_eq!(c.encode(&once), once);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut c = ctx();
        let x = "{[i,j] : f(i, j) >= 0 && 0 <= i < N}";
        let encoded = c.encode(x);
        let decoded = c.decode(&encoded, RestoreStyle::Call);
        assert_eq!(decoded, x);
        assert_eq!(c.encode(&decoded), encoded);
        assert_eq!(
            c.decode(&encoded, RestoreStyle::Subscript),
            "[f_icj_] -> {[i,j] : f[i, j] >= 0 && 0 <= i < N}"
        );
    }

    #[test]
    fn test_unknown_calls_untouched() {
        let mut c = ctx();
        assert_eq!(c.encode("{[i] : g(i) > 0}"), "{[i] : g(i) > 0}");
    }

    #[test]
    fn test_nested_calls() {
        let mut c = ctx();
        let out = c.encode("{[j] : col(index(j)) >= 0}");
        assert_eq!(out, "[col_index_j__] -> {[j] : col_index_j__ >= 0}");
        assert_eq!(c.decode("col_index_j__", RestoreStyle::Subscript), "col[index[j]]");
    }

    #[test]
    fn test_decode_scan_iterators() {
        let mut c = ctx();
        c.encode("{[i,j] : index(i) <= j < index(i+1)}");
        let code = "for (int c1 = index_i_; c1 < index_ip1_; c1 += 1)";
        assert_eq!(
            c.decode_scan(code, &iters(&["i", "j"])),
            "for (int c1 = index[c0]; c1 < index[c0+1]; c1 += 1)"
        );
    }

    #[test]
    fn test_declare_renames_differing_args() {
        let mut c = ctx();
        let formula = "{[ii,kk,i,k,j] : index(i) <= j < index(i+1) && k = col(j)}";
        let (text, decls) = c.declare_calls(formula, &iters(&["ii", "kk", "i", "k", "j"]));
        assert_eq!(decls, vec!["index(3)", "col(5)", "index1(3)"]);
        assert_eq!(
            text,
            "{[ii,kk,i,k,j] : index(ii,kk,i) <= j < index1(ii,kk,i) && k = col(ii,kk,i,k,j)}"
        );
    }

    #[test]
    fn test_restore_renamed_and_padded_calls() {
        let mut c = ctx();
        let formula = "{[ii,kk,i,k,j] : index(i) <= j < index(i+1) && k = col(j)}";
        c.declare_calls(formula, &iters(&["ii", "kk", "i", "k", "j"]));
        let code = "for(itype j = index(ii,kk,i); j <= index1(ii,kk,i)-1; j++) {\n  itype k=col(ii,kk,i,k,j);";
        assert_eq!(
            c.restore_calls(code),
            "for(itype j = index[i]; j <= index[i+1]-1; j++) {\n  itype k=col[j];"
        );
    }

    #[test]
    fn test_restore_renamed_with_other_iterator_name() {
        let mut c = ctx();
        c.declare_calls("{[i,j] : index(i) <= j < index(i+1)}", &iters(&["i", "j"]));
        assert_eq!(c.restore_calls("index1(t1)"), "index[t1+1]");
    }

    #[test]
    fn test_declare_pads_to_tuple_prefix() {
        let mut c = ctx();
        let (text, decls) = c.declare_calls("{[i,j] : f(j) >= 0 && 0 <= i < N}", &iters(&["i", "j"]));
        assert_eq!(decls, vec!["f(2)"]);
        assert_eq!(text, "{[i,j] : f(i,j) >= 0 && 0 <= i < N}");
        assert_eq!(c.ufuncs()[0].padding(), 1);
        assert_eq!(c.restore_calls("f(t1,t2)"), "f[t2]");

        let (text, _) = c.declare_calls("{[i,j] : f(j,i) > 0}", &iters(&["i", "j"]));
        assert_eq!(text, "{[i,j] : f(i,j) > 0}");
        assert_eq!(c.restore_calls("f(t1,t2)"), "f[t2,t1]");
    }

    #[test]
    fn test_declare_mixed_arity() {
        let mut c = ctx();
        let (text, decls) = c.declare_calls("{[i,j] : f(i,j) >= 0 && f(i) < 3}", &iters(&["i", "j"]));
        assert_eq!(decls, vec!["f(2)", "f2(1)"]);
        assert_eq!(text, "{[i,j] : f(i,j) >= 0 && f2(i) < 3}");
        assert_eq!(c.restore_calls("f(t1,t2) >= 0 && f2(t1) < 3"), "f[t1,t2] >= 0 && f[t1] < 3");

        let (text, decls) = c.declare_calls("{[i,j] : f(i) < 3 && f(i,j) >= 0}", &iters(&["i", "j"]));
        assert_eq!(decls, vec!["f(1)", "f2(2)"]);
        assert_eq!(text, "{[i,j] : f(i) < 3 && f2(i,j) >= 0}");
        assert_eq!(c.restore_calls("f(t1) < 3 && f2(t1,t2) >= 0"), "f[t1] < 3 && f[t1,t2] >= 0");
    }

    #[test]
    fn test_renamed_variant_avoids_known_names() {
        let mut c = ctx();
        c.add_function("index1");
        let (text, decls) = c.declare_calls("{[i,j] : index(i) <= j < index(i+1)}", &iters(&["i", "j"]));
        assert_eq!(decls, vec!["index(1)", "index1_2(1)"]);
        assert_eq!(text, "{[i,j] : index(i) <= j < index1_2(i)}");
        assert_eq!(c.restore_calls("index1_2(t1)"), "index[t1+1]");
    }

    #[test]
    fn test_restore_consts() {
        let c = SubstitutionContext::new().with_constants(vec![Constant::new("N", "128")]);
        assert_eq!(c.restore_consts("for(i = 0; i <= 127; i++) x[128]"), "for(i = 0; i <= (N-1); i++) x[N]");
        assert_eq!(c.restore_consts("a128 + 1.28 + 1280"), "a128 + 1.28 + 1280");
    }

    #[test]
    fn test_restore_consts_precedence() {
        let c = SubstitutionContext::new().with_constants(vec![
            Constant::new("N", "4"),
            Constant::new("M", "3"),
            Constant::new("R", "2"),
            Constant::new("ONE", "1"),
        ]);
        // 3 matches M exactly before N-1; 1 is never rewritten
        assert_eq!(c.restore_consts("4 3 2 1 0"), "N M R 1 0");
    }

    #[test]
    fn test_replace_consts() {
        let c = SubstitutionContext::new()
            .with_constants(vec![Constant::new("R", "2"), Constant::symbolic("N")]);
        assert_eq!(c.replace_consts("i = ii*R+ri && ri < R && j < N"), "i = ii*2+ri && ri < 2 && j < N");
    }
}
