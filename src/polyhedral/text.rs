//! Token-level helpers for set/relation notation and generated C text.
//!
//! All string surgery on formulas and solver output goes through these
//! helpers, so identifiers are never matched inside longer identifiers and
//! numbers are never matched inside decimals.

use once_cell::sync::Lazy;
use regex::Regex;

static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("static pattern")
});

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"));

/// Words of the set-calculator languages that are never symbols.
pub const KEYWORDS: &[&str] = &[
    "exists", "union", "intersection", "complement", "compose", "inverse",
    "domain", "range", "hull", "codegen", "farkas", "forall", "given", "and",
    "or", "not", "within", "subsetof", "supersetof", "symbolic", "floor", "ceil",
    "min", "max", "mod",
];

/// Check whether a word is a calculator keyword.
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Check whether text is a (possibly signed) numeric literal.
pub fn is_numeric(s: &str) -> bool {
    NUMERIC_RE.is_match(s.trim())
}

/// Check whether text is a single C identifier.
pub fn is_identifier(s: &str) -> bool {
    IDENT_RE.is_match(s)
}

/// Check whether text contains an arithmetic operator.
pub fn has_operator(s: &str) -> bool {
    s.chars().any(|c| matches!(c, '+' | '-' | '*' | '/' | '%'))
}

/// Parenthesise compound expressions so they survive concatenation.
pub fn paren_if_compound(s: &str) -> String {
    if has_operator(s) {
        format!("({})", s)
    } else {
        s.to_string()
    }
}

/// Map expression text onto a solver-identifier-safe alphabet.
///
/// Whitespace is dropped; brackets become `_` and operators become letters.
pub fn replace_chars(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '(' | ')' | '[' | ']' => '_',
            '+' => 'p',
            '-' => 'm',
            '*' => 't',
            '/' => 'd',
            '%' => 'r',
            ',' => 'c',
            other => other,
        })
        .collect()
}

/// Index of the bracket closing the one at `open`.
pub fn matching_close(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, b) in s.bytes().enumerate().skip(open) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on `sep` outside of any brackets, trimming and dropping empty parts.
pub fn split_top_level(s: &str, sep: &str) -> Vec<String> {
    let bytes = s.as_bytes();
    let sep_bytes = sep.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if depth == 0 && !sep_bytes.is_empty() && bytes[i..].starts_with(sep_bytes) {
            parts.push(s[start..i].trim().to_string());
            i += sep_bytes.len();
            start = i;
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    parts.push(s[start..].trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Split a constraint list into conjuncts on `&&` or `and`.
pub fn split_conjuncts(s: &str) -> Vec<String> {
    split_top_level(s, "&&")
        .iter()
        .flat_map(|part| split_top_level(part, " and "))
        .collect()
}

/// Lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier
    Ident,
    /// Number, including suffixed forms such as `3.0` or `8i`
    Number,
    /// Any other single character
    Punct,
}

/// A token borrowed from its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token class
    pub kind: TokenKind,
    /// Token text
    pub text: &'a str,
    /// Byte offset in the source
    pub start: usize,
}

impl Token<'_> {
    /// Byte offset one past the token.
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Split text into identifier, number and punctuation tokens (whitespace dropped).
pub fn tokenize(s: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = s.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        let kind = if c.is_ascii_alphabetic() || c == '_' {
            TokenKind::Ident
        } else if c.is_ascii_digit() {
            TokenKind::Number
        } else if c.is_whitespace() {
            continue;
        } else {
            tokens.push(Token { kind: TokenKind::Punct, text: &s[start..start + c.len_utf8()], start });
            continue;
        };

        let mut end = start + c.len_utf8();
        while let Some(&(i, n)) = chars.peek() {
            let continues = n.is_ascii_alphanumeric()
                || n == '_'
                || (kind == TokenKind::Number && n == '.');
            if !continues {
                break;
            }
            end = i + n.len_utf8();
            chars.next();
        }
        tokens.push(Token { kind, text: &s[start..end], start });
    }
    tokens
}

/// Rebuild text, replacing each token for which `f` yields a substitute.
pub fn rewrite_tokens<F>(s: &str, mut f: F) -> String
where
    F: FnMut(&Token<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for token in tokenize(s) {
        if let Some(replacement) = f(&token) {
            out.push_str(&s[last..token.start]);
            out.push_str(&replacement);
            last = token.end();
        }
    }
    out.push_str(&s[last..]);
    out
}

/// Replace whole-word occurrences of an identifier.
pub fn replace_word(s: &str, word: &str, replacement: &str) -> String {
    rewrite_tokens(s, |t| {
        (t.kind == TokenKind::Ident && t.text == word).then(|| replacement.to_string())
    })
}

/// Wrap every occurrence of the given identifiers in parentheses.
pub fn parenthesize_words(s: &str, words: &[String]) -> String {
    rewrite_tokens(s, |t| {
        (t.kind == TokenKind::Ident && words.iter().any(|w| w == t.text))
            .then(|| format!("({})", t.text))
    })
}

/// Identifiers in order of appearance, flagged when used as a call.
pub fn identifiers(s: &str) -> Vec<(String, bool)> {
    tokenize(s)
        .into_iter()
        .filter(|t| t.kind == TokenKind::Ident)
        .map(|t| {
            let is_call = s[t.end()..].trim_start().starts_with('(');
            (t.text.to_string(), is_call)
        })
        .collect()
}

/// One `name(args)` occurrence in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Called name
    pub name: String,
    /// Raw argument text between the parentheses
    pub args: String,
    /// Byte offset of the name
    pub start: usize,
    /// Byte offset one past the closing parenthesis
    pub end: usize,
}

impl CallSite {
    /// Arguments split at top-level commas.
    pub fn arg_list(&self) -> Vec<String> {
        split_top_level(&self.args, ",")
    }
}

/// All call sites of `name` (every call when `name` is `None`), outermost first.
pub fn call_sites(s: &str, name: Option<&str>) -> Vec<CallSite> {
    let mut sites = Vec::new();
    let mut skip_until = 0;
    for token in tokenize(s) {
        if token.kind != TokenKind::Ident || token.start < skip_until {
            continue;
        }
        if name.map_or(false, |n| n != token.text) {
            continue;
        }
        let after = &s[token.end()..];
        let gap = after.len() - after.trim_start().len();
        let open = token.end() + gap;
        if !s[open..].starts_with('(') {
            continue;
        }
        if let Some(close) = matching_close(s, open) {
            sites.push(CallSite {
                name: token.text.to_string(),
                args: s[open + 1..close].to_string(),
                start: token.start,
                end: close + 1,
            });
            if name.is_none() {
                skip_until = close + 1;
            }
        }
    }
    sites
}

/// Calls of uninterpreted functions, looking inside keyword calls such as `exists(...)`.
///
/// Offsets of calls found inside a keyword call are relative to its arguments.
pub fn function_calls(s: &str) -> Vec<CallSite> {
    let mut found = Vec::new();
    for site in call_sites(s, None) {
        if is_keyword(&site.name) {
            found.extend(function_calls(&site.args));
        } else {
            found.push(site);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_top_level_respects_brackets() {
        let parts = split_conjuncts("0 <= i < N && exists(ri : 0 <= ri && ri < R) && f(a,b) > 0");
        assert_eq!(parts, vec!["0 <= i < N", "exists(ri : 0 <= ri && ri < R)", "f(a,b) > 0"]);
    }

    #[test]
    fn test_split_and_keyword() {
        assert_eq!(split_conjuncts("i < N and j < M"), vec!["i < N", "j < M"]);
    }

    #[test]
    fn test_numeric() {
        assert!(is_numeric("3.0"));
        assert!(is_numeric("-12"));
        assert!(!is_numeric("N"));
        assert!(!is_numeric("2i"));
    }

    #[test]
    fn test_replace_word_is_whole_word() {
        assert_eq!(replace_word("t1 + t10", "t1", "i"), "i + t10");
        assert_eq!(replace_word("b_index(i) + index(i)", "index", "x"), "b_index(i) + x(i)");
    }

    #[test]
    fn test_tokenize_numbers_with_decimals() {
        let tokens = tokenize("x = 1.5 + 1;");
        let numbers: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.text)
            .collect();
        assert_eq!(numbers, vec!["1.5", "1"]);
    }

    #[test]
    fn test_call_sites_nested() {
        let sites = call_sites("col(index(i+1)) + index(i)", Some("index"));
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].args, "i+1");
        assert_eq!(sites[1].args, "i");

        let outer = call_sites("col(index(i+1)) + f(a, b)", None);
        assert_eq!(outer.len(), 2);
        assert_eq!(outer[1].arg_list(), vec!["a", "b"]);
    }

    #[test]
    fn test_function_calls_inside_exists() {
        let names: Vec<String> = function_calls("i < N && exists(k : k = col(j) && floor(k/C) = kk)")
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["col"]);
    }

    #[test]
    fn test_replace_chars() {
        assert_eq!(replace_chars("i + 1"), "ip1");
        assert_eq!(replace_chars("a,b"), "acb");
        assert_eq!(replace_chars("(k/C)"), "_kdC_");
    }

    #[test]
    fn test_paren_if_compound() {
        assert_eq!(paren_if_compound("N+1"), "(N+1)");
        assert_eq!(paren_if_compound("N"), "N");
    }
}
