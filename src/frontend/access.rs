//! Array access scanning and subscript flattening for statement text.

use crate::polyhedral::text::{is_numeric, matching_close, split_top_level};
use crate::utils::errors::{ParseError, ParseErrorKind};

/// Characters that separate accesses in statement text.
pub fn is_operator(c: char) -> bool {
    matches!(
        c,
        '*' | '/' | '%' | '+' | '-' | '&' | '|' | '(' | ')' | '=' | '.' | '!' | '<' | '>' | ','
            | '?' | ':' | ';' | '~' | '^'
    )
}

/// A statement split at its assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Assigned expression
    pub lhs: String,
    /// Assigned value
    pub rhs: String,
    /// `+=`, `-=`, `*=`, `/=` and friends also read the target
    pub compound: bool,
}

/// Split at the first `=` that is not part of a comparison.
pub fn split_assignment(stmt: &str) -> Option<Assignment> {
    let bytes = stmt.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'=' {
            continue;
        }
        let prev = if i > 0 { bytes[i - 1] } else { b' ' };
        let next = bytes.get(i + 1).copied().unwrap_or(b' ');
        if next == b'=' || matches!(prev, b'=' | b'<' | b'>' | b'!') {
            continue;
        }
        let compound = matches!(prev, b'+' | b'-' | b'*' | b'/' | b'%' | b'&' | b'|' | b'^');
        let end = if compound { i - 1 } else { i };
        let lhs = stmt[..end].trim();
        if lhs.is_empty() {
            return None;
        }
        return Some(Assignment {
            lhs: lhs.to_string(),
            rhs: stmt[i + 1..].trim().to_string(),
            compound,
        });
    }
    None
}

/// Accessed items of an expression, in order, duplicates kept.
///
/// Subscripts are atomic (`A[t-1,i]` is one access). Subscripted accesses
/// nested inside a subscript are listed before their container, so
/// `x[col[j]]` yields `col[j]` then `x[col[j]]`. Numbers and called names
/// are not accesses.
pub fn accesses(expr: &str) -> Vec<String> {
    let mut found = Vec::new();
    for item in top_level_accesses(expr) {
        found.extend(nested_accesses(&item));
        found.push(item);
    }
    found
}

/// Accesses not enclosed in another access's subscript.
pub fn top_level_accesses(expr: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut item = String::new();
    let mut depth = 0usize;
    for c in expr.chars() {
        if c.is_whitespace() {
            continue;
        }
        match c {
            '[' => {
                depth += 1;
                item.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                item.push(c);
            }
            _ if depth == 0 && is_operator(c) => {
                let text = std::mem::take(&mut item);
                if c != '(' {
                    push_access(text, &mut found);
                }
            }
            _ => item.push(c),
        }
    }
    push_access(item, &mut found);
    found
}

fn push_access(text: String, found: &mut Vec<String>) {
    if text.is_empty() || is_numeric(&text) {
        return;
    }
    if text.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        found.push(text);
    }
}

/// Subscripted accesses used inside the subscripts of `access`.
pub fn nested_accesses(access: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(open) = access[pos..].find('[').map(|p| p + pos) {
        let Some(close) = matching_close(access, open) else { break };
        found.extend(
            accesses(&access[open + 1..close])
                .into_iter()
                .filter(|a| a.contains('[')),
        );
        pos = close + 1;
    }
    found
}

/// Name accessed by an item (`A` for `A[i]` or `A(i)`).
pub fn base_name(access: &str) -> &str {
    let end = access.find(['[', '(']).unwrap_or(access.len());
    access[..end].trim()
}

/// Rewrite multi-dimensional subscripts as row-major offsets.
///
/// `A[i,j,k]` becomes `A[offset3(i,j,k,M,N)]` where `M` and `N` are the
/// extents of the trailing dimensions, as returned by `extents`. Nested
/// subscripts are rewritten first; subscripts already using an offset
/// helper are kept.
pub fn flatten<F>(text: &str, extents: &F) -> Result<String, ParseError>
where
    F: Fn(&str) -> Option<Vec<String>>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut pos = 0;
    while let Some(open) = text[pos..].find('[').map(|p| p + pos) {
        let close = matching_close(text, open).ok_or_else(|| {
            ParseError::new(ParseErrorKind::Syntax, format!("Unbalanced subscript in '{}'", text))
        })?;
        let name_start = text[..open]
            .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map(|p| p + 1)
            .unwrap_or(0);
        let name = &text[name_start..open];
        let inner = flatten(&text[open + 1..close], extents)?;
        let args = split_top_level(&inner, ",");

        out.push_str(&text[last..open]);
        if args.len() < 2 || inner.trim_start().starts_with("offset") || name.is_empty() {
            out.push('[');
            out.push_str(&inner);
            out.push(']');
        } else {
            out.push_str(&format!("[{}]", offset_call(name, &args, extents)?));
        }
        last = close + 1;
        pos = close + 1;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn offset_call<F>(name: &str, args: &[String], extents: &F) -> Result<String, ParseError>
where
    F: Fn(&str) -> Option<Vec<String>>,
{
    let rank = args.len();
    if rank > 4 {
        return Err(ParseError::new(
            ParseErrorKind::UnsupportedRank,
            format!("Access to '{}' has rank {}, at most 4 is supported", name, rank),
        ));
    }
    let dims = extents(name).unwrap_or_default();
    if dims.len() < rank {
        return Err(ParseError::new(
            ParseErrorKind::UnknownSet,
            format!(
                "Cannot flatten rank {} access to '{}' with {} known extents",
                rank,
                name,
                dims.len()
            ),
        ));
    }
    let strides = &dims[dims.len() - rank + 1..];
    Ok(format!("offset{}({},{})", rank, args.join(","), strides.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_assignment() {
        let a = split_assignment("A[t,i] = (A[t-1,i] + 1) / 3.0").unwrap();
        assert_eq!(a.lhs, "A[t,i]");
        assert!(!a.compound);

        let c = split_assignment("y[i]+=A[j]*x[col[j]]").unwrap();
        assert_eq!(c.lhs, "y[i]");
        assert_eq!(c.rhs, "A[j]*x[col[j]]");
        assert!(c.compound);

        let cmp = split_assignment("s = a <= b").unwrap();
        assert_eq!(cmp.lhs, "s");
        assert_eq!(cmp.rhs, "a <= b");

        assert!(split_assignment("f(a == b)").is_none());
    }

    #[test]
    fn test_accesses_keep_order_and_duplicates() {
        assert_eq!(
            accesses("(A[t-1,i-1] + A[t-1,i] + A[t-1,i+1]) / 3.0"),
            vec!["A[t-1,i-1]", "A[t-1,i]", "A[t-1,i+1]"]
        );
        assert_eq!(accesses("a*a + 2"), vec!["a", "a"]);
    }

    #[test]
    fn test_accesses_nested_and_calls() {
        assert_eq!(accesses("A[j]*x[col[j]]"), vec!["A[j]", "col[j]", "x[col[j]]"]);
        assert_eq!(top_level_accesses("b_col[nb]"), vec!["b_col[nb]"]);
        assert_eq!(nested_accesses("A_prime[b_index[ii]+k]"), vec!["b_index[ii]"]);
        assert_eq!(accesses("sqrt(v[i]) + alpha"), vec!["v[i]", "alpha"]);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("x[col[j]]"), "x");
        assert_eq!(base_name("A(jj,ri,ck)"), "A");
        assert_eq!(base_name("nb"), "nb");
    }

    #[test]
    fn test_flatten() {
        let extents = |name: &str| match name {
            "A" => Some(vec!["(T+1)".to_string(), "(N+2)".to_string()]),
            "B" => Some(vec!["L".to_string(), "M".to_string(), "N".to_string()]),
            _ => None,
        };
        assert_eq!(
            flatten("A[t,i] = A[t-1,i+1]", &extents).unwrap(),
            "A[offset2(t,i,(N+2))] = A[offset2(t-1,i+1,(N+2))]"
        );
        assert_eq!(
            flatten("B[i,j,k] + x[i]", &extents).unwrap(),
            "B[offset3(i,j,k,M,N)] + x[i]"
        );
        assert_eq!(flatten("A[offset2(t,i,M)]", &extents).unwrap(), "A[offset2(t,i,M)]");
    }

    #[test]
    fn test_flatten_errors() {
        let extents = |_: &str| Some(vec!["N".to_string(); 5]);
        let err = flatten("A[a,b,c,d,e]", &extents).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnsupportedRank);

        let none = |_: &str| None;
        assert_eq!(flatten("C[i,j]", &none).unwrap_err().kind, ParseErrorKind::UnknownSet);
    }
}
