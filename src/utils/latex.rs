//! LaTeX and DOT label formatting.

/// Format a formula fragment for a LaTeX math environment.
///
/// Braces are escaped, the number sets `R`, `Z` and `C` become blackboard
/// letters, underscores become subscripts and operators get their math
/// symbols.
pub fn latex_format(formula: &str) -> String {
    let escaped = formula.replace('{', "\\{").replace('}', "\\}");

    let mut out = if escaped == "R" || escaped == "Z" || escaped == "C" {
        format!("\\mathbb{{{}}}", escaped)
    } else if escaped.contains('_') {
        let mut items = escaped.split('_');
        let mut out = items.next().unwrap_or_default().to_string();
        for item in items {
            out.push_str(&format!("_{{{}}}", item));
        }
        out
    } else {
        escaped
    };

    const REPLACEMENTS: [(&str, &str); 7] = [
        ("<=", "\\leq"),
        (">=", "\\geq"),
        ("*", " \\times "),
        ("->", " \\rightarrow "),
        ("<-", " \\leftarrow "),
        ("&&", "\\wedge"),
        ("||", "\\vee"),
    ];
    for (from, to) in REPLACEMENTS {
        out = out.replace(from, to);
    }
    out
}

/// Format a node label for DOT HTML labels (`^x` superscripts, `_` subscripts).
pub fn dot_label(label: &str) -> String {
    let mut out = String::new();
    let mut chars = label.chars().peekable();
    let mut open_subs = 0;
    while let Some(c) = chars.next() {
        match c {
            '^' => {
                if let Some(exp) = chars.next() {
                    out.push_str(&format!("<sup>{}</sup>", exp));
                }
            }
            '_' if !out.is_empty() => {
                out.push_str("<sub>");
                open_subs += 1;
            }
            _ => out.push(c),
        }
    }
    for _ in 0..open_subs {
        out.push_str("</sub>");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latex_operators() {
        assert_eq!(latex_format("0 <= i"), "0 \\leq i");
        assert_eq!(latex_format("a && b"), "a \\wedge b");
        assert_eq!(latex_format("N*M"), "N \\times M");
    }

    #[test]
    fn test_latex_number_sets() {
        assert_eq!(latex_format("R"), "\\mathbb{R}");
        assert_eq!(latex_format("N_R"), "N_{R}");
    }

    #[test]
    fn test_latex_braces() {
        assert_eq!(latex_format("{[i]}"), "\\{[i]\\}");
    }

    #[test]
    fn test_dot_label() {
        assert_eq!(dot_label("N_R"), "N<sub>R</sub>");
        assert_eq!(dot_label("x^2"), "x<sup>2</sup>");
    }
}
