//! Named symbolic constants.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::errors::{ParseError, ParseErrorKind};
use crate::utils::latex::latex_format;

/// A named runtime parameter with an optional value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    /// Symbol name
    pub name: String,
    /// Literal value, empty when only declared
    pub value: String,
    /// C type inferred from the value
    pub ty: String,
}

impl Constant {
    /// Create a constant, inferring its C type from the value.
    pub fn new(name: &str, value: &str) -> Self {
        let ty = if value.contains('"') {
            "char*"
        } else if value.contains('.') {
            "float"
        } else {
            "int"
        };
        Self {
            name: name.to_string(),
            value: value.to_string(),
            ty: ty.to_string(),
        }
    }

    /// A constant that is declared but has no value.
    pub fn symbolic(name: &str) -> Self {
        Self::new(name, "")
    }

    /// Parse `N := 128`.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim().trim_end_matches(';');
        let (name, value) = text.split_once(":=").ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::Syntax,
                format!("Expected 'name := value', found '{}'", text),
            )
        })?;
        Ok(Self::new(name.trim(), value.trim()))
    }

    /// Whether a value was given.
    pub fn has_value(&self) -> bool {
        !self.value.is_empty()
    }

    /// Integer value, if the constant has one.
    pub fn int_value(&self) -> Option<i64> {
        self.value.parse().ok()
    }

    /// Solver declaration line.
    pub fn omega(&self) -> String {
        format!("symbolic {};", self.name)
    }

    /// LaTeX rendering.
    pub fn latex(&self) -> String {
        format!("{} &= {}", latex_format(&self.name), self.value)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} := {};", self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_types() {
        let n = Constant::parse("N := 128").unwrap();
        assert_eq!(n.name, "N");
        assert_eq!(n.int_value(), Some(128));
        assert_eq!(n.ty, "int");
        assert_eq!(n.to_string(), "N := 128;");
        assert_eq!(n.omega(), "symbolic N;");

        assert_eq!(Constant::new("eps", "0.01").ty, "float");
        assert_eq!(Constant::new("path", "\"a.mtx\"").ty, "char*");
        assert!(Constant::parse("N 128").is_err());
    }
}
