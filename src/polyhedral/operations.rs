//! Solver statements combining named sets and relations.

use std::fmt;

/// `name := lhs * rhs;` (relation applied to a set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apply {
    /// Assigned name
    pub name: String,
    /// Relation
    pub lhs: String,
    /// Set
    pub rhs: String,
}

impl Apply {
    /// `name := lhs * rhs`.
    pub fn new(name: &str, lhs: &str, rhs: &str) -> Self {
        Self {
            name: name.to_string(),
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
        }
    }
}

impl fmt::Display for Apply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} := {} * {};", self.name, self.lhs, self.rhs)
    }
}

/// `name := lhs + rhs;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Union {
    /// Assigned name
    pub name: String,
    /// Left operand
    pub lhs: String,
    /// Right operand
    pub rhs: String,
}

impl Union {
    /// `name := lhs + rhs`.
    pub fn new(name: &str, lhs: &str, rhs: &str) -> Self {
        Self {
            name: name.to_string(),
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
        }
    }
}

impl fmt::Display for Union {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} := {} + {};", self.name, self.lhs, self.rhs)
    }
}

/// A calculator command such as `codegen(S);`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Command name
    pub name: String,
    /// Arguments, comma separated on output
    pub args: Vec<String>,
}

impl Call {
    /// Command `name` over `args`.
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({});", self.name, self.args.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(Apply::new("Idense", "Tdense", "Icsr").to_string(), "Idense := Tdense * Icsr;");
        assert_eq!(Union::new("U", "S1", "S2").to_string(), "U := S1 + S2;");
        assert_eq!(Call::new("codegen", &["U"]).to_string(), "codegen(U);");
    }
}
