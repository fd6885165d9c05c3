//! Utility modules shared across the compiler.
//!
//! - Error types
//! - Code formatting
//! - LaTeX/DOT label formatting

pub mod errors;
pub mod pretty;
pub mod latex;

// Re-exports
pub use errors::*;
pub use latex::{dot_label, latex_format};
pub use pretty::CodeFormatter;
