//! Symbolic polyhedral objects.
//!
//! This module provides the set-notation layer the compiler manipulates as
//! text:
//! - Bounded iterators ([`Var`]) and named sets with symbolic sizes
//! - Uninterpreted functions and transformation mappings
//! - Named constants
//! - A library of named formulas with textual relation application

pub mod text;
pub mod formula;
pub mod var;
pub mod set;
pub mod map;
pub mod constant;
pub mod operations;
pub mod library;

pub use constant::Constant;
pub use formula::Formula;
pub use library::SetLibrary;
pub use map::Function;
pub use operations::{Apply, Call, Union};
pub use set::{list_vars, Domain, Set};
pub use var::Var;
