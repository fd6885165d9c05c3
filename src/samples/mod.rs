//! Ready-made flow graphs for common kernels.
//!
//! Each builder returns a complete graph with constants set and accesses
//! already flattened, so it can go straight to a visitor.

pub mod jacobi;
pub mod spmv;

pub use jacobi::{jacobi1d, jacobi2d};
pub use spmv::csr_spmv;
