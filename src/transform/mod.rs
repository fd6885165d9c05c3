//! Schedule transformations.
//!
//! Each transformation takes a schedule [`Function`] and returns a new one;
//! the input is never mutated. The resulting mappings are rendered into
//! solver queries, which do the actual reordering.

pub mod skewing;
pub mod fusion;
pub mod tiling;

pub use fusion::Fuse;
pub use skewing::Skew;
pub use tiling::Tile;

use crate::polyhedral::Function;
use crate::utils::errors::PdfgResult;

/// Transformation pass trait.
pub trait Transform {
    /// Apply the transformation to a schedule.
    fn apply(&self, schedule: &Function) -> PdfgResult<Function>;

    /// Get transformation name.
    fn name(&self) -> &str;
}

/// Apply transformations left to right.
pub fn compose(schedule: &Function, passes: &[&dyn Transform]) -> PdfgResult<Function> {
    let mut current = schedule.clone();
    for pass in passes {
        log::debug!("Applying {} to {}", pass.name(), current.name);
        current = pass.apply(&current)?;
    }
    Ok(current)
}
