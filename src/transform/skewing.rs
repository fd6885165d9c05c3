//! Loop skewing.
//!
//! Skewing offsets each output dimension of a schedule by a textual delta,
//! typically another iterator, to expose wavefront parallelism.
//!
//! Example:
//! ```text
//! sched := [T,N] -> { S[t,i] -> [t,i] };
//! ```
//! After skewing with offsets `["", "t"]`:
//! ```text
//! sched := [T,N] -> { S[t,i] -> [t,i+t] };
//! ```

use crate::polyhedral::Function;
use crate::transform::Transform;
use crate::utils::errors::{PdfgError, PdfgResult};

/// Per-dimension skew.
#[derive(Debug, Clone)]
pub struct Skew {
    /// Transformation name
    pub name: String,
    /// Delta per dimension; an empty delta keeps the dimension as is
    pub offsets: Vec<String>,
}

impl Skew {
    /// Skew each dimension by the matching offset.
    pub fn new(name: &str, offsets: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            offsets: offsets.iter().map(|o| o.to_string()).collect(),
        }
    }

    /// Skew the inner dimension by the outer one.
    pub fn wavefront(outer: &str) -> Self {
        Self::new("skew", &["", outer])
    }
}

impl Transform for Skew {
    fn apply(&self, schedule: &Function) -> PdfgResult<Function> {
        let set = schedule.sets.first().ok_or_else(|| {
            PdfgError::Internal(format!("Cannot skew '{}': schedule has no sets", schedule.name))
        })?;
        let iterators = set.tuple();
        if self.offsets.len() > iterators.len() {
            return Err(PdfgError::Internal(format!(
                "Skew '{}' has {} offsets for {} dimensions",
                self.name,
                self.offsets.len(),
                iterators.len()
            )));
        }

        let mut skewed = schedule.clone();
        for image in &mut skewed.images {
            for (i, offset) in self.offsets.iter().enumerate() {
                let offset = offset.trim();
                let mut entry = iterators[i].clone();
                if !offset.is_empty() {
                    if !offset.starts_with('-') && !offset.starts_with('+') {
                        entry.push('+');
                    }
                    entry.push_str(offset);
                }
                if i < image.len() {
                    image[i] = entry;
                } else {
                    image.push(entry);
                }
            }
        }
        Ok(skewed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::{Set, Var};

    fn schedule() -> Function {
        let set = Set::new("S", vec![Var::new("t", "1", "T"), Var::new("i", "1", "N")]);
        Function::identity("sched", set)
    }

    #[test]
    fn test_skew_offsets() {
        let sched = schedule();
        let skewed = Skew::new("skew", &["", "t"]).apply(&sched).unwrap();
        assert_eq!(skewed.to_string(), "sched := [T,N] -> { S[t,i] -> [t,i+t] };");
        assert_eq!(sched.mapping_exprs(), &["t", "i"]);
    }

    #[test]
    fn test_signed_offset_kept() {
        let skewed = Skew::new("skew", &["-1", "-t"]).apply(&schedule()).unwrap();
        assert_eq!(skewed.mapping_exprs(), &["t-1", "i-t"]);
    }

    #[test]
    fn test_empty_offsets_noop() {
        let sched = schedule();
        let same = Skew::new("skew", &[]).apply(&sched).unwrap();
        assert_eq!(same, sched);
    }

    #[test]
    fn test_too_many_offsets() {
        assert!(Skew::new("skew", &["1", "2", "3"]).apply(&schedule()).is_err());
    }
}
