//! Loop fusion.
//!
//! Fusion interleaves several iteration spaces into one total order. Each
//! set's image is prefixed with a shared index dimension and suffixed with
//! the set's rank, so the scanner emits a single loop nest.

use std::fmt;

use crate::polyhedral::{list_vars, Function, Set};
use crate::transform::Transform;
use crate::utils::errors::PdfgResult;
use crate::utils::latex::latex_format;

/// Fusion of a group of sets.
#[derive(Debug, Clone)]
pub struct Fuse {
    /// Name of the fused schedule
    pub name: String,
    /// Sets to interleave
    pub sets: Vec<Set>,
    /// Leading dimension shared by every image
    pub index: i64,
    /// Rank per set; defaults to declaration order
    pub ordering: Vec<i64>,
}

impl Fuse {
    /// Fuse `sets` at loop depth `index`.
    pub fn new(name: &str, sets: Vec<Set>, index: i64) -> Self {
        let ordering = (0..sets.len() as i64).collect();
        Self {
            name: name.to_string(),
            sets,
            index,
            ordering,
        }
    }

    /// Explicit statement order inside the fused loop.
    pub fn with_ordering(mut self, ordering: Vec<i64>) -> Self {
        self.ordering = ordering;
        self
    }

    fn rank(&self, position: usize) -> i64 {
        self.ordering.get(position).copied().unwrap_or(position as i64)
    }

    fn image(&self, set: &Set, position: usize) -> Vec<String> {
        let mut image = vec![self.index.to_string()];
        image.extend(set.tuple());
        image.push(self.rank(position).to_string());
        image
    }

    fn fuse(&self, sets: &[Set]) -> Function {
        Function {
            name: self.name.clone(),
            args: Vec::new(),
            sets: sets.to_vec(),
            images: sets
                .iter()
                .enumerate()
                .map(|(pos, set)| self.image(set, pos))
                .collect(),
        }
    }

    /// The fused schedule over this transformation's own sets.
    pub fn to_function(&self) -> Function {
        self.fuse(&self.sets)
    }

    /// LaTeX rendering.
    pub fn latex(&self) -> String {
        let maps = self
            .sets
            .iter()
            .enumerate()
            .map(|(pos, set)| {
                format!(
                    "{}[{}] \\rightarrow [{}]",
                    latex_format(&set.name),
                    set.tuple().join(","),
                    self.image(set, pos).join(",")
                )
            })
            .collect::<Vec<_>>();
        format!("{} &= \\{{ {} \\}}", latex_format(&self.name), maps.join(", "))
    }
}

impl Transform for Fuse {
    /// Interleave the schedule's sets, or this fusion's own sets when the
    /// schedule is empty.
    fn apply(&self, schedule: &Function) -> PdfgResult<Function> {
        if schedule.sets.is_empty() {
            Ok(self.to_function())
        } else {
            Ok(self.fuse(&schedule.sets))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Fuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} := [{}] -> {{", self.name, list_vars(&self.sets).join(","))?;
        for (pos, set) in self.sets.iter().enumerate() {
            writeln!(
                f,
                "    {}[{}] -> [{}];",
                set.name,
                set.tuple().join(","),
                self.image(set, pos).join(",")
            )?;
        }
        write!(f, "}};")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::Var;

    fn sets() -> Vec<Set> {
        vec![
            Set::new("S0", vec![Var::new("i", "0", "N").with_tightness(true, false)]),
            Set::new("S1", vec![Var::new("i", "0", "M").with_tightness(true, false)]),
        ]
    }

    #[test]
    fn test_default_ordering() {
        let fuse = Fuse::new("F", sets(), 0);
        assert_eq!(
            fuse.to_string(),
            "F := [N,M] -> {\n    S0[i] -> [0,i,0];\n    S1[i] -> [0,i,1];\n};"
        );
    }

    #[test]
    fn test_custom_ordering() {
        let fuse = Fuse::new("F", sets(), 2).with_ordering(vec![1, 0]);
        let fused = fuse.to_function();
        assert_eq!(fused.images[0], vec!["2", "i", "1"]);
        assert_eq!(fused.images[1], vec!["2", "i", "0"]);
    }

    #[test]
    fn test_apply_uses_schedule_sets() {
        let fuse = Fuse::new("F", Vec::new(), 0);
        let sched = Function::mapping("s", sets(), vec!["i".into()]);
        let fused = fuse.apply(&sched).unwrap();
        assert_eq!(fused.sets.len(), 2);
        assert_eq!(fused.to_string(), "F := [N,M] -> { S0[i] -> [0,i,0]; S1[i] -> [0,i,1] };");
    }
}
