//! Loop tiling.
//!
//! Tiling splits selected iterators into a tile coordinate and an
//! intra-tile offset:
//! ```text
//! {[i,k,j] -> [ii,kk,i,k,j] : exists(ri,ck : 0 <= ri < R && i = ii*R+ri
//!                                 && 0 <= ck < C && k = kk*C+ck)}
//! ```
//! The relation form feeds textual composition; [`Transform::apply`] maps
//! a schedule directly by prefixing `floor(e/size)` tile dimensions.

use crate::polyhedral::{Formula, Function};
use crate::transform::Transform;
use crate::utils::errors::{PdfgError, PdfgResult};

/// One tiled iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileDim {
    /// Iterator being tiled
    pub iterator: String,
    /// Tile extent (symbolic or numeric)
    pub size: String,
    /// Name of the tile coordinate
    pub tile: String,
    /// Name of the intra-tile offset
    pub offset: String,
}

/// Rectangular tiling.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Transformation name
    pub name: String,
    /// Tiled dimensions, outermost first
    pub dims: Vec<TileDim>,
}

impl Tile {
    /// Tiling with no dimensions yet.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dims: Vec::new(),
        }
    }

    /// Tile `iterator` by `size`, naming the tile `<it><it>` and the offset `r<it>`.
    pub fn dim(self, iterator: &str, size: &str) -> Self {
        let tile = format!("{0}{0}", iterator);
        let offset = format!("r{}", iterator);
        self.dim_named(iterator, size, &tile, &offset)
    }

    /// Tile with explicit tile and offset names.
    pub fn dim_named(mut self, iterator: &str, size: &str, tile: &str, offset: &str) -> Self {
        self.dims.push(TileDim {
            iterator: iterator.to_string(),
            size: size.to_string(),
            tile: tile.to_string(),
            offset: offset.to_string(),
        });
        self
    }

    /// Tiling relation over the given input tuple.
    pub fn relation(&self, input: &[&str]) -> PdfgResult<Formula> {
        for dim in &self.dims {
            if !input.contains(&dim.iterator.as_str()) {
                return Err(PdfgError::Internal(format!(
                    "Tile '{}' refers to unknown iterator '{}'",
                    self.name, dim.iterator
                )));
            }
        }

        let mut output: Vec<String> = self.dims.iter().map(|d| d.tile.clone()).collect();
        output.extend(input.iter().map(|s| s.to_string()));

        let mut formula = Formula::set(input, &[]);
        formula.output = Some(output);
        if !self.dims.is_empty() {
            let offsets = self
                .dims
                .iter()
                .map(|d| d.offset.as_str())
                .collect::<Vec<_>>()
                .join(",");
            let constraints = self
                .dims
                .iter()
                .map(|d| {
                    format!(
                        "0 <= {off} < {size} && {it} = {tile}*{size}+{off}",
                        off = d.offset,
                        size = d.size,
                        it = d.iterator,
                        tile = d.tile
                    )
                })
                .collect::<Vec<_>>()
                .join(" && ");
            formula.conditions = vec![format!("exists({} : {})", offsets, constraints)];
        }
        Ok(formula)
    }
}

impl Transform for Tile {
    fn apply(&self, schedule: &Function) -> PdfgResult<Function> {
        let mut tiled = schedule.clone();
        for (set, image) in tiled.sets.iter().zip(tiled.images.iter_mut()) {
            let tuple = set.tuple();
            let mut prefix = Vec::with_capacity(self.dims.len());
            for dim in &self.dims {
                let pos = tuple.iter().position(|t| t == &dim.iterator).ok_or_else(|| {
                    PdfgError::Internal(format!(
                        "Tile '{}' refers to unknown iterator '{}' in '{}'",
                        self.name, dim.iterator, set.name
                    ))
                })?;
                let entry = image.get(pos).unwrap_or(&dim.iterator);
                prefix.push(format!("floor(({})/{})", entry, dim.size));
            }
            prefix.append(image);
            *image = prefix;
        }
        Ok(tiled)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::{Set, Var};

    #[test]
    fn test_block_relation() {
        let tile = Tile::new("Ttile")
            .dim_named("i", "R", "ii", "ri")
            .dim_named("k", "C", "kk", "ck");
        let rel = tile.relation(&["i", "k", "j"]).unwrap();
        assert_eq!(
            rel.to_string(),
            "{[i,k,j] -> [ii,kk,i,k,j] : exists(ri,ck : 0 <= ri < R && i = ii*R+ri && 0 <= ck < C && k = kk*C+ck)}"
        );
    }

    #[test]
    fn test_default_names() {
        let rel = Tile::new("T").dim("i", "32").relation(&["i"]).unwrap();
        assert_eq!(rel.output.as_deref(), Some(&["ii".to_string(), "i".to_string()][..]));
        assert_eq!(rel.exists_vars(), vec!["ri"]);
    }

    #[test]
    fn test_unknown_iterator() {
        assert!(Tile::new("T").dim("q", "4").relation(&["i"]).is_err());
    }

    #[test]
    fn test_apply_schedule() {
        let set = Set::new("S", vec![Var::new("i", "0", "N"), Var::new("j", "0", "M")]);
        let sched = Function::identity("sched", set);
        let tiled = Tile::new("T").dim("i", "32").dim("j", "32").apply(&sched).unwrap();
        assert_eq!(
            tiled.mapping_exprs(),
            &["floor((i)/32)", "floor((j)/32)", "i", "j"]
        );
    }
}
