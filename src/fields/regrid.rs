//! Import of fields defined on another grid.
//!
//! Bilinear in (x, y), linear in the vertical. Categorical fields take the
//! nearest source cell and are restricted to their allowed values.

use super::{FieldStore, FieldShape};
use crate::error::{IceError, Result};
use crate::types::FieldId;

/// A global source array in `(x, y[, level])` order.
#[derive(Clone, Copy, Debug)]
pub struct SourceField<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    /// Vertical levels of 3-D sources
    pub levels: Option<&'a [f64]>,
    pub data: &'a [f64],
}

/// Index `i` and weight `w` with `v ≈ (1-w)·c[i] + w·c[i+1]`, clamped to the ends.
fn bracket(coords: &[f64], v: f64) -> (usize, f64) {
    let n = coords.len();
    if n < 2 || v <= coords[0] {
        return (0, 0.0);
    }
    if v >= coords[n - 1] {
        return (n - 2, 1.0);
    }
    let i = coords.partition_point(|&c| c <= v).saturating_sub(1).min(n - 2);
    let w = (v - coords[i]) / (coords[i + 1] - coords[i]);
    (i, w)
}

fn nearest_index(coords: &[f64], v: f64) -> usize {
    let (i, w) = bracket(coords, v);
    if coords.len() > 1 && w > 0.5 { i + 1 } else { i }
}

impl<'a> SourceField<'a> {
    fn nz(&self) -> usize {
        self.levels.map_or(1, |l| l.len())
    }

    /// Check sizes and monotonic coordinates.
    pub fn validate(&self, name: &str) -> Result<()> {
        let expected = self.x.len() * self.y.len() * self.nz();
        if self.data.len() != expected {
            return Err(IceError::ShapeMismatch {
                field: name.to_string(),
                expected: expected.to_string(),
                found: self.data.len().to_string(),
            });
        }
        let ascending = |c: &[f64]| c.windows(2).all(|w| w[1] > w[0]);
        if !ascending(self.x) || !ascending(self.y) || !self.levels.is_none_or(ascending) {
            return Err(IceError::input("", format!("coordinates of '{}' are not strictly increasing", name)));
        }
        Ok(())
    }

    #[inline]
    fn value(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[(i * self.y.len() + j) * self.nz() + k]
    }

    fn level_value(&self, k: usize, x: f64, y: f64) -> f64 {
        let (i, wx) = bracket(self.x, x);
        let (j, wy) = bracket(self.y, y);
        let i1 = (i + 1).min(self.x.len() - 1);
        let j1 = (j + 1).min(self.y.len() - 1);
        (1.0 - wx) * (1.0 - wy) * self.value(i, j, k)
            + wx * (1.0 - wy) * self.value(i1, j, k)
            + (1.0 - wx) * wy * self.value(i, j1, k)
            + wx * wy * self.value(i1, j1, k)
    }

    /// Interpolate the column at `(x, y)` onto `target_levels`.
    pub fn interpolate_column(&self, x: f64, y: f64, target_levels: &[f64], out: &mut [f64]) {
        match self.levels {
            None => {
                let v = self.level_value(0, x, y);
                out.iter_mut().for_each(|o| *o = v);
            }
            Some(levels) => {
                for (o, &z) in out.iter_mut().zip(target_levels) {
                    let (k, w) = bracket(levels, z);
                    let k1 = (k + 1).min(levels.len() - 1);
                    *o = (1.0 - w) * self.level_value(k, x, y) + w * self.level_value(k1, x, y);
                }
            }
        }
    }

    /// Value of the nearest source cell.
    pub fn nearest(&self, x: f64, y: f64) -> f64 {
        self.value(nearest_index(self.x, x), nearest_index(self.y, y), 0)
    }
}

/// Fill field `id` from `src`.
pub fn regrid_into(store: &mut FieldStore, id: FieldId, src: &SourceField<'_>) -> Result<()> {
    let grid = std::sync::Arc::clone(store.grid());
    let (shape, allowed) = {
        let field = store.field(id)?;
        src.validate(field.name())?;
        (field.shape(), field.meta().flag_values.clone())
    };
    let levels: Vec<f64> = match shape {
        FieldShape::Ice3D => grid.z().to_vec(),
        FieldShape::Bedrock3D => grid.zb().to_vec(),
        _ => vec![0.0],
    };
    if shape == FieldShape::Vector2D {
        return Err(IceError::config("vector fields are regridded one component at a time"));
    }

    let mut w = store.access_mut(id)?;
    for (i, j) in grid.points() {
        let (x, y) = (grid.x(i), grid.y(j));
        if allowed.is_empty() {
            src.interpolate_column(x, y, &levels, w.column_mut(i, j));
        } else {
            let v = src.nearest(x, y);
            let v = if allowed.contains(&v) { v } else { allowed[0] };
            w.set(i, j, v);
        }
    }
    Ok(())
}
