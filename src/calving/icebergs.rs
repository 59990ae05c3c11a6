//! Removal of floating ice that is not attached to grounded ice.
//!
//! Connectivity is global, so rank 0 gathers the mask, labels every icy
//! cell reachable from grounded ice through 4-connected icy neighbours,
//! and broadcasts the cells to remove. Cells carrying a Dirichlet
//! velocity condition (`bc_mask`) are never removed.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use super::remove_ice;
use crate::components::{CalvingModel, CalvingStats, Component, InitContext};
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::geometry::{CellType, cell_type};
use crate::grid::{Grid, Periodicity};
use crate::io::gather_field;
use crate::types::FieldId;

/// Flag floating cells not connected to grounded ice.
///
/// `mask` and `bc_mask` are global arrays indexed `i * my + j`.
pub fn find_icebergs(mx: usize, my: usize, periodicity: Periodicity, mask: &[f64], bc_mask: &[f64]) -> Vec<bool> {
    let at = |i: usize, j: usize| i * my + j;
    let mut attached = vec![false; mx * my];
    let mut queue = VecDeque::new();
    for i in 0..mx {
        for j in 0..my {
            if cell_type(mask[at(i, j)]) == CellType::Grounded {
                attached[at(i, j)] = true;
                queue.push_back((i, j));
            }
        }
    }

    let step = |n: usize, m: usize, delta: isize, wrap: bool| -> Option<usize> {
        let next = n as isize + delta;
        if (0..m as isize).contains(&next) {
            Some(next as usize)
        } else if wrap {
            Some(next.rem_euclid(m as isize) as usize)
        } else {
            None
        }
    };
    while let Some((i, j)) = queue.pop_front() {
        let neighbours = [
            step(i, mx, 1, periodicity.x()).map(|a| (a, j)),
            step(i, mx, -1, periodicity.x()).map(|a| (a, j)),
            step(j, my, 1, periodicity.y()).map(|b| (i, b)),
            step(j, my, -1, periodicity.y()).map(|b| (i, b)),
        ];
        for (a, b) in neighbours.into_iter().flatten() {
            let n = at(a, b);
            if !attached[n] && cell_type(mask[n]).is_icy() {
                attached[n] = true;
                queue.push_back((a, b));
            }
        }
    }

    (0..mx * my)
        .map(|n| !attached[n] && cell_type(mask[n]) == CellType::Floating && bc_mask[n] <= 0.5)
        .collect()
}

#[derive(Clone, Copy, Debug)]
struct IcebergFields {
    thk: FieldId,
    href: FieldId,
    mask: FieldId,
    bc_mask: FieldId,
}

/// Removes icebergs after every mass continuity step.
#[derive(Debug, Default)]
pub struct IcebergRemover {
    grid: Option<Arc<Grid>>,
    fields: Option<IcebergFields>,
}

impl IcebergRemover {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for IcebergRemover {
    fn name(&self) -> &str {
        "iceberg_remover"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.fields = Some(IcebergFields {
            thk: store.ensure(Var::Thickness)?,
            href: store.ensure(Var::ThicknessRef)?,
            mask: store.ensure(Var::Mask)?,
            bc_mask: store.ensure(Var::BcMask)?,
        });
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["thk", "Href", "mask", "bc_mask"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["thk", "Href"]
    }
}

impl CalvingModel for IcebergRemover {
    fn update(&mut self, _t: f64, _dt: f64, _sea_level: f64, store: &mut FieldStore) -> Result<CalvingStats> {
        let (grid, f) = self.grid.clone().zip(self.fields).ok_or_else(|| IceError::Lifecycle {
            component: "iceberg_remover".into(),
            state: "uninitialized".into(),
        })?;
        let (mx, my) = (grid.mx(), grid.my());

        let mask = gather_field(store, f.mask)?;
        let bc = gather_field(store, f.bc_mask)?;
        let flags = match (mask, bc) {
            (Some(mask), Some(bc)) => find_icebergs(mx, my, grid.periodicity(), &mask[0], &bc[0])
                .into_iter()
                .map(|b| if b { 1.0 } else { 0.0 })
                .collect(),
            _ => Vec::new(),
        };
        let flags = grid.comm().broadcast(flags)?;
        if flags.len() != mx * my {
            return Err(IceError::Comm(format!(
                "iceberg flags have {} entries, expected {}",
                flags.len(),
                mx * my
            )));
        }

        let mut stats = CalvingStats::default();
        let ([mut thk, mut href], _view) = store.split_mut([f.thk, f.href])?;
        for (i, j) in grid.points() {
            if flags[i as usize * my + j as usize] > 0.5 {
                remove_ice(&mut thk, &mut href, i, j, &mut stats);
            }
        }
        if stats.cells > 0 {
            debug!(cells = stats.cells, "removed icebergs");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: f64 = 2.0;
    const F: f64 = 3.0;
    const O: f64 = 4.0;

    /// Rows are listed top (largest j) first, so the picture reads like a map.
    fn global(rows: &[&[f64]]) -> (usize, usize, Vec<f64>) {
        let (my, mx) = (rows.len(), rows[0].len());
        let mut out = vec![0.0; mx * my];
        for (r, row) in rows.iter().enumerate() {
            let j = my - 1 - r;
            for (i, &v) in row.iter().enumerate() {
                out[i * my + j] = v;
            }
        }
        (mx, my, out)
    }

    #[test]
    fn test_detached_shelf_is_removed() {
        let (mx, my, mask) = global(&[
            &[G, F, O, F, F],
            &[G, F, O, F, O],
            &[G, O, O, O, O],
        ]);
        let bc = vec![0.0; mx * my];
        let bergs = find_icebergs(mx, my, Periodicity::None, &mask, &bc);
        let count = bergs.iter().filter(|&&b| b).count();
        assert_eq!(count, 3);
        // attached shelf stays
        assert!(!bergs[my + 2]);
        assert!(bergs[3 * my + 2]);
    }

    #[test]
    fn test_periodic_wrap_and_bc_exemption() {
        let (mx, my, mask) = global(&[&[F, O, O, G]]);
        let bc = vec![0.0; mx * my];
        assert_eq!(find_icebergs(mx, my, Periodicity::None, &mask, &bc), [true, false, false, false]);
        assert_eq!(find_icebergs(mx, my, Periodicity::X, &mask, &bc), [false; 4]);

        let mut bc = vec![0.0; mx * my];
        bc[0] = 1.0;
        assert_eq!(find_icebergs(mx, my, Periodicity::None, &mask, &bc), [false; 4]);
    }
}
