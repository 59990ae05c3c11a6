//! Age of the ice.
//!
//! `d(tau)/dt + u . grad tau + w d(tau)/dz = 1`, zero at the ice surface
//! and at a base where ice accretes (`w > 0`).

use std::sync::Arc;

use super::TridiagonalSystem;
use super::column::upwind_advection;
use crate::components::{AgeModel, Component, InitContext};
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::grid::Grid;
use crate::types::FieldId;

/// Advance one age column by `dt`; `source` holds `1 - u . grad tau`.
pub(crate) fn age_column(
    z: &[f64],
    thickness: f64,
    dt: f64,
    tau: &mut [f64],
    source: &[f64],
    w: &[f64],
    sys: &mut TridiagonalSystem,
) -> Result<()> {
    let ks = z.iter().rposition(|&zk| zk <= thickness).unwrap_or(0);
    if thickness <= 0.0 || ks == 0 {
        tau.fill(0.0);
        return Ok(());
    }

    // base
    let dz0 = z[1] - z[0];
    if w[0] > 0.0 {
        sys.b[0] = 1.0;
        sys.c[0] = 0.0;
        sys.r[0] = 0.0;
    } else {
        sys.b[0] = 1.0 - dt * w[0] / dz0;
        sys.c[0] = dt * w[0] / dz0;
        sys.r[0] = tau[0] + dt * source[0];
    }

    for k in 1..ks {
        let (dm, dp) = (z[k] - z[k - 1], z[k + 1] - z[k]);
        let wk = w[k];
        if wk > 0.0 {
            sys.a[k] = -dt * wk / dm;
            sys.b[k] = 1.0 + dt * wk / dm;
            sys.c[k] = 0.0;
        } else {
            sys.a[k] = 0.0;
            sys.b[k] = 1.0 - dt * wk / dp;
            sys.c[k] = dt * wk / dp;
        }
        sys.r[k] = tau[k] + dt * source[k];
    }

    sys.a[ks] = 0.0;
    sys.b[ks] = 1.0;
    sys.r[ks] = 0.0;

    sys.solve(ks + 1, tau)?;
    for t in tau[..=ks].iter_mut() {
        *t = t.max(0.0);
    }
    tau[ks + 1..].fill(0.0);
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct AgeFields {
    age: FieldId,
    thk: FieldId,
    u3: FieldId,
    v3: FieldId,
    w3: FieldId,
}

/// The age equation on the ice levels.
#[derive(Debug, Default)]
pub struct IceAge {
    grid: Option<Arc<Grid>>,
    fields: Option<AgeFields>,
}

impl IceAge {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for IceAge {
    fn name(&self) -> &str {
        "age"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.fields = Some(AgeFields {
            age: store.ensure(Var::Age)?,
            thk: store.ensure(Var::Thickness)?,
            u3: store.ensure(Var::U3)?,
            v3: store.ensure(Var::V3)?,
            w3: store.ensure(Var::W3)?,
        });
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["age", "thk", "uvel", "vvel", "wvel"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["age"]
    }
}

impl AgeModel for IceAge {
    fn update(&mut self, _t: f64, dt: f64, store: &mut FieldStore) -> Result<()> {
        let (grid, f) = self.grid.clone().zip(self.fields).ok_or_else(|| IceError::Lifecycle {
            component: "age".into(),
            state: "uninitialized".into(),
        })?;
        if !store.field(f.age)?.ghosts_fresh() {
            store.update_ghosts(f.age)?;
        }
        let z = grid.z().to_vec();
        let mz = z.len();
        let (dx, dy) = (grid.dx(), grid.dy());

        // explicit part from the start-of-step age
        let mut columns: Vec<(f64, Vec<f64>, Vec<f64>, Vec<f64>)> = Vec::with_capacity(grid.patch().len());
        {
            let view = store.view();
            let age = view.stencil(f.age)?;
            let (thk, u3, v3, w3) = (view.access(f.thk)?, view.access(f.u3)?, view.access(f.v3)?, view.access(f.w3)?);
            for (i, j) in grid.points() {
                let (u, v) = (u3.column(i, j), v3.column(i, j));
                let source = (0..mz)
                    .map(|k| 1.0 - upwind_advection(&age, i, j, k, u[k], v[k], dx, dy))
                    .collect();
                columns.push((thk.get(i, j), age.column(i, j).to_vec(), source, w3.column(i, j).to_vec()));
            }
        }

        let solve = |sys: &mut TridiagonalSystem, col: &mut (f64, Vec<f64>, Vec<f64>, Vec<f64>)| {
            let (h, tau, source, w) = col;
            age_column(&z, *h, dt, tau, source, w, sys)
        };
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            columns
                .par_iter_mut()
                .try_for_each_init(|| TridiagonalSystem::new(mz), solve)?;
        }
        #[cfg(not(feature = "parallel"))]
        {
            let mut sys = TridiagonalSystem::new(mz);
            columns.iter_mut().try_for_each(|col| solve(&mut sys, col))?;
        }

        {
            let mut age = store.access_mut(f.age)?;
            for ((i, j), (_, tau, _, _)) in grid.points().zip(&columns) {
                age.column_mut(i, j).copy_from_slice(tau);
            }
        }
        store.update_ghosts(f.age)
    }
}
