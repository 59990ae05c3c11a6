//! The bedrock thermal layer.
//!
//! Heat conducts through a column of bedrock below each cell, driven by
//! the geothermal flux at the bottom and pinned to the basal ice
//! temperature at the top. The layer reports the heat flux it delivers to
//! the ice base in `bheatflx_top`. With a single bedrock level the layer
//! is disabled and the geothermal flux passes straight through.

use std::sync::Arc;

use tracing::trace;

use super::EnthalpyConverter;
use crate::components::{BedThermal, Component, InitContext, MaxTimestep};
use crate::config::Constants;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::geometry::{CellType, cell_type};
use crate::grid::Grid;
use crate::types::FieldId;

#[derive(Clone, Copy, Debug)]
struct BedrockFields {
    temp: FieldId,
    geothermal: FieldId,
    top_flux: FieldId,
    enthalpy: FieldId,
    thk: FieldId,
    mask: FieldId,
    surface_temp: FieldId,
    shelf_temp: FieldId,
}

/// Explicit conduction in the bedrock thermal layer.
#[derive(Debug)]
pub struct BedrockThermal {
    /// k, W m-1 K-1
    conductivity: f64,
    /// k / (rho c), m2 s-1
    diffusivity: f64,
    converter: Option<EnthalpyConverter>,
    dz: f64,
    levels: usize,
    last_end: Option<f64>,
    grid: Option<Arc<Grid>>,
    fields: Option<BedrockFields>,
}

impl Default for BedrockThermal {
    fn default() -> Self {
        Self::new()
    }
}

impl BedrockThermal {
    pub fn new() -> Self {
        let c = Constants::default();
        Self {
            conductivity: c.bedrock_k,
            diffusivity: c.bedrock_k / (c.bedrock_density * c.bedrock_c),
            converter: None,
            dz: 0.0,
            levels: 1,
            last_end: None,
            grid: None,
            fields: None,
        }
    }

    fn is_active(&self) -> bool {
        self.levels > 1
    }

    /// Stable explicit step, seconds.
    pub fn stable_dt(&self) -> f64 {
        self.dz * self.dz / (2.0 * self.diffusivity)
    }

    /// Upward heat flux at the top of one column, W m-2.
    pub fn top_flux(&self, column: &[f64]) -> f64 {
        let n = column.len();
        let gradient = match n {
            0 | 1 => return 0.0,
            2 => (column[1] - column[0]) / self.dz,
            _ => (3.0 * column[n - 1] - 4.0 * column[n - 2] + column[n - 3]) / (2.0 * self.dz),
        };
        -self.conductivity * gradient
    }

    /// One explicit step of one column, bottom to top.
    fn step_column(&self, column: &mut [f64], scratch: &mut Vec<f64>, top: f64, geothermal: f64, dt: f64) {
        let n = column.len();
        let mu = self.diffusivity * dt / (self.dz * self.dz);
        scratch.clear();
        scratch.extend_from_slice(column);
        let below_bottom = scratch[1] + 2.0 * self.dz * geothermal / self.conductivity;
        column[0] = scratch[0] + mu * (below_bottom - 2.0 * scratch[0] + scratch[1]);
        for k in 1..n - 1 {
            column[k] = scratch[k] + mu * (scratch[k - 1] - 2.0 * scratch[k] + scratch[k + 1]);
        }
        column[n - 1] = top;
    }

    fn uninitialized() -> IceError {
        IceError::Lifecycle {
            component: "bedrock_thermal".into(),
            state: "uninitialized".into(),
        }
    }
}

impl Component for BedrockThermal {
    fn name(&self) -> &str {
        "bedrock_thermal"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let c = ctx.constants;
        self.conductivity = c.bedrock_k;
        self.diffusivity = c.bedrock_k / (c.bedrock_density * c.bedrock_c);
        self.converter = Some(EnthalpyConverter::new(c));
        let zb = ctx.grid.zb();
        self.levels = zb.len();
        if self.levels > 1 {
            self.dz = zb[1] - zb[0];
            if self.dz <= 0.0 {
                return Err(IceError::config("bedrock thermal layer needs positive thickness (grid_Lbz)"));
            }
        }
        self.fields = Some(BedrockFields {
            temp: store.ensure(Var::BedrockTemp)?,
            geothermal: store.ensure(Var::GeothermalFlux)?,
            top_flux: store.ensure(Var::BedrockFlux)?,
            enthalpy: store.ensure(Var::Enthalpy)?,
            thk: store.ensure(Var::Thickness)?,
            mask: store.ensure(Var::Mask)?,
            surface_temp: store.ensure(Var::SurfaceTemp)?,
            shelf_temp: store.ensure(Var::ShelfBaseTemp)?,
        });
        self.grid = Some(Arc::clone(ctx.grid));
        self.last_end = None;
        Ok(())
    }

    fn max_timestep(&self, _t: f64) -> MaxTimestep {
        if self.is_active() {
            MaxTimestep::new(self.stable_dt())
        } else {
            MaxTimestep::unrestricted()
        }
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["litho_temp", "bheatflx", "enthalpy", "thk", "mask", "ice_surface_temp", "shelfbtemp"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["litho_temp", "bheatflx_top"]
    }
}

impl BedThermal for BedrockThermal {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<()> {
        if dt < 0.0 {
            return Err(IceError::config(format!("bedrock thermal update with negative dt {}", dt)));
        }
        if let Some(end) = self.last_end
            && (t - end).abs() > 1e-6 * dt.max(1.0)
        {
            return Err(IceError::config(format!(
                "bedrock thermal updates are not contiguous: previous step ended at {} s, this one starts at {} s",
                end, t
            )));
        }
        self.last_end = Some(t + dt);

        let grid = self.grid.clone().ok_or_else(Self::uninitialized)?;
        let f = self.fields.ok_or_else(Self::uninitialized)?;
        let ec = self.converter.ok_or_else(Self::uninitialized)?;

        if !self.is_active() {
            return store.copy(f.geothermal, f.top_flux);
        }

        let substeps = (dt / self.stable_dt()).ceil().max(1.0) as usize;
        let h = dt / substeps as f64;
        trace!(substeps, "bedrock thermal step");

        let ([mut temp, mut top_flux], view) = store.split_mut([f.temp, f.top_flux])?;
        let (e, thk, mask) = (view.access(f.enthalpy)?, view.access(f.thk)?, view.access(f.mask)?);
        let (ts, sbt, g) = (
            view.access(f.surface_temp)?,
            view.access(f.shelf_temp)?,
            view.access(f.geothermal)?,
        );
        let mut scratch = Vec::with_capacity(self.levels);
        for (i, j) in grid.points() {
            let top = match cell_type(mask.get(i, j)) {
                CellType::Grounded => {
                    let p = ec.pressure(thk.get(i, j));
                    ec.temperature(e.at(i, j, 0), p)
                }
                CellType::Floating => sbt.get(i, j),
                CellType::IceFreeLand | CellType::IceFreeOcean => ts.get(i, j),
            };
            let column = temp.column_mut(i, j);
            for _ in 0..substeps {
                self.step_column(column, &mut scratch, top, g.get(i, j), h);
            }
            let flux = self.top_flux(column);
            top_flux.set(i, j, flux);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit(levels: usize, dz: f64) -> BedrockThermal {
        let mut b = BedrockThermal::new();
        b.levels = levels;
        b.dz = dz;
        b
    }

    #[test]
    fn test_linear_profile_is_steady() {
        let b = unit(5, 100.0);
        let g = 0.06;
        let top = 260.0;
        // T rises with depth at G / k
        let mut column: Vec<f64> = (0..5).map(|k| top + g / b.conductivity * 100.0 * (4 - k) as f64).collect();
        let before = column.clone();
        let mut scratch = Vec::new();
        b.step_column(&mut column, &mut scratch, top, g, b.stable_dt());
        for (a, c) in column.iter().zip(&before) {
            assert_relative_eq!(*a, *c, epsilon = 1e-9);
        }
        assert_relative_eq!(b.top_flux(&column), g, max_relative = 1e-9);
    }

    #[test]
    fn test_stable_dt() {
        let b = unit(3, 500.0);
        assert!(b.is_active());
        let c = Constants::default();
        let d = c.bedrock_k / (c.bedrock_density * c.bedrock_c);
        assert_relative_eq!(b.stable_dt(), 250e3 / (2.0 * d));
        assert!(b.max_timestep(0.0).restrict);
        assert!(!unit(1, 0.0).max_timestep(0.0).restrict);
    }
}
