//! Water routing in a transportable subglacial layer.
//!
//! Melt water first fills the till. What does not fit enters a layer of
//! thickness `W` that flows down the hydraulic potential
//!
//! ```text
//! psi = P + rho_w g (b + W),   P = f P_o
//! q   = -K W grad(psi) / (rho_w g)
//! ```
//!
//! The flux is evaluated on the staggered grid with `W` upwinded. The
//! layer takes as many explicit sub-steps as its CFL and diffusion
//! bounds require to cover the model step. Water reaching ice-free land,
//! the ocean, or the null strip leaves the system and is accounted for.

use std::sync::Arc;

use tracing::{debug, trace};

use super::till_can::{TillFields, TillParameters};
use crate::components::{Component, Hydrology, HydrologyStats, InitContext};
use crate::config::Constants;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::geometry::{CellType, cell_type};
use crate::grid::Grid;
use crate::types::FieldId;

/// Sub-steps allowed within one model step before giving up.
const MAX_SUBSTEPS: usize = 100_000;

#[derive(Clone, Copy, Debug)]
struct RoutingFields {
    till: TillFields,
    bwat: FieldId,
    bwp: FieldId,
    thk: FieldId,
    topg: FieldId,
}

/// Till storage plus a routed transportable water layer.
#[derive(Debug, Default)]
pub struct Routing {
    till: TillParameters,
    /// K, m s-1
    conductivity: f64,
    pressure_fraction: f64,
    /// m
    null_strip: f64,
    max_cfl: f64,
    constants: Constants,
    grid: Option<Arc<Grid>>,
    fields: Option<RoutingFields>,
}

/// Stability limits of one sub-step.
#[derive(Clone, Copy, Debug, Default)]
struct Limits {
    /// max over cells of |u|/dx + |v|/dy, s-1
    rate: f64,
    /// largest layer thickness, m
    w_max: f64,
}

impl Routing {
    pub fn new() -> Self {
        Self::default()
    }

    fn rho_g(&self) -> f64 {
        self.constants.fresh_water_density * self.constants.standard_gravity
    }

    /// Longest stable sub-step given the current limits.
    fn substep_limit(&self, grid: &Grid, limits: Limits) -> f64 {
        let cfl = if limits.rate > 0.0 { self.max_cfl / limits.rate } else { f64::INFINITY };
        let d = self.conductivity * limits.w_max;
        let (dx, dy) = (grid.dx(), grid.dy());
        let diffusion = if d > 0.0 {
            1.0 / (2.0 * d * (1.0 / (dx * dx) + 1.0 / (dy * dy)))
        } else {
            f64::INFINITY
        };
        cfl.min(diffusion)
    }

    fn in_null_strip(&self, grid: &Grid, i: isize, j: isize) -> bool {
        if self.null_strip <= 0.0 {
            return false;
        }
        let e = grid.extent();
        e.lx - (grid.x(i) - e.x0).abs() < self.null_strip || e.ly - (grid.y(j) - e.y0).abs() < self.null_strip
    }

    /// `bwp = f rho_i g H` under grounded ice, zero elsewhere.
    fn update_pressure(&self, grid: &Grid, f: RoutingFields, store: &mut FieldStore) -> Result<()> {
        {
            let ([mut p], view) = store.split_mut([f.bwp])?;
            let (thk, mask) = (view.access(f.thk)?, view.access(f.till.mask)?);
            for (i, j) in grid.points() {
                let value = if cell_type(mask.get(i, j)) == CellType::Grounded {
                    self.pressure_fraction * self.constants.overburden(thk.get(i, j))
                } else {
                    0.0
                };
                p.set(i, j, value);
            }
        }
        store.update_ghosts(f.bwp)
    }

    /// One explicit sub-step of length `h` (or the longest stable one if
    /// shorter). Returns the step taken.
    fn substep(
        &self,
        grid: &Grid,
        f: RoutingFields,
        h: f64,
        input: &[f64],
        stats: &mut HydrologyStats,
        store: &mut FieldStore,
    ) -> Result<f64> {
        store.update_ghosts(f.bwat)?;
        let (dx, dy) = (grid.dx(), grid.dy());
        let rho_g = self.rho_g();
        let k = self.conductivity;
        let area = grid.cell_area();

        let (new_w, taken) = {
            let view = store.view();
            let (w, p, b) = (view.stencil(f.bwat)?, view.stencil(f.bwp)?, view.stencil(f.topg)?);
            let mask = view.access(f.till.mask)?;
            let psi = |i: isize, j: isize| p.get(i, j) + rho_g * (b.get(i, j) + w.get(i, j));
            // (velocity, flux) through the face between i and i + 1
            let x_face = |i: isize, j: isize| {
                if grid.is_closed_x_face(i) {
                    return (0.0, 0.0);
                }
                let v = -k * (psi(i + 1, j) - psi(i, j)) / (dx * rho_g);
                (v, v * if v > 0.0 { w.get(i, j) } else { w.get(i + 1, j) })
            };
            let y_face = |i: isize, j: isize| {
                if grid.is_closed_y_face(j) {
                    return (0.0, 0.0);
                }
                let v = -k * (psi(i, j + 1) - psi(i, j)) / (dy * rho_g);
                (v, v * if v > 0.0 { w.get(i, j) } else { w.get(i, j + 1) })
            };

            let mut limits = Limits::default();
            let mut divergence = Vec::with_capacity(input.len());
            for (i, j) in grid.points() {
                let (east, west) = (x_face(i, j), x_face(i - 1, j));
                let (north, south) = (y_face(i, j), y_face(i, j - 1));
                let rate = east.0.abs().max(west.0.abs()) / dx + north.0.abs().max(south.0.abs()) / dy;
                limits.rate = limits.rate.max(rate);
                limits.w_max = limits.w_max.max(w.get(i, j));
                divergence.push((east.1 - west.1) / dx + (north.1 - south.1) / dy);
            }
            limits.rate = grid.max(limits.rate)?;
            limits.w_max = grid.max(limits.w_max)?;
            let taken = h.min(self.substep_limit(grid, limits));

            let mut new_w = Vec::with_capacity(input.len());
            for (n, (i, j)) in grid.points().enumerate() {
                let mut value = w.get(i, j) + taken * (input[n] - divergence[n]);
                if value < 0.0 {
                    stats.negative_gain += -value * area;
                    value = 0.0;
                }
                match cell_type(mask.get(i, j)) {
                    CellType::Grounded => {}
                    CellType::IceFreeLand => {
                        stats.lost_to_land += value * area;
                        value = 0.0;
                    }
                    CellType::Floating | CellType::IceFreeOcean => {
                        stats.lost_to_ocean += value * area;
                        value = 0.0;
                    }
                }
                if self.in_null_strip(grid, i, j) {
                    stats.null_strip_loss += value * area;
                    value = 0.0;
                }
                new_w.push(value);
            }
            (new_w, taken)
        };

        let mut w = store.access_mut(f.bwat)?;
        for ((i, j), value) in grid.points().zip(new_w) {
            w.set(i, j, value);
        }
        Ok(taken)
    }
}

impl Component for Routing {
    fn name(&self) -> &str {
        "routing"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let config = ctx.config;
        self.till = TillParameters::from_context(ctx)?;
        self.conductivity = config.get_double("hydrology_hydraulic_conductivity")?;
        self.pressure_fraction = config.get_double("hydrology_pressure_fraction")?;
        self.null_strip = config.get_double("hydrology_null_strip_width")?;
        self.max_cfl = config.get_double("hydrology_max_cfl")?;
        if !(0.0..=1.0).contains(&self.pressure_fraction) {
            return Err(IceError::config(format!(
                "hydrology_pressure_fraction = {} is not in [0, 1]",
                self.pressure_fraction
            )));
        }
        if self.conductivity < 0.0 || self.max_cfl <= 0.0 {
            return Err(IceError::config(
                "routing needs non-negative hydrology_hydraulic_conductivity and positive hydrology_max_cfl",
            ));
        }
        self.constants = *ctx.constants;
        self.fields = Some(RoutingFields {
            till: TillFields::ensure(store)?,
            bwat: store.ensure(Var::TransportWater)?,
            bwp: store.ensure(Var::WaterPressure)?,
            thk: store.ensure(Var::Thickness)?,
            topg: store.ensure(Var::Bed)?,
        });
        self.grid = Some(Arc::clone(ctx.grid));
        debug!(k = self.conductivity, null_strip = self.null_strip, "routing hydrology");
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["tillwat", "bwat", "bmelt", "mask", "thk", "topg"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["tillwat", "bwat", "bwp"]
    }
}

impl Hydrology for Routing {
    fn update(&mut self, _t: f64, dt: f64, store: &mut FieldStore) -> Result<HydrologyStats> {
        let (grid, f) = self.grid.clone().zip(self.fields).ok_or_else(|| IceError::Lifecycle {
            component: "routing".into(),
            state: "uninitialized".into(),
        })?;
        if !store.field(f.topg)?.ghosts_fresh() {
            store.update_ghosts(f.topg)?;
        }
        let input = self.till.advance(&grid, f.till, dt, store)?;
        self.update_pressure(&grid, f, store)?;

        let mut stats = HydrologyStats::default();
        let mut remaining = dt;
        while remaining > 0.0 {
            if stats.substeps == MAX_SUBSTEPS {
                return Err(IceError::NotConverged {
                    component: "routing".into(),
                    iterations: stats.substeps,
                });
            }
            let taken = self.substep(&grid, f, remaining, &input, &mut stats, store)?;
            stats.substeps += 1;
            // the last sub-step covers the remainder exactly
            remaining = if taken >= remaining { 0.0 } else { remaining - taken };
        }
        store.update_ghosts(f.bwat)?;

        stats.lost_to_land = grid.sum(stats.lost_to_land)?;
        stats.lost_to_ocean = grid.sum(stats.lost_to_ocean)?;
        stats.negative_gain = grid.sum(stats.negative_gain)?;
        stats.null_strip_loss = grid.sum(stats.null_strip_loss)?;
        trace!(substeps = stats.substeps, "routing step");
        Ok(stats)
    }
}
