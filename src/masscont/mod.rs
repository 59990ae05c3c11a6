//! Mass continuity: the explicit ice thickness update.
//!
//! ```text
//! dH/dt = M - S - div(Q)
//! ```
//!
//! `M` is the surface mass balance, `S` the basal melt rate (grounded
//! melt when `include_bmr_in_continuity`, sub-shelf melt under floating
//! ice), and `Q` the ice flux. `Q` is the staggered SIA flux computed by
//! the stress balance plus the sliding flux `u_b H` with `H` upwinded.
//! Outer faces of non-periodic directions carry no flux.
//!
//! With `part_grid`, ice-free ocean cells next to ice fill a sub-grid
//! reference thickness `Href` instead of `H`. Once `Href` reaches the
//! thickness of the neighbouring ice the cell becomes a full cell, and
//! the excess is passed on to ice-free ocean neighbours for at most
//! `part_redist_max_passes` passes. Whatever is left after the last
//! pass is discarded.
//!
//! All volume changes are reported as [`ContinuityFluxes`] so the budget
//! can be closed.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::masscont::threshold_thickness;
//!
//! // floating neighbours 200 m thick, deep bed: fill to the neighbour thickness
//! let h = threshold_thickness([(200.0, 23.0), (200.0, 23.0)], -1000.0, 10e3, false);
//! assert!((h - 200.0).abs() < 1e-12);
//! ```

use std::sync::Arc;

use tracing::{debug, trace};

use crate::components::{Component, InitContext};
use crate::error::{IceError, Result};
use crate::fields::{FieldMetadata, FieldShape, FieldStore, Var};
use crate::geometry::{CellType, cell_type};
use crate::grid::Grid;
use crate::types::{FieldId, SECONDS_PER_YEAR};

/// Slope of the frontal thickness reduction, per unit grid spacing.
const FRONTAL_SLOPE: f64 = 2.4511e-18;

/// Volume changes of one step, m3 ice equivalent, global sums.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContinuityFluxes {
    /// Surface mass balance added
    pub smb: f64,
    /// Grounded basal melt removed
    pub basal_melt: f64,
    /// Sub-shelf melt removed
    pub sub_shelf_melt: f64,
    /// Net outflow, `div(Q) dt` summed over updated cells
    pub flux_divergence: f64,
    /// Volume removed by clipping and by the undistributed residual;
    /// negative when clipping added ice
    pub discard: f64,
    /// Sum of the absolute values of all terms, cell by cell
    pub scale: f64,
}

impl ContinuityFluxes {
    /// Volume change implied by the terms.
    pub fn net(&self) -> f64 {
        self.smb - self.basal_melt - self.sub_shelf_melt - self.flux_divergence - self.discard
    }

    fn global(self, grid: &Grid) -> Result<Self> {
        Ok(Self {
            smb: grid.sum(self.smb)?,
            basal_melt: grid.sum(self.basal_melt)?,
            sub_shelf_melt: grid.sum(self.sub_shelf_melt)?,
            flux_divergence: grid.sum(self.flux_divergence)?,
            discard: grid.sum(self.discard)?,
            scale: grid.sum(self.scale)?,
        })
    }
}

/// Thickness at which a partially filled cell counts as full.
///
/// `neighbours` are `(H, h)` pairs of the adjacent ice-filled cells and
/// `bed` is the bed elevation of the partial cell. With
/// `reduce_frontal_thickness` the threshold thins with the fifth power
/// of the neighbour thickness, as at a freely spreading front.
pub fn threshold_thickness(
    neighbours: impl IntoIterator<Item = (f64, f64)>,
    bed: f64,
    dx: f64,
    reduce_frontal_thickness: bool,
) -> f64 {
    let (mut n, mut h_sum, mut s_sum) = (0usize, 0.0, 0.0);
    for (h, s) in neighbours {
        n += 1;
        h_sum += h;
        s_sum += s;
    }
    if n == 0 {
        return 0.0;
    }
    let (h_avg, s_avg) = (h_sum / n as f64, s_sum / n as f64);
    let threshold = if bed + h_avg > s_avg {
        s_avg - bed
    } else if reduce_frontal_thickness {
        let slope = FRONTAL_SLOPE * dx * SECONDS_PER_YEAR / (300.0 * 600.0);
        h_avg - 0.8 * slope * h_avg.powi(5)
    } else {
        h_avg
    };
    threshold.max(0.0)
}

/// Split reference thickness into `(H, Href, residual)` once it reaches
/// the threshold.
fn promote(href: f64, threshold: f64) -> (f64, f64, f64) {
    if threshold <= 0.0 {
        (href, 0.0, 0.0)
    } else if href >= threshold {
        (threshold, 0.0, href - threshold)
    } else {
        (0.0, href, 0.0)
    }
}

const NEIGHBOURS: [(isize, isize); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

#[derive(Clone, Copy, Debug)]
struct ContinuityFields {
    thk: FieldId,
    href: FieldId,
    mask: FieldId,
    usurf: FieldId,
    topg: FieldId,
    velbase: FieldId,
    flux: FieldId,
    smb: FieldId,
    bmelt: FieldId,
    shelf_melt: FieldId,
    bc_mask: FieldId,
    divergence: FieldId,
    residual: FieldId,
}

/// Options of the partial-cell front.
#[derive(Clone, Copy, Debug)]
struct PartGrid {
    reduce_frontal_thickness: bool,
    max_passes: usize,
}

/// New values of one owned cell.
#[derive(Clone, Copy, Debug, Default)]
struct CellUpdate {
    thk: f64,
    href: f64,
    div: f64,
    residual: f64,
}

/// The explicit mass continuity step.
#[derive(Debug, Default)]
pub struct MassContinuity {
    include_bmr: bool,
    part_grid: Option<PartGrid>,
    grid: Option<Arc<Grid>>,
    fields: Option<ContinuityFields>,
}

impl MassContinuity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uses_part_grid(&self) -> bool {
        self.part_grid.is_some()
    }

    /// Advance `thk` and `Href` by `dt` using the velocities and the
    /// mask of the start of the step.
    pub fn step(&mut self, dt: f64, store: &mut FieldStore) -> Result<ContinuityFluxes> {
        let (grid, f) = self.grid.clone().zip(self.fields).ok_or_else(|| IceError::Lifecycle {
            component: "mass_continuity".into(),
            state: "uninitialized".into(),
        })?;
        for id in [f.thk, f.mask, f.usurf, f.topg, f.velbase, f.flux] {
            if !store.field(id)?.ghosts_fresh() {
                store.update_ghosts(id)?;
            }
        }

        let (updates, mut fluxes) = self.compute(&grid, f, dt, store)?;
        {
            let ([mut thk, mut href, mut div, mut residual], _view) =
                store.split_mut([f.thk, f.href, f.divergence, f.residual])?;
            for ((i, j), u) in grid.points().zip(&updates) {
                thk.set(i, j, u.thk);
                href.set(i, j, u.href);
                div.set(i, j, u.div);
                residual.set(i, j, u.residual);
            }
        }
        for id in [f.thk, f.href, f.residual] {
            store.update_ghosts(id)?;
        }

        if let Some(part_grid) = self.part_grid {
            fluxes.discard += self.redistribute(&grid, f, part_grid, store)?;
        }
        let fluxes = fluxes.global(&grid)?;
        trace!(?fluxes, "mass continuity");
        Ok(fluxes)
    }

    /// New thickness of every owned cell, in `points()` order, plus the
    /// local volume terms.
    fn compute(
        &self,
        grid: &Grid,
        f: ContinuityFields,
        dt: f64,
        store: &FieldStore,
    ) -> Result<(Vec<CellUpdate>, ContinuityFluxes)> {
        let view = store.view();
        let thk = view.stencil(f.thk)?;
        let mask = view.stencil(f.mask)?;
        let usurf = view.stencil(f.usurf)?;
        let velbase = view.stencil(f.velbase)?;
        let flux = view.stencil(f.flux)?;
        let (href, topg) = (view.access(f.href)?, view.access(f.topg)?);
        let (smb, bmelt, shelf_melt) = (view.access(f.smb)?, view.access(f.bmelt)?, view.access(f.shelf_melt)?);
        let bc_mask = view.access(f.bc_mask)?;

        let icy = |i: isize, j: isize| cell_type(mask.get(i, j)).is_icy();
        // sliding velocity at a face, taken from the icy side at the margin
        let face_velocity = |a: f64, b: f64, icy_a: bool, icy_b: bool| match (icy_a, icy_b) {
            (true, true) => 0.5 * (a + b),
            (true, false) => a,
            (false, true) => b,
            (false, false) => 0.0,
        };
        let east = |i: isize, j: isize| -> f64 {
            if grid.is_closed_x_face(i) {
                return 0.0;
            }
            let (ua, ub) = (velbase.vec(i, j).0, velbase.vec(i + 1, j).0);
            let u = face_velocity(ua, ub, icy(i, j), icy(i + 1, j));
            let upwind = if u > 0.0 { thk.get(i, j) } else { thk.get(i + 1, j) };
            flux.vec(i, j).0 + u * upwind
        };
        let north = |i: isize, j: isize| -> f64 {
            if grid.is_closed_y_face(j) {
                return 0.0;
            }
            let (va, vb) = (velbase.vec(i, j).1, velbase.vec(i, j + 1).1);
            let v = face_velocity(va, vb, icy(i, j), icy(i, j + 1));
            let upwind = if v > 0.0 { thk.get(i, j) } else { thk.get(i, j + 1) };
            flux.vec(i, j).1 + v * upwind
        };

        let (dx, dy, area) = (grid.dx(), grid.dy(), grid.cell_area());
        let mut fluxes = ContinuityFluxes::default();
        let mut updates = Vec::with_capacity(grid.patch().len());
        for (i, j) in grid.points() {
            let (h0, href0) = (thk.get(i, j), href.get(i, j));
            if bc_mask.get(i, j) > 0.5 {
                updates.push(CellUpdate {
                    thk: h0,
                    href: href0,
                    ..Default::default()
                });
                continue;
            }
            let div = (east(i, j) - east(i - 1, j)) / dx + (north(i, j) - north(i, j - 1)) / dy;
            let cell = cell_type(mask.get(i, j));
            fluxes.flux_divergence += div * dt * area;

            let partial = self.part_grid.is_some()
                && cell == CellType::IceFreeOcean
                && NEIGHBOURS.iter().any(|&(di, dj)| icy(i + di, j + dj));
            if let Some(part_grid) = self.part_grid.filter(|_| partial) {
                let mut filled = href0 - div * dt;
                fluxes.scale += (div * dt * area).abs();
                if filled < 0.0 {
                    fluxes.discard += filled * area;
                    fluxes.scale += (filled * area).abs();
                    filled = 0.0;
                }
                let neighbours = NEIGHBOURS
                    .iter()
                    .filter(|&&(di, dj)| icy(i + di, j + dj))
                    .map(|&(di, dj)| (thk.get(i + di, j + dj), usurf.get(i + di, j + dj)));
                let threshold =
                    threshold_thickness(neighbours, topg.get(i, j), dx, part_grid.reduce_frontal_thickness);
                let (h, href, residual) = promote(filled, threshold);
                updates.push(CellUpdate { thk: h, href, div, residual });
                continue;
            }

            let m = smb.get(i, j);
            let (grounded_melt, shelf) = match cell {
                CellType::Grounded if self.include_bmr => (bmelt.get(i, j), 0.0),
                CellType::Floating => (0.0, shelf_melt.get(i, j)),
                _ => (0.0, 0.0),
            };
            fluxes.smb += m * dt * area;
            fluxes.basal_melt += grounded_melt * dt * area;
            fluxes.sub_shelf_melt += shelf * dt * area;
            fluxes.scale += (m.abs() + grounded_melt.abs() + shelf.abs() + div.abs()) * dt * area;

            let raw = h0 + dt * (m - grounded_melt - shelf - div);
            let mut h = raw;
            if raw < 0.0 {
                fluxes.discard += raw * area;
                fluxes.scale += (raw * area).abs();
                h = 0.0;
            }
            let mut href = href0;
            if h > 0.0 && href0 > 0.0 {
                h += href0;
                href = 0.0;
            }
            updates.push(CellUpdate { thk: h, href, div, residual: 0.0 });
        }
        Ok((updates, fluxes))
    }

    /// Pass the residual of newly filled cells to empty ocean neighbours.
    ///
    /// Returns the local volume discarded after the last pass, m3.
    fn redistribute(&self, grid: &Grid, f: ContinuityFields, part_grid: PartGrid, store: &mut FieldStore) -> Result<f64> {
        let area = grid.cell_area();
        for pass in 0..part_grid.max_passes {
            let total = store.sum(f.residual)?;
            if total <= 0.0 {
                return Ok(0.0);
            }
            trace!(pass, total, "redistributing residual");

            let updates = {
                let view = store.view();
                let thk = view.stencil(f.thk)?;
                let mask = view.stencil(f.mask)?;
                let usurf = view.stencil(f.usurf)?;
                let residual = view.stencil(f.residual)?;
                let (href, topg) = (view.access(f.href)?, view.access(f.topg)?);

                let empty_ocean =
                    |i: isize, j: isize| thk.get(i, j) == 0.0 && cell_type(mask.get(i, j)) == CellType::IceFreeOcean;
                let receivers = |i: isize, j: isize| {
                    NEIGHBOURS.iter().filter(|&&(di, dj)| empty_ocean(i + di, j + dj)).count()
                };

                let mut updates = Vec::with_capacity(grid.patch().len());
                for (i, j) in grid.points() {
                    let mut u = CellUpdate {
                        thk: thk.get(i, j),
                        href: href.get(i, j),
                        ..Default::default()
                    };
                    let own = residual.get(i, j);
                    if own > 0.0 && receivers(i, j) == 0 {
                        u.thk += own;
                    }
                    if empty_ocean(i, j) {
                        let incoming: f64 = NEIGHBOURS
                            .iter()
                            .map(|&(di, dj)| {
                                let (a, b) = (i + di, j + dj);
                                let r = residual.get(a, b);
                                let n = receivers(a, b);
                                if r > 0.0 && n > 0 { r / n as f64 } else { 0.0 }
                            })
                            .sum();
                        if incoming > 0.0 {
                            let neighbours = NEIGHBOURS
                                .iter()
                                .filter(|&&(di, dj)| thk.get(i + di, j + dj) > 0.0)
                                .map(|&(di, dj)| (thk.get(i + di, j + dj), usurf.get(i + di, j + dj)));
                            let threshold = threshold_thickness(
                                neighbours,
                                topg.get(i, j),
                                grid.dx(),
                                part_grid.reduce_frontal_thickness,
                            );
                            (u.thk, u.href, u.residual) = promote(u.href + incoming, threshold);
                        }
                    }
                    updates.push(u);
                }
                updates
            };

            {
                let ([mut thk, mut href, mut residual], _view) = store.split_mut([f.thk, f.href, f.residual])?;
                for ((i, j), u) in grid.points().zip(&updates) {
                    thk.set(i, j, u.thk);
                    href.set(i, j, u.href);
                    residual.set(i, j, u.residual);
                }
            }
            for id in [f.thk, f.href, f.residual] {
                store.update_ghosts(id)?;
            }
        }

        let leftover = {
            let mut residual = store.access_mut(f.residual)?;
            let mut local = 0.0;
            for (i, j) in grid.points() {
                local += residual.get(i, j);
                residual.set(i, j, 0.0);
            }
            local
        };
        store.update_ghosts(f.residual)?;
        if leftover > 0.0 {
            debug!(leftover, "discarding partial-cell residual");
        }
        Ok(leftover * area)
    }
}

impl Component for MassContinuity {
    fn name(&self) -> &str {
        "mass_continuity"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let config = ctx.config;
        self.include_bmr = config.get_flag("include_bmr_in_continuity")?;
        self.part_grid = if config.get_flag("part_grid")? {
            Some(PartGrid {
                reduce_frontal_thickness: config.get_flag("part_grid_reduce_frontal_thickness")?,
                max_passes: config.get_usize("part_redist_max_passes")?,
            })
        } else {
            None
        };
        let residual = store.create_field(
            FieldMetadata::new("part_grid_residual", "partial-cell residual thickness", "m"),
            FieldShape::Scalar2D,
            1,
        )?;
        self.fields = Some(ContinuityFields {
            thk: store.ensure(Var::Thickness)?,
            href: store.ensure(Var::ThicknessRef)?,
            mask: store.ensure(Var::Mask)?,
            usurf: store.ensure(Var::Surface)?,
            topg: store.ensure(Var::Bed)?,
            velbase: store.ensure(Var::VelBase)?,
            flux: store.ensure(Var::DiffusiveFlux)?,
            smb: store.ensure(Var::MassBalance)?,
            bmelt: store.ensure(Var::BasalMelt)?,
            shelf_melt: store.ensure(Var::ShelfBaseMassFlux)?,
            bc_mask: store.ensure(Var::BcMask)?,
            divergence: store.ensure(Var::FluxDivergence)?,
            residual,
        });
        self.grid = Some(Arc::clone(ctx.grid));
        debug!(part_grid = self.part_grid.is_some(), include_bmr = self.include_bmr, "mass continuity");
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec![
            "thk",
            "Href",
            "mask",
            "usurf",
            "topg",
            "velbase",
            "diffusive_flux",
            "climatic_mass_balance",
            "bmelt",
            "shelfbmassflux",
            "bc_mask",
        ]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["thk", "Href", "flux_divergence"]
    }

    fn diagnostics(&self) -> Vec<&'static str> {
        vec!["part_grid_residual"]
    }
}

/// Total ice volume including partially filled cells, m3.
pub fn ice_volume(store: &FieldStore) -> Result<f64> {
    let area = store.grid().cell_area();
    Ok((store.sum(store.id(Var::Thickness)?)? + store.sum(store.id(Var::ThicknessRef)?)?) * area)
}
