//! The enthalpy column model.
//!
//! Each column solves
//!
//! ```text
//! dE/dt + u . grad E + w dE/dz = d/dz (K dE/dz) + Sigma / rho
//! ```
//!
//! implicitly in the vertical (upwinded advection, `K = k / (rho c)` in
//! cold ice and `ratio * k / (rho c)` in temperate ice) with the
//! horizontal advection and strain heating taken explicitly from the
//! start of the step. Columns are independent once those explicit terms
//! are known, so they can be solved in parallel.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{EnthalpyConverter, TridiagonalSystem};
use crate::components::{Component, EnergyModel, EnergyStats, InitContext};
use crate::config::Constants;
use crate::error::{IceError, Result};
use crate::fields::{FieldRead, FieldStore, Var};
use crate::geometry::{CellType, cell_type};
use crate::grid::Grid;
use crate::types::FieldId;

// =============================================================================
// Column solver
// =============================================================================

/// Inputs and results of one column solve.
#[derive(Clone, Debug)]
pub struct Column {
    pub thickness: f64,
    pub cell: CellType,
    /// K
    pub surface_temp: f64,
    /// K
    pub shelf_temp: f64,
    /// Sub-shelf melt, m s-1 ice equivalent
    pub shelf_melt: f64,
    /// Upward heat flux into the ice base, W m-2
    pub heat_flux: f64,
    /// Enthalpy at each level; replaced by the solution
    pub enthalpy: Vec<f64>,
    /// Explicit tendency at each level, J kg-1 s-1
    pub source: Vec<f64>,
    /// Vertical velocity at each level, m s-1
    pub w: Vec<f64>,

    /// Basal melt rate, m s-1 ice equivalent
    pub basal_melt: f64,
    /// Water drained to the base, m ice equivalent
    pub drained: f64,
    pub low_temps: usize,
    pub cfl_violation: bool,
}

impl Column {
    /// A cold grounded column of thickness `thickness` over `mz` levels.
    pub fn grounded(thickness: f64, mz: usize, enthalpy: f64) -> Self {
        Self {
            thickness,
            cell: CellType::Grounded,
            surface_temp: 248.15,
            shelf_temp: 273.15,
            shelf_melt: 0.0,
            heat_flux: 0.0,
            enthalpy: vec![enthalpy; mz],
            source: vec![0.0; mz],
            w: vec![0.0; mz],
            basal_melt: 0.0,
            drained: 0.0,
            low_temps: 0,
            cfl_violation: false,
        }
    }
}

/// Implicit vertical solve shared by every column of a step.
#[derive(Clone, Debug)]
pub struct ColumnSolver {
    pub converter: EnthalpyConverter,
    /// Cold ice diffusivity k / (rho c), m2 s-1
    pub diffusivity: f64,
    pub temperate_ratio: f64,
    pub omega_max: f64,
    pub min_temp: f64,
    pub ice_density: f64,
    pub z: Vec<f64>,
    pub dt: f64,
}

impl ColumnSolver {
    pub fn new(constants: &Constants, z: Vec<f64>, dt: f64) -> Self {
        Self {
            converter: EnthalpyConverter::new(constants),
            diffusivity: constants.ice_k / (constants.ice_density * constants.ice_c),
            temperate_ratio: 0.1,
            omega_max: 0.01,
            min_temp: 200.0,
            ice_density: constants.ice_density,
            z,
            dt,
        }
    }

    /// Height of the control volume around level `k` of a column topped at `ks`.
    fn control_height(&self, k: usize, ks: usize) -> f64 {
        let z = &self.z;
        match k {
            0 => 0.5 * (z[1] - z[0]),
            k if k == ks => 0.5 * (z[k] - z[k - 1]),
            k => 0.5 * (z[k + 1] - z[k - 1]),
        }
    }

    /// Advance `col` by `dt`.
    pub fn solve(&self, col: &mut Column, sys: &mut TridiagonalSystem) -> Result<()> {
        let ec = &self.converter;
        let z = &self.z;
        let h = col.thickness;
        let e_surface = ec.enthalpy_permissive(col.surface_temp, 0.0);
        col.basal_melt = 0.0;
        col.drained = 0.0;
        col.low_temps = 0;
        col.cfl_violation = false;

        if h <= 0.0 || !col.cell.is_icy() {
            col.enthalpy.fill(e_surface);
            return Ok(());
        }
        let ks = z.iter().rposition(|&zk| zk <= h).unwrap_or(0);
        if ks == 0 {
            col.enthalpy.fill(e_surface);
            if col.cell == CellType::Floating {
                col.basal_melt = col.shelf_melt;
            }
            return Ok(());
        }

        let dt = self.dt;
        let pressure = |k: usize| ec.pressure(h - z[k]);
        let node_k = |k: usize| {
            if ec.is_temperate(col.enthalpy[k], pressure(k)) {
                self.temperate_ratio * self.diffusivity
            } else {
                self.diffusivity
            }
        };
        let p_base = pressure(0);
        let e_cts_base = ec.enthalpy_cts(p_base);
        let floating = col.cell == CellType::Floating;
        let temperate_base = !floating && col.enthalpy[0] >= e_cts_base;

        // base
        let dz0 = z[1] - z[0];
        if floating {
            sys.b[0] = 1.0;
            sys.c[0] = 0.0;
            sys.r[0] = ec.enthalpy_permissive(col.shelf_temp, p_base);
        } else if temperate_base {
            sys.b[0] = 1.0;
            sys.c[0] = 0.0;
            sys.r[0] = e_cts_base;
        } else {
            let k0 = 0.5 * (node_k(0) + node_k(1));
            let lambda = 2.0 * dt * k0 / (dz0 * dz0);
            sys.b[0] = 1.0 + lambda;
            sys.c[0] = -lambda;
            sys.r[0] = col.enthalpy[0] + dt * col.source[0] + 2.0 * dt * col.heat_flux / (self.ice_density * dz0);
        }

        // interior
        for k in 1..ks {
            let (dm, dp) = (z[k] - z[k - 1], z[k + 1] - z[k]);
            let km = 0.5 * (node_k(k - 1) + node_k(k));
            let kp = 0.5 * (node_k(k) + node_k(k + 1));
            let lower = 2.0 * dt * km / (dm * (dm + dp));
            let upper = 2.0 * dt * kp / (dp * (dm + dp));
            let mut a = -lower;
            let mut b = 1.0 + lower + upper;
            let mut c = -upper;
            let w = col.w[k];
            if w > 0.0 {
                b += dt * w / dm;
                a -= dt * w / dm;
            } else {
                b -= dt * w / dp;
                c += dt * w / dp;
            }
            sys.a[k] = a;
            sys.b[k] = b;
            sys.c[k] = c;
            sys.r[k] = col.enthalpy[k] + dt * col.source[k];
            if w.abs() * dt > dm.min(dp) {
                col.cfl_violation = true;
            }
        }

        // surface
        sys.a[ks] = 0.0;
        sys.b[ks] = 1.0;
        sys.r[ks] = e_surface;

        let mut x = vec![0.0; ks + 1];
        sys.solve(ks + 1, &mut x)?;

        // melt at the base
        if !floating {
            if temperate_base {
                let k0 = 0.5 * (node_k(0) + node_k(1));
                let into_ice = -self.ice_density * k0 * (x[1] - x[0]) / dz0;
                let melt = (col.heat_flux - into_ice) / (self.ice_density * ec.latent_heat());
                col.basal_melt = melt.max(0.0);
            } else if x[0] > e_cts_base {
                col.basal_melt = (x[0] - e_cts_base) * 0.5 * dz0 / (ec.latent_heat() * dt);
                x[0] = e_cts_base;
            }
        }

        // drainage of water above omega_max
        for (k, e) in x.iter_mut().enumerate() {
            let p = pressure(k);
            let e_cts = ec.enthalpy_cts(p);
            let omega = (*e - e_cts) / ec.latent_heat();
            if omega > self.omega_max {
                col.drained += (omega - self.omega_max) * self.control_height(k, ks);
                *e = e_cts + self.omega_max * ec.latent_heat();
            }
            if ec.temperature(*e, p) < self.min_temp {
                col.low_temps += 1;
            }
        }
        if floating {
            col.basal_melt = col.shelf_melt;
        } else {
            col.basal_melt += col.drained / dt;
        }

        col.enthalpy[..=ks].copy_from_slice(&x);
        col.enthalpy[ks + 1..].fill(e_surface);
        Ok(())
    }
}

// =============================================================================
// Model
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct EnergyFields {
    enthalpy: FieldId,
    u3: FieldId,
    v3: FieldId,
    w3: FieldId,
    strain_heating: FieldId,
    thk: FieldId,
    mask: FieldId,
    surface_temp: FieldId,
    shelf_temp: FieldId,
    shelf_melt: FieldId,
    bedrock_flux: FieldId,
    bmelt: FieldId,
    temp: FieldId,
    liqfrac: FieldId,
}

/// Enthalpy of the ice and the basal melt rate it implies.
#[derive(Debug)]
pub struct EnthalpyModel {
    constants: Constants,
    temperate_ratio: f64,
    omega_max: f64,
    min_temp: f64,
    max_low_temps: usize,
    grid: Option<Arc<Grid>>,
    fields: Option<EnergyFields>,
}

impl Default for EnthalpyModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EnthalpyModel {
    pub fn new() -> Self {
        Self {
            constants: Constants::default(),
            temperate_ratio: 0.1,
            omega_max: 0.01,
            min_temp: 200.0,
            max_low_temps: 10,
            grid: None,
            fields: None,
        }
    }

    fn uninitialized() -> IceError {
        IceError::Lifecycle {
            component: "enthalpy".into(),
            state: "uninitialized".into(),
        }
    }

    fn solver(&self, z: Vec<f64>, dt: f64) -> ColumnSolver {
        let mut solver = ColumnSolver::new(&self.constants, z, dt);
        solver.temperate_ratio = self.temperate_ratio;
        solver.omega_max = self.omega_max;
        solver.min_temp = self.min_temp;
        solver
    }
}

/// Upwind horizontal advection of level `k` at `(i, j)`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn upwind_advection(field: &FieldRead<'_>, i: isize, j: isize, k: usize, u: f64, v: f64, dx: f64, dy: f64) -> f64 {
    let c = field.at(i, j, k);
    let ddx = if u > 0.0 {
        (c - field.at(i - 1, j, k)) / dx
    } else {
        (field.at(i + 1, j, k) - c) / dx
    };
    let ddy = if v > 0.0 {
        (c - field.at(i, j - 1, k)) / dy
    } else {
        (field.at(i, j + 1, k) - c) / dy
    };
    u * ddx + v * ddy
}

/// Solve every column, in parallel when enabled.
pub(crate) fn solve_columns(solver: &ColumnSolver, columns: &mut [Column]) -> Result<()> {
    let n = solver.z.len();
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        columns
            .par_iter_mut()
            .try_for_each_init(|| TridiagonalSystem::new(n), |sys, col| solver.solve(col, sys))
    }
    #[cfg(not(feature = "parallel"))]
    {
        let mut sys = TridiagonalSystem::new(n);
        columns.iter_mut().try_for_each(|col| solver.solve(col, &mut sys))
    }
}

impl Component for EnthalpyModel {
    fn name(&self) -> &str {
        "enthalpy"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let config = ctx.config;
        self.constants = *ctx.constants;
        self.temperate_ratio = config.get_double("enthalpy_temperate_conductivity_ratio")?;
        self.omega_max = config.get_double("liquid_water_fraction_max")?;
        self.min_temp = config.get_double("global_min_allowed_temp")?;
        self.max_low_temps = config.get_usize("max_low_temp_count")?;
        if !(0.0..=1.0).contains(&self.omega_max) {
            return Err(IceError::config(format!(
                "liquid_water_fraction_max must lie in [0, 1], got {}",
                self.omega_max
            )));
        }
        self.fields = Some(EnergyFields {
            enthalpy: store.ensure(Var::Enthalpy)?,
            u3: store.ensure(Var::U3)?,
            v3: store.ensure(Var::V3)?,
            w3: store.ensure(Var::W3)?,
            strain_heating: store.ensure(Var::StrainHeating)?,
            thk: store.ensure(Var::Thickness)?,
            mask: store.ensure(Var::Mask)?,
            surface_temp: store.ensure(Var::SurfaceTemp)?,
            shelf_temp: store.ensure(Var::ShelfBaseTemp)?,
            shelf_melt: store.ensure(Var::ShelfBaseMassFlux)?,
            bedrock_flux: store.ensure(Var::BedrockFlux)?,
            bmelt: store.ensure(Var::BasalMelt)?,
            temp: store.ensure(Var::Temperature)?,
            liqfrac: store.ensure(Var::LiquidFraction)?,
        });
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec![
            "enthalpy",
            "uvel",
            "vvel",
            "wvel",
            "strain_heating",
            "thk",
            "mask",
            "ice_surface_temp",
            "shelfbtemp",
            "shelfbmassflux",
            "bheatflx_top",
        ]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["enthalpy", "bmelt", "temp", "liqfrac"]
    }
}

impl EnergyModel for EnthalpyModel {
    fn update(&mut self, _t: f64, dt: f64, store: &mut FieldStore) -> Result<EnergyStats> {
        let grid = self.grid.clone().ok_or_else(Self::uninitialized)?;
        let f = self.fields.ok_or_else(Self::uninitialized)?;
        if !store.field(f.enthalpy)?.ghosts_fresh() {
            store.update_ghosts(f.enthalpy)?;
        }
        let z = grid.z().to_vec();
        let mz = z.len();
        let (dx, dy) = (grid.dx(), grid.dy());
        let rho = self.constants.ice_density;

        let mut columns = Vec::with_capacity(grid.patch().len());
        {
            let view = store.view();
            let e = view.stencil(f.enthalpy)?;
            let (u3, v3, w3) = (view.access(f.u3)?, view.access(f.v3)?, view.access(f.w3)?);
            let heat = view.access(f.strain_heating)?;
            let (thk, mask) = (view.access(f.thk)?, view.access(f.mask)?);
            let (ts, sbt, sbm) = (
                view.access(f.surface_temp)?,
                view.access(f.shelf_temp)?,
                view.access(f.shelf_melt)?,
            );
            let flux = view.access(f.bedrock_flux)?;
            for (i, j) in grid.points() {
                let (u, v) = (u3.column(i, j), v3.column(i, j));
                let sigma = heat.column(i, j);
                let source = (0..mz)
                    .map(|k| sigma[k] / rho - upwind_advection(&e, i, j, k, u[k], v[k], dx, dy))
                    .collect();
                columns.push(Column {
                    thickness: thk.get(i, j),
                    cell: cell_type(mask.get(i, j)),
                    surface_temp: ts.get(i, j),
                    shelf_temp: sbt.get(i, j),
                    shelf_melt: sbm.get(i, j),
                    heat_flux: flux.get(i, j),
                    enthalpy: e.column(i, j).to_vec(),
                    source,
                    w: w3.column(i, j).to_vec(),
                    basal_melt: 0.0,
                    drained: 0.0,
                    low_temps: 0,
                    cfl_violation: false,
                });
            }
        }

        let solver = self.solver(z, dt);
        solve_columns(&solver, &mut columns)?;

        let mut stats = EnergyStats::default();
        {
            let ([mut e, mut bmelt, mut temp, mut liqfrac], _) =
                store.split_mut([f.enthalpy, f.bmelt, f.temp, f.liqfrac])?;
            let ec = &solver.converter;
            for ((i, j), col) in grid.points().zip(&columns) {
                e.column_mut(i, j).copy_from_slice(&col.enthalpy);
                bmelt.set(i, j, col.basal_melt);
                let h = col.thickness;
                for (k, (t, w)) in temp
                    .column_mut(i, j)
                    .iter_mut()
                    .zip(liqfrac.column_mut(i, j).iter_mut())
                    .enumerate()
                {
                    let p = ec.pressure(h - solver.z[k]);
                    *t = ec.temperature(col.enthalpy[k], p);
                    *w = ec.water_fraction(col.enthalpy[k], p);
                }
                stats.low_temp_count += col.low_temps;
                stats.cfl_violations += usize::from(col.cfl_violation);
                stats.drained += col.drained;
            }
        }
        store.update_ghosts(f.enthalpy)?;

        let area = grid.cell_area() * self.constants.ice_density / self.constants.fresh_water_density;
        stats.drained = grid.sum(stats.drained * area)?;
        stats.low_temp_count = grid.sum(stats.low_temp_count as f64)? as usize;
        stats.cfl_violations = grid.sum(stats.cfl_violations as f64)? as usize;
        if stats.cfl_violations > 0 {
            debug!(columns = stats.cfl_violations, "vertical CFL exceeded in the enthalpy solve");
        }
        if stats.low_temp_count > self.max_low_temps {
            return Err(IceError::LowTemperature {
                count: stats.low_temp_count,
                max: self.max_low_temps,
            });
        }
        if stats.low_temp_count > 0 {
            warn!(count = stats.low_temp_count, "ice temperatures below the allowed minimum");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solver(dt: f64) -> ColumnSolver {
        let z: Vec<f64> = (0..21).map(|k| 100.0 * k as f64).collect();
        ColumnSolver::new(&Constants::default(), z, dt)
    }

    #[test]
    fn test_ice_free_column_takes_surface_value() {
        let s = solver(1e7);
        let mut col = Column::grounded(0.0, 21, 1.0);
        col.cell = CellType::IceFreeLand;
        let mut sys = TridiagonalSystem::new(21);
        s.solve(&mut col, &mut sys).unwrap();
        let e_s = s.converter.enthalpy_permissive(248.15, 0.0);
        assert!(col.enthalpy.iter().all(|&e| e == e_s));
        assert_eq!(col.basal_melt, 0.0);
    }

    #[test]
    fn test_cold_column_relaxes_to_linear_profile() {
        // long steps converge to the steady conductive profile dE/dz = -G c / k
        let s = solver(1e12);
        let c = Constants::default();
        let e_s = s.converter.enthalpy_permissive(248.15, 0.0);
        let mut col = Column::grounded(1000.0, 21, e_s);
        col.heat_flux = 0.042;
        let mut sys = TridiagonalSystem::new(21);
        for _ in 0..20 {
            s.solve(&mut col, &mut sys).unwrap();
        }
        let gradient = (col.enthalpy[1] - col.enthalpy[0]) / 100.0;
        assert_relative_eq!(gradient, -0.042 * c.ice_c / c.ice_k, max_relative = 1e-6);
        assert_eq!(col.basal_melt, 0.0);
        // above the surface the column holds the surface enthalpy
        assert_eq!(col.enthalpy[15], e_s);
    }

    #[test]
    fn test_excess_water_drains() {
        let s = solver(1e6);
        let p = s.converter.pressure(1000.0 - 500.0);
        let wet = s.converter.enthalpy_cts(p) + 0.05 * s.converter.latent_heat();
        let mut col = Column::grounded(1000.0, 21, wet);
        col.surface_temp = 273.15;
        let mut sys = TridiagonalSystem::new(21);
        s.solve(&mut col, &mut sys).unwrap();
        assert!(col.drained > 0.0);
        assert!(col.basal_melt > 0.0);
        for k in 1..10 {
            let p = s.converter.pressure(1000.0 - 100.0 * k as f64);
            assert!(s.converter.water_fraction(col.enthalpy[k], p) <= 0.01 + 1e-12);
        }
    }

    #[test]
    fn test_floating_base_uses_shelf_values() {
        let s = solver(1e8);
        let e0 = s.converter.enthalpy_permissive(260.0, 0.0);
        let mut col = Column::grounded(500.0, 21, e0);
        col.cell = CellType::Floating;
        col.shelf_temp = 271.0;
        col.shelf_melt = 1e-9;
        let mut sys = TridiagonalSystem::new(21);
        s.solve(&mut col, &mut sys).unwrap();
        assert_eq!(col.basal_melt, 1e-9);
        let p = s.converter.pressure(500.0);
        assert_relative_eq!(col.enthalpy[0], s.converter.enthalpy_permissive(271.0, p));
    }

    #[test]
    fn test_low_temperatures_are_counted() {
        let s = solver(1.0);
        let cold = s.converter.enthalpy_permissive(150.0, 0.0);
        let mut col = Column::grounded(1000.0, 21, cold);
        col.surface_temp = 150.0;
        let mut sys = TridiagonalSystem::new(21);
        s.solve(&mut col, &mut sys).unwrap();
        assert_eq!(col.low_temps, 11);
    }
}
