//! Non-sliding shallow ice approximation.
//!
//! Fluxes live on the staggered grid: the x face `i + 1/2` sits between
//! columns `i` and `i + 1`, the y face `j + 1/2` between rows `j` and
//! `j + 1`. On each face, with `H` the face thickness and `h` the surface,
//!
//! ```text
//! u(z) = -2 e (rho g)^n |grad h|^(n-1) dh/dx  int_0^z A (H - s)^n ds
//! D    =  2 e (rho g)^n |grad h|^(n-1)        int_0^H A (H - s)^(n+1) ds
//! q    = -D grad h
//! ```
//!
//! `A` is taken per layer as the mean of its two levels and the power
//! integrals are evaluated exactly, so an isothermal column reproduces
//! the analytic diffusivity.

use std::sync::Arc;

use tracing::trace;

use super::{FlowLaw, INPUTS, OUTPUTS, VelocityFields, flow_law_from_config, has_ice};
use crate::components::{Component, InitContext, StressBalance, StressBalanceStats};
use crate::config::Constants;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::grid::Grid;
use crate::types::FieldId;

/// Values on every face of one staggering direction.
#[derive(Debug, Default)]
struct FaceValues {
    mz: usize,
    /// Flux through the face, m2 s-1
    flux: Vec<f64>,
    /// Velocity normal to the face at each level
    velocity: Vec<f64>,
    /// Strain heating at each level
    heating: Vec<f64>,
}

impl FaceValues {
    fn reset(&mut self, faces: usize, mz: usize) {
        self.mz = mz;
        self.flux.clear();
        self.flux.resize(faces, 0.0);
        self.velocity.clear();
        self.velocity.resize(faces * mz, 0.0);
        self.heating.clear();
        self.heating.resize(faces * mz, 0.0);
    }

    fn levels_mut(&mut self, face: usize) -> (&mut [f64], &mut [f64]) {
        let r = face * self.mz..(face + 1) * self.mz;
        (&mut self.velocity[r.clone()], &mut self.heating[r])
    }

    fn velocity(&self, face: usize) -> &[f64] {
        &self.velocity[face * self.mz..(face + 1) * self.mz]
    }

    fn heating(&self, face: usize) -> &[f64] {
        &self.heating[face * self.mz..(face + 1) * self.mz]
    }
}

/// Deformation integrals of one column.
///
/// Fills `partial[k]` with `int_0^min(z_k, H) A (H - s)^n ds` and returns
/// `int_0^H A (H - s)^(n+1) ds`.
pub(crate) fn column_integrals(z: &[f64], softness: &[f64], thickness: f64, n: f64, partial: &mut [f64]) -> f64 {
    let (mut inner, mut outer) = (0.0, 0.0);
    if let Some(first) = partial.first_mut() {
        *first = 0.0;
    }
    for k in 1..z.len() {
        let (lo, hi) = (z[k - 1], z[k].min(thickness));
        if hi > lo {
            let a = 0.5 * (softness[k - 1] + softness[k]);
            let (d_lo, d_hi) = (thickness - lo, thickness - hi);
            inner += a * (d_lo.powf(n + 1.0) - d_hi.powf(n + 1.0)) / (n + 1.0);
            outer += a * (d_lo.powf(n + 2.0) - d_hi.powf(n + 2.0)) / (n + 2.0);
        }
        partial[k] = inner;
    }
    outer
}

/// The SIA stress balance.
#[derive(Debug)]
pub struct SiaModel {
    flow_law: Option<Box<dyn FlowLaw>>,
    enhancement: f64,
    constants: Constants,
    grid: Option<Arc<Grid>>,
    fields: Option<VelocityFields>,
    enthalpy: Option<FieldId>,
    x_faces: FaceValues,
    y_faces: FaceValues,
}

impl Default for SiaModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SiaModel {
    pub fn new() -> Self {
        Self {
            flow_law: None,
            enhancement: 1.0,
            constants: Constants::default(),
            grid: None,
            fields: None,
            enthalpy: None,
            x_faces: FaceValues::default(),
            y_faces: FaceValues::default(),
        }
    }

    /// Use `law` instead of the configured flow law.
    pub fn with_flow_law(mut self, law: Box<dyn FlowLaw>) -> Self {
        self.flow_law = Some(law);
        self
    }

    fn uninitialized() -> IceError {
        IceError::Lifecycle {
            component: "sia".into(),
            state: "uninitialized".into(),
        }
    }

    /// Softness at each level of a face, from the mean enthalpy of its two columns.
    fn softness_profile(
        law: &dyn FlowLaw,
        rho_g: f64,
        thickness: f64,
        z: &[f64],
        enthalpy: Option<(&[f64], &[f64])>,
        out: &mut [f64],
    ) {
        for (k, a) in out.iter_mut().enumerate() {
            let pressure = rho_g * (thickness - z[k]).max(0.0);
            let e = enthalpy.map_or(0.0, |(w, east)| 0.5 * (w[k] + east[k]));
            *a = law.softness(e, pressure);
        }
    }

    /// Velocities and heating on one face. Returns `(flux, diffusivity)`.
    #[allow(clippy::too_many_arguments)]
    fn solve_face(
        &self,
        n: f64,
        thickness: f64,
        normal_slope: f64,
        slope: f64,
        softness: &[f64],
        z: &[f64],
        partial: &mut [f64],
        velocity: &mut [f64],
        heating: &mut [f64],
    ) -> (f64, f64) {
        let rho_g = self.constants.ice_density * self.constants.standard_gravity;
        let outer = column_integrals(z, softness, thickness, n, partial);
        let factor = 2.0 * self.enhancement * rho_g.powf(n) * slope.powf(n - 1.0);
        for k in 0..z.len() {
            velocity[k] = -factor * partial[k] * normal_slope;
            heating[k] = if z[k] < thickness {
                2.0 * self.enhancement * softness[k] * (rho_g * (thickness - z[k]) * slope).powf(n + 1.0)
            } else {
                0.0
            };
        }
        let d = factor * outer;
        (-d * normal_slope, d)
    }
}

impl Component for SiaModel {
    fn name(&self) -> &str {
        "sia"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        if self.flow_law.is_none() {
            self.flow_law = Some(flow_law_from_config(ctx.config, ctx.constants)?);
        }
        self.enhancement = ctx.config.get_double("sia_enhancement_factor")?;
        if self.enhancement <= 0.0 {
            return Err(IceError::config(format!(
                "sia_enhancement_factor must be positive, got {}",
                self.enhancement
            )));
        }
        self.constants = *ctx.constants;
        let dirichlet = ctx.config.get_flag("ssa_dirichlet_bc")?;
        self.fields = Some(VelocityFields::ensure(store, dirichlet)?);
        self.enthalpy = match &self.flow_law {
            Some(law) if law.uses_enthalpy() => Some(store.ensure(Var::Enthalpy)?),
            _ => None,
        };
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        INPUTS.to_vec()
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        OUTPUTS.to_vec()
    }
}

impl StressBalance for SiaModel {
    fn update(&mut self, store: &mut FieldStore) -> Result<StressBalanceStats> {
        let grid = self.grid.clone().ok_or_else(Self::uninitialized)?;
        let f = self.fields.ok_or_else(Self::uninitialized)?;
        if !has_ice(&grid, store, f.thk)? {
            f.zero(store)?;
            return Ok(StressBalanceStats::default());
        }
        for id in [f.thk, f.usurf].into_iter().chain(self.enthalpy) {
            if !store.field(id)?.ghosts_fresh() {
                store.update_ghosts(id)?;
            }
        }

        let patch = *grid.patch();
        let (xs, ys) = (patch.xs, patch.ys);
        let (xm, ym) = (patch.xm as isize, patch.ym as isize);
        let (dx, dy) = (grid.dx(), grid.dy());
        let z = grid.z().to_vec();
        let mz = z.len();
        let rho_g = self.constants.ice_density * self.constants.standard_gravity;

        let mut x_faces = std::mem::take(&mut self.x_faces);
        let mut y_faces = std::mem::take(&mut self.y_faces);
        x_faces.reset(((xm + 1) * ym) as usize, mz);
        y_faces.reset((xm * (ym + 1)) as usize, mz);
        let mut softness = vec![0.0; mz];
        let mut partial = vec![0.0; mz];
        let mut d_local = 0.0_f64;

        {
            let law = self.flow_law.as_deref().ok_or_else(Self::uninitialized)?;
            let n = law.exponent();
            let view = store.view();
            let thk = view.stencil(f.thk)?;
            let usurf = view.stencil(f.usurf)?;
            let enthalpy = self.enthalpy.map(|id| view.stencil(id)).transpose()?;

            for j in ys..ys + ym {
                for i in xs - 1..xs + xm {
                    if grid.is_closed_x_face(i) {
                        continue;
                    }
                    let h = 0.5 * (thk.get(i, j) + thk.get(i + 1, j));
                    if h <= 0.0 {
                        continue;
                    }
                    let sx = (usurf.get(i + 1, j) - usurf.get(i, j)) / dx;
                    let sy = (usurf.get(i, j + 1) + usurf.get(i + 1, j + 1)
                        - usurf.get(i, j - 1)
                        - usurf.get(i + 1, j - 1))
                        / (4.0 * dy);
                    let columns = enthalpy.map(|e| (e.column(i, j), e.column(i + 1, j)));
                    Self::softness_profile(law, rho_g, h, &z, columns, &mut softness);
                    let face = ((i - (xs - 1)) + (xm + 1) * (j - ys)) as usize;
                    let (velocity, heating) = x_faces.levels_mut(face);
                    let (q, d) =
                        self.solve_face(n, h, sx, sx.hypot(sy), &softness, &z, &mut partial, velocity, heating);
                    x_faces.flux[face] = q;
                    d_local = d_local.max(d);
                }
            }

            for j in ys - 1..ys + ym {
                if grid.is_closed_y_face(j) {
                    continue;
                }
                for i in xs..xs + xm {
                    let h = 0.5 * (thk.get(i, j) + thk.get(i, j + 1));
                    if h <= 0.0 {
                        continue;
                    }
                    let sy = (usurf.get(i, j + 1) - usurf.get(i, j)) / dy;
                    let sx = (usurf.get(i + 1, j) + usurf.get(i + 1, j + 1)
                        - usurf.get(i - 1, j)
                        - usurf.get(i - 1, j + 1))
                        / (4.0 * dx);
                    let columns = enthalpy.map(|e| (e.column(i, j), e.column(i, j + 1)));
                    Self::softness_profile(law, rho_g, h, &z, columns, &mut softness);
                    let face = ((i - xs) + xm * (j - (ys - 1))) as usize;
                    let (velocity, heating) = y_faces.levels_mut(face);
                    let (q, d) =
                        self.solve_face(n, h, sy, sx.hypot(sy), &softness, &z, &mut partial, velocity, heating);
                    y_faces.flux[face] = q;
                    d_local = d_local.max(d);
                }
            }
        }

        {
            let ([mut u3, mut v3, mut w3, mut heat, mut velbar, mut velbase, mut flux], view) =
                store.split_mut([f.u3, f.v3, f.w3, f.strain_heating, f.velbar, f.velbase, f.flux])?;
            let thk = view.access(f.thk)?;
            let bmelt = view.access(f.bmelt)?;
            for (i, j) in grid.points() {
                let (li, lj) = (i - xs, j - ys);
                let west = (li + (xm + 1) * lj) as usize;
                let east = west + 1;
                let south = (li + xm * lj) as usize;
                let north = south + xm as usize;

                let (uw, ue) = (x_faces.velocity(west), x_faces.velocity(east));
                let (vs, vn) = (y_faces.velocity(south), y_faces.velocity(north));
                for (k, u) in u3.column_mut(i, j).iter_mut().enumerate() {
                    *u = 0.5 * (uw[k] + ue[k]);
                }
                for (k, v) in v3.column_mut(i, j).iter_mut().enumerate() {
                    *v = 0.5 * (vs[k] + vn[k]);
                }
                let (hw, he) = (x_faces.heating(west), x_faces.heating(east));
                let (hs, hn) = (y_faces.heating(south), y_faces.heating(north));
                for (k, s) in heat.column_mut(i, j).iter_mut().enumerate() {
                    *s = 0.25 * (hw[k] + he[k] + hs[k] + hn[k]);
                }
                VelocityFields::integrate_w(w3.column_mut(i, j), &z, bmelt.get(i, j), |k| {
                    (ue[k] - uw[k]) / dx + (vn[k] - vs[k]) / dy
                });

                let h = thk.get(i, j);
                let qx = 0.5 * (x_faces.flux[west] + x_faces.flux[east]);
                let qy = 0.5 * (y_faces.flux[south] + y_faces.flux[north]);
                velbar.set_vec(i, j, if h > 0.0 { (qx / h, qy / h) } else { (0.0, 0.0) });
                velbase.set_vec(i, j, (0.0, 0.0));
                flux.set_vec(i, j, (x_faces.flux[east], y_faces.flux[north]));
            }
        }
        self.x_faces = x_faces;
        self.y_faces = y_faces;

        f.apply_dirichlet(&grid, store)?;
        f.exchange(store)?;
        let d_max = grid.max(d_local)?;
        trace!(d_max, "SIA solved");
        Ok(StressBalanceStats { d_max, solved: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geometry::update_geometry;
    use crate::grid::GridParameters;
    use crate::stressbalance::IsothermalGlen;
    use crate::time::ModelTime;
    use crate::types::SECONDS_PER_YEAR;
    use approx::assert_relative_eq;

    #[test]
    fn test_isothermal_integrals_are_exact() {
        let z: Vec<f64> = (0..11).map(|k| 150.0 * k as f64).collect();
        let a = vec![2.0; z.len()];
        let mut partial = vec![0.0; z.len()];
        let h: f64 = 1000.0;
        let outer = column_integrals(&z, &a, h, 3.0, &mut partial);
        assert_relative_eq!(outer, 2.0 * h.powi(5) / 5.0, max_relative = 1e-12);
        assert_relative_eq!(partial[10], 2.0 * h.powi(4) / 4.0, max_relative = 1e-12);
        assert_eq!(partial[0], 0.0);
        // levels above the surface see the full integral
        assert_eq!(partial[8], partial[10]);
    }

    fn setup(slope: f64, thickness: f64) -> (Arc<Grid>, FieldStore, SiaModel) {
        let config = Config::defaults();
        let constants = Constants::default();
        let grid = Arc::new(Grid::serial(GridParameters::new(5, 5, 10e3, 10e3).with_vertical(21, 2000.0)).unwrap());
        let mut store = FieldStore::new(Arc::clone(&grid));
        for v in [Var::Bed, Var::Mask] {
            store.ensure(v).unwrap();
        }
        let time = ModelTime::from_config(&config).unwrap();
        let ctx = InitContext {
            config: &config,
            constants: &constants,
            time: &time,
            grid: &grid,
            input: None,
            bootstrap: true,
        };
        let mut sia = SiaModel::new().with_flow_law(Box::new(IsothermalGlen::default()));
        sia.init(&ctx, &mut store).unwrap();

        let (thk, bed) = (store.id(Var::Thickness).unwrap(), store.id(Var::Bed).unwrap());
        {
            let ([mut h, mut b], _) = store.split_mut([thk, bed]).unwrap();
            for (i, j) in grid.points() {
                h.set(i, j, thickness);
                b.set(i, j, -slope * grid.x(i));
            }
        }
        update_geometry(&mut store, &constants, 0.0).unwrap();
        (grid, store, sia)
    }

    #[test]
    fn test_flat_surface_does_not_flow() {
        let (_grid, mut store, mut sia) = setup(0.0, 1000.0);
        let stats = sia.update(&mut store).unwrap();
        assert!(stats.solved);
        assert_eq!(stats.d_max, 0.0);
        let u3 = store.access(store.id(Var::U3).unwrap()).unwrap();
        assert_eq!(u3.at(2, 2, 10), 0.0);
    }

    #[test]
    fn test_slab_matches_analytic_diffusivity() {
        let slope = 1e-3;
        let h: f64 = 1000.0;
        let (_grid, mut store, mut sia) = setup(slope, h);
        let stats = sia.update(&mut store).unwrap();

        let a = 1e-16 / SECONDS_PER_YEAR;
        let rho_g: f64 = 910.0 * 9.81;
        let d = 2.0 * a * rho_g.powi(3) * slope.powi(2) * h.powi(5) / 5.0;
        assert_relative_eq!(stats.d_max, d, max_relative = 1e-10);

        let (qx, qy) = store.access(store.id(Var::DiffusiveFlux).unwrap()).unwrap().vec(2, 2);
        assert_relative_eq!(qx, d * slope, max_relative = 1e-10);
        assert_eq!(qy, 0.0);

        // uniform flow: velbar = q / H and w stays at the basal value
        let (ub, _) = store.access(store.id(Var::VelBar).unwrap()).unwrap().vec(2, 2);
        assert_relative_eq!(ub, d * slope / h, max_relative = 1e-10);
        let w3 = store.access(store.id(Var::W3).unwrap()).unwrap();
        assert!(w3.at(2, 2, 20).abs() < 1e-20);

        // surface velocity exceeds the mean, basal velocity is zero
        let u3 = store.access(store.id(Var::U3).unwrap()).unwrap();
        assert_eq!(u3.at(2, 2, 0), 0.0);
        assert!(u3.at(2, 2, 20) > ub);
    }

    #[test]
    fn test_no_ice_skips_solve() {
        let (_grid, mut store, mut sia) = setup(1e-3, 0.0);
        let stats = sia.update(&mut store).unwrap();
        assert!(!stats.solved);
        assert_eq!(stats.d_max, 0.0);
    }
}
