//! Mohr–Coulomb yield stress of saturated till.
//!
//! ```text
//! N     = delta P_o 10^((e0 / Cc) (1 - W / W_max)),  N <= P_o
//! tau_c = c0 + N tan(phi)
//! ```
//!
//! on grounded ice. Ocean cells get zero and grounded ice-free cells get
//! `high_tauc`.

use std::sync::Arc;

use tracing::debug;

use super::TopgToPhi;
use crate::components::{Component, InitContext, YieldStress};
use crate::config::Constants;
use crate::error::{IceError, Result};
use crate::fields::{FieldRead, FieldStore, Var};
use crate::geometry::{CellType, cell_type};
use crate::grid::Grid;
use crate::io::read_field;
use crate::types::FieldId;

/// Material parameters of the till.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TillProperties {
    /// c0, Pa
    pub cohesion: f64,
    /// e0
    pub reference_void_ratio: f64,
    /// Cc
    pub compressibility: f64,
    /// delta
    pub effective_fraction_overburden: f64,
    /// k, m
    pub log_factor: f64,
    /// W_max, m
    pub tillwat_max: f64,
}

impl Default for TillProperties {
    fn default() -> Self {
        Self {
            cohesion: 0.0,
            reference_void_ratio: 0.69,
            compressibility: 0.12,
            effective_fraction_overburden: 0.02,
            log_factor: 0.1,
            tillwat_max: 2.0,
        }
    }
}

impl TillProperties {
    /// Effective pressure on the till, Pa.
    pub fn effective_pressure(&self, overburden: f64, water: f64) -> f64 {
        let s = (water / self.tillwat_max).min(1.0);
        let exponent = (self.reference_void_ratio / self.compressibility) * (1.0 - s);
        let n = self.effective_fraction_overburden * overburden * 10f64.powf(exponent);
        n.min(overburden)
    }

    /// Effective till water including the transportable layer.
    pub fn with_transportable(&self, till: f64, transportable: f64) -> f64 {
        till + self.log_factor * (1.0 + transportable / self.log_factor).ln()
    }

    pub fn yield_stress(&self, effective_pressure: f64, phi_degrees: f64) -> f64 {
        self.cohesion + effective_pressure * phi_degrees.to_radians().tan()
    }

    /// Friction angle that reproduces `tauc` under `effective_pressure`, degrees.
    pub fn phi_from_tauc(&self, tauc: f64, effective_pressure: f64) -> f64 {
        ((tauc - self.cohesion) / effective_pressure).atan().to_degrees().max(0.0)
    }
}

#[derive(Clone, Copy, Debug)]
struct MohrCoulombFields {
    tauc: FieldId,
    tillphi: FieldId,
    tillwat: FieldId,
    bwat: Option<FieldId>,
    thk: FieldId,
    mask: FieldId,
    topg: FieldId,
}

/// Yield stress from the till friction angle and the till water content.
#[derive(Debug, Default)]
pub struct MohrCoulomb {
    till: TillProperties,
    high_tauc: f64,
    slippery_grounding_lines: bool,
    constants: Constants,
    grid: Option<Arc<Grid>>,
    fields: Option<MohrCoulombFields>,
}

impl MohrCoulomb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn till(&self) -> &TillProperties {
        &self.till
    }

    fn parts(&self) -> Result<(Arc<Grid>, MohrCoulombFields)> {
        self.grid.clone().zip(self.fields).ok_or_else(|| IceError::Lifecycle {
            component: "mohr_coulomb".into(),
            state: "uninitialized".into(),
        })
    }

    /// True for a grounded cell below sea level next to floating ice or open ocean.
    fn near_grounding_line(mask: &FieldRead<'_>, topg: f64, sea_level: f64, i: isize, j: isize) -> bool {
        topg < sea_level
            && [(i + 1, j), (i - 1, j), (i, j + 1), (i, j - 1)]
                .iter()
                .any(|&(a, b)| cell_type(mask.get(a, b)).is_ocean())
    }

    /// Effective pressure at every owned cell, zero off grounded ice.
    fn effective_pressures(
        &self,
        grid: &Grid,
        f: MohrCoulombFields,
        sea_level: f64,
        store: &FieldStore,
    ) -> Result<Vec<f64>> {
        let view = store.view();
        let mask = view.stencil(f.mask)?;
        let (thk, topg, tillwat) = (view.access(f.thk)?, view.access(f.topg)?, view.access(f.tillwat)?);
        let bwat = f.bwat.map(|id| view.access(id)).transpose()?;
        let mut out = Vec::with_capacity(grid.patch().len());
        for (i, j) in grid.points() {
            if cell_type(mask.get(i, j)) != CellType::Grounded {
                out.push(0.0);
                continue;
            }
            let mut water = tillwat.get(i, j);
            if let Some(bwat) = &bwat {
                water = self.till.with_transportable(water, bwat.get(i, j));
            }
            if self.slippery_grounding_lines && Self::near_grounding_line(&mask, topg.get(i, j), sea_level, i, j) {
                water = self.till.tillwat_max;
            }
            out.push(self.till.effective_pressure(self.constants.overburden(thk.get(i, j)), water));
        }
        Ok(out)
    }

    /// Replace `tillphi` on grounded ice by the angle that reproduces the
    /// current `tauc`.
    pub fn tauc_to_phi(&self, sea_level: f64, store: &mut FieldStore) -> Result<()> {
        let (grid, f) = self.parts()?;
        if !store.field(f.mask)?.ghosts_fresh() {
            store.update_ghosts(f.mask)?;
        }
        let pressures = self.effective_pressures(&grid, f, sea_level, store)?;
        let ([mut phi], view) = store.split_mut([f.tillphi])?;
        let tauc = view.access(f.tauc)?;
        for ((i, j), n) in grid.points().zip(pressures) {
            if n > 0.0 {
                phi.set(i, j, self.till.phi_from_tauc(tauc.get(i, j), n));
            }
        }
        Ok(())
    }
}

impl Component for MohrCoulomb {
    fn name(&self) -> &str {
        "mohr_coulomb"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let config = ctx.config;
        self.till = TillProperties {
            cohesion: config.get_double("till_cohesion")?,
            reference_void_ratio: config.get_double("till_reference_void_ratio")?,
            compressibility: config.get_double("till_compressibility_coefficient")?,
            effective_fraction_overburden: config.get_double("till_effective_fraction_overburden")?,
            log_factor: config.get_double("till_log_factor_transportable_water")?,
            tillwat_max: config.get_double("hydrology_tillwat_max")?,
        };
        if self.till.tillwat_max <= 0.0 {
            return Err(IceError::config(
                "the Mohr-Coulomb yield stress needs till water: set hydrology_tillwat_max > 0",
            ));
        }
        let add_transportable = config.get_flag("tauc_add_transportable_water")?;
        if add_transportable && config.get_string("hydrology_model")? != "routing" {
            return Err(IceError::config(
                "tauc_add_transportable_water requires hydrology_model = routing",
            ));
        }
        self.high_tauc = config.get_double("high_tauc")?;
        self.slippery_grounding_lines = config.get_flag("tauc_slippery_grounding_lines")?;
        self.constants = *ctx.constants;

        let f = MohrCoulombFields {
            tauc: store.ensure(Var::YieldStress)?,
            tillphi: store.ensure(Var::TillPhi)?,
            tillwat: store.ensure(Var::TillWater)?,
            bwat: if add_transportable { Some(store.ensure(Var::TransportWater)?) } else { None },
            thk: store.ensure(Var::Thickness)?,
            mask: store.ensure(Var::Mask)?,
            topg: store.ensure(Var::Bed)?,
        };

        if config.get_flag("topg_to_phi")? {
            let ramp = TopgToPhi::from_config(config)?;
            let grid = Arc::clone(ctx.grid);
            let ([mut phi], view) = store.split_mut([f.tillphi])?;
            let topg = view.access(f.topg)?;
            for (i, j) in grid.points() {
                phi.set(i, j, ramp.phi(topg.get(i, j)));
            }
            debug!(?ramp, "till friction angle from bed elevation");
        } else {
            let loaded = match ctx.input {
                Some(ds) => read_field(store, f.tillphi, ds, "input")?,
                None => false,
            };
            if !loaded {
                store.access_mut(f.tillphi)?.fill(config.get_double("default_till_phi")?);
            }
        }

        self.fields = Some(f);
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        let mut inputs = vec!["tillwat", "tillphi", "thk", "mask", "topg"];
        if self.fields.is_some_and(|f| f.bwat.is_some()) {
            inputs.push("bwat");
        }
        inputs
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["tauc"]
    }
}

impl YieldStress for MohrCoulomb {
    fn update(&mut self, _t: f64, _dt: f64, sea_level: f64, store: &mut FieldStore) -> Result<()> {
        let (grid, f) = self.parts()?;
        if !store.field(f.mask)?.ghosts_fresh() {
            store.update_ghosts(f.mask)?;
        }
        let pressures = self.effective_pressures(&grid, f, sea_level, store)?;
        let ([mut tauc], view) = store.split_mut([f.tauc])?;
        let (mask, phi) = (view.access(f.mask)?, view.access(f.tillphi)?);
        for ((i, j), n) in grid.points().zip(pressures) {
            let value = match cell_type(mask.get(i, j)) {
                CellType::Grounded => self.till.yield_stress(n, phi.get(i, j)),
                CellType::IceFreeLand => self.high_tauc,
                CellType::Floating | CellType::IceFreeOcean => 0.0,
            };
            tauc.set(i, j, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::grid::test_grid;
    use crate::time::ModelTime;
    use approx::assert_relative_eq;

    fn init(config: &Config) -> Result<(Arc<Grid>, FieldStore, MohrCoulomb)> {
        let grid = test_grid();
        let mut store = FieldStore::new(Arc::clone(&grid));
        let constants = Constants::default();
        let time = ModelTime::from_config(config)?;
        let ctx = InitContext {
            config,
            constants: &constants,
            time: &time,
            grid: &grid,
            input: None,
            bootstrap: true,
        };
        let mut model = MohrCoulomb::new();
        model.init(&ctx, &mut store)?;
        Ok((grid, store, model))
    }

    #[test]
    fn test_effective_pressure_limits() {
        let till = TillProperties::default();
        let po: f64 = 1e7;
        // saturated till carries delta P_o
        assert_relative_eq!(till.effective_pressure(po, 2.0), 0.02 * po);
        assert_relative_eq!(till.effective_pressure(po, 5.0), 0.02 * po);
        // dry till is capped at the overburden
        assert_relative_eq!(till.effective_pressure(po, 0.0), po);
        assert_relative_eq!(till.effective_pressure(po, 1.0), po);
        // nearly saturated till sits between the two
        let wet = till.effective_pressure(po, 1.9);
        assert_relative_eq!(wet, 0.02 * po * 10f64.powf(0.69 / 0.12 * 0.05), max_relative = 1e-12);
        assert!(wet > 0.02 * po && wet < po);
    }

    #[test]
    fn test_phi_round_trip() {
        let till = TillProperties {
            cohesion: 1e3,
            ..Default::default()
        };
        let tauc = till.yield_stress(2e5, 25.0);
        assert_relative_eq!(till.phi_from_tauc(tauc, 2e5), 25.0, max_relative = 1e-12);
    }

    #[test]
    fn test_init_errors() {
        let mut config = Config::defaults();
        config.set_double("hydrology_tillwat_max", 0.0).unwrap();
        assert!(init(&config).is_err());

        let mut config = Config::defaults();
        config.set_flag("tauc_add_transportable_water", true).unwrap();
        assert!(init(&config).is_err());
        config.set_string("hydrology_model", "routing").unwrap();
        assert!(init(&config).is_ok());

        let mut config = Config::defaults();
        config.set_flag("topg_to_phi", true).unwrap();
        config.set_double("topg_to_phi_phi_min", 20.0).unwrap();
        assert!(init(&config).is_err());
    }

    #[test]
    fn test_yield_stress_by_cell_type() {
        let mut config = Config::defaults();
        config.set_flag("tauc_slippery_grounding_lines", true).unwrap();
        let (grid, mut store, mut model) = init(&config).unwrap();
        let c = Constants::default();
        let (thk, mask, bed, tillwat) = (
            store.id(Var::Thickness).unwrap(),
            store.id(Var::Mask).unwrap(),
            store.id(Var::Bed).unwrap(),
            store.id(Var::TillWater).unwrap(),
        );
        store.access_mut(thk).unwrap().fill(1000.0);
        store.access_mut(bed).unwrap().fill(-100.0);
        store.access_mut(tillwat).unwrap().fill(1.0);
        {
            let mut m = store.access_mut(mask).unwrap();
            for (i, j) in grid.points() {
                let t = match i {
                    0 => CellType::IceFreeLand,
                    10 => CellType::IceFreeOcean,
                    _ => CellType::Grounded,
                };
                m.set(i, j, t.value());
            }
        }
        model.update(0.0, 1.0, 0.0, &mut store).unwrap();

        let till = *model.till();
        let tauc = store.access(store.id(Var::YieldStress).unwrap()).unwrap();
        assert_eq!(tauc.get(0, 5), 1e6);
        assert_eq!(tauc.get(10, 5), 0.0);
        let po = c.overburden(1000.0);
        let tan30 = 30f64.to_radians().tan();
        assert_relative_eq!(tauc.get(5, 5), till.effective_pressure(po, 1.0) * tan30, max_relative = 1e-12);
        // next to the ocean the till is saturated
        assert_relative_eq!(tauc.get(9, 5), 0.02 * po * tan30, max_relative = 1e-12);
    }
}
