//! Bed deformation under the ice load.
//!
//! Both models compare the current load with the load at the start of
//! the run (`topg_initial`, `thk_initial`):
//!
//! ```text
//! b_eq = b_0 - (rho_i / rho_m) (H - H_0)
//! ```
//!
//! | `bed_deformation_model` | Model |
//! |---|---|
//! | `none` | the bed does not move |
//! | `iso` | [`PointwiseIsostasy`]: `b = b_eq` |
//! | `lc` | [`LocalRelaxation`]: `db/dt = -(b - b_eq) / tau` |
//!
//! The bed is updated once every `bed_def_interval_years`, over the
//! whole time elapsed since the previous update.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::beddef::relax;
//!
//! // one relaxation time closes 1 - 1/e of the gap
//! let b = relax(-100.0, 0.0, 3000.0, 3000.0);
//! assert!((b - (-100.0 / std::f64::consts::E)).abs() < 1e-9);
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::components::{BedDeformation, Component, InitContext};
use crate::config::Config;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::geometry::cell_type;
use crate::grid::Grid;
use crate::io::read_field;
use crate::types::FieldId;

/// Bed elevation after relaxing from `b` toward `b_eq` for `dt` with
/// relaxation time `tau`.
pub fn relax(b: f64, b_eq: f64, dt: f64, tau: f64) -> f64 {
    b_eq + (b - b_eq) * (-dt / tau).exp()
}

#[derive(Clone, Copy, Debug)]
struct BedFields {
    topg: FieldId,
    thk: FieldId,
    mask: FieldId,
    uplift: FieldId,
    topg_initial: FieldId,
    thk_initial: FieldId,
}

/// State shared by the bed deformation models.
#[derive(Debug, Default)]
struct BedState {
    /// rho_i / rho_m
    density_ratio: f64,
    /// s
    interval: f64,
    last_update: Option<f64>,
    grid: Option<Arc<Grid>>,
    fields: Option<BedFields>,
}

impl BedState {
    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let config = ctx.config;
        let rho_m = config.get_double("mantle_density")?;
        if rho_m <= 0.0 {
            return Err(IceError::config(format!("mantle_density = {} must be positive", rho_m)));
        }
        self.density_ratio = ctx.constants.ice_density / rho_m;
        self.interval = config.get_years_as_seconds("bed_def_interval_years")?;
        let f = BedFields {
            topg: store.ensure(Var::Bed)?,
            thk: store.ensure(Var::Thickness)?,
            mask: store.ensure(Var::Mask)?,
            uplift: store.ensure(Var::BedUplift)?,
            topg_initial: store.ensure(Var::BedInitial)?,
            thk_initial: store.ensure(Var::ThicknessInitial)?,
        };
        for (initial, current) in [(f.topg_initial, f.topg), (f.thk_initial, f.thk)] {
            let loaded = match ctx.input {
                Some(ds) if !ctx.bootstrap => read_field(store, initial, ds, "input")?,
                _ => false,
            };
            if !loaded {
                let ([mut dst], view) = store.split_mut([initial])?;
                let src = view.access(current)?;
                for (i, j) in ctx.grid.points() {
                    dst.set(i, j, src.get(i, j));
                }
            }
        }
        self.last_update = Some(ctx.time.start());
        self.grid = Some(Arc::clone(ctx.grid));
        self.fields = Some(f);
        Ok(())
    }

    /// Elapsed time to apply if an update is due at `t + dt`.
    fn due(&mut self, t: f64, dt: f64) -> Option<f64> {
        let last = self.last_update.unwrap_or(t);
        let end = t + dt;
        if end - last >= self.interval - 1e-9 && end > last {
            self.last_update = Some(end);
            Some(end - last)
        } else {
            None
        }
    }

    /// Apply `new_bed(b, b_eq)` at every owned cell and record the uplift rate.
    fn apply(&self, elapsed: f64, store: &mut FieldStore, new_bed: impl Fn(f64, f64) -> f64) -> Result<()> {
        let (grid, f) = self.grid.clone().zip(self.fields).ok_or_else(|| IceError::Lifecycle {
            component: "bed deformation".into(),
            state: "uninitialized".into(),
        })?;
        {
            let ([mut topg, mut uplift], view) = store.split_mut([f.topg, f.uplift])?;
            let (thk, thk0, topg0, mask) = (
                view.access(f.thk)?,
                view.access(f.thk_initial)?,
                view.access(f.topg_initial)?,
                view.access(f.mask)?,
            );
            for (i, j) in grid.points() {
                // floating ice is carried by the ocean
                let load = |h: f64| if cell_type(mask.get(i, j)).is_ocean() { 0.0 } else { h };
                let b_eq = topg0.get(i, j) - self.density_ratio * (load(thk.get(i, j)) - thk0.get(i, j));
                let old = topg.get(i, j);
                let new = new_bed(old, b_eq);
                topg.set(i, j, new);
                uplift.set(i, j, (new - old) / elapsed);
            }
        }
        store.update_ghosts(f.topg)
    }
}

// =============================================================================
// Models
// =============================================================================

/// The bed is always in isostatic equilibrium with the load.
#[derive(Debug, Default)]
pub struct PointwiseIsostasy {
    state: BedState,
}

impl PointwiseIsostasy {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The bed relaxes toward isostatic equilibrium.
#[derive(Debug, Default)]
pub struct LocalRelaxation {
    /// s
    tau: f64,
    state: BedState,
}

impl LocalRelaxation {
    pub fn new() -> Self {
        Self::default()
    }
}

macro_rules! impl_bed_component {
    ($ty:ty, $name:literal) => {
        impl Component for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
                self.init_model(ctx)?;
                self.state.init(ctx, store)
            }

            fn declare_inputs(&self) -> Vec<&'static str> {
                vec!["topg", "thk", "mask", "topg_initial", "thk_initial"]
            }

            fn declare_outputs(&self) -> Vec<&'static str> {
                vec!["topg", "dbdt"]
            }
        }
    };
}

impl PointwiseIsostasy {
    fn init_model(&mut self, _ctx: &InitContext<'_>) -> Result<()> {
        Ok(())
    }
}

impl LocalRelaxation {
    fn init_model(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        self.tau = ctx.config.get_years_as_seconds("bed_def_relaxation_time_years")?;
        if self.tau <= 0.0 {
            return Err(IceError::config("bed_def_relaxation_time_years must be positive"));
        }
        Ok(())
    }
}

impl_bed_component!(PointwiseIsostasy, "iso");
impl_bed_component!(LocalRelaxation, "lc");

impl BedDeformation for PointwiseIsostasy {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<bool> {
        let Some(elapsed) = self.state.due(t, dt) else {
            return Ok(false);
        };
        self.state.apply(elapsed, store, |_, b_eq| b_eq)?;
        debug!(elapsed, "pointwise isostasy");
        Ok(true)
    }
}

impl BedDeformation for LocalRelaxation {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<bool> {
        let Some(elapsed) = self.state.due(t, dt) else {
            return Ok(false);
        };
        let tau = self.tau;
        self.state.apply(elapsed, store, |b, b_eq| relax(b, b_eq, elapsed, tau))?;
        debug!(elapsed, "local relaxation");
        Ok(true)
    }
}

/// Build the model named by `bed_deformation_model`; `None` for `none`.
pub fn bed_deformation_from_config(config: &Config) -> Result<Option<Box<dyn BedDeformation>>> {
    match config.get_string("bed_deformation_model")?.as_str() {
        "none" => Ok(None),
        "iso" => Ok(Some(Box::new(PointwiseIsostasy::new()))),
        "lc" => Ok(Some(Box::new(LocalRelaxation::new()))),
        other => Err(IceError::config(format!("unknown bed deformation model '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Constants;
    use crate::grid::test_grid;
    use crate::time::ModelTime;
    use crate::types::SECONDS_PER_YEAR;
    use approx::assert_relative_eq;

    fn setup(model: &mut dyn BedDeformation, config: &Config) -> FieldStore {
        let grid = test_grid();
        let mut store = FieldStore::new(Arc::clone(&grid));
        let constants = Constants::default();
        let time = ModelTime::from_config(config).unwrap();
        let ctx = InitContext {
            config,
            constants: &constants,
            time: &time,
            grid: &grid,
            input: None,
            bootstrap: true,
        };
        let bed = store.ensure(Var::Bed).unwrap();
        store.access_mut(bed).unwrap().fill(100.0);
        model.init(&ctx, &mut store).unwrap();
        store
    }

    #[test]
    fn test_isostasy_at_interval() {
        let config = Config::defaults();
        let mut model = PointwiseIsostasy::new();
        let mut store = setup(&mut model, &config);
        let thk = store.id(Var::Thickness).unwrap();
        store.access_mut(thk).unwrap().fill(1000.0);

        let year = SECONDS_PER_YEAR;
        assert!(!model.update(0.0, 5.0 * year, &mut store).unwrap());
        assert!(model.update(5.0 * year, 5.0 * year, &mut store).unwrap());
        let topg = store.access(store.id(Var::Bed).unwrap()).unwrap();
        assert_relative_eq!(topg.get(3, 3), 100.0 - 910.0 / 3300.0 * 1000.0, max_relative = 1e-12);
        let uplift = store.access(store.id(Var::BedUplift).unwrap()).unwrap();
        assert_relative_eq!(uplift.get(3, 3), -910.0 / 3300.0 * 1000.0 / (10.0 * year), max_relative = 1e-9);
    }

    #[test]
    fn test_relaxation_approaches_equilibrium() {
        let mut config = Config::defaults();
        config.set_double("bed_def_interval_years", 0.0).unwrap();
        let mut model = LocalRelaxation::new();
        let mut store = setup(&mut model, &config);
        let thk = store.id(Var::Thickness).unwrap();
        store.access_mut(thk).unwrap().fill(1000.0);

        let tau = 3000.0 * SECONDS_PER_YEAR;
        assert!(model.update(0.0, tau, &mut store).unwrap());
        let eq = 100.0 - 910.0 / 3300.0 * 1000.0;
        let b = store.access(store.id(Var::Bed).unwrap()).unwrap().get(0, 0);
        assert_relative_eq!(b, eq + (100.0 - eq) / std::f64::consts::E, max_relative = 1e-9);
    }

    #[test]
    fn test_factory() {
        let mut config = Config::defaults();
        assert!(bed_deformation_from_config(&config).unwrap().is_none());
        config.set_string("bed_deformation_model", "lc").unwrap();
        assert_eq!(bed_deformation_from_config(&config).unwrap().unwrap().name(), "lc");
    }
}
