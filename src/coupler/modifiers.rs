//! Modifiers wrap an inner coupler and adjust its outputs.
//!
//! A modifier owns its inner model, delegates `init` and `update` to it,
//! and then applies its own change. Since inner models rewrite their
//! outputs on every update, offsets never accumulate.

use std::path::Path;
use std::sync::Arc;

use crate::components::{Component, InitContext, MaxTimestep, OceanModel, SurfaceModel};
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::grid::Grid;
use crate::io::{ScalarForcing, read_dataset, read_field, read_forcing_file};
use crate::types::{FieldId, SECONDS_PER_YEAR};

/// Load a scalar offset series named by option `file_option`.
fn load_offsets(ctx: &InitContext<'_>, file_option: &str, period: &str, reference: &str) -> Result<ScalarForcing> {
    let file = ctx.config.get_string(file_option)?;
    if file.is_empty() {
        return Err(IceError::config(format!("{} must name a forcing file", file_option)));
    }
    let path = Path::new(&file);
    let forcing = read_forcing_file(path).map_err(|e| e.into_input(path))?;
    let period = ctx.config.get_years_as_seconds(period)?;
    let reference = ctx.config.get_years_as_seconds(reference)?;
    tracing::info!(file = %file, records = forcing.len(), "scalar forcing");
    Ok(forcing.with_period(period, reference))
}

fn not_ready(name: &str) -> IceError {
    IceError::Lifecycle {
        component: name.to_string(),
        state: "uninitialized".into(),
    }
}

// =============================================================================
// Surface temperature offset
// =============================================================================

/// Adds a scalar offset series to the ice surface temperature.
pub struct DeltaT {
    inner: Box<dyn SurfaceModel>,
    offsets: Option<ScalarForcing>,
    temp: Option<FieldId>,
    current: f64,
}

impl DeltaT {
    pub fn new(inner: Box<dyn SurfaceModel>) -> Self {
        Self {
            inner,
            offsets: None,
            temp: None,
            current: 0.0,
        }
    }

    /// Use `offsets` instead of reading a file at init.
    pub fn with_offsets(mut self, offsets: ScalarForcing) -> Self {
        self.offsets = Some(offsets);
        self
    }

    /// Offset applied in the last update, K.
    pub fn current(&self) -> f64 {
        self.current
    }
}

impl std::fmt::Debug for DeltaT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaT").field("inner", &self.inner.name()).finish()
    }
}

impl Component for DeltaT {
    fn name(&self) -> &str {
        "delta_T"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.inner.init(ctx, store)?;
        if self.offsets.is_none() {
            self.offsets = Some(load_offsets(
                ctx,
                "surface_delta_T_file",
                "surface_delta_T_period",
                "surface_delta_T_reference_year",
            )?);
        }
        self.temp = Some(store.ensure(Var::SurfaceTemp)?);
        Ok(())
    }

    fn max_timestep(&self, t: f64) -> MaxTimestep {
        self.inner.max_timestep(t)
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        self.inner.declare_inputs()
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        self.inner.declare_outputs()
    }
}

impl SurfaceModel for DeltaT {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<()> {
        self.inner.update(t, dt, store)?;
        let (offsets, temp) = self.offsets.as_ref().zip(self.temp).ok_or_else(|| not_ready("delta_T"))?;
        self.current = offsets.average(t, dt);
        let delta = self.current;
        store.access_mut(temp)?.for_each_owned(|_, _, v| v[0] += delta);
        Ok(())
    }
}

// =============================================================================
// Force to thickness
// =============================================================================

/// Nudges the mass balance toward a target thickness:
/// `smb += alpha (H_target - H)`.
pub struct ForceToThickness {
    inner: Box<dyn SurfaceModel>,
    /// s-1
    alpha: f64,
    ice_free_factor: f64,
    ice_free_threshold: f64,
    grid: Option<Arc<Grid>>,
    /// Target thickness of each owned cell, in `Grid::points` order
    target: Vec<f64>,
    ids: Option<(FieldId, FieldId)>,
}

impl ForceToThickness {
    pub fn new(inner: Box<dyn SurfaceModel>) -> Self {
        Self {
            inner,
            alpha: 0.01 / SECONDS_PER_YEAR,
            ice_free_factor: 1.0,
            ice_free_threshold: 1.0,
            grid: None,
            target: Vec::new(),
            ids: None,
        }
    }

    /// Rate at a cell whose target is `target`, s-1.
    pub fn rate(&self, target: f64) -> f64 {
        if target < self.ice_free_threshold {
            self.alpha * self.ice_free_factor
        } else {
            self.alpha
        }
    }
}

impl std::fmt::Debug for ForceToThickness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForceToThickness")
            .field("inner", &self.inner.name())
            .field("alpha", &self.alpha)
            .finish()
    }
}

impl Component for ForceToThickness {
    fn name(&self) -> &str {
        "force_to_thickness"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.inner.init(ctx, store)?;
        self.alpha = ctx.config.get_per_year_as_per_second("force_to_thickness_alpha")?;
        self.ice_free_factor = ctx.config.get_double("force_to_thickness_ice_free_alpha_factor")?;
        self.ice_free_threshold = ctx.config.get_double("force_to_thickness_ice_free_thickness_threshold")?;
        if self.alpha <= 0.0 {
            return Err(IceError::config("force_to_thickness_alpha must be positive"));
        }

        let file = ctx.config.get_string("force_to_thickness_file")?;
        if file.is_empty() {
            return Err(IceError::config("force_to_thickness_file must name a state file"));
        }
        let ds = read_dataset(Path::new(&file))?;
        let mut scratch = FieldStore::new(Arc::clone(ctx.grid));
        let thk = scratch.ensure(Var::Thickness)?;
        if !read_field(&mut scratch, thk, &ds, &file)? {
            return Err(IceError::input(file, "target thickness 'thk' not found"));
        }
        let target = scratch.access(thk)?;
        self.target = ctx.grid.points().map(|(i, j)| target.get(i, j)).collect();
        self.grid = Some(Arc::clone(ctx.grid));
        self.ids = Some((store.ensure(Var::MassBalance)?, store.ensure(Var::Thickness)?));
        tracing::info!(alpha_per_year = self.alpha * SECONDS_PER_YEAR, "forcing toward target thickness");
        Ok(())
    }

    fn max_timestep(&self, t: f64) -> MaxTimestep {
        MaxTimestep::new(2.0 / self.alpha).min(self.inner.max_timestep(t))
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        let mut inputs = self.inner.declare_inputs();
        inputs.push("thk");
        inputs
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        self.inner.declare_outputs()
    }
}

impl SurfaceModel for ForceToThickness {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<()> {
        self.inner.update(t, dt, store)?;
        let (grid, (smb_id, thk)) = self
            .grid
            .clone()
            .zip(self.ids)
            .ok_or_else(|| not_ready("force_to_thickness"))?;
        let ([mut smb], view) = store.split_mut([smb_id])?;
        let h = view.access(thk)?;
        for ((i, j), &target) in grid.points().zip(&self.target) {
            let nudge = self.rate(target) * (target - h.get(i, j));
            smb.set(i, j, smb.get(i, j) + nudge);
        }
        Ok(())
    }
}

// =============================================================================
// Sea level offset
// =============================================================================

/// Adds a scalar offset series to the sea level.
pub struct DeltaSL {
    inner: Box<dyn OceanModel>,
    offsets: Option<ScalarForcing>,
    current: f64,
}

impl DeltaSL {
    pub fn new(inner: Box<dyn OceanModel>) -> Self {
        Self {
            inner,
            offsets: None,
            current: 0.0,
        }
    }

    pub fn with_offsets(mut self, offsets: ScalarForcing) -> Self {
        self.offsets = Some(offsets);
        self
    }
}

impl std::fmt::Debug for DeltaSL {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaSL").field("inner", &self.inner.name()).finish()
    }
}

impl Component for DeltaSL {
    fn name(&self) -> &str {
        "delta_SL"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.inner.init(ctx, store)?;
        if self.offsets.is_none() {
            self.offsets = Some(load_offsets(
                ctx,
                "ocean_delta_SL_file",
                "ocean_delta_SL_period",
                "ocean_delta_SL_reference_year",
            )?);
        }
        if let Some(offsets) = &self.offsets {
            self.current = offsets.value_at(ctx.time.current());
        }
        Ok(())
    }

    fn max_timestep(&self, t: f64) -> MaxTimestep {
        self.inner.max_timestep(t)
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        self.inner.declare_inputs()
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        self.inner.declare_outputs()
    }
}

impl OceanModel for DeltaSL {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<()> {
        self.inner.update(t, dt, store)?;
        let offsets = self.offsets.as_ref().ok_or_else(|| not_ready("delta_SL"))?;
        self.current = offsets.average(t, dt);
        Ok(())
    }

    fn sea_level(&self) -> f64 {
        self.inner.sea_level() + self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Constants};
    use crate::coupler::{ConstantOcean, ConstantSurface};
    use crate::io::{add_fields, grid_dataset, write_dataset};
    use crate::time::ModelTime;
    use approx::assert_relative_eq;

    struct Setup {
        config: Config,
        constants: Constants,
        time: ModelTime,
        grid: Arc<Grid>,
    }

    impl Setup {
        fn new(config: Config) -> Self {
            let time = ModelTime::from_config(&config).unwrap();
            Self {
                config,
                constants: Constants::default(),
                time,
                grid: crate::coupler::surface::test_grid(),
            }
        }

        fn ctx(&self) -> InitContext<'_> {
            InitContext {
                config: &self.config,
                constants: &self.constants,
                time: &self.time,
                grid: &self.grid,
                input: None,
                bootstrap: true,
            }
        }
    }

    fn offsets() -> ScalarForcing {
        ScalarForcing::from_records(&[(0.0, 0.0), (10.0 * SECONDS_PER_YEAR, -10.0)]).unwrap()
    }

    #[test]
    fn test_delta_t_does_not_accumulate() {
        let s = Setup::new(Config::defaults());
        let mut store = FieldStore::new(Arc::clone(&s.grid));
        let mut m = DeltaT::new(Box::new(ConstantSurface::default())).with_offsets(offsets());
        m.init(&s.ctx(), &mut store).unwrap();
        let temp = store.id(Var::SurfaceTemp).unwrap();
        let dt = 2.0 * SECONDS_PER_YEAR;
        m.update(0.0, dt, &mut store).unwrap();
        m.update(2.0 * SECONDS_PER_YEAR, dt, &mut store).unwrap();
        // midpoint of [2, 4] years is 3 years, offset -3 K
        assert_relative_eq!(m.current(), -3.0, epsilon = 1e-12);
        assert_relative_eq!(store.access(temp).unwrap().get(1, 1), 248.15 - 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_delta_t_requires_file() {
        let s = Setup::new(Config::defaults());
        let mut store = FieldStore::new(Arc::clone(&s.grid));
        let mut m = DeltaT::new(Box::new(ConstantSurface::default()));
        assert!(m.init(&s.ctx(), &mut store).is_err());
    }

    #[test]
    fn test_delta_sl_shifts_sea_level() {
        let s = Setup::new(Config::defaults());
        let mut store = FieldStore::new(Arc::clone(&s.grid));
        let mut o = DeltaSL::new(Box::new(ConstantOcean::new())).with_offsets(offsets());
        o.init(&s.ctx(), &mut store).unwrap();
        assert_eq!(o.sea_level(), 0.0);
        o.update(0.0, 10.0 * SECONDS_PER_YEAR, &mut store).unwrap();
        assert_relative_eq!(o.sea_level(), -5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_force_to_thickness_nudges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.bin");

        let mut config = Config::defaults();
        config.set_string("force_to_thickness_file", path.display().to_string()).unwrap();
        let s = Setup::new(config);

        let mut target_store = FieldStore::new(Arc::clone(&s.grid));
        let thk = target_store.ensure(Var::Thickness).unwrap();
        target_store.access_mut(thk).unwrap().fill(1000.0);
        let mut ds = grid_dataset(&s.grid, &s.time, (0.0, 0.0)).unwrap();
        add_fields(&mut ds, &target_store, &[thk]).unwrap();
        write_dataset(&path, &ds).unwrap();

        let mut store = FieldStore::new(Arc::clone(&s.grid));
        let mut m = ForceToThickness::new(Box::new(ConstantSurface::default()));
        m.init(&s.ctx(), &mut store).unwrap();
        let h = store.id(Var::Thickness).unwrap();
        store.access_mut(h).unwrap().fill(900.0);
        m.update(0.0, SECONDS_PER_YEAR, &mut store).unwrap();

        let smb = store.access(store.id(Var::MassBalance).unwrap()).unwrap().get(4, 4);
        assert_relative_eq!(smb * SECONDS_PER_YEAR, 0.01 * 100.0, max_relative = 1e-9);
        assert_relative_eq!(m.max_timestep(0.0).dt, 200.0 * SECONDS_PER_YEAR, max_relative = 1e-12);
    }
}
