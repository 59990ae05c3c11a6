//! Surface models that need no atmosphere.
//!
//! Every surface model rewrites both of its outputs on each `update`, so
//! modifiers can apply offsets after the inner model without drift.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::components::{Component, InitContext, SurfaceModel};
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::io::read_field;
use crate::types::{FieldId, SECONDS_PER_YEAR};

const OUTPUTS: [&str; 2] = ["climatic_mass_balance", "ice_surface_temp"];

/// Register the two surface outputs.
pub(crate) fn ensure_outputs(store: &mut FieldStore) -> Result<[FieldId; 2]> {
    Ok([store.ensure(Var::MassBalance)?, store.ensure(Var::SurfaceTemp)?])
}

/// Fill both outputs from per-cell functions of `(x, y)`.
fn write_outputs(
    store: &mut FieldStore,
    ids: [FieldId; 2],
    smb: impl Fn(f64, f64) -> f64,
    temp: impl Fn(f64, f64) -> f64,
) -> Result<()> {
    let grid = std::sync::Arc::clone(store.grid());
    let ([mut m, mut t], _) = store.split_mut(ids)?;
    for (i, j) in grid.points() {
        let (x, y) = (grid.x(i), grid.y(j));
        m.set(i, j, smb(x, y));
        t.set(i, j, temp(x, y));
    }
    Ok(())
}

fn unbound(name: &str) -> IceError {
    IceError::Lifecycle {
        component: name.to_string(),
        state: "uninitialized".into(),
    }
}

// =============================================================================
// Given
// =============================================================================

/// Mass balance and temperature read once from the input file.
#[derive(Debug, Default)]
pub struct GivenSurface {
    ids: Option<[FieldId; 2]>,
    smb: Vec<f64>,
    temp: Vec<f64>,
}

impl GivenSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for GivenSurface {
    fn name(&self) -> &str {
        "given"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let ids = ensure_outputs(store)?;
        let defaults = [
            ctx.config.get_double("bootstrapping_climatic_mass_balance_value_no_var")? / SECONDS_PER_YEAR,
            ctx.config.get_double("bootstrapping_ice_surface_temp_value_no_var")?,
        ];
        for (id, default) in ids.into_iter().zip(defaults) {
            let found = match ctx.input {
                Some(ds) => read_field(store, id, ds, "input")?,
                None => false,
            };
            if !found {
                tracing::info!(
                    field = %store.field(id)?.name(),
                    default,
                    "surface field absent from input; using default"
                );
                store.access_mut(id)?.fill(default);
            }
        }
        self.smb = store.snapshot(ids[0])?;
        self.temp = store.snapshot(ids[1])?;
        self.ids = Some(ids);
        Ok(())
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        OUTPUTS.to_vec()
    }
}

impl SurfaceModel for GivenSurface {
    fn update(&mut self, _t: f64, _dt: f64, store: &mut FieldStore) -> Result<()> {
        let [m, t] = self.ids.ok_or_else(|| unbound("given"))?;
        store.restore(m, &self.smb)?;
        store.restore(t, &self.temp)?;
        Ok(())
    }
}

// =============================================================================
// Constant
// =============================================================================

/// Uniform mass balance and temperature.
#[derive(Debug)]
pub struct ConstantSurface {
    ids: Option<[FieldId; 2]>,
    /// m s-1 ice equivalent
    smb: f64,
    temp: f64,
}

impl ConstantSurface {
    pub fn new(smb: f64, temp: f64) -> Self {
        Self { ids: None, smb, temp }
    }
}

impl Default for ConstantSurface {
    fn default() -> Self {
        Self::new(0.0, 248.15)
    }
}

impl Component for ConstantSurface {
    fn name(&self) -> &str {
        "constant"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.smb = ctx.config.get_per_year_as_per_second("surface_constant_mass_balance")?;
        self.temp = ctx.config.get_double("surface_constant_temperature")?;
        self.ids = Some(ensure_outputs(store)?);
        Ok(())
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        OUTPUTS.to_vec()
    }
}

impl SurfaceModel for ConstantSurface {
    fn update(&mut self, _t: f64, _dt: f64, store: &mut FieldStore) -> Result<()> {
        let ids = self.ids.ok_or_else(|| unbound("constant"))?;
        let (smb, temp) = (self.smb, self.temp);
        write_outputs(store, ids, |_, _| smb, |_, _| temp)
    }
}

// =============================================================================
// EISMINT II
// =============================================================================

/// Radially symmetric climate of the EISMINT II experiments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Eismint2Climate {
    /// Maximum accumulation, m s-1
    pub m_max: f64,
    /// Distance to the equilibrium line, m
    pub r_el: f64,
    /// Accumulation gradient, s-1
    pub s_b: f64,
    /// Minimum surface temperature, K
    pub t_min: f64,
    /// Temperature gradient, K m-1
    pub s_t: f64,
    /// Center of the pattern
    pub center: (f64, f64),
}

impl Eismint2Climate {
    /// Parameters of experiment `A`..`F`.
    pub fn experiment(letter: char) -> Result<Self> {
        let mut c = Self {
            m_max: 0.5 / SECONDS_PER_YEAR,
            r_el: 450e3,
            s_b: 1e-2 * 1e-3 / SECONDS_PER_YEAR,
            t_min: 238.15,
            s_t: 1.67e-2 * 1e-3,
            center: (0.0, 0.0),
        };
        match letter.to_ascii_uppercase() {
            'A' => {}
            'B' => c.t_min = 243.15,
            'C' => {
                c.m_max = 0.25 / SECONDS_PER_YEAR;
                c.r_el = 425e3;
            }
            'D' => c.r_el = 425e3,
            'E' => c.center = (100e3, 100e3),
            'F' => c.t_min = 223.15,
            other => {
                return Err(IceError::config(format!("unknown EISMINT II experiment '{}'", other)));
            }
        }
        Ok(c)
    }

    pub fn radius(&self, x: f64, y: f64) -> f64 {
        (x - self.center.0).hypot(y - self.center.1)
    }

    pub fn mass_balance(&self, x: f64, y: f64) -> f64 {
        self.m_max.min(self.s_b * (self.r_el - self.radius(x, y)))
    }

    pub fn temperature(&self, x: f64, y: f64) -> f64 {
        self.t_min + self.s_t * self.radius(x, y)
    }
}

/// EISMINT II surface.
#[derive(Debug)]
pub struct Eismint2Surface {
    ids: Option<[FieldId; 2]>,
    climate: Option<Eismint2Climate>,
}

impl Eismint2Surface {
    pub fn new() -> Self {
        Self { ids: None, climate: None }
    }
}

impl Default for Eismint2Surface {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Eismint2Surface {
    fn name(&self) -> &str {
        "eismint2"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let letter = ctx.config.get_string("eismint2_experiment")?;
        let letter = letter
            .chars()
            .next()
            .ok_or_else(|| IceError::config("eismint2_experiment is empty"))?;
        let climate = Eismint2Climate::experiment(letter)?;
        tracing::info!(experiment = %letter, "EISMINT II climate");
        self.climate = Some(climate);
        self.ids = Some(ensure_outputs(store)?);
        Ok(())
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        OUTPUTS.to_vec()
    }
}

impl SurfaceModel for Eismint2Surface {
    fn update(&mut self, _t: f64, _dt: f64, store: &mut FieldStore) -> Result<()> {
        let (ids, c) = self.ids.zip(self.climate).ok_or_else(|| unbound("eismint2"))?;
        write_outputs(store, ids, |x, y| c.mass_balance(x, y), |x, y| c.temperature(x, y))
    }
}

// =============================================================================
// Verification test A
// =============================================================================

/// Climate of the flat-bed isothermal dome: accumulation `M0` inside the
/// margin radius `L`, none outside.
#[derive(Debug)]
pub struct VerificationASurface {
    ids: Option<[FieldId; 2]>,
    pub m0: f64,
    pub margin: f64,
    pub temp: f64,
}

impl VerificationASurface {
    pub fn new() -> Self {
        Self {
            ids: None,
            m0: 0.3 / SECONDS_PER_YEAR,
            margin: 750e3,
            temp: 223.15,
        }
    }

    pub fn mass_balance(&self, x: f64, y: f64) -> f64 {
        if x.hypot(y) <= self.margin { self.m0 } else { 0.0 }
    }
}

impl Default for VerificationASurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for VerificationASurface {
    fn name(&self) -> &str {
        "verification_a"
    }

    fn init(&mut self, _ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.ids = Some(ensure_outputs(store)?);
        Ok(())
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        OUTPUTS.to_vec()
    }
}

impl SurfaceModel for VerificationASurface {
    fn update(&mut self, _t: f64, _dt: f64, store: &mut FieldStore) -> Result<()> {
        let ids = self.ids.ok_or_else(|| unbound("verification_a"))?;
        let temp = self.temp;
        write_outputs(store, ids, |x, y| self.mass_balance(x, y), |_, _| temp)
    }
}

// =============================================================================
// Stochastic
// =============================================================================

/// Domain-uniform mass balance redrawn on every update from a seeded generator.
///
/// Every rank holds a generator with the same seed and draws once per
/// update, so all ranks see the same value.
#[derive(Debug)]
pub struct StochasticSurface {
    ids: Option<[FieldId; 2]>,
    rng: StdRng,
    mean: f64,
    amplitude: f64,
    temp: f64,
    current: f64,
}

impl StochasticSurface {
    pub fn new(seed: u64) -> Self {
        Self {
            ids: None,
            rng: StdRng::seed_from_u64(seed),
            mean: 0.0,
            amplitude: 1.0 / SECONDS_PER_YEAR,
            temp: 248.15,
            current: 0.0,
        }
    }

    /// Mass balance used in the last update, m s-1.
    pub fn current(&self) -> f64 {
        self.current
    }
}

impl Component for StochasticSurface {
    fn name(&self) -> &str {
        "stochastic"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let seed = ctx.config.get_integer("surface_stochastic_seed")?;
        self.rng = StdRng::seed_from_u64(seed as u64);
        self.mean = ctx.config.get_per_year_as_per_second("surface_stochastic_mean")?;
        self.amplitude = ctx.config.get_per_year_as_per_second("surface_stochastic_amplitude")?.abs();
        self.temp = ctx.config.get_double("surface_stochastic_temperature")?;
        self.ids = Some(ensure_outputs(store)?);
        Ok(())
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        OUTPUTS.to_vec()
    }
}

impl SurfaceModel for StochasticSurface {
    fn update(&mut self, _t: f64, _dt: f64, store: &mut FieldStore) -> Result<()> {
        let ids = self.ids.ok_or_else(|| unbound("stochastic"))?;
        self.current = if self.amplitude > 0.0 {
            self.rng.gen_range(self.mean - self.amplitude..=self.mean + self.amplitude)
        } else {
            self.mean
        };
        let (smb, temp) = (self.current, self.temp);
        write_outputs(store, ids, |_, _| smb, |_, _| temp)
    }
}

#[cfg(test)]
pub(crate) use crate::grid::test_grid;
