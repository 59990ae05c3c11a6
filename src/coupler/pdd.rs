//! Positive-degree-day surface mass balance.
//!
//! The expected number of positive degree days over a step follows
//! Calov and Greve (2005): daily temperatures are normally distributed
//! about the atmosphere's temperature cycle with standard deviation
//! `sigma`, and the expectation
//!
//! ```text
//! PDD(T) = sigma / sqrt(2 pi) exp(-Z^2) + T / 2 erfc(-Z),  Z = T / (sqrt(2) sigma)
//! ```
//!
//! is integrated in time with Simpson's rule. Snow accumulates from
//! precipitation below the rain/snow transition; degree days melt snow
//! first, a fraction of the melted snow refreezes, and remaining degree
//! days melt ice.

use std::sync::Arc;

use crate::components::{AtmosphereModel, Component, InitContext, MaxTimestep, SurfaceModel};
use crate::error::{IceError, Result};
use crate::fields::FieldStore;
use crate::grid::Grid;
use crate::types::{FieldId, SECONDS_PER_DAY, SECONDS_PER_YEAR};

use super::surface::ensure_outputs;

/// Complementary error function, absolute error below 1.2e-7.
///
/// Chebyshev fit of Press et al., *Numerical Recipes*, section 6.2.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398 + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277))))))));
    let r = t * poly.exp();
    if x >= 0.0 { r } else { 2.0 - r }
}

/// Degree-day parameters, all lengths ice equivalent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DegreeDayParameters {
    /// m K-1 day-1
    pub factor_snow: f64,
    /// m K-1 day-1
    pub factor_ice: f64,
    pub refreeze_fraction: f64,
    /// K
    pub std_dev: f64,
    /// K
    pub threshold: f64,
    pub max_evals_per_year: usize,
    /// Below this all precipitation is snow, K
    pub all_snow: f64,
    /// Above this all precipitation is rain, K
    pub all_rain: f64,
    pub precip_as_snow: bool,
}

impl Default for DegreeDayParameters {
    fn default() -> Self {
        let we_to_ie = 1000.0 / 910.0;
        Self {
            factor_snow: 0.003 * we_to_ie,
            factor_ice: 0.008 * we_to_ie,
            refreeze_fraction: 0.6,
            std_dev: 5.0,
            threshold: 273.15,
            max_evals_per_year: 52,
            all_snow: 273.15,
            all_rain: 275.15,
            precip_as_snow: false,
        }
    }
}

/// Result of melting over one step, m ice equivalent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DegreeDayBudget {
    pub accumulation: f64,
    pub melt: f64,
    pub runoff: f64,
    pub smb: f64,
    /// Snow left at the end of the step
    pub snow_depth: f64,
}

/// The degree-day scheme on its own, without fields.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DegreeDayModel {
    pub params: DegreeDayParameters,
}

impl DegreeDayModel {
    pub fn new(params: DegreeDayParameters) -> Self {
        Self { params }
    }

    /// Number of temperature samples over a step of `dt` seconds, and
    /// their spacing.
    pub fn samples(&self, dt: f64) -> (usize, f64) {
        let per_year = self.params.max_evals_per_year.max(2) as f64;
        let n = ((per_year - 1.0) * dt / SECONDS_PER_YEAR + 1.0).ceil() as usize;
        let n = n.max(3);
        (n, dt / (n - 1) as f64)
    }

    /// Expected positive degree days per day at mean temperature `temp`.
    pub fn integrand(&self, temp: f64) -> f64 {
        let sigma = self.params.std_dev;
        let t = temp - self.params.threshold;
        if sigma <= 0.0 {
            return t.max(0.0);
        }
        let z = t / (std::f64::consts::SQRT_2 * sigma);
        sigma / (2.0 * std::f64::consts::PI).sqrt() * (-z * z).exp() + 0.5 * t * erfc(-z)
    }

    /// Positive degree days (K day) over samples spaced `spacing` seconds.
    ///
    /// Simpson's rule on the largest odd-length prefix; a trailing even
    /// interval uses the trapezoid rule.
    pub fn pdd_sum(&self, temps: &[f64], spacing: f64) -> f64 {
        let n = temps.len();
        if n < 2 {
            return 0.0;
        }
        let h = spacing / SECONDS_PER_DAY;
        let n_simpson = if n % 2 == 1 { n } else { n - 1 };
        let mut sum = 0.0;
        if n_simpson >= 3 {
            for (m, &temp) in temps[..n_simpson].iter().enumerate() {
                let coeff = if m == 0 || m == n_simpson - 1 {
                    1.0
                } else if m % 2 == 1 {
                    4.0
                } else {
                    2.0
                };
                sum += coeff * self.integrand(temp);
            }
            sum *= h / 3.0;
        }
        if n > n_simpson {
            sum += 0.5 * h * (self.integrand(temps[n - 2]) + self.integrand(temps[n - 1]));
        }
        sum
    }

    /// Fraction of precipitation falling as snow at temperature `temp`.
    pub fn snow_fraction(&self, temp: f64) -> f64 {
        let p = &self.params;
        if p.precip_as_snow || temp <= p.all_snow {
            1.0
        } else if temp >= p.all_rain {
            0.0
        } else {
            (p.all_rain - temp) / (p.all_rain - p.all_snow)
        }
    }

    /// Snow accumulated from a precipitation rate over the sampled step.
    pub fn accumulation(&self, precipitation: f64, temps: &[f64], spacing: f64) -> f64 {
        temps
            .windows(2)
            .map(|w| precipitation * spacing * self.snow_fraction(0.5 * (w[0] + w[1])))
            .sum()
    }

    /// Melt, refreeze, and runoff given degree days and accumulation.
    pub fn budget(&self, pdd: f64, accumulation: f64, snow_depth: f64) -> DegreeDayBudget {
        let p = &self.params;
        let mut snow = snow_depth + accumulation;
        if pdd <= 0.0 {
            return DegreeDayBudget {
                accumulation,
                melt: 0.0,
                runoff: 0.0,
                smb: accumulation,
                snow_depth: snow,
            };
        }
        let max_snow_melted = pdd * p.factor_snow;
        let (snow_melted, ice_melted) = if max_snow_melted <= snow {
            (max_snow_melted, 0.0)
        } else {
            let excess = pdd - snow / p.factor_snow;
            (snow, excess * p.factor_ice)
        };
        snow -= snow_melted;
        let melt = snow_melted + ice_melted;
        let refreeze = p.refreeze_fraction * snow_melted;
        let runoff = melt - refreeze;
        DegreeDayBudget {
            accumulation,
            melt,
            runoff,
            smb: accumulation - runoff,
            snow_depth: snow.max(0.0),
        }
    }
}

/// Degree-day surface model over an atmosphere model.
pub struct PddSurface {
    atmosphere: Box<dyn AtmosphereModel>,
    model: DegreeDayModel,
    grid: Option<Arc<Grid>>,
    ids: Option<[FieldId; 2]>,
    /// Snow depth per owned cell, m ice equivalent
    snow_depth: Vec<f64>,
}

impl PddSurface {
    pub fn new(atmosphere: Box<dyn AtmosphereModel>) -> Self {
        Self {
            atmosphere,
            model: DegreeDayModel::default(),
            grid: None,
            ids: None,
            snow_depth: Vec::new(),
        }
    }

    pub fn model(&self) -> &DegreeDayModel {
        &self.model
    }

    pub fn snow_depth(&self) -> &[f64] {
        &self.snow_depth
    }
}

impl std::fmt::Debug for PddSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PddSurface")
            .field("atmosphere", &self.atmosphere.name())
            .field("model", &self.model)
            .finish()
    }
}

impl Component for PddSurface {
    fn name(&self) -> &str {
        "pdd"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.atmosphere.init(ctx, store)?;
        let c = ctx.config;
        let we_to_ie = ctx.constants.fresh_water_density / ctx.constants.ice_density;
        self.model = DegreeDayModel::new(DegreeDayParameters {
            factor_snow: c.get_double("pdd_factor_snow")? * we_to_ie,
            factor_ice: c.get_double("pdd_factor_ice")? * we_to_ie,
            refreeze_fraction: c.get_double("pdd_refreeze")?,
            std_dev: c.get_double("pdd_std_dev")?,
            threshold: c.get_double("pdd_positive_threshold_temp")?,
            max_evals_per_year: c.get_usize("pdd_max_evals_per_year")?,
            all_snow: c.get_double("air_temp_all_precip_as_snow")?,
            all_rain: c.get_double("air_temp_all_precip_as_rain")?,
            precip_as_snow: c.get_flag("interpret_precip_as_snow")?,
        });
        if self.model.params.factor_snow <= 0.0 || self.model.params.factor_ice <= 0.0 {
            return Err(IceError::config("degree-day factors must be positive"));
        }
        if !self.model.params.precip_as_snow && self.model.params.all_rain <= self.model.params.all_snow {
            return Err(IceError::config(
                "air_temp_all_precip_as_rain must exceed air_temp_all_precip_as_snow",
            ));
        }
        self.snow_depth = vec![0.0; ctx.grid.points().count()];
        self.grid = Some(Arc::clone(ctx.grid));
        self.ids = Some(ensure_outputs(store)?);
        tracing::info!(atmosphere = self.atmosphere.name(), "degree-day surface model");
        Ok(())
    }

    fn max_timestep(&self, t: f64) -> MaxTimestep {
        self.atmosphere.max_timestep(t)
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["climatic_mass_balance", "ice_surface_temp"]
    }
}

impl SurfaceModel for PddSurface {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<()> {
        let (grid, ids) = self
            .grid
            .clone()
            .zip(self.ids)
            .ok_or_else(|| IceError::Lifecycle {
                component: "pdd".into(),
                state: "uninitialized".into(),
            })?;
        self.atmosphere.update(t, dt, store)?;

        let (n, spacing) = self.model.samples(dt.max(0.0));
        let times: Vec<f64> = (0..n).map(|k| t + k as f64 * spacing).collect();
        let mut temps = vec![0.0; n];

        let ([mut smb, mut ts], _) = store.split_mut(ids)?;
        for (cell, (i, j)) in grid.points().enumerate() {
            self.atmosphere.temp_time_series(i, j, &times, &mut temps);
            let precipitation = self.atmosphere.mean_precipitation(i, j);
            ts.set(i, j, self.atmosphere.mean_annual_temp(i, j));
            if dt <= 0.0 {
                let rate = precipitation * self.model.snow_fraction(self.atmosphere.mean_annual_temp(i, j));
                smb.set(i, j, rate);
                continue;
            }
            let pdd = self.model.pdd_sum(&temps, spacing);
            let accumulation = self.model.accumulation(precipitation, &temps, spacing);
            let budget = self.model.budget(pdd, accumulation, self.snow_depth[cell]);
            self.snow_depth[cell] = budget.snow_depth;
            smb.set(i, j, budget.smb / dt);
        }
        Ok(())
    }
}
