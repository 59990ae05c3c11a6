//! Atmosphere models feeding the degree-day surface model.

use crate::components::{AtmosphereModel, Component, InitContext};
use crate::error::Result;
use crate::fields::FieldStore;
use crate::types::{SECONDS_PER_DAY, SECONDS_PER_YEAR};

/// Cosine cycle between the mean annual and the July air temperature.
///
/// ```text
/// T(t) = T_ma + (T_july - T_ma) cos(2 pi (t - t_july) / year)
/// ```
#[derive(Clone, Debug)]
pub struct YearlyCycle {
    /// K
    pub mean_annual: f64,
    /// K
    pub july: f64,
    /// m s-1 ice equivalent
    pub precipitation: f64,
    /// Day of the year of the warmest temperature
    pub july_day: f64,
}

impl YearlyCycle {
    pub fn new(mean_annual: f64, july: f64, precipitation: f64) -> Self {
        Self {
            mean_annual,
            july,
            precipitation,
            july_day: 196.0,
        }
    }

    pub fn with_july_day(mut self, day: f64) -> Self {
        self.july_day = day;
        self
    }

    /// Air temperature at time `t`, K.
    pub fn temperature_at(&self, t: f64) -> f64 {
        let phase = 2.0 * std::f64::consts::PI * (t - self.july_day * SECONDS_PER_DAY) / SECONDS_PER_YEAR;
        self.mean_annual + (self.july - self.mean_annual) * phase.cos()
    }
}

impl Default for YearlyCycle {
    fn default() -> Self {
        Self::new(253.15, 268.15, 0.5 / SECONDS_PER_YEAR)
    }
}

impl Component for YearlyCycle {
    fn name(&self) -> &str {
        "yearly_cycle"
    }

    fn init(&mut self, ctx: &InitContext<'_>, _store: &mut FieldStore) -> Result<()> {
        self.mean_annual = ctx.config.get_double("atmosphere_mean_annual_temp")?;
        self.july = ctx.config.get_double("atmosphere_july_temp")?;
        self.precipitation = ctx.config.get_per_year_as_per_second("atmosphere_precipitation")?;
        self.july_day = ctx.config.get_double("snow_temp_july_day")?;
        tracing::debug!(
            mean_annual = self.mean_annual,
            july = self.july,
            "yearly cycle atmosphere"
        );
        Ok(())
    }
}

impl AtmosphereModel for YearlyCycle {
    fn update(&mut self, _t: f64, _dt: f64, _store: &FieldStore) -> Result<()> {
        Ok(())
    }

    fn mean_annual_temp(&self, _i: isize, _j: isize) -> f64 {
        self.mean_annual
    }

    fn mean_precipitation(&self, _i: isize, _j: isize) -> f64 {
        self.precipitation
    }

    fn temp_time_series(&self, _i: isize, _j: isize, times: &[f64], out: &mut [f64]) {
        for (o, &t) in out.iter_mut().zip(times) {
            *o = self.temperature_at(t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_peak_on_july_day() {
        let a = YearlyCycle::default();
        assert_relative_eq!(a.temperature_at(196.0 * SECONDS_PER_DAY), 268.15, epsilon = 1e-9);
        let half_year_later = 196.0 * SECONDS_PER_DAY + 0.5 * SECONDS_PER_YEAR;
        assert_relative_eq!(a.temperature_at(half_year_later), 238.15, epsilon = 1e-9);
    }

    #[test]
    fn test_series_matches_pointwise() {
        let a = YearlyCycle::default().with_july_day(0.0);
        let times = [0.0, 0.25 * SECONDS_PER_YEAR];
        let mut out = [0.0; 2];
        a.temp_time_series(0, 0, &times, &mut out);
        assert_relative_eq!(out[0], 268.15, epsilon = 1e-9);
        assert_relative_eq!(out[1], 253.15, epsilon = 1e-9);
    }
}
