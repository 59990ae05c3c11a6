//! Model time, calendars, and the event calendar.
//!
//! Internally time is seconds since the reference date. Only the step
//! executor advances [`ModelTime`].
//!
//! # Example
//!
//! ```
//! use icesheet_rs::time::{Calendar, Date, ModelTime};
//!
//! let mut time = ModelTime::new(Calendar::Day360, Date::ymd(1, 1, 1), 0.0, 10.0 * 3.15569259747e7).unwrap();
//! time.advance(3.15569259747e7);
//! assert!((time.year() - 1.0).abs() < 1e-12);
//! assert!(!time.is_done());
//! ```

mod calendar;
mod events;
mod units;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{IceError, Result};
use crate::types::SECONDS_PER_YEAR;

pub use calendar::{Calendar, Date, seconds_to_years, years_to_seconds};
pub use events::{Channel, EventCalendar, parse_times};
pub use units::TimeUnits;

/// Smallest tolerance when comparing times, seconds.
pub const TIME_EPSILON: f64 = 1e-6;

/// Tolerance relative to the magnitude of the times compared.
pub const RELATIVE_TIME_EPSILON: f64 = 1e-12;

/// Tolerance when comparing times of magnitude `scale` seconds.
///
/// Sums of many non-integer step lengths drift by several ulps, so the
/// tolerance grows with the time axis.
pub fn time_tolerance(scale: f64) -> f64 {
    TIME_EPSILON.max(RELATIVE_TIME_EPSILON * scale.abs())
}

/// Clock of the run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelTime {
    calendar: Calendar,
    reference: Date,
    start: f64,
    end: f64,
    current: f64,
}

impl ModelTime {
    pub fn new(calendar: Calendar, reference: Date, start: f64, end: f64) -> Result<Self> {
        calendar.validate(&reference)?;
        if end < start {
            return Err(IceError::config(format!(
                "run ends ({:.3} years) before it starts ({:.3} years)",
                end / SECONDS_PER_YEAR,
                start / SECONDS_PER_YEAR
            )));
        }
        Ok(Self {
            calendar,
            reference,
            start,
            end,
            current: start,
        })
    }

    /// Build from `calendar`, `reference_date`, `start_year`, `end_year`,
    /// and `run_length_years`. An explicit `end_year` wins over the run length.
    pub fn from_config(config: &Config) -> Result<Self> {
        let calendar: Calendar = config.get_string("calendar")?.parse()?;
        let reference = Date::parse(&config.get_string("reference_date")?)?;
        let start = config.get_years_as_seconds("start_year")?;
        let end = if config.is_set("end_year") {
            config.get_years_as_seconds("end_year")?
        } else {
            start + config.get_years_as_seconds("run_length_years")?
        };
        let units = TimeUnits::parse(&config.get_string("time_units")?)?;
        calendar.validate(&units.reference)?;
        Self::new(calendar, reference, start, end)
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    pub fn reference(&self) -> &Date {
        &self.reference
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Decimal years of the current time.
    pub fn year(&self) -> f64 {
        self.current / SECONDS_PER_YEAR
    }

    pub fn remaining(&self) -> f64 {
        (self.end - self.current).max(0.0)
    }

    /// Tolerance for comparisons on this run's time axis, seconds.
    pub fn tolerance(&self) -> f64 {
        time_tolerance(self.start.abs().max(self.end.abs()))
    }

    pub fn is_done(&self) -> bool {
        self.current >= self.end - self.tolerance()
    }

    /// Move the clock by `dt`, snapping to the end when within tolerance.
    pub fn advance(&mut self, dt: f64) {
        self.current += dt;
        if (self.current - self.end).abs() < self.tolerance() {
            self.current = self.end;
        }
    }

    /// Restart from a saved time; the start moves with it.
    pub fn set_start(&mut self, t: f64) -> Result<()> {
        if t > self.end {
            return Err(IceError::config(format!(
                "saved time {:.3} years is after the end of the run ({:.3} years)",
                t / SECONDS_PER_YEAR,
                self.end / SECONDS_PER_YEAR
            )));
        }
        self.start = t;
        self.current = t;
        Ok(())
    }

    /// Move the end of the run.
    pub fn set_end(&mut self, t: f64) -> Result<()> {
        if t < self.start {
            return Err(IceError::config("run end precedes its start"));
        }
        self.end = t;
        Ok(())
    }

    /// Parse `units` (`"<unit> since <date>"`) and convert `value` to internal seconds.
    pub fn cf_units_to_internal(&self, value: f64, units: &str) -> Result<f64> {
        TimeUnits::parse(units)?.to_internal(value, self.calendar, &self.reference)
    }

    /// Convert internal seconds to a value in `units`.
    pub fn internal_to_cf_units(&self, t: f64, units: &str) -> Result<f64> {
        TimeUnits::parse(units)?.from_internal(t, self.calendar, &self.reference)
    }

    /// Units string used when writing times.
    pub fn units_string(&self) -> String {
        format!("seconds since {}", self.reference)
    }

    pub fn date(&self, t: f64) -> Result<String> {
        Ok(self.calendar.date_after(&self.reference, t)?.to_string())
    }

    /// Seconds since the start of the calendar year containing `t`.
    pub fn mod_year(&self, t: f64) -> Result<f64> {
        let date = self.calendar.date_after(&self.reference, t)?;
        let year_start = Date::ymd(date.year, 1, 1);
        Ok(t - self.calendar.seconds_between(&self.reference, &year_start)?)
    }

    /// Fraction of the calendar year elapsed at `t`, in `[0, 1)`.
    pub fn year_fraction(&self, t: f64) -> Result<f64> {
        let date = self.calendar.date_after(&self.reference, t)?;
        Ok(self.mod_year(t)? / self.calendar.year_length(date.year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn time() -> ModelTime {
        ModelTime::new(Calendar::Day360, Date::ymd(1, 1, 1), 0.0, 100.0 * SECONDS_PER_YEAR).unwrap()
    }

    #[test]
    fn test_from_config_end_overrides_length() {
        let mut config = Config::defaults();
        config.set_from_str("start_year", "10").unwrap();
        config.set_from_str("run_length_years", "5").unwrap();
        let t = ModelTime::from_config(&config).unwrap();
        assert_relative_eq!(t.end(), 15.0 * SECONDS_PER_YEAR);

        config.set_from_str("end_year", "12").unwrap();
        let t = ModelTime::from_config(&config).unwrap();
        assert_relative_eq!(t.end(), 12.0 * SECONDS_PER_YEAR);

        config.set_from_str("end_year", "5").unwrap();
        assert!(ModelTime::from_config(&config).is_err());
    }

    #[test]
    fn test_cf_round_trip() {
        let t = time();
        for units in ["seconds since 1-1-1", "days since 5-3-1", "years since 1-1-1"] {
            let v = 1234.5;
            let internal = t.cf_units_to_internal(v, units).unwrap();
            assert_relative_eq!(t.internal_to_cf_units(internal, units).unwrap(), v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_mod_year_and_fraction() {
        let t = time();
        let year = 360.0 * 86400.0;
        assert_relative_eq!(t.mod_year(2.0 * year + 90.0 * 86400.0).unwrap(), 90.0 * 86400.0);
        assert_relative_eq!(t.year_fraction(0.5 * year).unwrap(), 0.5);
    }

    #[test]
    fn test_advance_snaps_to_end() {
        let mut t = ModelTime::new(Calendar::Day365, Date::ymd(1, 1, 1), 0.0, 10.0).unwrap();
        t.advance(10.0 - 1e-9);
        assert_eq!(t.current(), 10.0);
        assert!(t.is_done());
    }

    #[test]
    fn test_tolerance_scales_with_time_axis() {
        assert_eq!(time_tolerance(10.0), TIME_EPSILON);
        assert_relative_eq!(time_tolerance(-1e10), 1e-2);

        let mut t = time();
        let dt = 0.1 * SECONDS_PER_YEAR;
        for _ in 0..999 {
            t.advance(dt);
            assert!(!t.is_done());
        }
        t.advance(dt);
        assert!(t.is_done());
        assert_eq!(t.current(), t.end());
    }

    #[test]
    fn test_date() {
        let t = time();
        assert_eq!(t.date(31.0 * 86400.0).unwrap(), "1-02-02");
    }
}
