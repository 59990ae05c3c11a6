//! CF-style time units: `<unit> since <date>`.

use serde::{Deserialize, Serialize};

use super::{Calendar, Date};
use crate::error::{IceError, Result};
use crate::types::SECONDS_PER_YEAR;

/// Parsed `"<unit> since <date>"` string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeUnits {
    /// Seconds per unit
    pub scale: f64,
    pub unit: String,
    pub reference: Date,
}

impl TimeUnits {
    /// Parse a CF units string.
    pub fn parse(text: &str) -> Result<Self> {
        let bad = |msg: &str| IceError::input("", format!("time units '{}': {}", text, msg));
        let (unit, date) = text.split_once(" since ").ok_or_else(|| bad("missing 'since'"))?;
        let unit = unit.trim();
        let scale = match unit {
            "seconds" | "second" | "s" => 1.0,
            "minutes" | "minute" => 60.0,
            "hours" | "hour" | "h" => 3600.0,
            "days" | "day" | "d" => 86400.0,
            "years" | "year" | "a" => SECONDS_PER_YEAR,
            _ => return Err(bad("unknown unit")),
        };
        let reference = Date::parse(date.trim()).map_err(|_| bad("bad reference date"))?;
        Ok(Self {
            scale,
            unit: unit.to_string(),
            reference,
        })
    }

    /// Seconds since the model reference date.
    pub fn to_internal(&self, value: f64, calendar: Calendar, model_reference: &Date) -> Result<f64> {
        let offset = calendar.seconds_between(model_reference, &self.reference)?;
        Ok(value * self.scale + offset)
    }

    /// Inverse of [`TimeUnits::to_internal`].
    pub fn from_internal(&self, t: f64, calendar: Calendar, model_reference: &Date) -> Result<f64> {
        let offset = calendar.seconds_between(model_reference, &self.reference)?;
        Ok((t - offset) / self.scale)
    }
}

impl std::fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} since {}", self.unit, self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_units() {
        let u = TimeUnits::parse("days since 1-1-1").unwrap();
        assert_eq!(u.scale, 86400.0);
        assert_eq!(u.reference, Date::ymd(1, 1, 1));
        assert!(TimeUnits::parse("fortnights since 1-1-1").is_err());
        assert!(TimeUnits::parse("seconds").is_err());
    }

    #[test]
    fn test_round_trip_with_offset_reference() {
        let model_ref = Date::ymd(1, 1, 1);
        let u = TimeUnits::parse("years since 11-1-1").unwrap();
        let cal = Calendar::Day360;
        let t = u.to_internal(2.5, cal, &model_ref).unwrap();
        assert_relative_eq!(t, 10.0 * 360.0 * 86400.0 + 2.5 * SECONDS_PER_YEAR);
        assert_relative_eq!(u.from_internal(t, cal, &model_ref).unwrap(), 2.5, epsilon = 1e-12);
    }
}
