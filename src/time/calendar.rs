//! Calendars and calendar dates.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{IceError, Result};
use crate::types::{SECONDS_PER_DAY, SECONDS_PER_YEAR};

const DAYS_BEFORE_MONTH_365: [u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Supported calendars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Calendar {
    /// Twelve 30-day months
    Day360,
    /// No leap years
    Day365,
    /// Proleptic Gregorian
    Gregorian,
}

impl Calendar {
    pub fn name(self) -> &'static str {
        match self {
            Self::Day360 => "360_day",
            Self::Day365 => "365_day",
            Self::Gregorian => "gregorian",
        }
    }

    /// Number of days in `year`.
    pub fn days_in_year(self, year: i64) -> u32 {
        match self {
            Self::Day360 => 360,
            Self::Day365 => 365,
            Self::Gregorian => {
                if NaiveDate::from_ymd_opt(year as i32, 2, 29).is_some() { 366 } else { 365 }
            }
        }
    }

    /// Length of `year` in seconds.
    pub fn year_length(self, year: i64) -> f64 {
        self.days_in_year(year) as f64 * SECONDS_PER_DAY
    }

    fn days_in_month(self, year: i64, month: u32) -> u32 {
        match self {
            Self::Day360 => 30,
            Self::Day365 => [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31][(month - 1) as usize],
            Self::Gregorian => {
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year as i32 + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year as i32, month + 1, 1)
                };
                match (next, NaiveDate::from_ymd_opt(year as i32, month, 1)) {
                    (Some(n), Some(s)) => (n - s).num_days() as u32,
                    _ => 30,
                }
            }
        }
    }

    /// Days from 0000-01-01 to the start of `date`'s day.
    fn day_number(self, date: &Date) -> Result<i64> {
        match self {
            Self::Day360 => Ok(date.year * 360 + (date.month as i64 - 1) * 30 + date.day as i64 - 1),
            Self::Day365 => Ok(date.year * 365 + DAYS_BEFORE_MONTH_365[(date.month - 1) as usize] as i64
                + date.day as i64
                - 1),
            Self::Gregorian => {
                let d = NaiveDate::from_ymd_opt(date.year as i32, date.month, date.day)
                    .ok_or_else(|| IceError::config(format!("invalid Gregorian date {}", date)))?;
                Ok(d.num_days_from_ce() as i64 - 1 + 366)
            }
        }
    }

    fn date_from_day_number(self, n: i64) -> Date {
        match self {
            Self::Day360 => {
                let year = n.div_euclid(360);
                let doy = n.rem_euclid(360);
                Date::ymd(year, (doy / 30) as u32 + 1, (doy % 30) as u32 + 1)
            }
            Self::Day365 => {
                let year = n.div_euclid(365);
                let doy = n.rem_euclid(365) as u32;
                let month = DAYS_BEFORE_MONTH_365.iter().rposition(|&d| d <= doy).unwrap_or(0) as u32 + 1;
                Date::ymd(year, month, doy - DAYS_BEFORE_MONTH_365[(month - 1) as usize] + 1)
            }
            Self::Gregorian => match NaiveDate::from_num_days_from_ce_opt((n + 1 - 366) as i32) {
                Some(d) => Date::ymd(d.year() as i64, d.month(), d.day()),
                None => Date::ymd(0, 1, 1),
            },
        }
    }

    /// Seconds from `reference` to `date`.
    pub fn seconds_between(self, reference: &Date, date: &Date) -> Result<f64> {
        let days = self.day_number(date)? - self.day_number(reference)?;
        Ok(days as f64 * SECONDS_PER_DAY + date.seconds - reference.seconds)
    }

    /// The date `t` seconds after `reference`.
    pub fn date_after(self, reference: &Date, t: f64) -> Result<Date> {
        let total = self.day_number(reference)? as f64 * SECONDS_PER_DAY + reference.seconds + t;
        let day = (total / SECONDS_PER_DAY).floor();
        let mut date = self.date_from_day_number(day as i64);
        date.seconds = total - day * SECONDS_PER_DAY;
        Ok(date)
    }

    /// Check that `date` exists in this calendar.
    pub fn validate(self, date: &Date) -> Result<()> {
        if date.month == 0 || date.month > 12 || date.day == 0 || date.day > self.days_in_month(date.year, date.month) {
            return Err(IceError::config(format!("date {} does not exist in the {} calendar", date, self.name())));
        }
        Ok(())
    }
}

impl FromStr for Calendar {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "360_day" => Ok(Self::Day360),
            "365_day" | "noleap" => Ok(Self::Day365),
            "gregorian" | "standard" | "proleptic_gregorian" => Ok(Self::Gregorian),
            other => Err(IceError::config(format!("unknown calendar '{}'", other))),
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A calendar date with a time of day in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Date {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    /// Seconds since midnight
    pub seconds: f64,
}

impl Date {
    pub fn ymd(year: i64, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            seconds: 0.0,
        }
    }

    /// Parse `Y-M-D` with an optional `HH:MM:SS` time.
    pub fn parse(text: &str) -> Result<Self> {
        let bad = || IceError::config(format!("cannot parse date '{}'", text));
        let mut parts = text.split_whitespace();
        let ymd = parts.next().ok_or_else(bad)?;
        let (year, rest) = match ymd.strip_prefix('-') {
            Some(r) => {
                let (y, rest) = r.split_once('-').ok_or_else(bad)?;
                (-y.parse::<i64>().map_err(|_| bad())?, rest)
            }
            None => {
                let (y, rest) = ymd.split_once('-').ok_or_else(bad)?;
                (y.parse::<i64>().map_err(|_| bad())?, rest)
            }
        };
        let (m, d) = rest.split_once('-').ok_or_else(bad)?;
        let mut date = Date::ymd(year, m.parse().map_err(|_| bad())?, d.parse().map_err(|_| bad())?);
        if let Some(time) = parts.next() {
            let mut hms = time.split(':').map(|p| p.parse::<f64>());
            let h = hms.next().and_then(|r| r.ok()).ok_or_else(bad)?;
            let mi = hms.next().and_then(|r| r.ok()).unwrap_or(0.0);
            let s = hms.next().and_then(|r| r.ok()).unwrap_or(0.0);
            date.seconds = h * 3600.0 + mi * 60.0 + s;
        }
        Ok(date)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Decimal years corresponding to `t` seconds.
pub fn seconds_to_years(t: f64) -> f64 {
    t / SECONDS_PER_YEAR
}

/// Seconds corresponding to `years`.
pub fn years_to_seconds(years: f64) -> f64 {
    years * SECONDS_PER_YEAR
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_date() {
        let d = Date::parse("2000-3-4 06:30:00").unwrap();
        assert_eq!((d.year, d.month, d.day), (2000, 3, 4));
        assert_relative_eq!(d.seconds, 6.5 * 3600.0);
        assert_eq!(Date::parse("-100-1-1").unwrap().year, -100);
        assert!(Date::parse("yesterday").is_err());
    }

    #[test]
    fn test_360_day_arithmetic() {
        let cal = Calendar::Day360;
        let r = Date::ymd(1, 1, 1);
        let one_year = cal.seconds_between(&r, &Date::ymd(2, 1, 1)).unwrap();
        assert_eq!(one_year, 360.0 * 86400.0);
        let d = cal.date_after(&r, 45.0 * 86400.0).unwrap();
        assert_eq!((d.month, d.day), (2, 16));
    }

    #[test]
    fn test_gregorian_leap_year() {
        let cal = Calendar::Gregorian;
        assert_eq!(cal.days_in_year(2000), 366);
        assert_eq!(cal.days_in_year(1900), 365);
        let r = Date::ymd(2000, 1, 1);
        let t = cal.seconds_between(&r, &Date::ymd(2001, 1, 1)).unwrap();
        assert_eq!(t, 366.0 * 86400.0);
        let back = cal.date_after(&r, t).unwrap();
        assert_eq!((back.year, back.month, back.day), (2001, 1, 1));
    }

    #[test]
    fn test_365_day_round_trip() {
        let cal = Calendar::Day365;
        let r = Date::ymd(1, 1, 1);
        for days in [0.0, 31.0, 59.0, 364.0, 365.0, 1000.0] {
            let d = cal.date_after(&r, days * 86400.0).unwrap();
            assert_relative_eq!(cal.seconds_between(&r, &d).unwrap(), days * 86400.0);
        }
    }

    #[test]
    fn test_calendar_names() {
        assert_eq!("noleap".parse::<Calendar>().unwrap(), Calendar::Day365);
        assert_eq!("standard".parse::<Calendar>().unwrap(), Calendar::Gregorian);
        assert!("julian".parse::<Calendar>().is_err());
    }

    #[test]
    fn test_validate_date() {
        assert!(Calendar::Day360.validate(&Date::ymd(1, 2, 30)).is_ok());
        assert!(Calendar::Gregorian.validate(&Date::ymd(2001, 2, 29)).is_err());
    }
}
