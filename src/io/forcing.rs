//! Reader for scalar forcing files (temperature or sea-level offsets).
//!
//! # File Format
//!
//! ```text
//! # Temperature offsets from an ice core record
//! # units: K
//! # columns: time(years) delta_T
//! -125000.0 -4.2
//! -124000.0 -4.9
//! 0.0 0.0
//! ```
//!
//! Times are model years and must be strictly increasing.

use std::path::Path;

use thiserror::Error;

use crate::error::IceError;
use crate::types::SECONDS_PER_YEAR;

/// Error type for forcing file parsing.
#[derive(Debug, Error)]
pub enum ForcingFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("forcing file contains no data")]
    Empty,

    #[error("non-monotonic time at line {line}")]
    NonMonotonic { line: usize },
}

impl ForcingFileError {
    /// Attach the file name, turning this into an input error.
    pub fn into_input(self, file: &Path) -> IceError {
        IceError::input(file.display().to_string(), self.to_string())
    }
}

/// A scalar series `value(t)` with linear interpolation.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarForcing {
    /// Times, seconds
    times: Vec<f64>,
    values: Vec<f64>,
    pub units: Option<String>,
    /// Period of a repeating record, seconds (0 = not periodic)
    period: f64,
    /// Model time at which the record starts, seconds
    reference: f64,
}

impl ScalarForcing {
    /// Build from `(time in seconds, value)` pairs.
    pub fn from_records(records: &[(f64, f64)]) -> Result<Self, ForcingFileError> {
        if records.is_empty() {
            return Err(ForcingFileError::Empty);
        }
        for n in 1..records.len() {
            if records[n].0 <= records[n - 1].0 {
                return Err(ForcingFileError::NonMonotonic { line: n + 1 });
            }
        }
        Ok(Self {
            times: records.iter().map(|r| r.0).collect(),
            values: records.iter().map(|r| r.1).collect(),
            units: None,
            period: 0.0,
            reference: 0.0,
        })
    }

    /// A constant series.
    pub fn constant(value: f64) -> Self {
        Self {
            times: vec![0.0],
            values: vec![value],
            units: None,
            period: 0.0,
            reference: 0.0,
        }
    }

    /// Repeat the record every `period` seconds, starting at `reference`.
    pub fn with_period(mut self, period: f64, reference: f64) -> Self {
        self.period = period.max(0.0);
        self.reference = reference;
        self
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// `(first, last)` record time, seconds.
    pub fn time_range(&self) -> (f64, f64) {
        match (self.times.first(), self.times.last()) {
            (Some(&a), Some(&b)) => (a, b),
            _ => (0.0, 0.0),
        }
    }

    /// Value at `t`, clamped outside the record.
    pub fn value_at(&self, t: f64) -> f64 {
        let t = if self.period > 0.0 {
            self.reference + (t - self.reference).rem_euclid(self.period)
        } else {
            t
        };
        let n = self.times.len();
        if n == 0 {
            return 0.0;
        }
        if t <= self.times[0] {
            return self.values[0];
        }
        if t >= self.times[n - 1] {
            return self.values[n - 1];
        }
        let idx = self
            .times
            .binary_search_by(|x| x.total_cmp(&t))
            .unwrap_or_else(|i| i.saturating_sub(1));
        if idx + 1 >= n {
            return self.values[idx];
        }
        let (t0, t1) = (self.times[idx], self.times[idx + 1]);
        let alpha = (t - t0) / (t1 - t0);
        self.values[idx] + alpha * (self.values[idx + 1] - self.values[idx])
    }

    /// Average over `[t, t + dt]`, sampled at the midpoint.
    pub fn average(&self, t: f64, dt: f64) -> f64 {
        self.value_at(t + 0.5 * dt)
    }
}

/// Parse forcing text (times in years).
pub fn parse_forcing(content: &str) -> Result<ScalarForcing, ForcingFileError> {
    let mut units = None;
    let mut records = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(u) = comment.trim().strip_prefix("units:") {
                units = Some(u.trim().to_string());
            }
            continue;
        }

        let parse = |field: Option<&str>, what: &str| -> Result<f64, ForcingFileError> {
            field
                .ok_or_else(|| ForcingFileError::Parse {
                    line: line_num + 1,
                    message: "expected: time value".into(),
                })?
                .parse()
                .map_err(|_| ForcingFileError::Parse {
                    line: line_num + 1,
                    message: format!("invalid {}", what),
                })
        };
        let mut parts = line.split_whitespace();
        let time = parse(parts.next(), "time")?;
        let value = parse(parts.next(), "value")?;

        if let Some(&(prev, _)) = records.last()
            && time * SECONDS_PER_YEAR <= prev
        {
            return Err(ForcingFileError::NonMonotonic { line: line_num + 1 });
        }
        records.push((time * SECONDS_PER_YEAR, value));
    }

    let mut forcing = ScalarForcing::from_records(&records)?;
    forcing.units = units;
    Ok(forcing)
}

/// Read a forcing file.
pub fn read_forcing_file(path: &Path) -> Result<ScalarForcing, ForcingFileError> {
    let content = std::fs::read_to_string(path)?;
    parse_forcing(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = "\
# Test record
# units: K
0.0 0.0
10.0 -5.0
20.0 5.0
";

    #[test]
    fn test_parse_and_interpolate() {
        let f = parse_forcing(SAMPLE).unwrap();
        assert_eq!(f.len(), 3);
        assert_eq!(f.units.as_deref(), Some("K"));
        let yr = SECONDS_PER_YEAR;
        assert_relative_eq!(f.value_at(5.0 * yr), -2.5, epsilon = 1e-12);
        assert_relative_eq!(f.value_at(15.0 * yr), 0.0, epsilon = 1e-12);
        assert_eq!(f.value_at(-100.0 * yr), 0.0);
        assert_eq!(f.value_at(100.0 * yr), 5.0);
    }

    #[test]
    fn test_periodic() {
        let yr = SECONDS_PER_YEAR;
        let f = parse_forcing(SAMPLE).unwrap().with_period(20.0 * yr, 0.0);
        assert_relative_eq!(f.value_at(25.0 * yr), -2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_forcing("# nothing\n"), Err(ForcingFileError::Empty)));
        assert!(matches!(
            parse_forcing("0 1\n0 2\n"),
            Err(ForcingFileError::NonMonotonic { line: 2 })
        ));
        assert!(matches!(
            parse_forcing("0 abc\n"),
            Err(ForcingFileError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dT.txt");
        std::fs::write(&path, SAMPLE).unwrap();
        let f = read_forcing_file(&path).unwrap();
        assert_eq!(f.time_range().1, 20.0 * SECONDS_PER_YEAR);
    }
}
