//! Scheduled output times.

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::{IceError, Result};
use crate::types::SECONDS_PER_YEAR;

/// Output channel an event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Snapshots,
    Extras,
    TimeSeries,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Self::Snapshots => "snapshots",
            Self::Extras => "extras",
            Self::TimeSeries => "timeseries",
        }
    }
}

/// Parse a time specification in years into ascending times in seconds.
///
/// Accepted forms: `a:dt:b`, `a:yearly:b`, `a:monthly:b`, and comma lists.
pub fn parse_times(spec: &str) -> Result<Vec<f64>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(Vec::new());
    }
    let bad = |msg: &str| IceError::config(format!("time specification '{}': {}", spec, msg));
    let num = |s: &str| s.trim().parse::<f64>().map_err(|_| bad("not a number"));

    let years: Vec<f64> = if spec.contains(':') {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() != 3 {
            return Err(bad("expected a:dt:b"));
        }
        let (a, b) = (num(parts[0])?, num(parts[2])?);
        let step = match parts[1].trim() {
            "yearly" => 1.0,
            "monthly" => 1.0 / 12.0,
            other => num(other)?,
        };
        if step <= 0.0 || b < a {
            return Err(bad("need dt > 0 and a <= b"));
        }
        let n = ((b - a) / step + 1e-9).floor() as usize;
        (0..=n).map(|k| a + k as f64 * step).collect()
    } else {
        spec.split(',').map(num).collect::<Result<_>>()?
    };

    if years.windows(2).any(|w| w[1] <= w[0]) {
        return Err(bad("times must be strictly increasing"));
    }
    Ok(years.into_iter().map(|y| y * SECONDS_PER_YEAR).collect())
}

/// Ascending event times per channel.
#[derive(Clone, Debug, Default)]
pub struct EventCalendar {
    channels: BTreeMap<Channel, Vec<f64>>,
}

impl EventCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the events of one channel. Times before `start` are dropped.
    pub fn set(&mut self, channel: Channel, times: Vec<f64>, start: f64) -> Result<()> {
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(IceError::config(format!(
                "{} times must be strictly increasing",
                channel.name()
            )));
        }
        let (before, kept): (Vec<f64>, Vec<f64>) = times.into_iter().partition(|&t| t < start);
        if !before.is_empty() {
            warn!(
                channel = channel.name(),
                skipped = before.len(),
                "output times before the start of the run are ignored"
            );
        }
        self.channels.insert(channel, kept);
        Ok(())
    }

    pub fn times(&self, channel: Channel) -> &[f64] {
        self.channels.get(&channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Earliest event strictly after `t` on any channel.
    pub fn next_after(&self, t: f64) -> Option<f64> {
        self.channels
            .values()
            .filter_map(|times| times.iter().copied().find(|&e| e > t))
            .reduce(f64::min)
    }

    /// Events of `channel` in `(t0, t1]`.
    pub fn due(&self, channel: Channel, t0: f64, t1: f64) -> Vec<f64> {
        self.times(channel)
            .iter()
            .copied()
            .filter(|&e| e > t0 && e <= t1)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.values().all(|v| v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn years(v: &[f64]) -> Vec<f64> {
        v.iter().map(|y| y * SECONDS_PER_YEAR).collect()
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_times("0:10:30").unwrap(), years(&[0.0, 10.0, 20.0, 30.0]));
        assert_eq!(parse_times("1:yearly:3").unwrap(), years(&[1.0, 2.0, 3.0]));
        assert_eq!(parse_times("0:monthly:1").unwrap().len(), 13);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_times("5, 1.5e1,100").unwrap(), years(&[5.0, 15.0, 100.0]));
        assert!(parse_times("5,4").is_err());
        assert!(parse_times("0:0:10").is_err());
        assert!(parse_times("a,b").is_err());
        assert!(parse_times("").unwrap().is_empty());
    }

    #[test]
    fn test_next_after_and_due() {
        let mut cal = EventCalendar::new();
        cal.set(Channel::Snapshots, years(&[10.0, 20.0]), 0.0).unwrap();
        cal.set(Channel::TimeSeries, years(&[5.0, 15.0]), 0.0).unwrap();
        assert_eq!(cal.next_after(0.0), Some(5.0 * SECONDS_PER_YEAR));
        assert_eq!(cal.next_after(5.0 * SECONDS_PER_YEAR), Some(10.0 * SECONDS_PER_YEAR));
        assert_eq!(cal.next_after(20.0 * SECONDS_PER_YEAR), None);
        assert_eq!(
            cal.due(Channel::Snapshots, 10.0 * SECONDS_PER_YEAR, 20.0 * SECONDS_PER_YEAR),
            years(&[20.0])
        );
    }

    #[test]
    fn test_events_before_start_dropped() {
        let mut cal = EventCalendar::new();
        cal.set(Channel::Extras, years(&[1.0, 2.0, 3.0]), 2.0 * SECONDS_PER_YEAR).unwrap();
        assert_eq!(cal.times(Channel::Extras), years(&[2.0, 3.0]).as_slice());
    }
}
