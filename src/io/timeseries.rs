//! Scalar time series written as JSON columns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Column-oriented scalar time series.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalarSeries {
    pub units: BTreeMap<String, String>,
    /// Missing samples are `None` (`null` in the file)
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl ScalarSeries {
    pub fn len(&self) -> usize {
        self.columns.get("time").map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Column values with missing samples dropped.
    pub fn values(&self, name: &str) -> Vec<f64> {
        self.columns
            .get(name)
            .map(|c| c.iter().flatten().copied().collect())
            .unwrap_or_default()
    }
}

/// Accumulates samples and rewrites the file after each one.
#[derive(Debug)]
pub struct TimeSeriesWriter {
    path: PathBuf,
    series: ScalarSeries,
}

impl TimeSeriesWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            series: ScalarSeries::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn series(&self) -> &ScalarSeries {
        &self.series
    }

    /// Add one sample; `values` are `(name, units, value)`.
    ///
    /// Columns first seen late are back-filled with `None`.
    pub fn record(&mut self, values: &[(&str, &str, f64)]) {
        let n = self.series.len();
        for &(name, units, value) in values {
            self.series.units.entry(name.to_string()).or_insert_with(|| units.to_string());
            let column = self
                .series
                .columns
                .entry(name.to_string())
                .or_insert_with(|| vec![None; n]);
            column.push(Some(value));
        }
        let len = n + 1;
        for column in self.series.columns.values_mut() {
            column.resize(len, None);
        }
    }

    pub fn flush(&self) -> Result<()> {
        use std::io::Write;

        let mut file = std::io::BufWriter::new(std::fs::File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut file, &self.series)?;
        file.flush()?;
        Ok(())
    }
}

pub fn read_scalar_series(path: &Path) -> Result<ScalarSeries> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_stay_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = TimeSeriesWriter::new(dir.path().join("ts.json"));
        w.record(&[("time", "years", 0.0), ("ivol", "m3", 1.0)]);
        w.record(&[("time", "years", 1.0), ("ivol", "m3", 2.0), ("dt", "years", 1.0)]);
        assert_eq!(w.series().len(), 2);
        assert_eq!(w.series().column("dt").unwrap()[0], None);
        w.flush().unwrap();
        let back = read_scalar_series(w.path()).unwrap();
        assert_eq!(back.values("ivol"), vec![1.0, 2.0]);
        assert_eq!(back.values("dt"), vec![1.0]);
        assert_eq!(back.units["time"], "years");
    }
}
