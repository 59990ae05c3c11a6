//! Format-neutral in-memory dataset.
//!
//! Mirrors the CF data model closely enough that the NetCDF backend is a
//! direct translation, and simple enough that the native backend is a
//! single `bincode` call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{IceError, Result};

/// An attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Numbers(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Numbers(v)
    }
}

/// A named array with dimensions and attributes.
///
/// Data is stored with the last dimension varying fastest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub dims: Vec<String>,
    pub attrs: BTreeMap<String, AttrValue>,
    pub data: Vec<f64>,
}

impl Variable {
    pub fn attr_text(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(AttrValue::as_text)
    }

    pub fn attr_number(&self, name: &str) -> Option<f64> {
        self.attrs.get(name).and_then(AttrValue::as_number)
    }

    /// The `units` attribute, `"1"` if absent.
    pub fn units(&self) -> &str {
        self.attr_text("units").unwrap_or("1")
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(name.to_string(), value.into());
    }
}

/// Global attributes, dimensions, and variables of one file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub attrs: BTreeMap<String, AttrValue>,
    pub dims: BTreeMap<String, usize>,
    pub vars: BTreeMap<String, Variable>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    pub fn attr_text(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(AttrValue::as_text)
    }

    /// Define a dimension, or check an existing one has the same length.
    pub fn add_dim(&mut self, name: &str, len: usize) -> Result<()> {
        match self.dims.get(name) {
            Some(&old) if old != len => Err(IceError::ShapeMismatch {
                field: name.to_string(),
                expected: old.to_string(),
                found: len.to_string(),
            }),
            _ => {
                self.dims.insert(name.to_string(), len);
                Ok(())
            }
        }
    }

    pub fn dim(&self, name: &str) -> Option<usize> {
        self.dims.get(name).copied()
    }

    /// Add (or replace) a variable over existing dimensions.
    pub fn add_var(&mut self, name: &str, dims: &[&str], data: Vec<f64>) -> Result<&mut Variable> {
        let mut expected = 1;
        for d in dims {
            expected *= self
                .dim(d)
                .ok_or_else(|| IceError::input("", format!("variable '{}' uses undefined dimension '{}'", name, d)))?;
        }
        if data.len() != expected {
            return Err(IceError::ShapeMismatch {
                field: name.to_string(),
                expected: expected.to_string(),
                found: data.len().to_string(),
            });
        }
        let var = Variable {
            dims: dims.iter().map(|d| d.to_string()).collect(),
            attrs: BTreeMap::new(),
            data,
        };
        self.vars.insert(name.to_string(), var);
        self.vars
            .get_mut(name)
            .ok_or_else(|| IceError::Missing(name.to_string()))
    }

    pub fn var(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn var_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.vars.get_mut(name)
    }

    /// Variable that must exist.
    pub fn require(&self, name: &str, file: &str) -> Result<&Variable> {
        self.var(name)
            .ok_or_else(|| IceError::input(file, format!("variable '{}' not found", name)))
    }

    /// Values of a coordinate variable.
    pub fn coordinate(&self, name: &str, file: &str) -> Result<&[f64]> {
        Ok(&self.require(name, file)?.data)
    }

    /// Prepend a line to the `history` attribute.
    pub fn prepend_history(&mut self, entry: &str) {
        let old = self.attr_text("history").unwrap_or_default();
        let text = if old.is_empty() {
            format!("{}\n", entry)
        } else {
            format!("{}\n{}", entry, old)
        };
        self.set_attr("history", text);
    }

    /// Number of records along `time`, 0 if the dimension is absent.
    pub fn records(&self) -> usize {
        self.dim("time").unwrap_or(0)
    }

    /// Append one record to variables whose first dimension is `time`.
    ///
    /// Every such variable must receive a record; `values` maps names to
    /// one record's worth of data.
    pub fn append_record(&mut self, values: &BTreeMap<String, Vec<f64>>) -> Result<()> {
        let n = self.records();
        for (name, var) in self.vars.iter_mut() {
            if var.dims.first().map(String::as_str) != Some("time") {
                continue;
            }
            let record = values
                .get(name)
                .ok_or_else(|| IceError::input("", format!("no record for time-dependent variable '{}'", name)))?;
            if n > 0 && var.data.len() != record.len() * n {
                return Err(IceError::ShapeMismatch {
                    field: name.clone(),
                    expected: (var.data.len() / n).to_string(),
                    found: record.len().to_string(),
                });
            }
            var.data.extend_from_slice(record);
        }
        self.dims.insert("time".to_string(), n + 1);
        Ok(())
    }

    /// The last record of a variable; the whole array if it has no time axis.
    pub fn last_record(&self, name: &str, file: &str) -> Result<&[f64]> {
        let var = self.require(name, file)?;
        if var.dims.first().map(String::as_str) != Some("time") {
            return Ok(&var.data);
        }
        let n = self.records();
        if n == 0 {
            return Err(IceError::input(file, format!("variable '{}' has no records", name)));
        }
        let len = var.data.len() / n;
        Ok(&var.data[(n - 1) * len..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_var_checks_size() {
        let mut ds = Dataset::new();
        ds.add_dim("x", 3).unwrap();
        ds.add_dim("y", 2).unwrap();
        assert!(ds.add_var("a", &["x", "y"], vec![0.0; 6]).is_ok());
        assert!(ds.add_var("b", &["x", "y"], vec![0.0; 5]).is_err());
        assert!(ds.add_var("c", &["z"], vec![0.0]).is_err());
        assert!(ds.add_dim("x", 4).is_err());
    }

    #[test]
    fn test_history_is_prepended() {
        let mut ds = Dataset::new();
        ds.prepend_history("first");
        ds.prepend_history("second");
        let h = ds.attr_text("history").unwrap();
        assert!(h.starts_with("second\nfirst"));
    }

    #[test]
    fn test_append_and_last_record() {
        let mut ds = Dataset::new();
        ds.add_dim("time", 0).unwrap();
        ds.add_dim("x", 2).unwrap();
        ds.add_var("time", &["time"], vec![]).unwrap();
        ds.add_var("thk", &["time", "x"], vec![]).unwrap();
        ds.add_var("x", &["x"], vec![0.0, 1.0]).unwrap();
        for t in 0..3 {
            let mut rec = BTreeMap::new();
            rec.insert("time".to_string(), vec![t as f64]);
            rec.insert("thk".to_string(), vec![t as f64, 10.0 * t as f64]);
            ds.append_record(&rec).unwrap();
        }
        assert_eq!(ds.records(), 3);
        assert_eq!(ds.last_record("thk", "f").unwrap(), &[2.0, 20.0]);
        assert_eq!(ds.last_record("x", "f").unwrap(), &[0.0, 1.0]);
    }
}
