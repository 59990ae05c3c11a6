//! Flat, typed parameter database.
//!
//! Every option the model understands is declared in [`defaults`] with a
//! type, a default value, and a doc string. Values come from the defaults,
//! an optional TOML file, and command-line `-name value` pairs, in that
//! order of precedence.
//!
//! Components read the options they need once, at `init`, through the
//! [`InitContext`](crate::components::InitContext); nothing reads the
//! database while stepping.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::config::Config;
//!
//! let mut config = Config::defaults();
//! config.set_from_str("do_age", "true").unwrap();
//! config.set_from_str("adaptive_timestepping_ratio", "0.2").unwrap();
//!
//! assert!(config.get_flag("do_age").unwrap());
//! assert_eq!(config.get_double("adaptive_timestepping_ratio").unwrap(), 0.2);
//! ```

mod constants;
mod defaults;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{IceError, Result};
use crate::types::SECONDS_PER_YEAR;

pub use constants::Constants;

// =============================================================================
// Parameter values
// =============================================================================

/// Typed value of a configuration parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Double(f64),
    Integer(i64),
    Flag(bool),
    Text(String),
}

impl ParamValue {
    /// Type name used in error messages and the option listing.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Double(_) => "double",
            Self::Integer(_) => "integer",
            Self::Flag(_) => "boolean",
            Self::Text(_) => "string",
        }
    }

    /// Parse `raw` into a value of the same type as `self`.
    fn parse_like(&self, name: &str, raw: &str) -> Result<ParamValue> {
        let bad = || {
            IceError::config(format!(
                "option '{}' expects a {} value, got '{}'",
                name,
                self.type_name(),
                raw
            ))
        };
        Ok(match self {
            Self::Double(_) => Self::Double(raw.trim().parse().map_err(|_| bad())?),
            Self::Integer(_) => Self::Integer(raw.trim().parse().map_err(|_| bad())?),
            Self::Flag(_) => Self::Flag(parse_flag(raw).ok_or_else(bad)?),
            Self::Text(_) => Self::Text(raw.to_string()),
        })
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Double(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Flag(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "\"{}\"", v),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// A single named option.
#[derive(Debug)]
pub struct Parameter {
    /// Current value
    pub value: ParamValue,
    /// Human-readable description
    pub doc: &'static str,
    /// True once the user (file or command line) has set this option
    pub set_by_user: bool,
    used: AtomicBool,
}

impl Parameter {
    fn new(value: ParamValue, doc: &'static str) -> Self {
        Self {
            value,
            doc,
            set_by_user: false,
            used: AtomicBool::new(false),
        }
    }

    /// True once the model has read this option.
    pub fn was_used(&self) -> bool {
        self.used.load(Ordering::Relaxed)
    }
}

impl Clone for Parameter {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            doc: self.doc,
            set_by_user: self.set_by_user,
            used: AtomicBool::new(self.was_used()),
        }
    }
}

// =============================================================================
// Config
// =============================================================================

/// The parameter database.
#[derive(Clone, Debug)]
pub struct Config {
    params: BTreeMap<String, Parameter>,
    unknown: Vec<String>,
}

impl Config {
    /// All options at their default values.
    pub fn defaults() -> Self {
        let params = defaults::table()
            .into_iter()
            .map(|(name, value, doc)| (name.to_string(), Parameter::new(value, doc)))
            .collect();
        Self {
            params,
            unknown: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Result<&Parameter> {
        let p = self
            .params
            .get(name)
            .ok_or_else(|| IceError::config(format!("unknown option '{}'", name)))?;
        p.used.store(true, Ordering::Relaxed);
        Ok(p)
    }

    /// Read a double-valued option.
    pub fn get_double(&self, name: &str) -> Result<f64> {
        match &self.lookup(name)?.value {
            ParamValue::Double(v) => Ok(*v),
            ParamValue::Integer(v) => Ok(*v as f64),
            other => Err(type_error(name, "double", other)),
        }
    }

    /// Read a double-valued option stated in years, converted to seconds.
    pub fn get_years_as_seconds(&self, name: &str) -> Result<f64> {
        Ok(self.get_double(name)? * SECONDS_PER_YEAR)
    }

    /// Read a rate stated per year, converted to per second.
    pub fn get_per_year_as_per_second(&self, name: &str) -> Result<f64> {
        Ok(self.get_double(name)? / SECONDS_PER_YEAR)
    }

    /// Read an integer-valued option.
    pub fn get_integer(&self, name: &str) -> Result<i64> {
        match &self.lookup(name)?.value {
            ParamValue::Integer(v) => Ok(*v),
            other => Err(type_error(name, "integer", other)),
        }
    }

    /// Read a non-negative integer option as `usize`.
    pub fn get_usize(&self, name: &str) -> Result<usize> {
        let v = self.get_integer(name)?;
        usize::try_from(v)
            .map_err(|_| IceError::config(format!("option '{}' must be non-negative, got {}", name, v)))
    }

    /// Read a boolean option.
    pub fn get_flag(&self, name: &str) -> Result<bool> {
        match &self.lookup(name)?.value {
            ParamValue::Flag(v) => Ok(*v),
            other => Err(type_error(name, "boolean", other)),
        }
    }

    /// Read a string option.
    pub fn get_string(&self, name: &str) -> Result<String> {
        match &self.lookup(name)?.value {
            ParamValue::Text(v) => Ok(v.clone()),
            other => Err(type_error(name, "string", other)),
        }
    }

    /// True if the user set this option explicitly.
    pub fn is_set(&self, name: &str) -> bool {
        self.params.get(name).is_some_and(|p| p.set_by_user)
    }

    /// Doc string of an option.
    pub fn doc(&self, name: &str) -> Option<&'static str> {
        self.params.get(name).map(|p| p.doc)
    }

    /// Set an option from its textual form.
    ///
    /// Unknown names are remembered and reported by [`Config::validate`].
    pub fn set_from_str(&mut self, name: &str, raw: &str) -> Result<()> {
        let Some(param) = self.params.get_mut(name) else {
            self.unknown.push(name.to_string());
            return Ok(());
        };
        param.value = param.value.parse_like(name, raw)?;
        param.set_by_user = true;
        Ok(())
    }

    /// Set an option to a typed value.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| IceError::config(format!("unknown option '{}'", name)))?;
        let value = match (&param.value, value) {
            (ParamValue::Double(_), ParamValue::Integer(i)) => ParamValue::Double(i as f64),
            (current, v) if std::mem::discriminant(current) == std::mem::discriminant(&v) => v,
            (current, v) => {
                return Err(IceError::config(format!(
                    "option '{}' is a {}, cannot assign a {}",
                    name,
                    current.type_name(),
                    v.type_name()
                )));
            }
        };
        param.value = value;
        param.set_by_user = true;
        Ok(())
    }

    /// Convenience setter for doubles.
    pub fn set_double(&mut self, name: &str, value: f64) -> Result<()> {
        self.set(name, ParamValue::Double(value))
    }

    /// Convenience setter for flags.
    pub fn set_flag(&mut self, name: &str, value: bool) -> Result<()> {
        self.set(name, ParamValue::Flag(value))
    }

    /// Convenience setter for integers.
    pub fn set_integer(&mut self, name: &str, value: i64) -> Result<()> {
        self.set(name, ParamValue::Integer(value))
    }

    /// Convenience setter for strings.
    pub fn set_string(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.set(name, ParamValue::Text(value.into()))
    }

    /// Overlay values from TOML text.
    ///
    /// Nested tables are flattened with `_`, so `[grid] Mx = 61` sets
    /// `grid_Mx`.
    pub fn merge_toml_str(&mut self, text: &str) -> Result<()> {
        let table: toml::Table = toml::from_str(text)?;
        let mut flat = Vec::new();
        flatten_toml("", &table, &mut flat);
        for (name, value) in flat {
            match value {
                toml::Value::String(s) => self.set_from_str(&name, &s)?,
                toml::Value::Integer(i) => self.set_from_str(&name, &i.to_string())?,
                toml::Value::Float(f) => self.set_from_str(&name, &f.to_string())?,
                toml::Value::Boolean(b) => self.set_from_str(&name, &b.to_string())?,
                other => {
                    return Err(IceError::config(format!(
                        "option '{}' has unsupported TOML type {}",
                        name,
                        other.type_str()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Overlay values from a TOML file.
    pub fn merge_toml_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        self.merge_toml_str(&text)
    }

    /// Fail if any unknown option was supplied.
    pub fn validate(&self) -> Result<()> {
        if self.unknown.is_empty() {
            Ok(())
        } else {
            Err(IceError::config(format!(
                "unknown option(s): {}",
                self.unknown.join(", ")
            )))
        }
    }

    /// User-set options the model never read.
    pub fn options_left(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|(_, p)| p.set_by_user && !p.was_used())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Iterate over all options in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn type_error(name: &str, wanted: &str, found: &ParamValue) -> IceError {
    IceError::config(format!(
        "option '{}' is a {}, read as {}",
        name,
        found.type_name(),
        wanted
    ))
}

fn flatten_toml(prefix: &str, table: &toml::Table, out: &mut Vec<(String, toml::Value)>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}_{}", prefix, key)
        };
        match value {
            toml::Value::Table(inner) => flatten_toml(&name, inner, out),
            other => out.push((name, other.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_present() {
        let config = Config::defaults();
        assert!(config.get_flag("do_mass_conserve").unwrap());
        assert_eq!(config.get_double("adaptive_timestepping_ratio").unwrap(), 0.12);
        assert_eq!(config.get_integer("skip_max").unwrap(), 10);
        assert_eq!(config.get_string("calendar").unwrap(), "360_day");
        assert_eq!(config.get_integer("part_redist_max_passes").unwrap(), 3);
    }

    #[test]
    fn test_every_option_documented() {
        let config = Config::defaults();
        for (name, param) in config.iter() {
            assert!(!param.doc.is_empty(), "option {} has no doc string", name);
        }
    }

    #[test]
    fn test_type_mismatch_is_configuration_error() {
        let mut config = Config::defaults();
        let err = config.set_from_str("skip_max", "many").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(config.get_flag("skip_max").is_err());
    }

    #[test]
    fn test_unknown_option_fails_validation() {
        let mut config = Config::defaults();
        config.set_from_str("no_such_option", "1").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_options_left() {
        let mut config = Config::defaults();
        config.set_from_str("do_age", "yes").unwrap();
        config.set_from_str("skip_max", "4").unwrap();
        let _ = config.get_integer("skip_max").unwrap();
        assert_eq!(config.options_left(), vec!["do_age".to_string()]);
    }

    #[test]
    fn test_toml_overlay_flattens_tables() {
        let mut config = Config::defaults();
        config
            .merge_toml_str(
                r#"
                do_energy = false
                maximum_time_step_years = 5
                [grid]
                Mx = 21
                periodicity = "xy"
                "#,
            )
            .unwrap();
        assert!(!config.get_flag("do_energy").unwrap());
        assert_eq!(config.get_double("maximum_time_step_years").unwrap(), 5.0);
        assert_eq!(config.get_integer("grid_Mx").unwrap(), 21);
        assert_eq!(config.get_string("grid_periodicity").unwrap(), "xy");
    }

    #[test]
    fn test_flag_spellings() {
        let mut config = Config::defaults();
        config.set_from_str("do_skip", "").unwrap();
        assert!(config.get_flag("do_skip").unwrap());
        config.set_from_str("do_skip", "off").unwrap();
        assert!(!config.get_flag("do_skip").unwrap());
    }
}
