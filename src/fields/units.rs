//! Conversion between unit strings.
//!
//! A unit is a scale and an offset over the SI base dimensions
//! (m, s, kg, K). Only the handful of units the model reads and writes
//! are understood.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::fields::Unit;
//!
//! let per_year = Unit::parse("m year-1").unwrap();
//! let per_second = Unit::parse("m s-1").unwrap();
//! let v = per_year.convert(1.0, &per_second).unwrap();
//! assert!((v - 1.0 / 3.15569259747e7).abs() < 1e-20);
//!
//! let celsius = Unit::parse("Celsius").unwrap();
//! let kelvin = Unit::parse("K").unwrap();
//! assert_eq!(celsius.convert(0.0, &kelvin).unwrap(), 273.15);
//! ```

use crate::error::{IceError, Result};
use crate::types::SECONDS_PER_YEAR;

/// Exponents of (m, s, kg, K).
type Dims = [i32; 4];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit {
    scale: f64,
    offset: f64,
    dims: Dims,
}

fn base(symbol: &str) -> Option<(f64, f64, Dims)> {
    Some(match symbol {
        "m" | "meter" | "meters" => (1.0, 0.0, [1, 0, 0, 0]),
        "km" => (1e3, 0.0, [1, 0, 0, 0]),
        "cm" => (1e-2, 0.0, [1, 0, 0, 0]),
        "mm" => (1e-3, 0.0, [1, 0, 0, 0]),
        "s" | "second" | "seconds" => (1.0, 0.0, [0, 1, 0, 0]),
        "minute" | "minutes" => (60.0, 0.0, [0, 1, 0, 0]),
        "hour" | "hours" => (3600.0, 0.0, [0, 1, 0, 0]),
        "day" | "days" => (86400.0, 0.0, [0, 1, 0, 0]),
        "year" | "years" | "yr" | "a" => (SECONDS_PER_YEAR, 0.0, [0, 1, 0, 0]),
        "kg" => (1.0, 0.0, [0, 0, 1, 0]),
        "g" => (1e-3, 0.0, [0, 0, 1, 0]),
        "Gt" => (1e12, 0.0, [0, 0, 1, 0]),
        "K" | "kelvin" | "Kelvin" => (1.0, 0.0, [0, 0, 0, 1]),
        "Celsius" | "degC" | "celsius" => (1.0, 273.15, [0, 0, 0, 1]),
        "Pa" => (1.0, 0.0, [-1, -2, 1, 0]),
        "kPa" => (1e3, 0.0, [-1, -2, 1, 0]),
        "MPa" => (1e6, 0.0, [-1, -2, 1, 0]),
        "J" => (1.0, 0.0, [2, -2, 1, 0]),
        "W" => (1.0, 0.0, [2, -3, 1, 0]),
        "mW" => (1e-3, 0.0, [2, -3, 1, 0]),
        "1" | "degree" | "degrees" | "percent" => (1.0, 0.0, [0, 0, 0, 0]),
        _ => return None,
    })
}

/// Split `m2`, `s-1`, `m^2`, `s**-1` into symbol and exponent.
fn split_power(token: &str) -> (&str, Option<&str>) {
    if let Some((sym, exp)) = token.split_once("**") {
        return (sym, Some(exp));
    }
    if let Some((sym, exp)) = token.split_once('^') {
        return (sym, Some(exp));
    }
    let at = token
        .char_indices()
        .find(|&(i, c)| i > 0 && (c.is_ascii_digit() || c == '-'))
        .map(|(i, _)| i);
    match at {
        Some(i) if token != "1" => (&token[..i], Some(&token[i..])),
        _ => (token, None),
    }
}

impl Unit {
    pub const DIMENSIONLESS: Unit = Unit {
        scale: 1.0,
        offset: 0.0,
        dims: [0; 4],
    };

    /// Parse a unit string.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::DIMENSIONLESS);
        }
        let bad = |msg: String| IceError::input("", format!("unit '{}': {}", text, msg));

        let mut unit = Self::DIMENSIONLESS;
        let mut tokens = 0;
        for (part_no, part) in text.split('/').enumerate() {
            let sign = if part_no == 0 { 1 } else { -1 };
            for token in part.split_whitespace() {
                let (symbol, exp) = split_power(token);
                let (scale, offset, dims) = base(symbol).ok_or_else(|| bad(format!("unknown symbol '{}'", symbol)))?;
                let power: i32 = match exp {
                    Some(e) => e.parse().map_err(|_| bad(format!("bad exponent '{}'", e)))?,
                    None => 1,
                } * sign;
                if offset != 0.0 {
                    if tokens > 0 || power != 1 || part.split_whitespace().count() > 1 {
                        return Err(bad("offset units cannot be combined".into()));
                    }
                    unit.offset = offset;
                }
                unit.scale *= scale.powi(power);
                for (d, b) in unit.dims.iter_mut().zip(dims) {
                    *d += b * power;
                }
                tokens += 1;
            }
        }
        Ok(unit)
    }

    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dims == other.dims
    }

    /// Convert `value` from `self` to `to`.
    pub fn convert(&self, value: f64, to: &Unit) -> Result<f64> {
        if !self.is_compatible(to) {
            return Err(IceError::input("", "incompatible units".to_string()));
        }
        Ok((value * self.scale + self.offset - to.offset) / to.scale)
    }

    /// Converter closure from `self` to `to`.
    pub fn converter(&self, to: &Unit) -> Result<impl Fn(f64) -> f64 + use<>> {
        if !self.is_compatible(to) {
            return Err(IceError::input("", "incompatible units".to_string()));
        }
        let (a, b) = (self.scale / to.scale, (self.offset - to.offset) / to.scale);
        Ok(move |v: f64| v * a + b)
    }
}

/// Convert `values` in place between two unit strings.
pub fn convert_in_place(values: &mut [f64], from: &str, to: &str) -> Result<()> {
    if from.trim() == to.trim() {
        return Ok(());
    }
    let f = Unit::parse(from)?;
    let t = Unit::parse(to)?;
    let conv = f.converter(&t).map_err(|_| {
        IceError::input("", format!("cannot convert from '{}' to '{}'", from, to))
    })?;
    for v in values.iter_mut() {
        *v = conv(*v);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_heat_flux() {
        let mw = Unit::parse("mW m-2").unwrap();
        let w = Unit::parse("W m-2").unwrap();
        assert_relative_eq!(mw.convert(42.0, &w).unwrap(), 0.042);
    }

    #[test]
    fn test_slash_form() {
        let a = Unit::parse("m/year").unwrap();
        let b = Unit::parse("m year-1").unwrap();
        assert_eq!(a, b);
        let c = Unit::parse("kg m-2 s-1").unwrap();
        let d = Unit::parse("kg m-2 year-1").unwrap();
        assert_relative_eq!(d.convert(SECONDS_PER_YEAR, &c).unwrap(), 1.0);
    }

    #[test]
    fn test_pressure_dims() {
        let pa = Unit::parse("Pa").unwrap();
        let manual = Unit::parse("kg m-1 s-2").unwrap();
        assert!(pa.is_compatible(&manual));
        assert_relative_eq!(Unit::parse("kPa").unwrap().convert(1.0, &pa).unwrap(), 1e3);
    }

    #[test]
    fn test_incompatible() {
        let m = Unit::parse("m").unwrap();
        let k = Unit::parse("K").unwrap();
        assert!(m.convert(1.0, &k).is_err());
        let mut v = [1.0];
        assert!(convert_in_place(&mut v, "m", "K").is_err());
    }

    #[test]
    fn test_unknown_symbol() {
        assert!(Unit::parse("furlongs").is_err());
    }

    #[test]
    fn test_km_to_m_in_place() {
        let mut v = [1.0, 2.5];
        convert_in_place(&mut v, "km", "m").unwrap();
        assert_eq!(v, [1000.0, 2500.0]);
    }
}
