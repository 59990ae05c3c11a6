//! Ice flow laws: softness `A` as a function of enthalpy and pressure.

use std::fmt::Debug;

use crate::config::{Config, Constants};
use crate::energy::EnthalpyConverter;
use crate::error::{IceError, Result};
use crate::types::SECONDS_PER_YEAR;

/// Universal gas constant, J mol-1 K-1.
const GAS_CONSTANT: f64 = 8.31441;

/// Glen-type flow law `strain rate = A(E, p) tau^n`.
pub trait FlowLaw: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Glen exponent `n`.
    fn exponent(&self) -> f64;

    /// Softness, Pa-n s-1.
    fn softness(&self, enthalpy: f64, pressure: f64) -> f64;

    /// Whether `softness` reads enthalpy at all.
    fn uses_enthalpy(&self) -> bool {
        true
    }
}

/// Constant softness.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IsothermalGlen {
    /// Pa-n s-1
    pub softness: f64,
    pub n: f64,
}

impl Default for IsothermalGlen {
    fn default() -> Self {
        Self {
            softness: 1e-16 / SECONDS_PER_YEAR,
            n: 3.0,
        }
    }
}

impl FlowLaw for IsothermalGlen {
    fn name(&self) -> &'static str {
        "isothermal_glen"
    }

    fn exponent(&self) -> f64 {
        self.n
    }

    fn softness(&self, _enthalpy: f64, _pressure: f64) -> f64 {
        self.softness
    }

    fn uses_enthalpy(&self) -> bool {
        false
    }
}

/// Paterson and Budd (1982) Arrhenius softness of the pressure-adjusted
/// temperature, with separate cold and warm branches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatersonBudd {
    pub a_cold: f64,
    pub a_warm: f64,
    pub q_cold: f64,
    pub q_warm: f64,
    pub critical_temp: f64,
    pub n: f64,
    converter: EnthalpyConverter,
}

impl PatersonBudd {
    pub fn new(converter: EnthalpyConverter) -> Self {
        Self {
            a_cold: 3.61e-13,
            a_warm: 1.73e3,
            q_cold: 6.0e4,
            q_warm: 13.9e4,
            critical_temp: 263.15,
            n: 3.0,
            converter,
        }
    }

    /// Softness at pressure-adjusted temperature `t_pa`.
    pub fn softness_from_temp(&self, t_pa: f64) -> f64 {
        if t_pa < self.critical_temp {
            self.a_cold * (-self.q_cold / (GAS_CONSTANT * t_pa)).exp()
        } else {
            self.a_warm * (-self.q_warm / (GAS_CONSTANT * t_pa)).exp()
        }
    }
}

impl FlowLaw for PatersonBudd {
    fn name(&self) -> &'static str {
        "paterson_budd"
    }

    fn exponent(&self) -> f64 {
        self.n
    }

    fn softness(&self, enthalpy: f64, pressure: f64) -> f64 {
        self.softness_from_temp(self.converter.pressure_adjusted_temperature(enthalpy, pressure))
    }
}

/// Flow law named by `sia_flow_law`.
pub fn flow_law_from_config(config: &Config, constants: &Constants) -> Result<Box<dyn FlowLaw>> {
    let n = config.get_double("sia_Glen_exponent")?;
    if n < 1.0 {
        return Err(IceError::config(format!("sia_Glen_exponent must be at least 1, got {}", n)));
    }
    match config.get_string("sia_flow_law")?.as_str() {
        "isothermal_glen" => Ok(Box::new(IsothermalGlen {
            softness: config.get_per_year_as_per_second("ice_softness")?,
            n,
        })),
        "paterson_budd" => {
            let mut law = PatersonBudd::new(EnthalpyConverter::new(constants));
            law.n = n;
            Ok(Box::new(law))
        }
        other => Err(IceError::config(format!("unknown flow law '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_paterson_budd_branches() {
        let pb = PatersonBudd::new(EnthalpyConverter::new(&Constants::default()));
        let cold = pb.softness_from_temp(253.15);
        let warm = pb.softness_from_temp(268.15);
        assert!(warm > cold);
        assert_relative_eq!(cold, 3.61e-13 * (-6.0e4 / (GAS_CONSTANT * 253.15)).exp());
        // order 1e-17 Pa-3 year-1 near -10 C
        let a = pb.softness_from_temp(263.15) * SECONDS_PER_YEAR;
        assert!(a > 1e-18 && a < 1e-16);
    }

    #[test]
    fn test_factory() {
        let config = Config::defaults();
        let law = flow_law_from_config(&config, &Constants::default()).unwrap();
        assert_eq!(law.name(), "isothermal_glen");
        assert!(!law.uses_enthalpy());
        assert_relative_eq!(law.softness(0.0, 0.0) * SECONDS_PER_YEAR, 1e-16);
    }
}
