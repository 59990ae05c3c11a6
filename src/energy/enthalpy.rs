//! Conversion between enthalpy, temperature, and liquid water fraction.
//!
//! ```text
//! T_m(p) = T_melt - beta p
//! E_s(p) = c_i (T_m(p) - T_0)            cold-temperate transition
//! E      = c_i (T - T_0)                 cold ice, E < E_s
//! E      = E_s(p) + omega L              temperate ice
//! ```

use crate::config::Constants;
use crate::error::{IceError, Result};

/// Enthalpy relations at a given pressure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnthalpyConverter {
    c_i: f64,
    latent_heat: f64,
    melting_point: f64,
    beta: f64,
    t0: f64,
    rho_g: f64,
}

impl EnthalpyConverter {
    pub fn new(constants: &Constants) -> Self {
        Self {
            c_i: constants.ice_c,
            latent_heat: constants.latent_heat,
            melting_point: constants.melting_point,
            beta: constants.beta_cc,
            t0: constants.enthalpy_t0,
            rho_g: constants.ice_density * constants.standard_gravity,
        }
    }

    /// Hydrostatic pressure at `depth` meters below the ice surface, Pa.
    pub fn pressure(&self, depth: f64) -> f64 {
        self.rho_g * depth.max(0.0)
    }

    pub fn melting_temperature(&self, pressure: f64) -> f64 {
        self.melting_point - self.beta * pressure
    }

    /// Enthalpy at the cold-temperate transition surface, J kg-1.
    pub fn enthalpy_cts(&self, pressure: f64) -> f64 {
        self.c_i * (self.melting_temperature(pressure) - self.t0)
    }

    /// Enthalpy of completely liquid water at `pressure`.
    pub fn enthalpy_liquid(&self, pressure: f64) -> f64 {
        self.enthalpy_cts(pressure) + self.latent_heat
    }

    pub fn is_temperate(&self, enthalpy: f64, pressure: f64) -> bool {
        enthalpy >= self.enthalpy_cts(pressure)
    }

    /// Absolute temperature, K.
    pub fn temperature(&self, enthalpy: f64, pressure: f64) -> f64 {
        if self.is_temperate(enthalpy, pressure) {
            self.melting_temperature(pressure)
        } else {
            self.t0 + enthalpy / self.c_i
        }
    }

    /// Temperature shifted so the pressure-melting point sits at `T_melt`.
    pub fn pressure_adjusted_temperature(&self, enthalpy: f64, pressure: f64) -> f64 {
        self.temperature(enthalpy, pressure) + self.beta * pressure
    }

    /// Liquid water fraction, zero for cold ice.
    pub fn water_fraction(&self, enthalpy: f64, pressure: f64) -> f64 {
        let e_s = self.enthalpy_cts(pressure);
        if enthalpy <= e_s {
            0.0
        } else {
            ((enthalpy - e_s) / self.latent_heat).min(1.0)
        }
    }

    /// Enthalpy of ice at temperature `temp` with water fraction `omega`.
    pub fn enthalpy(&self, temp: f64, omega: f64, pressure: f64) -> Result<f64> {
        let t_m = self.melting_temperature(pressure);
        if temp > t_m + 1e-9 {
            return Err(IceError::config(format!(
                "temperature {} K exceeds the pressure-melting point {} K",
                temp, t_m
            )));
        }
        if !(0.0..=1.0).contains(&omega) {
            return Err(IceError::config(format!("water fraction {} outside [0, 1]", omega)));
        }
        if temp < t_m {
            Ok(self.c_i * (temp - self.t0))
        } else {
            Ok(self.enthalpy_cts(pressure) + omega * self.latent_heat)
        }
    }

    /// Enthalpy of cold ice at `temp`, clamped to the pressure-melting point.
    pub fn enthalpy_permissive(&self, temp: f64, pressure: f64) -> f64 {
        self.c_i * (temp.min(self.melting_temperature(pressure)) - self.t0)
    }

    pub fn latent_heat(&self) -> f64 {
        self.latent_heat
    }

    pub fn specific_heat(&self) -> f64 {
        self.c_i
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ec() -> EnthalpyConverter {
        EnthalpyConverter::new(&Constants::default())
    }

    #[test]
    fn test_cold_round_trip() {
        let ec = ec();
        let p = ec.pressure(1000.0);
        let e = ec.enthalpy(250.0, 0.0, p).unwrap();
        assert_relative_eq!(ec.temperature(e, p), 250.0, epsilon = 1e-9);
        assert_eq!(ec.water_fraction(e, p), 0.0);
    }

    #[test]
    fn test_temperate_ice() {
        let ec = ec();
        let p = ec.pressure(2000.0);
        let t_m = ec.melting_temperature(p);
        assert!(t_m < 273.15);
        let e = ec.enthalpy(t_m, 0.01, p).unwrap();
        assert!(ec.is_temperate(e, p));
        assert_relative_eq!(ec.water_fraction(e, p), 0.01, epsilon = 1e-12);
        assert_relative_eq!(ec.temperature(e, p), t_m);
        assert_relative_eq!(ec.pressure_adjusted_temperature(e, p), 273.15, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_impossible_states() {
        let ec = ec();
        assert!(ec.enthalpy(280.0, 0.0, 0.0).is_err());
        assert!(ec.enthalpy(273.15, 1.5, 0.0).is_err());
    }
}
