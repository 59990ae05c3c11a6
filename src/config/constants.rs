use super::Config;
use crate::error::Result;

/// Physical constants read once at init.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constants {
    pub ice_density: f64,
    pub sea_water_density: f64,
    pub fresh_water_density: f64,
    pub standard_gravity: f64,
    pub ice_c: f64,
    pub ice_k: f64,
    pub latent_heat: f64,
    pub melting_point: f64,
    pub beta_cc: f64,
    pub water_c: f64,
    pub enthalpy_t0: f64,
    pub bedrock_density: f64,
    pub bedrock_c: f64,
    pub bedrock_k: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            ice_density: 910.0,
            sea_water_density: 1028.0,
            fresh_water_density: 1000.0,
            standard_gravity: 9.81,
            ice_c: 2009.0,
            ice_k: 2.10,
            latent_heat: 3.34e5,
            melting_point: 273.15,
            beta_cc: 7.9e-8,
            water_c: 4170.0,
            enthalpy_t0: 223.15,
            bedrock_density: 3300.0,
            bedrock_c: 1000.0,
            bedrock_k: 3.0,
        }
    }
}

impl Constants {
    /// Read every constant from the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            ice_density: config.get_double("ice_density")?,
            sea_water_density: config.get_double("sea_water_density")?,
            fresh_water_density: config.get_double("fresh_water_density")?,
            standard_gravity: config.get_double("standard_gravity")?,
            ice_c: config.get_double("ice_specific_heat_capacity")?,
            ice_k: config.get_double("ice_thermal_conductivity")?,
            latent_heat: config.get_double("water_latent_heat_fusion")?,
            melting_point: config.get_double("water_melting_point_temperature")?,
            beta_cc: config.get_double("beta_CC")?,
            water_c: config.get_double("water_specific_heat_capacity")?,
            enthalpy_t0: config.get_double("enthalpy_reference_temperature")?,
            bedrock_density: config.get_double("bedrock_thermal_density")?,
            bedrock_c: config.get_double("bedrock_thermal_specific_heat_capacity")?,
            bedrock_k: config.get_double("bedrock_thermal_conductivity")?,
        })
    }

    /// Ratio rho_i / rho_o.
    pub fn flotation_ratio(&self) -> f64 {
        self.ice_density / self.sea_water_density
    }

    /// Overburden pressure under `thickness` meters of ice, Pa.
    pub fn overburden(&self, thickness: f64) -> f64 {
        self.ice_density * self.standard_gravity * thickness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config() {
        let config = Config::defaults();
        assert_eq!(Constants::from_config(&config).unwrap(), Constants::default());
    }
}
