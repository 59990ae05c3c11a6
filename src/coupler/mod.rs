//! Climate and ocean couplers.
//!
//! Couplers supply the boundary conditions at the ice surface and under
//! ice shelves. A model option is a comma-separated list: the first name
//! selects the base model, every further name wraps it in a modifier.
//!
//! | Option | Base models | Modifiers |
//! |---|---|---|
//! | `surface_model` | `given`, `constant`, `eismint2`, `verification_a`, `stochastic`, `pdd` | `delta_T`, `force_to_thickness` |
//! | `atmosphere_model` | `yearly_cycle` | |
//! | `ocean_model` | `constant` | `delta_SL` |
//!
//! # Example
//!
//! ```
//! use icesheet_rs::components::Component;
//! use icesheet_rs::config::Config;
//! use icesheet_rs::coupler::surface_from_config;
//!
//! let mut config = Config::defaults();
//! config.set_string("surface_model", "eismint2,delta_T").unwrap();
//! let surface = surface_from_config(&config).unwrap();
//! assert_eq!(surface.name(), "delta_T");
//! ```

mod atmosphere;
mod modifiers;
mod ocean;
mod pdd;
mod surface;

use crate::components::{AtmosphereModel, OceanModel, SurfaceModel};
use crate::config::Config;
use crate::error::{IceError, Result};

pub use atmosphere::YearlyCycle;
pub use modifiers::{DeltaSL, DeltaT, ForceToThickness};
pub use ocean::ConstantOcean;
pub use pdd::{DegreeDayBudget, DegreeDayModel, DegreeDayParameters, PddSurface, erfc};
pub use surface::{
    ConstantSurface, Eismint2Climate, Eismint2Surface, GivenSurface, StochasticSurface, VerificationASurface,
};

/// Split a model option into its base and modifier names.
fn model_chain(option: &str) -> Result<(String, Vec<String>)> {
    let mut names = option.split(',').map(str::trim).filter(|s| !s.is_empty());
    let base = names
        .next()
        .ok_or_else(|| IceError::config("empty coupler model option"))?
        .to_string();
    Ok((base, names.map(str::to_string).collect()))
}

/// Build the atmosphere model named by `atmosphere_model`.
pub fn atmosphere_from_config(config: &Config) -> Result<Box<dyn AtmosphereModel>> {
    let (base, modifiers) = model_chain(&config.get_string("atmosphere_model")?)?;
    if let Some(m) = modifiers.first() {
        return Err(IceError::config(format!("unknown atmosphere modifier '{}'", m)));
    }
    match base.as_str() {
        "yearly_cycle" => Ok(Box::new(YearlyCycle::default())),
        other => Err(IceError::config(format!("unknown atmosphere model '{}'", other))),
    }
}

/// Build the surface model chain named by `surface_model`.
pub fn surface_from_config(config: &Config) -> Result<Box<dyn SurfaceModel>> {
    let (base, modifiers) = model_chain(&config.get_string("surface_model")?)?;
    let mut model: Box<dyn SurfaceModel> = match base.as_str() {
        "given" => Box::new(GivenSurface::new()),
        "constant" => Box::new(ConstantSurface::default()),
        "eismint2" => Box::new(Eismint2Surface::new()),
        "verification_a" => Box::new(VerificationASurface::new()),
        "stochastic" => Box::new(StochasticSurface::new(0)),
        "pdd" => Box::new(PddSurface::new(atmosphere_from_config(config)?)),
        other => return Err(IceError::config(format!("unknown surface model '{}'", other))),
    };
    for m in modifiers {
        model = match m.as_str() {
            "delta_T" => Box::new(DeltaT::new(model)),
            "force_to_thickness" => Box::new(ForceToThickness::new(model)),
            other => return Err(IceError::config(format!("unknown surface modifier '{}'", other))),
        };
    }
    Ok(model)
}

/// Build the ocean model chain named by `ocean_model`.
pub fn ocean_from_config(config: &Config) -> Result<Box<dyn OceanModel>> {
    let (base, modifiers) = model_chain(&config.get_string("ocean_model")?)?;
    let mut model: Box<dyn OceanModel> = match base.as_str() {
        "constant" => Box::new(ConstantOcean::new()),
        other => return Err(IceError::config(format!("unknown ocean model '{}'", other))),
    };
    for m in modifiers {
        model = match m.as_str() {
            "delta_SL" => Box::new(DeltaSL::new(model)),
            other => return Err(IceError::config(format!("unknown ocean modifier '{}'", other))),
        };
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_chain() {
        let (base, mods) = model_chain("pdd, delta_T ,force_to_thickness").unwrap();
        assert_eq!(base, "pdd");
        assert_eq!(mods, vec!["delta_T", "force_to_thickness"]);
        assert!(model_chain(" , ").is_err());
    }

    #[test]
    fn test_factories() {
        let mut config = Config::defaults();
        assert_eq!(surface_from_config(&config).unwrap().name(), "given");
        assert_eq!(ocean_from_config(&config).unwrap().name(), "constant");

        config.set_string("surface_model", "pdd").unwrap();
        assert_eq!(surface_from_config(&config).unwrap().name(), "pdd");

        config.set_string("surface_model", "bogus").unwrap();
        assert!(surface_from_config(&config).is_err());

        config.set_string("ocean_model", "constant,delta_SL").unwrap();
        assert_eq!(ocean_from_config(&config).unwrap().name(), "delta_SL");
        config.set_string("ocean_model", "constant,delta_T").unwrap();
        assert!(ocean_from_config(&config).is_err());
    }
}
