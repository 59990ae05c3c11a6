//! Basal yield stress.
//!
//! | `yield_stress_model` | Model |
//! |---|---|
//! | `mohr_coulomb` | [`MohrCoulomb`]: till friction angle and effective pressure |
//! | `constant` | [`ConstantYieldStress`]: `default_tauc` everywhere |
//!
//! # Example
//!
//! ```
//! use icesheet_rs::basal::TopgToPhi;
//!
//! let ramp = TopgToPhi::new(5.0, 15.0, -1000.0, 1000.0).unwrap();
//! assert_eq!(ramp.phi(-2000.0), 5.0);
//! assert_eq!(ramp.phi(0.0), 10.0);
//! assert!(TopgToPhi::new(15.0, 5.0, -1000.0, 1000.0).is_err());
//! ```

mod mohr_coulomb;

use crate::components::{Component, InitContext, YieldStress};
use crate::config::Config;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::types::FieldId;

pub use mohr_coulomb::{MohrCoulomb, TillProperties};

/// Till friction angle as a piecewise-linear function of bed elevation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TopgToPhi {
    /// degrees
    pub phi_min: f64,
    pub phi_max: f64,
    /// m
    pub topg_min: f64,
    pub topg_max: f64,
}

impl TopgToPhi {
    pub fn new(phi_min: f64, phi_max: f64, topg_min: f64, topg_max: f64) -> Result<Self> {
        if phi_min >= phi_max {
            return Err(IceError::config(format!(
                "topg_to_phi: phi_min = {} must be less than phi_max = {}",
                phi_min, phi_max
            )));
        }
        if topg_min >= topg_max {
            return Err(IceError::config(format!(
                "topg_to_phi: topg_min = {} must be less than topg_max = {}",
                topg_min, topg_max
            )));
        }
        Ok(Self {
            phi_min,
            phi_max,
            topg_min,
            topg_max,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.get_double("topg_to_phi_phi_min")?,
            config.get_double("topg_to_phi_phi_max")?,
            config.get_double("topg_to_phi_topg_min")?,
            config.get_double("topg_to_phi_topg_max")?,
        )
    }

    /// Friction angle at bed elevation `topg`, degrees.
    pub fn phi(&self, topg: f64) -> f64 {
        if topg <= self.topg_min {
            self.phi_min
        } else if topg >= self.topg_max {
            self.phi_max
        } else {
            let s = (topg - self.topg_min) / (self.topg_max - self.topg_min);
            self.phi_min + s * (self.phi_max - self.phi_min)
        }
    }
}

/// The same yield stress everywhere.
#[derive(Debug, Default)]
pub struct ConstantYieldStress {
    /// Pa
    tauc: f64,
    field: Option<FieldId>,
}

impl ConstantYieldStress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for ConstantYieldStress {
    fn name(&self) -> &str {
        "constant"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.tauc = ctx.config.get_double("default_tauc")?;
        let id = store.ensure(Var::YieldStress)?;
        store.access_mut(id)?.fill(self.tauc);
        self.field = Some(id);
        Ok(())
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["tauc"]
    }
}

impl YieldStress for ConstantYieldStress {
    fn update(&mut self, _t: f64, _dt: f64, _sea_level: f64, store: &mut FieldStore) -> Result<()> {
        let id = self.field.ok_or_else(|| IceError::Lifecycle {
            component: "constant yield stress".into(),
            state: "uninitialized".into(),
        })?;
        store.access_mut(id)?.fill(self.tauc);
        Ok(())
    }
}

/// Build the yield stress model named by `yield_stress_model`.
pub fn yield_stress_from_config(config: &Config) -> Result<Box<dyn YieldStress>> {
    match config.get_string("yield_stress_model")?.as_str() {
        "mohr_coulomb" => Ok(Box::new(MohrCoulomb::new())),
        "constant" => Ok(Box::new(ConstantYieldStress::new())),
        other => Err(IceError::config(format!("unknown yield stress model '{}'", other))),
    }
}
