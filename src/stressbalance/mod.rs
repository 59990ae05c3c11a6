//! Stress balance models: ice velocity from geometry and enthalpy.
//!
//! Every model writes the same set of fields:
//!
//! | Field | Shape | Meaning |
//! |---|---|---|
//! | `uvel`, `vvel`, `wvel` | 3-D | velocity in each column; `wvel` relative to the base |
//! | `strain_heating` | 3-D | dissipation heating, W m-3 |
//! | `velbar` | vector | vertically averaged velocity |
//! | `velbase` | vector | basal sliding velocity, advected by mass continuity |
//! | `diffusive_flux` | vector | SIA flux through the east and north faces of each cell |
//!
//! The vertical velocity follows from incompressibility with
//! `w(0) = -m_b`.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::components::Component;
//! use icesheet_rs::config::Config;
//! use icesheet_rs::stressbalance::stress_balance_from_config;
//!
//! let mut config = Config::defaults();
//! config.set_string("stress_balance", "prescribed").unwrap();
//! assert_eq!(stress_balance_from_config(&config).unwrap().name(), "prescribed");
//! ```

mod flow_law;
mod prescribed;
mod sia;

use std::sync::Arc;

use crate::components::StressBalance;
use crate::config::Config;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::grid::Grid;
use crate::types::FieldId;

pub use flow_law::{FlowLaw, IsothermalGlen, PatersonBudd, flow_law_from_config};
pub use prescribed::PrescribedFlow;
pub use sia::SiaModel;

pub(crate) const INPUTS: [&str; 4] = ["thk", "usurf", "enthalpy", "bmelt"];
pub(crate) const OUTPUTS: [&str; 7] = [
    "uvel",
    "vvel",
    "wvel",
    "strain_heating",
    "velbar",
    "velbase",
    "diffusive_flux",
];

/// Field handles shared by the stress balance models.
#[derive(Clone, Copy, Debug)]
pub(crate) struct VelocityFields {
    pub thk: FieldId,
    pub usurf: FieldId,
    pub bmelt: FieldId,
    pub u3: FieldId,
    pub v3: FieldId,
    pub w3: FieldId,
    pub strain_heating: FieldId,
    pub velbar: FieldId,
    pub velbase: FieldId,
    pub flux: FieldId,
    /// `bc_mask` and `vel_bc` when Dirichlet conditions are honored
    pub dirichlet: Option<(FieldId, FieldId)>,
}

impl VelocityFields {
    pub fn ensure(store: &mut FieldStore, dirichlet: bool) -> Result<Self> {
        Ok(Self {
            thk: store.ensure(Var::Thickness)?,
            usurf: store.ensure(Var::Surface)?,
            bmelt: store.ensure(Var::BasalMelt)?,
            u3: store.ensure(Var::U3)?,
            v3: store.ensure(Var::V3)?,
            w3: store.ensure(Var::W3)?,
            strain_heating: store.ensure(Var::StrainHeating)?,
            velbar: store.ensure(Var::VelBar)?,
            velbase: store.ensure(Var::VelBase)?,
            flux: store.ensure(Var::DiffusiveFlux)?,
            dirichlet: if dirichlet {
                Some((store.ensure(Var::BcMask)?, store.ensure(Var::VelBc)?))
            } else {
                None
            },
        })
    }

    /// Zero every output.
    pub fn zero(&self, store: &mut FieldStore) -> Result<()> {
        for id in [
            self.u3,
            self.v3,
            self.w3,
            self.strain_heating,
            self.velbar,
            self.velbase,
            self.flux,
        ] {
            store.access_mut(id)?.fill(0.0);
        }
        self.exchange(store)
    }

    /// Impose `vel_bc` as a plug flow wherever `bc_mask` is set.
    pub fn apply_dirichlet(&self, grid: &Grid, store: &mut FieldStore) -> Result<()> {
        let Some((mask, vel_bc)) = self.dirichlet else {
            return Ok(());
        };
        let ([mut u3, mut v3, mut velbar, mut velbase], view) =
            store.split_mut([self.u3, self.v3, self.velbar, self.velbase])?;
        let (mask, bc) = (view.access(mask)?, view.access(vel_bc)?);
        for (i, j) in grid.points() {
            if mask.get(i, j) < 0.5 {
                continue;
            }
            let (u, v) = bc.vec(i, j);
            velbar.set_vec(i, j, (u, v));
            velbase.set_vec(i, j, (u, v));
            u3.column_mut(i, j).fill(u);
            v3.column_mut(i, j).fill(v);
        }
        Ok(())
    }

    pub fn exchange(&self, store: &mut FieldStore) -> Result<()> {
        for id in [self.velbar, self.velbase, self.flux] {
            store.update_ghosts(id)?;
        }
        Ok(())
    }

    /// Integrate `dw/dz = -div` upward from `w(0) = -m_b`.
    pub fn integrate_w(w: &mut [f64], z: &[f64], basal_melt: f64, div: impl Fn(usize) -> f64) {
        let Some(first) = w.first_mut() else {
            return;
        };
        *first = -basal_melt;
        let mut prev = div(0);
        for k in 1..w.len() {
            let d = div(k);
            w[k] = w[k - 1] - 0.5 * (prev + d) * (z[k] - z[k - 1]);
            prev = d;
        }
    }
}

/// True if any rank holds ice. Collective.
pub(crate) fn has_ice(grid: &Arc<Grid>, store: &FieldStore, thk: FieldId) -> Result<bool> {
    let h = store.access(thk)?;
    let local = grid.points().map(|(i, j)| h.get(i, j)).fold(0.0_f64, f64::max);
    Ok(grid.max(local)? > 0.0)
}

/// Zero velocity everywhere.
#[derive(Debug, Default)]
pub struct ZeroVelocity {
    fields: Option<VelocityFields>,
}

impl ZeroVelocity {
    pub fn new() -> Self {
        Self::default()
    }
}

impl crate::components::Component for ZeroVelocity {
    fn name(&self) -> &str {
        "none"
    }

    fn init(&mut self, _ctx: &crate::components::InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.fields = Some(VelocityFields::ensure(store, false)?);
        Ok(())
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        OUTPUTS.to_vec()
    }
}

impl StressBalance for ZeroVelocity {
    fn update(&mut self, store: &mut FieldStore) -> Result<crate::components::StressBalanceStats> {
        let fields = self.fields.ok_or_else(|| IceError::Lifecycle {
            component: "none".into(),
            state: "uninitialized".into(),
        })?;
        fields.zero(store)?;
        Ok(Default::default())
    }
}

/// Stress balance named by `stress_balance`.
pub fn stress_balance_from_config(config: &Config) -> Result<Box<dyn StressBalance>> {
    match config.get_string("stress_balance")?.as_str() {
        "none" => Ok(Box::new(ZeroVelocity::new())),
        "prescribed" => Ok(Box::new(PrescribedFlow::new(0.0, 0.0))),
        "sia" => Ok(Box::new(SiaModel::new())),
        other => Err(IceError::config(format!("unknown stress balance '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_w_from_uniform_divergence() {
        let z = [0.0, 10.0, 20.0];
        let mut w = [0.0; 3];
        VelocityFields::integrate_w(&mut w, &z, 1.0, |_| 0.01);
        assert_relative_eq!(w[0], -1.0);
        assert_relative_eq!(w[2], -1.0 - 0.2);
    }

    #[test]
    fn test_factory_rejects_unknown() {
        let mut config = Config::defaults();
        assert_eq!(stress_balance_from_config(&config).unwrap().name(), "sia");
        config.set_string("stress_balance", "ssa").unwrap();
        assert!(stress_balance_from_config(&config).is_err());
    }
}
