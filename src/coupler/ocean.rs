//! Ocean models.

use std::sync::Arc;

use crate::components::{Component, InitContext, OceanModel};
use crate::config::Constants;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::grid::Grid;
use crate::types::FieldId;

/// Constant sea level and a melt rate from a fixed sub-shelf heat flux.
///
/// The shelf-base temperature is the pressure-melting temperature under
/// the local ice overburden.
#[derive(Debug, Default)]
pub struct ConstantOcean {
    sea_level: f64,
    /// W m-2
    heat_flux: f64,
    constants: Constants,
    grid: Option<Arc<Grid>>,
    ids: Option<[FieldId; 2]>,
    thickness: Option<FieldId>,
}

impl ConstantOcean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sub-shelf melt rate, m s-1 ice equivalent.
    pub fn melt_rate(&self) -> f64 {
        self.heat_flux / (self.constants.latent_heat * self.constants.ice_density)
    }

    /// Pressure-melting temperature at the base of `thickness` meters of ice, K.
    pub fn shelf_base_temperature(&self, thickness: f64) -> f64 {
        self.constants.melting_point - self.constants.beta_cc * self.constants.overburden(thickness)
    }
}

impl Component for ConstantOcean {
    fn name(&self) -> &str {
        "constant"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.sea_level = ctx.config.get_double("sea_level")?;
        self.heat_flux = ctx.config.get_double("ocean_sub_shelf_heat_flux_into_ice")?;
        self.constants = *ctx.constants;
        self.grid = Some(Arc::clone(ctx.grid));
        self.thickness = Some(store.ensure(Var::Thickness)?);
        self.ids = Some([store.ensure(Var::ShelfBaseTemp)?, store.ensure(Var::ShelfBaseMassFlux)?]);
        tracing::debug!(sea_level = self.sea_level, melt_rate = self.melt_rate(), "constant ocean");
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["thk"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["shelfbtemp", "shelfbmassflux"]
    }
}

impl OceanModel for ConstantOcean {
    fn update(&mut self, _t: f64, _dt: f64, store: &mut FieldStore) -> Result<()> {
        let (grid, ids, thk) = match (&self.grid, self.ids, self.thickness) {
            (Some(g), Some(ids), Some(thk)) => (Arc::clone(g), ids, thk),
            _ => {
                return Err(IceError::Lifecycle {
                    component: "constant ocean".into(),
                    state: "uninitialized".into(),
                });
            }
        };
        let melt = self.melt_rate();
        let ([mut temp, mut flux], view) = store.split_mut(ids)?;
        let h = view.access(thk)?;
        for (i, j) in grid.points() {
            temp.set(i, j, self.shelf_base_temperature(h.get(i, j)));
            flux.set(i, j, melt);
        }
        Ok(())
    }

    fn sea_level(&self) -> f64 {
        self.sea_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_melt_and_temperature() {
        let mut o = ConstantOcean::new();
        o.heat_flux = 0.5;
        assert_relative_eq!(o.melt_rate(), 0.5 / (3.34e5 * 910.0));
        assert_eq!(o.shelf_base_temperature(0.0), 273.15);
        assert_relative_eq!(o.shelf_base_temperature(1000.0), 273.15 - 7.9e-8 * 910.0 * 9.81 * 1000.0);
    }
}
