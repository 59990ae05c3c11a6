//! The till-can: a bounded local store of basal melt water.

use std::sync::Arc;

use super::till_step;
use crate::components::{Component, Hydrology, HydrologyStats, InitContext};
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::geometry::{CellType, cell_type};
use crate::grid::Grid;
use crate::types::FieldId;

#[derive(Clone, Copy, Debug)]
pub(super) struct TillFields {
    pub tillwat: FieldId,
    pub bmelt: FieldId,
    pub mask: FieldId,
}

impl TillFields {
    pub fn ensure(store: &mut FieldStore) -> Result<Self> {
        Ok(Self {
            tillwat: store.ensure(Var::TillWater)?,
            bmelt: store.ensure(Var::BasalMelt)?,
            mask: store.ensure(Var::Mask)?,
        })
    }
}

/// Till parameters shared with the routing model.
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct TillParameters {
    /// m
    pub max: f64,
    /// m s-1, water equivalent
    pub decay: f64,
    /// rho_i / rho_w
    pub ice_to_water: f64,
}

impl TillParameters {
    pub fn from_context(ctx: &InitContext<'_>) -> Result<Self> {
        let max = ctx.config.get_double("hydrology_tillwat_max")?;
        if max < 0.0 {
            return Err(IceError::config(format!("hydrology_tillwat_max = {} must be non-negative", max)));
        }
        Ok(Self {
            max,
            decay: ctx.config.get_per_year_as_per_second("hydrology_tillwat_decay_rate")?,
            ice_to_water: ctx.constants.ice_density / ctx.constants.fresh_water_density,
        })
    }

    /// Advance the till layer at every owned cell.
    ///
    /// Returns the overflow rate of each cell in `points()` order, m s-1.
    pub fn advance(&self, grid: &Grid, fields: TillFields, dt: f64, store: &mut FieldStore) -> Result<Vec<f64>> {
        let mut overflow = Vec::with_capacity(grid.patch().len());
        let ([mut w], view) = store.split_mut([fields.tillwat])?;
        let (melt, mask) = (view.access(fields.bmelt)?, view.access(fields.mask)?);
        for (i, j) in grid.points() {
            if cell_type(mask.get(i, j)) != CellType::Grounded {
                w.set(i, j, 0.0);
                overflow.push(0.0);
                continue;
            }
            if dt <= 0.0 {
                overflow.push(0.0);
                continue;
            }
            let input = melt.get(i, j) * self.ice_to_water;
            let (new, extra) = till_step(w.get(i, j), input, self.decay, self.max, dt);
            w.set(i, j, new);
            overflow.push(extra / dt);
        }
        Ok(overflow)
    }
}

/// Till water evolved in place; anything above the maximum is lost.
#[derive(Debug, Default)]
pub struct TillCan {
    params: TillParameters,
    grid: Option<Arc<Grid>>,
    fields: Option<TillFields>,
}

impl TillCan {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for TillCan {
    fn name(&self) -> &str {
        "till_can"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.params = TillParameters::from_context(ctx)?;
        self.fields = Some(TillFields::ensure(store)?);
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["tillwat", "bmelt", "mask"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["tillwat"]
    }
}

impl Hydrology for TillCan {
    fn update(&mut self, _t: f64, dt: f64, store: &mut FieldStore) -> Result<HydrologyStats> {
        let (grid, f) = self.grid.clone().zip(self.fields).ok_or_else(|| IceError::Lifecycle {
            component: "till_can".into(),
            state: "uninitialized".into(),
        })?;
        self.params.advance(&grid, f, dt, store)?;
        Ok(HydrologyStats {
            substeps: 1,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Constants};
    use crate::grid::test_grid;
    use crate::time::ModelTime;
    use crate::types::SECONDS_PER_YEAR;
    use approx::assert_relative_eq;

    #[test]
    fn test_fills_grounded_cells_only() {
        let grid = test_grid();
        let mut store = FieldStore::new(Arc::clone(&grid));
        let config = Config::defaults();
        let constants = Constants::default();
        let time = ModelTime::from_config(&config).unwrap();
        let ctx = InitContext {
            config: &config,
            constants: &constants,
            time: &time,
            grid: &grid,
            input: None,
            bootstrap: true,
        };
        let mut model = TillCan::new();
        model.init(&ctx, &mut store).unwrap();

        let mask = store.id(Var::Mask).unwrap();
        let melt = store.id(Var::BasalMelt).unwrap();
        {
            let mut m = store.access_mut(mask).unwrap();
            for (i, j) in grid.points() {
                let t = if i < 5 { CellType::Grounded } else { CellType::Floating };
                m.set(i, j, t.value());
            }
        }
        // 0.1 m/yr ice equivalent
        store.access_mut(melt).unwrap().fill(0.1 / SECONDS_PER_YEAR);
        let tillwat = store.id(Var::TillWater).unwrap();
        store.access_mut(tillwat).unwrap().fill(0.5);

        let stats = model.update(0.0, SECONDS_PER_YEAR, &mut store).unwrap();
        assert_eq!(stats.substeps, 1);
        let w = store.access(tillwat).unwrap();
        let expected = 0.5 + 0.1 * 910.0 / 1000.0 - 1e-3;
        assert_relative_eq!(w.get(0, 0), expected, max_relative = 1e-12);
        assert_eq!(w.get(7, 3), 0.0);
    }
}
