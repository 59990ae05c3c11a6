//! Uniform plug flow.

use std::sync::Arc;

use super::{OUTPUTS, VelocityFields, has_ice};
use crate::components::{Component, InitContext, StressBalance, StressBalanceStats};
use crate::error::{IceError, Result};
use crate::fields::FieldStore;
use crate::grid::Grid;

/// Every column moves as a block with velocity `(u0, v0)`.
///
/// Used for advection and conservation tests; there is no diffusive flux.
#[derive(Debug)]
pub struct PrescribedFlow {
    /// m s-1
    pub u0: f64,
    /// m s-1
    pub v0: f64,
    grid: Option<Arc<Grid>>,
    fields: Option<VelocityFields>,
}

impl PrescribedFlow {
    pub fn new(u0: f64, v0: f64) -> Self {
        Self {
            u0,
            v0,
            grid: None,
            fields: None,
        }
    }
}

impl Component for PrescribedFlow {
    fn name(&self) -> &str {
        "prescribed"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.u0 = ctx.config.get_per_year_as_per_second("prescribed_u_m_per_year")?;
        self.v0 = ctx.config.get_per_year_as_per_second("prescribed_v_m_per_year")?;
        let dirichlet = ctx.config.get_flag("ssa_dirichlet_bc")?;
        self.fields = Some(VelocityFields::ensure(store, dirichlet)?);
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["thk", "bmelt"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        OUTPUTS.to_vec()
    }
}

impl StressBalance for PrescribedFlow {
    fn update(&mut self, store: &mut FieldStore) -> Result<StressBalanceStats> {
        let (grid, f) = self.grid.clone().zip(self.fields).ok_or_else(|| IceError::Lifecycle {
            component: "prescribed".into(),
            state: "uninitialized".into(),
        })?;
        if !has_ice(&grid, store, f.thk)? {
            f.zero(store)?;
            return Ok(StressBalanceStats::default());
        }
        store.access_mut(f.strain_heating)?.fill(0.0);
        store.access_mut(f.flux)?.fill(0.0);
        let z = grid.z().to_vec();
        let (u0, v0) = (self.u0, self.v0);
        {
            let ([mut u3, mut v3, mut w3, mut velbar, mut velbase], view) =
                store.split_mut([f.u3, f.v3, f.w3, f.velbar, f.velbase])?;
            let bmelt = view.access(f.bmelt)?;
            for (i, j) in grid.points() {
                u3.column_mut(i, j).fill(u0);
                v3.column_mut(i, j).fill(v0);
                VelocityFields::integrate_w(w3.column_mut(i, j), &z, bmelt.get(i, j), |_| 0.0);
                velbar.set_vec(i, j, (u0, v0));
                velbase.set_vec(i, j, (u0, v0));
            }
        }
        f.apply_dirichlet(&grid, store)?;
        f.exchange(store)?;
        Ok(StressBalanceStats { d_max: 0.0, solved: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Constants};
    use crate::fields::Var;
    use crate::grid::GridParameters;
    use crate::time::ModelTime;
    use crate::types::SECONDS_PER_YEAR;
    use approx::assert_relative_eq;

    #[test]
    fn test_plug_flow() {
        let mut config = Config::defaults();
        config.set_double("prescribed_u_m_per_year", 100.0).unwrap();
        let grid = Arc::new(Grid::serial(GridParameters::new(5, 5, 10e3, 10e3).with_vertical(5, 1000.0)).unwrap());
        let mut store = FieldStore::new(Arc::clone(&grid));
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
        let mut sb = PrescribedFlow::new(0.0, 0.0);
        sb.init(&ctx, &mut store).unwrap();

        let stats = sb.update(&mut store).unwrap();
        assert!(!stats.solved);

        let thk = store.id(Var::Thickness).unwrap();
        store.access_mut(thk).unwrap().fill(100.0);
        let stats = sb.update(&mut store).unwrap();
        assert!(stats.solved);
        let (u, v) = store.access(store.id(Var::VelBase).unwrap()).unwrap().vec(2, 2);
        assert_relative_eq!(u * SECONDS_PER_YEAR, 100.0, max_relative = 1e-12);
        assert_eq!(v, 0.0);
        assert_relative_eq!(store.access(store.id(Var::U3).unwrap()).unwrap().at(1, 1, 4) * SECONDS_PER_YEAR, 100.0, max_relative = 1e-12);
    }
}
