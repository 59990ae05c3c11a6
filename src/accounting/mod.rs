//! Ice volume bookkeeping and the mass closure check.
//!
//! Each step the change in ice volume must match the fluxes that caused it:
//!
//! ```text
//! dV = SMB - basal melt - sub-shelf melt - calving - discard - div(Q) dt
//! ```
//!
//! The flux divergence sums to zero over a closed or periodic domain but
//! is kept in the budget so that outflow through open faces still closes.
//! A residual above `mass_closure_warn_tolerance` times the step's flux
//! scale is logged; above `mass_closure_error_tolerance` it is fatal.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::accounting::MassBudget;
//!
//! let budget = MassBudget {
//!     volume_change: 7.0,
//!     smb: 10.0,
//!     calving: 3.0,
//!     scale: 13.0,
//!     ..Default::default()
//! };
//! assert_eq!(budget.residual(), 0.0);
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::geometry::{CellType, cell_type};
use crate::masscont::{ContinuityFluxes, ice_volume};

/// Round-off allowance of a volume difference, relative to the volume.
const VOLUME_ROUNDOFF: f64 = 1e-13;

/// Volume terms of one step, m3 ice equivalent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MassBudget {
    pub volume_change: f64,
    pub smb: f64,
    pub basal_melt: f64,
    pub sub_shelf_melt: f64,
    pub calving: f64,
    pub discard: f64,
    pub flux_divergence: f64,
    /// Sum of the absolute values of the terms, cell by cell
    pub scale: f64,
}

impl MassBudget {
    /// Budget of a step from the mass continuity terms, the calved volume,
    /// and the measured volume change.
    pub fn from_fluxes(fluxes: &ContinuityFluxes, calving: f64, volume_change: f64) -> Self {
        Self {
            volume_change,
            smb: fluxes.smb,
            basal_melt: fluxes.basal_melt,
            sub_shelf_melt: fluxes.sub_shelf_melt,
            calving,
            discard: fluxes.discard,
            flux_divergence: fluxes.flux_divergence,
            scale: fluxes.scale + calving.abs(),
        }
    }

    /// Volume change implied by the fluxes.
    pub fn expected_change(&self) -> f64 {
        self.smb - self.basal_melt - self.sub_shelf_melt - self.calving - self.discard - self.flux_divergence
    }

    pub fn residual(&self) -> f64 {
        self.volume_change - self.expected_change()
    }

    fn accumulate(&mut self, step: &MassBudget) {
        self.volume_change += step.volume_change;
        self.smb += step.smb;
        self.basal_melt += step.basal_melt;
        self.sub_shelf_melt += step.sub_shelf_melt;
        self.calving += step.calving;
        self.discard += step.discard;
        self.flux_divergence += step.flux_divergence;
        self.scale += step.scale;
    }
}

/// One closure check.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClosureRecord {
    /// End of the step, s
    pub t: f64,
    /// m3
    pub residual: f64,
    /// `|residual| / scale`; zero for a step without fluxes
    pub relative: f64,
}

/// Ice volume and area at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Inventory {
    /// m3
    pub volume: f64,
    /// m2
    pub grounded_area: f64,
    /// m2
    pub floating_area: f64,
}

impl Inventory {
    /// Measure the ice in the store; `mask` must be current.
    pub fn measure(store: &FieldStore) -> Result<Self> {
        let grid = store.grid();
        let mask = store.access(store.id(Var::Mask)?)?;
        let (mut grounded, mut floating) = (0.0, 0.0);
        for (i, j) in grid.points() {
            match cell_type(mask.get(i, j)) {
                CellType::Grounded => grounded += 1.0,
                CellType::Floating => floating += 1.0,
                _ => {}
            }
        }
        let area = grid.cell_area();
        Ok(Self {
            volume: ice_volume(store)?,
            grounded_area: grid.sum(grounded)? * area,
            floating_area: grid.sum(floating)? * area,
        })
    }
}

/// Running totals of the mass budget.
#[derive(Clone, Debug)]
pub struct MassAccountant {
    warn_tolerance: f64,
    error_tolerance: f64,
    inventory: Inventory,
    totals: MassBudget,
    history: Vec<ClosureRecord>,
}

impl MassAccountant {
    pub fn new(warn_tolerance: f64, error_tolerance: f64) -> Self {
        Self {
            warn_tolerance,
            error_tolerance,
            inventory: Inventory::default(),
            totals: MassBudget::default(),
            history: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let warn = config.get_double("mass_closure_warn_tolerance")?;
        let error = config.get_double("mass_closure_error_tolerance")?;
        if warn < 0.0 || error < warn {
            return Err(IceError::config(format!(
                "mass closure tolerances must satisfy 0 <= warn ({}) <= error ({})",
                warn, error
            )));
        }
        Ok(Self::new(warn, error))
    }

    /// Take the initial inventory.
    pub fn start(&mut self, store: &FieldStore) -> Result<()> {
        self.inventory = Inventory::measure(store)?;
        debug!(volume = self.inventory.volume, "initial ice volume");
        Ok(())
    }

    /// Close the budget of the step ending at `t`.
    ///
    /// `calving` is the volume removed by calving policies, m3.
    pub fn record(&mut self, t: f64, fluxes: &ContinuityFluxes, calving: f64, store: &FieldStore) -> Result<MassBudget> {
        let now = Inventory::measure(store)?;
        let budget = MassBudget::from_fluxes(fluxes, calving, now.volume - self.inventory.volume);
        let reference = self.inventory.volume.abs().max(now.volume.abs());
        self.inventory = now;
        self.check(t, &budget, reference)?;
        self.totals.accumulate(&budget);
        Ok(budget)
    }

    fn check(&mut self, t: f64, budget: &MassBudget, volume: f64) -> Result<()> {
        let residual = budget.residual();
        let roundoff = VOLUME_ROUNDOFF * volume;
        let relative = if budget.scale > 0.0 { residual.abs() / budget.scale } else { 0.0 };
        self.history.push(ClosureRecord { t, residual, relative });

        let error_limit = self.error_tolerance * budget.scale + roundoff;
        if residual.abs() > error_limit {
            return Err(IceError::MassClosure {
                residual,
                tolerance: error_limit,
            });
        }
        if residual.abs() > self.warn_tolerance * budget.scale + roundoff {
            warn!(residual, relative, scale = budget.scale, "mass budget does not close");
        }
        Ok(())
    }

    pub fn volume(&self) -> f64 {
        self.inventory.volume
    }

    pub fn grounded_area(&self) -> f64 {
        self.inventory.grounded_area
    }

    pub fn floating_area(&self) -> f64 {
        self.inventory.floating_area
    }

    pub fn inventory(&self) -> Inventory {
        self.inventory
    }

    /// Cumulative budget since the start of the run.
    pub fn totals(&self) -> &MassBudget {
        &self.totals
    }

    pub fn history(&self) -> &[ClosureRecord] {
        &self.history
    }

    pub fn steps(&self) -> usize {
        self.history.len()
    }

    /// `(name, units, value)` samples for the scalar time series.
    pub fn series_values(&self, dt: f64) -> Vec<(&'static str, &'static str, f64)> {
        let t = &self.totals;
        vec![
            ("ivol", "m3", self.inventory.volume),
            ("iareag", "m2", self.inventory.grounded_area),
            ("iareaf", "m2", self.inventory.floating_area),
            ("dt", "years", crate::time::seconds_to_years(dt)),
            ("surface_ice_flux_cumulative", "m3", t.smb),
            ("grounded_basal_ice_flux_cumulative", "m3", -t.basal_melt),
            ("sub_shelf_ice_flux_cumulative", "m3", -t.sub_shelf_melt),
            ("discharge_flux_cumulative", "m3", -t.calving),
            ("discarded_ice_cumulative", "m3", t.discard),
            ("flux_divergence_cumulative", "m3", t.flux_divergence),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Constants;
    use crate::geometry::update_geometry;
    use crate::grid::test_grid;
    use approx::assert_relative_eq;

    fn store_with_ice(thickness: f64) -> FieldStore {
        let mut store = FieldStore::new(test_grid());
        for var in [Var::Thickness, Var::ThicknessRef, Var::Bed, Var::Surface, Var::Mask] {
            store.ensure(var).unwrap();
        }
        let thk = store.id(Var::Thickness).unwrap();
        store.access_mut(thk).unwrap().set(5, 5, thickness);
        let bed = store.id(Var::Bed).unwrap();
        {
            let mut b = store.access_mut(bed).unwrap();
            b.fill(100.0);
            b.set(5, 5, -1000.0);
        }
        update_geometry(&mut store, &Constants::default(), 0.0).unwrap();
        store
    }

    fn set_thickness(store: &mut FieldStore, value: f64) {
        let thk = store.id(Var::Thickness).unwrap();
        store.access_mut(thk).unwrap().set(5, 5, value);
        update_geometry(store, &Constants::default(), 0.0).unwrap();
    }

    #[test]
    fn test_inventory() {
        let store = store_with_ice(100.0);
        let inv = Inventory::measure(&store).unwrap();
        let area = store.grid().cell_area();
        assert_relative_eq!(inv.volume, 100.0 * area);
        assert_eq!(inv.grounded_area, 0.0);
        assert_relative_eq!(inv.floating_area, area);
    }

    #[test]
    fn test_closed_budget_accumulates() {
        let mut store = store_with_ice(100.0);
        let area = store.grid().cell_area();
        let mut accountant = MassAccountant::new(1e-9, 1e-6);
        accountant.start(&store).unwrap();

        set_thickness(&mut store, 130.0);
        let fluxes = ContinuityFluxes {
            smb: 40.0 * area,
            sub_shelf_melt: 10.0 * area,
            scale: 50.0 * area,
            ..Default::default()
        };
        let budget = accountant.record(1.0, &fluxes, 0.0, &store).unwrap();
        assert_relative_eq!(budget.volume_change, 30.0 * area);
        assert!(budget.residual().abs() <= 1e-9 * budget.scale);

        set_thickness(&mut store, 0.0);
        accountant.record(2.0, &ContinuityFluxes::default(), 130.0 * area, &store).unwrap();
        assert_eq!(accountant.steps(), 2);
        assert_relative_eq!(accountant.totals().calving, 130.0 * area);
        assert_relative_eq!(accountant.totals().volume_change, -100.0 * area);
        assert_eq!(accountant.volume(), 0.0);
    }

    #[test]
    fn test_open_budget_is_fatal() {
        let mut store = store_with_ice(100.0);
        let area = store.grid().cell_area();
        let mut accountant = MassAccountant::new(1e-9, 1e-6);
        accountant.start(&store).unwrap();

        set_thickness(&mut store, 101.0);
        let fluxes = ContinuityFluxes {
            smb: 2.0 * area,
            scale: 2.0 * area,
            ..Default::default()
        };
        let err = accountant.record(1.0, &fluxes, 0.0, &store).unwrap_err();
        assert!(matches!(err, IceError::MassClosure { .. }));
        assert_relative_eq!(accountant.history()[0].relative, 0.5, max_relative = 1e-9);
    }

    #[test]
    fn test_small_residual_only_warns() {
        let mut store = store_with_ice(100.0);
        let area = store.grid().cell_area();
        let mut accountant = MassAccountant::new(1e-9, 1e-3);
        accountant.start(&store).unwrap();

        set_thickness(&mut store, 101.0);
        let fluxes = ContinuityFluxes {
            smb: 1.0001 * area,
            scale: 1.0001 * area,
            ..Default::default()
        };
        assert!(accountant.record(1.0, &fluxes, 0.0, &store).is_ok());
    }

    #[test]
    fn test_series_values() {
        let store = store_with_ice(10.0);
        let mut accountant = MassAccountant::new(1e-9, 1e-6);
        accountant.start(&store).unwrap();
        let values = accountant.series_values(crate::types::SECONDS_PER_YEAR);
        let names: Vec<&str> = values.iter().map(|v| v.0).collect();
        assert_eq!(&names[..4], &["ivol", "iareag", "iareaf", "dt"]);
        assert_relative_eq!(values[3].2, 1.0);
    }

    #[test]
    fn test_tolerances_validated() {
        let mut config = Config::defaults();
        config.set_double("mass_closure_error_tolerance", 1e-12).unwrap();
        assert!(MassAccountant::from_config(&config).is_err());
    }
}
