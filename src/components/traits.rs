//! Capability traits of the physical components.
//!
//! Every component implements [`Component`], the small uniform surface
//! the executor and the dependency graph rely on. Each kind then adds
//! its own update contract on a separate trait.

use std::sync::Arc;

use crate::config::{Config, Constants};
use crate::error::Result;
use crate::fields::FieldStore;
use crate::grid::Grid;
use crate::io::Dataset;
use crate::time::ModelTime;

// =============================================================================
// Init context and time step advice
// =============================================================================

/// Everything a component may consult while initializing.
///
/// Components read configuration here and only here.
pub struct InitContext<'a> {
    pub config: &'a Config,
    pub constants: &'a Constants,
    pub time: &'a ModelTime,
    pub grid: &'a Arc<Grid>,
    /// Input file, when initializing from one
    pub input: Option<&'a Dataset>,
    /// True when the input holds partial data
    pub bootstrap: bool,
}

/// Advisory time step limit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaxTimestep {
    /// Seconds; infinite when unconstrained
    pub dt: f64,
    /// Whether the planner must honor it
    pub restrict: bool,
}

impl MaxTimestep {
    pub fn unrestricted() -> Self {
        Self {
            dt: f64::INFINITY,
            restrict: false,
        }
    }

    pub fn new(dt: f64) -> Self {
        Self { dt, restrict: true }
    }

    /// The tighter of two limits.
    pub fn min(self, other: MaxTimestep) -> MaxTimestep {
        match (self.restrict, other.restrict) {
            (true, true) => if other.dt < self.dt { other } else { self },
            (true, false) => self,
            (false, _) => other,
        }
    }

    /// Limit as seen by the planner.
    pub fn effective(&self) -> f64 {
        if self.restrict { self.dt } else { f64::INFINITY }
    }
}

impl Default for MaxTimestep {
    fn default() -> Self {
        Self::unrestricted()
    }
}

// =============================================================================
// Component
// =============================================================================

/// The uniform surface shared by all components.
pub trait Component {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Read options and register or bind fields.
    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()>;

    /// Largest step this component can take from time `t`.
    fn max_timestep(&self, _t: f64) -> MaxTimestep {
        MaxTimestep::unrestricted()
    }

    /// Field names read during `update`.
    fn declare_inputs(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Field names written during `update`.
    fn declare_outputs(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Extra diagnostic fields this component registers in the store.
    fn diagnostics(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

// =============================================================================
// Couplers
// =============================================================================

/// Surface mass balance and ice surface temperature.
///
/// Writes `climatic_mass_balance` and `ice_surface_temp`.
pub trait SurfaceModel: Component {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<()>;
}

/// Near-surface air temperature and precipitation.
pub trait AtmosphereModel: Component {
    fn update(&mut self, t: f64, dt: f64, store: &FieldStore) -> Result<()>;

    /// Mean annual air temperature at `(i, j)`, K.
    fn mean_annual_temp(&self, i: isize, j: isize) -> f64;

    /// Precipitation at `(i, j)`, m s-1 ice equivalent.
    fn mean_precipitation(&self, i: isize, j: isize) -> f64;

    /// Air temperature at `(i, j)` at each of `times`, K.
    fn temp_time_series(&self, i: isize, j: isize, times: &[f64], out: &mut [f64]);
}

/// Sea level and sub-shelf boundary conditions.
///
/// Writes `shelfbtemp` and `shelfbmassflux`.
pub trait OceanModel: Component {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<()>;

    /// Sea level elevation, m.
    fn sea_level(&self) -> f64;
}

// =============================================================================
// Ice dynamics and thermodynamics
// =============================================================================

/// Summary of one stress balance solve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StressBalanceStats {
    /// Largest SIA diffusivity, m2 s-1
    pub d_max: f64,
    /// False when the solve was skipped (no ice)
    pub solved: bool,
}

/// Ice velocity from geometry and temperature.
pub trait StressBalance: Component {
    fn update(&mut self, store: &mut FieldStore) -> Result<StressBalanceStats>;
}

/// Summary of one energy step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnergyStats {
    /// Ice temperatures below the allowed minimum
    pub low_temp_count: usize,
    /// Columns where vertical advection broke the CFL bound
    pub cfl_violations: usize,
    /// Water drained to the base, m3 water equivalent
    pub drained: f64,
}

/// Enthalpy of the ice and the basal melt rate.
pub trait EnergyModel: Component {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<EnergyStats>;
}

/// Age of the ice.
pub trait AgeModel: Component {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<()>;
}

/// Temperature of the bedrock thermal layer and the heat flux it
/// delivers to the ice base.
pub trait BedThermal: Component {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<()>;
}

// =============================================================================
// Basal processes and geometry
// =============================================================================

/// Summary of one hydrology update, all global sums.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HydrologyStats {
    pub substeps: usize,
    /// Water volume leaving through ice-free land, m3
    pub lost_to_land: f64,
    /// Water volume leaving into the ocean, m3
    pub lost_to_ocean: f64,
    /// Water volume added by clipping negative thickness, m3
    pub negative_gain: f64,
    /// Water volume removed in the null strip, m3
    pub null_strip_loss: f64,
}

/// Subglacial water.
pub trait Hydrology: Component {
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<HydrologyStats>;
}

/// Basal yield stress.
pub trait YieldStress: Component {
    fn update(&mut self, t: f64, dt: f64, sea_level: f64, store: &mut FieldStore) -> Result<()>;
}

/// Ice removed by a calving policy, summed over this rank's cells.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CalvingStats {
    /// Thickness removed, summed over owned cells, m (thk and Href)
    pub removed: f64,
    pub cells: usize,
}

/// A calving policy.
pub trait CalvingModel: Component {
    fn update(&mut self, t: f64, dt: f64, sea_level: f64, store: &mut FieldStore) -> Result<CalvingStats>;
}

/// Bed elevation changes.
pub trait BedDeformation: Component {
    /// Returns true if the bed changed.
    fn update(&mut self, t: f64, dt: f64, store: &mut FieldStore) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_timestep_min() {
        let free = MaxTimestep::unrestricted();
        let a = MaxTimestep::new(10.0);
        let b = MaxTimestep::new(5.0);
        assert_eq!(free.min(a), a);
        assert_eq!(a.min(free), a);
        assert_eq!(a.min(b), b);
        assert_eq!(free.effective(), f64::INFINITY);
        let advisory = MaxTimestep { dt: 1.0, restrict: false };
        assert_eq!(advisory.effective(), f64::INFINITY);
    }
}
