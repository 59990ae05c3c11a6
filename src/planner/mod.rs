//! Choice of the global time step.
//!
//! Every step takes the tightest of these bounds:
//!
//! | Bound | Reason |
//! |---|---|
//! | `maximum_time_step_years` | `m` |
//! | `1 / max(|u|/dx + |v|/dy)` over icy columns | `c` |
//! | `1 / max(|u_b|/dx + |v_b|/dy)` over icy cells | `u` |
//! | `alpha / ((dx^-2 + dy^-2) D_max)` | `d` |
//! | component advice | `T`, `b`, `a`, `k`, `h`, `o` |
//! | next output event | `v` |
//! | end of the run | `e` |
//!
//! A positive `fixed_time_step_years` replaces all of the adaptive bounds
//! (reason `f`); end and event clamping still apply.
//!
//! [`StepPlanner::plan`] is a pure function of its [`PlanInput`], so planning
//! twice without a change of state gives the same decision.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::planner::{PlanInput, StepPlanner, StepReason};
//!
//! let year = icesheet_rs::types::SECONDS_PER_YEAR;
//! let planner = StepPlanner::new(10.0 * year);
//! let decision = planner
//!     .plan(&PlanInput::new(0.0, 25.0 * year, 1e4, 1e4))
//!     .unwrap();
//! assert_eq!(decision.reason, StepReason::Max);
//! assert_eq!(decision.dt, 10.0 * year);
//! ```

use std::fmt;

use tracing::trace;

use crate::components::{MaxTimestep, Slot};
use crate::config::Config;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::time::time_tolerance;

/// Part of `dt_adv / dt_diff` used for the skip count.
const SKIP_SAFETY: f64 = 0.95;

/// What limited the step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepReason {
    /// `maximum_time_step_years`
    Max,
    /// End of the run
    End,
    /// Next output event
    Event,
    /// Horizontal advection in energy and age
    Cfl3d,
    /// Sliding advection in mass continuity
    Cfl2d,
    /// Explicit SIA diffusion
    Diffusive,
    /// `fixed_time_step_years`
    Forced,
    Energy,
    BedThermal,
    /// Climate forcing schedule
    Climate,
    Calving,
    Hydrology,
    /// Any other component advice
    Other,
}

impl StepReason {
    /// Single-letter tag used in the per-step log line.
    pub fn letter(self) -> char {
        match self {
            Self::Max => 'm',
            Self::End => 'e',
            Self::Event => 'v',
            Self::Cfl3d => 'c',
            Self::Cfl2d => 'u',
            Self::Diffusive => 'd',
            Self::Forced => 'f',
            Self::Energy => 'T',
            Self::BedThermal => 'b',
            Self::Climate => 'a',
            Self::Calving => 'k',
            Self::Hydrology => 'h',
            Self::Other => 'o',
        }
    }

    /// True for bounds that do not come from ice dynamics; the skip
    /// counter is cut to at most one step after them.
    pub fn limits_skip(self) -> bool {
        matches!(self, Self::Max | Self::End | Self::Event)
    }
}

impl fmt::Display for StepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl From<Slot> for StepReason {
    fn from(slot: Slot) -> Self {
        match slot {
            Slot::Surface | Slot::Ocean => Self::Climate,
            Slot::Energy | Slot::Age => Self::Energy,
            Slot::BedThermal => Self::BedThermal,
            Slot::Hydrology => Self::Hydrology,
            Slot::Calving => Self::Calving,
            Slot::StressBalance | Slot::YieldStress | Slot::MassContinuity | Slot::BedDeformation => Self::Other,
        }
    }
}

// =============================================================================
// Advective rates
// =============================================================================

/// Largest advective rates, s-1. Their inverses are the CFL bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AdvectiveRates {
    /// `max(|u|/dx + |v|/dy)` over the ice-filled levels of icy columns
    pub cfl3d: f64,
    /// `max(|u_b|/dx + |v_b|/dy)` over icy cells
    pub cfl2d: f64,
}

impl AdvectiveRates {
    fn bound(rate: f64) -> f64 {
        if rate > 0.0 { 1.0 / rate } else { f64::INFINITY }
    }

    /// CFL bound of energy and age advection, s.
    pub fn dt_cfl3d(&self) -> f64 {
        Self::bound(self.cfl3d)
    }

    /// CFL bound of sliding advection, s.
    pub fn dt_cfl2d(&self) -> f64 {
        Self::bound(self.cfl2d)
    }
}

/// Global maxima of the advective rates of the current velocity field.
pub fn advective_rates(store: &FieldStore) -> Result<AdvectiveRates> {
    let grid = store.grid();
    let (dx, dy) = (grid.dx(), grid.dy());
    let (thk, u3, v3, velbase) = (
        store.access(store.id(Var::Thickness)?)?,
        store.access(store.id(Var::U3)?)?,
        store.access(store.id(Var::V3)?)?,
        store.access(store.id(Var::VelBase)?)?,
    );
    let (mut cfl3d, mut cfl2d) = (0.0_f64, 0.0_f64);
    for (i, j) in grid.points() {
        let h = thk.get(i, j);
        if h <= 0.0 {
            continue;
        }
        let ks = grid.k_below_height(h);
        let (u, v) = (u3.column(i, j), v3.column(i, j));
        for k in 0..=ks {
            cfl3d = cfl3d.max(u[k].abs() / dx + v[k].abs() / dy);
        }
        let (ub, vb) = velbase.vec(i, j);
        cfl2d = cfl2d.max(ub.abs() / dx + vb.abs() / dy);
    }
    Ok(AdvectiveRates {
        cfl3d: grid.max(cfl3d)?,
        cfl2d: grid.max(cfl2d)?,
    })
}

// =============================================================================
// Planner
// =============================================================================

/// State of the model seen by the planner.
#[derive(Clone, Copy, Debug)]
pub struct PlanInput<'a> {
    /// Current time, s
    pub t: f64,
    /// End of the run, s
    pub t_end: f64,
    /// Next output event after `t`, s
    pub next_event: Option<f64>,
    pub rates: AdvectiveRates,
    /// Largest SIA diffusivity, m2 s-1
    pub d_max: f64,
    pub dx: f64,
    pub dy: f64,
    /// Restricting component advice
    pub advisories: &'a [(Slot, MaxTimestep)],
}

impl<'a> PlanInput<'a> {
    /// No velocities, no events, no advice.
    pub fn new(t: f64, t_end: f64, dx: f64, dy: f64) -> Self {
        Self {
            t,
            t_end,
            next_event: None,
            rates: AdvectiveRates::default(),
            d_max: 0.0,
            dx,
            dy,
            advisories: &[],
        }
    }

    pub fn with_event(mut self, next_event: Option<f64>) -> Self {
        self.next_event = next_event;
        self
    }

    pub fn with_rates(mut self, rates: AdvectiveRates) -> Self {
        self.rates = rates;
        self
    }

    pub fn with_d_max(mut self, d_max: f64) -> Self {
        self.d_max = d_max;
        self
    }

    pub fn with_advisories<'b>(self, advisories: &'b [(Slot, MaxTimestep)]) -> PlanInput<'b> {
        PlanInput {
            t: self.t,
            t_end: self.t_end,
            next_event: self.next_event,
            rates: self.rates,
            d_max: self.d_max,
            dx: self.dx,
            dy: self.dy,
            advisories,
        }
    }
}

/// Result of one planning cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepDecision {
    /// s
    pub dt: f64,
    pub reason: StepReason,
    /// Mass continuity steps to run per energy step, minus one
    pub skip_count: usize,
    /// Diffusive bound, s; infinite without SIA flow
    pub dt_diffusive: f64,
}

/// Tightest bound seen so far.
struct Bound {
    dt: f64,
    reason: StepReason,
}

impl Bound {
    fn new(dt: f64, reason: StepReason) -> Self {
        Self { dt, reason }
    }

    fn tighten(&mut self, candidate: f64, reason: StepReason) {
        if candidate < self.dt {
            self.dt = candidate;
            self.reason = reason;
        }
    }
}

/// Chooses the global step from stability bounds and component advice.
#[derive(Clone, Debug)]
pub struct StepPlanner {
    /// s
    max_dt: f64,
    /// s
    fixed_dt: Option<f64>,
    ratio: f64,
    /// s
    floor: f64,
    skip_max: Option<usize>,
    cfl3d: bool,
    mass_continuity: bool,
}

impl StepPlanner {
    /// Adaptive planner with a maximum step `max_dt` (s) and default bounds.
    pub fn new(max_dt: f64) -> Self {
        Self {
            max_dt,
            fixed_dt: None,
            ratio: 0.12,
            floor: crate::time::years_to_seconds(1e-6),
            skip_max: None,
            cfl3d: true,
            mass_continuity: true,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let max_dt = config.get_years_as_seconds("maximum_time_step_years")?;
        if max_dt <= 0.0 {
            return Err(IceError::config("maximum_time_step_years must be positive"));
        }
        let fixed = config.get_years_as_seconds("fixed_time_step_years")?;
        let ratio = config.get_double("adaptive_timestepping_ratio")?;
        if ratio <= 0.0 {
            return Err(IceError::config("adaptive_timestepping_ratio must be positive"));
        }
        let mut planner = Self::new(max_dt)
            .with_ratio(ratio)
            .with_floor(config.get_years_as_seconds("timestep_floor_years")?)
            .with_cfl3d(config.get_flag("do_energy")? || config.get_flag("do_age")?)
            .with_mass_continuity(config.get_flag("do_mass_conserve")?);
        if fixed > 0.0 {
            planner = planner.with_fixed_dt(fixed);
        }
        if config.get_flag("do_skip")? {
            planner = planner.with_skip(config.get_usize("skip_max")?);
        }
        Ok(planner)
    }

    /// Use `dt` (s) for every step.
    pub fn with_fixed_dt(mut self, dt: f64) -> Self {
        self.fixed_dt = Some(dt);
        self
    }

    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor;
        self
    }

    /// Allow up to `skip_max` extra mass continuity steps per energy step.
    pub fn with_skip(mut self, skip_max: usize) -> Self {
        self.skip_max = Some(skip_max);
        self
    }

    /// Honor the 3-D CFL bound (energy or age is solved).
    pub fn with_cfl3d(mut self, on: bool) -> Self {
        self.cfl3d = on;
        self
    }

    /// Honor the sliding CFL and diffusive bounds (mass continuity is solved).
    pub fn with_mass_continuity(mut self, on: bool) -> Self {
        self.mass_continuity = on;
        self
    }

    pub fn max_dt(&self) -> f64 {
        self.max_dt
    }

    pub fn skip_enabled(&self) -> bool {
        self.skip_max.is_some()
    }

    /// Diffusive bound for the largest diffusivity `d_max`, s.
    pub fn diffusive_bound(&self, d_max: f64, dx: f64, dy: f64) -> f64 {
        if d_max <= 0.0 {
            return f64::INFINITY;
        }
        self.ratio / ((dx.powi(-2) + dy.powi(-2)) * d_max)
    }

    /// Choose the next step.
    pub fn plan(&self, input: &PlanInput<'_>) -> Result<StepDecision> {
        let remaining = input.t_end - input.t;
        let dt_diffusive = self.diffusive_bound(input.d_max, input.dx, input.dy);

        let mut step = match self.fixed_dt {
            Some(fixed) => Bound::new(fixed, StepReason::Forced),
            None => Bound::new(self.max_dt, StepReason::Max),
        };

        let mut skip_count = 0;
        if self.fixed_dt.is_none() {
            if self.cfl3d {
                step.tighten(input.rates.dt_cfl3d(), StepReason::Cfl3d);
            }
            if self.mass_continuity {
                step.tighten(input.rates.dt_cfl2d(), StepReason::Cfl2d);
                if let Some(skip_max) = self.skip_max
                    && dt_diffusive.is_finite()
                    && step.dt.is_finite()
                {
                    let ratio = (SKIP_SAFETY * step.dt / dt_diffusive).floor();
                    skip_count = (ratio.max(0.0) as usize).min(skip_max);
                }
                step.tighten(dt_diffusive, StepReason::Diffusive);
            }
            for &(slot, advice) in input.advisories {
                step.tighten(advice.effective(), StepReason::from(slot));
            }
        }
        if let Some(event) = input.next_event
            && event > input.t
        {
            step.tighten(event - input.t, StepReason::Event);
        }
        step.tighten(remaining.max(0.0), StepReason::End);
        // a sliver left before the end goes into this step
        if remaining > step.dt && remaining - step.dt < time_tolerance(input.t.abs().max(input.t_end.abs())) {
            step.dt = remaining;
        }

        let Bound { dt, reason } = step;
        if reason.limits_skip() {
            skip_count = skip_count.min(1);
        }
        if dt < self.floor && reason != StepReason::End {
            return Err(IceError::TimestepFloor { dt, floor: self.floor });
        }
        trace!(dt, reason = %reason, skip_count, dt_diffusive, "planned step");
        Ok(StepDecision {
            dt,
            reason,
            skip_count,
            dt_diffusive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::test_grid;
    use crate::types::SECONDS_PER_YEAR;
    use approx::assert_relative_eq;

    const YEAR: f64 = SECONDS_PER_YEAR;
    const DX: f64 = 20e3;

    fn input(t: f64, t_end: f64) -> PlanInput<'static> {
        PlanInput::new(t, t_end, DX, DX)
    }

    #[test]
    fn test_end_and_event_clamp() {
        let planner = StepPlanner::new(10.0 * YEAR);
        let d = planner.plan(&input(95.0 * YEAR, 100.0 * YEAR)).unwrap();
        assert_eq!(d.reason, StepReason::End);
        assert_relative_eq!(d.dt, 5.0 * YEAR, max_relative = 1e-12);

        let d = planner
            .plan(&input(0.0, 100.0 * YEAR).with_event(Some(3.0 * YEAR)))
            .unwrap();
        assert_eq!(d.reason, StepReason::Event);
        assert_relative_eq!(d.dt, 3.0 * YEAR);
    }

    #[test]
    fn test_diffusive_bound_and_skip() {
        let planner = StepPlanner::new(10.0 * YEAR).with_skip(10);
        let d_max = 1.0;
        let expected = 0.12 / (2.0 / (DX * DX) * d_max);
        let d = planner.plan(&input(0.0, 1e3 * YEAR).with_d_max(d_max)).unwrap();
        assert_eq!(d.reason, StepReason::Diffusive);
        assert_relative_eq!(d.dt, expected, max_relative = 1e-12);
        let count = (0.95 * 10.0 * YEAR / expected).floor() as usize;
        assert_eq!(d.skip_count, count.min(10));
    }

    #[test]
    fn test_cfl_reasons() {
        let planner = StepPlanner::new(100.0 * YEAR);
        let rates = AdvectiveRates {
            cfl3d: 1.0 / (2.0 * YEAR),
            cfl2d: 1.0 / (3.0 * YEAR),
        };
        let d = planner.plan(&input(0.0, 1e3 * YEAR).with_rates(rates)).unwrap();
        assert_eq!(d.reason, StepReason::Cfl3d);
        assert_relative_eq!(d.dt, 2.0 * YEAR, max_relative = 1e-12);

        let d = planner
            .clone()
            .with_cfl3d(false)
            .plan(&input(0.0, 1e3 * YEAR).with_rates(rates))
            .unwrap();
        assert_eq!(d.reason, StepReason::Cfl2d);
    }

    #[test]
    fn test_component_advice() {
        let planner = StepPlanner::new(10.0 * YEAR);
        let advice = [
            (Slot::BedThermal, MaxTimestep::new(4.0 * YEAR)),
            (Slot::Surface, MaxTimestep::new(2.0 * YEAR)),
            (Slot::Hydrology, MaxTimestep::unrestricted()),
        ];
        let d = planner.plan(&input(0.0, 1e3 * YEAR).with_advisories(&advice)).unwrap();
        assert_eq!(d.reason, StepReason::Climate);
        assert_eq!(d.reason.letter(), 'a');
    }

    #[test]
    fn test_sliver_before_end_is_folded_in() {
        let end = 100.0 * YEAR;
        let planner = StepPlanner::new(10.0 * YEAR).with_fixed_dt(YEAR);
        let d = planner.plan(&input(end - YEAR - 1e-4, end)).unwrap();
        assert_eq!(d.reason, StepReason::Forced);
        assert_relative_eq!(d.dt, YEAR + 1e-4, max_relative = 1e-12);

        let d = planner.plan(&input(end - 2.0 * YEAR, end)).unwrap();
        assert_eq!(d.dt, YEAR);
    }

    #[test]
    fn test_fractional_fixed_steps_reach_end_exactly() {
        use crate::time::{Calendar, Date, ModelTime};

        let planner = StepPlanner::new(10.0 * YEAR).with_fixed_dt(0.1 * YEAR);
        let mut time = ModelTime::new(Calendar::Day365, Date::ymd(1, 1, 1), 0.0, 100.0 * YEAR).unwrap();
        let mut n = 0;
        while !time.is_done() {
            let d = planner.plan(&input(time.current(), time.end())).unwrap();
            time.advance(d.dt);
            n += 1;
        }
        assert_eq!(n, 1000);
        assert_eq!(time.current(), time.end());
    }

    #[test]
    fn test_forced_ignores_stability() {
        let planner = StepPlanner::new(10.0 * YEAR).with_fixed_dt(0.5 * YEAR);
        let d = planner.plan(&input(0.0, 1e3 * YEAR).with_d_max(1e9)).unwrap();
        assert_eq!(d.reason, StepReason::Forced);
        assert_relative_eq!(d.dt, 0.5 * YEAR);
    }

    #[test]
    fn test_plan_is_idempotent_and_monotone() {
        let advice = [(Slot::Calving, MaxTimestep::unrestricted())];
        let base = input(0.0, 1e4 * YEAR).with_d_max(1e-3).with_advisories(&advice);
        let planner = StepPlanner::new(1.0 * YEAR);
        assert_eq!(planner.plan(&base).unwrap(), planner.plan(&base).unwrap());

        let mut last = 0.0;
        for max_years in [0.1, 1.0, 10.0, 100.0, 1000.0] {
            let dt = StepPlanner::new(max_years * YEAR).plan(&base).unwrap().dt;
            assert!(dt >= last);
            last = dt;
        }
    }

    #[test]
    fn test_floor() {
        let planner = StepPlanner::new(10.0 * YEAR);
        let err = planner.plan(&input(0.0, 1e3 * YEAR).with_d_max(1e12)).unwrap_err();
        assert!(matches!(err, IceError::TimestepFloor { .. }));
        // a tiny final step is fine
        let d = planner.plan(&input(0.0, 1e-9 * YEAR)).unwrap();
        assert_eq!(d.reason, StepReason::End);
    }

    #[test]
    fn test_advective_rates() {
        let grid = test_grid();
        let mut store = FieldStore::new(grid.clone());
        let thk = store.ensure(Var::Thickness).unwrap();
        let u3 = store.ensure(Var::U3).unwrap();
        store.ensure(Var::V3).unwrap();
        let velbase = store.ensure(Var::VelBase).unwrap();
        store.access_mut(thk).unwrap().set(4, 4, 1000.0);
        {
            let mut u = store.access_mut(u3).unwrap();
            u.column_mut(4, 4).fill(2.0);
            // ice-free column and levels above the surface do not count
            u.column_mut(5, 5).fill(50.0);
            let top = grid.mz() - 1;
            u.set_at(4, 4, top, 40.0);
        }
        store.access_mut(velbase).unwrap().set_vec(4, 4, (0.0, -1.0));
        let rates = advective_rates(&store).unwrap();
        assert_relative_eq!(rates.cfl3d, 2.0 / grid.dx(), max_relative = 1e-12);
        assert_relative_eq!(rates.cfl2d, 1.0 / grid.dy(), max_relative = 1e-12);
    }
}
