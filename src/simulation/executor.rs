//! One coupled step of the model.
//!
//! The order within a step is fixed:
//!
//! 1. start-of-step hooks
//! 2. stress balance on the start-of-step geometry
//! 3. time step plan
//! 4. surface and ocean couplers over `[t, t + dt]`
//! 5. energy and age (unless skipped)
//! 6. bedrock thermal layer, hydrology, yield stress
//! 7. mass continuity and calving
//! 8. bed deformation and derived geometry
//! 9. accounting, clock, scheduled output, end-of-step hooks, signals

use tracing::{debug, info, trace};

use super::{Model, SignalRequest};
use crate::accounting::MassBudget;
use crate::error::{IceError, Result};
use crate::fields::Var;
use crate::geometry::update_geometry;
use crate::io::history_entry;
use crate::masscont::ContinuityFluxes;
use crate::planner::{PlanInput, StepReason, advective_rates};
use crate::time::Channel;
use crate::types::SECONDS_PER_YEAR;

/// What one step did.
#[derive(Clone, Debug)]
pub struct StepReport {
    /// Start of the step, seconds
    pub t: f64,
    /// Length of the step, seconds
    pub dt: f64,
    pub reason: StepReason,
    /// Skip counter after the step
    pub skip: usize,
    /// Whether energy and age ran this step
    pub energy_step: bool,
    /// Whether the stress balance solved (false on an ice-free domain)
    pub solved: bool,
    pub budget: MassBudget,
    /// Save or stop request raised during the step
    pub request: Option<SignalRequest>,
}

impl Model {
    /// Advance the coupled system by one step.
    pub fn step(&mut self) -> Result<StepReport> {
        let t = self.time.current();
        let mut request = self.hooks.run_at_start(&mut self.store, &self.time)?;

        // Velocities on the start-of-step geometry.
        let mut d_max = 0.0;
        let mut solved = false;
        if self.components.stress_balance.begin_update(t, 0.0)? {
            let stats = self.components.stress_balance.get_mut().update(&mut self.store)?;
            d_max = stats.d_max;
            solved = stats.solved;
        }

        let rates = advective_rates(&self.store)?;
        let advisories = self.components.max_timesteps(t);
        let tol = self.time.tolerance();
        let next_event = self.events.next_after(t + tol);
        let input = PlanInput::new(t, self.time.end(), self.grid.dx(), self.grid.dy())
            .with_event(next_event)
            .with_rates(rates)
            .with_d_max(d_max)
            .with_advisories(&advisories);
        let decision = self.planner.plan(&input)?;
        let dt = decision.dt;
        let t_new = t + dt;

        if self.planner.skip_enabled() && self.skip.countdown == 0 {
            self.skip.countdown = decision.skip_count;
        }
        if decision.reason.limits_skip() && self.skip.countdown > 1 {
            self.skip.countdown = 1;
        }

        // Climate held constant through the step.
        if self.components.surface.begin_update(t, dt)? {
            self.components.surface.get_mut().update(t, dt, &mut self.store)?;
        }
        if self.components.ocean.begin_update(t, dt)? {
            self.components.ocean.get_mut().update(t, dt, &mut self.store)?;
        }
        let sea_level = self.components.ocean.get().sea_level();

        let ending = t_new >= self.time.end() - tol;
        let energy_step = self.skip.countdown == 0 || ending;
        if energy_step {
            let (t0, dt_energy) = (self.skip.energy_t0, t_new - self.skip.energy_t0);
            if let Some(energy) = &mut self.components.energy
                && energy.begin_update(t0, dt_energy)?
            {
                let stats = energy.get_mut().update(t0, dt_energy, &mut self.store)?;
                if stats.cfl_violations > 0 {
                    debug!(columns = stats.cfl_violations, "vertical advection CFL violated");
                }
            }
            if let Some(age) = &mut self.components.age
                && age.begin_update(t0, dt_energy)?
            {
                age.get_mut().update(t0, dt_energy, &mut self.store)?;
            }
            self.skip.energy_t0 = t_new;
        }

        if self.components.bed_thermal.begin_update(t, dt)? {
            self.components.bed_thermal.get_mut().update(t, dt, &mut self.store)?;
        }
        if self.components.hydrology.begin_update(t, dt)? {
            let stats = self.components.hydrology.get_mut().update(t, dt, &mut self.store)?;
            trace!(substeps = stats.substeps, lost_to_ocean = stats.lost_to_ocean, "hydrology");
        }
        if self.components.yield_stress.begin_update(t, dt)? {
            self.components
                .yield_stress
                .get_mut()
                .update(t, dt, sea_level, &mut self.store)?;
        }

        let mut fluxes = ContinuityFluxes::default();
        if let Some(mc) = &mut self.components.mass_continuity
            && mc.begin_update(t, dt)?
        {
            fluxes = mc.get_mut().step(dt, &mut self.store)?;
        }
        let mut removed = 0.0;
        for calving in &mut self.components.calving {
            if calving.begin_update(t, dt)? {
                removed += calving.get_mut().update(t, dt, sea_level, &mut self.store)?.removed;
            }
        }
        let calved = self.grid.sum(removed)? * self.grid.cell_area();
        self.skip.countdown = self.skip.countdown.saturating_sub(1);

        if let Some(beddef) = &mut self.components.bed_deformation
            && beddef.begin_update(t, dt)?
            && beddef.get_mut().update(t, dt, &mut self.store)?
        {
            debug!(year = t_new / SECONDS_PER_YEAR, "bed elevation updated");
        }
        update_geometry(&mut self.store, &self.constants, sea_level)?;
        self.check_thickness()?;

        let budget = self.accountant.record(t_new, &fluxes, calved, &self.store)?;
        self.time.advance(dt);
        self.write_due_output(t, t_new, dt)?;

        if let Some(r) = self.hooks.run_at_end(&mut self.store, &self.time)? {
            request = strongest(request, Some(r));
        }
        request = strongest(request, self.signals.take());

        info!(
            reason = %decision.reason.letter(),
            year = self.time.year(),
            dt_years = dt / SECONDS_PER_YEAR,
            skip = self.skip.countdown,
            volume = self.accountant.volume(),
            area = self.accountant.grounded_area() + self.accountant.floating_area(),
            "step"
        );

        Ok(StepReport {
            t,
            dt,
            reason: decision.reason,
            skip: self.skip.countdown,
            energy_step,
            solved,
            budget,
            request,
        })
    }

    /// Ice thicker than the computational box is fatal.
    fn check_thickness(&self) -> Result<()> {
        let thk = self.store.access(self.store.id(Var::Thickness)?)?;
        let mut worst = (0, 0, 0.0);
        for (i, j) in self.grid.points() {
            let h = thk.get(i, j);
            if h > worst.2 {
                worst = (i, j, h);
            }
        }
        let lz = self.grid.lz();
        if self.grid.max(worst.2)? > lz {
            return Err(IceError::ThicknessExceedsGrid {
                i: worst.0,
                j: worst.1,
                thickness: worst.2,
                lz,
            });
        }
        Ok(())
    }

    /// Flush snapshots, extras, and time series due in `(t0, t1]`.
    fn write_due_output(&mut self, t0: f64, t1: f64, dt: f64) -> Result<()> {
        let tol = self.time.tolerance();
        for t in self.events.due(Channel::Snapshots, t0, t1 + tol) {
            let prefix = self.output.save_prefix.clone();
            let path = self.output.timestamped(&prefix, t / SECONDS_PER_YEAR);
            self.save(&path, &format!("snapshot at year {:.3}", t / SECONDS_PER_YEAR))?;
        }
        if !self.events.due(Channel::Extras, t0, t1 + tol).is_empty()
            && let Some(extras) = &mut self.extras
        {
            let history = history_entry("extras");
            extras.record(&self.store, &self.time, t1, &history)?;
        }
        if !self.events.due(Channel::TimeSeries, t0, t1 + tol).is_empty()
            && let Some(series) = &mut self.series
        {
            let mut values = vec![("time", "years", t1 / SECONDS_PER_YEAR)];
            values.extend(self.accountant.series_values(dt));
            series.record(&values);
            if self.grid.rank() == 0 {
                series.flush()?;
            }
        }
        Ok(())
    }
}

/// Stop wins over save.
pub(super) fn strongest(a: Option<SignalRequest>, b: Option<SignalRequest>) -> Option<SignalRequest> {
    match (a, b) {
        (Some(SignalRequest::Stop), _) | (_, Some(SignalRequest::Stop)) => Some(SignalRequest::Stop),
        (Some(SignalRequest::Save), _) | (_, Some(SignalRequest::Save)) => Some(SignalRequest::Save),
        _ => None,
    }
}
