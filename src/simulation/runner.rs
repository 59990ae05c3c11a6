//! The run loop.
//!
//! Steps the model until the end of the run, a stop request, or a step
//! limit, and writes the final state.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{error, info, warn};

use super::{Model, SignalRequest};
use crate::error::{IceError, Result};
use crate::types::SECONDS_PER_YEAR;

// =============================================================================
// Run summary
// =============================================================================

/// Why the run loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCause {
    /// Reached the end of the run
    Completed,
    /// Stopped by `SIGTERM` or a hook
    Signal,
    /// Hit the configured step limit
    StepLimit,
}

/// Statistics of a finished run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Model time reached, seconds
    pub final_time: f64,
    pub n_steps: usize,
    /// Shortest step taken, seconds
    pub dt_min: f64,
    /// Longest step taken, seconds
    pub dt_max: f64,
    /// Wall-clock time, seconds
    pub wall_time: f64,
    /// Stress balance solves performed
    pub solves: usize,
    /// Steps per reason letter
    pub reasons: BTreeMap<char, usize>,
    pub exit: ExitCause,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            final_time: 0.0,
            n_steps: 0,
            dt_min: f64::INFINITY,
            dt_max: 0.0,
            wall_time: 0.0,
            solves: 0,
            reasons: BTreeMap::new(),
            exit: ExitCause::Completed,
        }
    }

    /// True unless the run stopped at the step limit.
    pub fn success(&self) -> bool {
        self.exit != ExitCause::StepLimit
    }
}

// =============================================================================
// Run loop
// =============================================================================

impl Model {
    /// Step to the end of the run and write the output file.
    ///
    /// On a fatal error the current state is written to the output file
    /// with the error noted in its history, and the error is returned.
    pub fn run(&mut self) -> Result<RunSummary> {
        let start_wall = Instant::now();
        let mut summary = RunSummary::new();
        info!(
            start_year = self.time.year(),
            end_year = self.time.end() / SECONDS_PER_YEAR,
            components = ?self.components.names(),
            "run started"
        );

        while !self.time.is_done() {
            if let Some(max) = self.max_steps
                && summary.n_steps >= max
            {
                warn!(max_steps = max, "step limit reached before the end of the run");
                summary.exit = ExitCause::StepLimit;
                break;
            }

            let report = match self.step() {
                Ok(report) => report,
                Err(e) => {
                    self.emergency_dump(&e);
                    return Err(e);
                }
            };

            summary.n_steps += 1;
            summary.dt_min = summary.dt_min.min(report.dt);
            summary.dt_max = summary.dt_max.max(report.dt);
            if report.solved {
                summary.solves += 1;
            }
            *summary.reasons.entry(report.reason.letter()).or_insert(0) += 1;

            match report.request {
                Some(SignalRequest::Stop) => {
                    let note = format!(
                        "EARLY EXIT caused by signal SIGTERM. Completed timestep at year={:.3}.",
                        self.time.year()
                    );
                    warn!("{}", note);
                    let path = self.output.output_file.clone();
                    self.save(&path, &note)?;
                    summary.exit = ExitCause::Signal;
                    break;
                }
                Some(SignalRequest::Save) => {
                    let path = self.output.timestamped(&self.output.executable, self.time.year());
                    info!(file = %path.display(), "saving on request");
                    self.save(&path, &format!("saved on request at year {:.3}", self.time.year()))?;
                }
                None => {}
            }
        }

        if summary.exit != ExitCause::Signal {
            let path = self.output.output_file.clone();
            self.save(&path, &format!("run ended at year {:.3}", self.time.year()))?;
        }

        summary.final_time = self.time.current();
        summary.wall_time = start_wall.elapsed().as_secs_f64();
        info!(
            steps = summary.n_steps,
            final_year = summary.final_time / SECONDS_PER_YEAR,
            dt_min_years = summary.dt_min / SECONDS_PER_YEAR,
            dt_max_years = summary.dt_max / SECONDS_PER_YEAR,
            solves = summary.solves,
            wall_time = summary.wall_time,
            exit = ?summary.exit,
            "run complete"
        );
        Ok(summary)
    }

    /// Write the current state next to a note naming `err`.
    fn emergency_dump(&mut self, err: &IceError) {
        let path = self.output.output_file.clone();
        let note = format!("run aborted at year {:.3}: {}", self.time.year(), err);
        error!(file = %path.display(), error = %err, "writing diagnostic dump");
        if let Err(dump) = self.save(&path, &note) {
            error!(error = %dump, "diagnostic dump failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config::defaults();
        config.set_integer("grid_Mx", 11).unwrap();
        config.set_integer("grid_My", 11).unwrap();
        config.set_integer("grid_Mz", 11).unwrap();
        config.set_string("surface_model", "constant").unwrap();
        config.set_double("run_length_years", 30.0).unwrap();
        config.set_double("maximum_time_step_years", 10.0).unwrap();
        config
            .set_string("output_file", dir.join("out.bin").to_string_lossy().to_string())
            .unwrap();
        config
    }

    #[test]
    fn test_run_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Model::new(config(dir.path())).unwrap();
        let summary = model.run().unwrap();
        assert!(summary.success());
        assert_eq!(summary.exit, ExitCause::Completed);
        assert_eq!(summary.n_steps, 3);
        assert!((summary.final_time - 30.0 * SECONDS_PER_YEAR).abs() < 1e-6);
        assert_eq!(summary.reasons.get(&'m'), Some(&3));
        assert_eq!(summary.solves, 0);
        assert!(dir.path().join("out.bin").exists());
    }

    #[test]
    fn test_step_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Model::new(config(dir.path())).unwrap().with_max_steps(1);
        let summary = model.run().unwrap();
        assert_eq!(summary.n_steps, 1);
        assert_eq!(summary.exit, ExitCause::StepLimit);
        assert!(!summary.success());
    }

    #[test]
    fn test_stop_request_from_hook() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Model::new(config(dir.path())).unwrap();
        model
            .hooks_mut()
            .add_at_end(Box::new(|_, time| Ok((time.year() >= 10.0).then_some(SignalRequest::Stop))));
        let summary = model.run().unwrap();
        assert_eq!(summary.exit, ExitCause::Signal);
        assert_eq!(summary.n_steps, 1);
        assert!(model.history().lines().next().unwrap().contains("EARLY EXIT caused by signal SIGTERM"));
    }

    #[test]
    fn test_save_request_continues() {
        let dir = tempfile::tempdir().unwrap();
        let cwd_name = dir.path().join("icesheet").to_string_lossy().to_string();
        let mut model = Model::new(config(dir.path())).unwrap().with_executable(cwd_name);
        model.signals().request_save();
        let summary = model.run().unwrap();
        assert_eq!(summary.exit, ExitCause::Completed);
        assert!(dir.path().join("icesheet-10.000.bin").exists());
    }

    #[test]
    fn test_error_writes_dump() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Model::new(config(dir.path())).unwrap();
        model.hooks_mut().add_at_start(Box::new(|_, time| {
            if time.year() >= 10.0 {
                return Err(IceError::NotConverged {
                    component: "forcing".into(),
                    iterations: 7,
                });
            }
            Ok(None)
        }));
        let err = model.run().unwrap_err();
        assert!(matches!(err, IceError::NotConverged { .. }));
        assert!(dir.path().join("out.bin").exists());
        assert!(model.history().lines().next().unwrap().contains("run aborted at year 10.000"));
    }
}
