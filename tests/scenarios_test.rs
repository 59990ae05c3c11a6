//! End-to-end runs of the coupled model.
//!
//! Verifies:
//! - An ice-free grid without forcing stays ice-free, steps at the maximum
//!   length, and closes the budget exactly
//! - Flotation decides grounded against floating cells
//! - The volume change of a periodic slab equals the integrated surface
//!   mass balance under a random climate
//! - A flowing dome on a periodic domain conserves volume
//! - Fractional fixed steps reach the end without a sliver step
//! - A stop request writes the output with an early-exit note, whether it
//!   comes from a hook, a raised stop flag, or `SIGTERM`
//! - Restarting from a saved state reproduces an uninterrupted run
//! - Writing, reading, and writing again leaves the state unchanged
//! - Two ranks reproduce the serial result

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use common::{base_config, bump, max_rel_diff, read, set_field};
use icesheet_rs::fields::Var;
use icesheet_rs::geometry::{mask_at, surface_elevation};
use icesheet_rs::grid::{SerialComm, ThreadComm};
use icesheet_rs::simulation::{SignalRequest, Signals};
use icesheet_rs::types::SECONDS_PER_YEAR;
use icesheet_rs::{CellType, Config, ExitCause, Model, StepReason};

fn dome_model(config: Config) -> Model {
    Model::with_setup(config, Arc::new(SerialComm::new()), |store| {
        set_field(store, Var::Thickness, bump(1000.0, 150e3))
    })
    .unwrap()
}

// =============================================================================
// Ice-free grid
// =============================================================================

#[test]
fn test_empty_grid_stays_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), 21);
    config.set_double("run_length_years", 1.0).unwrap();
    config.set_double("maximum_time_step_years", 1.0).unwrap();
    let mut model = Model::new(config).unwrap();

    let report = model.step().unwrap();
    assert_eq!(report.reason, StepReason::Max);
    assert_relative_eq!(report.dt, SECONDS_PER_YEAR, max_relative = 1e-12);
    assert!(!report.solved);
    assert_eq!(report.budget.residual(), 0.0);

    let store = model.store();
    let (lo, hi) = store.range(store.id(Var::Thickness).unwrap()).unwrap();
    assert_eq!((lo, hi), (0.0, 0.0));
    assert!(model.time().is_done());
}

#[test]
fn test_ice_free_land_accumulates_smb() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), 11);
    config.set_double("run_length_years", 1.0).unwrap();
    config.set_double("maximum_time_step_years", 1.0).unwrap();
    config.set_double("surface_constant_mass_balance", 0.5).unwrap();
    let mut model = Model::new(config).unwrap();

    model.step().unwrap();
    let store = model.store();
    let (lo, hi) = store.range(store.id(Var::Thickness).unwrap()).unwrap();
    assert_relative_eq!(lo, 0.5, max_relative = 1e-9);
    assert_relative_eq!(hi, 0.5, max_relative = 1e-9);
}

// =============================================================================
// Flotation
// =============================================================================

#[test]
fn test_flotation_criterion() {
    let (rho_i, rho_o) = (910.0, 1028.0);
    let bed = -500.0;
    let flotation_thickness = 500.0 * rho_o / rho_i;

    assert_eq!(mask_at(300.0, bed, 0.0, rho_i, rho_o), CellType::Floating);
    assert_relative_eq!(
        surface_elevation(300.0, bed, 0.0, rho_i, rho_o),
        300.0 * (1.0 - rho_i / rho_o),
        max_relative = 1e-12
    );

    assert_eq!(mask_at(600.0, bed, 0.0, rho_i, rho_o), CellType::Grounded);
    assert_relative_eq!(surface_elevation(600.0, bed, 0.0, rho_i, rho_o), 100.0);

    assert_eq!(mask_at(flotation_thickness - 1e-6, bed, 0.0, rho_i, rho_o), CellType::Floating);
    assert_eq!(mask_at(flotation_thickness + 1e-6, bed, 0.0, rho_i, rho_o), CellType::Grounded);
    assert_eq!(mask_at(0.0, bed, 0.0, rho_i, rho_o), CellType::IceFreeOcean);
    assert_eq!(mask_at(0.0, 10.0, 0.0, rho_i, rho_o), CellType::IceFreeLand);
}

// =============================================================================
// Conservation
// =============================================================================

#[test]
fn test_mass_closure_with_random_smb() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), 11);
    config.set_string("grid_periodicity", "xy").unwrap();
    config.set_string("surface_model", "stochastic").unwrap();
    config.set_double("surface_stochastic_mean", 1.0).unwrap();
    config.set_double("surface_stochastic_amplitude", 0.5).unwrap();
    config.set_flag("do_energy", false).unwrap();
    config.set_double("fixed_time_step_years", 1.0).unwrap();
    config.set_double("run_length_years", 100.0).unwrap();
    let mut model = Model::new(config).unwrap();

    let summary = model.run().unwrap();
    assert_eq!(summary.n_steps, 100);
    assert!(summary.reasons.keys().all(|&r| matches!(r, 'f' | 'e')));

    let totals = model.accountant().totals();
    assert!(totals.smb > 0.0);
    assert!((totals.smb - totals.volume_change).abs() <= 1e-9 * totals.smb.abs());
    assert_relative_eq!(model.accountant().volume(), totals.volume_change, max_relative = 1e-12);
    assert!(model.accountant().history().iter().all(|r| r.relative < 1e-9));
}

#[test]
fn test_fractional_fixed_steps_end_on_time() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), 11);
    config.set_flag("do_energy", false).unwrap();
    config.set_double("fixed_time_step_years", 0.1).unwrap();
    config.set_double("run_length_years", 10.0).unwrap();
    let mut model = Model::new(config).unwrap();

    let summary = model.run().unwrap();
    assert_eq!(summary.n_steps, 100);
    assert_relative_eq!(summary.dt_min, 0.1 * SECONDS_PER_YEAR, max_relative = 1e-9);
    assert_eq!(summary.final_time, 10.0 * SECONDS_PER_YEAR);
}

#[test]
fn test_periodic_dome_conserves_volume() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), 21);
    config.set_string("grid_periodicity", "xy").unwrap();
    config.set_flag("do_energy", false).unwrap();
    config.set_double("run_length_years", 500.0).unwrap();
    let mut model = dome_model(config);
    let v0 = model.accountant().volume();
    assert!(v0 > 0.0);

    let summary = model.run().unwrap();
    assert!(summary.solves > 0);
    assert_relative_eq!(model.accountant().volume(), v0, max_relative = 1e-10);
    assert!(model.accountant().totals().flux_divergence.abs() < 1e-10 * v0);
}

// =============================================================================
// Output and restart
// =============================================================================

#[test]
fn test_stop_request_writes_early_exit_note() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), 11);
    config.set_double("run_length_years", 1000.0).unwrap();
    config.set_double("maximum_time_step_years", 10.0).unwrap();
    let mut model = dome_model(config);
    model
        .hooks_mut()
        .add_at_end(Box::new(|_, time| Ok((time.year() >= 10.0).then_some(SignalRequest::Stop))));

    let summary = model.run().unwrap();
    assert_eq!(summary.exit, ExitCause::Signal);
    assert!(summary.final_time < 1000.0 * SECONDS_PER_YEAR);

    let ds = read(&dir.path().join("out.bin"));
    let history = ds.attr_text("history").unwrap();
    assert!(history.contains("EARLY EXIT caused by signal SIGTERM"));
    assert!(ds.var("thk").is_some());
}

/// Run a dome for up to 1000 years and check the run stopped early with
/// the early-exit note in the written file.
fn assert_stopped_with_note(dir: &std::path::Path, mut model: Model) {
    let summary = model.run().unwrap();
    assert_eq!(summary.exit, ExitCause::Signal);
    assert!(summary.success());
    assert!(summary.final_time >= 10.0 * SECONDS_PER_YEAR);
    assert!(summary.final_time < 1000.0 * SECONDS_PER_YEAR);

    let ds = read(&dir.join("out.bin"));
    let history = ds.attr_text("history").unwrap();
    let first = history.lines().next().unwrap();
    assert!(first.contains("EARLY EXIT caused by signal SIGTERM"), "{}", first);
    assert!(first.contains(&format!("year={:.3}", summary.final_time / SECONDS_PER_YEAR)));
    assert!(ds.var("thk").is_some());
}

#[test]
fn test_raised_stop_flag_exits_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), 11);
    config.set_double("run_length_years", 1000.0).unwrap();
    config.set_double("maximum_time_step_years", 10.0).unwrap();
    let signals = Signals::new();
    let handle = signals.clone();
    let mut model = dome_model(config).with_signals(signals);
    model.hooks_mut().add_at_end(Box::new(move |_, time| {
        if time.year() >= 10.0 {
            handle.request_stop();
        }
        Ok(None)
    }));
    assert_stopped_with_note(dir.path(), model);
}

#[cfg(unix)]
#[test]
fn test_sigterm_exits_cleanly() {
    use signal_hook::consts::SIGTERM;

    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), 11);
    config.set_double("run_length_years", 1000.0).unwrap();
    config.set_double("maximum_time_step_years", 10.0).unwrap();
    let mut model = dome_model(config).with_signals(Signals::install().unwrap());
    model.hooks_mut().add_at_end(Box::new(|_, time| {
        if time.year() >= 10.0 {
            signal_hook::low_level::raise(SIGTERM)?;
        }
        Ok(None)
    }));
    assert_stopped_with_note(dir.path(), model);
}

#[test]
fn test_restart_reproduces_continuous_run() {
    let dir = tempfile::tempdir().unwrap();
    let config_for = |name: &str, years: f64| {
        let mut config = base_config(dir.path(), 21);
        config.set_double("fixed_time_step_years", 5.0).unwrap();
        config.set_double("run_length_years", years).unwrap();
        config
            .set_string("output_file", dir.path().join(name).to_string_lossy().to_string())
            .unwrap();
        config
    };

    dome_model(config_for("continuous.bin", 50.0)).run().unwrap();
    dome_model(config_for("first_half.bin", 25.0)).run().unwrap();

    let mut second = config_for("second_half.bin", 25.0);
    second
        .set_string("input_file", dir.path().join("first_half.bin").to_string_lossy().to_string())
        .unwrap();
    let mut resumed = Model::new(second).unwrap();
    assert_relative_eq!(resumed.time().current(), 25.0 * SECONDS_PER_YEAR, max_relative = 1e-12);
    resumed.run().unwrap();

    let a = read(&dir.path().join("continuous.bin"));
    let b = read(&dir.path().join("second_half.bin"));
    assert!(max_rel_diff(&a, &b, "thk") < 1e-9);
    assert!(max_rel_diff(&a, &b, "enthalpy") < 1e-9);
    assert!(max_rel_diff(&a, &b, "tillwat") < 1e-9);
}

#[test]
fn test_write_read_write_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), 11);
    config
        .set_string("output_file", dir.path().join("first.bin").to_string_lossy().to_string())
        .unwrap();
    dome_model(config).with_max_steps(0).run().unwrap();

    let mut config = base_config(dir.path(), 11);
    config
        .set_string("input_file", dir.path().join("first.bin").to_string_lossy().to_string())
        .unwrap();
    config
        .set_string("output_file", dir.path().join("second.bin").to_string_lossy().to_string())
        .unwrap();
    let summary = Model::new(config).unwrap().with_max_steps(0).run().unwrap();
    assert_eq!(summary.n_steps, 0);

    let a = read(&dir.path().join("first.bin"));
    let b = read(&dir.path().join("second.bin"));
    for name in ["thk", "topg", "enthalpy", "tillwat", "bheatflx", "bheatflx_top", "mask"] {
        assert!(max_rel_diff(&a, &b, name) < 1e-14, "{} changed", name);
    }
}

// =============================================================================
// Parallel
// =============================================================================

#[test]
fn test_two_ranks_match_serial() {
    let dir = tempfile::tempdir().unwrap();
    let config = |name: &str| {
        let mut config = base_config(dir.path(), 21);
        config.set_flag("do_energy", false).unwrap();
        config.set_double("run_length_years", 200.0).unwrap();
        config
            .set_string("output_file", dir.path().join(name).to_string_lossy().to_string())
            .unwrap();
        config
    };

    let mut serial = dome_model(config("serial.bin"));
    let serial_summary = serial.run().unwrap();
    let serial_volume = serial.accountant().volume();

    let results = ThreadComm::run(2, |comm| {
        let mut model = Model::with_setup(config("parallel.bin"), Arc::new(comm), |store| {
            set_field(store, Var::Thickness, bump(1000.0, 150e3))
        })
        .unwrap();
        let summary = model.run().unwrap();
        (summary.n_steps, model.accountant().volume())
    });

    for (steps, volume) in results {
        assert_eq!(steps, serial_summary.n_steps);
        assert_relative_eq!(volume, serial_volume, max_relative = 1e-10);
    }
    let a = read(&dir.path().join("serial.bin"));
    let b = read(&dir.path().join("parallel.bin"));
    assert!(max_rel_diff(&a, &b, "thk") < 1e-10);
}
