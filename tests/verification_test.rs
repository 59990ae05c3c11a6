//! Isothermal SIA against the steady dome with an exact solution.
//!
//! Constant accumulation `M0` falls inside a radius `L` on a flat bed.
//! Beyond `L` the bed drops below sea level and floating ice is removed,
//! which holds the margin in place. The steady thickness is
//!
//! `H(r) = H0 (1 - (r/L)^((n+1)/n))^(n/(2n+2))`
//!
//! with `H0` fixed by `M0`, `L`, and the flow law.
//!
//! The long run at 61x61 is ignored by default; run it with
//! `cargo test --release -- --ignored`.

mod common;

use std::sync::Arc;

use common::{base_config, set_field};
use icesheet_rs::fields::Var;
use icesheet_rs::grid::SerialComm;
use icesheet_rs::types::SECONDS_PER_YEAR;
use icesheet_rs::Model;

const M0: f64 = 0.3;
const L: f64 = 750e3;
const N: f64 = 3.0;
const SOFTNESS: f64 = 1e-16;

/// Steady thickness at radius `r`, m.
fn exact_thickness(r: f64) -> f64 {
    if r >= L {
        return 0.0;
    }
    let rho_g: f64 = 910.0 * 9.81;
    let gamma = 2.0 * (SOFTNESS / SECONDS_PER_YEAR) * rho_g.powf(N) / (N + 2.0);
    let m0 = M0 / SECONDS_PER_YEAR;
    let h0 = (2.0 * (m0 / (2.0 * gamma)).powf(1.0 / N) * L.powf((N + 1.0) / N)).powf(N / (2.0 * N + 2.0));
    h0 * (1.0 - (r / L).powf((N + 1.0) / N)).powf(N / (2.0 * N + 2.0))
}

/// Thickness errors against the exact profile, m, and the relative volume error.
#[derive(Debug)]
struct DomeErrors {
    dome: f64,
    /// Largest error inside `0.85 L`
    max_interior: f64,
    /// Mean error over the whole grid
    average: f64,
    volume: f64,
}

fn run_dome(m: i64, years: f64) -> DomeErrors {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), m);
    config.set_string("surface_model", "verification_a").unwrap();
    config.set_flag("do_energy", false).unwrap();
    config.set_flag("float_kill", true).unwrap();
    config.set_double("ice_softness", SOFTNESS).unwrap();
    config.set_double("run_length_years", years).unwrap();

    let mut model = Model::with_setup(config, Arc::new(SerialComm::new()), |store| {
        set_field(store, Var::Bed, |x, y| if x.hypot(y) < L { 0.0 } else { -2000.0 })?;
        set_field(store, Var::Thickness, |x, y| exact_thickness(x.hypot(y)))
    })
    .unwrap();
    let summary = model.run().unwrap();
    assert!(summary.success());

    let grid = Arc::clone(model.grid());
    let store = model.store();
    let thk = store.access(store.id(Var::Thickness).unwrap()).unwrap();
    let mut errors = DomeErrors {
        dome: f64::NAN,
        max_interior: 0.0,
        average: 0.0,
        volume: 0.0,
    };
    let (mut volume, mut volume_exact, mut count) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (i, j) in grid.points() {
        let r = grid.x(i).hypot(grid.y(j));
        let (h, exact) = (thk.get(i, j), exact_thickness(r));
        let error = (h - exact).abs();
        if r < 1e-6 {
            errors.dome = error;
        }
        if r < 0.85 * L {
            errors.max_interior = errors.max_interior.max(error);
        }
        errors.average += error;
        volume += h;
        volume_exact += exact;
        count += 1.0;
    }
    errors.average /= count;
    errors.volume = (volume - volume_exact).abs() / volume_exact;
    errors
}

#[test]
fn test_exact_profile_is_nearly_steady_on_coarse_grid() {
    let h0 = exact_thickness(0.0);
    assert!(h0 > 3000.0 && h0 < 4000.0, "H0 = {}", h0);

    let errors = run_dome(31, 100.0);
    assert!(errors.dome < 0.01 * h0, "{:?}", errors);
    assert!(errors.volume < 0.01, "{:?}", errors);
}

#[test]
#[ignore = "slow: thousands of years on a 61x61 grid"]
fn test_steady_dome_matches_exact_profile() {
    let h0 = exact_thickness(0.0);
    let errors = run_dome(61, 25_000.0);
    assert!(errors.dome < 0.02 * h0, "{:?}", errors);
    assert!(errors.max_interior < 0.02 * h0, "{:?}", errors);
    assert!(errors.average < 0.02 * h0, "{:?}", errors);
    assert!(errors.volume < 0.01, "{:?}", errors);
}
