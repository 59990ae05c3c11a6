//! Benchmarks for step planning.
//!
//! Run with: `cargo bench --bench planner_bench`
//!
//! Benchmarks the planner decision and the global advective-rate scan
//! it depends on.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use icesheet_rs::components::{MaxTimestep, Slot};
use icesheet_rs::fields::{FieldStore, Var};
use icesheet_rs::grid::SerialComm;
use icesheet_rs::planner::{AdvectiveRates, PlanInput, advective_rates};
use icesheet_rs::types::SECONDS_PER_YEAR;
use icesheet_rs::{Config, Model, StepPlanner};

/// Dome of radius `r` on an `m` x `m` grid, with velocities solved once.
fn setup_model(m: i64) -> Model {
    let mut config = Config::defaults();
    config.set_integer("grid_Mx", m).unwrap();
    config.set_integer("grid_My", m).unwrap();
    config.set_string("surface_model", "constant").unwrap();
    let mut model = Model::with_setup(config, Arc::new(SerialComm::new()), |store: &mut FieldStore| {
        let grid = Arc::clone(store.grid());
        let id = store.id(Var::Thickness)?;
        {
            let mut thk = store.access_mut(id)?;
            for (i, j) in grid.points() {
                let r = grid.x(i).hypot(grid.y(j));
                thk.set(i, j, (2000.0 * (1.0 - (r / 600e3).powi(2))).max(0.0));
            }
        }
        store.update_ghosts(id)
    })
    .unwrap()
    .with_max_steps(1);
    model.step().unwrap();
    model
}

/// Benchmark a single planner decision.
fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    let year = SECONDS_PER_YEAR;
    let advisories = [
        (Slot::Surface, MaxTimestep::new(3.0 * year)),
        (Slot::Hydrology, MaxTimestep::new(0.5 * year)),
        (Slot::BedThermal, MaxTimestep::unrestricted()),
    ];
    let rates = AdvectiveRates {
        cfl3d: 1.0 / (2.0 * year),
        cfl2d: 1.0 / (4.0 * year),
    };

    for (name, planner) in [
        ("adaptive", StepPlanner::new(60.0 * year)),
        ("skip", StepPlanner::new(60.0 * year).with_skip(10)),
        ("fixed", StepPlanner::new(60.0 * year).with_fixed_dt(year)),
    ] {
        group.bench_function(BenchmarkId::new("decision", name), |b| {
            b.iter(|| {
                let input = PlanInput::new(0.0, 1000.0 * year, 20e3, 20e3)
                    .with_event(Some(7.0 * year))
                    .with_rates(rates)
                    .with_d_max(5.0)
                    .with_advisories(&advisories);
                planner.plan(black_box(&input))
            });
        });
    }

    group.finish();
}

/// Benchmark the global advective-rate scan.
fn bench_advective_rates(c: &mut Criterion) {
    let mut group = c.benchmark_group("advective_rates");

    for m in [31, 61, 121] {
        let model = setup_model(m);
        group.bench_with_input(BenchmarkId::new("dome", format!("{}x{}", m, m)), &m, |b, _| {
            b.iter(|| advective_rates(black_box(model.store())));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan, bench_advective_rates);
criterion_main!(benches);
