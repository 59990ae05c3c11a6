//! Benchmarks for the vertical column kernels.
//!
//! Run with: `cargo bench --bench column_bench`
//!
//! Benchmarks the implicit enthalpy solve of one column and the sweep of
//! a full energy update.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use icesheet_rs::energy::{Column, ColumnSolver, TridiagonalSystem};
use icesheet_rs::types::SECONDS_PER_YEAR;
use icesheet_rs::{Config, Constants, Model};

/// Equally spaced levels over a 4000 m box.
fn levels(mz: usize) -> Vec<f64> {
    (0..mz).map(|k| 4000.0 * k as f64 / (mz - 1) as f64).collect()
}

/// Benchmark one column solve at several vertical resolutions.
fn bench_column_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("column_solve");
    let constants = Constants::from_config(&Config::defaults()).unwrap();

    for mz in [41, 101, 201] {
        let solver = ColumnSolver::new(&constants, levels(mz), 10.0 * SECONDS_PER_YEAR);
        let e0 = solver.converter.enthalpy_permissive(250.0, 0.0);
        let mut template = Column::grounded(2500.0, mz, e0);
        template.heat_flux = 0.042;
        for (k, w) in template.w.iter_mut().enumerate() {
            *w = -0.3 / SECONDS_PER_YEAR * k as f64 / mz as f64;
        }
        let mut sys = TridiagonalSystem::new(mz);

        group.bench_with_input(BenchmarkId::new("grounded", mz), &mz, |b, _| {
            b.iter(|| {
                let mut col = template.clone();
                solver.solve(black_box(&mut col), &mut sys).unwrap();
                col.basal_melt
            });
        });
    }

    group.finish();
}

/// Benchmark whole model steps, dominated by the column sweeps.
fn bench_model_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_step");
    group.sample_size(10);

    for m in [21, 41] {
        group.bench_with_input(BenchmarkId::new("ice_free", format!("{}x{}", m, m)), &m, |b, &m| {
            b.iter_batched(
                || {
                    let mut config = Config::defaults();
                    config.set_integer("grid_Mx", m).unwrap();
                    config.set_integer("grid_My", m).unwrap();
                    config.set_string("surface_model", "constant").unwrap();
                    config.set_double("surface_constant_mass_balance", 0.3).unwrap();
                    Model::new(config).unwrap()
                },
                |mut model| model.step().unwrap(),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_column_solve, bench_model_step);
criterion_main!(benches);
