//! Shared setup for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use icesheet_rs::fields::{FieldStore, Var};
use icesheet_rs::io::{Dataset, read_dataset};
use icesheet_rs::{Config, Result};

/// Small square domain, ice-free, no forcing, writing into `dir`.
pub fn base_config(dir: &Path, m: i64) -> Config {
    let mut config = Config::defaults();
    config.set_integer("grid_Mx", m).unwrap();
    config.set_integer("grid_My", m).unwrap();
    config.set_integer("grid_Mz", 21).unwrap();
    config.set_string("surface_model", "constant").unwrap();
    config
        .set_string("output_file", dir.join("out.bin").to_string_lossy().to_string())
        .unwrap();
    config
}

/// Set `var` from a function of the cell center.
pub fn set_field(store: &mut FieldStore, var: Var, f: impl Fn(f64, f64) -> f64) -> Result<()> {
    let grid = Arc::clone(store.grid());
    let id = store.ensure(var)?;
    {
        let mut w = store.access_mut(id)?;
        for (i, j) in grid.points() {
            w.set(i, j, f(grid.x(i), grid.y(j)));
        }
    }
    store.update_ghosts(id)
}

/// Gaussian bump of height `h0` and width `sigma`, centered.
pub fn bump(h0: f64, sigma: f64) -> impl Fn(f64, f64) -> f64 {
    move |x, y| h0 * (-(x * x + y * y) / (2.0 * sigma * sigma)).exp()
}

pub fn read(path: &Path) -> Dataset {
    read_dataset(path).unwrap()
}

/// Largest relative difference between two variables of two files.
pub fn max_rel_diff(a: &Dataset, b: &Dataset, name: &str) -> f64 {
    let (va, vb) = (&a.var(name).unwrap().data, &b.var(name).unwrap().data);
    assert_eq!(va.len(), vb.len(), "{} lengths differ", name);
    let scale = va.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1e-300);
    va.iter()
        .zip(vb)
        .fold(0.0_f64, |m, (x, y)| m.max((x - y).abs() / scale))
}
