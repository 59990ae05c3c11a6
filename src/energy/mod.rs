//! Energy conservation: enthalpy, age, and the bedrock thermal layer.
//!
//! Ice energy is carried as enthalpy so that temperate ice with a liquid
//! water fraction needs no special treatment. [`EnthalpyConverter`] maps
//! between enthalpy, temperature, and water fraction; [`EnthalpyModel`]
//! advances it column by column and derives the basal melt rate.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::config::Constants;
//! use icesheet_rs::energy::EnthalpyConverter;
//!
//! let ec = EnthalpyConverter::new(&Constants::default());
//! let p = ec.pressure(1000.0);
//! let e = ec.enthalpy(260.0, 0.0, p).unwrap();
//! assert!((ec.temperature(e, p) - 260.0).abs() < 1e-9);
//! ```

mod age;
mod bedrock;
mod column;
mod enthalpy;
mod tridiagonal;

use crate::config::Constants;
use crate::error::Result;
use crate::fields::{FieldStore, Var};

pub use age::IceAge;
pub use bedrock::BedrockThermal;
pub use column::{Column, ColumnSolver, EnthalpyModel};
pub use enthalpy::EnthalpyConverter;
pub use tridiagonal::TridiagonalSystem;

/// Bootstrap temperature at depth `depth` below the surface of a column
/// of thickness `thickness`.
///
/// A quartic in depth that starts at the surface temperature and warms
/// at `G/k` at the base, capped at the pressure-melting point.
pub fn bootstrap_temperature(
    depth: f64,
    thickness: f64,
    surface_temp: f64,
    geothermal: f64,
    constants: &Constants,
    converter: &EnthalpyConverter,
) -> f64 {
    let k = constants.ice_k;
    let h = thickness.max(1.0);
    let beta = (4.0 / 21.0) * geothermal / (2.0 * k * h * h * h);
    let alpha = geothermal / (2.0 * h * k) - 2.0 * h * h * beta;
    let d = depth.clamp(0.0, h);
    let t = surface_temp + alpha * d * d + beta * d.powi(4);
    t.min(converter.melting_temperature(converter.pressure(d)))
}

/// Fill `enthalpy` from the bootstrap temperature heuristic and
/// `litho_temp` with the linear conductive profile below it.
pub fn bootstrap_energy(store: &mut FieldStore, constants: &Constants) -> Result<()> {
    let grid = std::sync::Arc::clone(store.grid());
    let ec = EnthalpyConverter::new(constants);
    let z = grid.z().to_vec();
    let zb = grid.zb().to_vec();
    let ids = [store.ensure(Var::Enthalpy)?, store.ensure(Var::BedrockTemp)?];
    let (thk, ts, g) = (
        store.ensure(Var::Thickness)?,
        store.ensure(Var::SurfaceTemp)?,
        store.ensure(Var::GeothermalFlux)?,
    );
    {
        let ([mut e, mut tb], view) = store.split_mut(ids)?;
        let (thk, ts, g) = (view.access(thk)?, view.access(ts)?, view.access(g)?);
        for (i, j) in grid.points() {
            let (h, t_s, flux) = (thk.get(i, j), ts.get(i, j), g.get(i, j));
            let t_s = t_s.min(constants.melting_point);
            for (k, value) in e.column_mut(i, j).iter_mut().enumerate() {
                let depth = h - z[k];
                *value = if depth > 0.0 {
                    let t = bootstrap_temperature(depth, h, t_s, flux, constants, &ec);
                    ec.enthalpy_permissive(t, ec.pressure(depth))
                } else {
                    ec.enthalpy_permissive(t_s, 0.0)
                };
            }
            let t_base = if h > 0.0 {
                bootstrap_temperature(h, h, t_s, flux, constants, &ec)
            } else {
                t_s
            };
            for (k, value) in tb.column_mut(i, j).iter_mut().enumerate() {
                *value = t_base - flux / constants.bedrock_k * zb[k];
            }
        }
    }
    store.update_ghosts(ids[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bootstrap_profile() {
        let c = Constants::default();
        let ec = EnthalpyConverter::new(&c);
        let (h, ts, g) = (2000.0, 240.0, 0.05);
        assert_relative_eq!(bootstrap_temperature(0.0, h, ts, g, &c, &ec), ts);

        // basal gradient dT/dd = G / k
        let eps = 1e-3;
        let below = bootstrap_temperature(h, h, ts, g, &c, &ec);
        let above = bootstrap_temperature(h - eps, h, ts, g, &c, &ec);
        assert_relative_eq!((below - above) / eps, g / c.ice_k, max_relative = 1e-4);

        // never above the pressure-melting point
        let hot = bootstrap_temperature(h, h, 272.0, 0.5, &c, &ec);
        assert_relative_eq!(hot, ec.melting_temperature(ec.pressure(h)));
    }
}
