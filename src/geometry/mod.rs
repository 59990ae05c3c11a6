//! Ice geometry: the cell-type mask and the surface elevation.
//!
//! The mask is a pure function of thickness, bed elevation, and sea
//! level, so it is recomputed rather than evolved.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::geometry::{CellType, mask_at, surface_elevation};
//!
//! let (rho_i, rho_o) = (910.0, 1028.0);
//! assert_eq!(mask_at(300.0, -500.0, 0.0, rho_i, rho_o), CellType::Floating);
//! assert_eq!(mask_at(600.0, -500.0, 0.0, rho_i, rho_o), CellType::Grounded);
//!
//! let h = surface_elevation(300.0, -500.0, 0.0, rho_i, rho_o);
//! assert!((h - 300.0 * (1.0 - rho_i / rho_o)).abs() < 1e-12);
//! ```

use crate::config::Constants;
use crate::error::Result;
use crate::fields::{FieldStore, Var};

/// The four categorical states of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellType {
    IceFreeLand,
    Grounded,
    Floating,
    IceFreeOcean,
}

impl CellType {
    /// Value stored in the mask field.
    pub fn value(self) -> f64 {
        match self {
            Self::IceFreeLand => 0.0,
            Self::Grounded => 2.0,
            Self::Floating => 3.0,
            Self::IceFreeOcean => 4.0,
        }
    }

    pub fn from_value(v: f64) -> Option<Self> {
        match v as i64 {
            0 => Some(Self::IceFreeLand),
            2 => Some(Self::Grounded),
            3 => Some(Self::Floating),
            4 => Some(Self::IceFreeOcean),
            _ => None,
        }
    }

    pub fn is_icy(self) -> bool {
        matches!(self, Self::Grounded | Self::Floating)
    }

    pub fn is_grounded(self) -> bool {
        matches!(self, Self::Grounded | Self::IceFreeLand)
    }

    pub fn is_ocean(self) -> bool {
        matches!(self, Self::Floating | Self::IceFreeOcean)
    }
}

/// Cell type from thickness, bed, and sea level.
pub fn mask_at(thickness: f64, bed: f64, sea_level: f64, rho_i: f64, rho_o: f64) -> CellType {
    if rho_i * thickness > rho_o * (sea_level - bed) {
        if thickness > 0.0 { CellType::Grounded } else { CellType::IceFreeLand }
    } else if thickness > 0.0 {
        CellType::Floating
    } else if bed >= sea_level {
        CellType::IceFreeLand
    } else {
        CellType::IceFreeOcean
    }
}

/// Surface elevation: `b + H` where grounded, the flotation surface otherwise.
pub fn surface_elevation(thickness: f64, bed: f64, sea_level: f64, rho_i: f64, rho_o: f64) -> f64 {
    let floating_surface = sea_level + (1.0 - rho_i / rho_o) * thickness;
    let grounded_surface = bed + thickness;
    match mask_at(thickness, bed, sea_level, rho_i, rho_o) {
        CellType::Floating | CellType::IceFreeOcean => floating_surface,
        _ => grounded_surface,
    }
}

/// Recompute `mask` and `usurf` from `thk`, `topg`, and sea level, ghosts included.
pub fn update_geometry(store: &mut FieldStore, constants: &Constants, sea_level: f64) -> Result<()> {
    let (thk, bed) = (store.id(Var::Thickness)?, store.id(Var::Bed)?);
    store.update_ghosts(thk)?;
    store.update_ghosts(bed)?;
    let ids = [store.id(Var::Mask)?, store.id(Var::Surface)?];
    let grid = std::sync::Arc::clone(store.grid());
    let (rho_i, rho_o) = (constants.ice_density, constants.sea_water_density);
    {
        let ([mut mask, mut usurf], view) = store.split_mut(ids)?;
        let h = view.access(thk)?;
        let b = view.access(bed)?;
        for (i, j) in grid.points() {
            let (hh, bb) = (h.get(i, j), b.get(i, j));
            mask.set(i, j, mask_at(hh, bb, sea_level, rho_i, rho_o).value());
            usurf.set(i, j, surface_elevation(hh, bb, sea_level, rho_i, rho_o));
        }
    }
    for id in ids {
        store.update_ghosts(id)?;
    }
    Ok(())
}

/// Cell type stored in a mask value, treating unknown values as ice-free land.
pub fn cell_type(mask_value: f64) -> CellType {
    CellType::from_value(mask_value).unwrap_or(CellType::IceFreeLand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Grid, GridParameters};
    use std::sync::Arc;

    const RHO_I: f64 = 910.0;
    const RHO_O: f64 = 1028.0;

    #[test]
    fn test_flotation_switch() {
        let critical = RHO_O / RHO_I * 500.0;
        assert_eq!(mask_at(critical - 1e-6, -500.0, 0.0, RHO_I, RHO_O), CellType::Floating);
        assert_eq!(mask_at(critical + 1e-6, -500.0, 0.0, RHO_I, RHO_O), CellType::Grounded);
    }

    #[test]
    fn test_ice_free_states() {
        assert_eq!(mask_at(0.0, 10.0, 0.0, RHO_I, RHO_O), CellType::IceFreeLand);
        assert_eq!(mask_at(0.0, -10.0, 0.0, RHO_I, RHO_O), CellType::IceFreeOcean);
        assert_eq!(mask_at(0.0, 0.0, 0.0, RHO_I, RHO_O), CellType::IceFreeLand);
    }

    #[test]
    fn test_surface_formula_switches() {
        let floating = surface_elevation(300.0, -500.0, 0.0, RHO_I, RHO_O);
        assert!((floating - 300.0 * (1.0 - RHO_I / RHO_O)).abs() < 1e-12);
        assert_eq!(surface_elevation(600.0, -500.0, 0.0, RHO_I, RHO_O), 100.0);
    }

    #[test]
    fn test_mask_values_round_trip() {
        for c in [CellType::IceFreeLand, CellType::Grounded, CellType::Floating, CellType::IceFreeOcean] {
            assert_eq!(CellType::from_value(c.value()), Some(c));
        }
    }

    #[test]
    fn test_update_geometry_is_fixed_point() {
        let grid = Arc::new(Grid::serial(GridParameters::new(5, 5, 1e3, 1e3)).unwrap());
        let mut store = FieldStore::new(Arc::clone(&grid));
        for v in [Var::Thickness, Var::Bed, Var::Mask, Var::Surface] {
            store.ensure(v).unwrap();
        }
        let (thk, bed, mask) = (
            store.id(Var::Thickness).unwrap(),
            store.id(Var::Bed).unwrap(),
            store.id(Var::Mask).unwrap(),
        );
        {
            let ([mut h, mut b], _) = store.split_mut([thk, bed]).unwrap();
            for (i, j) in grid.points() {
                h.set(i, j, 100.0 * i as f64);
                b.set(i, j, -200.0 + 50.0 * j as f64);
            }
        }
        let constants = Constants::default();
        update_geometry(&mut store, &constants, 0.0).unwrap();
        let first = store.snapshot(mask).unwrap();
        update_geometry(&mut store, &constants, 0.0).unwrap();
        assert_eq!(first, store.snapshot(mask).unwrap());
    }
}
