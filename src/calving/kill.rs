//! Calving by mask: ocean-kill, float-kill, and thickness calving.

use std::sync::Arc;

use tracing::debug;

use super::remove_ice;
use crate::components::{CalvingModel, CalvingStats, Component, InitContext};
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::geometry::{CellType, cell_type};
use crate::grid::Grid;
use crate::io::read_field;
use crate::types::FieldId;

#[derive(Clone, Copy, Debug)]
struct KillFields {
    thk: FieldId,
    href: FieldId,
    mask: FieldId,
}

impl KillFields {
    fn ensure(store: &mut FieldStore) -> Result<Self> {
        Ok(Self {
            thk: store.ensure(Var::Thickness)?,
            href: store.ensure(Var::ThicknessRef)?,
            mask: store.ensure(Var::Mask)?,
        })
    }
}

fn uninitialized(name: &str) -> IceError {
    IceError::Lifecycle {
        component: name.into(),
        state: "uninitialized".into(),
    }
}

/// Remove ice wherever `condition(cell type, H, flag)` holds, where
/// `flag` is the value of an optional extra field at the cell.
fn kill_where(
    grid: &Grid,
    f: KillFields,
    extra: Option<FieldId>,
    store: &mut FieldStore,
    condition: impl Fn(CellType, f64, f64) -> bool,
) -> Result<CalvingStats> {
    let mut stats = CalvingStats::default();
    let ([mut thk, mut href], view) = store.split_mut([f.thk, f.href])?;
    let mask = view.access(f.mask)?;
    let extra = extra.map(|id| view.access(id)).transpose()?;
    for (i, j) in grid.points() {
        let flag = extra.as_ref().map_or(0.0, |e| e.get(i, j));
        if condition(cell_type(mask.get(i, j)), thk.get(i, j), flag) {
            remove_ice(&mut thk, &mut href, i, j, &mut stats);
        }
    }
    Ok(stats)
}

// =============================================================================
// Ocean kill
// =============================================================================

/// Keeps the ice-free ocean of the initial state free of ice.
#[derive(Debug, Default)]
pub struct OceanKill {
    grid: Option<Arc<Grid>>,
    fields: Option<(KillFields, FieldId)>,
}

impl OceanKill {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for OceanKill {
    fn name(&self) -> &str {
        "ocean_kill"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        let f = KillFields::ensure(store)?;
        let kill_mask = store.ensure(Var::OceanKillMask)?;
        let loaded = match ctx.input {
            Some(ds) if !ctx.bootstrap => read_field(store, kill_mask, ds, "input")?,
            _ => false,
        };
        if !loaded {
            let ([mut km], view) = store.split_mut([kill_mask])?;
            let mask = view.access(f.mask)?;
            for (i, j) in ctx.grid.points() {
                let open_ocean = cell_type(mask.get(i, j)) == CellType::IceFreeOcean;
                km.set(i, j, if open_ocean { 1.0 } else { 0.0 });
            }
        }
        debug!(from_file = loaded, "ocean kill mask");
        self.fields = Some((f, kill_mask));
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["thk", "Href", "mask", "ocean_kill_mask"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["thk", "Href"]
    }
}

impl CalvingModel for OceanKill {
    fn update(&mut self, _t: f64, _dt: f64, _sea_level: f64, store: &mut FieldStore) -> Result<CalvingStats> {
        let (grid, (f, kill_mask)) = self.grid.clone().zip(self.fields).ok_or_else(|| uninitialized("ocean_kill"))?;
        kill_where(&grid, f, Some(kill_mask), store, |_, _, flag| flag > 0.5)
    }
}

// =============================================================================
// Float kill
// =============================================================================

/// Removes all floating ice.
#[derive(Debug, Default)]
pub struct FloatKill {
    grid: Option<Arc<Grid>>,
    fields: Option<KillFields>,
}

impl FloatKill {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for FloatKill {
    fn name(&self) -> &str {
        "float_kill"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.fields = Some(KillFields::ensure(store)?);
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["thk", "Href", "mask"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["thk", "Href"]
    }
}

impl CalvingModel for FloatKill {
    fn update(&mut self, _t: f64, _dt: f64, _sea_level: f64, store: &mut FieldStore) -> Result<CalvingStats> {
        let (grid, f) = self.grid.clone().zip(self.fields).ok_or_else(|| uninitialized("float_kill"))?;
        kill_where(&grid, f, None, store, |cell, _, _| cell == CellType::Floating)
    }
}

// =============================================================================
// Thickness calving
// =============================================================================

/// Removes floating ice thinner than `thickness_calving_threshold`.
#[derive(Debug, Default)]
pub struct ThicknessCalving {
    /// m
    threshold: f64,
    grid: Option<Arc<Grid>>,
    fields: Option<KillFields>,
}

impl ThicknessCalving {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Component for ThicknessCalving {
    fn name(&self) -> &str {
        "thickness_calving"
    }

    fn init(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.threshold = ctx.config.get_double("thickness_calving_threshold")?;
        self.fields = Some(KillFields::ensure(store)?);
        self.grid = Some(Arc::clone(ctx.grid));
        Ok(())
    }

    fn declare_inputs(&self) -> Vec<&'static str> {
        vec!["thk", "Href", "mask"]
    }

    fn declare_outputs(&self) -> Vec<&'static str> {
        vec!["thk", "Href"]
    }
}

impl CalvingModel for ThicknessCalving {
    fn update(&mut self, _t: f64, _dt: f64, _sea_level: f64, store: &mut FieldStore) -> Result<CalvingStats> {
        let (grid, f) = self.grid.clone().zip(self.fields).ok_or_else(|| uninitialized("thickness_calving"))?;
        let threshold = self.threshold;
        kill_where(&grid, f, None, store, |cell, h, _| {
            cell == CellType::Floating && h < threshold
        })
    }
}
