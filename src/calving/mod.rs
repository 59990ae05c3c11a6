//! Calving policies.
//!
//! Each enabled policy removes ice after the mass continuity step, in
//! the order listed:
//!
//! | Option | Policy |
//! |---|---|
//! | `ocean_kill` | [`OceanKill`]: no ice where the initial mask was open ocean |
//! | `float_kill` | [`FloatKill`]: no floating ice |
//! | `thickness_calving_threshold` | [`ThicknessCalving`]: no floating ice thinner than the threshold |
//! | `kill_icebergs` | [`IcebergRemover`]: no floating ice detached from grounded ice |
//!
//! Removed thickness is reported so the mass budget can account for it.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::calving::calving_from_config;
//! use icesheet_rs::components::Component;
//! use icesheet_rs::config::Config;
//!
//! let mut config = Config::defaults();
//! config.set_flag("float_kill", true).unwrap();
//! config.set_flag("kill_icebergs", true).unwrap();
//! let names: Vec<String> = calving_from_config(&config)
//!     .unwrap()
//!     .iter()
//!     .map(|c| c.name().to_string())
//!     .collect();
//! assert_eq!(names, ["float_kill", "iceberg_remover"]);
//! ```

mod icebergs;
mod kill;

use crate::components::{CalvingModel, CalvingStats};
use crate::config::Config;
use crate::error::Result;
use crate::fields::FieldWrite;

pub use icebergs::{IcebergRemover, find_icebergs};
pub use kill::{FloatKill, OceanKill, ThicknessCalving};

/// Remove all ice at `(i, j)`, including any partial-cell thickness.
pub(crate) fn remove_ice(
    thk: &mut FieldWrite<'_>,
    href: &mut FieldWrite<'_>,
    i: isize,
    j: isize,
    stats: &mut CalvingStats,
) {
    let removed = thk.get(i, j) + href.get(i, j);
    if removed > 0.0 {
        stats.removed += removed;
        stats.cells += 1;
    }
    thk.set(i, j, 0.0);
    href.set(i, j, 0.0);
}

/// Build the enabled calving policies in application order.
pub fn calving_from_config(config: &Config) -> Result<Vec<Box<dyn CalvingModel>>> {
    let mut policies: Vec<Box<dyn CalvingModel>> = Vec::new();
    if config.get_flag("ocean_kill")? {
        policies.push(Box::new(OceanKill::new()));
    }
    if config.get_flag("float_kill")? {
        policies.push(Box::new(FloatKill::new()));
    }
    if config.get_double("thickness_calving_threshold")? > 0.0 {
        policies.push(Box::new(ThicknessCalving::new()));
    }
    if config.get_flag("kill_icebergs")? {
        policies.push(Box::new(IcebergRemover::new()));
    }
    Ok(policies)
}
