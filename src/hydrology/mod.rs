//! Subglacial hydrology.
//!
//! Both models keep a till water layer `tillwat` that stores basal melt
//! up to `hydrology_tillwat_max` and drains slowly at
//! `hydrology_tillwat_decay_rate`. The routing model additionally moves
//! the overflow through a transportable layer `bwat` driven by the
//! hydraulic potential.
//!
//! | `hydrology_model` | Model |
//! |---|---|
//! | `till_can` | [`TillCan`] |
//! | `routing` | [`Routing`] |
//!
//! # Example
//!
//! ```
//! use icesheet_rs::hydrology::till_step;
//!
//! // 1 m of storage, filled past capacity
//! let (w, overflow) = till_step(0.9, 1e-6, 0.0, 1.0, 2e5);
//! assert_eq!(w, 1.0);
//! assert!((overflow - 0.1).abs() < 1e-12);
//! ```

mod routing;
mod till_can;

use crate::components::Hydrology;
use crate::config::Config;
use crate::error::{IceError, Result};

pub use routing::Routing;
pub use till_can::TillCan;

/// Advance one till column by `dt`.
///
/// `input` and `decay` are water-equivalent rates, m s-1. Returns the new
/// thickness, clamped to `[0, max]`, and the water that did not fit.
pub fn till_step(w: f64, input: f64, decay: f64, max: f64, dt: f64) -> (f64, f64) {
    let w = w + dt * (input - decay);
    if w > max { (max, w - max) } else { (w.max(0.0), 0.0) }
}

/// Build the hydrology model named by `hydrology_model`.
pub fn hydrology_from_config(config: &Config) -> Result<Box<dyn Hydrology>> {
    match config.get_string("hydrology_model")?.as_str() {
        "till_can" => Ok(Box::new(TillCan::new())),
        "routing" => Ok(Box::new(Routing::new())),
        other => Err(IceError::config(format!("unknown hydrology model '{}'", other))),
    }
}
