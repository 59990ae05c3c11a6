//! Physical components and their shared surface.
//!
//! This module provides:
//! - **Capability traits**: [`Component`] plus one trait per component kind
//! - **Lifecycle**: [`Managed`] tracks `Uninitialized → Initialized → Running`
//!   and makes updates idempotent in `(t, dt)`
//! - **Registry**: [`ComponentRegistry`] holds one slot per kind in step order
//! - **Dependency graph**: producers and readers of every declared field
//!
//! # Example
//!
//! ```
//! use icesheet_rs::components::ComponentRegistry;
//! use icesheet_rs::config::Config;
//!
//! let registry = ComponentRegistry::from_config(&Config::defaults()).unwrap();
//! let graph = registry.dependency_graph().unwrap();
//! assert_eq!(graph.producer_of("thk"), Some("mass_continuity"));
//! assert_eq!(graph.producer_of("tauc"), Some("mohr_coulomb"));
//! ```

mod graph;
mod lifecycle;
mod registry;
mod traits;

pub use graph::DependencyGraph;
pub use lifecycle::{Lifecycle, Managed};
pub use registry::{ComponentRegistry, Slot};
pub use traits::{
    AgeModel, AtmosphereModel, BedDeformation, BedThermal, CalvingModel, CalvingStats, Component, EnergyModel,
    EnergyStats, Hydrology, HydrologyStats, InitContext, MaxTimestep, OceanModel, StressBalance,
    StressBalanceStats, SurfaceModel, YieldStress,
};
