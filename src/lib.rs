//! # icesheet-rs
//!
//! A parallel, thermomechanically coupled ice-sheet model.
//!
//! The model advances ice geometry, enthalpy, age, basal hydrology, yield
//! stress, and bed elevation on a structured grid distributed over ranks.
//! A central loop picks each step's length from stability bounds and
//! component advice, runs the components in a fixed order, and checks
//! that the mass budget closes.
//!
//! This crate provides:
//! - Structured grid, domain decomposition, and ghost exchange ([`grid`])
//! - A named, typed field store with scoped access ([`fields`])
//! - Calendars, time units, and scheduled output times ([`time`])
//! - Physical components: couplers, stress balance, energy, hydrology,
//!   yield stress, mass continuity, calving, bed deformation
//! - The step planner ([`planner`]), executor ([`simulation`]), and mass
//!   accountant ([`accounting`])
//! - State, extras, and time-series files ([`io`])
//! - The `icesheet` command line ([`cli`])

pub mod accounting;
pub mod basal;
pub mod beddef;
pub mod calving;
pub mod cli;
pub mod components;
pub mod config;
pub mod coupler;
pub mod energy;
pub mod error;
pub mod fields;
pub mod geometry;
pub mod grid;
pub mod hydrology;
pub mod io;
pub mod masscont;
pub mod planner;
pub mod simulation;
pub mod stressbalance;
pub mod time;
pub mod types;

// Re-export main types for convenience
pub use accounting::{MassAccountant, MassBudget};
pub use components::{Component, ComponentRegistry, MaxTimestep};
pub use config::{Config, Constants};
pub use error::{ErrorKind, IceError, Result};
pub use fields::{FieldStore, Var};
pub use geometry::CellType;
pub use grid::{Grid, GridParameters, Periodicity};
pub use planner::{StepDecision, StepPlanner, StepReason};
pub use simulation::{ExitCause, Model, RunSummary};
pub use time::ModelTime;
