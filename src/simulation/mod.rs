//! Model assembly and the coupling loop.
//!
//! This module ties together:
//! - **Setup**: grid, fields, and clock from the configuration and an
//!   optional input file (full restart or bootstrap from partial data)
//! - **Step executor**: the fixed per-step update order, the skip policy
//!   for energy steps, and scheduled diagnostic output
//! - **Run loop**: stepping to the end, save and stop requests, the
//!   diagnostic dump on failure, and run statistics
//! - **Hooks and signals**: per-step closures for derived runs and
//!   `SIGTERM`/`SIGUSR1` handling
//!
//! # Example
//!
//! ```no_run
//! use icesheet_rs::config::Config;
//! use icesheet_rs::simulation::Model;
//!
//! let mut config = Config::defaults();
//! config.set_double("run_length_years", 100.0).unwrap();
//! config.set_string("output_file", "out.bin").unwrap();
//!
//! let mut model = Model::new(config).unwrap();
//! let summary = model.run().unwrap();
//! println!("{} steps, {:?}", summary.n_steps, summary.reasons);
//! ```

mod bootstrap;
mod executor;
mod hooks;
mod model;
mod runner;
mod signals;

pub use bootstrap::Loaded;
pub use executor::StepReport;
pub use hooks::{Hooks, StepHook};
pub use model::{Model, OutputSettings, OutputSize};
pub use runner::{ExitCause, RunSummary};
pub use signals::{SignalRequest, Signals};
