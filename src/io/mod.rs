//! File input and output.
//!
//! This module provides:
//! - **Datasets**: a format-neutral in-memory picture of a file (global
//!   attributes, dimensions, variables)
//! - **Backends**: native `bincode` files and CF-conventions NetCDF
//!   (requires the `netcdf` feature), chosen by file extension
//! - **State files**: gathering distributed fields into datasets and back
//! - **Extras**: spatial diagnostics accumulated record by record
//! - **Scalar time series**: JSON columns of global diagnostics
//! - **Scalar forcing**: two-column text files of offsets in time
//!
//! # File Formats
//!
//! ## Scalar Forcing Files
//!
//! ```text
//! # Sea level record
//! # units: m
//! -20000.0 -120.0
//! 0.0 0.0
//! ```
//!
//! # Example
//!
//! ```
//! use icesheet_rs::io::{Dataset, read_dataset, write_dataset};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("state.bin");
//!
//! let mut ds = Dataset::new();
//! ds.add_dim("x", 3).unwrap();
//! ds.add_var("x", &["x"], vec![-1.0, 0.0, 1.0]).unwrap();
//! write_dataset(&path, &ds).unwrap();
//! assert_eq!(read_dataset(&path).unwrap(), ds);
//! ```

mod dataset;
mod extras;
mod forcing;
mod native;
#[cfg(feature = "netcdf")]
mod netcdf;
mod state;
mod timeseries;

use std::path::Path;

use crate::error::Result;

pub use dataset::{AttrValue, Dataset, Variable};
pub use extras::ExtrasWriter;
pub use forcing::{ForcingFileError, ScalarForcing, parse_forcing, read_forcing_file};
pub use native::{read_native, write_native};
pub use state::{
    add_fields, file_names, gather_field, grid_dataset, grid_parameters_from, read_field, read_time,
    scatter_field,
};
pub use timeseries::{ScalarSeries, TimeSeriesWriter, read_scalar_series};

fn is_netcdf(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "nc")
}

/// Write `dataset` to `path`, choosing the backend by extension.
pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    if is_netcdf(path) {
        #[cfg(feature = "netcdf")]
        return netcdf::write_netcdf(path, dataset);
        #[cfg(not(feature = "netcdf"))]
        return Err(crate::error::IceError::FeatureDisabled("NetCDF"));
    }
    write_native(path, dataset)
}

/// Read the file at `path`, choosing the backend by extension.
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(crate::error::IceError::input(path.display().to_string(), "file not found"));
    }
    if is_netcdf(path) {
        #[cfg(feature = "netcdf")]
        return netcdf::read_netcdf(path);
        #[cfg(not(feature = "netcdf"))]
        return Err(crate::error::IceError::FeatureDisabled("NetCDF"));
    }
    read_native(path)
}

/// A history line: `user@host YYYY-MM-DD HH:MM:SS: message`.
pub fn history_entry(message: &str) -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let now = chrono::Local::now();
    format!("{}@{} {}: {}", user, host, now.format("%Y-%m-%d %H:%M:%S"), message)
}
