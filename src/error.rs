//! Error types shared by every part of the model.
//!
//! Errors propagate up to the step executor, which is the single place
//! that writes a diagnostic dump before a fatal exit.

use thiserror::Error;

/// The seven classes of failure the model distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown option or incompatible combination of options.
    Configuration,
    /// Missing or malformed input data.
    Input,
    /// A field value outside its declared valid range.
    Bounds,
    /// An iterative solver exceeded its iteration budget.
    NotConverged,
    /// The planned time step fell below the configured floor.
    TimestepFloor,
    /// The mass budget failed to close.
    MassClosure,
    /// I/O, encoding, or inter-process communication failure.
    External,
}

/// Error type for all model operations.
#[derive(Debug, Error)]
pub enum IceError {
    /// Invalid or incompatible configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Required input missing or unusable.
    #[error("input error in '{file}': {message}")]
    Input { file: String, message: String },

    /// Value outside the declared valid range.
    #[error("field '{field}' at ({i}, {j}) has value {value} outside [{min}, {max}] (file '{file}')")]
    Bounds {
        field: String,
        i: isize,
        j: isize,
        value: f64,
        min: f64,
        max: f64,
        file: String,
    },

    /// Iterative solve did not converge.
    #[error("{component} did not converge after {iterations} iterations")]
    NotConverged {
        component: String,
        iterations: usize,
    },

    /// Planned time step below the floor.
    #[error("time step {dt:.3e} s is below the floor {floor:.3e} s")]
    TimestepFloor { dt: f64, floor: f64 },

    /// Mass budget residual above the error tolerance.
    #[error("mass closure residual {residual:.6e} m^3 exceeds tolerance {tolerance:.6e} m^3")]
    MassClosure { residual: f64, tolerance: f64 },

    /// Too many ice temperatures below the allowed minimum.
    #[error("{count} ice temperatures below the allowed minimum (at most {max} allowed)")]
    LowTemperature { count: usize, max: usize },

    /// Ice thicker than the computational box.
    #[error("ice thickness {thickness:.2} m at ({i}, {j}) exceeds the vertical extent Lz = {lz:.2} m")]
    ThicknessExceedsGrid {
        i: isize,
        j: isize,
        thickness: f64,
        lz: f64,
    },

    /// Field not registered in the store.
    #[error("field '{0}' is not registered")]
    Missing(String),

    /// Field shapes disagree.
    #[error("shape mismatch for '{field}': expected {expected}, found {found}")]
    ShapeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Cross-cell read attempted with stale ghosts.
    #[error("ghost cells of '{0}' are stale")]
    StaleGhosts(String),

    /// Component used outside its legal lifecycle state.
    #[error("component '{component}' is {state}, operation not allowed")]
    Lifecycle { component: String, state: String },

    /// Message passing failure.
    #[error("communication error: {0}")]
    Comm(String),

    /// Optional feature not compiled in.
    #[error("{0} support is not enabled in this build")]
    FeatureDisabled(&'static str),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Native state file encoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// JSON error (time-series files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// NetCDF library error.
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),
}

impl IceError {
    /// Map this error onto its failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::Lifecycle { .. } => ErrorKind::Configuration,
            Self::Input { .. } | Self::Missing(_) | Self::ShapeMismatch { .. } => ErrorKind::Input,
            Self::Bounds { .. }
            | Self::LowTemperature { .. }
            | Self::ThicknessExceedsGrid { .. }
            | Self::StaleGhosts(_) => ErrorKind::Bounds,
            Self::NotConverged { .. } => ErrorKind::NotConverged,
            Self::TimestepFloor { .. } => ErrorKind::TimestepFloor,
            Self::MassClosure { .. } => ErrorKind::MassClosure,
            Self::Comm(_)
            | Self::FeatureDisabled(_)
            | Self::Io(_)
            | Self::Encoding(_)
            | Self::Json(_)
            | Self::Toml(_) => ErrorKind::External,
            #[cfg(feature = "netcdf")]
            Self::NetCDF(_) => ErrorKind::External,
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for an input error.
    pub fn input(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Input {
            file: file.into(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(IceError::config("x").kind(), ErrorKind::Configuration);
        assert_eq!(IceError::input("f.nc", "no thk").kind(), ErrorKind::Input);
        assert_eq!(
            IceError::TimestepFloor { dt: 1.0, floor: 2.0 }.kind(),
            ErrorKind::TimestepFloor
        );
        assert_eq!(
            IceError::Missing("thk".into()).kind(),
            ErrorKind::Input
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(IceError::from(io).kind(), ErrorKind::External);
    }

    #[test]
    fn test_display_names_cell() {
        let err = IceError::Bounds {
            field: "thk".into(),
            i: 3,
            j: 4,
            value: -1.0,
            min: 0.0,
            max: 1e4,
            file: "in.bin".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("(3, 4)"));
        assert!(msg.contains("in.bin"));
    }
}
