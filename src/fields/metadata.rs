//! Per-field metadata and shapes.

use serde::{Deserialize, Serialize};

use crate::grid::Grid;

/// Fill value marking missing data in output files.
pub const FILL_VALUE: f64 = 9.96920996838687e36;

/// Storage shape of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldShape {
    /// One value per column
    Scalar2D,
    /// Two components per column
    Vector2D,
    /// One value per ice level
    Ice3D,
    /// One value per bedrock level
    Bedrock3D,
}

impl FieldShape {
    /// Values stored per horizontal column.
    pub fn dof(self, grid: &Grid) -> usize {
        match self {
            Self::Scalar2D => 1,
            Self::Vector2D => 2,
            Self::Ice3D => grid.mz(),
            Self::Bedrock3D => grid.mbz(),
        }
    }

    pub fn is_3d(self) -> bool {
        matches!(self, Self::Ice3D | Self::Bedrock3D)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Scalar2D => "2-D scalar",
            Self::Vector2D => "2-D vector",
            Self::Ice3D => "3-D ice",
            Self::Bedrock3D => "3-D bedrock",
        }
    }
}

/// Descriptive attributes of a field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub name: String,
    pub long_name: String,
    pub standard_name: Option<String>,
    /// Internal (SI) units
    pub units: String,
    /// Units used in output files
    pub glaciological_units: Option<String>,
    pub valid_range: Option<(f64, f64)>,
    /// Out-of-range values only warn
    pub range_advisory: bool,
    pub fill_value: f64,
    pub time_independent: bool,
    /// Allowed values of a categorical field
    pub flag_values: Vec<f64>,
}

impl FieldMetadata {
    pub fn new(name: impl Into<String>, long_name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            long_name: long_name.into(),
            standard_name: None,
            units: units.into(),
            glaciological_units: None,
            valid_range: None,
            range_advisory: false,
            fill_value: FILL_VALUE,
            time_independent: false,
            flag_values: Vec::new(),
        }
    }

    pub fn with_standard_name(mut self, name: impl Into<String>) -> Self {
        self.standard_name = Some(name.into());
        self
    }

    pub fn with_glaciological_units(mut self, units: impl Into<String>) -> Self {
        self.glaciological_units = Some(units.into());
        self
    }

    pub fn with_valid_range(mut self, min: f64, max: f64) -> Self {
        self.valid_range = Some((min, max));
        self
    }

    pub fn with_valid_min(self, min: f64) -> Self {
        self.with_valid_range(min, f64::INFINITY)
    }

    /// Make the valid range a warning only.
    pub fn advisory(mut self) -> Self {
        self.range_advisory = true;
        self
    }

    pub fn time_independent(mut self) -> Self {
        self.time_independent = true;
        self
    }

    pub fn with_flags(mut self, flags: &[f64]) -> Self {
        self.flag_values = flags.to_vec();
        self
    }

    pub fn is_categorical(&self) -> bool {
        !self.flag_values.is_empty()
    }

    /// Units used when writing.
    pub fn output_units(&self) -> &str {
        self.glaciological_units.as_deref().unwrap_or(&self.units)
    }

    pub fn in_range(&self, value: f64) -> bool {
        match self.valid_range {
            Some((min, max)) => value >= min && value <= max,
            None => true,
        }
    }
}
