//! Vertical level sets for the ice column and the bedrock thermal layer.
//!
//! Ice levels run from the base (`z = 0`) to the top of the computational
//! box (`z = Lz`); bedrock levels run from `-Lbz` up to the ice base.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::grid::VerticalSpacing;
//!
//! let z = VerticalSpacing::Quadratic { lambda: 4.0 }.ice_levels(5, 4000.0);
//! assert_eq!(z[0], 0.0);
//! assert_eq!(z[4], 4000.0);
//! assert!(z[1] - z[0] < z[4] - z[3]);
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IceError;

/// Distribution of the ice levels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum VerticalSpacing {
    /// Equally spaced levels.
    Equal,
    /// Finer spacing near the base, controlled by `lambda`.
    Quadratic { lambda: f64 },
}

impl Default for VerticalSpacing {
    fn default() -> Self {
        Self::Quadratic { lambda: 4.0 }
    }
}

impl VerticalSpacing {
    /// Ice levels `z[0..mz]` with `z[0] = 0` and `z[mz-1] = lz`.
    pub fn ice_levels(&self, mz: usize, lz: f64) -> Vec<f64> {
        let last = (mz.max(2) - 1) as f64;
        (0..mz)
            .map(|k| {
                let zeta = k as f64 / last;
                match *self {
                    Self::Equal => lz * zeta,
                    Self::Quadratic { lambda } => lz * (zeta / lambda) * (1.0 + (lambda - 1.0) * zeta),
                }
            })
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Quadratic { .. } => "quadratic",
        }
    }
}

impl FromStr for VerticalSpacing {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal" => Ok(Self::Equal),
            "quadratic" => Ok(Self::default()),
            other => Err(IceError::config(format!("unknown vertical spacing '{}'", other))),
        }
    }
}

/// Bedrock levels, equally spaced over `[-lbz, 0]`. One level means no layer.
pub fn bedrock_levels(mbz: usize, lbz: f64) -> Vec<f64> {
    if mbz <= 1 {
        return vec![0.0];
    }
    let dz = lbz / (mbz - 1) as f64;
    (0..mbz).map(|k| -lbz + k as f64 * dz).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_equal_levels() {
        let z = VerticalSpacing::Equal.ice_levels(5, 100.0);
        assert_eq!(z, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn test_quadratic_strictly_increasing() {
        let z = VerticalSpacing::default().ice_levels(31, 4000.0);
        assert!(z.windows(2).all(|w| w[1] > w[0]));
        assert_relative_eq!(z[30], 4000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bedrock_levels() {
        let zb = bedrock_levels(3, 1000.0);
        assert_eq!(zb, vec![-1000.0, -500.0, 0.0]);
        assert_eq!(bedrock_levels(1, 0.0), vec![0.0]);
    }
}
