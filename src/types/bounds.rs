//! Horizontal domain extent.

use std::fmt;

/// Rectangular horizontal domain described by its center and half-widths.
///
/// The computational box spans `[x0 - lx, x0 + lx] × [y0 - ly, y0 + ly]`.
///
/// # Example
///
/// ```
/// use icesheet_rs::types::DomainExtent;
///
/// let ext = DomainExtent::centered(800e3, 400e3);
/// assert_eq!(ext.x_min(), -800e3);
/// assert_eq!(ext.height(), 800e3);
/// assert!(ext.contains(0.0, 399e3));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DomainExtent {
    /// x-coordinate of the domain center
    pub x0: f64,
    /// y-coordinate of the domain center
    pub y0: f64,
    /// Half-width in x
    pub lx: f64,
    /// Half-width in y
    pub ly: f64,
}

impl DomainExtent {
    /// Domain centered at the origin.
    pub fn centered(lx: f64, ly: f64) -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            lx,
            ly,
        }
    }

    /// Western edge.
    pub fn x_min(&self) -> f64 {
        self.x0 - self.lx
    }

    /// Southern edge.
    pub fn y_min(&self) -> f64 {
        self.y0 - self.ly
    }

    /// Full width in x.
    pub fn width(&self) -> f64 {
        2.0 * self.lx
    }

    /// Full height in y.
    pub fn height(&self) -> f64 {
        2.0 * self.ly
    }

    /// Check whether a point lies in the closed box.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (x - self.x0).abs() <= self.lx && (y - self.y0).abs() <= self.ly
    }
}

impl fmt::Display for DomainExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.1}, {:.1}] km x [{:.1}, {:.1}] km",
            self.x_min() / 1e3,
            (self.x0 + self.lx) / 1e3,
            self.y_min() / 1e3,
            (self.y0 + self.ly) / 1e3
        )
    }
}
