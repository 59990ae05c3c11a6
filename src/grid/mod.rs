//! Horizontal grid, vertical levels, and the rank partition.
//!
//! The grid is created once at startup and shared by every component
//! through an `Arc<Grid>`. Global indices are `isize` so stencils can step
//! one cell outside the owned patch into the ghost halo.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::grid::{Grid, GridParameters};
//!
//! let params = GridParameters::new(61, 61, 800e3, 800e3).with_vertical(31, 4000.0);
//! let grid = Grid::serial(params).unwrap();
//!
//! assert_eq!(grid.dx(), 1600e3 / 60.0);
//! assert_eq!(grid.x(0), -800e3);
//! assert_eq!(grid.z().len(), 31);
//! ```

mod comm;
pub(crate) mod ghosts;
#[cfg(feature = "mpi")]
mod mpi_comm;
mod partition;
mod vertical;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{IceError, Result};
use crate::types::{DomainExtent, SideNeighbors};

pub use comm::{Communicator, ReduceOp, SerialComm, ThreadComm, tags};
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
pub use partition::{Partition, Patch};
pub use vertical::{VerticalSpacing, bedrock_levels};

/// Widest ghost halo any field may request.
pub const MAX_GHOST_WIDTH: usize = 2;

// =============================================================================
// Parameters
// =============================================================================

/// Horizontal periodicity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Periodicity {
    #[default]
    None,
    X,
    Y,
    XY,
}

impl Periodicity {
    pub fn x(self) -> bool {
        matches!(self, Self::X | Self::XY)
    }

    pub fn y(self) -> bool {
        matches!(self, Self::Y | Self::XY)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::X => "x",
            Self::Y => "y",
            Self::XY => "xy",
        }
    }
}

impl FromStr for Periodicity {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "" => Ok(Self::None),
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "xy" | "yx" => Ok(Self::XY),
            other => Err(IceError::config(format!("unknown periodicity '{}'", other))),
        }
    }
}

/// Everything needed to build a [`Grid`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridParameters {
    pub mx: usize,
    pub my: usize,
    pub mz: usize,
    pub mbz: usize,
    /// Domain half-widths and center
    pub extent: DomainExtent,
    pub lz: f64,
    pub lbz: f64,
    pub periodicity: Periodicity,
    pub spacing: VerticalSpacing,
    /// Ranks in x; 0 picks automatically
    pub ranks_x: usize,
}

impl GridParameters {
    /// Horizontal grid centered at the origin, default vertical.
    pub fn new(mx: usize, my: usize, lx: f64, ly: f64) -> Self {
        Self {
            mx,
            my,
            mz: 31,
            mbz: 1,
            extent: DomainExtent::centered(lx, ly),
            lz: 4000.0,
            lbz: 0.0,
            periodicity: Periodicity::None,
            spacing: VerticalSpacing::default(),
            ranks_x: 0,
        }
    }

    /// Set the ice column levels.
    pub fn with_vertical(mut self, mz: usize, lz: f64) -> Self {
        self.mz = mz;
        self.lz = lz;
        self
    }

    /// Set the bedrock thermal layer.
    pub fn with_bedrock(mut self, mbz: usize, lbz: f64) -> Self {
        self.mbz = mbz;
        self.lbz = lbz;
        self
    }

    pub fn with_periodicity(mut self, periodicity: Periodicity) -> Self {
        self.periodicity = periodicity;
        self
    }

    pub fn with_spacing(mut self, spacing: VerticalSpacing) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_ranks_x(mut self, ranks_x: usize) -> Self {
        self.ranks_x = ranks_x;
        self
    }

    /// Read the `grid_*` options.
    pub fn from_config(config: &Config) -> Result<Self> {
        let spacing = match config.get_string("grid_ice_vertical_spacing")?.parse()? {
            VerticalSpacing::Quadratic { .. } => VerticalSpacing::Quadratic {
                lambda: config.get_double("grid_lambda")?,
            },
            equal => equal,
        };
        let params = Self {
            mx: config.get_usize("grid_Mx")?,
            my: config.get_usize("grid_My")?,
            mz: config.get_usize("grid_Mz")?,
            mbz: config.get_usize("grid_Mbz")?,
            extent: DomainExtent {
                x0: config.get_double("grid_x0")?,
                y0: config.get_double("grid_y0")?,
                lx: config.get_double("grid_Lx")?,
                ly: config.get_double("grid_Ly")?,
            },
            lz: config.get_double("grid_Lz")?,
            lbz: config.get_double("grid_Lbz")?,
            periodicity: config.get_string("grid_periodicity")?.parse()?,
            spacing,
            ranks_x: config.get_usize("grid_ranks_x")?,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check sizes and extents.
    pub fn validate(&self) -> Result<()> {
        if self.mx < 3 || self.my < 3 {
            return Err(IceError::config(format!(
                "grid must be at least 3x3, got {}x{}",
                self.mx, self.my
            )));
        }
        if self.mz < 2 {
            return Err(IceError::config(format!("Mz must be at least 2, got {}", self.mz)));
        }
        if self.mbz == 0 {
            return Err(IceError::config("Mbz must be at least 1"));
        }
        if !(self.extent.lx > 0.0 && self.extent.ly > 0.0 && self.lz > 0.0) {
            return Err(IceError::config("Lx, Ly, and Lz must be positive"));
        }
        if self.mbz > 1 && self.lbz <= 0.0 {
            return Err(IceError::config("Lbz must be positive when Mbz > 1"));
        }
        if let VerticalSpacing::Quadratic { lambda } = self.spacing
            && lambda <= 0.0
        {
            return Err(IceError::config(format!("grid_lambda must be positive, got {}", lambda)));
        }
        Ok(())
    }

    /// Horizontal spacing `(dx, dy)`.
    pub fn spacing_xy(&self) -> (f64, f64) {
        let d = |l: f64, m: usize, periodic: bool| {
            if periodic { 2.0 * l / m as f64 } else { 2.0 * l / (m - 1) as f64 }
        };
        (
            d(self.extent.lx, self.mx, self.periodicity.x()),
            d(self.extent.ly, self.my, self.periodicity.y()),
        )
    }
}

// =============================================================================
// Grid
// =============================================================================

/// The model grid as seen by one rank.
pub struct Grid {
    params: GridParameters,
    dx: f64,
    dy: f64,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    zb: Vec<f64>,
    partition: Partition,
    patch: Patch,
    neighbors: SideNeighbors<Option<usize>>,
    comm: Arc<dyn Communicator>,
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("mx", &self.params.mx)
            .field("my", &self.params.my)
            .field("mz", &self.params.mz)
            .field("mbz", &self.params.mbz)
            .field("dx", &self.dx)
            .field("dy", &self.dy)
            .field("patch", &self.patch)
            .finish()
    }
}

impl Grid {
    /// Build the grid for the calling rank of `comm`.
    pub fn new(params: GridParameters, comm: Arc<dyn Communicator>) -> Result<Self> {
        params.validate()?;
        let partition = Partition::new(params.mx, params.my, comm.size(), params.ranks_x, MAX_GHOST_WIDTH)?;
        let patch = partition.patch(comm.rank());
        let (dx, dy) = params.spacing_xy();

        // Periodic directions are cell-centered so the wrap spacing equals dx.
        let x0 = params.extent.x_min() + if params.periodicity.x() { 0.5 * dx } else { 0.0 };
        let y0 = params.extent.y_min() + if params.periodicity.y() { 0.5 * dy } else { 0.0 };
        let x = (0..params.mx).map(|i| x0 + i as f64 * dx).collect();
        let y = (0..params.my).map(|j| y0 + j as f64 * dy).collect();
        let z = params.spacing.ice_levels(params.mz, params.lz);
        let zb = bedrock_levels(params.mbz, params.lbz);

        let (px, py) = (patch.px, patch.py);
        let (nx, ny) = (partition.nx, partition.ny);
        let step = |p: usize, n: usize, forward: bool, periodic: bool| -> Option<usize> {
            if forward {
                if p + 1 < n { Some(p + 1) } else if periodic { Some(0) } else { None }
            } else if p > 0 {
                Some(p - 1)
            } else if periodic {
                Some(n - 1)
            } else {
                None
            }
        };
        let neighbors = SideNeighbors::new(
            step(py, ny, false, params.periodicity.y()).map(|q| partition.rank_of(px, q)),
            step(px, nx, true, params.periodicity.x()).map(|q| partition.rank_of(q, py)),
            step(py, ny, true, params.periodicity.y()).map(|q| partition.rank_of(px, q)),
            step(px, nx, false, params.periodicity.x()).map(|q| partition.rank_of(q, py)),
        );

        Ok(Self {
            params,
            dx,
            dy,
            x,
            y,
            z,
            zb,
            partition,
            patch,
            neighbors,
            comm,
        })
    }

    /// Single-rank grid.
    pub fn serial(params: GridParameters) -> Result<Self> {
        Self::new(params, Arc::new(SerialComm::new()))
    }

    pub fn params(&self) -> &GridParameters {
        &self.params
    }

    pub fn mx(&self) -> usize {
        self.params.mx
    }

    pub fn my(&self) -> usize {
        self.params.my
    }

    pub fn mz(&self) -> usize {
        self.params.mz
    }

    pub fn mbz(&self) -> usize {
        self.params.mbz
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn dy(&self) -> f64 {
        self.dy
    }

    pub fn lz(&self) -> f64 {
        self.params.lz
    }

    pub fn lbz(&self) -> f64 {
        self.params.lbz
    }

    pub fn extent(&self) -> DomainExtent {
        self.params.extent
    }

    pub fn periodicity(&self) -> Periodicity {
        self.params.periodicity
    }

    pub fn cell_area(&self) -> f64 {
        self.dx * self.dy
    }

    /// x coordinate of global column `i`.
    pub fn x(&self, i: isize) -> f64 {
        self.x[self.wrap_i(i) as usize]
    }

    /// y coordinate of global row `j`.
    pub fn y(&self, j: isize) -> f64 {
        self.y[self.wrap_j(j) as usize]
    }

    pub fn x_coords(&self) -> &[f64] {
        &self.x
    }

    pub fn y_coords(&self) -> &[f64] {
        &self.y
    }

    /// Ice levels, base to top.
    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// Bedrock levels, bottom to top.
    pub fn zb(&self) -> &[f64] {
        &self.zb
    }

    /// Index of the highest ice level at or below `height`.
    pub fn k_below_height(&self, height: f64) -> usize {
        match self.z.iter().rposition(|&z| z <= height) {
            Some(k) => k,
            None => 0,
        }
    }

    /// Wrap a column index into `[0, mx)` when periodic, else clamp.
    pub fn wrap_i(&self, i: isize) -> isize {
        let m = self.params.mx as isize;
        if self.params.periodicity.x() { i.rem_euclid(m) } else { i.clamp(0, m - 1) }
    }

    pub fn wrap_j(&self, j: isize) -> isize {
        let m = self.params.my as isize;
        if self.params.periodicity.y() { j.rem_euclid(m) } else { j.clamp(0, m - 1) }
    }

    /// True for cells on a non-periodic outer edge.
    pub fn is_domain_edge(&self, i: isize, j: isize) -> bool {
        let (mx, my) = (self.params.mx as isize, self.params.my as isize);
        (!self.params.periodicity.x() && (i == 0 || i == mx - 1))
            || (!self.params.periodicity.y() && (j == 0 || j == my - 1))
    }

    /// True if the face between `i` and `i + 1` lies on a closed outer boundary.
    pub fn is_closed_x_face(&self, i: isize) -> bool {
        !self.params.periodicity.x() && (i < 0 || i >= self.params.mx as isize - 1)
    }

    /// True if the face between `j` and `j + 1` lies on a closed outer boundary.
    pub fn is_closed_y_face(&self, j: isize) -> bool {
        !self.params.periodicity.y() && (j < 0 || j >= self.params.my as isize - 1)
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn neighbors(&self) -> SideNeighbors<Option<usize>> {
        self.neighbors
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// Owned points of this rank, row-major.
    pub fn points(&self) -> impl Iterator<Item = (isize, isize)> + '_ {
        self.patch.points()
    }

    /// Global sum over ranks.
    pub fn sum(&self, local: f64) -> Result<f64> {
        self.comm.all_reduce(local, ReduceOp::Sum)
    }

    /// Global minimum over ranks.
    pub fn min(&self, local: f64) -> Result<f64> {
        self.comm.all_reduce(local, ReduceOp::Min)
    }

    /// Global maximum over ranks.
    pub fn max(&self, local: f64) -> Result<f64> {
        self.comm.all_reduce(local, ReduceOp::Max)
    }

    /// Same grid geometry, so fields can be copied without regridding.
    pub fn same_geometry(&self, other: &GridParameters) -> bool {
        let p = &self.params;
        p.mx == other.mx
            && p.my == other.my
            && p.mz == other.mz
            && p.mbz == other.mbz
            && p.extent == other.extent
            && p.lz == other.lz
            && p.lbz == other.lbz
            && p.periodicity == other.periodicity
    }
}

/// An 11 x 11 serial grid over 1600 km, for unit tests.
#[cfg(test)]
pub(crate) fn test_grid() -> Arc<Grid> {
    Arc::new(Grid::serial(GridParameters::new(11, 11, 800e3, 800e3)).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spacing_periodic_and_not() {
        let params = GridParameters::new(61, 61, 800e3, 800e3);
        let (dx, _) = params.spacing_xy();
        assert_relative_eq!(dx, 1600e3 / 60.0);

        let periodic = params.with_periodicity(Periodicity::XY);
        let (dx, dy) = periodic.spacing_xy();
        assert_relative_eq!(dx, 1600e3 / 61.0);
        assert_relative_eq!(dy, 1600e3 / 61.0);
    }

    #[test]
    fn test_k_below_height() {
        let grid = Grid::serial(
            GridParameters::new(5, 5, 1e3, 1e3)
                .with_vertical(5, 100.0)
                .with_spacing(VerticalSpacing::Equal),
        )
        .unwrap();
        assert_eq!(grid.k_below_height(0.0), 0);
        assert_eq!(grid.k_below_height(30.0), 1);
        assert_eq!(grid.k_below_height(100.0), 4);
        assert_eq!(grid.k_below_height(1e4), 4);
    }

    #[test]
    fn test_serial_neighbors() {
        let grid = Grid::serial(GridParameters::new(5, 5, 1e3, 1e3)).unwrap();
        assert_eq!(grid.neighbors(), SideNeighbors::new(None, None, None, None));

        let periodic = Grid::serial(GridParameters::new(5, 5, 1e3, 1e3).with_periodicity(Periodicity::X)).unwrap();
        assert_eq!(periodic.neighbors().east, Some(0));
        assert_eq!(periodic.neighbors().north, None);
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::defaults();
        config.set_from_str("grid_Mx", "21").unwrap();
        config.set_from_str("grid_periodicity", "xy").unwrap();
        let params = GridParameters::from_config(&config).unwrap();
        assert_eq!(params.mx, 21);
        assert_eq!(params.periodicity, Periodicity::XY);
    }

    #[test]
    fn test_invalid_grid_rejected() {
        let mut params = GridParameters::new(61, 61, 800e3, 800e3);
        params.mz = 1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_closed_faces() {
        let grid = Grid::serial(GridParameters::new(5, 5, 1e3, 1e3).with_periodicity(Periodicity::Y)).unwrap();
        assert!(grid.is_closed_x_face(-1));
        assert!(grid.is_closed_x_face(4));
        assert!(!grid.is_closed_x_face(2));
        assert!(!grid.is_closed_y_face(4));
    }
}
