//! Halo exchange for patch-local arrays.
//!
//! Local storage of a field with ghost width `g` and `dof` values per
//! column is row-major over `(xm + 2g) × (ym + 2g)` columns. The exchange
//! runs in two phases, x first then y over the full local width, so the
//! corner ghosts are filled by the second phase.

use super::Grid;
use super::comm::tags;
use crate::error::{IceError, Result};

/// Local array dimensions of a patch with ghost width `g`.
#[derive(Clone, Copy, Debug)]
struct Layout {
    nxl: usize,
    xm: usize,
    ym: usize,
    g: usize,
    dof: usize,
}

impl Layout {
    fn offset(&self, li: usize, lj: usize) -> usize {
        (li + lj * self.nxl) * self.dof
    }

    fn pack_columns(&self, data: &[f64], cols: std::ops::Range<usize>) -> Vec<f64> {
        let mut out = Vec::with_capacity(cols.len() * self.ym * self.dof);
        for lj in self.g..self.g + self.ym {
            for li in cols.clone() {
                let o = self.offset(li, lj);
                out.extend_from_slice(&data[o..o + self.dof]);
            }
        }
        out
    }

    fn unpack_columns(&self, data: &mut [f64], cols: std::ops::Range<usize>, buf: &[f64]) -> Result<()> {
        let expected = cols.len() * self.ym * self.dof;
        if buf.len() != expected {
            return Err(IceError::Comm(format!(
                "ghost message of {} values, expected {}",
                buf.len(),
                expected
            )));
        }
        let mut src = buf.chunks_exact(self.dof);
        for lj in self.g..self.g + self.ym {
            for li in cols.clone() {
                let o = self.offset(li, lj);
                if let Some(column) = src.next() {
                    data[o..o + self.dof].copy_from_slice(column);
                }
            }
        }
        Ok(())
    }

    fn pack_rows(&self, data: &[f64], rows: std::ops::Range<usize>) -> Vec<f64> {
        let mut out = Vec::with_capacity(rows.len() * self.nxl * self.dof);
        for lj in rows {
            let o = self.offset(0, lj);
            out.extend_from_slice(&data[o..o + self.nxl * self.dof]);
        }
        out
    }

    fn unpack_rows(&self, data: &mut [f64], rows: std::ops::Range<usize>, buf: &[f64]) -> Result<()> {
        let row_len = self.nxl * self.dof;
        if buf.len() != rows.len() * row_len {
            return Err(IceError::Comm(format!(
                "ghost message of {} values, expected {}",
                buf.len(),
                rows.len() * row_len
            )));
        }
        for (lj, src) in rows.zip(buf.chunks_exact(row_len)) {
            let o = self.offset(0, lj);
            data[o..o + row_len].copy_from_slice(src);
        }
        Ok(())
    }

    /// Zero-gradient fill of ghost column `li` from owned column `from`.
    fn copy_column(&self, data: &mut [f64], li: usize, from: usize) {
        for lj in self.g..self.g + self.ym {
            let (dst, src) = (self.offset(li, lj), self.offset(from, lj));
            data.copy_within(src..src + self.dof, dst);
        }
    }

    fn copy_row(&self, data: &mut [f64], lj: usize, from: usize) {
        let row_len = self.nxl * self.dof;
        let (dst, src) = (self.offset(0, lj), self.offset(0, from));
        data.copy_within(src..src + row_len, dst);
    }
}

/// Refresh the ghost cells of `data` from the neighbouring patches.
pub(crate) fn exchange(grid: &Grid, data: &mut [f64], g: usize, dof: usize) -> Result<()> {
    if g == 0 {
        return Ok(());
    }
    let patch = grid.patch();
    let layout = Layout {
        nxl: patch.xm + 2 * g,
        xm: patch.xm,
        ym: patch.ym,
        g,
        dof,
    };
    let nyl = patch.ym + 2 * g;
    if data.len() != layout.nxl * nyl * dof {
        return Err(IceError::Comm(format!(
            "local array has {} values, patch layout needs {}",
            data.len(),
            layout.nxl * nyl * dof
        )));
    }
    let comm = grid.comm();
    let nb = grid.neighbors();

    // Phase 1: x direction, owned rows only.
    if let Some(west) = nb.west {
        comm.send(west, tags::GHOST_WEST, layout.pack_columns(data, g..2 * g))?;
    }
    if let Some(east) = nb.east {
        comm.send(east, tags::GHOST_EAST, layout.pack_columns(data, layout.xm..layout.xm + g))?;
    }
    match nb.west {
        Some(west) => {
            let buf = comm.recv(west, tags::GHOST_EAST)?;
            layout.unpack_columns(data, 0..g, &buf)?;
        }
        None => (0..g).for_each(|li| layout.copy_column(data, li, g)),
    }
    match nb.east {
        Some(east) => {
            let buf = comm.recv(east, tags::GHOST_WEST)?;
            layout.unpack_columns(data, g + layout.xm..layout.nxl, &buf)?;
        }
        None => (g + layout.xm..layout.nxl).for_each(|li| layout.copy_column(data, li, g + layout.xm - 1)),
    }

    // Phase 2: y direction, full local rows including x ghosts.
    if let Some(south) = nb.south {
        comm.send(south, tags::GHOST_SOUTH, layout.pack_rows(data, g..2 * g))?;
    }
    if let Some(north) = nb.north {
        comm.send(north, tags::GHOST_NORTH, layout.pack_rows(data, layout.ym..layout.ym + g))?;
    }
    match nb.south {
        Some(south) => {
            let buf = comm.recv(south, tags::GHOST_NORTH)?;
            layout.unpack_rows(data, 0..g, &buf)?;
        }
        None => (0..g).for_each(|lj| layout.copy_row(data, lj, g)),
    }
    match nb.north {
        Some(north) => {
            let buf = comm.recv(north, tags::GHOST_SOUTH)?;
            layout.unpack_rows(data, g + layout.ym..nyl, &buf)?;
        }
        None => (g + layout.ym..nyl).for_each(|lj| layout.copy_row(data, lj, g + layout.ym - 1)),
    }
    Ok(())
}
