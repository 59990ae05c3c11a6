//! Cartesian decomposition of the horizontal grid over ranks.

use serde::{Deserialize, Serialize};

use crate::error::{IceError, Result};

/// The rectangle of global indices one rank owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub rank: usize,
    /// Rank coordinates in the process grid.
    pub px: usize,
    pub py: usize,
    /// First owned global index and owned width in x.
    pub xs: isize,
    pub xm: usize,
    /// First owned global index and owned height in y.
    pub ys: isize,
    pub ym: usize,
}

impl Patch {
    /// True if `(i, j)` is owned by this patch.
    pub fn owns(&self, i: isize, j: isize) -> bool {
        i >= self.xs && i < self.xs + self.xm as isize && j >= self.ys && j < self.ys + self.ym as isize
    }

    pub fn len(&self) -> usize {
        self.xm * self.ym
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned points in row-major order (j outer, i inner).
    pub fn points(&self) -> impl Iterator<Item = (isize, isize)> + '_ {
        (self.ys..self.ys + self.ym as isize)
            .flat_map(move |j| (self.xs..self.xs + self.xm as isize).map(move |i| (i, j)))
    }
}

/// Base/remainder split of `n` points over `parts` chunks.
fn chunks(n: usize, parts: usize) -> (Vec<usize>, Vec<usize>) {
    let base = n / parts;
    let rem = n % parts;
    let sizes: Vec<usize> = (0..parts).map(|p| base + usize::from(p < rem)).collect();
    let mut starts = Vec::with_capacity(parts);
    let mut acc = 0;
    for s in &sizes {
        starts.push(acc);
        acc += s;
    }
    (sizes, starts)
}

/// Process grid `nx × ny` and the owned ranges along each axis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub nx: usize,
    pub ny: usize,
    x_sizes: Vec<usize>,
    x_starts: Vec<usize>,
    y_sizes: Vec<usize>,
    y_starts: Vec<usize>,
}

impl Partition {
    /// Decompose an `mx × my` grid over `size` ranks.
    ///
    /// `ranks_x = 0` picks `nx ≈ sqrt(size·mx/my)`, reduced until it divides
    /// `size`. Every patch must be at least `min_width` points wide.
    pub fn new(mx: usize, my: usize, size: usize, ranks_x: usize, min_width: usize) -> Result<Self> {
        if size == 0 {
            return Err(IceError::config("communicator has no ranks"));
        }
        let nx = if ranks_x > 0 {
            if size % ranks_x != 0 {
                return Err(IceError::config(format!(
                    "grid_ranks_x = {} does not divide {} ranks",
                    ranks_x, size
                )));
            }
            ranks_x
        } else {
            let mut nx = ((size as f64 * mx as f64 / my as f64).sqrt().round() as usize).clamp(1, size);
            while size % nx != 0 {
                nx -= 1;
            }
            nx
        };
        let ny = size / nx;

        let (x_sizes, x_starts) = chunks(mx, nx);
        let (y_sizes, y_starts) = chunks(my, ny);

        let narrowest = x_sizes.iter().chain(&y_sizes).copied().min().unwrap_or(0);
        if narrowest < min_width.max(1) {
            return Err(IceError::config(format!(
                "{}x{} grid over {}x{} ranks gives patches {} points wide, need at least {}",
                mx,
                my,
                nx,
                ny,
                narrowest,
                min_width.max(1)
            )));
        }

        Ok(Self {
            nx,
            ny,
            x_sizes,
            x_starts,
            y_sizes,
            y_starts,
        })
    }

    pub fn size(&self) -> usize {
        self.nx * self.ny
    }

    /// Rank at process coordinates `(px, py)`.
    pub fn rank_of(&self, px: usize, py: usize) -> usize {
        py * self.nx + px
    }

    /// Patch owned by `rank`.
    pub fn patch(&self, rank: usize) -> Patch {
        let px = rank % self.nx;
        let py = rank / self.nx;
        Patch {
            rank,
            px,
            py,
            xs: self.x_starts[px] as isize,
            xm: self.x_sizes[px],
            ys: self.y_starts[py] as isize,
            ym: self.y_sizes[py],
        }
    }

    /// All patches, in rank order.
    pub fn patches(&self) -> Vec<Patch> {
        (0..self.size()).map(|r| self.patch(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_rank_owns_everything() {
        let p = Partition::new(61, 61, 1, 0, 2).unwrap();
        let patch = p.patch(0);
        assert_eq!((patch.xs, patch.xm, patch.ys, patch.ym), (0, 61, 0, 61));
    }

    #[test]
    fn test_patches_tile_grid_once() {
        let (mx, my) = (13, 7);
        let p = Partition::new(mx, my, 6, 0, 1).unwrap();
        let mut count = vec![0u8; mx * my];
        for patch in p.patches() {
            for (i, j) in patch.points() {
                count[j as usize * mx + i as usize] += 1;
            }
        }
        assert!(count.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_square_four_ranks_is_two_by_two() {
        let p = Partition::new(61, 61, 4, 0, 2).unwrap();
        assert_eq!((p.nx, p.ny), (2, 2));
        assert_eq!(p.patch(3).px, 1);
        assert_eq!(p.patch(3).py, 1);
    }

    #[test]
    fn test_too_narrow_patch_rejected() {
        assert!(Partition::new(3, 3, 4, 2, 2).is_err());
    }
}
