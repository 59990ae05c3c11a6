//! The field store and its scoped accessors.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{FieldMetadata, FieldShape, Var};
use crate::error::{IceError, Result};
use crate::grid::{Grid, ghosts};
use crate::types::FieldId;

// =============================================================================
// Field
// =============================================================================

/// A named distributed array: one rank's patch plus its ghost halo.
#[derive(Clone, Debug)]
pub struct Field {
    meta: FieldMetadata,
    shape: FieldShape,
    ghost: usize,
    dof: usize,
    xs: isize,
    ys: isize,
    xm: usize,
    ym: usize,
    data: Vec<f64>,
    ghosts_fresh: bool,
}

impl Field {
    fn new(grid: &Grid, meta: FieldMetadata, shape: FieldShape, ghost: usize) -> Self {
        let patch = grid.patch();
        let dof = shape.dof(grid);
        let len = (patch.xm + 2 * ghost) * (patch.ym + 2 * ghost) * dof;
        Self {
            meta,
            shape,
            ghost,
            dof,
            xs: patch.xs,
            ys: patch.ys,
            xm: patch.xm,
            ym: patch.ym,
            data: vec![0.0; len],
            ghosts_fresh: true,
        }
    }

    pub fn meta(&self) -> &FieldMetadata {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn shape(&self) -> FieldShape {
        self.shape
    }

    pub fn ghost_width(&self) -> usize {
        self.ghost
    }

    /// Values per column.
    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn ghosts_fresh(&self) -> bool {
        self.ghosts_fresh
    }

    #[inline]
    fn offset(&self, i: isize, j: isize) -> usize {
        let g = self.ghost as isize;
        let li = i - self.xs + g;
        let lj = j - self.ys + g;
        debug_assert!(
            li >= 0 && lj >= 0 && li < self.xm as isize + 2 * g && lj < self.ym as isize + 2 * g,
            "({}, {}) outside the local array of '{}'",
            i,
            j,
            self.meta.name
        );
        (li as usize + lj as usize * (self.xm + 2 * self.ghost)) * self.dof
    }

    /// Owned columns, row-major.
    fn owned(&self) -> impl Iterator<Item = (isize, isize)> + '_ {
        (self.ys..self.ys + self.ym as isize)
            .flat_map(move |j| (self.xs..self.xs + self.xm as isize).map(move |i| (i, j)))
    }
}

// =============================================================================
// Accessors
// =============================================================================

/// Read access to one field.
#[derive(Clone, Copy, Debug)]
pub struct FieldRead<'a> {
    field: &'a Field,
}

impl<'a> FieldRead<'a> {
    pub fn meta(&self) -> &'a FieldMetadata {
        &self.field.meta
    }

    pub fn dof(&self) -> usize {
        self.field.dof
    }

    /// First value of the column at `(i, j)`.
    #[inline]
    pub fn get(&self, i: isize, j: isize) -> f64 {
        self.field.data[self.field.offset(i, j)]
    }

    /// Both components of a vector field.
    #[inline]
    pub fn vec(&self, i: isize, j: isize) -> (f64, f64) {
        let o = self.field.offset(i, j);
        (self.field.data[o], self.field.data[o + 1])
    }

    /// Level `k` of a 3-D field.
    #[inline]
    pub fn at(&self, i: isize, j: isize, k: usize) -> f64 {
        self.field.data[self.field.offset(i, j) + k]
    }

    #[inline]
    pub fn column(&self, i: isize, j: isize) -> &'a [f64] {
        let o = self.field.offset(i, j);
        &self.field.data[o..o + self.field.dof]
    }

    /// Owned columns, row-major, as `(i, j, column)`.
    pub fn owned_columns(&self) -> impl Iterator<Item = (isize, isize, &'a [f64])> + use<'a> {
        let field = self.field;
        field.owned().map(move |(i, j)| {
            let o = field.offset(i, j);
            (i, j, &field.data[o..o + field.dof])
        })
    }
}

/// Exclusive write access to one field.
///
/// Dropping a writer that wrote marks the field's ghosts stale.
#[derive(Debug)]
pub struct FieldWrite<'a> {
    field: &'a mut Field,
    wrote: bool,
}

impl<'a> FieldWrite<'a> {
    fn new(field: &'a mut Field) -> Self {
        Self { field, wrote: false }
    }

    pub fn meta(&self) -> &FieldMetadata {
        &self.field.meta
    }

    /// Read view of the owned values. Ghosts may be stale.
    pub fn read(&self) -> FieldRead<'_> {
        FieldRead { field: self.field }
    }

    #[inline]
    pub fn get(&self, i: isize, j: isize) -> f64 {
        self.field.data[self.field.offset(i, j)]
    }

    #[inline]
    pub fn vec(&self, i: isize, j: isize) -> (f64, f64) {
        let o = self.field.offset(i, j);
        (self.field.data[o], self.field.data[o + 1])
    }

    #[inline]
    pub fn at(&self, i: isize, j: isize, k: usize) -> f64 {
        self.field.data[self.field.offset(i, j) + k]
    }

    #[inline]
    pub fn column(&self, i: isize, j: isize) -> &[f64] {
        let o = self.field.offset(i, j);
        &self.field.data[o..o + self.field.dof]
    }

    #[inline]
    pub fn set(&mut self, i: isize, j: isize, value: f64) {
        let o = self.field.offset(i, j);
        self.field.data[o] = value;
        self.wrote = true;
    }

    #[inline]
    pub fn set_vec(&mut self, i: isize, j: isize, value: (f64, f64)) {
        let o = self.field.offset(i, j);
        self.field.data[o] = value.0;
        self.field.data[o + 1] = value.1;
        self.wrote = true;
    }

    #[inline]
    pub fn set_at(&mut self, i: isize, j: isize, k: usize, value: f64) {
        let o = self.field.offset(i, j) + k;
        self.field.data[o] = value;
        self.wrote = true;
    }

    #[inline]
    pub fn column_mut(&mut self, i: isize, j: isize) -> &mut [f64] {
        let o = self.field.offset(i, j);
        self.wrote = true;
        &mut self.field.data[o..o + self.field.dof]
    }

    /// Set every value, ghosts included. Ghosts stay consistent.
    pub fn fill(&mut self, value: f64) {
        self.field.data.fill(value);
    }

    /// Apply `f` to every owned column.
    pub fn for_each_owned(&mut self, mut f: impl FnMut(isize, isize, &mut [f64])) {
        let points: Vec<_> = self.field.owned().collect();
        for (i, j) in points {
            f(i, j, self.column_mut(i, j));
        }
    }
}

impl Drop for FieldWrite<'_> {
    fn drop(&mut self) {
        if self.wrote && self.field.ghost > 0 {
            self.field.ghosts_fresh = false;
        }
    }
}

/// Read-only view of every field not currently being written.
#[derive(Debug)]
pub struct FieldView<'a> {
    fields: Vec<Option<&'a Field>>,
    by_name: &'a BTreeMap<String, FieldId>,
}

impl<'a> FieldView<'a> {
    fn field(&self, id: FieldId) -> Result<&'a Field> {
        match self.fields.get(id.get()) {
            Some(Some(f)) => Ok(*f),
            Some(None) => Err(IceError::config(format!("field {} is being written", id))),
            None => Err(IceError::Missing(id.to_string())),
        }
    }

    pub fn access(&self, id: FieldId) -> Result<FieldRead<'a>> {
        Ok(FieldRead { field: self.field(id)? })
    }

    /// Read access requiring fresh ghosts.
    pub fn stencil(&self, id: FieldId) -> Result<FieldRead<'a>> {
        let field = self.field(id)?;
        check_stencil(field)?;
        Ok(FieldRead { field })
    }

    pub fn get_by_name(&self, name: &str) -> Result<FieldId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| IceError::Missing(name.to_string()))
    }
}

fn check_stencil(field: &Field) -> Result<()> {
    if field.ghost == 0 {
        return Err(IceError::StaleGhosts(format!("{} (no ghost cells)", field.meta.name)));
    }
    if !field.ghosts_fresh {
        return Err(IceError::StaleGhosts(field.meta.name.clone()));
    }
    Ok(())
}

// =============================================================================
// Store
// =============================================================================

/// Owner of every field's storage.
#[derive(Clone, Debug)]
pub struct FieldStore {
    grid: Arc<Grid>,
    fields: Vec<Field>,
    by_name: BTreeMap<String, FieldId>,
}

impl FieldStore {
    pub fn new(grid: Arc<Grid>) -> Self {
        Self {
            grid,
            fields: Vec::new(),
            by_name: BTreeMap::new(),
        }
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Register a field, or return the existing one of the same shape.
    pub fn create_field(&mut self, meta: FieldMetadata, shape: FieldShape, ghost: usize) -> Result<FieldId> {
        if ghost > crate::grid::MAX_GHOST_WIDTH {
            return Err(IceError::config(format!(
                "ghost width {} of '{}' exceeds {}",
                ghost,
                meta.name,
                crate::grid::MAX_GHOST_WIDTH
            )));
        }
        if let Some(&id) = self.by_name.get(&meta.name) {
            let existing = &self.fields[id.get()];
            if existing.shape != shape {
                return Err(IceError::ShapeMismatch {
                    field: meta.name,
                    expected: existing.shape.name().into(),
                    found: shape.name().into(),
                });
            }
            return Ok(id);
        }
        let id = FieldId::new(self.fields.len());
        self.by_name.insert(meta.name.clone(), id);
        self.fields.push(Field::new(&self.grid, meta, shape, ghost));
        Ok(id)
    }

    /// Register a well-known field.
    pub fn ensure(&mut self, var: Var) -> Result<FieldId> {
        self.create_field(var.metadata(), var.shape(), var.ghost_width())
    }

    pub fn get_by_name(&self, name: &str) -> Result<FieldId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| IceError::Missing(name.to_string()))
    }

    /// Id of a well-known field.
    pub fn id(&self, var: Var) -> Result<FieldId> {
        self.get_by_name(var.name())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn field(&self, id: FieldId) -> Result<&Field> {
        self.fields.get(id.get()).ok_or_else(|| IceError::Missing(id.to_string()))
    }

    fn field_mut(&mut self, id: FieldId) -> Result<&mut Field> {
        self.fields.get_mut(id.get()).ok_or_else(|| IceError::Missing(id.to_string()))
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name())
    }

    pub fn access(&self, id: FieldId) -> Result<FieldRead<'_>> {
        Ok(FieldRead { field: self.field(id)? })
    }

    /// Read access for stencils; fails if ghosts are stale.
    pub fn stencil(&self, id: FieldId) -> Result<FieldRead<'_>> {
        let field = self.field(id)?;
        check_stencil(field)?;
        Ok(FieldRead { field })
    }

    pub fn access_mut(&mut self, id: FieldId) -> Result<FieldWrite<'_>> {
        Ok(FieldWrite::new(self.field_mut(id)?))
    }

    /// `N` exclusive writers plus a read view of all other fields.
    pub fn split_mut<const N: usize>(&mut self, ids: [FieldId; N]) -> Result<([FieldWrite<'_>; N], FieldView<'_>)> {
        for (n, id) in ids.iter().enumerate() {
            if id.get() >= self.fields.len() {
                return Err(IceError::Missing(id.to_string()));
            }
            if ids[..n].contains(id) {
                return Err(IceError::config(format!(
                    "field '{}' requested twice for writing",
                    self.fields[id.get()].name()
                )));
            }
        }

        let mut slots: Vec<Option<FieldWrite<'_>>> = (0..N).map(|_| None).collect();
        let mut others = Vec::with_capacity(self.fields.len());
        for (idx, field) in self.fields.iter_mut().enumerate() {
            match ids.iter().position(|id| id.get() == idx) {
                Some(pos) => {
                    slots[pos] = Some(FieldWrite::new(field));
                    others.push(None);
                }
                None => others.push(Some(&*field)),
            }
        }
        let writers: Vec<FieldWrite<'_>> = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| IceError::config("field writer slot left empty"))?;
        let writers: [FieldWrite<'_>; N] = writers
            .try_into()
            .map_err(|_| IceError::config("field writer count mismatch"))?;
        Ok((
            writers,
            FieldView {
                fields: others,
                by_name: &self.by_name,
            },
        ))
    }

    /// Read view of every field.
    pub fn view(&self) -> FieldView<'_> {
        FieldView {
            fields: self.fields.iter().map(Some).collect(),
            by_name: &self.by_name,
        }
    }

    /// Refresh ghosts from neighbours. Collective.
    pub fn update_ghosts(&mut self, id: FieldId) -> Result<()> {
        let grid = Arc::clone(&self.grid);
        let field = self.field_mut(id)?;
        ghosts::exchange(&grid, &mut field.data, field.ghost, field.dof)?;
        field.ghosts_fresh = true;
        Ok(())
    }

    /// Refresh the ghosts of every stale field. Collective.
    pub fn update_all_ghosts(&mut self) -> Result<()> {
        for idx in 0..self.fields.len() {
            // Staleness is identical on every rank, so all ranks take the same branch.
            if !self.fields[idx].ghosts_fresh {
                self.update_ghosts(FieldId::new(idx))?;
            }
        }
        Ok(())
    }

    /// Global `(min, max)` over owned values. Collective.
    pub fn range(&self, id: FieldId) -> Result<(f64, f64)> {
        let field = self.field(id)?;
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        let read = FieldRead { field };
        for (_, _, col) in read.owned_columns() {
            for &v in col {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        Ok((self.grid.min(lo)?, self.grid.max(hi)?))
    }

    /// Global sum over owned values. Collective.
    pub fn sum(&self, id: FieldId) -> Result<f64> {
        let read = self.access(id)?;
        let local: f64 = read.owned_columns().flat_map(|(_, _, c)| c.iter()).sum();
        self.grid.sum(local)
    }

    /// Copy values (ghosts included) between fields of the same shape.
    pub fn copy(&mut self, from: FieldId, to: FieldId) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let ([mut dst], view) = self.split_mut([to])?;
        let src = view.access(from)?;
        if src.field.shape != dst.field.shape || src.field.ghost != dst.field.ghost {
            return Err(IceError::ShapeMismatch {
                field: dst.field.meta.name.clone(),
                expected: dst.field.shape.name().into(),
                found: src.field.shape.name().into(),
            });
        }
        dst.field.data.copy_from_slice(&src.field.data);
        dst.field.ghosts_fresh = src.field.ghosts_fresh;
        Ok(())
    }

    /// Fail with `Bounds` if any owned value leaves a non-advisory valid range.
    ///
    /// Collective: every rank returns the same first offending cell.
    pub fn check_range(&self, id: FieldId, file: &str) -> Result<()> {
        let field = self.field(id)?;
        let meta = &field.meta;
        let Some((min, max)) = meta.valid_range else {
            return Ok(());
        };
        let mut bad = vec![0.0; 4];
        let read = FieldRead { field };
        if let Some((i, j, v)) = read
            .owned_columns()
            .flat_map(|(i, j, c)| c.iter().map(move |&v| (i, j, v)))
            .find(|&(_, _, v)| !meta.in_range(v))
        {
            bad = vec![1.0, i as f64, j as f64, v];
        }
        let comm = self.grid.comm();
        let first = match comm.gather(bad)? {
            Some(all) => all.into_iter().find(|b| b[0] > 0.0).unwrap_or_else(|| vec![0.0; 4]),
            None => Vec::new(),
        };
        let first = comm.broadcast(first)?;
        if first.first().copied().unwrap_or(0.0) == 0.0 {
            return Ok(());
        }
        let (i, j, value) = (first[1] as isize, first[2] as isize, first[3]);
        if meta.range_advisory {
            tracing::warn!(field = %meta.name, i, j, value, file, "value outside advisory valid range");
            return Ok(());
        }
        Err(IceError::Bounds {
            field: meta.name.clone(),
            i,
            j,
            value,
            min,
            max,
            file: file.to_string(),
        })
    }

    /// Copy of a field's local storage.
    pub fn snapshot(&self, id: FieldId) -> Result<Vec<f64>> {
        Ok(self.field(id)?.data.clone())
    }

    /// Restore storage saved by [`FieldStore::snapshot`].
    pub fn restore(&mut self, id: FieldId, data: &[f64]) -> Result<()> {
        let field = self.field_mut(id)?;
        if field.data.len() != data.len() {
            return Err(IceError::ShapeMismatch {
                field: field.meta.name.clone(),
                expected: field.data.len().to_string(),
                found: data.len().to_string(),
            });
        }
        field.data.copy_from_slice(data);
        field.ghosts_fresh = false;
        Ok(())
    }

    /// Set the metadata of an existing field (used when reading files).
    pub fn set_metadata(&mut self, id: FieldId, meta: FieldMetadata) -> Result<()> {
        let field = self.field_mut(id)?;
        if field.meta.name != meta.name {
            return Err(IceError::config(format!(
                "cannot rename '{}' to '{}'",
                field.meta.name, meta.name
            )));
        }
        field.meta = meta;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridParameters, Periodicity, ThreadComm};
    use approx::assert_relative_eq;

    fn store(periodicity: Periodicity) -> FieldStore {
        let grid = Grid::serial(GridParameters::new(6, 5, 1e3, 1e3).with_vertical(3, 100.0).with_periodicity(periodicity))
            .unwrap();
        FieldStore::new(Arc::new(grid))
    }

    #[test]
    fn test_missing_field() {
        let s = store(Periodicity::None);
        assert!(matches!(s.get_by_name("thk"), Err(IceError::Missing(_))));
    }

    #[test]
    fn test_shape_mismatch_on_reregister() {
        let mut s = store(Periodicity::None);
        s.ensure(Var::Thickness).unwrap();
        let err = s
            .create_field(Var::Thickness.metadata(), FieldShape::Ice3D, 1)
            .unwrap_err();
        assert!(matches!(err, IceError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_write_marks_ghosts_stale() {
        let mut s = store(Periodicity::None);
        let id = s.ensure(Var::Thickness).unwrap();
        assert!(s.stencil(id).is_ok());
        s.access_mut(id).unwrap().set(2, 2, 10.0);
        assert!(matches!(s.stencil(id), Err(IceError::StaleGhosts(_))));
        s.update_ghosts(id).unwrap();
        assert!(s.stencil(id).is_ok());
    }

    #[test]
    fn test_read_only_writer_keeps_ghosts_fresh() {
        let mut s = store(Periodicity::None);
        let id = s.ensure(Var::Thickness).unwrap();
        {
            let w = s.access_mut(id).unwrap();
            let _ = w.get(0, 0);
        }
        assert!(s.stencil(id).is_ok());
    }

    #[test]
    fn test_periodic_ghosts_wrap() {
        let mut s = store(Periodicity::XY);
        let id = s.ensure(Var::Thickness).unwrap();
        {
            let mut w = s.access_mut(id).unwrap();
            for (i, j) in s_points(6, 5) {
                w.set(i, j, (10 * i + j) as f64);
            }
        }
        s.update_ghosts(id).unwrap();
        let r = s.stencil(id).unwrap();
        assert_eq!(r.get(-1, 0), r.get(5, 0));
        assert_eq!(r.get(6, 4), r.get(0, 4));
        assert_eq!(r.get(0, -1), r.get(0, 4));
        assert_eq!(r.get(-1, -1), r.get(5, 4));
        assert_eq!(r.get(-2, 5), r.get(4, 0));
    }

    #[test]
    fn test_closed_ghosts_copy_edge() {
        let mut s = store(Periodicity::None);
        let id = s.ensure(Var::Thickness).unwrap();
        {
            let mut w = s.access_mut(id).unwrap();
            for (i, j) in s_points(6, 5) {
                w.set(i, j, (i + 1) as f64);
            }
        }
        s.update_ghosts(id).unwrap();
        let r = s.stencil(id).unwrap();
        assert_eq!(r.get(-1, 2), 1.0);
        assert_eq!(r.get(7, 2), 6.0);
        assert_eq!(r.get(3, -2), 4.0);
    }

    fn s_points(mx: isize, my: isize) -> Vec<(isize, isize)> {
        (0..my).flat_map(|j| (0..mx).map(move |i| (i, j))).collect()
    }

    #[test]
    fn test_split_mut_excludes_writers_from_view() {
        let mut s = store(Periodicity::None);
        let h = s.ensure(Var::Thickness).unwrap();
        let b = s.ensure(Var::Bed).unwrap();
        let u = s.ensure(Var::Surface).unwrap();
        s.access_mut(b).unwrap().fill(-10.0);
        let ([mut hw, mut uw], view) = s.split_mut([h, u]).unwrap();
        let bed = view.access(b).unwrap();
        hw.set(1, 1, 5.0);
        uw.set(1, 1, bed.get(1, 1) + hw.get(1, 1));
        assert!(view.access(h).is_err());
        drop((hw, uw));
        assert_eq!(s.access(u).unwrap().get(1, 1), -5.0);
    }

    #[test]
    fn test_split_mut_rejects_duplicates() {
        let mut s = store(Periodicity::None);
        let h = s.ensure(Var::Thickness).unwrap();
        assert!(s.split_mut([h, h]).is_err());
    }

    #[test]
    fn test_range_and_sum() {
        let mut s = store(Periodicity::None);
        let id = s.ensure(Var::Thickness).unwrap();
        s.access_mut(id).unwrap().set(3, 3, 7.0);
        assert_eq!(s.range(id).unwrap(), (0.0, 7.0));
        assert_relative_eq!(s.sum(id).unwrap(), 7.0);
    }

    #[test]
    fn test_bounds_error_names_cell() {
        let mut s = store(Periodicity::None);
        let id = s.ensure(Var::Thickness).unwrap();
        s.access_mut(id).unwrap().set(4, 1, -3.0);
        match s.check_range(id, "in.bin") {
            Err(IceError::Bounds { i, j, file, .. }) => {
                assert_eq!((i, j), (4, 1));
                assert_eq!(file, "in.bin");
            }
            other => panic!("expected bounds error, got {:?}", other),
        }
    }

    #[test]
    fn test_ghosts_match_owner_across_ranks() {
        let results = ThreadComm::run(4, |comm| {
            let params = GridParameters::new(9, 8, 1e3, 1e3).with_periodicity(Periodicity::X);
            let grid = Arc::new(Grid::new(params, Arc::new(comm)).unwrap());
            let mut s = FieldStore::new(Arc::clone(&grid));
            let id = s.ensure(Var::Thickness).unwrap();
            {
                let mut w = s.access_mut(id).unwrap();
                for (i, j) in grid.points() {
                    w.set(i, j, (100 * i + j) as f64);
                }
            }
            s.update_ghosts(id).unwrap();
            let r = s.stencil(id).unwrap();
            let p = *grid.patch();
            let mut ok = true;
            for j in p.ys - 2..p.ys + p.ym as isize + 2 {
                for i in p.xs - 2..p.xs + p.xm as isize + 2 {
                    let gi = i.rem_euclid(9);
                    let gj = j.clamp(0, 7);
                    ok &= r.get(i, j) == (100 * gi + gj) as f64;
                }
            }
            ok
        });
        assert!(results.into_iter().all(|ok| ok));
    }
}
