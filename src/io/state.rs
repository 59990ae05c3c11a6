//! Moving fields between the distributed store and global datasets.
//!
//! Writing gathers every rank's patch to rank 0, which assembles global
//! arrays in `(x, y[, level])` order. Reading is local: every rank holds
//! the whole dataset and copies out its own patch.

use std::collections::BTreeMap;

use super::{AttrValue, Dataset};
use crate::error::{IceError, Result};
use crate::fields::{FieldMetadata, FieldShape, FieldStore, SourceField, convert_in_place, regrid_into};
use crate::grid::{Grid, GridParameters, Periodicity, VerticalSpacing};
use crate::time::ModelTime;
use crate::types::{DomainExtent, FieldId};

/// Dimension names of a field, without `time`.
fn spatial_dims(shape: FieldShape) -> &'static [&'static str] {
    match shape {
        FieldShape::Scalar2D | FieldShape::Vector2D => &["x", "y"],
        FieldShape::Ice3D => &["x", "y", "z"],
        FieldShape::Bedrock3D => &["x", "y", "zb"],
    }
}

/// Names under which a field appears in files.
pub fn file_names(name: &str, shape: FieldShape) -> Vec<String> {
    if shape == FieldShape::Vector2D {
        vec![format!("{}_x", name), format!("{}_y", name)]
    } else {
        vec![name.to_string()]
    }
}

// =============================================================================
// Gather and scatter
// =============================================================================

/// Assemble a field's global array on rank 0, one array per file variable.
///
/// Collective; returns `None` on other ranks.
pub fn gather_field(store: &FieldStore, id: FieldId) -> Result<Option<Vec<Vec<f64>>>> {
    let grid = store.grid();
    let read = store.access(id)?;
    let dof = read.dof();
    let local: Vec<f64> = read.owned_columns().flat_map(|(_, _, c)| c.iter().copied()).collect();

    let Some(parts) = grid.comm().gather(local)? else {
        return Ok(None);
    };
    let (mx, my) = (grid.mx(), grid.my());
    let mut global = vec![0.0; mx * my * dof];
    for (rank, part) in parts.iter().enumerate() {
        let patch = grid.partition().patch(rank);
        if part.len() != patch.len() * dof {
            return Err(IceError::Comm(format!(
                "rank {} sent {} values of '{}', expected {}",
                rank,
                part.len(),
                read.meta().name,
                patch.len() * dof
            )));
        }
        for (n, (i, j)) in patch.points().enumerate() {
            let at = (i as usize * my + j as usize) * dof;
            global[at..at + dof].copy_from_slice(&part[n * dof..(n + 1) * dof]);
        }
    }

    if dof == 2 && store.field(id)?.shape() == FieldShape::Vector2D {
        let x = global.iter().step_by(2).copied().collect();
        let y = global.iter().skip(1).step_by(2).copied().collect();
        return Ok(Some(vec![x, y]));
    }
    Ok(Some(vec![global]))
}

/// Copy this rank's patch out of global arrays (one per file variable).
pub fn scatter_field(store: &mut FieldStore, id: FieldId, global: &[&[f64]]) -> Result<()> {
    let grid = std::sync::Arc::clone(store.grid());
    let field = store.field(id)?;
    let (shape, dof) = (field.shape(), field.dof());
    let comps = if shape == FieldShape::Vector2D { 2 } else { 1 };
    let per_var = if comps == 2 { 1 } else { dof };
    let expected = grid.mx() * grid.my() * per_var;
    if global.len() != comps || global.iter().any(|g| g.len() != expected) {
        return Err(IceError::ShapeMismatch {
            field: field.name().to_string(),
            expected: format!("{} x {}", comps, expected),
            found: global.iter().map(|g| g.len().to_string()).collect::<Vec<_>>().join(" + "),
        });
    }
    let my = grid.my();
    let mut w = store.access_mut(id)?;
    for (i, j) in grid.points() {
        let at = (i as usize * my + j as usize) * per_var;
        if comps == 2 {
            w.set_vec(i, j, (global[0][at], global[1][at]));
        } else {
            w.column_mut(i, j).copy_from_slice(&global[0][at..at + dof]);
        }
    }
    Ok(())
}

// =============================================================================
// Writing
// =============================================================================

/// Attributes describing a field in output units.
fn field_attrs(meta: &FieldMetadata) -> BTreeMap<String, AttrValue> {
    let mut attrs = BTreeMap::new();
    attrs.insert("long_name".into(), meta.long_name.as_str().into());
    if let Some(std) = &meta.standard_name {
        attrs.insert("standard_name".into(), std.as_str().into());
    }
    attrs.insert("units".into(), meta.output_units().into());
    if let Some((min, max)) = meta.valid_range {
        let to_out = |v: f64| {
            let mut one = [v];
            match convert_in_place(&mut one, &meta.units, meta.output_units()) {
                Ok(()) => one[0],
                Err(_) => v,
            }
        };
        if min.is_finite() {
            attrs.insert("valid_min".into(), to_out(min).into());
        }
        if max.is_finite() {
            attrs.insert("valid_max".into(), to_out(max).into());
        }
    }
    if meta.is_categorical() {
        attrs.insert("flag_values".into(), meta.flag_values.clone().into());
    }
    attrs.insert("_FillValue".into(), meta.fill_value.into());
    attrs
}

/// A dataset holding the grid coordinates and a single time record.
pub fn grid_dataset(grid: &Grid, time: &ModelTime, t_bounds: (f64, f64)) -> Result<Dataset> {
    let mut ds = Dataset::new();
    ds.add_dim("x", grid.mx())?;
    ds.add_dim("y", grid.my())?;
    ds.add_dim("z", grid.mz())?;
    ds.add_dim("zb", grid.mbz())?;
    ds.add_dim("nv", 2)?;
    ds.add_dim("time", 1)?;

    let coord = |ds: &mut Dataset, name: &str, data: Vec<f64>, long: &str, axis: &str| -> Result<()> {
        let v = ds.add_var(name, &[name], data)?;
        v.set_attr("units", "m");
        v.set_attr("long_name", long);
        v.set_attr("axis", axis);
        Ok(())
    };
    coord(&mut ds, "x", grid.x_coords().to_vec(), "X-coordinate in Cartesian system", "X")?;
    coord(&mut ds, "y", grid.y_coords().to_vec(), "Y-coordinate in Cartesian system", "Y")?;
    coord(&mut ds, "z", grid.z().to_vec(), "z-coordinate in Cartesian system", "Z")?;
    coord(&mut ds, "zb", grid.zb().to_vec(), "z-coordinate in bedrock", "Z")?;
    if let Some(z) = ds.var_mut("z") {
        z.set_attr("positive", "up");
    }

    let t = ds.add_var("time", &["time"], vec![t_bounds.1])?;
    t.set_attr("units", time.units_string());
    t.set_attr("calendar", time.calendar().name());
    t.set_attr("long_name", "time");
    t.set_attr("axis", "T");
    t.set_attr("bounds", "time_bounds");
    ds.add_var("time_bounds", &["time", "nv"], vec![t_bounds.0, t_bounds.1])?;

    let params = grid.params();
    ds.set_attr("Conventions", "CF-1.6");
    ds.set_attr("source", concat!("icesheet-rs ", env!("CARGO_PKG_VERSION")));
    ds.set_attr("grid_periodicity", params.periodicity.name());
    ds.set_attr("grid_ice_vertical_spacing", params.spacing.name());
    if let VerticalSpacing::Quadratic { lambda } = params.spacing {
        ds.set_attr("grid_lambda", lambda);
    }
    Ok(ds)
}

/// Add fields to a dataset built by [`grid_dataset`].
///
/// Collective. Rank 0 fills `ds`; other ranks only take part in the gathers.
pub fn add_fields(ds: &mut Dataset, store: &FieldStore, ids: &[FieldId]) -> Result<()> {
    for &id in ids {
        let gathered = gather_field(store, id)?;
        let Some(arrays) = gathered else { continue };
        let field = store.field(id)?;
        let meta = field.meta();
        let mut dims: Vec<&str> = Vec::with_capacity(4);
        if !meta.time_independent {
            dims.push("time");
        }
        dims.extend_from_slice(spatial_dims(field.shape()));
        for (name, mut data) in file_names(&meta.name, field.shape()).into_iter().zip(arrays) {
            convert_in_place(&mut data, &meta.units, meta.output_units())?;
            let var = ds.add_var(&name, &dims, data)?;
            var.attrs = field_attrs(meta);
        }
    }
    Ok(())
}

// =============================================================================
// Reading
// =============================================================================

/// Grid parameters of the grid a dataset was written on.
///
/// Options not recorded in the file come from `base`.
pub fn grid_parameters_from(ds: &Dataset, file: &str, base: &GridParameters) -> Result<GridParameters> {
    let x = ds.coordinate("x", file)?;
    let y = ds.coordinate("y", file)?;
    if x.len() < 2 || y.len() < 2 {
        return Err(IceError::input(file, "x and y need at least two points"));
    }
    let periodicity: Periodicity = match ds.attr_text("grid_periodicity") {
        Some(p) => p.parse()?,
        None => base.periodicity,
    };
    let axis = |c: &[f64], periodic: bool| {
        let (first, last) = (c[0], c[c.len() - 1]);
        if periodic {
            let d = (last - first) / (c.len() - 1) as f64;
            let half = 0.5 * d * c.len() as f64;
            (first - 0.5 * d + half, half)
        } else {
            (0.5 * (first + last), 0.5 * (last - first))
        }
    };
    let (x0, lx) = axis(x, periodicity.x());
    let (y0, ly) = axis(y, periodicity.y());

    let mut params = base.clone();
    params.mx = x.len();
    params.my = y.len();
    params.extent = DomainExtent { x0, y0, lx, ly };
    params.periodicity = periodicity;
    if let Ok(z) = ds.coordinate("z", file)
        && let Some(&top) = z.last()
    {
        params.mz = z.len();
        params.lz = top;
        params.spacing = match ds.attr_text("grid_ice_vertical_spacing") {
            Some("equal") => VerticalSpacing::Equal,
            Some(_) => VerticalSpacing::Quadratic {
                lambda: ds.attrs.get("grid_lambda").and_then(AttrValue::as_number).unwrap_or(4.0),
            },
            None => base.spacing,
        };
    }
    if let Ok(zb) = ds.coordinate("zb", file)
        && let Some(&bottom) = zb.first()
    {
        params.mbz = zb.len();
        params.lbz = -bottom;
    }
    params.validate()?;
    Ok(params)
}

/// The saved model time, seconds since the model reference date.
pub fn read_time(ds: &Dataset, file: &str, time: &ModelTime) -> Result<Option<f64>> {
    let Some(var) = ds.var("time") else { return Ok(None) };
    let Some(&value) = var.data.last() else { return Ok(None) };
    match var.attr_text("units") {
        Some(units) => Ok(Some(time.cf_units_to_internal(value, units).map_err(|e| {
            IceError::input(file, format!("time units: {}", e))
        })?)),
        None => Ok(Some(value)),
    }
}

/// Load field `id` from `ds`, regridding if the file grid differs.
///
/// Returns `Ok(false)` when the file does not contain the field.
pub fn read_field(store: &mut FieldStore, id: FieldId, ds: &Dataset, file: &str) -> Result<bool> {
    let grid = std::sync::Arc::clone(store.grid());
    let (meta, shape) = {
        let field = store.field(id)?;
        (field.meta().clone(), field.shape())
    };
    let names = file_names(&meta.name, shape);
    if names.iter().any(|n| ds.var(n).is_none()) {
        return Ok(false);
    }

    let mut arrays = Vec::with_capacity(names.len());
    for name in &names {
        let var = ds.require(name, file)?;
        let expected_dims = spatial_dims(shape);
        let dims: Vec<&str> = var.dims.iter().map(String::as_str).filter(|d| *d != "time").collect();
        if dims != expected_dims {
            return Err(IceError::input(
                file,
                format!("variable '{}' has dimensions {:?}, expected {:?}", name, dims, expected_dims),
            ));
        }
        let mut data = ds.last_record(name, file)?.to_vec();
        convert_in_place(&mut data, var.units(), &meta.units)
            .map_err(|e| IceError::input(file, format!("variable '{}': {}", name, e)))?;
        arrays.push(data);
    }

    let x = ds.coordinate("x", file)?;
    let y = ds.coordinate("y", file)?;
    let levels = match shape {
        FieldShape::Ice3D => Some(ds.coordinate("z", file)?),
        FieldShape::Bedrock3D => Some(ds.coordinate("zb", file)?),
        _ => None,
    };
    let same_grid = x == grid.x_coords()
        && y == grid.y_coords()
        && levels.is_none_or(|l| l == grid.z() || l == grid.zb());

    if same_grid {
        let refs: Vec<&[f64]> = arrays.iter().map(Vec::as_slice).collect();
        scatter_field(store, id, &refs)?;
    } else if shape == FieldShape::Vector2D {
        return Err(IceError::input(file, format!("cannot regrid vector field '{}'", meta.name)));
    } else {
        tracing::info!(field = %meta.name, file, "regridding");
        let src = SourceField {
            x,
            y,
            levels,
            data: &arrays[0],
        };
        regrid_into(store, id, &src)?;
    }
    store.check_range(id, file)?;
    Ok(true)
}
