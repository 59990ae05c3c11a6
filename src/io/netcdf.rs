//! CF-conventions NetCDF backend (feature `netcdf`).
//!
//! A [`Dataset`] maps one-to-one onto a NetCDF file: the `time`
//! dimension is unlimited, every other dimension is fixed, and all
//! variables are stored as doubles.

use std::path::Path;

use super::{AttrValue, Dataset, Variable};
use crate::error::Result;

pub fn write_netcdf(path: &Path, dataset: &Dataset) -> Result<()> {
    let mut file = netcdf::create(path)?;

    for (name, &len) in &dataset.dims {
        if name == "time" {
            file.add_unlimited_dimension(name)?;
        } else {
            file.add_dimension(name, len)?;
        }
    }

    for (name, var) in &dataset.vars {
        let dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();
        let mut nc_var = file.add_variable::<f64>(name, &dims)?;
        for (attr, value) in &var.attrs {
            match value {
                AttrValue::Text(s) => nc_var.put_attribute(attr, s.as_str())?,
                AttrValue::Number(v) => nc_var.put_attribute(attr, *v)?,
                AttrValue::Numbers(v) => nc_var.put_attribute(attr, v.clone())?,
            };
        }
        if !var.data.is_empty() {
            nc_var.put_values(&var.data, ..)?;
        }
    }

    for (attr, value) in &dataset.attrs {
        match value {
            AttrValue::Text(s) => file.add_attribute(attr, s.as_str())?,
            AttrValue::Number(v) => file.add_attribute(attr, *v)?,
            AttrValue::Numbers(v) => file.add_attribute(attr, v.clone())?,
        };
    }
    Ok(())
}

fn convert_attr(value: netcdf::AttributeValue) -> Option<AttrValue> {
    use netcdf::AttributeValue as A;
    Some(match value {
        A::Str(s) => AttrValue::Text(s),
        A::Double(d) => AttrValue::Number(d),
        A::Float(f) => AttrValue::Number(f as f64),
        A::Int(i) => AttrValue::Number(i as f64),
        A::Short(i) => AttrValue::Number(i as f64),
        A::Doubles(v) => AttrValue::Numbers(v),
        A::Floats(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
        A::Ints(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
        _ => return None,
    })
}

pub fn read_netcdf(path: &Path) -> Result<Dataset> {
    let file = netcdf::open(path)?;
    let mut dataset = Dataset::new();

    for dim in file.dimensions() {
        dataset.dims.insert(dim.name(), dim.len());
    }
    for attr in file.attributes() {
        if let Some(value) = attr.value().ok().and_then(convert_attr) {
            dataset.attrs.insert(attr.name().to_string(), value);
        }
    }
    for var in file.variables() {
        let mut v = Variable {
            dims: var.dimensions().iter().map(|d| d.name()).collect(),
            ..Default::default()
        };
        for attr in var.attributes() {
            if let Some(value) = attr.value().ok().and_then(convert_attr) {
                v.attrs.insert(attr.name().to_string(), value);
            }
        }
        v.data = var.get_values::<f64, _>(..)?;
        dataset.vars.insert(var.name(), v);
    }
    Ok(dataset)
}
