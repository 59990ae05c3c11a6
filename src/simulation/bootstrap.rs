//! Initial model state: read from a file, or filled from defaults.

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::io::{Dataset, read_field};
use crate::types::SECONDS_PER_YEAR;

/// What the initial state came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Loaded {
    /// Enthalpy (and bedrock temperature) came from the file
    pub energy: bool,
    /// Age came from the file
    pub age: bool,
}

/// Fields the model owns itself; components register the rest.
pub(super) const CORE_FIELDS: [Var; 15] = [
    Var::Thickness,
    Var::Bed,
    Var::Surface,
    Var::Mask,
    Var::ThicknessRef,
    Var::Enthalpy,
    Var::BedrockTemp,
    Var::BedrockFlux,
    Var::GeothermalFlux,
    Var::BasalMelt,
    Var::TillWater,
    Var::TransportWater,
    Var::U3,
    Var::V3,
    Var::W3,
];

/// Register the core fields, plus `age` when the age model runs.
pub(super) fn register_core(store: &mut FieldStore, do_age: bool) -> Result<()> {
    for var in CORE_FIELDS {
        store.ensure(var)?;
    }
    if do_age {
        store.ensure(Var::Age)?;
    }
    Ok(())
}

/// Fields a restart file must contain.
fn required(store: &FieldStore, do_age: bool) -> Vec<Var> {
    let mut vars = vec![
        Var::Thickness,
        Var::Bed,
        Var::Enthalpy,
        Var::GeothermalFlux,
        Var::TillWater,
    ];
    if store.grid().mbz() > 1 {
        vars.push(Var::BedrockTemp);
    }
    if do_age {
        vars.push(Var::Age);
    }
    vars
}

/// Read the full model state written by an earlier run.
pub(super) fn load_state(store: &mut FieldStore, ds: &Dataset, file: &str, do_age: bool) -> Result<Loaded> {
    let required = required(store, do_age);
    for var in &required {
        let id = store.id(*var)?;
        if !read_field(store, id, ds, file)? {
            return Err(IceError::input(
                file,
                format!("model state variable '{}' is missing (use bootstrapping for partial data)", var.name()),
            ));
        }
    }
    for var in [Var::ThicknessRef, Var::BasalMelt, Var::TransportWater, Var::BedrockTemp] {
        if required.contains(&var) {
            continue;
        }
        let id = store.id(var)?;
        read_field(store, id, ds, file)?;
    }
    // files from before the flux was saved start from the geothermal flux
    let flux = store.id(Var::BedrockFlux)?;
    if !read_field(store, flux, ds, file)? {
        let geothermal = store.id(Var::GeothermalFlux)?;
        store.copy(geothermal, flux)?;
    }
    info!(file, fields = required.len(), "model state read");
    Ok(Loaded {
        energy: true,
        age: do_age,
    })
}

/// Fill the 2-D state from `ds` where present, defaults elsewhere.
///
/// Without a dataset every field takes its default.
pub(super) fn bootstrap_state(
    store: &mut FieldStore,
    ds: Option<&Dataset>,
    file: &str,
    config: &Config,
) -> Result<Loaded> {
    let defaults = [
        (Var::Thickness, config.get_double("bootstrapping_thickness_value_no_var")?),
        (Var::Bed, config.get_double("bootstrapping_bed_value_no_var")?),
        (Var::GeothermalFlux, config.get_double("bootstrapping_geothermal_flux_value_no_var")?),
        (Var::TillWater, config.get_double("bootstrapping_tillwat_value_no_var")?),
        (Var::ThicknessRef, 0.0),
        (Var::BasalMelt, 0.0),
        (Var::TransportWater, 0.0),
    ];
    for (var, value) in defaults {
        let id = store.id(var)?;
        let found = match ds {
            Some(ds) => read_field(store, id, ds, file)?,
            None => false,
        };
        if !found {
            if ds.is_some() {
                warn!(field = var.name(), value, "absent from the bootstrap file; using default");
            }
            store.access_mut(id)?.fill(value);
        }
    }
    let (geothermal, flux) = (store.id(Var::GeothermalFlux)?, store.id(Var::BedrockFlux)?);
    store.copy(geothermal, flux)?;
    Ok(Loaded::default())
}

/// Give every icy column the configured initial age.
pub(super) fn bootstrap_age(store: &mut FieldStore, config: &Config) -> Result<()> {
    let age = config.get_double("initial_age_of_ice_years")? * SECONDS_PER_YEAR;
    let id = store.id(Var::Age)?;
    store.access_mut(id)?.fill(age);
    store.update_ghosts(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::grid::test_grid;
    use crate::io::{add_fields, grid_dataset};
    use crate::time::ModelTime;

    #[test]
    fn test_bootstrap_defaults() {
        let mut config = Config::defaults();
        config.set_double("bootstrapping_bed_value_no_var", -200.0).unwrap();
        let mut store = FieldStore::new(test_grid());
        register_core(&mut store, false).unwrap();
        let loaded = bootstrap_state(&mut store, None, "none", &config).unwrap();
        assert!(!loaded.energy);
        let topg = store.id(Var::Bed).unwrap();
        assert_eq!(store.range(topg).unwrap(), (-200.0, -200.0));
        let g = store.id(Var::GeothermalFlux).unwrap();
        assert_eq!(store.range(g).unwrap(), (0.042, 0.042));
        let top = store.id(Var::BedrockFlux).unwrap();
        assert_eq!(store.range(top).unwrap(), (0.042, 0.042));
        assert!(!store.contains("age"));
    }

    #[test]
    fn test_restart_reads_bedrock_top_flux() {
        let config = Config::defaults();
        let mut saved = FieldStore::new(test_grid());
        register_core(&mut saved, false).unwrap();
        bootstrap_state(&mut saved, None, "none", &config).unwrap();
        let top = saved.id(Var::BedrockFlux).unwrap();
        saved.access_mut(top).unwrap().fill(0.065);

        let time = ModelTime::from_config(&config).unwrap();
        let mut ds = grid_dataset(saved.grid(), &time, (0.0, 0.0)).unwrap();
        let ids: Vec<_> = Var::ALL
            .into_iter()
            .filter(|v| v.is_state() && saved.contains(v.name()))
            .map(|v| saved.id(v).unwrap())
            .collect();
        add_fields(&mut ds, &saved, &ids).unwrap();

        let mut restarted = FieldStore::new(test_grid());
        register_core(&mut restarted, false).unwrap();
        load_state(&mut restarted, &ds, "saved.bin", false).unwrap();
        let top = restarted.id(Var::BedrockFlux).unwrap();
        let (lo, hi) = restarted.range(top).unwrap();
        assert_relative_eq!(lo, 0.065, max_relative = 1e-12);
        assert_relative_eq!(hi, 0.065, max_relative = 1e-12);

        // older files without the flux fall back to the geothermal flux
        ds.vars.remove("bheatflx_top");
        load_state(&mut restarted, &ds, "old.bin", false).unwrap();
        let (lo, hi) = restarted.range(top).unwrap();
        assert_relative_eq!(lo, 0.042, max_relative = 1e-12);
        assert_relative_eq!(hi, 0.042, max_relative = 1e-12);
    }

    #[test]
    fn test_restart_requires_state() {
        let mut store = FieldStore::new(test_grid());
        register_core(&mut store, false).unwrap();
        let err = load_state(&mut store, &Dataset::new(), "partial.bin", false).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Input);
        assert!(err.to_string().contains("thk"));
    }
}
