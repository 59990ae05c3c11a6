//! The assembled model: grid, fields, clock, components, and outputs.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use super::bootstrap::{Loaded, bootstrap_age, bootstrap_state, load_state, register_core};
use super::{Hooks, Signals};
use crate::accounting::MassAccountant;
use crate::components::{ComponentRegistry, DependencyGraph, InitContext};
use crate::config::{Config, Constants};
use crate::energy::bootstrap_energy;
use crate::error::{IceError, Result};
use crate::fields::{FieldStore, Var};
use crate::geometry::update_geometry;
use crate::grid::{Communicator, Grid, GridParameters, SerialComm};
use crate::io::{
    Dataset, ExtrasWriter, TimeSeriesWriter, add_fields, grid_dataset, grid_parameters_from, history_entry,
    read_dataset, read_time, write_dataset,
};
use crate::planner::StepPlanner;
use crate::time::{Channel, EventCalendar, ModelTime, parse_times};
use crate::types::FieldId;

// =============================================================================
// Output settings
// =============================================================================

/// Variable set written to state files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputSize {
    /// Model state only
    Small,
    /// State plus the commonly inspected diagnostics
    Medium,
    /// Every registered field
    Big,
}

impl FromStr for OutputSize {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "big" => Ok(Self::Big),
            other => Err(IceError::config(format!(
                "output_size must be small, medium, or big, got '{}'",
                other
            ))),
        }
    }
}

const MEDIUM_EXTRAS: [Var; 8] = [
    Var::Surface,
    Var::Temperature,
    Var::LiquidFraction,
    Var::VelBar,
    Var::VelBase,
    Var::YieldStress,
    Var::MassBalance,
    Var::SurfaceTemp,
];

/// Where and what to write.
#[derive(Clone, Debug)]
pub struct OutputSettings {
    pub output_file: PathBuf,
    pub size: OutputSize,
    /// Prefix of snapshot files
    pub save_prefix: String,
    /// Prefix of files written on request
    pub executable: String,
}

impl OutputSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            output_file: PathBuf::from(config.get_string("output_file")?),
            size: config.get_string("output_size")?.parse()?,
            save_prefix: config.get_string("save_file")?,
            executable: "icesheet".to_string(),
        })
    }

    /// Extension of the output file including the dot, `.bin` if none.
    pub fn extension(&self) -> String {
        self.output_file
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| ".bin".to_string())
    }

    /// `"<prefix>-<year>.<ext>"`, the year with three decimals.
    pub fn timestamped(&self, prefix: &str, year: f64) -> PathBuf {
        PathBuf::from(format!("{}-{:.3}{}", prefix, year, self.extension()))
    }
}

// =============================================================================
// Model
// =============================================================================

/// Skip-policy bookkeeping between steps.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SkipState {
    /// Mass-continuity steps left before the next energy step
    pub countdown: usize,
    /// Time the energy and age models last reached
    pub energy_t0: f64,
}

/// The coupled ice-sheet model.
///
/// Built by [`Model::new`]; advanced by [`Model::step`] or [`Model::run`].
pub struct Model {
    pub(crate) config: Config,
    pub(crate) constants: Constants,
    pub(crate) grid: Arc<Grid>,
    pub(crate) store: FieldStore,
    pub(crate) time: ModelTime,
    pub(crate) components: ComponentRegistry,
    pub(crate) graph: DependencyGraph,
    pub(crate) planner: StepPlanner,
    pub(crate) accountant: MassAccountant,
    pub(crate) events: EventCalendar,
    pub(crate) output: OutputSettings,
    pub(crate) extras: Option<ExtrasWriter>,
    pub(crate) series: Option<TimeSeriesWriter>,
    pub(crate) history: String,
    pub(crate) hooks: Hooks,
    pub(crate) signals: Signals,
    pub(crate) skip: SkipState,
    pub(crate) max_steps: Option<usize>,
}

impl Model {
    /// Build a serial model from `config`.
    ///
    /// Parallel runs pass their communicator to [`with_comm`](Self::with_comm).
    pub fn new(config: Config) -> Result<Self> {
        Self::with_comm(config, Arc::new(SerialComm::new()))
    }

    /// Build a model running on one rank of `comm`.
    pub fn with_comm(config: Config, comm: Arc<dyn Communicator>) -> Result<Self> {
        Self::with_setup(config, comm, |_| Ok(()))
    }

    /// Build a model, letting `setup` edit the initial fields.
    ///
    /// `setup` runs after the state is read or filled from defaults and
    /// before any component initializes, so components and the energy
    /// bootstrap see its edits.
    pub fn with_setup(
        config: Config,
        comm: Arc<dyn Communicator>,
        setup: impl FnOnce(&mut FieldStore) -> Result<()>,
    ) -> Result<Self> {
        config.validate()?;
        let constants = Constants::from_config(&config)?;
        let input_file = config.get_string("input_file")?;
        let bootstrap = config.get_flag("bootstrap")?;
        let do_age = config.get_flag("do_age")?;

        let input: Option<Dataset> = if input_file.is_empty() {
            if bootstrap {
                return Err(IceError::config("bootstrapping needs an input file"));
            }
            None
        } else {
            Some(read_dataset(Path::new(&input_file))?)
        };

        let base = GridParameters::from_config(&config)?;
        let params = match &input {
            Some(ds) => grid_parameters_from(ds, &input_file, &base)?,
            None => base,
        };
        let grid = Arc::new(Grid::new(params, comm)?);
        let mut time = ModelTime::from_config(&config)?;
        let mut store = FieldStore::new(Arc::clone(&grid));
        register_core(&mut store, do_age)?;

        let loaded = match (&input, bootstrap) {
            (Some(ds), false) => {
                let loaded = load_state(&mut store, ds, &input_file, do_age)?;
                if let Some(saved) = read_time(ds, &input_file, &time)?
                    && !config.is_set("start_year")
                {
                    time = restart_clock(&config, &time, saved)?;
                }
                loaded
            }
            (ds, _) => bootstrap_state(&mut store, ds.as_ref(), &input_file, &config)?,
        };
        setup(&mut store)?;
        store.update_all_ghosts()?;
        update_geometry(&mut store, &constants, 0.0)?;

        let mut components = ComponentRegistry::from_config(&config)?;
        {
            let ctx = InitContext {
                config: &config,
                constants: &constants,
                time: &time,
                grid: &grid,
                input: input.as_ref(),
                bootstrap: bootstrap || input.is_none(),
            };
            components.init_all(&ctx, &mut store)?;
        }
        let graph = components.dependency_graph()?;

        let t0 = time.current();
        prime_couplers(&mut components, &mut store, t0)?;
        let sea_level = components.ocean.get().sea_level();
        update_geometry(&mut store, &constants, sea_level)?;
        finish_bootstrap(&mut store, &constants, &config, loaded, do_age)?;

        let mut accountant = MassAccountant::from_config(&config)?;
        accountant.start(&store)?;

        let mut events = EventCalendar::new();
        events.set(Channel::Snapshots, parse_times(&config.get_string("save_times")?)?, t0)?;
        events.set(Channel::Extras, parse_times(&config.get_string("extra_times")?)?, t0)?;
        events.set(Channel::TimeSeries, parse_times(&config.get_string("ts_times")?)?, t0)?;

        let extras = if events.times(Channel::Extras).is_empty() {
            None
        } else {
            let ids = extra_ids(&mut store, &config.get_string("extra_vars")?)?;
            Some(ExtrasWriter::new(config.get_string("extra_file")?, ids, t0))
        };
        let series = if events.times(Channel::TimeSeries).is_empty() {
            None
        } else {
            Some(TimeSeriesWriter::new(config.get_string("ts_file")?))
        };

        let history = input
            .as_ref()
            .and_then(|ds| ds.attr_text("history"))
            .unwrap_or_default()
            .to_string();

        info!(
            mx = grid.mx(),
            my = grid.my(),
            mz = grid.mz(),
            ranks = grid.size(),
            start_year = time.year(),
            end_year = time.end() / crate::types::SECONDS_PER_YEAR,
            input = %input_file,
            bootstrap,
            "model initialized"
        );

        Ok(Self {
            planner: StepPlanner::from_config(&config)?,
            output: OutputSettings::from_config(&config)?,
            config,
            constants,
            grid,
            store,
            time,
            components,
            graph,
            accountant,
            events,
            extras,
            series,
            history,
            hooks: Hooks::new(),
            signals: Signals::new(),
            skip: SkipState {
                countdown: 0,
                energy_t0: t0,
            },
            max_steps: None,
        })
    }

    /// Stop after `n` steps even if the run has not reached its end.
    pub fn with_max_steps(mut self, n: usize) -> Self {
        self.max_steps = Some(n);
        self
    }

    pub fn with_signals(mut self, signals: Signals) -> Self {
        self.signals = signals;
        self
    }

    /// Name used for files written on request.
    pub fn with_executable(mut self, name: impl Into<String>) -> Self {
        self.output.executable = name.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut FieldStore {
        &mut self.store
    }

    pub fn time(&self) -> &ModelTime {
        &self.time
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn accountant(&self) -> &MassAccountant {
        &self.accountant
    }

    pub fn events(&self) -> &EventCalendar {
        &self.events
    }

    pub fn output(&self) -> &OutputSettings {
        &self.output
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn history(&self) -> &str {
        &self.history
    }

    /// Prepend a dated entry to the run history.
    pub fn note(&mut self, message: &str) {
        let entry = history_entry(message);
        self.history = if self.history.is_empty() {
            format!("{}\n", entry)
        } else {
            format!("{}\n{}", entry, self.history)
        };
    }

    /// Fields written to state files at the configured output size.
    pub fn output_ids(&self) -> Result<Vec<FieldId>> {
        let mut vars: Vec<Var> = Var::ALL.into_iter().filter(|v| v.is_state()).collect();
        match self.output.size {
            OutputSize::Small => {}
            OutputSize::Medium => vars.extend(MEDIUM_EXTRAS),
            OutputSize::Big => {
                let names: Vec<String> = self.store.names().map(str::to_string).collect();
                return names.iter().map(|n| self.store.get_by_name(n)).collect();
            }
        }
        vars.into_iter()
            .filter(|v| self.store.contains(v.name()))
            .map(|v| self.store.id(v))
            .collect()
    }

    /// Write the state to `path` after noting `message` in the history.
    ///
    /// Collective. Rank 0 writes the file.
    pub fn save(&mut self, path: &Path, message: &str) -> Result<()> {
        self.note(message);
        let ids = self.output_ids()?;
        let t = self.time.current();
        let mut ds = grid_dataset(&self.grid, &self.time, (self.time.start(), t))?;
        add_fields(&mut ds, &self.store, &ids)?;
        if self.grid.rank() == 0 {
            ds.set_attr("history", self.history.clone());
            write_dataset(path, &ds)?;
            info!(file = %path.display(), year = self.time.year(), fields = ids.len(), "state written");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("grid", &(self.grid.mx(), self.grid.my(), self.grid.mz()))
            .field("time", &self.time)
            .field("components", &self.components.names())
            .finish()
    }
}

/// The clock of a restarted run: it starts at the saved time and keeps
/// the configured run length unless an end year is given.
fn restart_clock(config: &Config, time: &ModelTime, saved: f64) -> Result<ModelTime> {
    let end = if config.is_set("end_year") {
        config.get_years_as_seconds("end_year")?
    } else {
        saved + config.get_years_as_seconds("run_length_years")?
    };
    debug!(saved_year = saved / crate::types::SECONDS_PER_YEAR, "continuing from the saved time");
    ModelTime::new(time.calendar(), *time.reference(), saved, end)
}

/// Give the couplers a zero-length update so climate fields exist
/// before the energy bootstrap and the first step.
fn prime_couplers(components: &mut ComponentRegistry, store: &mut FieldStore, t: f64) -> Result<()> {
    if components.surface.begin_update(t, 0.0)? {
        components.surface.get_mut().update(t, 0.0, store)?;
    }
    if components.ocean.begin_update(t, 0.0)? {
        components.ocean.get_mut().update(t, 0.0, store)?;
    }
    components.surface.invalidate();
    components.ocean.invalidate();
    Ok(())
}

fn finish_bootstrap(
    store: &mut FieldStore,
    constants: &Constants,
    config: &Config,
    loaded: Loaded,
    do_age: bool,
) -> Result<()> {
    if !loaded.energy {
        bootstrap_energy(store, constants)?;
        debug!("enthalpy and bedrock temperature bootstrapped");
    }
    if do_age && !loaded.age {
        bootstrap_age(store, config)?;
    }
    store.update_all_ghosts()
}

/// Field ids for a comma-separated list of names.
fn extra_ids(store: &mut FieldStore, list: &str) -> Result<Vec<FieldId>> {
    list.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|name| match Var::from_name(name) {
            Some(var) => store.ensure(var),
            None => store
                .get_by_name(name)
                .map_err(|_| IceError::config(format!("unknown extra variable '{}'", name))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        let mut config = Config::defaults();
        config.set_integer("grid_Mx", 11).unwrap();
        config.set_integer("grid_My", 11).unwrap();
        config.set_integer("grid_Mz", 11).unwrap();
        config.set_string("surface_model", "constant").unwrap();
        config
    }

    #[test]
    fn test_output_size_parse() {
        assert_eq!("big".parse::<OutputSize>().unwrap(), OutputSize::Big);
        assert!("huge".parse::<OutputSize>().is_err());
    }

    #[test]
    fn test_timestamped_name() {
        let mut config = Config::defaults();
        config.set_string("output_file", "run.nc").unwrap();
        let out = OutputSettings::from_config(&config).unwrap();
        assert_eq!(out.timestamped("icesheet", 12.5), PathBuf::from("icesheet-12.500.nc"));
        config.set_string("output_file", "plain").unwrap();
        let out = OutputSettings::from_config(&config).unwrap();
        assert_eq!(out.extension(), ".bin");
    }

    #[test]
    fn test_new_model_from_defaults() {
        let model = Model::new(small_config()).unwrap();
        assert_eq!(model.grid().mx(), 11);
        assert_eq!(model.time().current(), 0.0);
        assert_eq!(model.accountant().volume(), 0.0);
        let ids = model.output_ids().unwrap();
        let thk = model.store().id(Var::Thickness).unwrap();
        assert!(ids.contains(&thk));
    }

    #[test]
    fn test_bootstrap_needs_file() {
        let mut config = small_config();
        config.set_flag("bootstrap", true).unwrap();
        let err = Model::new(config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_note_prepends() {
        let mut model = Model::new(small_config()).unwrap();
        model.note("first");
        model.note("second");
        let lines: Vec<&str> = model.history().lines().collect();
        assert!(lines[0].ends_with("second"));
        assert!(lines[1].ends_with("first"));
    }
}
