//! One slot per component kind, in step order.

use tracing::{debug, info};

use super::{
    AgeModel, BedDeformation, BedThermal, CalvingModel, Component, DependencyGraph, EnergyModel, Hydrology,
    InitContext, Managed, MaxTimestep, OceanModel, StressBalance, SurfaceModel, YieldStress,
};
use crate::basal::yield_stress_from_config;
use crate::beddef::bed_deformation_from_config;
use crate::calving::calving_from_config;
use crate::config::Config;
use crate::coupler::{ocean_from_config, surface_from_config};
use crate::energy::{BedrockThermal, EnthalpyModel, IceAge};
use crate::error::Result;
use crate::fields::FieldStore;
use crate::hydrology::hydrology_from_config;
use crate::masscont::MassContinuity;
use crate::stressbalance::stress_balance_from_config;

/// Component kinds, in the order they run within a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Surface,
    Ocean,
    StressBalance,
    Energy,
    Age,
    BedThermal,
    Hydrology,
    YieldStress,
    MassContinuity,
    Calving,
    BedDeformation,
}

/// The components of a run.
///
/// Optional slots are `None` when their process is switched off.
pub struct ComponentRegistry {
    pub surface: Managed<dyn SurfaceModel>,
    pub ocean: Managed<dyn OceanModel>,
    pub stress_balance: Managed<dyn StressBalance>,
    pub energy: Option<Managed<dyn EnergyModel>>,
    pub age: Option<Managed<dyn AgeModel>>,
    pub bed_thermal: Managed<dyn BedThermal>,
    pub hydrology: Managed<dyn Hydrology>,
    pub yield_stress: Managed<dyn YieldStress>,
    pub mass_continuity: Option<Managed<MassContinuity>>,
    pub calving: Vec<Managed<dyn CalvingModel>>,
    pub bed_deformation: Option<Managed<dyn BedDeformation>>,
}

impl ComponentRegistry {
    /// Build every component selected by the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let energy: Option<Box<dyn EnergyModel>> = if config.get_flag("do_energy")? {
            Some(Box::new(EnthalpyModel::new()))
        } else {
            None
        };
        let age: Option<Box<dyn AgeModel>> = if config.get_flag("do_age")? {
            Some(Box::new(IceAge::new()))
        } else {
            None
        };
        let mass_continuity = if config.get_flag("do_mass_conserve")? {
            Some(Managed::new(Box::new(MassContinuity::new())))
        } else {
            None
        };
        let bed_thermal: Box<dyn BedThermal> = Box::new(BedrockThermal::new());
        Ok(Self {
            surface: Managed::new(surface_from_config(config)?),
            ocean: Managed::new(ocean_from_config(config)?),
            stress_balance: Managed::new(stress_balance_from_config(config)?),
            energy: energy.map(Managed::new),
            age: age.map(Managed::new),
            bed_thermal: Managed::new(bed_thermal),
            hydrology: Managed::new(hydrology_from_config(config)?),
            yield_stress: Managed::new(yield_stress_from_config(config)?),
            mass_continuity,
            calving: calving_from_config(config)?.into_iter().map(Managed::new).collect(),
            bed_deformation: bed_deformation_from_config(config)?.map(Managed::new),
        })
    }

    /// Initialize every component in step order, then enter the running state.
    pub fn init_all(&mut self, ctx: &InitContext<'_>, store: &mut FieldStore) -> Result<()> {
        self.surface.init(ctx, store)?;
        self.ocean.init(ctx, store)?;
        self.stress_balance.init(ctx, store)?;
        if let Some(e) = &mut self.energy {
            e.init(ctx, store)?;
        }
        if let Some(a) = &mut self.age {
            a.init(ctx, store)?;
        }
        self.bed_thermal.init(ctx, store)?;
        self.hydrology.init(ctx, store)?;
        self.yield_stress.init(ctx, store)?;
        if let Some(m) = &mut self.mass_continuity {
            m.init(ctx, store)?;
        }
        for c in &mut self.calving {
            c.init(ctx, store)?;
        }
        if let Some(b) = &mut self.bed_deformation {
            b.init(ctx, store)?;
        }
        self.start_all()?;
        info!(components = ?self.names(), "components initialized");
        Ok(())
    }

    fn start_all(&mut self) -> Result<()> {
        self.surface.start()?;
        self.ocean.start()?;
        self.stress_balance.start()?;
        if let Some(e) = &mut self.energy {
            e.start()?;
        }
        if let Some(a) = &mut self.age {
            a.start()?;
        }
        self.bed_thermal.start()?;
        self.hydrology.start()?;
        self.yield_stress.start()?;
        if let Some(m) = &mut self.mass_continuity {
            m.start()?;
        }
        for c in &mut self.calving {
            c.start()?;
        }
        if let Some(b) = &mut self.bed_deformation {
            b.start()?;
        }
        Ok(())
    }

    /// Every active component as `(slot, component)`, in step order.
    fn components(&self) -> Vec<(Slot, &dyn Component)> {
        let mut out: Vec<(Slot, &dyn Component)> = vec![
            (Slot::Surface, self.surface.get() as &dyn Component),
            (Slot::Ocean, self.ocean.get() as &dyn Component),
            (Slot::StressBalance, self.stress_balance.get() as &dyn Component),
        ];
        if let Some(e) = &self.energy {
            out.push((Slot::Energy, e.get() as &dyn Component));
        }
        if let Some(a) = &self.age {
            out.push((Slot::Age, a.get() as &dyn Component));
        }
        out.push((Slot::BedThermal, self.bed_thermal.get() as &dyn Component));
        out.push((Slot::Hydrology, self.hydrology.get() as &dyn Component));
        out.push((Slot::YieldStress, self.yield_stress.get() as &dyn Component));
        if let Some(m) = &self.mass_continuity {
            out.push((Slot::MassContinuity, m.get() as &dyn Component));
        }
        for c in &self.calving {
            out.push((Slot::Calving, c.get() as &dyn Component));
        }
        if let Some(b) = &self.bed_deformation {
            out.push((Slot::BedDeformation, b.get() as &dyn Component));
        }
        out
    }

    pub fn names(&self) -> Vec<String> {
        self.components().into_iter().map(|(_, c)| c.name().to_string()).collect()
    }

    /// `(name, inputs, outputs)` in step order.
    ///
    /// Calving policies edit the thickness written by mass continuity,
    /// so their declarations are folded into the mass continuity entry.
    pub fn declarations(&self) -> Vec<(String, Vec<&'static str>, Vec<&'static str>)> {
        let mut out: Vec<(String, Vec<&'static str>, Vec<&'static str>)> = Vec::new();
        let mut calving_inputs: Vec<&'static str> = Vec::new();
        let mut calving_outputs: Vec<&'static str> = Vec::new();
        let mut continuity = None;
        for (slot, c) in self.components() {
            match slot {
                Slot::Calving => {
                    calving_inputs.extend(c.declare_inputs());
                    calving_outputs.extend(c.declare_outputs());
                }
                Slot::MassContinuity => {
                    continuity = Some(out.len());
                    out.push((c.name().to_string(), c.declare_inputs(), c.declare_outputs()));
                }
                _ => out.push((c.name().to_string(), c.declare_inputs(), c.declare_outputs())),
            }
        }
        if calving_outputs.is_empty() {
            return out;
        }
        match continuity {
            Some(idx) => {
                let (_, inputs, outputs) = &mut out[idx];
                merge(inputs, calving_inputs);
                merge(outputs, calving_outputs);
            }
            None => {
                let (mut inputs, mut outputs) = (Vec::new(), Vec::new());
                merge(&mut inputs, calving_inputs);
                merge(&mut outputs, calving_outputs);
                let at = out.len() - usize::from(self.bed_deformation.is_some());
                out.insert(at, ("calving".to_string(), inputs, outputs));
            }
        }
        out
    }

    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        let graph = DependencyGraph::build(&self.declarations())?;
        for (component, field) in graph.lagged() {
            debug!(component = component.as_str(), field = *field, "reads the previous step's value");
        }
        Ok(graph)
    }

    /// Time step advice of every active component.
    pub fn max_timesteps(&self, t: f64) -> Vec<(Slot, MaxTimestep)> {
        self.components()
            .into_iter()
            .map(|(slot, c)| (slot, c.max_timestep(t)))
            .filter(|(_, m)| m.restrict)
            .collect()
    }
}

fn merge(into: &mut Vec<&'static str>, from: Vec<&'static str>) {
    for name in from {
        if !into.contains(&name) {
            into.push(name);
        }
    }
}
