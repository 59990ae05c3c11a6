//! Well-known model fields.
//!
//! Every field the model itself creates has a `Var` entry giving its
//! name, shape, ghost width, and metadata. Couplers and diagnostics may
//! still register extra fields by name.

use super::{FieldMetadata, FieldShape};
use crate::geometry::CellType;

/// Names of the model's own fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Var {
    Thickness,
    Bed,
    Surface,
    Mask,
    ThicknessRef,
    Enthalpy,
    Temperature,
    LiquidFraction,
    BedrockTemp,
    Age,
    GeothermalFlux,
    BedrockFlux,
    BasalMelt,
    TillWater,
    TransportWater,
    WaterPressure,
    TillPhi,
    YieldStress,
    U3,
    V3,
    W3,
    StrainHeating,
    VelBar,
    VelBase,
    DiffusiveFlux,
    FluxDivergence,
    MassBalance,
    SurfaceTemp,
    ShelfBaseTemp,
    ShelfBaseMassFlux,
    BcMask,
    VelBc,
    OceanKillMask,
    BedUplift,
    BedInitial,
    ThicknessInitial,
}

impl Var {
    /// Every variable, in declaration order.
    pub const ALL: [Var; 36] = [
        Var::Thickness,
        Var::Bed,
        Var::Surface,
        Var::Mask,
        Var::ThicknessRef,
        Var::Enthalpy,
        Var::Temperature,
        Var::LiquidFraction,
        Var::BedrockTemp,
        Var::Age,
        Var::GeothermalFlux,
        Var::BedrockFlux,
        Var::BasalMelt,
        Var::TillWater,
        Var::TransportWater,
        Var::WaterPressure,
        Var::TillPhi,
        Var::YieldStress,
        Var::U3,
        Var::V3,
        Var::W3,
        Var::StrainHeating,
        Var::VelBar,
        Var::VelBase,
        Var::DiffusiveFlux,
        Var::FluxDivergence,
        Var::MassBalance,
        Var::SurfaceTemp,
        Var::ShelfBaseTemp,
        Var::ShelfBaseMassFlux,
        Var::BcMask,
        Var::VelBc,
        Var::OceanKillMask,
        Var::BedUplift,
        Var::BedInitial,
        Var::ThicknessInitial,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Var::Thickness => "thk",
            Var::Bed => "topg",
            Var::Surface => "usurf",
            Var::Mask => "mask",
            Var::ThicknessRef => "Href",
            Var::Enthalpy => "enthalpy",
            Var::Temperature => "temp",
            Var::LiquidFraction => "liqfrac",
            Var::BedrockTemp => "litho_temp",
            Var::Age => "age",
            Var::GeothermalFlux => "bheatflx",
            Var::BedrockFlux => "bheatflx_top",
            Var::BasalMelt => "bmelt",
            Var::TillWater => "tillwat",
            Var::TransportWater => "bwat",
            Var::WaterPressure => "bwp",
            Var::TillPhi => "tillphi",
            Var::YieldStress => "tauc",
            Var::U3 => "uvel",
            Var::V3 => "vvel",
            Var::W3 => "wvel",
            Var::StrainHeating => "strain_heating",
            Var::VelBar => "velbar",
            Var::VelBase => "velbase",
            Var::DiffusiveFlux => "diffusive_flux",
            Var::FluxDivergence => "flux_divergence",
            Var::MassBalance => "climatic_mass_balance",
            Var::SurfaceTemp => "ice_surface_temp",
            Var::ShelfBaseTemp => "shelfbtemp",
            Var::ShelfBaseMassFlux => "shelfbmassflux",
            Var::BcMask => "bc_mask",
            Var::VelBc => "vel_bc",
            Var::OceanKillMask => "ocean_kill_mask",
            Var::BedUplift => "dbdt",
            Var::BedInitial => "topg_initial",
            Var::ThicknessInitial => "thk_initial",
        }
    }

    pub fn from_name(name: &str) -> Option<Var> {
        Var::ALL.into_iter().find(|v| v.name() == name)
    }

    pub fn shape(self) -> FieldShape {
        match self {
            Var::Enthalpy
            | Var::Temperature
            | Var::LiquidFraction
            | Var::Age
            | Var::U3
            | Var::V3
            | Var::W3
            | Var::StrainHeating => FieldShape::Ice3D,
            Var::BedrockTemp => FieldShape::Bedrock3D,
            Var::VelBar | Var::VelBase | Var::DiffusiveFlux | Var::VelBc => FieldShape::Vector2D,
            _ => FieldShape::Scalar2D,
        }
    }

    pub fn ghost_width(self) -> usize {
        match self {
            Var::Thickness | Var::Bed | Var::Surface | Var::Mask => 2,
            Var::ThicknessRef
            | Var::Enthalpy
            | Var::Age
            | Var::VelBar
            | Var::VelBase
            | Var::DiffusiveFlux
            | Var::TransportWater
            | Var::WaterPressure
            | Var::BcMask
            | Var::VelBc => 1,
            _ => 0,
        }
    }

    /// Part of the saved model state (required when restarting).
    pub fn is_state(self) -> bool {
        matches!(
            self,
            Var::Thickness
                | Var::Bed
                | Var::Mask
                | Var::ThicknessRef
                | Var::Enthalpy
                | Var::BedrockTemp
                | Var::BedrockFlux
                | Var::Age
                | Var::GeothermalFlux
                | Var::BasalMelt
                | Var::TillWater
                | Var::TransportWater
                | Var::TillPhi
                | Var::OceanKillMask
                | Var::BedInitial
                | Var::ThicknessInitial
        )
    }

    pub fn metadata(self) -> FieldMetadata {
        let m = FieldMetadata::new;
        match self {
            Var::Thickness => m("thk", "land ice thickness", "m")
                .with_standard_name("land_ice_thickness")
                .with_valid_min(0.0),
            Var::Bed => m("topg", "bedrock surface elevation", "m")
                .with_standard_name("bedrock_altitude")
                .with_valid_range(-5000.0, 5000.0)
                .advisory(),
            Var::Surface => m("usurf", "ice upper surface elevation", "m")
                .with_standard_name("surface_altitude"),
            Var::Mask => m("mask", "ice-type (ice-free/grounded/floating/ocean) integer mask", "1").with_flags(&[
                CellType::IceFreeLand.value(),
                CellType::Grounded.value(),
                CellType::Floating.value(),
                CellType::IceFreeOcean.value(),
            ]),
            Var::ThicknessRef => m("Href", "temporary ice thickness at calving front boundary", "m").with_valid_min(0.0),
            Var::Enthalpy => m("enthalpy", "ice enthalpy (includes sensible heat, latent heat, pressure)", "J kg-1"),
            Var::Temperature => m("temp", "ice temperature", "K")
                .with_standard_name("land_ice_temperature")
                .with_valid_min(0.0),
            Var::LiquidFraction => m("liqfrac", "liquid water fraction in ice", "1").with_valid_range(0.0, 1.0),
            Var::BedrockTemp => m("litho_temp", "lithosphere (bedrock) temperature", "K").with_valid_min(0.0),
            Var::Age => m("age", "age of ice", "s")
                .with_glaciological_units("years")
                .with_valid_min(0.0),
            Var::GeothermalFlux => m("bheatflx", "upward geothermal flux at bedrock bottom", "W m-2")
                .with_glaciological_units("mW m-2")
                .time_independent(),
            Var::BedrockFlux => m("bheatflx_top", "upward heat flux at the top of the bedrock layer", "W m-2")
                .with_glaciological_units("mW m-2"),
            Var::BasalMelt => m("bmelt", "ice basal melt rate in ice thickness per time", "m s-1")
                .with_glaciological_units("m year-1"),
            Var::TillWater => m("tillwat", "effective thickness of subglacial water stored in till", "m")
                .with_valid_min(0.0),
            Var::TransportWater => m("bwat", "thickness of transportable subglacial water layer", "m").with_valid_min(0.0),
            Var::WaterPressure => m("bwp", "pressure of transportable subglacial water", "Pa"),
            Var::TillPhi => m("tillphi", "friction angle for till under grounded ice sheet", "degrees")
                .with_valid_range(0.0, 90.0)
                .time_independent(),
            Var::YieldStress => m("tauc", "yield stress for basal till (plastic or pseudo-plastic model)", "Pa"),
            Var::U3 => m("uvel", "horizontal velocity of ice in the X direction", "m s-1")
                .with_glaciological_units("m year-1"),
            Var::V3 => m("vvel", "horizontal velocity of ice in the Y direction", "m s-1")
                .with_glaciological_units("m year-1"),
            Var::W3 => m("wvel", "vertical velocity of ice, relative to the ice base", "m s-1")
                .with_glaciological_units("m year-1"),
            Var::StrainHeating => m("strain_heating", "rate of strain heating in ice (dissipation heating)", "W m-3"),
            Var::VelBar => m("velbar", "vertically averaged ice velocity", "m s-1").with_glaciological_units("m year-1"),
            Var::VelBase => m("velbase", "ice velocity at the base", "m s-1").with_glaciological_units("m year-1"),
            Var::DiffusiveFlux => m("diffusive_flux", "diffusive (SIA) flux on the staggered grid", "m2 s-1")
                .with_glaciological_units("m2 year-1"),
            Var::FluxDivergence => m("flux_divergence", "flux divergence", "m s-1").with_glaciological_units("m year-1"),
            Var::MassBalance => m("climatic_mass_balance", "surface mass balance, ice equivalent", "m s-1")
                .with_standard_name("land_ice_surface_specific_mass_balance")
                .with_glaciological_units("m year-1"),
            Var::SurfaceTemp => m("ice_surface_temp", "ice temperature at the ice surface", "K").with_valid_min(0.0),
            Var::ShelfBaseTemp => m("shelfbtemp", "ice temperature at the base of ice shelves", "K"),
            Var::ShelfBaseMassFlux => m("shelfbmassflux", "sub-shelf melt rate, ice equivalent", "m s-1")
                .with_glaciological_units("m year-1"),
            Var::BcMask => m("bc_mask", "Dirichlet boundary condition locations", "1")
                .with_flags(&[0.0, 1.0])
                .time_independent(),
            Var::VelBc => m("vel_bc", "prescribed velocity at Dirichlet locations", "m s-1")
                .with_glaciological_units("m year-1")
                .time_independent(),
            Var::OceanKillMask => m("ocean_kill_mask", "ice-free ocean at the start of the run", "1")
                .with_flags(&[0.0, 1.0])
                .time_independent(),
            Var::BedUplift => m("dbdt", "bedrock uplift rate", "m s-1").with_glaciological_units("m year-1"),
            Var::BedInitial => m("topg_initial", "bedrock elevation at the start of bed deformation", "m").time_independent(),
            Var::ThicknessInitial => m("thk_initial", "ice thickness at the start of bed deformation", "m").time_independent(),
        }
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_unique_and_round_trip() {
        let mut names: Vec<_> = Var::ALL.iter().map(|v| v.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Var::ALL.len());
        for v in Var::ALL {
            assert_eq!(Var::from_name(v.name()), Some(v));
            assert_eq!(v.metadata().name, v.name());
        }
    }

    #[test]
    fn test_mask_is_categorical() {
        assert!(Var::Mask.metadata().is_categorical());
        assert!(!Var::Thickness.metadata().is_categorical());
    }
}
