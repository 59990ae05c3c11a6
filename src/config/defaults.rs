//! Default values and doc strings for every recognised option.

use super::ParamValue;

fn d(name: &'static str, v: f64, doc: &'static str) -> (&'static str, ParamValue, &'static str) {
    (name, ParamValue::Double(v), doc)
}

fn i(name: &'static str, v: i64, doc: &'static str) -> (&'static str, ParamValue, &'static str) {
    (name, ParamValue::Integer(v), doc)
}

fn b(name: &'static str, v: bool, doc: &'static str) -> (&'static str, ParamValue, &'static str) {
    (name, ParamValue::Flag(v), doc)
}

fn s(name: &'static str, v: &str, doc: &'static str) -> (&'static str, ParamValue, &'static str) {
    (name, ParamValue::Text(v.to_string()), doc)
}

pub(super) fn table() -> Vec<(&'static str, ParamValue, &'static str)> {
    vec![
        // ---------------------------------------------------------------- grid
        i("grid_Mx", 61, "Number of grid points in the x direction"),
        i("grid_My", 61, "Number of grid points in the y direction"),
        i("grid_Mz", 31, "Number of vertical levels in the ice"),
        i("grid_Mbz", 1, "Number of vertical levels in the bedrock thermal layer; 1 disables it"),
        d("grid_Lx", 800e3, "Half-width of the domain in the x direction, m"),
        d("grid_Ly", 800e3, "Half-width of the domain in the y direction, m"),
        d("grid_Lz", 4000.0, "Height of the computational box for the ice, m"),
        d("grid_Lbz", 0.0, "Thickness of the bedrock thermal layer, m"),
        d("grid_x0", 0.0, "x coordinate of the domain center, m"),
        d("grid_y0", 0.0, "y coordinate of the domain center, m"),
        s("grid_periodicity", "none", "Horizontal periodicity: none, x, y, or xy"),
        s("grid_ice_vertical_spacing", "quadratic", "Ice level spacing: equal or quadratic"),
        d("grid_lambda", 4.0, "Stretching parameter of the quadratic ice level spacing"),
        i("grid_ranks_x", 0, "Number of ranks in x; 0 chooses automatically"),
        // ---------------------------------------------------------------- time
        s("calendar", "360_day", "Calendar: 360_day, 365_day, noleap, gregorian, standard"),
        s("time_units", "seconds since 1-1-1", "CF time units of stored times"),
        s("reference_date", "1-1-1", "Reference date of the time axis"),
        d("start_year", 0.0, "Start of the run, years since the reference date"),
        d("run_length_years", 1000.0, "Length of the run, years"),
        d("end_year", 1000.0, "End of the run, years since the reference date; overrides run_length_years when set"),
        d("maximum_time_step_years", 60.0, "Maximum time step, years"),
        d("fixed_time_step_years", 0.0, "If positive, every step uses this length, years"),
        d("timestep_floor_years", 1e-6, "Smallest time step allowed before the run aborts, years"),
        d("adaptive_timestepping_ratio", 0.12, "Safety ratio alpha of the diffusive time step bound"),
        b("do_skip", false, "Run several mass-continuity steps per energy step when diffusion limits the step"),
        i("skip_max", 10, "Maximum number of mass-continuity steps per energy step"),
        // ------------------------------------------------------------ switches
        b("do_mass_conserve", true, "Solve the mass continuity equation"),
        b("do_energy", true, "Solve the energy conservation equation"),
        b("do_age", false, "Solve the age equation"),
        b("include_bmr_in_continuity", true, "Subtract grounded basal melt in mass continuity"),
        b("ssa_dirichlet_bc", false, "Honor the velocity boundary condition mask in the stress balance"),
        b("ocean_kill", false, "Remove ice where the initial mask is ice-free ocean"),
        b("float_kill", false, "Remove all floating ice"),
        d("thickness_calving_threshold", 0.0, "Floating ice thinner than this is calved, m; 0 disables"),
        b("kill_icebergs", false, "Remove floating ice not connected to grounded ice"),
        b("part_grid", false, "Use the partial-cell calving front parameterization"),
        b("part_grid_reduce_frontal_thickness", false, "Reduce the partial-cell threshold at the front"),
        i("part_redist_max_passes", 3, "Passes of residual redistribution in the partial-cell front"),
        // -------------------------------------------------------------- limits
        d("global_min_allowed_temp", 200.0, "Ice temperatures below this are counted as errors, K"),
        i("max_low_temp_count", 10, "Number of low temperatures tolerated per step"),
        d("mass_closure_warn_tolerance", 1e-9, "Relative mass closure residual above which a warning is logged"),
        d("mass_closure_error_tolerance", 1e-6, "Relative mass closure residual above which the run aborts"),
        // ------------------------------------------------------------- physics
        d("ice_density", 910.0, "Density of ice, kg m-3"),
        d("sea_water_density", 1028.0, "Density of sea water, kg m-3"),
        d("fresh_water_density", 1000.0, "Density of fresh water, kg m-3"),
        d("standard_gravity", 9.81, "Acceleration due to gravity, m s-2"),
        d("ice_specific_heat_capacity", 2009.0, "Specific heat capacity of ice, J kg-1 K-1"),
        d("ice_thermal_conductivity", 2.10, "Thermal conductivity of ice, W m-1 K-1"),
        d("water_latent_heat_fusion", 3.34e5, "Latent heat of fusion of water, J kg-1"),
        d("water_melting_point_temperature", 273.15, "Melting point of water at atmospheric pressure, K"),
        d("beta_CC", 7.9e-8, "Clausius-Clapeyron constant, K Pa-1"),
        d("water_specific_heat_capacity", 4170.0, "Specific heat capacity of water, J kg-1 K-1"),
        d("enthalpy_reference_temperature", 223.15, "Temperature at which enthalpy is zero, K"),
        d("enthalpy_temperate_conductivity_ratio", 0.1, "Ratio of temperate to cold ice diffusivity"),
        d("liquid_water_fraction_max", 0.01, "Water fraction above which water drains to the base"),
        d("bedrock_thermal_density", 3300.0, "Density of the bedrock thermal layer, kg m-3"),
        d("bedrock_thermal_specific_heat_capacity", 1000.0, "Specific heat capacity of bedrock, J kg-1 K-1"),
        d("bedrock_thermal_conductivity", 3.0, "Thermal conductivity of bedrock, W m-1 K-1"),
        // ------------------------------------------------------ stress balance
        s("stress_balance", "sia", "Stress balance model: none, prescribed, sia"),
        s("sia_flow_law", "isothermal_glen", "SIA flow law: isothermal_glen or paterson_budd"),
        d("ice_softness", 1e-16, "Ice softness of the isothermal Glen flow law, Pa-3 year-1"),
        d("sia_Glen_exponent", 3.0, "Glen exponent n"),
        d("sia_enhancement_factor", 1.0, "SIA flow enhancement factor"),
        d("prescribed_u_m_per_year", 0.0, "x component of the prescribed plug flow, m year-1"),
        d("prescribed_v_m_per_year", 0.0, "y component of the prescribed plug flow, m year-1"),
        // ------------------------------------------------------------ energy
        d("initial_age_of_ice_years", 0.0, "Age assigned to ice at bootstrap, years"),
        // --------------------------------------------------------- hydrology
        s("hydrology_model", "till_can", "Hydrology model: till_can or routing"),
        d("hydrology_tillwat_max", 2.0, "Maximum till water thickness, m"),
        d("hydrology_tillwat_decay_rate", 1e-3, "Till water decay rate, m year-1"),
        d("hydrology_hydraulic_conductivity", 1e-2, "Hydraulic conductivity of the transport layer, m s-1"),
        d("hydrology_pressure_fraction", 0.95, "Water pressure as a fraction of overburden"),
        d("hydrology_null_strip_width", 0.0, "Width of the strip along the domain edge where water is removed, m"),
        d("hydrology_max_cfl", 0.5, "Courant number of the routing model sub-steps"),
        // -------------------------------------------------------- yield stress
        s("yield_stress_model", "mohr_coulomb", "Yield stress model: mohr_coulomb or constant"),
        d("till_cohesion", 0.0, "Till cohesion c0, Pa"),
        d("till_reference_void_ratio", 0.69, "Till reference void ratio e0"),
        d("till_compressibility_coefficient", 0.12, "Till compressibility coefficient Cc"),
        d("till_effective_fraction_overburden", 0.02, "Minimum effective pressure as a fraction of overburden"),
        d("till_log_factor_transportable_water", 0.1, "Log factor k for transportable water, m"),
        d("default_till_phi", 30.0, "Till friction angle, degrees"),
        d("default_tauc", 1e4, "Yield stress of the constant model, Pa"),
        d("high_tauc", 1e6, "Yield stress at grounded ice-free cells, Pa"),
        b("tauc_slippery_grounding_lines", false, "Saturate till near grounding lines"),
        b("tauc_add_transportable_water", false, "Include transportable water in the effective till water"),
        b("topg_to_phi", false, "Compute the till friction angle from bed elevation"),
        d("topg_to_phi_phi_min", 5.0, "Till friction angle at and below topg_min, degrees"),
        d("topg_to_phi_phi_max", 15.0, "Till friction angle at and above topg_max, degrees"),
        d("topg_to_phi_topg_min", -1000.0, "Lower bed elevation of the friction angle ramp, m"),
        d("topg_to_phi_topg_max", 1000.0, "Upper bed elevation of the friction angle ramp, m"),
        // -------------------------------------------------- bed deformation
        s("bed_deformation_model", "none", "Bed deformation model: none, iso, lc"),
        d("bed_def_interval_years", 10.0, "Interval between bed deformation updates, years"),
        d("mantle_density", 3300.0, "Density of the mantle, kg m-3"),
        d("bed_def_relaxation_time_years", 3000.0, "Relaxation time of the local relaxation model, years"),
        // ---------------------------------------------------------- couplers
        s("surface_model", "given", "Surface model, optionally followed by modifiers: given, constant, eismint2, verification_a, stochastic, pdd; modifiers delta_T, force_to_thickness"),
        s("atmosphere_model", "yearly_cycle", "Atmosphere model used by the pdd surface model"),
        s("ocean_model", "constant", "Ocean model, optionally followed by the delta_SL modifier"),
        d("surface_constant_mass_balance", 0.0, "Surface mass balance of the constant model, m year-1 ice equivalent"),
        d("surface_constant_temperature", 248.15, "Ice surface temperature of the constant model, K"),
        s("eismint2_experiment", "A", "EISMINT II experiment: A, B, C, D, F"),
        d("surface_stochastic_mean", 0.0, "Mean of the stochastic surface mass balance, m year-1"),
        d("surface_stochastic_amplitude", 1.0, "Half-width of the stochastic surface mass balance, m year-1"),
        i("surface_stochastic_seed", 42, "Seed of the stochastic surface mass balance"),
        d("surface_stochastic_temperature", 248.15, "Ice surface temperature of the stochastic model, K"),
        d("pdd_factor_snow", 0.003, "Degree-day factor for snow, m K-1 day-1 water equivalent"),
        d("pdd_factor_ice", 0.008, "Degree-day factor for ice, m K-1 day-1 water equivalent"),
        d("pdd_refreeze", 0.6, "Fraction of melted snow that refreezes"),
        d("pdd_std_dev", 5.0, "Standard deviation of daily temperature variability, K"),
        d("pdd_positive_threshold_temp", 273.15, "Temperature above which degree days accumulate, K"),
        i("pdd_max_evals_per_year", 52, "Maximum number of PDD integrand evaluations per year"),
        d("air_temp_all_precip_as_snow", 273.15, "Below this temperature all precipitation is snow, K"),
        d("air_temp_all_precip_as_rain", 275.15, "Above this temperature all precipitation is rain, K"),
        b("interpret_precip_as_snow", false, "Treat all precipitation as snow"),
        d("atmosphere_mean_annual_temp", 253.15, "Mean annual air temperature of the yearly cycle, K"),
        d("atmosphere_july_temp", 268.15, "Mean July air temperature of the yearly cycle, K"),
        d("atmosphere_precipitation", 0.5, "Precipitation of the yearly cycle, m year-1 ice equivalent"),
        d("snow_temp_july_day", 196.0, "Day of the year of the warmest temperature"),
        s("surface_delta_T_file", "", "Two-column file with the surface temperature offset"),
        d("surface_delta_T_period", 0.0, "Period of the temperature offset series, years; 0 disables"),
        d("surface_delta_T_reference_year", 0.0, "Reference year of the temperature offset series"),
        s("force_to_thickness_file", "", "State file holding the target thickness"),
        d("force_to_thickness_alpha", 0.01, "Force-to-thickness rate, year-1"),
        d("force_to_thickness_ice_free_alpha_factor", 1.0, "Rate multiplier where the target is ice free"),
        d("force_to_thickness_ice_free_thickness_threshold", 1.0, "Targets thinner than this count as ice free, m"),
        d("sea_level", 0.0, "Sea level of the constant ocean model, m"),
        d("ocean_sub_shelf_heat_flux_into_ice", 0.5, "Sub-shelf heat flux into the ice, W m-2"),
        s("ocean_delta_SL_file", "", "Two-column file with the sea level offset"),
        d("ocean_delta_SL_period", 0.0, "Period of the sea level offset series, years; 0 disables"),
        d("ocean_delta_SL_reference_year", 0.0, "Reference year of the sea level offset series"),
        // ------------------------------------------------------- bootstrap
        d("bootstrapping_geothermal_flux_value_no_var", 0.042, "Geothermal flux where absent, W m-2"),
        d("bootstrapping_bed_value_no_var", 1.0, "Bed elevation where absent, m"),
        d("bootstrapping_thickness_value_no_var", 0.0, "Ice thickness where absent, m"),
        d("bootstrapping_tillwat_value_no_var", 0.0, "Till water thickness where absent, m"),
        d("bootstrapping_climatic_mass_balance_value_no_var", 0.0, "Surface mass balance where absent, m year-1"),
        d("bootstrapping_ice_surface_temp_value_no_var", 248.15, "Ice surface temperature where absent, K"),
        d("bootstrapping_uplift_value_no_var", 0.0, "Bed uplift rate where absent, m year-1"),
        // ---------------------------------------------------------------- input
        s("input_file", "", "State file to start from"),
        b("bootstrap", false, "Start from partial data in input_file, filling absent fields"),
        // ----------------------------------------------------------- output
        s("output_file", "unnamed.bin", "Name of the final output file"),
        s("output_size", "medium", "Variables in the output: small, medium, big"),
        s("save_times", "", "Times of snapshot files"),
        s("save_file", "snapshots", "Prefix of snapshot files"),
        s("extra_times", "", "Times of extra (spatial diagnostic) records"),
        s("extra_vars", "thk,usurf,mask", "Comma-separated extra variables"),
        s("extra_file", "extras.bin", "Extra diagnostics file"),
        s("ts_times", "", "Times of scalar time-series records"),
        s("ts_file", "ts.json", "Scalar time-series file"),
        i("verbosity", 2, "Verbosity: 1 warnings, 2 info, 3 debug, 4 trace"),
    ]
}
