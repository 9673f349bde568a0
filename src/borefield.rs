use crate::core::gfunction::GFunctionProvider;
use crate::core::ground::GroundModel;
use crate::core::load::{HourlyBuildingLoad, LoadProfile};
use crate::core::optimizer::{LoadOptimizer, OptimizationStrategy, OptimizedLoad};
use crate::core::resistance::{FluidData, ResistanceProvider};
use crate::core::sizing::{Quadrant, SizingSolver};
use crate::core::temperature::{Results, TemperatureEngine, INITIAL_FLUID_TEMPERATURE};
use crate::core::units::TemperatureBounds;
use crate::errors::BorefieldError;
use crate::geometry::BoreholeField;
use crate::setup::CalculationSetup;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Per-metre drilling cost used when no polynomial is configured, EUR/m.
const DEFAULT_INVESTMENT_COST: [f64; 2] = [0., 35.];

/// Everything about a borefield study except the two providers, in a form
/// that serialises to a flat document and reconstructs the same study.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BorefieldConfig {
    pub field: BoreholeField,
    pub ground: Option<GroundModel>,
    pub load: Option<LoadProfile>,
    pub fluid: FluidData,
    pub bounds: TemperatureBounds,
    pub setup: CalculationSetup,
    /// Investment cost polynomial in the total drilled length, ascending
    /// coefficients (EUR, EUR/m, EUR/m2, ...).
    pub investment_cost: Vec<f64>,
}

/// Facade tying the field geometry, ground, load and solver configuration
/// together with the g-function and resistance providers.
pub struct Borefield<'a> {
    config: BorefieldConfig,
    gfunction: &'a dyn GFunctionProvider,
    resistance: &'a dyn ResistanceProvider,
    results: Option<Results>,
    limiting_quadrant: Option<Quadrant>,
}

impl<'a> Borefield<'a> {
    pub fn new(
        field: BoreholeField,
        fluid: FluidData,
        gfunction: &'a dyn GFunctionProvider,
        resistance: &'a dyn ResistanceProvider,
    ) -> Result<Self, BorefieldError> {
        let config = BorefieldConfig {
            field,
            ground: None,
            load: None,
            fluid,
            bounds: TemperatureBounds::new(0., 16.)?,
            setup: CalculationSetup::default(),
            investment_cost: DEFAULT_INVESTMENT_COST.to_vec(),
        };
        Ok(Self::from_config(config, gfunction, resistance))
    }

    /// Rebuild a study from a serialised configuration. Cached results are
    /// not part of the configuration and start empty.
    pub fn from_config(
        config: BorefieldConfig,
        gfunction: &'a dyn GFunctionProvider,
        resistance: &'a dyn ResistanceProvider,
    ) -> Self {
        Self {
            config,
            gfunction,
            resistance,
            results: None,
            limiting_quadrant: None,
        }
    }

    pub fn config(&self) -> &BorefieldConfig {
        &self.config
    }

    pub fn set_ground(&mut self, ground: GroundModel) {
        self.config.ground = Some(ground);
        self.results = None;
    }

    pub fn set_load(&mut self, load: LoadProfile) {
        self.config.load = Some(load);
        self.results = None;
    }

    pub fn set_temperature_bounds(
        &mut self,
        t_f_min: f64,
        t_f_max: f64,
    ) -> Result<(), BorefieldError> {
        self.config.bounds = TemperatureBounds::new(t_f_min, t_f_max)?;
        self.results = None;
        Ok(())
    }

    pub fn setup(&self) -> &CalculationSetup {
        &self.config.setup
    }

    pub fn setup_mut(&mut self) -> &mut CalculationSetup {
        self.results = None;
        &mut self.config.setup
    }

    pub fn set_investment_cost(&mut self, coefficients: Vec<f64>) {
        self.config.investment_cost = coefficients;
    }

    /// Current borehole length in metres (field average before sizing).
    pub fn h(&self) -> f64 {
        self.config.field.metadata().h
    }

    pub fn field(&self) -> &BoreholeField {
        &self.config.field
    }

    /// The quadrant that governed the last sizing, if any.
    pub fn limiting_quadrant(&self) -> Option<Quadrant> {
        self.limiting_quadrant
    }

    /// Cached temperature results from the last calculation.
    pub fn results(&self) -> Option<&Results> {
        self.results.as_ref()
    }

    /// Size the field: find the minimum borehole length such that the fluid
    /// temperature stays inside the bounds, apply it to every borehole and
    /// return it.
    pub fn size(&mut self) -> Result<f64, BorefieldError> {
        let outcome = {
            let engine = self.engine()?;
            let load = self
                .config
                .load
                .as_ref()
                .ok_or(BorefieldError::LoadDataMissing)?;
            let solver = SizingSolver {
                engine: &engine,
                profile: load,
                setup: &self.config.setup,
                bounds: self.config.bounds,
                h_start: self.config.field.metadata().h,
            };
            solver.size()?
        };
        info!(
            h = outcome.h,
            quadrant = outcome.quadrant.index(),
            "borefield sized"
        );
        self.config.field.set_length(outcome.h);
        self.limiting_quadrant = Some(outcome.quadrant);
        self.results = None;
        Ok(outcome.h)
    }

    /// Compute the temperature evolution at the current borehole length and
    /// cache it. `hourly` requires an hourly load profile.
    pub fn calculate_temperatures(&mut self, hourly: bool) -> Result<&Results, BorefieldError> {
        let results = {
            let engine = self.engine()?;
            let load = self
                .config
                .load
                .as_ref()
                .ok_or(BorefieldError::LoadDataMissing)?;
            engine
                .solve(
                    load,
                    self.config.field.metadata().h,
                    &self.config.setup,
                    hourly,
                    false,
                )?
                .results
        };
        Ok(self.results.insert(results))
    }

    /// Split the configured hourly building demand between this field (at its
    /// current size) and an external system. The borefield share replaces the
    /// configured load.
    pub fn optimise_load(
        &mut self,
        strategy: OptimizationStrategy,
    ) -> Result<OptimizedLoad, BorefieldError> {
        let split = {
            let engine = self.engine()?;
            let load = match self
                .config
                .load
                .as_ref()
                .ok_or(BorefieldError::LoadDataMissing)?
            {
                LoadProfile::HourlyBuilding(load) => load,
                LoadProfile::MonthlyBuilding(_) => return Err(BorefieldError::HourlyDataRequired),
                _ => return Err(BorefieldError::BuildingLoadRequired),
            };
            let optimizer = LoadOptimizer {
                engine: &engine,
                setup: &self.config.setup,
                bounds: self.config.bounds,
                h: self.config.field.metadata().h,
            };
            optimizer.optimise(load, strategy)?
        };
        self.config.load = Some(LoadProfile::HourlyBuilding(split.on_borefield.clone()));
        self.results = None;
        Ok(split)
    }

    /// Split an explicit demand profile without touching the configured load.
    pub fn optimise_external_load(
        &self,
        load: &HourlyBuildingLoad,
        strategy: OptimizationStrategy,
    ) -> Result<OptimizedLoad, BorefieldError> {
        let engine = self.engine()?;
        let optimizer = LoadOptimizer {
            engine: &engine,
            setup: &self.config.setup,
            bounds: self.config.bounds,
            h: self.config.field.metadata().h,
        };
        optimizer.optimise(load, strategy)
    }

    /// Investment cost polynomial evaluated over the total drilled length.
    pub fn investment_cost(&self) -> f64 {
        let meta = self.config.field.metadata();
        let total_length = meta.n_boreholes as f64 * meta.h;
        self.config
            .investment_cost
            .iter()
            .rev()
            .fold(0., |acc, coefficient| acc * total_length + coefficient)
    }

    /// Flat numeric readout of the study for reporting. Keys for missing
    /// inputs are omitted.
    pub fn export(&self) -> Result<IndexMap<String, f64>, BorefieldError> {
        let meta = self.config.field.metadata();
        let mut out = IndexMap::new();
        out.insert("n_boreholes".to_string(), meta.n_boreholes as f64);
        out.insert("borehole_length".to_string(), meta.h);
        out.insert("borehole_radius".to_string(), meta.r_b);
        out.insert("buried_depth".to_string(), meta.buried_depth);
        out.insert("t_f_min".to_string(), self.config.bounds.t_f_min);
        out.insert("t_f_max".to_string(), self.config.bounds.t_f_max);
        if let Some(ground) = &self.config.ground {
            out.insert(
                "ground_conductivity".to_string(),
                ground.conductivity(meta.h)?,
            );
            out.insert(
                "ground_temperature".to_string(),
                ground.temperature_at(meta.h)?,
            );
        }
        if let Some(load) = &self.config.load {
            out.insert(
                "simulation_period".to_string(),
                load.simulation_period() as f64,
            );
            let ground_load =
                load.ground_load_at_uniform_temperature(INITIAL_FLUID_TEMPERATURE)?;
            out.insert("load_imbalance".to_string(), ground_load.imbalance());
        }
        if let Some(quadrant) = self.limiting_quadrant {
            out.insert("limiting_quadrant".to_string(), quadrant.index() as f64);
        }
        out.insert("investment_cost".to_string(), self.investment_cost());
        Ok(out)
    }

    fn engine(&self) -> Result<TemperatureEngine<'_>, BorefieldError> {
        let ground = self
            .config
            .ground
            .as_ref()
            .ok_or(BorefieldError::GroundDataMissing)?;
        let meta = self.config.field.metadata();
        Ok(TemperatureEngine {
            ground,
            gfunction: self.gfunction,
            resistance: self.resistance,
            fluid: &self.config.fluid,
            n_boreholes: meta.n_boreholes,
            r_b: meta.r_b,
            buried_depth: meta.buried_depth,
        })
    }
}
