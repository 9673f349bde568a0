pub mod borefield;
pub mod core;
pub mod errors;
pub mod geometry;
pub mod setup;

#[macro_use]
extern crate is_close;

pub use crate::borefield::{Borefield, BorefieldConfig};
pub use crate::core::efficiency::{Cop, Eer, EfficiencyCurve};
pub use crate::core::gfunction::{CachingProvider, GFunctionError, GFunctionProvider};
pub use crate::core::ground::GroundModel;
pub use crate::core::load::{
    HourlyBuildingLoad, HourlyGroundLoad, LoadProfile, MonthlyBuildingLoad, MonthlyGroundLoad,
};
pub use crate::core::optimizer::{OptimizationStrategy, OptimizedLoad};
pub use crate::core::resistance::{
    ConstantResistance, FluidData, FluidProperty, ResistanceError, ResistanceProvider,
};
pub use crate::core::sizing::{Quadrant, SizingOutcome};
pub use crate::core::temperature::{HourlyResults, InletOutlet, MonthlyResults, Results};
pub use crate::core::units::TemperatureBounds;
pub use crate::errors::BorefieldError;
pub use crate::geometry::{Borehole, BoreholeField, FieldMetadata};
pub use crate::setup::{CalculationSetup, SizeBasedOn, SizingMode};
