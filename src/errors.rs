use crate::core::gfunction::GFunctionError;
use crate::core::ground::GroundConfigurationError;
use crate::core::load::LoadConfigurationError;
use crate::core::resistance::ResistanceError;
use crate::core::units::InvalidTemperatureBoundsError;
use thiserror::Error;

/// Top-level error type for borefield sizing and simulation.
///
/// Configuration problems fail fast at construction; convergence failures are
/// raised by the solvers and may be recovered internally only by the
/// deep-sizing fallback. Provider errors propagate unchanged.
#[derive(Debug, Error)]
pub enum BorefieldError {
    #[error("no ground data has been configured")]
    GroundDataMissing,
    #[error("no load profile has been configured")]
    LoadDataMissing,
    #[error("a borefield must contain at least one borehole")]
    EmptyField,
    #[error("sizing quadrant must be 0 (automatic) or 1-4, got {0}")]
    InvalidQuadrant(u8),
    #[error("an hourly load profile is required for this operation")]
    HourlyDataRequired,
    #[error("a building-side load profile is required for this operation")]
    BuildingLoadRequired,
    #[error(
        "sizing failed to converge within {iterations} iterations (last borehole length {last_h:.2} m)"
    )]
    MaxIterationsReached { iterations: usize, last_h: f64 },
    #[error(
        "field cannot be sized: lengthening for the minimum fluid temperature raises the ground \
         temperature past the maximum fluid temperature"
    )]
    UnsolvableDueToTemperatureGradient,
    #[error(transparent)]
    InvalidTemperatureBounds(#[from] InvalidTemperatureBoundsError),
    #[error(transparent)]
    Ground(#[from] GroundConfigurationError),
    #[error(transparent)]
    Load(#[from] LoadConfigurationError),
    #[error(transparent)]
    GFunction(#[from] GFunctionError),
    #[error(transparent)]
    Resistance(#[from] ResistanceError),
    #[error("borefield calculation failed: {0}")]
    Internal(#[from] anyhow::Error),
}
