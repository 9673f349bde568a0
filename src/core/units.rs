use serde::{Deserialize, Serialize};

pub const WATTS_PER_KILOWATT: u32 = 1_000;
pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const MONTHS_PER_YEAR: usize = 12;

// The simulation grid uses twelve equal months of 730 hours. The grids handed
// to a g-function provider must be built from these values, never from
// calendar month lengths.
pub const HOURS_PER_MONTH: u32 = 730;
pub const HOURS_PER_YEAR: u32 = 8_760;

pub const SECONDS_PER_MONTH: f64 = (HOURS_PER_MONTH * SECONDS_PER_HOUR) as f64;
pub const SECONDS_PER_YEAR: f64 = (HOURS_PER_YEAR * SECONDS_PER_HOUR) as f64;

/// Default duration a peak load is assumed to be sustained, in hours.
pub const DEFAULT_PEAK_DURATION_HOURS: f64 = 6.;

/// Convert a monthly energy total in kWh to the average power over that month in kW.
pub(crate) fn monthly_energy_to_average_power(energy_kwh: f64) -> f64 {
    energy_kwh / HOURS_PER_MONTH as f64
}

/// Time grid in seconds for monthly resolution: the end of each month from the
/// start of the simulation.
pub(crate) fn monthly_time_grid(months: usize) -> Vec<f64> {
    (1..=months).map(|k| k as f64 * SECONDS_PER_MONTH).collect()
}

/// Time grid in seconds for hourly resolution: the end of each hour.
pub(crate) fn hourly_time_grid(hours: usize) -> Vec<f64> {
    (1..=hours)
        .map(|k| k as f64 * SECONDS_PER_HOUR as f64)
        .collect()
}

/// Temperature window the mean fluid temperature must stay inside.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct TemperatureBounds {
    pub t_f_min: f64,
    pub t_f_max: f64,
}

impl TemperatureBounds {
    /// Tolerance applied when checking the bounds, in Kelvin.
    pub const EPSILON: f64 = 0.05;

    pub fn new(t_f_min: f64, t_f_max: f64) -> Result<Self, InvalidTemperatureBoundsError> {
        if t_f_max <= t_f_min {
            return Err(InvalidTemperatureBoundsError { t_f_min, t_f_max });
        }
        Ok(Self { t_f_min, t_f_max })
    }

    pub fn max_within(&self, temp: f64) -> bool {
        temp <= self.t_f_max + Self::EPSILON
    }

    pub fn min_within(&self, temp: f64) -> bool {
        temp >= self.t_f_min - Self::EPSILON
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error)]
#[error("maximum fluid temperature ({t_f_max}degC) must exceed the minimum ({t_f_min}degC)")]
pub struct InvalidTemperatureBoundsError {
    pub t_f_min: f64,
    pub t_f_max: f64,
}
