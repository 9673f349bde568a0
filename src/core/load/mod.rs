pub mod building;
pub mod hourly;
pub mod monthly;

pub use building::{DomesticHotWater, HourlyBuildingLoad, MonthlyBuildingLoad};
pub use hourly::HourlyGroundLoad;
pub use monthly::MonthlyGroundLoad;

use crate::core::units::{MONTHS_PER_YEAR, SECONDS_PER_HOUR};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// This module holds the load representations a borefield can be sized
/// against. Ground-side loads carry thermal energy exchanged with the
/// borefield directly; building-side loads carry demand-side energy plus the
/// heat pump and chiller efficiency curves needed to convert it. Conversion is
/// a pure function of the fluid inlet temperature so that the
/// load/temperature coupling can be resolved by fixed-point iteration in the
/// temperature engine.
///
/// Sign convention: injection into the ground is positive wherever a signed
/// power appears. All constructor inputs are unsigned magnitudes.

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum LoadDirection {
    Extraction,
    Injection,
}

#[derive(Clone, Debug, Error)]
pub enum LoadConfigurationError {
    #[error("load array for {label} must have length {expected_single} or {expected_full}, got {actual}")]
    WrongArrayLength {
        label: &'static str,
        expected_single: usize,
        expected_full: usize,
        actual: usize,
    },
    #[error("load array for {label} contains a negative value at index {index}")]
    NegativeValue { label: &'static str, index: usize },
    #[error(
        "peak {direction:?} power {peak} kW in month {month} is below the month-average power {average} kW"
    )]
    PeakBelowAverage {
        direction: LoadDirection,
        month: usize,
        peak: f64,
        average: f64,
    },
    #[error("simulation period must be at least one year")]
    ZeroSimulationPeriod,
    #[error("peak duration must be positive, got {0} h")]
    NonPositivePeakDuration(f64),
    #[error("extraction, injection and DHW loads overlap in hour {hour}")]
    OverlappingLoads { hour: usize },
    #[error("an hourly load profile is required, but only monthly data is present")]
    HourlyResolutionMissing,
    #[error("inlet temperature array has length {actual}, expected {expected}")]
    WrongTemperatureLength { expected: usize, actual: usize },
}

/// Parameters of the three-pulse decomposition for a first-year sizing:
/// the peak pulse, the limiting month, and the average over the months
/// preceding it. Times in seconds, powers in kW (magnitudes in `direction`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FirstYearParams {
    pub t_peak: f64,
    pub t_month_end: f64,
    pub q_peak: f64,
    pub q_prior_months: f64,
    pub q_month: f64,
}

/// Parameters of the three-pulse decomposition for a last-year sizing:
/// annual imbalance pulse, limiting-month pulse and peak pulse.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LastYearParams {
    pub t_peak: f64,
    pub q_peak: f64,
    pub q_month: f64,
    pub q_annual: f64,
}

/// A load profile as configured by the caller.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum LoadProfile {
    MonthlyGround(MonthlyGroundLoad),
    HourlyGround(HourlyGroundLoad),
    MonthlyBuilding(MonthlyBuildingLoad),
    HourlyBuilding(HourlyBuildingLoad),
}

impl LoadProfile {
    pub fn simulation_period(&self) -> usize {
        match self {
            Self::MonthlyGround(load) => load.simulation_period(),
            Self::HourlyGround(load) => load.simulation_period(),
            Self::MonthlyBuilding(load) => load.simulation_period(),
            Self::HourlyBuilding(load) => load.simulation_period(),
        }
    }

    pub fn has_hourly_resolution(&self) -> bool {
        matches!(self, Self::HourlyGround(_) | Self::HourlyBuilding(_))
    }

    /// Building-side loads depend on the computed inlet temperature and must
    /// be re-resolved inside the coupling loop.
    pub fn is_temperature_dependent(&self) -> bool {
        matches!(self, Self::MonthlyBuilding(_) | Self::HourlyBuilding(_))
    }

    /// Resolve to a ground-side load assuming one uniform inlet temperature.
    /// For ground-side profiles this is the identity.
    pub fn ground_load_at_uniform_temperature(
        &self,
        t_inlet: f64,
    ) -> Result<GroundLoad, LoadConfigurationError> {
        match self {
            Self::MonthlyGround(load) => Ok(GroundLoad::Monthly(load.clone())),
            Self::HourlyGround(load) => Ok(GroundLoad::Hourly(load.clone())),
            Self::MonthlyBuilding(load) => {
                let months = load.simulation_period() * MONTHS_PER_YEAR;
                Ok(GroundLoad::Monthly(
                    load.to_ground_load(&vec![t_inlet; months])?,
                ))
            }
            Self::HourlyBuilding(load) => {
                let hours = load.hours();
                Ok(GroundLoad::Hourly(
                    load.to_ground_load(&vec![t_inlet; hours])?,
                ))
            }
        }
    }

    /// Resolve to a ground-side load with per-interval inlet temperatures at
    /// the profile's native resolution (monthly or hourly).
    pub fn ground_load_with_temperatures(
        &self,
        inlet: &[f64],
    ) -> Result<GroundLoad, LoadConfigurationError> {
        match self {
            Self::MonthlyGround(load) => Ok(GroundLoad::Monthly(load.clone())),
            Self::HourlyGround(load) => Ok(GroundLoad::Hourly(load.clone())),
            Self::MonthlyBuilding(load) => Ok(GroundLoad::Monthly(load.to_ground_load(inlet)?)),
            Self::HourlyBuilding(load) => Ok(GroundLoad::Hourly(load.to_ground_load(inlet)?)),
        }
    }
}

/// A resolved ground-side load, ready for convolution.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum GroundLoad {
    Monthly(MonthlyGroundLoad),
    Hourly(HourlyGroundLoad),
}

impl GroundLoad {
    pub fn simulation_period(&self) -> usize {
        match self {
            Self::Monthly(load) => load.simulation_period(),
            Self::Hourly(load) => load.simulation_period(),
        }
    }

    pub fn months(&self) -> usize {
        self.simulation_period() * MONTHS_PER_YEAR
    }

    /// Signed month-average power in kW, injection positive. Length 12.Y.
    pub fn monthly_average_power(&self) -> Vec<f64> {
        match self {
            Self::Monthly(load) => load.monthly_average_power(),
            Self::Hourly(load) => load.monthly_average_power(),
        }
    }

    /// Peak extraction power per month, kW magnitudes. Length 12.Y.
    pub fn monthly_peak_extraction(&self) -> Vec<f64> {
        match self {
            Self::Monthly(load) => load.monthly_peak_extraction().to_vec(),
            Self::Hourly(load) => load.monthly_peak_extraction(),
        }
    }

    /// Peak injection power per month, kW magnitudes. Length 12.Y.
    pub fn monthly_peak_injection(&self) -> Vec<f64> {
        match self {
            Self::Monthly(load) => load.monthly_peak_injection().to_vec(),
            Self::Hourly(load) => load.monthly_peak_injection(),
        }
    }

    pub fn monthly_baseload_extraction_energy(&self) -> Vec<f64> {
        match self {
            Self::Monthly(load) => load.baseload_extraction_energy().to_vec(),
            Self::Hourly(load) => load.monthly_baseload_extraction_energy(),
        }
    }

    pub fn monthly_baseload_injection_energy(&self) -> Vec<f64> {
        match self {
            Self::Monthly(load) => load.baseload_injection_energy().to_vec(),
            Self::Hourly(load) => load.monthly_baseload_injection_energy(),
        }
    }

    /// Net annual energy balance in kWh/year, injection minus extraction.
    /// Negative means the field is extraction-dominated.
    pub fn imbalance(&self) -> f64 {
        let injection: f64 = self.monthly_baseload_injection_energy().iter().sum();
        let extraction: f64 = self.monthly_baseload_extraction_energy().iter().sum();
        (injection - extraction) / self.simulation_period() as f64
    }

    /// Signed net injection power per hour in kW, if hourly data is present.
    pub fn hourly_net_injection_power(&self) -> Result<Vec<f64>, LoadConfigurationError> {
        match self {
            Self::Monthly(_) => Err(LoadConfigurationError::HourlyResolutionMissing),
            Self::Hourly(load) => Ok(load.net_injection_power()),
        }
    }

    pub fn peak_duration_hours(&self, direction: LoadDirection) -> f64 {
        match self {
            Self::Monthly(load) => load.peak_duration_hours(direction),
            Self::Hourly(load) => load.peak_duration_hours(direction),
        }
    }

    /// Pulse parameters for a first-year (short-term) three-pulse sizing in
    /// the given direction.
    pub fn first_year_params(&self, direction: LoadDirection) -> FirstYearParams {
        let peaks = match direction {
            LoadDirection::Extraction => self.monthly_peak_extraction(),
            LoadDirection::Injection => self.monthly_peak_injection(),
        };
        let average = self.monthly_average_power();
        let limiting = limiting_month(&peaks[..MONTHS_PER_YEAR]);

        let q_peak = peaks[limiting];
        let q_month = directed(average[limiting], direction).max(0.);
        // net energy over the months preceding the limiting one, averaged
        // over that whole duration
        let q_prior_months = if limiting == 0 {
            0.
        } else {
            let prior_net: f64 = average[..limiting]
                .iter()
                .map(|power| directed(*power, direction))
                .sum::<f64>()
                / limiting as f64;
            prior_net.max(0.)
        };

        FirstYearParams {
            t_peak: self.peak_duration_hours(direction) * SECONDS_PER_HOUR as f64,
            t_month_end: crate::core::units::SECONDS_PER_MONTH * (limiting + 1) as f64,
            q_peak,
            q_prior_months,
            q_month,
        }
    }

    /// Pulse parameters for a last-year (long-term) three-pulse sizing in the
    /// given direction.
    pub fn last_year_params(&self, direction: LoadDirection) -> LastYearParams {
        let peaks = match direction {
            LoadDirection::Extraction => self.monthly_peak_extraction(),
            LoadDirection::Injection => self.monthly_peak_injection(),
        };
        let average = self.monthly_average_power();
        let months = self.months();
        let last_year = months - MONTHS_PER_YEAR;
        let limiting = last_year + limiting_month(&peaks[last_year..]);

        LastYearParams {
            t_peak: self.peak_duration_hours(direction) * SECONDS_PER_HOUR as f64,
            q_peak: peaks[limiting],
            q_month: directed(average[limiting], direction).max(0.),
            q_annual: (directed(self.imbalance(), direction)
                / crate::core::units::HOURS_PER_YEAR as f64)
                .max(0.),
        }
    }
}

/// Project a signed (injection-positive) quantity onto a direction, yielding
/// a magnitude that is positive when the quantity points that way.
fn directed(signed: f64, direction: LoadDirection) -> f64 {
    match direction {
        LoadDirection::Injection => signed,
        LoadDirection::Extraction => -signed,
    }
}

fn limiting_month(peaks: &[f64]) -> usize {
    peaks
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(month, _)| month)
        .unwrap_or(0)
}

/// Accept a single-year array (auto-tiled over the simulation period) or one
/// covering the full period.
pub(crate) fn tile_over_period(
    values: Vec<f64>,
    base_len: usize,
    years: usize,
    label: &'static str,
) -> Result<Vec<f64>, LoadConfigurationError> {
    for (index, value) in values.iter().enumerate() {
        if *value < 0. {
            return Err(LoadConfigurationError::NegativeValue { label, index });
        }
    }
    let full_len = base_len * years;
    if values.len() == full_len {
        Ok(values)
    } else if values.len() == base_len {
        Ok(values
            .iter()
            .cycle()
            .take(full_len)
            .copied()
            .collect())
    } else {
        Err(LoadConfigurationError::WrongArrayLength {
            label,
            expected_single: base_len,
            expected_full: full_len,
            actual: values.len(),
        })
    }
}
