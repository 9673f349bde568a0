use crate::core::load::{tile_over_period, LoadConfigurationError, LoadDirection};
use crate::core::units::{DEFAULT_PEAK_DURATION_HOURS, HOURS_PER_MONTH, HOURS_PER_YEAR};
use serde::{Deserialize, Serialize};

/// Ground-side load at hourly resolution, in kW. At this resolution the
/// profile itself carries the peaks; monthly aggregates are derived for the
/// monthly-resolution solvers.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HourlyGroundLoad {
    extraction: Vec<f64>,
    injection: Vec<f64>,
    simulation_period: usize,
    peak_duration_extraction: f64,
    peak_duration_injection: f64,
}

impl HourlyGroundLoad {
    /// Power magnitudes in kW per hour. Arrays must have length 8760 or 8760
    /// times the simulation period. Extraction and injection must not overlap
    /// within an hour.
    pub fn new(
        extraction: Vec<f64>,
        injection: Vec<f64>,
        simulation_period: usize,
    ) -> Result<Self, LoadConfigurationError> {
        if simulation_period == 0 {
            return Err(LoadConfigurationError::ZeroSimulationPeriod);
        }
        let extraction = tile_over_period(
            extraction,
            HOURS_PER_YEAR as usize,
            simulation_period,
            "hourly extraction",
        )?;
        let injection = tile_over_period(
            injection,
            HOURS_PER_YEAR as usize,
            simulation_period,
            "hourly injection",
        )?;
        for (hour, (ext, inj)) in extraction.iter().zip(&injection).enumerate() {
            if *ext > 0. && *inj > 0. {
                return Err(LoadConfigurationError::OverlappingLoads { hour });
            }
        }
        Ok(Self {
            extraction,
            injection,
            simulation_period,
            peak_duration_extraction: DEFAULT_PEAK_DURATION_HOURS,
            peak_duration_injection: DEFAULT_PEAK_DURATION_HOURS,
        })
    }

    pub(crate) fn from_parts_unchecked(
        extraction: Vec<f64>,
        injection: Vec<f64>,
        simulation_period: usize,
        peak_duration_extraction: f64,
        peak_duration_injection: f64,
    ) -> Self {
        Self {
            extraction,
            injection,
            simulation_period,
            peak_duration_extraction,
            peak_duration_injection,
        }
    }

    pub fn simulation_period(&self) -> usize {
        self.simulation_period
    }

    pub fn hours(&self) -> usize {
        self.extraction.len()
    }

    pub fn extraction_power(&self) -> &[f64] {
        &self.extraction
    }

    pub fn injection_power(&self) -> &[f64] {
        &self.injection
    }

    /// Signed net power per hour, injection positive, in kW.
    pub fn net_injection_power(&self) -> Vec<f64> {
        self.injection
            .iter()
            .zip(&self.extraction)
            .map(|(injection, extraction)| injection - extraction)
            .collect()
    }

    /// Whether any hour extracts (resp. injects) at all. Sizing can skip the
    /// opposite temperature bound for one-sided profiles.
    pub fn has_extraction(&self) -> bool {
        self.extraction.iter().any(|power| *power > 0.)
    }

    pub fn has_injection(&self) -> bool {
        self.injection.iter().any(|power| *power > 0.)
    }

    pub fn peak_duration_hours(&self, direction: LoadDirection) -> f64 {
        match direction {
            LoadDirection::Extraction => self.peak_duration_extraction,
            LoadDirection::Injection => self.peak_duration_injection,
        }
    }

    /// Signed month-average power, injection positive, in kW. Months are the
    /// fixed 730-hour blocks of the simulation grid.
    pub fn monthly_average_power(&self) -> Vec<f64> {
        self.month_chunks(|extraction, injection| {
            (injection.iter().sum::<f64>() - extraction.iter().sum::<f64>())
                / HOURS_PER_MONTH as f64
        })
    }

    pub fn monthly_peak_extraction(&self) -> Vec<f64> {
        self.month_chunks(|extraction, _| {
            extraction.iter().copied().fold(0., f64::max)
        })
    }

    pub fn monthly_peak_injection(&self) -> Vec<f64> {
        self.month_chunks(|_, injection| {
            injection.iter().copied().fold(0., f64::max)
        })
    }

    /// kWh per 730-hour month.
    pub fn monthly_baseload_extraction_energy(&self) -> Vec<f64> {
        self.month_chunks(|extraction, _| extraction.iter().sum())
    }

    pub fn monthly_baseload_injection_energy(&self) -> Vec<f64> {
        self.month_chunks(|_, injection| injection.iter().sum())
    }

    fn month_chunks(&self, aggregate: impl Fn(&[f64], &[f64]) -> f64) -> Vec<f64> {
        let chunk = HOURS_PER_MONTH as usize;
        self.extraction
            .chunks(chunk)
            .zip(self.injection.chunks(chunk))
            .map(|(extraction, injection)| aggregate(extraction, injection))
            .collect()
    }
}
