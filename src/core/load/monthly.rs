use crate::core::load::{tile_over_period, LoadConfigurationError, LoadDirection};
use crate::core::units::{
    monthly_energy_to_average_power, DEFAULT_PEAK_DURATION_HOURS, MONTHS_PER_YEAR,
};
use serde::{Deserialize, Serialize};

/// Ground-side load at monthly resolution: baseload energy per month plus the
/// peak power sustained for the peak duration within each month. Arrays cover
/// the full simulation period; single-year inputs are tiled.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MonthlyGroundLoad {
    baseload_extraction: Vec<f64>,
    baseload_injection: Vec<f64>,
    peak_extraction: Vec<f64>,
    peak_injection: Vec<f64>,
    simulation_period: usize,
    peak_duration_extraction: f64,
    peak_duration_injection: f64,
}

impl MonthlyGroundLoad {
    /// Baseloads in kWh per month, peaks in kW, all unsigned magnitudes.
    /// Arrays must have length 12 or 12 times the simulation period.
    pub fn new(
        baseload_extraction: Vec<f64>,
        baseload_injection: Vec<f64>,
        peak_extraction: Vec<f64>,
        peak_injection: Vec<f64>,
        simulation_period: usize,
    ) -> Result<Self, LoadConfigurationError> {
        if simulation_period == 0 {
            return Err(LoadConfigurationError::ZeroSimulationPeriod);
        }
        let load = Self {
            baseload_extraction: tile_over_period(
                baseload_extraction,
                MONTHS_PER_YEAR,
                simulation_period,
                "baseload extraction",
            )?,
            baseload_injection: tile_over_period(
                baseload_injection,
                MONTHS_PER_YEAR,
                simulation_period,
                "baseload injection",
            )?,
            peak_extraction: tile_over_period(
                peak_extraction,
                MONTHS_PER_YEAR,
                simulation_period,
                "peak extraction",
            )?,
            peak_injection: tile_over_period(
                peak_injection,
                MONTHS_PER_YEAR,
                simulation_period,
                "peak injection",
            )?,
            simulation_period,
            peak_duration_extraction: DEFAULT_PEAK_DURATION_HOURS,
            peak_duration_injection: DEFAULT_PEAK_DURATION_HOURS,
        };
        load.check_peaks_cover_baseload()?;
        Ok(load)
    }

    pub fn with_peak_durations(
        mut self,
        extraction_hours: f64,
        injection_hours: f64,
    ) -> Result<Self, LoadConfigurationError> {
        if extraction_hours <= 0. {
            return Err(LoadConfigurationError::NonPositivePeakDuration(
                extraction_hours,
            ));
        }
        if injection_hours <= 0. {
            return Err(LoadConfigurationError::NonPositivePeakDuration(
                injection_hours,
            ));
        }
        self.peak_duration_extraction = extraction_hours;
        self.peak_duration_injection = injection_hours;
        Ok(self)
    }

    /// Internal constructor for loads derived from building-side conversion,
    /// where adding DHW to the baseload can push a month's average above its
    /// configured peak; such peaks are lifted to the average instead of
    /// rejected.
    pub(crate) fn new_lifting_peaks(
        baseload_extraction: Vec<f64>,
        baseload_injection: Vec<f64>,
        mut peak_extraction: Vec<f64>,
        mut peak_injection: Vec<f64>,
        simulation_period: usize,
        peak_duration_extraction: f64,
        peak_duration_injection: f64,
    ) -> Self {
        for (peak, baseload) in peak_extraction.iter_mut().zip(&baseload_extraction) {
            *peak = peak.max(monthly_energy_to_average_power(*baseload));
        }
        for (peak, baseload) in peak_injection.iter_mut().zip(&baseload_injection) {
            *peak = peak.max(monthly_energy_to_average_power(*baseload));
        }
        Self {
            baseload_extraction,
            baseload_injection,
            peak_extraction,
            peak_injection,
            simulation_period,
            peak_duration_extraction,
            peak_duration_injection,
        }
    }

    pub fn simulation_period(&self) -> usize {
        self.simulation_period
    }

    pub fn baseload_extraction_energy(&self) -> &[f64] {
        &self.baseload_extraction
    }

    pub fn baseload_injection_energy(&self) -> &[f64] {
        &self.baseload_injection
    }

    pub fn monthly_peak_extraction(&self) -> &[f64] {
        &self.peak_extraction
    }

    pub fn monthly_peak_injection(&self) -> &[f64] {
        &self.peak_injection
    }

    /// Signed month-average power, injection positive, in kW.
    pub fn monthly_average_power(&self) -> Vec<f64> {
        self.baseload_injection
            .iter()
            .zip(&self.baseload_extraction)
            .map(|(injection, extraction)| {
                monthly_energy_to_average_power(injection - extraction)
            })
            .collect()
    }

    pub fn peak_duration_hours(&self, direction: LoadDirection) -> f64 {
        match direction {
            LoadDirection::Extraction => self.peak_duration_extraction,
            LoadDirection::Injection => self.peak_duration_injection,
        }
    }

    fn check_peaks_cover_baseload(&self) -> Result<(), LoadConfigurationError> {
        for (month, (peak, baseload)) in self
            .peak_extraction
            .iter()
            .zip(&self.baseload_extraction)
            .enumerate()
        {
            let average = monthly_energy_to_average_power(*baseload);
            if average > *peak && !is_close!(average, *peak, rel_tol = 1e-9) {
                return Err(LoadConfigurationError::PeakBelowAverage {
                    direction: LoadDirection::Extraction,
                    month,
                    peak: *peak,
                    average,
                });
            }
        }
        for (month, (peak, baseload)) in self
            .peak_injection
            .iter()
            .zip(&self.baseload_injection)
            .enumerate()
        {
            let average = monthly_energy_to_average_power(*baseload);
            if average > *peak && !is_close!(average, *peak, rel_tol = 1e-9) {
                return Err(LoadConfigurationError::PeakBelowAverage {
                    direction: LoadDirection::Injection,
                    month,
                    peak: *peak,
                    average,
                });
            }
        }
        Ok(())
    }
}
