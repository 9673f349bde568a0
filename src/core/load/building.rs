use crate::core::efficiency::{Cop, Eer};
use crate::core::load::{
    tile_over_period, HourlyGroundLoad, LoadConfigurationError, MonthlyGroundLoad,
};
use crate::core::units::{
    monthly_energy_to_average_power, DEFAULT_PEAK_DURATION_HOURS, HOURS_PER_YEAR, MONTHS_PER_YEAR,
};
use serde::{Deserialize, Serialize};

/// Building-side loads: demand as seen by the heat pump and chiller, plus the
/// efficiency curves that turn it into ground-side load. Conversion is pure in
/// the inlet temperature; the temperature engine owns the fixed-point
/// iteration that closes the loop.

/// Optional domestic hot water channel with its own COP. The demand array has
/// the same resolution as the owning load (kWh per month or kW per hour) and
/// is converted inside the coupling iteration, with the same inlet
/// temperature sample as space heating.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DomesticHotWater {
    demand: Vec<f64>,
    cop: Cop,
}

impl DomesticHotWater {
    pub fn demand(&self) -> &[f64] {
        &self.demand
    }

    pub fn cop(&self) -> &Cop {
        &self.cop
    }
}

/// Monthly building-side load: space heating and cooling baseload energy in
/// kWh plus peak demand powers in kW.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MonthlyBuildingLoad {
    baseload_heating: Vec<f64>,
    baseload_cooling: Vec<f64>,
    peak_heating: Vec<f64>,
    peak_cooling: Vec<f64>,
    cop: Cop,
    eer: Eer,
    dhw: Option<DomesticHotWater>,
    simulation_period: usize,
    peak_duration_extraction: f64,
    peak_duration_injection: f64,
}

impl MonthlyBuildingLoad {
    pub fn new(
        baseload_heating: Vec<f64>,
        baseload_cooling: Vec<f64>,
        peak_heating: Vec<f64>,
        peak_cooling: Vec<f64>,
        simulation_period: usize,
        cop: Cop,
        eer: Eer,
    ) -> Result<Self, LoadConfigurationError> {
        if simulation_period == 0 {
            return Err(LoadConfigurationError::ZeroSimulationPeriod);
        }
        let load = Self {
            baseload_heating: tile_over_period(
                baseload_heating,
                MONTHS_PER_YEAR,
                simulation_period,
                "baseload heating",
            )?,
            baseload_cooling: tile_over_period(
                baseload_cooling,
                MONTHS_PER_YEAR,
                simulation_period,
                "baseload cooling",
            )?,
            peak_heating: tile_over_period(
                peak_heating,
                MONTHS_PER_YEAR,
                simulation_period,
                "peak heating",
            )?,
            peak_cooling: tile_over_period(
                peak_cooling,
                MONTHS_PER_YEAR,
                simulation_period,
                "peak cooling",
            )?,
            cop,
            eer,
            dhw: None,
            simulation_period,
            peak_duration_extraction: DEFAULT_PEAK_DURATION_HOURS,
            peak_duration_injection: DEFAULT_PEAK_DURATION_HOURS,
        };
        load.check_peaks_cover_baseload()?;
        Ok(load)
    }

    /// Attach a DHW channel with demand in kWh per month.
    pub fn with_dhw(mut self, demand: Vec<f64>, cop: Cop) -> Result<Self, LoadConfigurationError> {
        let demand = tile_over_period(demand, MONTHS_PER_YEAR, self.simulation_period, "DHW")?;
        self.dhw = Some(DomesticHotWater { demand, cop });
        Ok(self)
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

    pub fn simulation_period(&self) -> usize {
        self.simulation_period
    }

    pub fn dhw(&self) -> Option<&DomesticHotWater> {
        self.dhw.as_ref()
    }

    /// Ground-side conversion at the given per-month inlet temperatures.
    ///
    /// Heating extracts (1 - 1/COP) of the demand from the ground; cooling
    /// injects (1 + 1/EER) of it. DHW converts with its own COP and adds to
    /// the extraction baseload and peak.
    pub fn to_ground_load(
        &self,
        inlet: &[f64],
    ) -> Result<MonthlyGroundLoad, LoadConfigurationError> {
        let months = self.simulation_period * MONTHS_PER_YEAR;
        if inlet.len() != months {
            return Err(LoadConfigurationError::WrongTemperatureLength {
                expected: months,
                actual: inlet.len(),
            });
        }

        let mut baseload_extraction = Vec::with_capacity(months);
        let mut baseload_injection = Vec::with_capacity(months);
        let mut peak_extraction = Vec::with_capacity(months);
        let mut peak_injection = Vec::with_capacity(months);

        for month in 0..months {
            let t_inlet = inlet[month];
            let heating_factor = self.cop.extraction_factor(t_inlet);
            let cooling_factor = self.eer.injection_factor(t_inlet);

            let mut extraction = self.baseload_heating[month] * heating_factor;
            let mut extraction_peak = self.peak_heating[month] * heating_factor;
            if let Some(dhw) = &self.dhw {
                let dhw_factor = dhw.cop.extraction_factor(t_inlet);
                extraction += dhw.demand[month] * dhw_factor;
                // DHW draw is treated as continuous through the month, so its
                // average power rides on top of the space heating peak
                extraction_peak +=
                    monthly_energy_to_average_power(dhw.demand[month]) * dhw_factor;
            }

            baseload_extraction.push(extraction);
            peak_extraction.push(extraction_peak);
            baseload_injection.push(self.baseload_cooling[month] * cooling_factor);
            peak_injection.push(self.peak_cooling[month] * cooling_factor);
        }

        Ok(MonthlyGroundLoad::new_lifting_peaks(
            baseload_extraction,
            baseload_injection,
            peak_extraction,
            peak_injection,
            self.simulation_period,
            self.peak_duration_extraction,
            self.peak_duration_injection,
        ))
    }

    fn check_peaks_cover_baseload(&self) -> Result<(), LoadConfigurationError> {
        use crate::core::load::LoadDirection;
        for (month, (peak, baseload)) in self
            .peak_heating
            .iter()
            .zip(&self.baseload_heating)
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
            .peak_cooling
            .iter()
            .zip(&self.baseload_cooling)
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

/// Hourly building-side load: space heating and cooling demand in kW per
/// hour. The hourly profile is its own peak.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HourlyBuildingLoad {
    heating: Vec<f64>,
    cooling: Vec<f64>,
    cop: Cop,
    eer: Eer,
    dhw: Option<DomesticHotWater>,
    simulation_period: usize,
}

impl HourlyBuildingLoad {
    pub fn new(
        heating: Vec<f64>,
        cooling: Vec<f64>,
        simulation_period: usize,
        cop: Cop,
        eer: Eer,
    ) -> Result<Self, LoadConfigurationError> {
        if simulation_period == 0 {
            return Err(LoadConfigurationError::ZeroSimulationPeriod);
        }
        let heating = tile_over_period(
            heating,
            HOURS_PER_YEAR as usize,
            simulation_period,
            "hourly heating",
        )?;
        let cooling = tile_over_period(
            cooling,
            HOURS_PER_YEAR as usize,
            simulation_period,
            "hourly cooling",
        )?;
        for (hour, (heat, cool)) in heating.iter().zip(&cooling).enumerate() {
            if *heat > 0. && *cool > 0. {
                return Err(LoadConfigurationError::OverlappingLoads { hour });
            }
        }
        Ok(Self {
            heating,
            cooling,
            cop,
            eer,
            dhw: None,
            simulation_period,
        })
    }

    /// Attach a DHW channel with demand in kW per hour. DHW must not overlap
    /// cooling in any hour.
    pub fn with_dhw(mut self, demand: Vec<f64>, cop: Cop) -> Result<Self, LoadConfigurationError> {
        let demand = tile_over_period(
            demand,
            HOURS_PER_YEAR as usize,
            self.simulation_period,
            "hourly DHW",
        )?;
        for (hour, (dhw, cool)) in demand.iter().zip(&self.cooling).enumerate() {
            if *dhw > 0. && *cool > 0. {
                return Err(LoadConfigurationError::OverlappingLoads { hour });
            }
        }
        self.dhw = Some(DomesticHotWater { demand, cop });
        Ok(self)
    }

    pub fn simulation_period(&self) -> usize {
        self.simulation_period
    }

    pub fn hours(&self) -> usize {
        self.heating.len()
    }

    pub fn heating_demand(&self) -> &[f64] {
        &self.heating
    }

    pub fn cooling_demand(&self) -> &[f64] {
        &self.cooling
    }

    pub fn dhw(&self) -> Option<&DomesticHotWater> {
        self.dhw.as_ref()
    }

    pub fn cop(&self) -> &Cop {
        &self.cop
    }

    pub fn eer(&self) -> &Eer {
        &self.eer
    }

    /// Elementwise clamp of the demand profile, used by the load optimizer to
    /// carve out the share a fixed-size borefield can carry.
    pub fn clamped(&self, heating_cap: f64, cooling_cap: f64) -> Self {
        Self {
            heating: self
                .heating
                .iter()
                .map(|demand| demand.min(heating_cap))
                .collect(),
            cooling: self
                .cooling
                .iter()
                .map(|demand| demand.min(cooling_cap))
                .collect(),
            cop: self.cop.clone(),
            eer: self.eer.clone(),
            dhw: self.dhw.clone(),
            simulation_period: self.simulation_period,
        }
    }

    /// Uniform scaling of the demand profile, used by the energy-split
    /// optimizer strategy.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            heating: self.heating.iter().map(|demand| demand * factor).collect(),
            cooling: self.cooling.iter().map(|demand| demand * factor).collect(),
            cop: self.cop.clone(),
            eer: self.eer.clone(),
            dhw: self.dhw.clone(),
            simulation_period: self.simulation_period,
        }
    }

    /// Demand remaining after subtracting another (clamped or scaled) share
    /// of this profile. The DHW channel stays with the borefield share.
    pub fn remainder(&self, served: &Self) -> Self {
        Self {
            heating: self
                .heating
                .iter()
                .zip(&served.heating)
                .map(|(total, taken)| (total - taken).max(0.))
                .collect(),
            cooling: self
                .cooling
                .iter()
                .zip(&served.cooling)
                .map(|(total, taken)| (total - taken).max(0.))
                .collect(),
            cop: self.cop.clone(),
            eer: self.eer.clone(),
            dhw: None,
            simulation_period: self.simulation_period,
        }
    }

    pub fn peak_heating(&self) -> f64 {
        self.heating.iter().copied().fold(0., f64::max)
    }

    pub fn peak_cooling(&self) -> f64 {
        self.cooling.iter().copied().fold(0., f64::max)
    }

    /// Ground-side conversion at the given per-hour inlet temperatures.
    pub fn to_ground_load(
        &self,
        inlet: &[f64],
    ) -> Result<HourlyGroundLoad, LoadConfigurationError> {
        let hours = self.hours();
        if inlet.len() != hours {
            return Err(LoadConfigurationError::WrongTemperatureLength {
                expected: hours,
                actual: inlet.len(),
            });
        }

        let mut extraction = Vec::with_capacity(hours);
        let mut injection = Vec::with_capacity(hours);
        for hour in 0..hours {
            let t_inlet = inlet[hour];
            let mut ext = self.heating[hour] * self.cop.extraction_factor(t_inlet);
            if let Some(dhw) = &self.dhw {
                ext += dhw.demand[hour] * dhw.cop.extraction_factor(t_inlet);
            }
            extraction.push(ext);
            injection.push(self.cooling[hour] * self.eer.injection_factor(t_inlet));
        }

        Ok(HourlyGroundLoad::from_parts_unchecked(
            extraction,
            injection,
            self.simulation_period,
            DEFAULT_PEAK_DURATION_HOURS,
            DEFAULT_PEAK_DURATION_HOURS,
        ))
    }
}
