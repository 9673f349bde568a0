use crate::core::gfunction::GFunctionProvider;
use crate::core::ground::GroundModel;
use crate::core::load::{GroundLoad, LoadDirection, LoadProfile};
use crate::core::resistance::{FluidData, ResistanceProvider};
use crate::core::units::{hourly_time_grid, monthly_time_grid, SECONDS_PER_HOUR};
use crate::errors::BorefieldError;
use crate::setup::CalculationSetup;
use std::f64::consts::PI;
use tracing::debug;

/// Computes borehole-wall and fluid temperatures by discrete convolution of
/// the load history with the step response derived from the g-function.
///
/// Summation order inside the convolution is fixed left-to-right so that a
/// profile is reproducible bit-for-bit for identical inputs.

/// Entry temperature assumed before the first pass of the coupling loop.
pub const INITIAL_FLUID_TEMPERATURE: f64 = 10.;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InletOutlet {
    pub inlet: Vec<f64>,
    pub outlet: Vec<f64>,
}

/// Monthly temperature evolution. All arrays have length 12.Y, chronological.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MonthlyResults {
    pub t_borehole_wall: Vec<f64>,
    pub t_fluid_baseload: Vec<f64>,
    pub t_fluid_peak_injection: Vec<f64>,
    pub t_fluid_peak_extraction: Vec<f64>,
    /// Inlet/outlet counterparts, present when Rb* is not constant or the
    /// sizing basis asks for them.
    pub peak_injection_split: Option<InletOutlet>,
    pub peak_extraction_split: Option<InletOutlet>,
    pub baseload_split: Option<InletOutlet>,
}

impl MonthlyResults {
    /// Hottest peak-injection month within `range`, as (index, temperature).
    pub fn max_peak_injection(&self, range: std::ops::Range<usize>) -> (usize, f64) {
        argmax(&self.t_fluid_peak_injection[range.clone()])
            .map(|(offset, temp)| (range.start + offset, temp))
            .unwrap_or((range.start, f64::NEG_INFINITY))
    }

    /// Coldest peak-extraction month within `range`.
    pub fn min_peak_extraction(&self, range: std::ops::Range<usize>) -> (usize, f64) {
        argmin(&self.t_fluid_peak_extraction[range.clone()])
            .map(|(offset, temp)| (range.start + offset, temp))
            .unwrap_or((range.start, f64::INFINITY))
    }
}

/// Hourly temperature evolution. At this resolution the profile itself is the
/// peak, so a single fluid temperature series is produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HourlyResults {
    pub t_borehole_wall: Vec<f64>,
    pub t_fluid: Vec<f64>,
    pub split: Option<InletOutlet>,
}

impl HourlyResults {
    pub fn max_fluid(&self, range: std::ops::Range<usize>) -> (usize, f64) {
        argmax(&self.t_fluid[range.clone()])
            .map(|(offset, temp)| (range.start + offset, temp))
            .unwrap_or((range.start, f64::NEG_INFINITY))
    }

    pub fn min_fluid(&self, range: std::ops::Range<usize>) -> (usize, f64) {
        argmin(&self.t_fluid[range.clone()])
            .map(|(offset, temp)| (range.start + offset, temp))
            .unwrap_or((range.start, f64::INFINITY))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Results {
    Monthly(MonthlyResults),
    Hourly(HourlyResults),
}

/// A temperature calculation together with the ground load it settled on
/// (identical to the configured load unless the load is building-side).
#[derive(Clone, Debug)]
pub struct EngineOutput {
    pub results: Results,
    pub ground_load: GroundLoad,
}

pub struct TemperatureEngine<'a> {
    pub ground: &'a GroundModel,
    pub gfunction: &'a dyn GFunctionProvider,
    pub resistance: &'a dyn ResistanceProvider,
    pub fluid: &'a FluidData,
    pub n_boreholes: usize,
    pub r_b: f64,
    pub buried_depth: f64,
}

impl<'a> TemperatureEngine<'a> {
    /// Whether the inlet/outlet split must be carried through the results.
    pub fn needs_split(&self) -> bool {
        !self.resistance.is_constant()
    }

    /// Resolve the load and compute temperatures at the requested resolution,
    /// running the fixed-point coupling loop when the load (or the fluid)
    /// depends on the computed temperatures.
    pub fn solve(
        &self,
        profile: &LoadProfile,
        h: f64,
        setup: &CalculationSetup,
        hourly: bool,
        with_split: bool,
    ) -> Result<EngineOutput, BorefieldError> {
        if hourly && !profile.has_hourly_resolution() {
            return Err(BorefieldError::HourlyDataRequired);
        }
        let coupled = profile.is_temperature_dependent() || self.fluid.is_temperature_dependent();

        let mut ground_load = profile.ground_load_at_uniform_temperature(INITIAL_FLUID_TEMPERATURE)?;
        let mut t_estimate = INITIAL_FLUID_TEMPERATURE;
        let mut results = self.profile_at(&ground_load, h, t_estimate, hourly, with_split)?;

        if coupled {
            for iteration in 0..setup.max_iterations {
                let inlet = self.inlet_samples(&results);
                ground_load = profile.ground_load_with_temperatures(&inlet)?;
                // with use_constant_rb the resistance keeps seeing the
                // initial temperature sample instead of the running mean
                if !setup.use_constant_rb {
                    t_estimate = mean_fluid_temperature(&results);
                }
                let next = self.profile_at(&ground_load, h, t_estimate, hourly, with_split)?;
                let change = peak_change(&results, &next);
                debug!(iteration, change, "load/temperature coupling step");
                let done = change <= setup.atol;
                results = next;
                if done {
                    break;
                }
            }
        }

        Ok(EngineOutput {
            results,
            ground_load,
        })
    }

    /// One temperature profile pass at the load's native resolution.
    pub fn profile_at(
        &self,
        load: &GroundLoad,
        h: f64,
        t_fluid_estimate: f64,
        hourly: bool,
        with_split: bool,
    ) -> Result<Results, BorefieldError> {
        Ok(if hourly {
            Results::Hourly(self.hourly_profile(load, h, t_fluid_estimate, with_split)?)
        } else {
            Results::Monthly(self.monthly_profile(load, h, t_fluid_estimate, with_split)?)
        })
    }

    /// Monthly formulation: wall temperature by convolution of the monthly
    /// average powers, fluid temperatures for peak events superposed on top.
    pub fn monthly_profile(
        &self,
        load: &GroundLoad,
        h: f64,
        t_fluid_estimate: f64,
        with_split: bool,
    ) -> Result<MonthlyResults, BorefieldError> {
        let months = load.months();
        let conductivity = self.ground.conductivity(h)?;
        let t_ground = self.ground.temperature_at(h)?;
        let rb = self.resistance.effective_resistance(
            h,
            self.buried_depth,
            self.r_b,
            conductivity,
            t_fluid_estimate,
        )?;

        let g = self
            .gfunction
            .evaluate(&monthly_time_grid(months), h)?;
        let q = load.monthly_average_power();
        let per_metre = 1000. / (self.n_boreholes as f64 * h);
        let per_metre_ground = per_metre / (2. * PI * conductivity);

        let t_borehole_wall: Vec<f64> = convolve_steps(&q, &g)
            .into_iter()
            .map(|response| t_ground + response * per_metre_ground)
            .collect();

        let g_peak_injection = self.peak_g_value(load, LoadDirection::Injection, h)?;
        let g_peak_extraction = self.peak_g_value(load, LoadDirection::Extraction, h)?;
        let r_peak_injection = g_peak_injection / (2. * PI * conductivity);
        let r_peak_extraction = g_peak_extraction / (2. * PI * conductivity);

        let peak_injection = load.monthly_peak_injection();
        let peak_extraction = load.monthly_peak_extraction();

        let mut results = MonthlyResults {
            t_fluid_baseload: Vec::with_capacity(months),
            t_fluid_peak_injection: Vec::with_capacity(months),
            t_fluid_peak_extraction: Vec::with_capacity(months),
            ..Default::default()
        };

        for k in 0..months {
            let wall = t_borehole_wall[k];
            // the peak replaces whatever baseload already flows in its
            // direction during the peak hours
            let injection_rise = peak_injection[k] * (r_peak_injection + rb)
                - q[k].max(0.) * r_peak_injection;
            let extraction_drop = -peak_extraction[k] * (r_peak_extraction + rb)
                - q[k].min(0.) * r_peak_extraction;
            results
                .t_fluid_peak_injection
                .push(wall + injection_rise * per_metre);
            results
                .t_fluid_peak_extraction
                .push(wall + extraction_drop * per_metre);
            results.t_fluid_baseload.push(wall + q[k] * rb * per_metre);
        }
        results.t_borehole_wall = t_borehole_wall;

        if with_split || self.needs_split() {
            results.peak_injection_split = Some(self.split(
                &results.t_fluid_peak_injection,
                &peak_injection,
            ));
            let negated: Vec<f64> = peak_extraction.iter().map(|p| -p).collect();
            results.peak_extraction_split =
                Some(self.split(&results.t_fluid_peak_extraction, &negated));
            results.baseload_split = Some(self.split(&results.t_fluid_baseload, &q));
        }

        Ok(results)
    }

    /// Hourly formulation: the hourly profile is its own peak, so the fluid
    /// temperature follows directly from the wall temperature and Rb*.
    pub fn hourly_profile(
        &self,
        load: &GroundLoad,
        h: f64,
        t_fluid_estimate: f64,
        with_split: bool,
    ) -> Result<HourlyResults, BorefieldError> {
        let q = load.hourly_net_injection_power()?;
        let conductivity = self.ground.conductivity(h)?;
        let t_ground = self.ground.temperature_at(h)?;
        let rb = self.resistance.effective_resistance(
            h,
            self.buried_depth,
            self.r_b,
            conductivity,
            t_fluid_estimate,
        )?;

        let g = self.gfunction.evaluate(&hourly_time_grid(q.len()), h)?;
        let per_metre = 1000. / (self.n_boreholes as f64 * h);
        let per_metre_ground = per_metre / (2. * PI * conductivity);

        let t_borehole_wall: Vec<f64> = convolve_steps(&q, &g)
            .into_iter()
            .map(|response| t_ground + response * per_metre_ground)
            .collect();
        let t_fluid: Vec<f64> = t_borehole_wall
            .iter()
            .zip(&q)
            .map(|(wall, power)| wall + power * rb * per_metre)
            .collect();

        let split = (with_split || self.needs_split()).then(|| self.split(&t_fluid, &q));

        Ok(HourlyResults {
            t_borehole_wall,
            t_fluid,
            split,
        })
    }

    /// Inlet/outlet decomposition of mean fluid temperatures. Injection
    /// (positive power) makes the inlet the warm side.
    fn split(&self, t_fluid: &[f64], power: &[f64]) -> InletOutlet {
        let mut inlet = Vec::with_capacity(t_fluid.len());
        let mut outlet = Vec::with_capacity(t_fluid.len());
        for (temp, p) in t_fluid.iter().zip(power) {
            let delta = self.fluid.delta_t(*p, *temp, self.n_boreholes);
            inlet.push(temp + delta / 2.);
            outlet.push(temp - delta / 2.);
        }
        InletOutlet { inlet, outlet }
    }

    fn peak_g_value(
        &self,
        load: &GroundLoad,
        direction: LoadDirection,
        h: f64,
    ) -> Result<f64, BorefieldError> {
        let duration = load.peak_duration_hours(direction) * SECONDS_PER_HOUR as f64;
        Ok(self.gfunction.evaluate(&[duration], h)?[0])
    }

    /// Per-interval inlet temperature samples used to re-resolve a
    /// building-side load: the baseload inlet when a split is available, the
    /// mean fluid temperature otherwise.
    fn inlet_samples(&self, results: &Results) -> Vec<f64> {
        match results {
            Results::Monthly(monthly) => match &monthly.baseload_split {
                Some(split) => split.inlet.clone(),
                None => monthly.t_fluid_baseload.clone(),
            },
            Results::Hourly(hourly) => match &hourly.split {
                Some(split) => split.inlet.clone(),
                None => hourly.t_fluid.clone(),
            },
        }
    }
}

/// Linear convolution of the power history with the step-response increments
/// of `g`, truncated to the history length. Index order is fixed.
fn convolve_steps(power: &[f64], g: &[f64]) -> Vec<f64> {
    let steps = delta(g);
    let mut out = Vec::with_capacity(power.len());
    for k in 0..power.len() {
        let mut acc = 0.;
        for j in 0..=k {
            acc += power[j] * steps[k - j];
        }
        out.push(acc);
    }
    out
}

fn delta(g: &[f64]) -> Vec<f64> {
    let mut steps = Vec::with_capacity(g.len());
    for (k, value) in g.iter().enumerate() {
        steps.push(if k == 0 { *value } else { value - g[k - 1] });
    }
    steps
}

fn mean_fluid_temperature(results: &Results) -> f64 {
    let series = match results {
        Results::Monthly(monthly) => &monthly.t_fluid_baseload,
        Results::Hourly(hourly) => &hourly.t_fluid,
    };
    if series.is_empty() {
        INITIAL_FLUID_TEMPERATURE
    } else {
        series.iter().sum::<f64>() / series.len() as f64
    }
}

/// Largest change in the peak temperature series between two passes of the
/// coupling loop.
fn peak_change(previous: &Results, next: &Results) -> f64 {
    match (previous, next) {
        (Results::Monthly(a), Results::Monthly(b)) => max_abs_difference(
            &a.t_fluid_peak_injection,
            &b.t_fluid_peak_injection,
        )
        .max(max_abs_difference(
            &a.t_fluid_peak_extraction,
            &b.t_fluid_peak_extraction,
        )),
        (Results::Hourly(a), Results::Hourly(b)) => max_abs_difference(&a.t_fluid, &b.t_fluid),
        _ => f64::INFINITY,
    }
}

fn max_abs_difference(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0., f64::max)
}

fn argmax(series: &[f64]) -> Option<(usize, f64)> {
    series
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, value)| (index, *value))
}

fn argmin(series: &[f64]) -> Option<(usize, f64)> {
    series
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, value)| (index, *value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfunction::GFunctionError;
    use crate::core::load::MonthlyGroundLoad;
    use crate::core::resistance::ConstantResistance;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rstest::*;

    /// Logarithmic stand-in with the required monotonicity; not a physical
    /// g-function but exact enough to exercise the convolution.
    struct LogProvider;

    impl GFunctionProvider for LogProvider {
        fn evaluate(&self, time_points: &[f64], _h: f64) -> Result<Vec<f64>, GFunctionError> {
            Ok(time_points.iter().map(|t| (1. + t / 3600.).ln()).collect())
        }
    }

    #[fixture]
    fn ground() -> GroundModel {
        GroundModel::constant(3., 2.4e6, 10.).unwrap()
    }

    #[fixture]
    fn fluid() -> FluidData {
        FluidData::constant(0.25, 4182.)
    }

    fn engine<'a>(
        ground: &'a GroundModel,
        gfunction: &'a dyn GFunctionProvider,
        resistance: &'a dyn ResistanceProvider,
        fluid: &'a FluidData,
    ) -> TemperatureEngine<'a> {
        TemperatureEngine {
            ground,
            gfunction,
            resistance,
            fluid,
            n_boreholes: 10,
            r_b: 0.075,
            buried_depth: 4.,
        }
    }

    #[rstest]
    fn sustained_load_reproduces_g_function(ground: GroundModel, fluid: FluidData) {
        // constant 1 kW net injection: the step increments telescope and the
        // wall response must equal g(t).1000/(2.pi.k.n.H) exactly
        let load = GroundLoad::Monthly(
            MonthlyGroundLoad::new(vec![0.; 12], vec![730.; 12], vec![0.; 12], vec![1.; 12], 1)
                .unwrap(),
        );
        let provider = LogProvider;
        let resistance = ConstantResistance::new(0.2).unwrap();
        let engine = engine(&ground, &provider, &resistance, &fluid);

        let h = 100.;
        let results = engine.monthly_profile(&load, h, 10., false).unwrap();
        let g = provider
            .evaluate(&crate::core::units::monthly_time_grid(12), h)
            .unwrap();
        let scale = 1000. / (2. * PI * 3. * 10. * h);
        for k in 0..12 {
            assert_abs_diff_eq!(
                results.t_borehole_wall[k] - 10.,
                g[k] * scale,
                epsilon = 1e-12
            );
        }
    }

    #[rstest]
    fn baseload_fluid_temperature_offsets_by_rb(ground: GroundModel, fluid: FluidData) {
        let load = GroundLoad::Monthly(
            MonthlyGroundLoad::new(vec![0.; 12], vec![7300.; 12], vec![0.; 12], vec![20.; 12], 1)
                .unwrap(),
        );
        let provider = LogProvider;
        let resistance = ConstantResistance::new(0.2).unwrap();
        let engine = engine(&ground, &provider, &resistance, &fluid);

        let results = engine.monthly_profile(&load, 100., 10., false).unwrap();
        // 10 kW net injection: fluid sits q.Rb.1000/(n.H) above the wall
        for k in 0..12 {
            assert_relative_eq!(
                results.t_fluid_baseload[k] - results.t_borehole_wall[k],
                10. * 0.2 * 1000. / (10. * 100.),
                max_relative = 1e-12
            );
        }
        // pure injection: peak injection temperature above baseload
        assert!(results.t_fluid_peak_injection[0] > results.t_fluid_baseload[0]);
        // no extraction configured: peak extraction fluid sits below the wall
        assert!(results.t_fluid_peak_extraction[0] <= results.t_borehole_wall[0]);
    }

    #[rstest]
    fn injection_split_puts_inlet_on_warm_side(ground: GroundModel, fluid: FluidData) {
        let load = GroundLoad::Monthly(
            MonthlyGroundLoad::new(vec![0.; 12], vec![7300.; 12], vec![0.; 12], vec![10.; 12], 1)
                .unwrap(),
        );
        let provider = LogProvider;
        let resistance = ConstantResistance::new(0.2).unwrap();
        let engine = engine(&ground, &provider, &resistance, &fluid);

        let results = engine.monthly_profile(&load, 100., 10., true).unwrap();
        let split = results.peak_injection_split.unwrap();
        assert!(split.inlet[0] > split.outlet[0]);
        let base = results.baseload_split.unwrap();
        assert_relative_eq!(
            base.inlet[0] - base.outlet[0],
            10. * 1000. / (4182. * 0.25 * 10.),
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn hourly_profile_requires_hourly_load(ground: GroundModel, fluid: FluidData) {
        let load = GroundLoad::Monthly(
            MonthlyGroundLoad::new(vec![0.; 12], vec![0.; 12], vec![0.; 12], vec![0.; 12], 1)
                .unwrap(),
        );
        let provider = LogProvider;
        let resistance = ConstantResistance::new(0.2).unwrap();
        let engine = engine(&ground, &provider, &resistance, &fluid);
        assert!(engine.hourly_profile(&load, 100., 10., false).is_err());
    }

    #[rstest]
    fn convolution_matches_direct_difference_form() {
        // constant power: sum of increments telescopes back to g itself
        let g = [1., 1.5, 1.8, 2.];
        let q = [2., 2., 2., 2.];
        let conv = convolve_steps(&q, &g);
        for (k, value) in conv.iter().enumerate() {
            assert_abs_diff_eq!(*value, 2. * g[k], epsilon = 1e-12);
        }
    }
}
