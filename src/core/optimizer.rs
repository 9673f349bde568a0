use crate::core::load::{HourlyBuildingLoad, LoadProfile};
use crate::core::temperature::{Results, TemperatureEngine};
use crate::core::units::TemperatureBounds;
use crate::errors::BorefieldError;
use crate::setup::CalculationSetup;
use anyhow::anyhow;
use roots::{find_root_brent, SimpleConvergency};
use tracing::debug;

/// Splits an hourly building demand between a borefield of fixed size and an
/// external system so that the fluid temperature stays inside the window.
///
/// The dual of sizing: there H grows until the load fits, here the load
/// shrinks until it fits the given H.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OptimizationStrategy {
    /// Clamp the hourly demand at per-direction power caps. Baseload energy
    /// is mostly preserved; only the peaks are shaved off.
    PowerSplit,
    /// Scale the whole demand profile by one coverage fraction.
    EnergySplit,
}

/// The demand split produced by [`LoadOptimizer::optimise`]. The two parts
/// sum back to the original demand hour by hour.
#[derive(Clone, Debug)]
pub struct OptimizedLoad {
    pub on_borefield: HourlyBuildingLoad,
    pub external: HourlyBuildingLoad,
    /// Power cap applied to heating demand, kW. Equal to the profile peak
    /// when the borefield carries all heating.
    pub heating_cap: f64,
    pub cooling_cap: f64,
    /// Fraction of the demand served by the borefield under the energy-split
    /// strategy; 1 under the power-split strategy when nothing is shaved.
    pub coverage: f64,
}

pub struct LoadOptimizer<'a> {
    pub engine: &'a TemperatureEngine<'a>,
    pub setup: &'a CalculationSetup,
    pub bounds: TemperatureBounds,
    /// Borehole length of the already-sized field.
    pub h: f64,
}

impl<'a> LoadOptimizer<'a> {
    pub fn optimise(
        &self,
        load: &HourlyBuildingLoad,
        strategy: OptimizationStrategy,
    ) -> Result<OptimizedLoad, BorefieldError> {
        match strategy {
            OptimizationStrategy::PowerSplit => self.optimise_power(load),
            OptimizationStrategy::EnergySplit => self.optimise_energy(load),
        }
    }

    /// Alternating per-direction bisection. Shaving heating lifts the coldest
    /// hour and shaving cooling lowers the hottest hour, so each cap is
    /// monotone against its own bound and the alternation settles quickly.
    fn optimise_power(&self, load: &HourlyBuildingLoad) -> Result<OptimizedLoad, BorefieldError> {
        let peak_heating = load.peak_heating();
        let peak_cooling = load.peak_cooling();
        let mut heating_cap = peak_heating;
        let mut cooling_cap = peak_cooling;

        for iteration in 0..self.setup.max_iterations {
            let new_heating = self.bisect_cap(load, peak_heating, cooling_cap, true)?;
            let new_cooling = self.bisect_cap(load, peak_cooling, new_heating, false)?;
            debug!(
                iteration,
                heating_cap = new_heating,
                cooling_cap = new_cooling,
                "power split step"
            );
            let settled = relative_change(heating_cap, new_heating) <= self.setup.rtol
                && relative_change(cooling_cap, new_cooling) <= self.setup.rtol;
            heating_cap = new_heating;
            cooling_cap = new_cooling;
            if settled && iteration > 0 {
                break;
            }
        }

        let on_borefield = load.clamped(heating_cap, cooling_cap);
        let external = load.remainder(&on_borefield);
        let coverage = if heating_cap >= peak_heating && cooling_cap >= peak_cooling {
            1.
        } else {
            served_fraction(load, &on_borefield)
        };
        Ok(OptimizedLoad {
            on_borefield,
            external,
            heating_cap,
            cooling_cap,
            coverage,
        })
    }

    /// Largest cap in one direction such that that direction's bound holds,
    /// with the opposite cap held fixed.
    fn bisect_cap(
        &self,
        load: &HourlyBuildingLoad,
        peak: f64,
        other_cap: f64,
        heating: bool,
    ) -> Result<f64, BorefieldError> {
        if peak == 0. {
            return Ok(0.);
        }
        let feasible = |cap: f64| -> Result<bool, BorefieldError> {
            let clamped = if heating {
                load.clamped(cap, other_cap)
            } else {
                load.clamped(other_cap, cap)
            };
            let (min_fluid, max_fluid) = self.fluid_extremes(&clamped)?;
            Ok(if heating {
                self.bounds.min_within(min_fluid)
            } else {
                self.bounds.max_within(max_fluid)
            })
        };

        if feasible(peak)? {
            return Ok(peak);
        }
        let mut low = 0.;
        let mut high = peak;
        while high - low > self.setup.rtol * peak {
            let mid = 0.5 * (low + high);
            if feasible(mid)? {
                low = mid;
            } else {
                high = mid;
            }
        }
        Ok(low)
    }

    /// One coverage fraction scaling the whole profile. The temperature
    /// margin is monotone-decreasing in the fraction, so the largest feasible
    /// fraction is the root of the margin.
    fn optimise_energy(&self, load: &HourlyBuildingLoad) -> Result<OptimizedLoad, BorefieldError> {
        let full_margin = self.margin(load, 1.)?;
        let coverage = if full_margin >= 0. {
            1.
        } else {
            let mut failure: Option<BorefieldError> = None;
            let mut convergency = SimpleConvergency {
                eps: self.setup.rtol,
                max_iter: self.setup.max_iterations,
            };
            let fraction = find_root_brent(
                1e-6,
                1.,
                |fraction| match self.margin(load, fraction) {
                    Ok(margin) => margin,
                    Err(error) => {
                        failure = Some(error);
                        f64::NAN
                    }
                },
                &mut convergency,
            );
            if let Some(error) = failure {
                return Err(error);
            }
            fraction.map_err(|error| {
                BorefieldError::Internal(anyhow!(
                    "energy split root search failed: {error}"
                ))
            })?
        };
        debug!(coverage, "energy split settled");

        let on_borefield = load.scaled(coverage);
        let external = load.remainder(&on_borefield);
        let heating_cap = on_borefield.peak_heating();
        let cooling_cap = on_borefield.peak_cooling();
        Ok(OptimizedLoad {
            on_borefield,
            external,
            heating_cap,
            cooling_cap,
            coverage,
        })
    }

    /// Worst-case headroom to either bound for the scaled profile. Positive
    /// means the scaled demand fits.
    fn margin(&self, load: &HourlyBuildingLoad, fraction: f64) -> Result<f64, BorefieldError> {
        let scaled = load.scaled(fraction);
        let (min_fluid, max_fluid) = self.fluid_extremes(&scaled)?;
        let above = min_fluid - (self.bounds.t_f_min - TemperatureBounds::EPSILON);
        let below = (self.bounds.t_f_max + TemperatureBounds::EPSILON) - max_fluid;
        Ok(above.min(below))
    }

    fn fluid_extremes(&self, load: &HourlyBuildingLoad) -> Result<(f64, f64), BorefieldError> {
        let profile = LoadProfile::HourlyBuilding(load.clone());
        let output = self
            .engine
            .solve(&profile, self.h, self.setup, true, false)?;
        match output.results {
            Results::Hourly(hourly) => {
                let hours = hourly.t_fluid.len();
                Ok((hourly.min_fluid(0..hours).1, hourly.max_fluid(0..hours).1))
            }
            Results::Monthly(_) => Err(BorefieldError::HourlyDataRequired),
        }
    }
}

fn relative_change(previous: f64, current: f64) -> f64 {
    if previous == 0. {
        if current == 0. {
            0.
        } else {
            f64::INFINITY
        }
    } else {
        (current - previous).abs() / previous.abs()
    }
}

/// Energy served by the borefield as a fraction of the total demand.
fn served_fraction(total: &HourlyBuildingLoad, served: &HourlyBuildingLoad) -> f64 {
    let total_energy: f64 = total
        .heating_demand()
        .iter()
        .chain(total.cooling_demand())
        .sum();
    if total_energy == 0. {
        return 1.;
    }
    let served_energy: f64 = served
        .heating_demand()
        .iter()
        .chain(served.cooling_demand())
        .sum();
    served_energy / total_energy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::efficiency::{Cop, Eer};
    use crate::core::gfunction::{GFunctionError, GFunctionProvider};
    use crate::core::ground::GroundModel;
    use crate::core::resistance::{ConstantResistance, FluidData};
    use crate::core::units::HOURS_PER_YEAR;
    use approx::assert_relative_eq;
    use rstest::*;

    struct LogProvider;

    impl GFunctionProvider for LogProvider {
        fn evaluate(&self, time_points: &[f64], _h: f64) -> Result<Vec<f64>, GFunctionError> {
            Ok(time_points.iter().map(|t| (1. + t / 3600.).ln()).collect())
        }
    }

    fn demand_profile() -> HourlyBuildingLoad {
        // cold winter mornings, hot summer afternoons, one year
        let hours = HOURS_PER_YEAR as usize;
        let mut heating = vec![0.; hours];
        let mut cooling = vec![0.; hours];
        heating[..2000].fill(30.);
        heating[..200].fill(90.);
        cooling[4000..5500].fill(25.);
        cooling[4400..4600].fill(80.);
        HourlyBuildingLoad::new(
            heating,
            cooling,
            1,
            Cop::constant(4.).unwrap(),
            Eer::constant(4.).unwrap(),
        )
        .unwrap()
    }

    struct Fixture {
        ground: GroundModel,
        provider: LogProvider,
        resistance: ConstantResistance,
        fluid: FluidData,
        setup: CalculationSetup,
        bounds: TemperatureBounds,
    }

    impl Fixture {
        fn engine(&self) -> TemperatureEngine<'_> {
            TemperatureEngine {
                ground: &self.ground,
                gfunction: &self.provider,
                resistance: &self.resistance,
                fluid: &self.fluid,
                n_boreholes: 12,
                r_b: 0.075,
                buried_depth: 4.,
            }
        }
    }

    #[fixture]
    fn fixture() -> Fixture {
        let mut setup = CalculationSetup::default();
        // split search needs far fewer outer rounds than sizing
        setup.max_iterations = 8;
        setup.rtol = 0.02;
        Fixture {
            ground: GroundModel::constant(3., 2.4e6, 10.).unwrap(),
            provider: LogProvider,
            resistance: ConstantResistance::new(0.12).unwrap(),
            fluid: FluidData::constant(0.3, 4182.),
            setup,
            bounds: TemperatureBounds::new(3., 17.).unwrap(),
        }
    }

    #[rstest]
    fn power_split_preserves_the_demand_and_respects_the_bounds(fixture: Fixture) {
        let engine = fixture.engine();
        let optimizer = LoadOptimizer {
            engine: &engine,
            setup: &fixture.setup,
            bounds: fixture.bounds,
            h: 110.,
        };
        let load = demand_profile();
        let split = optimizer
            .optimise(&load, OptimizationStrategy::PowerSplit)
            .unwrap();

        // hour-by-hour, the two shares sum back to the original demand
        for hour in [0, 150, 1000, 4500, 8000] {
            assert_relative_eq!(
                split.on_borefield.heating_demand()[hour] + split.external.heating_demand()[hour],
                load.heating_demand()[hour],
                max_relative = 1e-12
            );
            assert_relative_eq!(
                split.on_borefield.cooling_demand()[hour] + split.external.cooling_demand()[hour],
                load.cooling_demand()[hour],
                max_relative = 1e-12
            );
        }
        assert!(split.heating_cap > 0.);
        assert!(split.cooling_cap > 0.);
        assert!((0. ..=1.).contains(&split.coverage));

        let served = LoadProfile::HourlyBuilding(split.on_borefield.clone());
        let output = engine
            .solve(&served, 110., &fixture.setup, true, false)
            .unwrap();
        let Results::Hourly(hourly) = output.results else {
            panic!("hourly optimisation must produce hourly results")
        };
        let hours = hourly.t_fluid.len();
        assert!(fixture.bounds.max_within(hourly.max_fluid(0..hours).1));
        assert!(fixture.bounds.min_within(hourly.min_fluid(0..hours).1));
    }

    #[rstest]
    fn power_split_passes_a_fitting_load_through_untouched(fixture: Fixture) {
        let engine = fixture.engine();
        let optimizer = LoadOptimizer {
            engine: &engine,
            setup: &fixture.setup,
            bounds: fixture.bounds,
            h: 110.,
        };
        let load = demand_profile().scaled(0.05);
        let split = optimizer
            .optimise(&load, OptimizationStrategy::PowerSplit)
            .unwrap();
        assert_relative_eq!(split.coverage, 1.);
        assert!(split.external.peak_heating() == 0.);
        assert!(split.external.peak_cooling() == 0.);
    }

    #[rstest]
    fn energy_split_scales_uniformly(fixture: Fixture) {
        let engine = fixture.engine();
        let optimizer = LoadOptimizer {
            engine: &engine,
            setup: &fixture.setup,
            bounds: fixture.bounds,
            h: 110.,
        };
        let load = demand_profile();
        let split = optimizer
            .optimise(&load, OptimizationStrategy::EnergySplit)
            .unwrap();
        assert!(split.coverage > 0. && split.coverage <= 1.);
        // a uniform scaling keeps the profile shape
        assert_relative_eq!(
            split.on_borefield.heating_demand()[100],
            load.heating_demand()[100] * split.coverage,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            split.on_borefield.peak_cooling(),
            load.peak_cooling() * split.coverage,
            max_relative = 1e-9
        );
    }
}
