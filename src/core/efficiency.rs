use interp::{interp, InterpMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Heat pump and chiller efficiencies used to convert building-side demand
/// into ground-side load. A curve is either a seasonal constant (SCOP/SEER)
/// or piecewise-linear in the fluid inlet temperature.

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EfficiencyCurve {
    Constant(f64),
    PiecewiseLinear {
        /// Inlet temperature breakpoints in degC, strictly increasing.
        inlet_temperatures: Vec<f64>,
        values: Vec<f64>,
    },
}

impl EfficiencyCurve {
    fn value_at(&self, t_inlet: f64) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::PiecewiseLinear {
                inlet_temperatures,
                values,
            } => interp(inlet_temperatures, values, t_inlet, &InterpMode::FirstLast),
        }
    }

    fn validate(&self, minimum: f64, label: &'static str) -> Result<(), EfficiencyError> {
        match self {
            Self::Constant(value) => {
                if *value <= minimum {
                    return Err(EfficiencyError::ValueTooLow {
                        label,
                        value: *value,
                        minimum,
                    });
                }
            }
            Self::PiecewiseLinear {
                inlet_temperatures,
                values,
            } => {
                if inlet_temperatures.len() != values.len() || inlet_temperatures.len() < 2 {
                    return Err(EfficiencyError::MalformedCurve(label));
                }
                if !inlet_temperatures.windows(2).all(|pair| pair[0] < pair[1]) {
                    return Err(EfficiencyError::BreakpointsNotIncreasing(label));
                }
                for value in values {
                    if *value <= minimum {
                        return Err(EfficiencyError::ValueTooLow {
                            label,
                            value: *value,
                            minimum,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Coefficient of performance of a heat pump in heating mode.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Cop(EfficiencyCurve);

/// Energy efficiency ratio of a chiller or heat pump in cooling mode.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Eer(EfficiencyCurve);

impl Cop {
    /// A COP at or below 1 would make the ground-side extraction factor
    /// (1 - 1/COP) vanish or change sign, so it is rejected.
    pub fn new(curve: EfficiencyCurve) -> Result<Self, EfficiencyError> {
        curve.validate(1., "COP")?;
        Ok(Self(curve))
    }

    pub fn constant(value: f64) -> Result<Self, EfficiencyError> {
        Self::new(EfficiencyCurve::Constant(value))
    }

    pub fn at(&self, t_inlet: f64) -> f64 {
        self.0.value_at(t_inlet)
    }

    /// Ground-side fraction of a building heating demand: the compressor
    /// supplies 1/COP of the heat, the ground the rest.
    pub fn extraction_factor(&self, t_inlet: f64) -> f64 {
        1. - 1. / self.at(t_inlet)
    }
}

impl Eer {
    pub fn new(curve: EfficiencyCurve) -> Result<Self, EfficiencyError> {
        curve.validate(0., "EER")?;
        Ok(Self(curve))
    }

    pub fn constant(value: f64) -> Result<Self, EfficiencyError> {
        Self::new(EfficiencyCurve::Constant(value))
    }

    pub fn at(&self, t_inlet: f64) -> f64 {
        self.0.value_at(t_inlet)
    }

    /// Ground-side multiple of a building cooling demand: the compressor work
    /// is rejected into the ground on top of the demand itself.
    pub fn injection_factor(&self, t_inlet: f64) -> f64 {
        1. + 1. / self.at(t_inlet)
    }
}

#[derive(Clone, Copy, Debug, Error)]
pub enum EfficiencyError {
    #[error("{label} value {value} must be greater than {minimum}")]
    ValueTooLow {
        label: &'static str,
        value: f64,
        minimum: f64,
    },
    #[error("{0} curve needs matching breakpoint and value lists of length >= 2")]
    MalformedCurve(&'static str),
    #[error("{0} curve breakpoints must be strictly increasing")]
    BreakpointsNotIncreasing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    #[fixture]
    fn cop_curve() -> Cop {
        Cop::new(EfficiencyCurve::PiecewiseLinear {
            inlet_temperatures: vec![0., 10.],
            values: vec![4., 5.],
        })
        .unwrap()
    }

    #[rstest]
    fn should_interpolate_cop_between_breakpoints(cop_curve: Cop) {
        assert_relative_eq!(cop_curve.at(5.), 4.5);
        // flat extrapolation outside the breakpoints
        assert_relative_eq!(cop_curve.at(-10.), 4.);
        assert_relative_eq!(cop_curve.at(20.), 5.);
    }

    #[rstest]
    fn should_apply_ground_side_factors(cop_curve: Cop) {
        assert_relative_eq!(cop_curve.extraction_factor(0.), 0.75);
        let eer = Eer::constant(4.).unwrap();
        assert_relative_eq!(eer.injection_factor(30.), 1.25);
    }

    #[rstest]
    fn should_reject_degenerate_curves() {
        assert!(Cop::constant(1.).is_err());
        assert!(Eer::constant(0.).is_err());
        assert!(Cop::new(EfficiencyCurve::PiecewiseLinear {
            inlet_temperatures: vec![10., 0.],
            values: vec![4., 5.],
        })
        .is_err());
        assert!(Eer::new(EfficiencyCurve::PiecewiseLinear {
            inlet_temperatures: vec![0.],
            values: vec![4.],
        })
        .is_err());
    }
}
