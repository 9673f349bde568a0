use interp::{interp, InterpMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Equivalent borehole thermal resistance Rb* and the circulating fluid data
/// needed to split a mean fluid temperature into inlet and outlet. The
/// correlations behind Rb* (pipe layout, grout, convection) belong to the
/// provider; the engine consumes the resistance as a number in (m.K)/W.

pub trait ResistanceProvider {
    /// Effective borehole resistance for boreholes of length `h`, buried
    /// depth `buried_depth`, radius `r_b`, in ground of the given
    /// conductivity, at an estimated mean fluid temperature.
    fn effective_resistance(
        &self,
        h: f64,
        buried_depth: f64,
        r_b: f64,
        conductivity: f64,
        t_fluid: f64,
    ) -> Result<f64, ResistanceError>;

    /// Whether the resistance is independent of length and temperature. A
    /// constant Rb* lets the engine skip the inlet/outlet refinement.
    fn is_constant(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug, Error)]
pub enum ResistanceError {
    #[error("borehole resistance evaluation failed: {0}")]
    Evaluation(String),
    #[error("borehole resistance must be positive, got {0} (m.K)/W")]
    NonPositive(f64),
}

impl<P: ResistanceProvider + ?Sized> ResistanceProvider for &P {
    fn effective_resistance(
        &self,
        h: f64,
        buried_depth: f64,
        r_b: f64,
        conductivity: f64,
        t_fluid: f64,
    ) -> Result<f64, ResistanceError> {
        (**self).effective_resistance(h, buried_depth, r_b, conductivity, t_fluid)
    }

    fn is_constant(&self) -> bool {
        (**self).is_constant()
    }
}

/// Fixed equivalent borehole resistance in (m.K)/W.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ConstantResistance(f64);

impl ConstantResistance {
    pub fn new(resistance: f64) -> Result<Self, ResistanceError> {
        if resistance <= 0. {
            return Err(ResistanceError::NonPositive(resistance));
        }
        Ok(Self(resistance))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl ResistanceProvider for ConstantResistance {
    fn effective_resistance(
        &self,
        _h: f64,
        _buried_depth: f64,
        _r_b: f64,
        _conductivity: f64,
        _t_fluid: f64,
    ) -> Result<f64, ResistanceError> {
        Ok(self.0)
    }

    fn is_constant(&self) -> bool {
        true
    }
}

/// A fluid property that is either constant or piecewise-linear in the mean
/// fluid temperature.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FluidProperty {
    Constant(f64),
    PiecewiseLinear {
        temperatures: Vec<f64>,
        values: Vec<f64>,
    },
}

impl FluidProperty {
    pub fn at(&self, t_fluid: f64) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::PiecewiseLinear {
                temperatures,
                values,
            } => interp(temperatures, values, t_fluid, &InterpMode::FirstLast),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }
}

/// Circulating fluid data per borehole.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FluidData {
    /// Mass flow rate through one borehole, kg/s.
    mass_flow_rate: FluidProperty,
    /// Specific heat capacity, J/(kg.K).
    specific_heat: FluidProperty,
}

impl FluidData {
    pub fn new(mass_flow_rate: FluidProperty, specific_heat: FluidProperty) -> Self {
        Self {
            mass_flow_rate,
            specific_heat,
        }
    }

    pub fn constant(mass_flow_rate: f64, specific_heat: f64) -> Self {
        Self {
            mass_flow_rate: FluidProperty::Constant(mass_flow_rate),
            specific_heat: FluidProperty::Constant(specific_heat),
        }
    }

    pub fn is_temperature_dependent(&self) -> bool {
        !(self.mass_flow_rate.is_constant() && self.specific_heat.is_constant())
    }

    /// Temperature difference between inlet and outlet for a total fluid
    /// power `power_kw` (signed, injection positive) spread over
    /// `n_boreholes` parallel boreholes, in Kelvin.
    pub fn delta_t(&self, power_kw: f64, t_fluid: f64, n_boreholes: usize) -> f64 {
        let mass_flow = self.mass_flow_rate.at(t_fluid);
        let specific_heat = self.specific_heat.at(t_fluid);
        power_kw * 1000. / (specific_heat * mass_flow * n_boreholes as f64)
    }
}
