use serde::{Deserialize, Serialize};
use thiserror::Error;

/// This module holds the thermal description of the ground a borefield is
/// drilled into: conductivity, volumetric heat capacity and the undisturbed
/// ground temperature, each of which may vary with depth.
///
/// `temperature_at` always returns the *average* undisturbed temperature over
/// a borehole of the given length, which is the quantity the sizing equations
/// work with.

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GroundLayer {
    /// Layer thickness in m. The deepest layer may be declared infinite
    /// instead of carrying a thickness.
    pub thickness: f64,
    /// Thermal conductivity in W/(m.K).
    pub conductivity: f64,
    /// Volumetric heat capacity in J/(m3.K).
    pub volumetric_heat_capacity: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum GroundModel {
    /// Homogeneous ground at a uniform undisturbed temperature.
    Constant {
        conductivity: f64,
        volumetric_heat_capacity: f64,
        temperature: f64,
    },
    /// Homogeneous ground with a geothermal gradient, expressed in K per 100 m
    /// of depth. The surface temperature is the undisturbed temperature at 0 m.
    LinearGradient {
        conductivity: f64,
        volumetric_heat_capacity: f64,
        surface_temperature: f64,
        gradient: f64,
    },
    /// Homogeneous ground where the temperature profile follows from a
    /// constant geothermal heat flux in W/m2.
    HeatFlux {
        conductivity: f64,
        volumetric_heat_capacity: f64,
        surface_temperature: f64,
        flux: f64,
    },
    /// Horizontally layered ground. Layers are ordered from the surface down
    /// and must not overlap; properties over a borehole length are
    /// thickness-weighted averages.
    Layered {
        layers: Vec<GroundLayer>,
        surface_temperature: f64,
        /// When set, the deepest layer extends to arbitrary depth.
        last_layer_infinite: bool,
    },
}

#[derive(Clone, Debug, Error)]
pub enum GroundConfigurationError {
    #[error("ground thermal conductivity must be positive, got {0} W/(m.K)")]
    NonPositiveConductivity(f64),
    #[error("ground volumetric heat capacity must be positive, got {0} J/(m3.K)")]
    NonPositiveHeatCapacity(f64),
    #[error("ground layer thickness must be positive, got {0} m")]
    NonPositiveLayerThickness(f64),
    #[error("a layered ground model needs at least one layer")]
    NoLayers,
    #[error("borehole length must be non-negative, got {0} m")]
    NegativeDepth(f64),
    #[error("borehole length {depth} m exceeds the deepest ground layer at {max_depth} m")]
    DepthBeyondLayers { depth: f64, max_depth: f64 },
}

impl GroundModel {
    pub fn constant(
        conductivity: f64,
        volumetric_heat_capacity: f64,
        temperature: f64,
    ) -> Result<Self, GroundConfigurationError> {
        validate_properties(conductivity, volumetric_heat_capacity)?;
        Ok(Self::Constant {
            conductivity,
            volumetric_heat_capacity,
            temperature,
        })
    }

    pub fn linear_gradient(
        conductivity: f64,
        volumetric_heat_capacity: f64,
        surface_temperature: f64,
        gradient: f64,
    ) -> Result<Self, GroundConfigurationError> {
        validate_properties(conductivity, volumetric_heat_capacity)?;
        Ok(Self::LinearGradient {
            conductivity,
            volumetric_heat_capacity,
            surface_temperature,
            gradient,
        })
    }

    pub fn heat_flux(
        conductivity: f64,
        volumetric_heat_capacity: f64,
        surface_temperature: f64,
        flux: f64,
    ) -> Result<Self, GroundConfigurationError> {
        validate_properties(conductivity, volumetric_heat_capacity)?;
        Ok(Self::HeatFlux {
            conductivity,
            volumetric_heat_capacity,
            surface_temperature,
            flux,
        })
    }

    pub fn layered(
        layers: Vec<GroundLayer>,
        surface_temperature: f64,
        last_layer_infinite: bool,
    ) -> Result<Self, GroundConfigurationError> {
        if layers.is_empty() {
            return Err(GroundConfigurationError::NoLayers);
        }
        for layer in &layers {
            validate_properties(layer.conductivity, layer.volumetric_heat_capacity)?;
            if layer.thickness <= 0. {
                return Err(GroundConfigurationError::NonPositiveLayerThickness(
                    layer.thickness,
                ));
            }
        }
        Ok(Self::Layered {
            layers,
            surface_temperature,
            last_layer_infinite,
        })
    }

    /// Average thermal conductivity over a borehole of length `depth`, in W/(m.K).
    pub fn conductivity(&self, depth: f64) -> Result<f64, GroundConfigurationError> {
        self.check_depth(depth)?;
        match self {
            Self::Constant { conductivity, .. }
            | Self::LinearGradient { conductivity, .. }
            | Self::HeatFlux { conductivity, .. } => Ok(*conductivity),
            Self::Layered { layers, .. } => {
                Ok(layered_average(layers, depth, |layer| layer.conductivity))
            }
        }
    }

    /// Average volumetric heat capacity over a borehole of length `depth`, in J/(m3.K).
    pub fn volumetric_heat_capacity(&self, depth: f64) -> Result<f64, GroundConfigurationError> {
        self.check_depth(depth)?;
        match self {
            Self::Constant {
                volumetric_heat_capacity,
                ..
            }
            | Self::LinearGradient {
                volumetric_heat_capacity,
                ..
            }
            | Self::HeatFlux {
                volumetric_heat_capacity,
                ..
            } => Ok(*volumetric_heat_capacity),
            Self::Layered { layers, .. } => Ok(layered_average(layers, depth, |layer| {
                layer.volumetric_heat_capacity
            })),
        }
    }

    /// Thermal diffusivity in m2/s.
    pub fn diffusivity(&self, depth: f64) -> Result<f64, GroundConfigurationError> {
        Ok(self.conductivity(depth)? / self.volumetric_heat_capacity(depth)?)
    }

    /// Average undisturbed ground temperature over a borehole of length `depth`, in degC.
    pub fn temperature_at(&self, depth: f64) -> Result<f64, GroundConfigurationError> {
        self.check_depth(depth)?;
        match self {
            Self::Constant { temperature, .. } => Ok(*temperature),
            // The gradient is given per 100 m; averaging a linear profile over
            // the borehole length halves it again.
            Self::LinearGradient {
                surface_temperature,
                gradient,
                ..
            } => Ok(surface_temperature + depth * gradient / 200.),
            Self::HeatFlux {
                surface_temperature,
                conductivity,
                flux,
                ..
            } => Ok(surface_temperature + depth * flux / (2. * conductivity)),
            Self::Layered {
                surface_temperature,
                ..
            } => Ok(*surface_temperature),
        }
    }

    /// Extra borehole length that raises the average undisturbed temperature
    /// by `delta_t` Kelvin above the surface value. Returns `None` for models
    /// without depth variation; used by the deep-sizing fallback.
    pub fn delta_h_for_temperature(&self, delta_t: f64) -> Option<f64> {
        match self {
            Self::Constant { .. } | Self::Layered { .. } => None,
            Self::LinearGradient { gradient, .. } => {
                (*gradient != 0.).then(|| 200. * delta_t / gradient)
            }
            Self::HeatFlux {
                conductivity, flux, ..
            } => (*flux != 0.).then(|| 2. * conductivity * delta_t / flux),
        }
    }

    /// Whether the undisturbed temperature varies with borehole length.
    pub fn has_variable_temperature(&self) -> bool {
        match self {
            Self::Constant { .. } | Self::Layered { .. } => false,
            Self::LinearGradient { gradient, .. } => *gradient != 0.,
            Self::HeatFlux { flux, .. } => *flux != 0.,
        }
    }

    fn check_depth(&self, depth: f64) -> Result<(), GroundConfigurationError> {
        if depth < 0. {
            return Err(GroundConfigurationError::NegativeDepth(depth));
        }
        if let Self::Layered {
            layers,
            last_layer_infinite: false,
            ..
        } = self
        {
            let max_depth: f64 = layers.iter().map(|layer| layer.thickness).sum();
            if depth > max_depth {
                return Err(GroundConfigurationError::DepthBeyondLayers { depth, max_depth });
            }
        }
        Ok(())
    }
}

fn validate_properties(
    conductivity: f64,
    volumetric_heat_capacity: f64,
) -> Result<(), GroundConfigurationError> {
    if conductivity <= 0. {
        return Err(GroundConfigurationError::NonPositiveConductivity(
            conductivity,
        ));
    }
    if volumetric_heat_capacity <= 0. {
        return Err(GroundConfigurationError::NonPositiveHeatCapacity(
            volumetric_heat_capacity,
        ));
    }
    Ok(())
}

/// Thickness-weighted average of a layer property down to `depth`. The last
/// layer absorbs any remaining depth (the caller has already checked the
/// depth is admissible).
fn layered_average(layers: &[GroundLayer], depth: f64, property: impl Fn(&GroundLayer) -> f64) -> f64 {
    if depth == 0. {
        return property(&layers[0]);
    }
    let mut remaining = depth;
    let mut weighted = 0.;
    for (i, layer) in layers.iter().enumerate() {
        let covered = if i == layers.len() - 1 {
            remaining
        } else {
            layer.thickness.min(remaining)
        };
        weighted += covered * property(layer);
        remaining -= covered;
        if remaining <= 0. {
            break;
        }
    }
    weighted / depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    #[fixture]
    fn layered_ground() -> GroundModel {
        GroundModel::layered(
            vec![
                GroundLayer {
                    thickness: 50.,
                    conductivity: 2.,
                    volumetric_heat_capacity: 2.0e6,
                },
                GroundLayer {
                    thickness: 50.,
                    conductivity: 4.,
                    volumetric_heat_capacity: 2.4e6,
                },
            ],
            10.,
            false,
        )
        .unwrap()
    }

    #[rstest]
    fn should_reject_bad_properties() {
        assert!(GroundModel::constant(0., 2.4e6, 10.).is_err());
        assert!(GroundModel::constant(3., -1., 10.).is_err());
        assert!(GroundModel::layered(vec![], 10., false).is_err());
    }

    #[rstest]
    fn should_average_linear_gradient_over_depth() {
        let ground = GroundModel::linear_gradient(3., 2.4e6, 10., 2.).unwrap();
        // 2 K/100m over 100 m averages to +1 K
        assert_relative_eq!(ground.temperature_at(100.).unwrap(), 11.);
        assert_relative_eq!(ground.temperature_at(0.).unwrap(), 10.);
        assert!(ground.has_variable_temperature());
    }

    #[rstest]
    fn should_derive_temperature_from_heat_flux() {
        let ground = GroundModel::heat_flux(3., 2.4e6, 10., 0.06).unwrap();
        assert_relative_eq!(ground.temperature_at(100.).unwrap(), 11.);
    }

    #[rstest]
    fn should_invert_temperature_offset() {
        let ground = GroundModel::linear_gradient(3., 2.4e6, 10., 2.).unwrap();
        assert_relative_eq!(ground.delta_h_for_temperature(1.).unwrap(), 100.);
        let flat = GroundModel::constant(3., 2.4e6, 10.).unwrap();
        assert!(flat.delta_h_for_temperature(1.).is_none());
    }

    #[rstest]
    fn should_weight_layered_properties_by_thickness(layered_ground: GroundModel) {
        assert_relative_eq!(layered_ground.conductivity(50.).unwrap(), 2.);
        assert_relative_eq!(layered_ground.conductivity(100.).unwrap(), 3.);
        assert_relative_eq!(
            layered_ground.volumetric_heat_capacity(100.).unwrap(),
            2.2e6
        );
    }

    #[rstest]
    fn should_refuse_depth_beyond_finite_layers(layered_ground: GroundModel) {
        assert!(matches!(
            layered_ground.conductivity(150.),
            Err(GroundConfigurationError::DepthBeyondLayers { .. })
        ));
        assert!(matches!(
            layered_ground.conductivity(-1.),
            Err(GroundConfigurationError::NegativeDepth(_))
        ));
    }

    #[rstest]
    fn should_extend_last_layer_when_infinite() {
        let ground = GroundModel::layered(
            vec![GroundLayer {
                thickness: 10.,
                conductivity: 2.,
                volumetric_heat_capacity: 2.0e6,
            }],
            10.,
            true,
        )
        .unwrap();
        assert_relative_eq!(ground.conductivity(500.).unwrap(), 2.);
    }

    #[rstest]
    fn should_compute_diffusivity() {
        let ground = GroundModel::constant(3., 2.4e6, 10.).unwrap();
        assert_relative_eq!(ground.diffusivity(100.).unwrap(), 1.25e-6);
    }
}
