use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;
use thiserror::Error;
use tracing::warn;

/// Sizing method: three-pulse closed form, monthly convolution, or hourly
/// convolution.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum SizingMode {
    L2,
    L3,
    L4,
}

/// Which fluid temperature must respect the bounds during sizing.
#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum SizeBasedOn {
    #[default]
    AverageFluid,
    Inlet,
    Outlet,
}

/// Structured notice that a legacy option name was consumed. Non-fatal: the
/// value is applied to the canonical option and the computation proceeds.
#[derive(Clone, Debug)]
pub struct DeprecationWarning {
    pub option: String,
    pub canonical: &'static str,
}

pub type DeprecationCallback = Arc<dyn Fn(&DeprecationWarning) + Send + Sync>;

/// Solver configuration. Defaults match the documented sizing behaviour:
/// initial guess 100 m, absolute tolerance 0.05 m, relative tolerance 0.005,
/// at most 40 iterations, automatic quadrant selection.
#[derive(Clone, Deserialize, Serialize)]
pub struct CalculationSetup {
    pub sizing_mode: SizingMode,
    pub size_based_on: SizeBasedOn,
    pub h_init: f64,
    pub atol: f64,
    pub rtol: f64,
    pub max_iterations: usize,
    /// Fall back to the robust deep-sizing stepper when ordinary iteration
    /// fails to converge over depth-variable ground.
    pub deep_sizing: bool,
    /// Skip ordinary iteration and size with the deep stepper directly.
    pub force_deep_sizing: bool,
    pub use_constant_rb: bool,
    pub interpolate_gfunctions: bool,
    /// 0 selects the quadrant automatically from the load imbalance.
    pub quadrant_sizing: u8,
    #[serde(skip)]
    deprecation_callback: Option<DeprecationCallback>,
}

impl Default for CalculationSetup {
    fn default() -> Self {
        Self {
            sizing_mode: SizingMode::L3,
            size_based_on: SizeBasedOn::AverageFluid,
            h_init: 100.,
            atol: 0.05,
            rtol: 0.005,
            max_iterations: 40,
            deep_sizing: true,
            force_deep_sizing: false,
            use_constant_rb: false,
            interpolate_gfunctions: true,
            quadrant_sizing: 0,
            deprecation_callback: None,
        }
    }
}

impl std::fmt::Debug for CalculationSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculationSetup")
            .field("sizing_mode", &self.sizing_mode)
            .field("size_based_on", &self.size_based_on)
            .field("h_init", &self.h_init)
            .field("atol", &self.atol)
            .field("rtol", &self.rtol)
            .field("max_iterations", &self.max_iterations)
            .field("deep_sizing", &self.deep_sizing)
            .field("force_deep_sizing", &self.force_deep_sizing)
            .field("use_constant_rb", &self.use_constant_rb)
            .field("interpolate_gfunctions", &self.interpolate_gfunctions)
            .field("quadrant_sizing", &self.quadrant_sizing)
            .finish()
    }
}

/// Value for [`CalculationSetup::apply_named_option`].
#[derive(Clone, Copy, Debug)]
pub enum SetupValue {
    Bool(bool),
    Number(f64),
    Integer(usize),
    Mode(SizingMode),
    Basis(SizeBasedOn),
}

#[derive(Clone, Debug, Error)]
pub enum SetupError {
    #[error("unrecognised calculation option '{0}'")]
    UnknownOption(String),
    #[error("option '{option}' expects a {expected} value")]
    WrongValueType {
        option: String,
        expected: &'static str,
    },
    #[error("option '{option}' value {value} is out of range")]
    OutOfRange { option: String, value: f64 },
}

// Legacy option names accepted for one more version. Each maps to a single
// canonical option; consuming one raises a deprecation warning.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("L2_sizing", "sizing_mode"),
    ("L3_sizing", "sizing_mode"),
    ("L4_sizing", "sizing_mode"),
    ("H_init", "h_init"),
    ("max_nb_of_iterations", "max_iterations"),
    ("use_constant_Rb", "use_constant_rb"),
    ("use_precalculated_data", "interpolate_gfunctions"),
];

impl CalculationSetup {
    /// Register a callback invoked for every deprecated option consumed.
    /// Warnings also go to the `tracing` log either way.
    pub fn with_deprecation_callback(mut self, callback: DeprecationCallback) -> Self {
        self.deprecation_callback = Some(callback);
        self
    }

    /// Apply an option by name, accepting both canonical and legacy names.
    pub fn apply_named_option(
        &mut self,
        name: &str,
        value: SetupValue,
    ) -> Result<(), SetupError> {
        let canonical = match LEGACY_ALIASES
            .iter()
            .find(|(legacy, _)| *legacy == name)
        {
            Some((legacy, canonical)) => {
                let warning = DeprecationWarning {
                    option: (*legacy).to_string(),
                    canonical,
                };
                warn!(
                    option = warning.option,
                    canonical = warning.canonical,
                    "deprecated calculation option consumed"
                );
                if let Some(callback) = &self.deprecation_callback {
                    callback(&warning);
                }
                // the boolean trio selects a mode rather than carrying one
                if let ("L2_sizing" | "L3_sizing" | "L4_sizing", SetupValue::Bool(enabled)) =
                    (name, value)
                {
                    if enabled {
                        self.sizing_mode = match name {
                            "L2_sizing" => SizingMode::L2,
                            "L3_sizing" => SizingMode::L3,
                            _ => SizingMode::L4,
                        };
                    }
                    return Ok(());
                }
                *canonical
            }
            None => name,
        };

        match (canonical, value) {
            ("sizing_mode", SetupValue::Mode(mode)) => self.sizing_mode = mode,
            ("size_based_on", SetupValue::Basis(basis)) => self.size_based_on = basis,
            ("h_init", SetupValue::Number(h)) if h > 0. => self.h_init = h,
            ("atol", SetupValue::Number(tol)) if tol > 0. => self.atol = tol,
            ("rtol", SetupValue::Number(tol)) if tol > 0. => self.rtol = tol,
            ("max_iterations", SetupValue::Integer(n)) if n > 0 => self.max_iterations = n,
            ("deep_sizing", SetupValue::Bool(flag)) => self.deep_sizing = flag,
            ("force_deep_sizing", SetupValue::Bool(flag)) => self.force_deep_sizing = flag,
            ("use_constant_rb", SetupValue::Bool(flag)) => self.use_constant_rb = flag,
            ("interpolate_gfunctions", SetupValue::Bool(flag)) => {
                self.interpolate_gfunctions = flag
            }
            ("quadrant_sizing", SetupValue::Integer(quadrant)) if quadrant <= 4 => {
                self.quadrant_sizing = quadrant as u8
            }
            ("h_init" | "atol" | "rtol", SetupValue::Number(v)) => {
                return Err(SetupError::OutOfRange {
                    option: canonical.to_string(),
                    value: v,
                })
            }
            ("quadrant_sizing" | "max_iterations", SetupValue::Integer(v)) => {
                return Err(SetupError::OutOfRange {
                    option: canonical.to_string(),
                    value: v as f64,
                })
            }
            (
                "sizing_mode" | "size_based_on" | "h_init" | "atol" | "rtol" | "max_iterations"
                | "deep_sizing" | "force_deep_sizing" | "use_constant_rb"
                | "interpolate_gfunctions" | "quadrant_sizing",
                _,
            ) => {
                return Err(SetupError::WrongValueType {
                    option: canonical.to_string(),
                    expected: expected_type(canonical),
                })
            }
            _ => return Err(SetupError::UnknownOption(name.to_string())),
        }
        Ok(())
    }

    /// Both convergence criteria must hold: absolute and relative change in
    /// borehole length below tolerance.
    pub(crate) fn converged(&self, h: f64, h_previous: f64) -> bool {
        let delta = (h - h_previous).abs();
        delta <= self.atol && delta / h_previous.abs() <= self.rtol
    }
}

fn expected_type(option: &str) -> &'static str {
    match option {
        "sizing_mode" => "sizing mode",
        "size_based_on" => "sizing basis",
        "max_iterations" | "quadrant_sizing" => "integer",
        "deep_sizing" | "force_deep_sizing" | "use_constant_rb" | "interpolate_gfunctions" => {
            "boolean"
        }
        _ => "number",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[rstest]
    fn should_carry_documented_defaults() {
        let setup = CalculationSetup::default();
        assert_eq!(setup.h_init, 100.);
        assert_eq!(setup.atol, 0.05);
        assert_eq!(setup.rtol, 0.005);
        assert_eq!(setup.max_iterations, 40);
        assert_eq!(setup.quadrant_sizing, 0);
        assert_eq!(setup.sizing_mode, SizingMode::L3);
    }

    #[rstest]
    fn should_require_both_tolerances_for_convergence() {
        let setup = CalculationSetup::default();
        // small absolute change but large relative change at tiny H
        assert!(!setup.converged(0.04, 0.01));
        // small relative change but large absolute change at huge H
        assert!(!setup.converged(10_040., 10_000.));
        assert!(setup.converged(100.04, 100.));
    }

    #[rstest]
    fn should_apply_canonical_options() {
        let mut setup = CalculationSetup::default();
        setup
            .apply_named_option("sizing_mode", SetupValue::Mode(SizingMode::L4))
            .unwrap();
        setup
            .apply_named_option("quadrant_sizing", SetupValue::Integer(2))
            .unwrap();
        assert_eq!(setup.sizing_mode, SizingMode::L4);
        assert_eq!(setup.quadrant_sizing, 2);
        assert!(setup
            .apply_named_option("quadrant_sizing", SetupValue::Integer(5))
            .is_err());
        assert!(setup
            .apply_named_option("no_such_option", SetupValue::Bool(true))
            .is_err());
    }

    #[rstest]
    fn should_warn_once_per_legacy_option_consumed() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let counter = warnings.clone();
        let mut setup = CalculationSetup::default().with_deprecation_callback(Arc::new(
            move |warning: &DeprecationWarning| {
                assert_eq!(warning.canonical, "sizing_mode");
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));
        setup
            .apply_named_option("L2_sizing", SetupValue::Bool(true))
            .unwrap();
        assert_eq!(setup.sizing_mode, SizingMode::L2);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);

        // disabled legacy flag still warns but leaves the mode alone
        setup
            .apply_named_option("L4_sizing", SetupValue::Bool(false))
            .unwrap();
        assert_eq!(setup.sizing_mode, SizingMode::L2);
        assert_eq!(warnings.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    fn should_map_legacy_value_options() {
        let mut setup = CalculationSetup::default();
        setup
            .apply_named_option("H_init", SetupValue::Number(150.))
            .unwrap();
        setup
            .apply_named_option("use_constant_Rb", SetupValue::Bool(true))
            .unwrap();
        assert_eq!(setup.h_init, 150.);
        assert!(setup.use_constant_rb);
    }
}
