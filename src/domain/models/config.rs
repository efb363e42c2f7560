use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::history::ScalingCapture;
use crate::domain::errors::ConfigError;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 2] = ["json", "pretty"];

/// Coupling loop configuration.
///
/// Every option is a plain value. Validation happens in
/// [`ConfigLoader::validate`](crate::infrastructure::config::ConfigLoader::validate)
/// and again when a [`CouplingLoop`](crate::application::CouplingLoop) is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CouplingConfig {
    /// Iterations that must run before a norm or custom check may stop the loop
    #[serde(default)]
    pub min_iterations: usize,

    /// Upper bound on coupling iterations per outer step (1 = no coupling)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Treat running out of iterations as success
    #[serde(default)]
    pub accept_max_iterations_as_converged: bool,

    /// Evaluate the primary residual norm for convergence
    #[serde(default = "default_true")]
    pub residual_check_enabled: bool,

    /// Absolute residual-norm tolerance
    #[serde(default = "default_abs_tol")]
    pub abs_tol: f64,

    /// Relative residual-drop tolerance
    #[serde(default = "default_rel_tol")]
    pub rel_tol: f64,

    /// Measure begin and end norms even when no subordinate runs in that phase
    #[serde(default)]
    pub force_norms: bool,

    /// Postprocessor driving the custom convergence check
    #[serde(default)]
    pub custom_postprocessor: Option<String>,

    /// Absolute tolerance of the custom check
    #[serde(default = "default_abs_tol")]
    pub custom_abs_tol: f64,

    /// Relative tolerance of the custom check
    #[serde(default = "default_rel_tol")]
    pub custom_rel_tol: f64,

    /// Compare the custom postprocessor against 0 rather than its previous value
    #[serde(default)]
    pub use_direct_postprocessor_value: bool,

    /// When the custom-check scaling value is captured (unset = mode default)
    #[serde(default)]
    pub custom_scaling: Option<ScalingCapture>,

    /// Acceleration applied to transformed quantities
    #[serde(default)]
    pub acceleration: AccelerationKind,

    /// Fraction of the newly computed value to keep, in (0, 2)
    #[serde(default = "default_relaxation_factor")]
    pub relaxation_factor: f64,

    /// Primary variables to transform
    #[serde(default)]
    pub transformed_variables: Vec<String>,

    /// Postprocessors to transform before the primary solve
    #[serde(default)]
    pub transformed_postprocessors: Vec<String>,

    /// Relaxation factor used when this loop runs as a subordinate, in (0, 2)
    #[serde(default = "default_relaxation_factor")]
    pub secondary_relaxation_factor: f64,

    /// Variables transformed on behalf of an enclosing loop
    #[serde(default)]
    pub secondary_transformed_variables: Vec<String>,

    /// Postprocessors transformed on behalf of an enclosing loop
    #[serde(default)]
    pub secondary_transformed_postprocessors: Vec<String>,

    /// Topology-change repeats allowed before an iteration moves on
    #[serde(default = "default_max_topology_updates")]
    pub max_topology_updates: u32,

    /// Ask the primary to update its topology right after the timestep-begin phase
    #[serde(default)]
    pub update_topology_at_timestep_begin: bool,

    /// Force subordinate auto-advance on or off (unset = derived)
    #[serde(default)]
    pub auto_advance_subordinates: Option<bool>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_max_iterations() -> usize {
    1
}

const fn default_true() -> bool {
    true
}

const fn default_abs_tol() -> f64 {
    1e-50
}

const fn default_rel_tol() -> f64 {
    1e-8
}

const fn default_relaxation_factor() -> f64 {
    1.0
}

const fn default_max_topology_updates() -> u32 {
    u32::MAX
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            min_iterations: 0,
            max_iterations: default_max_iterations(),
            accept_max_iterations_as_converged: false,
            residual_check_enabled: default_true(),
            abs_tol: default_abs_tol(),
            rel_tol: default_rel_tol(),
            force_norms: false,
            custom_postprocessor: None,
            custom_abs_tol: default_abs_tol(),
            custom_rel_tol: default_rel_tol(),
            use_direct_postprocessor_value: false,
            custom_scaling: None,
            acceleration: AccelerationKind::default(),
            relaxation_factor: default_relaxation_factor(),
            transformed_variables: vec![],
            transformed_postprocessors: vec![],
            secondary_relaxation_factor: default_relaxation_factor(),
            secondary_transformed_variables: vec![],
            secondary_transformed_postprocessors: vec![],
            max_topology_updates: default_max_topology_updates(),
            update_topology_at_timestep_begin: false,
            auto_advance_subordinates: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl CouplingConfig {
    /// Whether the loop iterates at all.
    pub const fn has_coupling_iterations(&self) -> bool {
        self.max_iterations > 1
    }

    /// Effective scaling capture of the custom check.
    pub fn resolved_custom_scaling(&self) -> ScalingCapture {
        self.custom_scaling.unwrap_or(if self.use_direct_postprocessor_value {
            ScalingCapture::FirstIteration
        } else {
            ScalingCapture::EveryIteration
        })
    }

    /// Effective auto-advance flag for a primary that is or is not transient.
    pub fn resolved_auto_advance(&self, primary_is_transient: bool) -> bool {
        self.auto_advance_subordinates
            .unwrap_or(!(self.has_coupling_iterations() && primary_is_transient))
    }

    /// Check every option, returning the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(self.max_iterations));
        }
        if self.min_iterations > self.max_iterations {
            return Err(ConfigError::InvalidIterationBounds {
                min: self.min_iterations,
                max: self.max_iterations,
            });
        }

        for factor in [self.relaxation_factor, self.secondary_relaxation_factor] {
            if !(factor > 0.0 && factor < 2.0) {
                return Err(ConfigError::InvalidRelaxationFactor(factor));
            }
        }

        for (field, value) in [
            ("abs_tol", self.abs_tol),
            ("rel_tol", self.rel_tol),
            ("custom_abs_tol", self.custom_abs_tol),
            ("custom_rel_tol", self.custom_rel_tol),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidTolerance { field, value });
            }
        }

        if self.custom_postprocessor.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::ValidationFailed(
                "custom_postprocessor cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (list, name) in self.quantity_names() {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyQuantityName(list));
            }
            if !seen.insert((list, name)) {
                return Err(ConfigError::DuplicateQuantity(name.to_string()));
            }
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.logging.format.clone()));
        }

        Ok(())
    }

    /// Every configured quantity name, tagged with the list it came from.
    pub fn quantity_names(&self) -> impl Iterator<Item = (&'static str, &str)> {
        tagged("transformed_variables", &self.transformed_variables)
            .chain(tagged("transformed_postprocessors", &self.transformed_postprocessors))
            .chain(tagged(
                "secondary_transformed_variables",
                &self.secondary_transformed_variables,
            ))
            .chain(tagged(
                "secondary_transformed_postprocessors",
                &self.secondary_transformed_postprocessors,
            ))
    }
}

fn tagged<'a>(
    list: &'static str,
    names: &'a [String],
) -> impl Iterator<Item = (&'static str, &'a str)> {
    names.iter().map(move |n| (list, n.as_str()))
}

/// Acceleration family for transformed quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelerationKind {
    /// Plain fixed-point substitution with optional relaxation
    #[default]
    Direct,
    /// Two-point secant extrapolation
    Secant,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
