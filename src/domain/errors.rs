//! Domain errors for the coupling engine.
//!
//! Only setup problems surface as `Err`. Iteration-local failures and numerical
//! degeneracies are reported through [`ConvergenceStatus`](super::models::ConvergenceStatus).

use thiserror::Error;

use super::models::{ExecPhase, QuantityKind};

/// Configuration error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid iteration bounds: min_iterations ({min}) may not exceed max_iterations ({max})")]
    InvalidIterationBounds { min: usize, max: usize },

    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(usize),

    #[error("Invalid relaxation factor: {0}. Must lie strictly between 0 and 2")]
    InvalidRelaxationFactor(f64),

    #[error("Invalid tolerance {field}: {value}. Must be positive and finite")]
    InvalidTolerance { field: &'static str, value: f64 },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Quantity '{0}' is listed more than once")]
    DuplicateQuantity(String),

    #[error("Quantity names cannot be empty (in {0})")]
    EmptyQuantityName(&'static str),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors returned across the coupling-loop boundary.
#[derive(Error, Debug)]
pub enum CouplingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown {kind} '{name}': not provided by the primary solver or registry")]
    UnknownQuantity { kind: QuantityKind, name: String },

    #[error("No snapshot captured for phase {0}")]
    SnapshotMissing(ExecPhase),
}

pub type CouplingResult<T> = Result<T, CouplingError>;
