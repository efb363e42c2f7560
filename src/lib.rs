//! Coupler - fixed-point coupling engine for multiphysics solves
//!
//! Coupler drives the coupling iterations of one outer step: a primary solve
//! plus subordinate units executed around it, repeated until residual norms or
//! a custom postprocessor settle, relaxed or secant-accelerated in between.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Value objects, collaborator ports and errors
//! - **Service Layer** (`services`): Acceleration, convergence checks, snapshots and the step executor
//! - **Application Layer** (`application`): The coupling-loop orchestrator
//! - **Infrastructure Layer** (`infrastructure`): Configuration, logging and history reporting
//! - **Adapters** (`adapters`): In-memory demo collaborators
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use coupler::adapters::demo::{coupled_pair, DemoParams};
//! use coupler::{CouplingConfig, CouplingLoop};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = CouplingConfig {
//!         max_iterations: 30,
//!         ..CouplingConfig::default()
//!     };
//!     let (primary, subordinate, registry) = coupled_pair(DemoParams::default());
//!     let mut coupling = CouplingLoop::new(config, primary, subordinate, registry)?;
//!     let report = coupling.run()?;
//!     println!("{}: {}", report.status, report.reason);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::CouplingLoop;
pub use domain::models::{
    AccelerationKind, ConvergenceStatus, CouplingConfig, ExecPhase, LoggingConfig, StepReport,
};
pub use domain::ports::{
    ConvergenceReporter, DofSelector, FailStepSignal, PostprocessorRegistry, PrimarySolver,
    SubordinateSet,
};
pub use domain::{ConfigError, CouplingError, CouplingResult};
pub use infrastructure::config::ConfigLoader;
pub use services::AccelerationStrategy;
