//! Coupling services
//!
//! Pure strategies and evaluators plus the per-iteration executor that talks
//! to the external collaborators.

pub mod acceleration;
pub mod convergence_evaluator;
pub mod snapshot_manager;
pub mod step_executor;

pub use acceleration::{AccelerationStrategy, SECANT_DENOMINATOR_EPSILON};
pub use convergence_evaluator::{ConvergenceCriteria, ConvergenceEvaluator, Verdict};
pub use snapshot_manager::SnapshotManager;
pub use step_executor::{
    ExecutorOptions, ExecutorState, IterationFailure, IterationOutcome, StepExecutor,
};
