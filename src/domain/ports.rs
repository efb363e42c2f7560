//! Collaborator interfaces consumed by the coupling engine.
//!
//! Every call is synchronous from the engine's point of view. Implementations
//! may parallelise internally; the engine never sees it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use super::models::report::StepReport;
use super::models::{ExecPhase, StateBlob};

/// Maps named variables onto addressable scalar slots of the primary solution.
pub trait DofSelector {
    /// Slots owned by `variable`, or `None` if the variable is unknown.
    fn select_dofs(&self, variable: &str) -> Option<Vec<usize>>;

    /// Read the current values at `slots`, in the same order.
    fn dof_values(&self, slots: &[usize]) -> Vec<f64>;

    /// Overwrite the values at `slots`. `values` has the same length.
    fn set_dof_values(&mut self, slots: &[usize], values: &[f64]);
}

/// The primary numerical solve.
pub trait PrimarySolver: DofSelector {
    /// Run one solve. `false` means the solve did not converge.
    fn solve_once(&mut self) -> bool;

    /// L2 norm of the current residual.
    fn residual_norm_l2(&mut self) -> f64;

    /// Update the discretization topology and report whether it changed.
    fn did_topology_change(&mut self) -> bool;

    fn current_time(&self) -> f64;

    fn is_transient(&self) -> bool {
        true
    }

    /// Whether the discretization can change topology mid-step at all.
    fn supports_topology_changes(&self) -> bool {
        false
    }
}

/// Every subordinate unit, grouped by the phase it executes on.
pub trait SubordinateSet {
    /// Execute all units flagged for `phase`. `false` is an irrecoverable failure.
    fn run_phase(&mut self, phase: ExecPhase, auto_advance: bool) -> bool;

    /// Serialize the state of every unit flagged for `phase`.
    fn backup(&mut self, phase: ExecPhase) -> StateBlob;

    /// Restore every unit flagged for `phase` from a blob produced by [`backup`](Self::backup).
    fn restore(&mut self, phase: ExecPhase, blob: &StateBlob);

    /// Whether any unit executes on `phase`.
    fn has_units(&self, phase: ExecPhase) -> bool;
}

/// Named scalar observables.
pub trait PostprocessorRegistry {
    fn value_of(&self, name: &str) -> Option<f64>;

    fn set_value_of(&mut self, name: &str, value: f64);
}

/// Which side of the primary solve a norm was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormSite {
    Begin,
    End,
}

/// Receives the convergence history as it is produced.
///
/// All methods default to no-ops so a reporter only implements what it shows.
pub trait ConvergenceReporter {
    fn step_started(&mut self, _step_id: Uuid, _time: f64) {}

    fn initial_norm(&mut self, _norm: f64) {}

    fn iteration_started(&mut self, _iteration: usize) {}

    fn norm_measured(
        &mut self,
        _iteration: usize,
        _site: NormSite,
        _previous: Option<f64>,
        _norm: f64,
    ) {
    }

    fn custom_value(&mut self, _iteration: usize, _name: &str, _value: f64) {}

    fn topology_repeat(&mut self, _iteration: usize, _count: u32) {}

    fn step_finished(&mut self, _report: &StepReport) {}
}

/// Reporter that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ConvergenceReporter for NullReporter {}

/// Shared "fail this step" flag an external collaborator may raise at any time.
///
/// The step executor consumes it after each phase.
#[derive(Debug, Clone, Default)]
pub struct FailStepSignal(Arc<AtomicBool>);

impl FailStepSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}
