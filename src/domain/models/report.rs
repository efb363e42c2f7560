//! Summary of one outer step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::ConvergenceStatus;

/// Everything the coupling loop learned about one outer step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: Uuid,
    /// Primary solver time at entry.
    pub time: f64,
    pub status: ConvergenceStatus,
    /// One-line reason mapped from `status`.
    pub reason: String,
    /// Coupling iterations that produced a verdict or a failure.
    pub iterations: usize,
    /// Calls into the step executor, topology repeats included.
    pub executor_invocations: usize,
    pub topology_repeats: u32,
    pub initial_norm: Option<f64>,
    /// Begin norm per completed iteration; `None` when not measured.
    pub begin_norms: Vec<Option<f64>>,
    /// End norm per completed iteration; `None` when not measured.
    pub end_norms: Vec<Option<f64>>,
    /// Custom postprocessor values in iteration order.
    pub custom_values: Vec<f64>,
    /// Whether this loop was re-entered by an enclosing loop at the same time.
    pub secondary_reentry: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepReport {
    pub const fn converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Wall-clock duration of the step in milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
